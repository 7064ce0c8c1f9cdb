//! `web.xml` conditional templating (§4.3).
//!
//! Filter declarations and servlet mappings for the URL-rewrite and admin
//! features are wrapped in `IF_URLREWRITE_ENABLED`/`IF_ADMIN_ENABLED`
//! blocks in the bundled template; which survive is decided here before
//! the file is written. `admin.enabled` defaults to true for backward
//! compatibility with existing projects that never set it.

use std::collections::BTreeMap;
use std::path::Path;

use lucli_types::{LucliError, ServerConfig, Warning};

/// Default `web.xml` template shipped with LuCLI. Real installs may
/// override this via a resource path; the builder falls back to this
/// string when no override is configured.
pub const DEFAULT_TEMPLATE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<web-app>
  <display-name>${name}</display-name>
<!-- IF_URLREWRITE_ENABLED -->
  <filter>
    <filter-name>URLRewriteFilter</filter-name>
    <filter-class>org.tuckey.web.filters.urlrewrite.UrlRewriteFilter</filter-class>
    <init-param>
      <param-name>confPath</param-name>
      <param-value>${routerFile}</param-value>
    </init-param>
  </filter>
  <filter-mapping>
    <filter-name>URLRewriteFilter</filter-name>
    <url-pattern>/*</url-pattern>
  </filter-mapping>
<!-- END_IF_URLREWRITE_ENABLED -->
<!-- IF_ADMIN_ENABLED -->
  <servlet>
    <servlet-name>LuceeAdministrationServlet</servlet-name>
    <servlet-class>lucee.loader.servlet.CFMLServlet</servlet-class>
  </servlet>
  <servlet-mapping>
    <servlet-name>LuceeAdministrationServlet</servlet-name>
    <url-pattern>/lucee/admin/*</url-pattern>
  </servlet-mapping>
<!-- END_IF_ADMIN_ENABLED -->
</web-app>
"#;

/// Render and atomically write `web.xml` for `config` into `out_path`.
pub fn render(config: &ServerConfig, template: &str, out_path: &Path) -> Result<Vec<Warning>, LucliError> {
    let mut values = BTreeMap::new();
    values.insert("name".to_string(), config.name.clone());
    values.insert("routerFile".to_string(), config.url_rewrite.router_file.clone());

    let mut conditions = BTreeMap::new();
    conditions.insert("URLREWRITE_ENABLED".to_string(), config.url_rewrite.enabled);
    conditions.insert("ADMIN_ENABLED".to_string(), config.admin.enabled);

    lucli_template::render_to_file(template, &values, &conditions, out_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lucli_types::{AdminConfig, UrlRewriteConfig};

    fn config(url_rewrite_enabled: bool, admin_enabled: bool) -> ServerConfig {
        let mut cfg: ServerConfig = serde_json::from_value(serde_json::json!({
            "name": "myapp",
            "webroot": ".",
        }))
        .unwrap();
        cfg.url_rewrite = UrlRewriteConfig {
            enabled: url_rewrite_enabled,
            router_file: "index.cfm".to_string(),
        };
        cfg.admin = AdminConfig {
            enabled: admin_enabled,
            password: None,
        };
        cfg
    }

    #[test]
    fn omits_urlrewrite_filter_when_disabled() {
        let td = tempfile::tempdir().unwrap();
        let out = td.path().join("web.xml");
        render(&config(false, true), DEFAULT_TEMPLATE, &out).unwrap();
        let content = std::fs::read_to_string(out).unwrap();
        assert!(!content.contains("URLRewriteFilter"));
        assert!(content.contains("LuceeAdministrationServlet"));
    }

    #[test]
    fn includes_both_blocks_when_enabled() {
        let td = tempfile::tempdir().unwrap();
        let out = td.path().join("web.xml");
        render(&config(true, true), DEFAULT_TEMPLATE, &out).unwrap();
        let content = std::fs::read_to_string(out).unwrap();
        assert!(content.contains("URLRewriteFilter"));
        assert!(content.contains("LuceeAdministrationServlet"));
    }

    #[test]
    fn admin_defaults_to_enabled() {
        let cfg = config(true, true);
        assert!(cfg.admin.enabled);
    }
}
