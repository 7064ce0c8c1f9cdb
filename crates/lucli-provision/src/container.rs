//! Container-engine provider (§4.3).
//!
//! Launches a container from a resolved image/tag, maps the configured
//! HTTP port, mounts the webroot, and names the container `lucli-{name}`
//! unless overridden. LuCLI shells out to the `docker` binary (or
//! whatever `LUCLI_CONTAINER_BIN` names) the same way the process
//! supervisor shells out to the launched engine process — no container
//! runtime client library, just argument assembly and a child process.

use std::path::Path;

use lucli_types::{LucliError, ServerConfig};

use crate::base;

/// Default container runtime binary; overridable for tests via
/// `LUCLI_CONTAINER_BIN`, mirroring how the process crate lets tests
/// inject a fake engine launcher.
pub fn container_bin() -> String {
    std::env::var("LUCLI_CONTAINER_BIN").unwrap_or_else(|_| "docker".to_string())
}

/// The name assigned to the launched container: explicit override, else
/// `lucli-{name}`.
pub fn container_name(config: &ServerConfig) -> String {
    config
        .runtime
        .container_name
        .clone()
        .unwrap_or_else(|| format!("lucli-{}", config.name))
}

/// Resolve the image reference to run: `{image}:{tag}`, tag defaulting to
/// `latest`.
pub fn image_reference(config: &ServerConfig) -> Result<String, LucliError> {
    let image = config
        .runtime
        .image
        .as_ref()
        .ok_or_else(|| LucliError::RuntimeMisconfigured("container runtime requires runtime.image".to_string()))?;
    let tag = config.runtime.tag.as_deref().unwrap_or("latest");
    Ok(format!("{image}:{tag}"))
}

/// Build the `docker run` argument vector for this config, without
/// executing it. Exposed separately so `provision`'s dry-run mode can
/// report the exact command without spawning anything.
pub fn run_args(config: &ServerConfig, base_dir: &Path) -> Result<Vec<String>, LucliError> {
    let image = image_reference(config)?;
    let name = container_name(config);
    Ok(vec![
        "run".to_string(),
        "--detach".to_string(),
        "--name".to_string(),
        name,
        "--publish".to_string(),
        format!("{}:8080", config.port),
        "--volume".to_string(),
        format!("{}:/var/www", config.webroot.display()),
        "--volume".to_string(),
        format!("{}:/usr/local/tomcat/conf", base_dir.join("conf").display()),
        image,
    ])
}

/// Materialize an instance base directory using the container-engine
/// strategy: no servlet-container files are copied locally (the image
/// supplies them), but the common layout and server.xml/web.xml overlays
/// are still produced so `conf/` can be bind-mounted into the container.
pub fn provision(config: &ServerConfig, base_dir: &Path, force: bool) -> Result<bool, LucliError> {
    if !base::prepare_for_build(base_dir, force)? {
        return Ok(false);
    }
    image_reference(config)?;

    let mut conditions = std::collections::BTreeMap::new();
    conditions.insert("AJP_ENABLED".to_string(), config.ajp.enabled);
    conditions.insert("HTTPS_ENABLED".to_string(), config.https.enabled);
    let filtered =
        lucli_template::apply_conditionals(crate::server_xml::DEFAULT_SERVER_XML_TEMPLATE, &conditions)?;
    let patches = crate::server_xml::patches_for(config, &config.name);
    let rendered = crate::server_xml::patch(&filtered, &patches)?;
    let server_xml_path = base_dir.join("conf/server.xml");
    let tmp = server_xml_path.with_extension("xml.tmp");
    std::fs::write(&tmp, rendered)?;
    std::fs::rename(&tmp, &server_xml_path)?;

    crate::web_xml::render(config, crate::web_xml::DEFAULT_TEMPLATE, &base_dir.join("conf/web.xml"))?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(image: Option<&str>) -> ServerConfig {
        let mut cfg: ServerConfig = serde_json::from_value(serde_json::json!({
            "name": "myapp",
            "webroot": ".",
            "port": 8001,
        }))
        .unwrap();
        cfg.runtime.image = image.map(|s| s.to_string());
        cfg
    }

    #[test]
    fn image_reference_defaults_tag_to_latest() {
        let cfg = config(Some("lucee/lucee"));
        assert_eq!(image_reference(&cfg).unwrap(), "lucee/lucee:latest");
    }

    #[test]
    fn image_reference_errors_without_image() {
        let cfg = config(None);
        assert!(image_reference(&cfg).is_err());
    }

    #[test]
    fn container_name_defaults_to_lucli_prefixed_instance_name() {
        let cfg = config(Some("lucee/lucee"));
        assert_eq!(container_name(&cfg), "lucli-myapp");
    }

    #[test]
    fn container_name_respects_override() {
        let mut cfg = config(Some("lucee/lucee"));
        cfg.runtime.container_name = Some("custom".to_string());
        assert_eq!(container_name(&cfg), "custom");
    }

    #[test]
    fn run_args_maps_configured_port() {
        let td = tempfile::tempdir().unwrap();
        let cfg = config(Some("lucee/lucee"));
        let args = run_args(&cfg, td.path()).unwrap();
        assert!(args.iter().any(|a| a == "8001:8080"));
    }
}
