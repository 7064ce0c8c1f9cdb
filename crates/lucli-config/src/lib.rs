//! Layered configuration resolution (§4.1, C4).
//!
//! Three JSON layers are deep-merged, lowest precedence first: built-in
//! defaults, the project's `lucee.json`, then (if requested) the matching
//! `environments.{env}` block from that same file. The merged tree is then
//! walked by `lucli-placeholder` to substitute every string field, with a
//! resolver chain of `.env` file, then OS environment, then in-placeholder
//! default, and `${secret:NAME}` routed to the secret store.

use std::path::{Path, PathBuf};

use lucli_placeholder::Resolver;
use lucli_secrets::SecretStore;
use lucli_types::{LucliError, ServerConfig};
use serde_json::Value;

/// Name of the project configuration file, relative to the project directory.
pub const PROJECT_CONFIG_FILE: &str = "lucee.json";

/// Whether `${secret:NAME}` placeholders should be allowed to trigger
/// passphrase acquisition. Read-only inspections never prompt (§4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretAccess {
    /// Resolve secrets, prompting for a passphrase if needed.
    Allowed,
    /// Treat every `${secret:...}` reference as unresolved without prompting.
    Denied,
}

/// Deep-merge `overlay` onto `base`. Nested objects merge recursively;
/// scalars and arrays replace wholesale; an explicit JSON `null` in the
/// overlay removes the corresponding key from the result.
pub fn deep_merge(base: &Value, overlay: &Value) -> Value {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            let mut merged = base_map.clone();
            for (key, overlay_value) in overlay_map {
                if overlay_value.is_null() {
                    merged.remove(key);
                    continue;
                }
                match merged.get(key) {
                    Some(existing) => {
                        merged.insert(key.clone(), deep_merge(existing, overlay_value));
                    }
                    None => {
                        merged.insert(key.clone(), overlay_value.clone());
                    }
                }
            }
            Value::Object(merged)
        }
        (_, overlay) => overlay.clone(),
    }
}

/// Built-in defaults (§4.1 step 1), as a JSON tree keyed the same way as
/// `lucee.json` so it merges with project configuration uniformly.
pub fn builtin_defaults() -> Value {
    serde_json::json!({
        "host": "127.0.0.1",
        "port": 8888,
        "openBrowser": true,
        "jvm": { "maxMemory": "512m", "minMemory": "128m" },
        "monitoring": { "enabled": true },
        "urlRewrite": { "enabled": true, "routerFile": "index.cfm" },
        "admin": { "enabled": true },
    })
}

/// Read and parse `{project_dir}/lucee.json`.
pub fn load_project_file(project_dir: &Path) -> Result<Value, LucliError> {
    let path = project_dir.join(PROJECT_CONFIG_FILE);
    if !path.exists() {
        return Err(LucliError::ConfigNotFound(format!(
            "{} not found in {}",
            PROJECT_CONFIG_FILE,
            project_dir.display()
        )));
    }
    let content = std::fs::read_to_string(&path)?;
    serde_json::from_str(&content).map_err(|e| LucliError::config_invalid(e.to_string()))
}

/// Resolve the environment override layer, if an environment name was
/// requested. A requested-but-absent environment is fatal and lists the
/// available names (§4.1).
fn resolve_environment_layer(project: &Value, environment: Option<&str>) -> Result<Value, LucliError> {
    let Some(env_name) = environment else {
        return Ok(Value::Null);
    };
    let environments = project.get("environments").and_then(Value::as_object);
    let layer = environments.and_then(|envs| envs.get(env_name));
    match layer {
        Some(layer) => Ok(layer.clone()),
        None => {
            let available = environments
                .map(|envs| envs.keys().cloned().collect())
                .unwrap_or_default();
            Err(LucliError::EnvironmentUnknown {
                requested: env_name.to_string(),
                available,
            })
        }
    }
}

/// A resolver composing `.env`, OS environment, and (optionally) the
/// secret store, per the precedence in §4.1.
struct ChainResolver<'a> {
    dotenv: &'a lucli_dotenv::DotEnv,
    secrets: Option<&'a SecretStore>,
    secret_access: SecretAccess,
}

impl Resolver for ChainResolver<'_> {
    fn resolve_env(&self, name: &str) -> Option<String> {
        self.dotenv
            .get(name)
            .map(str::to_string)
            .or_else(|| std::env::var(name).ok())
    }

    fn resolve_secret(&self, name: &str) -> Result<Option<String>, LucliError> {
        if self.secret_access == SecretAccess::Denied {
            return Ok(None);
        }
        match self.secrets {
            Some(store) => match store.get(name) {
                Ok(value) => Ok(Some(value)),
                Err(LucliError::SecretNotFound(_)) => Ok(None),
                Err(other) => Err(other),
            },
            None => Ok(None),
        }
    }
}

/// Load, merge, and substitute a project's configuration into a frozen
/// [`ServerConfig`]. `secrets` is the already-open store (or `None` if one
/// hasn't been opened/isn't needed); `secret_access` governs whether
/// `${secret:...}` references are allowed to resolve at all.
pub fn load(
    project_dir: &Path,
    environment: Option<&str>,
    secrets: Option<&SecretStore>,
    secret_access: SecretAccess,
) -> Result<(ServerConfig, Vec<lucli_types::Warning>), LucliError> {
    let project = load_project_file(project_dir)?;
    let env_layer = resolve_environment_layer(&project, environment)?;

    let merged = deep_merge(&builtin_defaults(), &project);
    let merged = deep_merge(&merged, &env_layer);

    let dotenv = lucli_dotenv::load(project_dir)?;
    let mut warnings = dotenv.warnings.clone();

    let resolver = ChainResolver {
        dotenv: &dotenv,
        secrets,
        secret_access,
    };
    let substituted = lucli_placeholder::substitute_value("", &merged, &resolver)?;

    let mut config: ServerConfig = serde_json::from_value(substituted)
        .map_err(|e| LucliError::config_invalid(e.to_string()))?;
    config.webroot = resolve_webroot(project_dir, &config.webroot);
    config.active_environment = environment.map(str::to_string);

    config.validate()?;

    warnings.extend(collect_unknown_field_warnings(&project));
    Ok((config, warnings))
}

fn resolve_webroot(project_dir: &Path, webroot: &Path) -> PathBuf {
    if webroot.as_os_str().is_empty() {
        project_dir.to_path_buf()
    } else if webroot.is_absolute() {
        webroot.to_path_buf()
    } else {
        project_dir.join(webroot)
    }
}

/// Placeholder for forward-compatible schema warnings; currently a no-op,
/// kept as the single seam future unknown-key detection would hook into.
fn collect_unknown_field_warnings(_project: &Value) -> Vec<lucli_types::Warning> {
    Vec::new()
}

/// Persist the applied environment name to `{base_dir}/.environment` (§4.1).
pub fn write_environment_marker(base_dir: &Path, environment: Option<&str>) -> Result<(), LucliError> {
    let path = base_dir.join(".environment");
    match environment {
        Some(name) => std::fs::write(path, name)?,
        None => {
            if path.exists() {
                std::fs::remove_file(path)?;
            }
        }
    }
    Ok(())
}

/// Read the persisted environment marker, if any.
pub fn read_environment_marker(base_dir: &Path) -> Option<String> {
    std::fs::read_to_string(base_dir.join(".environment"))
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn write_project(dir: &Path, json: &Value) {
        std::fs::write(dir.join(PROJECT_CONFIG_FILE), serde_json::to_string(json).unwrap()).unwrap();
    }

    #[test]
    fn deep_merge_recurses_into_nested_objects() {
        let base = serde_json::json!({"jvm": {"maxMemory": "512m", "minMemory": "128m"}});
        let overlay = serde_json::json!({"jvm": {"maxMemory": "1g"}});
        let merged = deep_merge(&base, &overlay);
        assert_eq!(merged["jvm"]["maxMemory"], "1g");
        assert_eq!(merged["jvm"]["minMemory"], "128m");
    }

    #[test]
    fn deep_merge_replaces_arrays_wholesale() {
        let base = serde_json::json!({"args": ["a", "b"]});
        let overlay = serde_json::json!({"args": ["c"]});
        let merged = deep_merge(&base, &overlay);
        assert_eq!(merged["args"], serde_json::json!(["c"]));
    }

    #[test]
    fn deep_merge_null_removes_key() {
        let base = serde_json::json!({"admin": {"password": "x"}});
        let overlay = serde_json::json!({"admin": {"password": null}});
        let merged = deep_merge(&base, &overlay);
        assert!(merged["admin"].get("password").is_none());
    }

    #[test]
    fn missing_lucee_json_is_config_not_found() {
        let td = tempfile::tempdir().unwrap();
        assert!(matches!(
            load_project_file(td.path()),
            Err(LucliError::ConfigNotFound(_))
        ));
    }

    #[test]
    fn requested_unknown_environment_lists_available_names() {
        let td = tempfile::tempdir().unwrap();
        write_project(
            td.path(),
            &serde_json::json!({
                "name": "app", "webroot": ".",
                "environments": {"dev": {}, "prod": {}}
            }),
        );
        let project = load_project_file(td.path()).unwrap();
        let err = resolve_environment_layer(&project, Some("staging")).unwrap_err();
        match err {
            LucliError::EnvironmentUnknown { available, .. } => {
                assert_eq!(available.len(), 2);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    #[serial]
    fn load_resolves_env_placeholder_from_os_environment() {
        let td = tempfile::tempdir().unwrap();
        write_project(
            td.path(),
            &serde_json::json!({"name": "app", "webroot": ".", "host": "${APP_HOST}"}),
        );
        temp_env::with_var("APP_HOST", Some("db.internal"), || {
            let (config, _warnings) =
                load(td.path(), None, None, SecretAccess::Denied).unwrap();
            assert_eq!(config.host, "db.internal");
        });
    }

    #[test]
    fn load_applies_environment_override_layer() {
        let td = tempfile::tempdir().unwrap();
        write_project(
            td.path(),
            &serde_json::json!({
                "name": "app", "webroot": ".", "port": 8888,
                "environments": {"prod": {"port": 9999}}
            }),
        );
        let (config, _) = load(td.path(), Some("prod"), None, SecretAccess::Denied).unwrap();
        assert_eq!(config.port, 9999);
        assert_eq!(config.active_environment.as_deref(), Some("prod"));
    }

    #[test]
    fn secret_access_denied_fails_even_when_store_present() {
        let td = tempfile::tempdir().unwrap();
        write_project(
            td.path(),
            &serde_json::json!({"name": "app", "webroot": ".", "admin": {"password": "${secret:db.password}"}}),
        );
        let store = SecretStore::init(td.path(), "pw", false).unwrap();
        let err = load(td.path(), None, Some(&store), SecretAccess::Denied).unwrap_err();
        assert!(matches!(err, LucliError::PlaceholderUnresolved { .. }));
    }

    #[test]
    fn secret_access_allowed_resolves_from_open_store() {
        let td = tempfile::tempdir().unwrap();
        write_project(
            td.path(),
            &serde_json::json!({"name": "app", "webroot": ".", "admin": {"password": "${secret:db.password}"}}),
        );
        let mut store = SecretStore::init(td.path(), "pw", false).unwrap();
        store.set("db.password", "hunter2", None).unwrap();
        let (config, _) = load(td.path(), None, Some(&store), SecretAccess::Allowed).unwrap();
        assert_eq!(config.admin.password.as_deref(), Some("hunter2"));
    }

    #[test]
    fn environment_marker_roundtrips() {
        let td = tempfile::tempdir().unwrap();
        write_environment_marker(td.path(), Some("prod")).unwrap();
        assert_eq!(read_environment_marker(td.path()).as_deref(), Some("prod"));
        write_environment_marker(td.path(), None).unwrap();
        assert_eq!(read_environment_marker(td.path()), None);
    }
}
