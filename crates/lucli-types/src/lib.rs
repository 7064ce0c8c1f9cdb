//! Core domain types shared across LuCLI crates.
//!
//! This crate defines the resolved configuration model ([`ServerConfig`]),
//! the persisted instance record ([`ServerInstance`]), the daemon wire
//! types, and the single error enum ([`LucliError`]) that every LuCLI
//! crate funnels user-facing failures through.
//!
//! Individual feature blocks (monitoring, JVM, URL rewrite, admin, HTTPS,
//! AJP, agents) are modeled as small records with an `enabled` flag, per
//! spec. The opaque `configuration` sub-tree passed through to the
//! engine's own configuration file is kept as [`serde_json::Value`] since
//! LuCLI never interprets it.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Resolved, fully-substituted configuration for one instance.
///
/// Constructed at command dispatch by the configuration loader, mutated
/// only by the deep-merge and placeholder substitution passes, then
/// frozen and passed down by value (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Derived as `port + 1000` when not explicitly set; see [`ServerConfig::resolve_shutdown_port`].
    #[serde(default)]
    pub shutdown_port: Option<u16>,
    pub webroot: PathBuf,
    #[serde(default)]
    pub open_browser: bool,
    #[serde(default)]
    pub open_browser_url: Option<String>,
    #[serde(default)]
    pub configuration_file: Option<String>,
    #[serde(default)]
    pub runtime: RuntimeSelector,
    #[serde(default)]
    pub jvm: JvmConfig,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
    #[serde(default)]
    pub url_rewrite: UrlRewriteConfig,
    #[serde(default)]
    pub admin: AdminConfig,
    #[serde(default)]
    pub https: HttpsConfig,
    #[serde(default)]
    pub ajp: AjpConfig,
    #[serde(default)]
    pub agents: BTreeMap<String, AgentConfig>,
    /// Opaque sub-tree handed verbatim to the engine's own configuration file.
    #[serde(default)]
    pub configuration: serde_json::Value,
    #[serde(default)]
    pub dependencies: BTreeMap<String, DependencySpec>,
    #[serde(default)]
    pub dev_dependencies: BTreeMap<String, DependencySpec>,
    /// Environment override trees, applied by the loader before substitution.
    #[serde(default)]
    pub environments: BTreeMap<String, serde_json::Value>,
    /// Name of the environment applied to produce this config, if any.
    #[serde(default)]
    pub active_environment: Option<String>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8888
}

impl ServerConfig {
    /// The derived shutdown port: explicit value, else `port + 1000`.
    pub fn resolve_shutdown_port(&self) -> u16 {
        self.shutdown_port.unwrap_or_else(|| self.port.saturating_add(1000))
    }

    /// Validate the invariants from spec.md §3 / §8 boundary behaviors.
    pub fn validate(&self) -> Result<(), LucliError> {
        if self.name.is_empty() || self.name.contains('/') || self.name.contains("..") {
            return Err(LucliError::config_invalid(format!(
                "server name {:?} is empty or not path-safe",
                self.name
            )));
        }
        if self.port == 0 {
            return Err(LucliError::config_invalid("port must be a positive integer"));
        }
        let shutdown = self.resolve_shutdown_port();
        if shutdown == self.port {
            return Err(LucliError::config_invalid(
                "shutdownPort must differ from port",
            ));
        }
        let mut ports = vec![("port", self.port), ("shutdownPort", shutdown)];
        if self.https.enabled {
            if let Some(p) = self.https.port {
                ports.push(("https.port", p));
            }
        }
        if self.ajp.enabled {
            if let Some(p) = self.ajp.port {
                ports.push(("ajp.port", p));
            }
        }
        if self.monitoring.jmx.enabled {
            if let Some(p) = self.monitoring.jmx.port {
                ports.push(("monitoring.jmx.port", p));
            }
        }
        for i in 0..ports.len() {
            for j in (i + 1)..ports.len() {
                if ports[i].1 == ports[j].1 {
                    return Err(LucliError::config_invalid(format!(
                        "{} and {} both resolve to port {}",
                        ports[i].0, ports[j].0, ports[i].1
                    )));
                }
            }
        }
        if !self.webroot.exists() {
            return Err(LucliError::config_invalid(format!(
                "webroot {} does not exist",
                self.webroot.display()
            )));
        }
        Ok(())
    }
}

/// Which of the three provider strategies materializes this instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeType {
    #[default]
    Embedded,
    External,
    Container,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeSelector {
    #[serde(default)]
    pub r#type: RuntimeType,
    #[serde(default)]
    pub variant: Option<String>,
    #[serde(default)]
    pub catalina_home: Option<PathBuf>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub container_name: Option<String>,
    #[serde(default)]
    pub shared: bool,
    #[serde(default)]
    pub run_mode: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JvmConfig {
    #[serde(default = "default_max_memory")]
    pub max_memory: String,
    #[serde(default = "default_min_memory")]
    pub min_memory: String,
    #[serde(default)]
    pub additional_args: Vec<String>,
}

fn default_max_memory() -> String {
    "512m".to_string()
}
fn default_min_memory() -> String {
    "128m".to_string()
}

impl Default for JvmConfig {
    fn default() -> Self {
        Self {
            max_memory: default_max_memory(),
            min_memory: default_min_memory(),
            additional_args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub jmx: JmxConfig,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            jmx: JmxConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JmxConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub port: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UrlRewriteConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_router_file")]
    pub router_file: String,
}

fn default_router_file() -> String {
    "index.cfm".to_string()
}

impl Default for UrlRewriteConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            router_file: default_router_file(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub password: Option<String>,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            password: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub redirect: bool,
    #[serde(default)]
    pub keystore: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AjpConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub jvm_args: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
}

fn default_true() -> bool {
    true
}

/// One project dependency declaration (§4.5).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencySpec {
    pub source: DependencySource,
    /// `git` URL, `file` path, or package/extension name, depending on source.
    pub location: String,
    #[serde(default)]
    pub r#ref: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub sub_path: Option<String>,
    #[serde(default)]
    pub install_path: Option<String>,
    #[serde(default)]
    pub mapping: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DependencySource {
    Git,
    File,
    PackageRegistry,
    Extension,
}

/// The persisted record of one provisioned server (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInstance {
    pub name: String,
    pub base_dir: PathBuf,
    pub webroot: PathBuf,
    #[serde(default)]
    pub pid: Option<u32>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub environment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Liveness as observed by the supervisor (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    Running,
    Stopped,
}

/// A non-fatal issue surfaced alongside a command result (SPEC_FULL ambient stack).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Warning {
    pub message: String,
}

impl Warning {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// One line of the daemon's request/response protocol (§4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonRequest {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub argv: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DaemonResponse {
    #[serde(default)]
    pub id: Option<String>,
    pub exit_code: i32,
    pub output: String,
}

/// Error kinds callers must distinguish (§7), each with the exit code it maps to (§6).
#[derive(Debug, thiserror::Error)]
pub enum LucliError {
    #[error("configuration not found: {0}")]
    ConfigNotFound(String),

    #[error("configuration invalid: {0}")]
    ConfigInvalid(String),

    #[error("unknown environment {requested:?}; available: {available:?}")]
    EnvironmentUnknown {
        requested: String,
        available: Vec<String>,
    },

    #[error("placeholder {path} could not be resolved: ${{{name}}}")]
    PlaceholderUnresolved { path: String, name: String },

    #[error("secret store is locked: {0}")]
    SecretStoreLocked(String),

    #[error("secret store is corrupt: {0}")]
    SecretStoreCorrupt(String),

    #[error("secret not found: {0}")]
    SecretNotFound(String),

    #[error("runtime misconfigured: {0}")]
    RuntimeMisconfigured(String),

    #[error("instance {0} is already running")]
    AlreadyRunning(String),

    #[error("instance {0} is not running")]
    NotRunning(String),

    #[error("instance {0} did not become ready within the configured timeout")]
    StartTimeout(String),

    #[error("another LuCLI process holds the lock for {0}")]
    LockConflict(String),

    #[error("failed to fetch dependency {0}")]
    DependencyFetchFailed(String),

    #[error("dependency {name} failed integrity verification: expected {expected}, got {actual}")]
    DependencyIntegrityMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("usage error: {0}")]
    Usage(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("interrupted")]
    Interrupted,
}

impl LucliError {
    pub fn config_invalid(msg: impl Into<String>) -> Self {
        LucliError::ConfigInvalid(msg.into())
    }

    /// Exit code mapping from spec.md §6.
    pub fn exit_code(&self) -> i32 {
        match self {
            LucliError::Usage(_) => 2,
            LucliError::ConfigNotFound(_)
            | LucliError::ConfigInvalid(_)
            | LucliError::EnvironmentUnknown { .. }
            | LucliError::PlaceholderUnresolved { .. } => 3,
            LucliError::RuntimeMisconfigured(_) => 4,
            LucliError::SecretStoreLocked(_)
            | LucliError::SecretStoreCorrupt(_)
            | LucliError::SecretNotFound(_)
            | LucliError::AlreadyRunning(_)
            | LucliError::NotRunning(_)
            | LucliError::StartTimeout(_)
            | LucliError::LockConflict(_) => 5,
            LucliError::DependencyFetchFailed(_) | LucliError::DependencyIntegrityMismatch { .. } => 1,
            LucliError::Interrupted => 130,
            LucliError::Io(_) | LucliError::Json(_) => 1,
        }
    }

    /// A short operator-facing remedy, if one is known for this kind.
    pub fn remedy(&self) -> Option<String> {
        match self {
            LucliError::SecretStoreLocked(_) => {
                Some("run `lucli secrets init` to set up the secret store".to_string())
            }
            LucliError::EnvironmentUnknown { available, .. } => Some(format!(
                "available environments: {}",
                available.join(", ")
            )),
            LucliError::AlreadyRunning(name) => {
                Some(format!("run `lucli server stop {name}` first"))
            }
            LucliError::NotRunning(name) => {
                Some(format!("run `lucli server start {name}` first"))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shutdown_port_defaults_to_port_plus_1000() {
        let cfg = ServerConfig {
            name: "x".into(),
            version: String::new(),
            host: default_host(),
            port: 8001,
            shutdown_port: None,
            webroot: PathBuf::from("."),
            open_browser: false,
            open_browser_url: None,
            configuration_file: None,
            runtime: RuntimeSelector::default(),
            jvm: JvmConfig::default(),
            monitoring: MonitoringConfig::default(),
            url_rewrite: UrlRewriteConfig::default(),
            admin: AdminConfig::default(),
            https: HttpsConfig::default(),
            ajp: AjpConfig::default(),
            agents: BTreeMap::new(),
            configuration: serde_json::Value::Null,
            dependencies: BTreeMap::new(),
            dev_dependencies: BTreeMap::new(),
            environments: BTreeMap::new(),
            active_environment: None,
        };
        assert_eq!(cfg.resolve_shutdown_port(), 9001);
    }

    #[test]
    fn validate_rejects_path_unsafe_name() {
        let td = tempfile::tempdir().unwrap();
        let cfg = ServerConfig {
            name: "../evil".into(),
            version: String::new(),
            host: default_host(),
            port: 8080,
            shutdown_port: None,
            webroot: td.path().to_path_buf(),
            open_browser: false,
            open_browser_url: None,
            configuration_file: None,
            runtime: RuntimeSelector::default(),
            jvm: JvmConfig::default(),
            monitoring: MonitoringConfig::default(),
            url_rewrite: UrlRewriteConfig::default(),
            admin: AdminConfig::default(),
            https: HttpsConfig::default(),
            ajp: AjpConfig::default(),
            agents: BTreeMap::new(),
            configuration: serde_json::Value::Null,
            dependencies: BTreeMap::new(),
            dev_dependencies: BTreeMap::new(),
            environments: BTreeMap::new(),
            active_environment: None,
        };
        assert!(matches!(cfg.validate(), Err(LucliError::ConfigInvalid(_))));
    }

    #[test]
    fn validate_rejects_colliding_ports() {
        let td = tempfile::tempdir().unwrap();
        let mut cfg = ServerConfig {
            name: "app".into(),
            version: String::new(),
            host: default_host(),
            port: 8080,
            shutdown_port: Some(8080),
            webroot: td.path().to_path_buf(),
            open_browser: false,
            open_browser_url: None,
            configuration_file: None,
            runtime: RuntimeSelector::default(),
            jvm: JvmConfig::default(),
            monitoring: MonitoringConfig::default(),
            url_rewrite: UrlRewriteConfig::default(),
            admin: AdminConfig::default(),
            https: HttpsConfig::default(),
            ajp: AjpConfig::default(),
            agents: BTreeMap::new(),
            configuration: serde_json::Value::Null,
            dependencies: BTreeMap::new(),
            dev_dependencies: BTreeMap::new(),
            environments: BTreeMap::new(),
            active_environment: None,
        };
        assert!(cfg.validate().is_err());
        cfg.shutdown_port = None;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn error_exit_codes_match_spec() {
        assert_eq!(LucliError::Usage("x".into()).exit_code(), 2);
        assert_eq!(LucliError::ConfigInvalid("x".into()).exit_code(), 3);
        assert_eq!(LucliError::RuntimeMisconfigured("x".into()).exit_code(), 4);
        assert_eq!(LucliError::AlreadyRunning("x".into()).exit_code(), 5);
        assert_eq!(LucliError::Interrupted.exit_code(), 130);
    }

    #[test]
    fn secret_store_locked_has_remedy() {
        let err = LucliError::SecretStoreLocked("no passphrase".into());
        assert!(err.remedy().unwrap().contains("secrets init"));
    }
}
