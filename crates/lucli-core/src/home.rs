//! LuCLI home resolution (spec.md §6) and its own ambient configuration
//! layer (SPEC_FULL ambient stack): verbosity, locale, and default
//! timeouts, resolved the same layered way as project configuration —
//! built-in defaults, then `{lucliHome}/config.json`, then process
//! environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// The resolved per-user LuCLI home directory.
pub type LucliHome = PathBuf;

/// Resolve the LuCLI home: an explicit override (e.g. a `--home` CLI
/// flag), else `LUCLI_HOME`, else `{userHome}/.lucli`.
pub fn resolve(explicit: Option<&Path>) -> LucliHome {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    if let Ok(value) = std::env::var("LUCLI_HOME") {
        if !value.is_empty() {
            return PathBuf::from(value);
        }
    }
    dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".lucli")
}

fn default_verbosity() -> String {
    "info".to_string()
}
fn default_locale() -> String {
    "en".to_string()
}
fn default_start_timeout() -> String {
    "60s".to_string()
}
fn default_graceful_timeout() -> String {
    "30s".to_string()
}
fn default_force_kill_timeout() -> String {
    "10s".to_string()
}

/// Verbosity, locale, and default timeouts for the tool itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LucliHomeConfig {
    #[serde(default = "default_verbosity")]
    pub verbosity: String,
    #[serde(default = "default_locale")]
    pub locale: String,
    #[serde(default = "default_start_timeout")]
    pub start_timeout: String,
    #[serde(default = "default_graceful_timeout")]
    pub graceful_timeout: String,
    #[serde(default = "default_force_kill_timeout")]
    pub force_kill_timeout: String,
}

impl Default for LucliHomeConfig {
    fn default() -> Self {
        Self {
            verbosity: default_verbosity(),
            locale: default_locale(),
            start_timeout: default_start_timeout(),
            graceful_timeout: default_graceful_timeout(),
            force_kill_timeout: default_force_kill_timeout(),
        }
    }
}

impl LucliHomeConfig {
    /// Load `{lucli_home}/config.json` over the defaults, then apply the
    /// `LUCLI_LOCALE` environment variable (spec.md §6) as the
    /// highest-precedence override.
    pub fn load(lucli_home: &Path) -> Self {
        let mut config = std::fs::read_to_string(lucli_home.join("config.json"))
            .ok()
            .and_then(|content| serde_json::from_str(&content).ok())
            .unwrap_or_default();
        if let Ok(locale) = std::env::var("LUCLI_LOCALE") {
            if !locale.is_empty() {
                config.locale = locale;
            }
        }
        config
    }

    pub fn start_timeout(&self) -> Duration {
        humantime::parse_duration(&self.start_timeout).unwrap_or(Duration::from_secs(60))
    }

    pub fn stop_timeouts(&self) -> lucli_process::StopTimeouts {
        lucli_process::StopTimeouts {
            graceful: humantime::parse_duration(&self.graceful_timeout).unwrap_or(Duration::from_secs(30)),
            force_kill: humantime::parse_duration(&self.force_kill_timeout).unwrap_or(Duration::from_secs(10)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_prefers_explicit_override() {
        let home = resolve(Some(Path::new("/tmp/explicit-home")));
        assert_eq!(home, PathBuf::from("/tmp/explicit-home"));
    }

    #[test]
    #[serial_test::serial]
    fn resolve_falls_back_to_lucli_home_env() {
        temp_env::with_var("LUCLI_HOME", Some("/tmp/env-home"), || {
            assert_eq!(resolve(None), PathBuf::from("/tmp/env-home"));
        });
    }

    #[test]
    fn load_returns_defaults_when_no_config_file() {
        let td = tempfile::tempdir().unwrap();
        let config = LucliHomeConfig::load(td.path());
        assert_eq!(config.verbosity, "info");
        assert_eq!(config.start_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn load_merges_config_file_over_defaults() {
        let td = tempfile::tempdir().unwrap();
        std::fs::write(td.path().join("config.json"), r#"{"verbosity":"debug"}"#).unwrap();
        let config = LucliHomeConfig::load(td.path());
        assert_eq!(config.verbosity, "debug");
        assert_eq!(config.locale, "en");
    }

    #[test]
    #[serial_test::serial]
    fn load_applies_locale_env_override() {
        let td = tempfile::tempdir().unwrap();
        temp_env::with_var("LUCLI_LOCALE", Some("fr"), || {
            assert_eq!(LucliHomeConfig::load(td.path()).locale, "fr");
        });
    }
}
