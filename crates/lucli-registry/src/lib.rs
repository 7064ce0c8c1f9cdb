//! Instance registry (§4.4, C9).
//!
//! Enumerates `{lucliHome}/servers/*`; each subdirectory is one instance's
//! base directory, carrying a `metadata.json` with the persisted
//! [`ServerInstance`] record alongside the PID file, conf, lib, and logs
//! that `lucli-provision`/`lucli-process` manage. The registry itself only
//! reads and writes that metadata and asks `lucli-process` for liveness —
//! it holds no live process handles, only PID + probe "weak references"
//! (§9).

use std::fs;
use std::path::{Path, PathBuf};

use lucli_types::{InstanceStatus, LucliError, ServerInstance};

/// Name of the metadata file within an instance's base directory.
pub const METADATA_FILE_NAME: &str = "metadata.json";

/// How long a PID file may go unconfirmed by the OS process table before
/// it's no longer treated as a live instance for freshness-fallback
/// purposes (§4.4).
pub const FRESHNESS_WINDOW: std::time::Duration = std::time::Duration::from_secs(120);

/// An enumerated instance plus its computed liveness.
#[derive(Debug, Clone)]
pub struct InstanceRecord {
    pub instance: ServerInstance,
    pub status: InstanceStatus,
}

/// The registry of provisioned instances, rooted at `{lucliHome}/servers`.
pub struct Registry {
    lucli_home: PathBuf,
}

impl Registry {
    pub fn new(lucli_home: impl Into<PathBuf>) -> Self {
        Self {
            lucli_home: lucli_home.into(),
        }
    }

    pub fn servers_dir(&self) -> PathBuf {
        self.lucli_home.join("servers")
    }

    pub fn base_dir(&self, name: &str) -> PathBuf {
        self.servers_dir().join(name)
    }

    fn metadata_path(&self, name: &str) -> PathBuf {
        self.base_dir(name).join(METADATA_FILE_NAME)
    }

    /// Persist (or update) an instance's metadata, atomically.
    pub fn save_instance(&self, instance: &ServerInstance) -> Result<(), LucliError> {
        let base_dir = self.base_dir(&instance.name);
        fs::create_dir_all(&base_dir)?;
        let path = self.metadata_path(&instance.name);
        let content = serde_json::to_string_pretty(instance)?;
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, content)?;
        fs::rename(&tmp_path, &path)?;
        Ok(())
    }

    /// Read one instance's metadata by name, if it has ever been provisioned.
    pub fn load_instance(&self, name: &str) -> Result<Option<ServerInstance>, LucliError> {
        let path = self.metadata_path(name);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)?;
        let instance: ServerInstance = serde_json::from_str(&content).map_err(LucliError::Json)?;
        Ok(Some(instance))
    }

    fn compute_status(&self, instance: &ServerInstance) -> InstanceStatus {
        let port = instance.port.unwrap_or(0);
        if port == 0 {
            return InstanceStatus::Stopped;
        }
        if lucli_process::is_live(&instance.base_dir, "127.0.0.1", port, FRESHNESS_WINDOW) {
            InstanceStatus::Running
        } else {
            InstanceStatus::Stopped
        }
    }

    /// Enumerate every known instance, with freshly-computed liveness.
    /// Subdirectories with no readable metadata are skipped, not fatal —
    /// a corrupt or half-written registry entry shouldn't break `list`.
    pub fn list(&self) -> Result<Vec<InstanceRecord>, LucliError> {
        let dir = self.servers_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            match self.load_instance(&name) {
                Ok(Some(instance)) => {
                    let status = self.compute_status(&instance);
                    out.push(InstanceRecord { instance, status });
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(instance = %name, error = %e, "skipping unreadable registry entry");
                }
            }
        }
        out.sort_by(|a, b| a.instance.name.cmp(&b.instance.name));
        Ok(out)
    }

    /// The instance whose recorded webroot matches `cwd`. If more than one
    /// matches, the most recently started wins (§4.4).
    pub fn for_cwd(&self, cwd: &Path) -> Result<Option<InstanceRecord>, LucliError> {
        let canonical_cwd = cwd.canonicalize().unwrap_or_else(|_| cwd.to_path_buf());
        let mut matches: Vec<InstanceRecord> = self
            .list()?
            .into_iter()
            .filter(|r| {
                r.instance
                    .webroot
                    .canonicalize()
                    .unwrap_or_else(|_| r.instance.webroot.clone())
                    == canonical_cwd
            })
            .collect();
        matches.sort_by_key(|r| r.instance.updated_at);
        Ok(matches.pop())
    }

    /// Remove one instance's registry entry and base directory. Refuses
    /// while it is live unless `force` is set.
    pub fn remove(&self, name: &str, force: bool) -> Result<(), LucliError> {
        let Some(instance) = self.load_instance(name)? else {
            return Ok(());
        };
        if !force && self.compute_status(&instance) == InstanceStatus::Running {
            return Err(LucliError::AlreadyRunning(name.to_string()));
        }
        let base_dir = self.base_dir(name);
        if base_dir.exists() {
            fs::remove_dir_all(&base_dir)?;
        }
        Ok(())
    }

    /// Remove every non-live instance (§4.4 `prune --all`).
    pub fn prune_all(&self, force: bool) -> Result<Vec<String>, LucliError> {
        let mut pruned = Vec::new();
        for record in self.list()? {
            if record.status == InstanceStatus::Stopped {
                self.remove(&record.instance.name, true)?;
                pruned.push(record.instance.name);
            }
        }
        let _ = force; // interactive confirmation is a front-end concern (§4.4)
        Ok(pruned)
    }

    /// Prune a single non-live instance by name (default `prune` scope).
    pub fn prune_one(&self, name: &str) -> Result<bool, LucliError> {
        let Some(instance) = self.load_instance(name)? else {
            return Ok(false);
        };
        if self.compute_status(&instance) == InstanceStatus::Running {
            return Ok(false);
        }
        self.remove(name, true)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn instance(name: &str, webroot: &Path, base_dir: &Path) -> ServerInstance {
        ServerInstance {
            name: name.to_string(),
            base_dir: base_dir.to_path_buf(),
            webroot: webroot.to_path_buf(),
            pid: None,
            port: None,
            environment: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn save_then_load_roundtrips() {
        let td = tempfile::tempdir().unwrap();
        let registry = Registry::new(td.path());
        let base_dir = registry.base_dir("app");
        let inst = instance("app", td.path(), &base_dir);
        registry.save_instance(&inst).unwrap();

        let loaded = registry.load_instance("app").unwrap().unwrap();
        assert_eq!(loaded.name, "app");
    }

    #[test]
    fn load_missing_instance_is_none() {
        let td = tempfile::tempdir().unwrap();
        let registry = Registry::new(td.path());
        assert!(registry.load_instance("nope").unwrap().is_none());
    }

    #[test]
    fn list_is_empty_when_no_servers_dir() {
        let td = tempfile::tempdir().unwrap();
        let registry = Registry::new(td.path());
        assert!(registry.list().unwrap().is_empty());
    }

    #[test]
    fn list_includes_saved_instances_as_stopped_without_port() {
        let td = tempfile::tempdir().unwrap();
        let registry = Registry::new(td.path());
        let base_dir = registry.base_dir("app");
        registry.save_instance(&instance("app", td.path(), &base_dir)).unwrap();

        let records = registry.list().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, InstanceStatus::Stopped);
    }

    #[test]
    fn for_cwd_matches_recorded_webroot() {
        let td = tempfile::tempdir().unwrap();
        let registry = Registry::new(td.path());
        let webroot = td.path().join("project");
        std::fs::create_dir_all(&webroot).unwrap();
        let base_dir = registry.base_dir("app");
        registry.save_instance(&instance("app", &webroot, &base_dir)).unwrap();

        let found = registry.for_cwd(&webroot).unwrap().unwrap();
        assert_eq!(found.instance.name, "app");
    }

    #[test]
    fn for_cwd_returns_none_when_no_match() {
        let td = tempfile::tempdir().unwrap();
        let registry = Registry::new(td.path());
        assert!(registry.for_cwd(td.path()).unwrap().is_none());
    }

    #[test]
    fn prune_one_removes_non_live_instance() {
        let td = tempfile::tempdir().unwrap();
        let registry = Registry::new(td.path());
        let base_dir = registry.base_dir("app");
        registry.save_instance(&instance("app", td.path(), &base_dir)).unwrap();

        assert!(registry.prune_one("app").unwrap());
        assert!(registry.load_instance("app").unwrap().is_none());
    }

    #[test]
    fn prune_one_missing_instance_is_false() {
        let td = tempfile::tempdir().unwrap();
        let registry = Registry::new(td.path());
        assert!(!registry.prune_one("ghost").unwrap());
    }

    #[test]
    fn prune_all_removes_every_non_live_instance() {
        let td = tempfile::tempdir().unwrap();
        let registry = Registry::new(td.path());
        for name in ["a", "b"] {
            let base_dir = registry.base_dir(name);
            registry.save_instance(&instance(name, td.path(), &base_dir)).unwrap();
        }
        let pruned = registry.prune_all(true).unwrap();
        assert_eq!(pruned.len(), 2);
        assert!(registry.list().unwrap().is_empty());
    }
}
