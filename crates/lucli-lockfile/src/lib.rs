//! Content-addressed dependency lock file (§3 `LockFile`, §4.5, C11).
//!
//! The lock file records, per dependency, the resolved identifier (git
//! commit, archive SHA, package version), its install path and mapping
//! prefix, and a SHA-256 hash of the materialized tree. Two installs from
//! the same lock must produce identical hashes (§8 invariant 2); hashing
//! walks the tree in a stable (lexicographic) order so the hash depends
//! only on file contents and relative paths, never on directory iteration
//! order.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use lucli_types::LucliError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Current lock file schema version.
pub const LOCKFILE_VERSION: &str = "lucli.lockfile.v1";

/// Name of the lock file, adjacent to the project configuration (§6).
pub const LOCKFILE_NAME: &str = "lucee-lock.json";

/// One dependency's resolved, materialized state (§3 `LockedDependency`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockedDependency {
    /// Resolved identifier: a git commit SHA, archive SHA, or package version.
    pub resolved: String,
    pub source: lucli_types::DependencySource,
    /// Install path, relative to the webroot.
    pub install_path: String,
    /// Mapping prefix exposed to the engine's configuration.
    pub mapping: String,
    /// SHA-256 of the materialized tree, hex-encoded.
    pub integrity: String,
}

/// Per-environment server-lock metadata: the configuration hash that was
/// applied last time this environment was started, for drift detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerLock {
    pub config_hash: String,
    pub locked_at: DateTime<Utc>,
    pub config_file: String,
}

/// The persisted lock file (§3, §6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockFile {
    #[serde(default = "default_version")]
    pub lockfile_version: String,
    pub generated_at: DateTime<Utc>,
    pub tool_version: String,
    #[serde(default)]
    pub dependencies: BTreeMap<String, LockedDependency>,
    #[serde(default)]
    pub dev_dependencies: BTreeMap<String, LockedDependency>,
    #[serde(default)]
    pub server_locks: BTreeMap<String, ServerLock>,
}

fn default_version() -> String {
    LOCKFILE_VERSION.to_string()
}

impl LockFile {
    pub fn new(tool_version: impl Into<String>) -> Self {
        Self {
            lockfile_version: LOCKFILE_VERSION.to_string(),
            generated_at: Utc::now(),
            tool_version: tool_version.into(),
            dependencies: BTreeMap::new(),
            dev_dependencies: BTreeMap::new(),
            server_locks: BTreeMap::new(),
        }
    }

    pub fn path(project_dir: &Path) -> std::path::PathBuf {
        project_dir.join(LOCKFILE_NAME)
    }

    /// Read and parse a lock file, if one exists.
    pub fn load(project_dir: &Path) -> Result<Option<Self>, LucliError> {
        let path = Self::path(project_dir);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)?;
        let lock: LockFile = serde_json::from_str(&content).map_err(LucliError::Json)?;
        Ok(Some(lock))
    }

    /// Persist the lock file atomically (write-to-temp, rename) so readers
    /// never observe a partially-written JSON document (§5).
    pub fn save(&self, project_dir: &Path) -> Result<(), LucliError> {
        let path = Self::path(project_dir);
        let content = serde_json::to_string_pretty(self)?;
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, content)?;
        std::fs::rename(&tmp_path, &path)?;
        Ok(())
    }

    /// Record (or overwrite) the server-lock metadata for `environment`.
    pub fn set_server_lock(&mut self, environment: &str, config_hash: String, config_file: String) {
        self.server_locks.insert(
            environment.to_string(),
            ServerLock {
                config_hash,
                locked_at: Utc::now(),
                config_file,
            },
        );
    }
}

/// Compute the SHA-256 content hash of a materialized dependency tree.
/// Files are visited in lexicographic path order so the result is
/// independent of filesystem iteration order (§3, §8 invariant 2).
pub fn hash_tree(root: &Path) -> Result<String, LucliError> {
    let mut paths: Vec<_> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| e.path().to_path_buf())
        .collect();
    paths.sort();

    let mut hasher = Sha256::new();
    for path in paths {
        let relative = path.strip_prefix(root).unwrap_or(&path);
        hasher.update(relative.to_string_lossy().replace('\\', "/").as_bytes());
        hasher.update(b"\0");
        let bytes = std::fs::read(&path)?;
        hasher.update(&bytes);
        hasher.update(b"\0");
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Compute a stable hash of a resolved `ServerConfig`, used to detect
/// configuration drift between a locked environment and the current file.
pub fn hash_config(config: &lucli_types::ServerConfig) -> Result<String, LucliError> {
    let canonical = serde_json::to_vec(config)?;
    let mut hasher = Sha256::new();
    hasher.update(&canonical);
    Ok(hex::encode(hasher.finalize()))
}
