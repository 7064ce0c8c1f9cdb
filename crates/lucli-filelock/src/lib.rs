//! Advisory file locking for per-instance and per-home-directory
//! serialization (§5).
//!
//! Start/stop/restart for one instance name are serialized by a lock file
//! at `{baseDir}/.lock`; the secret store is serialized by the same
//! mechanism scoped to the LuCLI home directory. The lock file carries
//! the holder's pid, hostname, and acquisition time so a conflicting
//! acquire can report who holds it.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use lucli_types::LucliError;
use serde::{Deserialize, Serialize};

pub const LOCK_FILE_NAME: &str = ".lock";

/// Metadata recorded in the lock file about its holder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    pub pid: u32,
    pub hostname: String,
    pub acquired_at: DateTime<Utc>,
}

/// A held lock; releases automatically on drop.
#[derive(Debug)]
pub struct InstanceLock {
    path: PathBuf,
    released: bool,
}

impl InstanceLock {
    pub fn lock_path(dir: &Path) -> PathBuf {
        dir.join(LOCK_FILE_NAME)
    }

    /// Acquire the lock in `dir`, failing with [`LucliError::LockConflict`]
    /// if another process already holds it.
    pub fn acquire(dir: &Path) -> Result<Self, LucliError> {
        fs::create_dir_all(dir)?;
        let path = Self::lock_path(dir);

        if path.exists() {
            let existing = Self::read_lock_info(dir)?;
            return Err(LucliError::LockConflict(format!(
                "held by pid {} on {} since {}",
                existing.pid, existing.hostname, existing.acquired_at
            )));
        }

        Self::write_lock_info(&path, &Self::current_holder())?;
        Ok(Self { path, released: false })
    }

    /// Acquire the lock, first removing it if it is older than `max_age`.
    /// A LuCLI process that crashed mid-operation leaves a stale lock
    /// behind; this bounds how long that blocks future commands.
    pub fn acquire_with_timeout(dir: &Path, max_age: Duration) -> Result<Self, LucliError> {
        let path = Self::lock_path(dir);
        if path.exists() {
            match Self::read_lock_info(dir) {
                Ok(info) => {
                    let age = Utc::now() - info.acquired_at;
                    if age.num_seconds().unsigned_abs() > max_age.as_secs() {
                        fs::remove_file(&path)?;
                    }
                }
                Err(_) => fs::remove_file(&path)?,
            }
        }
        Self::acquire(dir)
    }

    pub fn is_locked(dir: &Path) -> bool {
        Self::lock_path(dir).exists()
    }

    pub fn read_lock_info(dir: &Path) -> Result<LockInfo, LucliError> {
        let content = fs::read_to_string(Self::lock_path(dir))?;
        serde_json::from_str(&content).map_err(LucliError::Json)
    }

    pub fn release(&mut self) -> Result<(), LucliError> {
        if !self.released && self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        self.released = true;
        Ok(())
    }

    fn current_holder() -> LockInfo {
        LockInfo {
            pid: std::process::id(),
            hostname: gethostname::gethostname().to_string_lossy().to_string(),
            acquired_at: Utc::now(),
        }
    }

    fn write_lock_info(path: &Path, info: &LockInfo) -> Result<(), LucliError> {
        let json = serde_json::to_string_pretty(info)?;
        let tmp_path = path.with_extension("lock.tmp");
        {
            let mut file = File::create(&tmp_path)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, path)?;
        Ok(())
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        let _ = self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_creates_and_release_removes_lock_file() {
        let td = tempfile::tempdir().unwrap();
        let mut lock = InstanceLock::acquire(td.path()).unwrap();
        assert!(InstanceLock::is_locked(td.path()));
        lock.release().unwrap();
        assert!(!InstanceLock::is_locked(td.path()));
    }

    #[test]
    fn second_acquire_is_lock_conflict() {
        let td = tempfile::tempdir().unwrap();
        let _lock = InstanceLock::acquire(td.path()).unwrap();
        assert!(matches!(
            InstanceLock::acquire(td.path()),
            Err(LucliError::LockConflict(_))
        ));
    }

    #[test]
    fn drop_releases_lock() {
        let td = tempfile::tempdir().unwrap();
        {
            let _lock = InstanceLock::acquire(td.path()).unwrap();
            assert!(InstanceLock::is_locked(td.path()));
        }
        assert!(!InstanceLock::is_locked(td.path()));
    }

    #[test]
    fn acquire_with_timeout_clears_stale_lock() {
        let td = tempfile::tempdir().unwrap();
        let stale = LockInfo {
            pid: 999999,
            hostname: "stale-host".into(),
            acquired_at: Utc::now() - chrono::Duration::hours(2),
        };
        std::fs::write(
            InstanceLock::lock_path(td.path()),
            serde_json::to_string(&stale).unwrap(),
        )
        .unwrap();

        let lock = InstanceLock::acquire_with_timeout(td.path(), Duration::from_secs(3600)).unwrap();
        let info = InstanceLock::read_lock_info(td.path()).unwrap();
        assert_eq!(info.pid, std::process::id());
        drop(lock);
    }

    #[test]
    fn acquire_with_timeout_still_conflicts_on_fresh_lock() {
        let td = tempfile::tempdir().unwrap();
        let _lock = InstanceLock::acquire(td.path()).unwrap();
        assert!(InstanceLock::acquire_with_timeout(td.path(), Duration::from_secs(3600)).is_err());
    }
}
