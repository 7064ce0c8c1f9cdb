//! Encrypted secret store backing `${secret:NAME}` placeholder resolution
//! (§4.6, C3).
//!
//! The store is a single JSON file at `{lucliHome}/secrets/local.json`
//! holding one shared salt and, per secret, a fresh nonce and ciphertext.
//! The derived key is held only for the lifetime of a [`SecretStore`]
//! value and is never written to disk.
//!
//! Serializing mutating access (so two processes never prompt for a
//! passphrase at once) is the caller's responsibility via `lucli-filelock`
//! scoped to the LuCLI home directory; this crate only knows how to read
//! and write the store file itself.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use lucli_encrypt::DerivedKey;
use lucli_types::LucliError;
use serde::{Deserialize, Serialize};

/// Name of the environment variable consulted before prompting (§4.6).
pub const PASSPHRASE_ENV_VAR: &str = "LUCLI_SECRETS_PASSPHRASE";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SecretEntry {
    nonce: String,
    ciphertext: String,
    #[serde(default)]
    description: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SecretStoreFile {
    salt: String,
    #[serde(default)]
    secrets: BTreeMap<String, SecretEntry>,
}

/// A summary line for `secrets list` — name and description only, values
/// are never emitted by this operation (§4.6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretSummary {
    pub name: String,
    pub description: Option<String>,
}

/// An open secret store, with its key already derived from the passphrase.
pub struct SecretStore {
    path: PathBuf,
    file: SecretStoreFile,
    key: DerivedKey,
}

impl SecretStore {
    fn store_path(lucli_home: &Path) -> PathBuf {
        lucli_home.join("secrets").join("local.json")
    }

    /// Create a fresh, empty store at `{lucli_home}/secrets/local.json`.
    /// If `reset` is false and a store already exists, this fails; callers
    /// wanting "create if absent" semantics should check existence first.
    pub fn init(lucli_home: &Path, passphrase: &str, reset: bool) -> Result<Self, LucliError> {
        let path = Self::store_path(lucli_home);
        if path.exists() && !reset {
            return Err(LucliError::ConfigInvalid(format!(
                "secret store already exists at {}; pass reset to recreate it",
                path.display()
            )));
        }

        let salt = lucli_encrypt::generate_salt();
        let key = lucli_encrypt::derive_key(passphrase, &salt);
        let file = SecretStoreFile {
            salt: BASE64.encode(salt),
            secrets: BTreeMap::new(),
        };

        let store = SecretStore { path, file, key };
        store.persist()?;
        Ok(store)
    }

    /// Open an existing store, deriving the key from `passphrase`. The
    /// passphrase is not actually verified until the first [`Self::get`];
    /// a wrong passphrase surfaces then as an authentication-tag failure.
    pub fn open(lucli_home: &Path, passphrase: &str) -> Result<Self, LucliError> {
        let path = Self::store_path(lucli_home);
        if !path.exists() {
            return Err(LucliError::SecretStoreLocked(format!(
                "no secret store at {}",
                path.display()
            )));
        }
        let content = std::fs::read_to_string(&path)?;
        let file: SecretStoreFile = serde_json::from_str(&content)
            .map_err(|e| LucliError::SecretStoreCorrupt(e.to_string()))?;
        let salt = BASE64
            .decode(&file.salt)
            .map_err(|e| LucliError::SecretStoreCorrupt(e.to_string()))?;
        let key = lucli_encrypt::derive_key(passphrase, &salt);
        Ok(SecretStore { path, file, key })
    }

    /// Whether a store exists at this home directory yet.
    pub fn exists(lucli_home: &Path) -> bool {
        Self::store_path(lucli_home).exists()
    }

    /// Set (or update) a secret's value. `createdAt` is preserved across
    /// updates; `updatedAt` is always refreshed.
    pub fn set(&mut self, name: &str, value: &str, description: Option<String>) -> Result<(), LucliError> {
        let (nonce, ciphertext) = lucli_encrypt::seal(&self.key, value.as_bytes())
            .map_err(|e| LucliError::SecretStoreCorrupt(e.to_string()))?;
        let now = Utc::now();
        let created_at = self
            .file
            .secrets
            .get(name)
            .map(|e| e.created_at)
            .unwrap_or(now);

        self.file.secrets.insert(
            name.to_string(),
            SecretEntry {
                nonce: BASE64.encode(nonce),
                ciphertext: BASE64.encode(ciphertext),
                description,
                created_at,
                updated_at: now,
            },
        );
        self.persist()
    }

    /// Decrypt and return a secret's value. A wrong passphrase manifests
    /// here as a decryption failure, reported with the remedy from §4.6.
    pub fn get(&self, name: &str) -> Result<String, LucliError> {
        let entry = self
            .file
            .secrets
            .get(name)
            .ok_or_else(|| LucliError::SecretNotFound(name.to_string()))?;

        let nonce = BASE64
            .decode(&entry.nonce)
            .map_err(|e| LucliError::SecretStoreCorrupt(e.to_string()))?;
        let ciphertext = BASE64
            .decode(&entry.ciphertext)
            .map_err(|e| LucliError::SecretStoreCorrupt(e.to_string()))?;

        let plaintext = lucli_encrypt::open(&self.key, &nonce, &ciphertext).map_err(|_| {
            LucliError::SecretStoreCorrupt(
                "decryption failed; passphrase may be incorrect".to_string(),
            )
        })?;

        String::from_utf8(plaintext).map_err(|e| LucliError::SecretStoreCorrupt(e.to_string()))
    }

    /// Names and descriptions only. Values are never returned here (§4.6).
    pub fn list(&self) -> Vec<SecretSummary> {
        self.file
            .secrets
            .iter()
            .map(|(name, entry)| SecretSummary {
                name: name.clone(),
                description: entry.description.clone(),
            })
            .collect()
    }

    /// Remove a secret by name.
    pub fn delete(&mut self, name: &str) -> Result<(), LucliError> {
        if self.file.secrets.remove(name).is_none() {
            return Err(LucliError::SecretNotFound(name.to_string()));
        }
        self.persist()
    }

    fn persist(&self) -> Result<(), LucliError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&self.file)?;
        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, content)?;
        set_private_mode(&tmp_path)?;
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

#[cfg(unix)]
fn set_private_mode(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn set_private_mode(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Acquire the passphrase: the environment variable first, then an
/// interactive no-echo prompt (§4.6).
pub fn acquire_passphrase() -> Result<String, LucliError> {
    if let Ok(value) = std::env::var(PASSPHRASE_ENV_VAR) {
        if !value.is_empty() {
            return Ok(value);
        }
    }
    rpassword::prompt_password("secret store passphrase: ").map_err(LucliError::Io)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn init_then_set_then_get_roundtrips() {
        let td = tempfile::tempdir().unwrap();
        let mut store = SecretStore::init(td.path(), "correct horse", false).unwrap();
        store.set("db.password", "hunter2", Some("primary db".into())).unwrap();
        assert_eq!(store.get("db.password").unwrap(), "hunter2");
    }

    #[test]
    fn reopen_with_correct_passphrase_decrypts() {
        let td = tempfile::tempdir().unwrap();
        {
            let mut store = SecretStore::init(td.path(), "correct horse", false).unwrap();
            store.set("k", "v", None).unwrap();
        }
        let store = SecretStore::open(td.path(), "correct horse").unwrap();
        assert_eq!(store.get("k").unwrap(), "v");
    }

    #[test]
    fn wrong_passphrase_reports_corrupt_with_remedy_text() {
        let td = tempfile::tempdir().unwrap();
        {
            let mut store = SecretStore::init(td.path(), "right", false).unwrap();
            store.set("k", "v", None).unwrap();
        }
        let store = SecretStore::open(td.path(), "wrong").unwrap();
        let err = store.get("k").unwrap_err();
        match err {
            LucliError::SecretStoreCorrupt(msg) => assert!(msg.contains("passphrase may be incorrect")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn created_at_preserved_across_updates() {
        let td = tempfile::tempdir().unwrap();
        let mut store = SecretStore::init(td.path(), "pw", false).unwrap();
        store.set("k", "v1", None).unwrap();
        let first = store.file.secrets.get("k").unwrap().created_at;
        store.set("k", "v2", None).unwrap();
        let second = store.file.secrets.get("k").unwrap().created_at;
        assert_eq!(first, second);
        assert_eq!(store.get("k").unwrap(), "v2");
    }

    #[test]
    fn list_never_exposes_values() {
        let td = tempfile::tempdir().unwrap();
        let mut store = SecretStore::init(td.path(), "pw", false).unwrap();
        store.set("k", "secretvalue", Some("a note".into())).unwrap();
        let summaries = store.list();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].name, "k");
        assert_eq!(summaries[0].description.as_deref(), Some("a note"));
    }

    #[test]
    fn delete_removes_entry() {
        let td = tempfile::tempdir().unwrap();
        let mut store = SecretStore::init(td.path(), "pw", false).unwrap();
        store.set("k", "v", None).unwrap();
        store.delete("k").unwrap();
        assert!(matches!(store.get("k"), Err(LucliError::SecretNotFound(_))));
    }

    #[test]
    fn delete_missing_secret_is_not_found() {
        let td = tempfile::tempdir().unwrap();
        let mut store = SecretStore::init(td.path(), "pw", false).unwrap();
        assert!(matches!(store.delete("nope"), Err(LucliError::SecretNotFound(_))));
    }

    #[test]
    fn init_without_reset_refuses_to_clobber_existing_store() {
        let td = tempfile::tempdir().unwrap();
        SecretStore::init(td.path(), "pw", false).unwrap();
        assert!(SecretStore::init(td.path(), "pw2", false).is_err());
        assert!(SecretStore::init(td.path(), "pw2", true).is_ok());
    }

    #[test]
    #[serial]
    fn acquire_passphrase_prefers_env_var() {
        temp_env::with_var(PASSPHRASE_ENV_VAR, Some("from-env"), || {
            assert_eq!(acquire_passphrase().unwrap(), "from-env");
        });
    }
}
