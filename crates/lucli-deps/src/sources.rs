//! Non-git dependency sources (§4.5): local `file`, `package-registry`,
//! and platform `extension`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(60);
const USER_AGENT: &str = concat!("lucli/", env!("CARGO_PKG_VERSION"));

fn http_client() -> Result<reqwest::blocking::Client> {
    reqwest::blocking::Client::builder()
        .timeout(DOWNLOAD_TIMEOUT)
        .user_agent(USER_AGENT)
        .build()
        .context("building http client")
}

/// Copy a local path's tree into `dest`. `location` may be relative to
/// `project_dir`.
pub fn materialize_file(project_dir: &Path, location: &str, dest: &Path) -> Result<String> {
    let source = if Path::new(location).is_absolute() {
        PathBuf::from(location)
    } else {
        project_dir.join(location)
    };
    if !source.exists() {
        bail!("file dependency source {} does not exist", source.display());
    }
    copy_tree(&source, dest)?;
    Ok(source.display().to_string())
}

fn copy_tree(src: &Path, dest: &Path) -> Result<()> {
    fs::create_dir_all(dest)?;
    if src.is_file() {
        fs::copy(src, dest.join(src.file_name().unwrap_or_default()))?;
        return Ok(());
    }
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let target = dest.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_tree(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), target)?;
        }
    }
    Ok(())
}

/// Default package-registry base URL; overridable per-dependency via the
/// project configuration in a future revision, same way `RegistryClient`
/// in the sibling crates.io tooling takes a base URL.
pub const DEFAULT_PACKAGE_REGISTRY: &str = "https://forgebox.io/api/v1";

/// Fetch a published archive by `name`+`version` from a package registry
/// and extract it into `dest`.
pub fn materialize_package(registry_base: &str, name: &str, version: &str, dest: &Path) -> Result<String> {
    let client = http_client()?;
    let url = format!("{}/entry/{}/version/{}", registry_base.trim_end_matches('/'), name, version);
    let response = client.get(&url).send().with_context(|| format!("fetching {url}"))?;
    if !response.status().is_success() {
        bail!("package registry returned {} for {url}", response.status());
    }
    let bytes = response.bytes().context("reading package registry response")?;

    fs::create_dir_all(dest)?;
    let decoder = flate2::read::GzDecoder::new(std::io::Cursor::new(bytes.as_ref()));
    let mut archive = tar::Archive::new(decoder);
    archive.unpack(dest).with_context(|| format!("extracting package {name}@{version}"))?;
    Ok(format!("{name}@{version}"))
}

/// Resolve a friendly extension name to a UUID via the bundled registry
/// and download it from the engine's extension provider.
pub fn materialize_extension(extension_registry: &ExtensionRegistry, friendly_name: &str, dest: &Path) -> Result<String> {
    let entry = extension_registry
        .lookup(friendly_name)
        .ok_or_else(|| anyhow!("unknown extension {friendly_name:?}; not present in the bundled registry"))?;

    let client = http_client()?;
    let response = client
        .get(&entry.download_url)
        .send()
        .with_context(|| format!("fetching extension {friendly_name}"))?;
    if !response.status().is_success() {
        bail!("extension provider returned {} for {}", response.status(), entry.download_url);
    }
    let bytes = response.bytes().context("reading extension response")?;
    fs::create_dir_all(dest)?;
    fs::write(dest.join(format!("{}.lex", entry.id)), &bytes)?;
    Ok(entry.id.clone())
}

/// One entry in the bundled friendly-name -> UUID extension registry.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ExtensionEntry {
    pub id: String,
    pub download_url: String,
}

/// The bundled registry mapping friendly extension names to their engine
/// UUIDs and download locations.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct ExtensionRegistry {
    #[serde(flatten)]
    entries: std::collections::BTreeMap<String, ExtensionEntry>,
}

impl ExtensionRegistry {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("parsing bundled extension registry")
    }

    pub fn lookup(&self, friendly_name: &str) -> Option<&ExtensionEntry> {
        self.entries.get(friendly_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn materialize_file_copies_tree() {
        let td = tempfile::tempdir().unwrap();
        let src = td.path().join("src");
        fs::create_dir_all(src.join("sub")).unwrap();
        fs::write(src.join("a.txt"), "a").unwrap();
        fs::write(src.join("sub/b.txt"), "b").unwrap();

        let dest = td.path().join("dest");
        materialize_file(td.path(), "src", &dest).unwrap();

        assert_eq!(fs::read_to_string(dest.join("a.txt")).unwrap(), "a");
        assert_eq!(fs::read_to_string(dest.join("sub/b.txt")).unwrap(), "b");
    }

    #[test]
    fn materialize_file_errors_on_missing_source() {
        let td = tempfile::tempdir().unwrap();
        let dest = td.path().join("dest");
        assert!(materialize_file(td.path(), "nope", &dest).is_err());
    }

    #[test]
    fn extension_registry_looks_up_known_entries() {
        let registry = ExtensionRegistry::from_json(
            r#"{"image": {"id": "550e8400-e29b-41d4-a716-446655440000", "download_url": "https://ext.example.com/image.lex"}}"#,
        )
        .unwrap();
        assert_eq!(registry.lookup("image").unwrap().id, "550e8400-e29b-41d4-a716-446655440000");
        assert!(registry.lookup("missing").is_none());
    }
}
