//! Dependency installer orchestration (§4.5, C10).
//!
//! Resolves `dependencies`/`devDependencies` from a [`ServerConfig`] into
//! concrete install paths and mapping prefixes, fetches each from its
//! source (git, file, package-registry, extension — see [`git`] and
//! [`sources`]), and materializes it into the webroot through a temporary
//! directory plus atomic rename so a concurrently-reading process never
//! observes a half-extracted dependency. The resulting
//! [`lucli_lockfile::LockFile`] records the resolved identifier and a
//! content hash per dependency; a rerun with `force=false` reuses the
//! locked identifier and, when the install path already exists, performs
//! no mutation at all (§8 invariant 2).

pub mod git;
pub mod sources;

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use lucli_lockfile::{LockFile, LockedDependency};
use lucli_types::{DependencySource, DependencySpec, LucliError, ServerConfig};

/// One dependency resolved into a concrete installation target (§4.5 step 2).
#[derive(Debug, Clone)]
pub struct ResolvedDependency {
    pub name: String,
    pub spec: DependencySpec,
    pub install_path: String,
    pub mapping: String,
}

/// Default install path: `dependencies/{name}` under the webroot.
pub fn default_install_path(name: &str) -> String {
    format!("dependencies/{name}")
}

/// Default mapping prefix: `/{name}`.
pub fn default_mapping(name: &str) -> String {
    format!("/{name}")
}

/// Assign install paths and mappings to every declared dependency,
/// falling back to the per-name defaults where the project didn't specify
/// one explicitly.
pub fn resolve_targets(dependencies: &BTreeMap<String, DependencySpec>) -> Vec<ResolvedDependency> {
    dependencies
        .iter()
        .map(|(name, spec)| ResolvedDependency {
            name: name.clone(),
            install_path: spec.install_path.clone().unwrap_or_else(|| default_install_path(name)),
            mapping: spec.mapping.clone().unwrap_or_else(|| default_mapping(name)),
            spec: spec.clone(),
        })
        .collect()
}

/// Options controlling one `install` invocation.
#[derive(Debug, Clone, Copy, Default)]
pub struct InstallOptions {
    pub force: bool,
    /// Dry-run mode (SPEC_FULL ambient feature, spec.md §7): compute the
    /// plan and the lock file that would result, but never touch disk.
    pub dry_run: bool,
    pub include_dev: bool,
}

/// What `install` would do, reported instead of performed under dry-run.
#[derive(Debug, Clone, serde::Serialize)]
pub struct InstallPlanEntry {
    pub name: String,
    pub install_path: String,
    pub mapping: String,
    pub source: DependencySource,
    pub would_fetch: bool,
}

/// Describe what [`install_all`] would do without touching the network or
/// the filesystem.
pub fn plan(webroot: &Path, config: &ServerConfig, existing_lock: Option<&LockFile>, options: InstallOptions) -> Vec<InstallPlanEntry> {
    let mut targets = resolve_targets(&config.dependencies);
    if options.include_dev {
        targets.extend(resolve_targets(&config.dev_dependencies));
    }
    targets
        .into_iter()
        .map(|t| {
            let previously_locked = existing_lock.and_then(|l| l.dependencies.get(&t.name).or_else(|| l.dev_dependencies.get(&t.name)));
            let already_materialized = webroot.join(&t.install_path).exists();
            InstallPlanEntry {
                source: t.spec.source,
                would_fetch: options.force || previously_locked.is_none() || !already_materialized,
                name: t.name,
                install_path: t.install_path,
                mapping: t.mapping,
            }
        })
        .collect()
}

/// A dependency's materialized tree is exposed to the engine at its
/// mapping prefix; the runtime-base builder injects these into the
/// generated engine configuration (§4.5 "Integration with server start").
#[derive(Debug, Clone)]
pub struct MappingRecord {
    pub install_path: PathBuf,
    pub mapping: String,
}

/// Every mapping record implied by a lock file, with install paths
/// resolved against `webroot`.
pub fn mapping_records(lock: &LockFile, webroot: &Path) -> Vec<MappingRecord> {
    lock.dependencies
        .values()
        .chain(lock.dev_dependencies.values())
        .map(|d| MappingRecord {
            install_path: webroot.join(&d.install_path),
            mapping: d.mapping.clone(),
        })
        .collect()
}

fn fetch_failed(err: impl std::fmt::Display) -> LucliError {
    LucliError::DependencyFetchFailed(err.to_string())
}

/// A `file` dependency whose location, once canonicalized, resolves back
/// into the project's own webroot is a cycle — installing it would mean
/// copying the project into itself (§9).
fn check_no_cycle(webroot: &Path, spec: &DependencySpec) -> Result<()> {
    if spec.source != DependencySource::File {
        return Ok(());
    }
    let loc = Path::new(&spec.location);
    let abs = if loc.is_absolute() { loc.to_path_buf() } else { webroot.join(loc) };
    let canonical_webroot = webroot.canonicalize().unwrap_or_else(|_| webroot.to_path_buf());
    let canonical_loc = abs.canonicalize().unwrap_or(abs);
    if canonical_loc == canonical_webroot || canonical_webroot.starts_with(&canonical_loc) {
        bail!("dependency cycle detected: {:?} resolves back into the project root", spec.location);
    }
    Ok(())
}

/// Resolve, fetch, and materialize every dependency declared in `config`,
/// writing an updated lock file. Two consecutive calls with
/// `options.force = false` and no source drift produce identical content
/// hashes (§8 invariant 2) because an already-materialized, already-locked
/// dependency is left untouched entirely.
pub fn install_all(project_dir: &Path, config: &ServerConfig, tool_version: &str, options: InstallOptions) -> Result<LockFile, LucliError> {
    let webroot = config.webroot.clone();
    let mut targets = resolve_targets(&config.dependencies);
    if options.include_dev {
        targets.extend(resolve_targets(&config.dev_dependencies));
    }
    let dev_names: BTreeSet<String> = config.dev_dependencies.keys().cloned().collect();

    let existing = LockFile::load(project_dir)?;
    let mut lock = existing.unwrap_or_else(|| LockFile::new(tool_version));
    lock.tool_version = tool_version.to_string();

    let mut claimed_paths = BTreeSet::new();
    let mut new_deps = BTreeMap::new();
    let mut new_dev_deps = BTreeMap::new();

    for target in &targets {
        check_no_cycle(&webroot, &target.spec).map_err(fetch_failed)?;
        if !claimed_paths.insert(target.install_path.clone()) {
            return Err(LucliError::DependencyFetchFailed(format!(
                "dependency cycle detected: {} installs to {:?}, already claimed by another dependency",
                target.name, target.install_path
            )));
        }

        let dest = webroot.join(&target.install_path);
        let previously_locked = lock
            .dependencies
            .get(&target.name)
            .or_else(|| lock.dev_dependencies.get(&target.name))
            .cloned();
        let can_reuse = !options.force && previously_locked.is_some() && dest.exists();

        let locked_entry = if options.dry_run {
            previously_locked.unwrap_or_else(|| LockedDependency {
                resolved: "(pending)".to_string(),
                source: target.spec.source,
                install_path: target.install_path.clone(),
                mapping: target.mapping.clone(),
                integrity: "(pending)".to_string(),
            })
        } else if can_reuse {
            previously_locked.unwrap()
        } else {
            materialize_one(&webroot, project_dir, target, previously_locked.as_ref()).map_err(fetch_failed)?
        };

        if dev_names.contains(&target.name) {
            new_dev_deps.insert(target.name.clone(), locked_entry);
        } else {
            new_deps.insert(target.name.clone(), locked_entry);
        }
    }

    lock.dependencies = new_deps;
    lock.dev_dependencies = new_dev_deps;
    lock.generated_at = chrono::Utc::now();

    if !options.dry_run {
        lock.save(project_dir)?;
    }
    Ok(lock)
}

fn materialize_one(
    webroot: &Path,
    project_dir: &Path,
    target: &ResolvedDependency,
    previously_locked: Option<&LockedDependency>,
) -> Result<LockedDependency> {
    let dest = webroot.join(&target.install_path);
    let tmp_parent = dest.parent().map(Path::to_path_buf).unwrap_or_else(|| webroot.to_path_buf());
    fs::create_dir_all(&tmp_parent).context("creating install parent directory")?;
    let tmp = tmp_parent.join(format!(".{}.installing", target.name));
    if tmp.exists() {
        fs::remove_dir_all(&tmp).context("clearing stale install staging directory")?;
    }

    let resolved = match target.spec.source {
        DependencySource::Git => {
            let pinned = previously_locked.map(|l| l.resolved.as_str());
            let want_ref = pinned.or(target.spec.r#ref.as_deref());
            let (content_root, sha) =
                git::materialize(&target.spec.location, want_ref, target.spec.sub_path.as_deref(), &tmp)
                    .with_context(|| format!("materializing git dependency {}", target.name))?;
            if dest.exists() {
                fs::remove_dir_all(&dest)?;
            }
            if content_root == tmp {
                fs::rename(&tmp, &dest)?;
            } else {
                fs::rename(&content_root, &dest)?;
                let _ = fs::remove_dir_all(&tmp);
            }
            sha
        }
        DependencySource::File => {
            let source_desc = sources::materialize_file(project_dir, &target.spec.location, &tmp)
                .with_context(|| format!("materializing file dependency {}", target.name))?;
            if dest.exists() {
                fs::remove_dir_all(&dest)?;
            }
            fs::rename(&tmp, &dest)?;
            source_desc
        }
        DependencySource::PackageRegistry => {
            let version = target.spec.version.as_deref().or(target.spec.r#ref.as_deref()).unwrap_or("latest");
            let resolved = sources::materialize_package(sources::DEFAULT_PACKAGE_REGISTRY, &target.spec.location, version, &tmp)
                .with_context(|| format!("materializing package dependency {}", target.name))?;
            if dest.exists() {
                fs::remove_dir_all(&dest)?;
            }
            fs::rename(&tmp, &dest)?;
            resolved
        }
        DependencySource::Extension => {
            bail!(
                "extension dependency {:?} requires a bundled extension registry; resolve it with sources::materialize_extension directly",
                target.name
            );
        }
    };

    let integrity = lucli_lockfile::hash_tree(&dest).map_err(|e| anyhow::anyhow!(e))?;
    tracing::info!(dependency = %target.name, resolved = %resolved, "materialized dependency");

    Ok(LockedDependency {
        resolved,
        source: target.spec.source,
        install_path: target.install_path.clone(),
        mapping: target.mapping.clone(),
        integrity,
    })
}

/// Recompute a materialized dependency's content hash and compare it to
/// the lock file's recorded integrity, surfacing drift explicitly rather
/// than silently reinstalling (§7 `DependencyIntegrityMismatch`).
pub fn verify_integrity(webroot: &Path, name: &str, locked: &LockedDependency) -> Result<(), LucliError> {
    let dest = webroot.join(&locked.install_path);
    let actual = lucli_lockfile::hash_tree(&dest)?;
    if actual != locked.integrity {
        return Err(LucliError::DependencyIntegrityMismatch {
            name: name.to_string(),
            expected: locked.integrity.clone(),
            actual,
        });
    }
    Ok(())
}

/// Remove a previously-installed dependency's materialized tree and its
/// lock entry (`uninstall`).
pub fn uninstall(project_dir: &Path, webroot: &Path, name: &str) -> Result<bool, LucliError> {
    let Some(mut lock) = LockFile::load(project_dir)? else {
        return Ok(false);
    };
    let removed = lock.dependencies.remove(name).or_else(|| lock.dev_dependencies.remove(name));
    let Some(entry) = removed else {
        return Ok(false);
    };
    let dest = webroot.join(&entry.install_path);
    if dest.exists() {
        fs::remove_dir_all(&dest)?;
    }
    lock.save(project_dir)?;
    Ok(true)
}
