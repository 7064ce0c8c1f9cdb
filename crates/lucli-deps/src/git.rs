//! Git dependency source (§4.5).
//!
//! Clones a repository at a ref into a temporary directory so the caller
//! can atomically rename it into place. Shells out to `git` rather than
//! linking a git implementation; the binary is overridable via
//! `LUCLI_GIT_BIN` so tests can point it at a fake script instead of a
//! real git binary or network.

use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, anyhow, bail};

fn git_program() -> String {
    env::var("LUCLI_GIT_BIN").unwrap_or_else(|_| "git".to_string())
}

/// Clone `url` at `reference` into `dest` (which must not already exist).
pub fn clone(url: &str, reference: Option<&str>, dest: &Path) -> Result<()> {
    let status = Command::new(git_program())
        .arg("clone")
        .arg("--quiet")
        .arg(url)
        .arg(dest)
        .status()
        .with_context(|| format!("failed to run git clone for {url}"))?;
    if !status.success() {
        bail!("git clone of {url} failed");
    }

    if let Some(reference) = reference {
        let status = Command::new(git_program())
            .arg("checkout")
            .arg("--quiet")
            .arg(reference)
            .current_dir(dest)
            .status()
            .with_context(|| format!("failed to run git checkout {reference}"))?;
        if !status.success() {
            bail!("git checkout of {reference} failed in {url}");
        }
    }
    Ok(())
}

/// Resolve the checked-out HEAD commit SHA in `repo_dir`.
pub fn rev_parse_head(repo_dir: &Path) -> Result<String> {
    let output = Command::new(git_program())
        .arg("rev-parse")
        .arg("HEAD")
        .current_dir(repo_dir)
        .output()
        .context("failed to run git rev-parse HEAD")?;
    if !output.status.success() {
        bail!("git rev-parse HEAD failed in {}", repo_dir.display());
    }
    String::from_utf8(output.stdout)
        .map(|s| s.trim().to_string())
        .map_err(|e| anyhow!("git rev-parse HEAD produced non-UTF-8 output: {e}"))
}

/// Clone a dependency and return its resolved commit SHA, optionally
/// narrowing to a `sub_path` within the checkout.
pub fn materialize(url: &str, reference: Option<&str>, sub_path: Option<&str>, tmp_dir: &Path) -> Result<(PathBuf, String)> {
    clone(url, reference, tmp_dir)?;
    let resolved = rev_parse_head(tmp_dir)?;
    let content_root = match sub_path {
        Some(sub) => tmp_dir.join(sub),
        None => tmp_dir.to_path_buf(),
    };
    if !content_root.exists() {
        bail!("subPath {:?} does not exist in {url}", sub_path.unwrap_or(""));
    }
    Ok((content_root, resolved))
}
