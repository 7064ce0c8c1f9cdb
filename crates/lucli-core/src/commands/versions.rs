//! `versions-list` command (§6, SPEC_FULL supplement): the engine
//! versions available for `runtime.type: embedded`, cached on disk for
//! 24h at `{lucliHome}/engine-versions.json` so shell completion doesn't
//! refetch on every keystroke.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use lucli_types::LucliError;
use serde::{Deserialize, Serialize};

use super::args::Args;
use crate::{CommandResult, Context};

const CACHE_FILE: &str = "engine-versions.json";
const CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);
const VERSIONS_URL: &str = "https://cdn.lucee.org/dist/versions.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct VersionsCache {
    fetched_at: chrono::DateTime<chrono::Utc>,
    versions: Vec<String>,
}

pub fn dispatch(argv: &[String], ctx: &mut Context) -> Result<CommandResult, LucliError> {
    let args = Args::new(argv);
    let versions = load(ctx, args.flag("refresh"))?;
    Ok(CommandResult::ok(versions.join("\n")))
}

fn cache_path(ctx: &Context) -> PathBuf {
    ctx.lucli_home.join(CACHE_FILE)
}

fn load(ctx: &Context, force_refresh: bool) -> Result<Vec<String>, LucliError> {
    let path = cache_path(ctx);
    if !force_refresh {
        if let Some(cached) = read_cache(&path) {
            return Ok(cached.versions);
        }
    }

    if ctx.dry_run.0 {
        return Ok(read_cache(&path).map(|c| c.versions).unwrap_or_default());
    }

    let versions = fetch()?;
    let cache = VersionsCache { fetched_at: chrono::Utc::now(), versions: versions.clone() };
    std::fs::create_dir_all(&ctx.lucli_home)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, serde_json::to_string_pretty(&cache)?)?;
    std::fs::rename(&tmp, &path)?;
    Ok(versions)
}

fn read_cache(path: &Path) -> Option<VersionsCache> {
    let content = std::fs::read_to_string(path).ok()?;
    let cache: VersionsCache = serde_json::from_str(&content).ok()?;
    let fetched_at_system: SystemTime = cache.fetched_at.into();
    let age = SystemTime::now().duration_since(fetched_at_system).ok()?;
    if age < CACHE_TTL { Some(cache) } else { None }
}

fn fetch() -> Result<Vec<String>, LucliError> {
    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| LucliError::DependencyFetchFailed(format!("building http client: {e}")))?;
    let response = client
        .get(VERSIONS_URL)
        .send()
        .map_err(|e| LucliError::DependencyFetchFailed(format!("fetching {VERSIONS_URL}: {e}")))?;
    if !response.status().is_success() {
        return Err(LucliError::DependencyFetchFailed(format!(
            "fetching {VERSIONS_URL}: server returned {}",
            response.status()
        )));
    }
    response
        .json::<Vec<String>>()
        .map_err(|e| LucliError::DependencyFetchFailed(format!("parsing versions response: {e}")))
}
