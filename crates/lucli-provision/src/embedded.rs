//! Embedded distribution provider (§4.3).
//!
//! Downloads (with on-disk caching keyed by version) or reuses a
//! pre-extracted distribution under `{lucliHome}/distributions/{version}/`,
//! copies its `conf/` tree into the instance base, patches `server.xml`
//! for the resolved ports, and deploys the url-rewrite filter artifact
//! into the project's `WEB-INF/` only when url-rewrite is enabled.

use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::Duration;

use flate2::read::GzDecoder;
use lucli_types::{LucliError, ServerConfig};

use crate::{base, server_xml, web_xml};

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(60);
const USER_AGENT: &str = concat!("lucli/", env!("CARGO_PKG_VERSION"));

/// Where to fetch a given engine version's distribution archive. Real
/// deployments may override via configuration; this is the default.
pub fn distribution_url(version: &str) -> String {
    format!("https://cdn.lucee.org/dist/lucee-{version}.tar.gz")
}

pub fn distribution_dir(lucli_home: &Path, version: &str) -> PathBuf {
    lucli_home.join("distributions").join(version)
}

fn distribution_marker(lucli_home: &Path, version: &str) -> PathBuf {
    distribution_dir(lucli_home, version).join(".complete")
}

/// Ensure the distribution for `version` is present under the LuCLI home,
/// downloading and extracting it on first use. Subsequent calls reuse the
/// cached extraction.
pub fn ensure_distribution(lucli_home: &Path, version: &str) -> Result<PathBuf, LucliError> {
    let dir = distribution_dir(lucli_home, version);
    if distribution_marker(lucli_home, version).exists() {
        return Ok(dir);
    }

    fs::create_dir_all(&dir)?;
    let client = reqwest::blocking::Client::builder()
        .timeout(DOWNLOAD_TIMEOUT)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| LucliError::DependencyFetchFailed(format!("building http client: {e}")))?;

    let url = distribution_url(version);
    let response = client
        .get(&url)
        .send()
        .map_err(|e| LucliError::DependencyFetchFailed(format!("downloading {url}: {e}")))?;
    if !response.status().is_success() {
        return Err(LucliError::DependencyFetchFailed(format!(
            "downloading {url}: server returned {}",
            response.status()
        )));
    }
    let bytes = response
        .bytes()
        .map_err(|e| LucliError::DependencyFetchFailed(format!("reading response body: {e}")))?;

    let tmp_dir = lucli_home.join("distributions").join(format!(".{version}.tmp"));
    if tmp_dir.exists() {
        fs::remove_dir_all(&tmp_dir)?;
    }
    fs::create_dir_all(&tmp_dir)?;
    let decoder = GzDecoder::new(Cursor::new(bytes.as_ref()));
    let mut archive = tar::Archive::new(decoder);
    archive
        .unpack(&tmp_dir)
        .map_err(|e| LucliError::DependencyFetchFailed(format!("extracting {url}: {e}")))?;

    if dir.exists() {
        fs::remove_dir_all(&dir)?;
    }
    fs::rename(&tmp_dir, &dir)?;
    fs::write(distribution_marker(lucli_home, version), "")?;
    Ok(dir)
}

/// Copy a distribution's `conf/` tree into the instance base, skipping
/// files the builder will overwrite with its own templates.
fn copy_conf(distribution: &Path, base: &Path) -> Result<(), LucliError> {
    let src_conf = distribution.join("conf");
    if !src_conf.exists() {
        return Ok(());
    }
    for entry in fs::read_dir(&src_conf)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        if name == "server.xml" || name == "web.xml" {
            continue;
        }
        fs::copy(entry.path(), base.join("conf").join(&name))?;
    }
    Ok(())
}

/// Deploy the url-rewrite filter artifact into the project's `WEB-INF/lib`.
fn deploy_url_rewrite_filter(distribution: &Path, webroot: &Path) -> Result<(), LucliError> {
    let src = distribution.join("lib/urlrewrite.jar");
    if !src.exists() {
        return Ok(());
    }
    let dest_dir = webroot.join("WEB-INF/lib");
    fs::create_dir_all(&dest_dir)?;
    fs::copy(src, dest_dir.join("urlrewrite.jar"))?;
    Ok(())
}

/// Materialize an instance base directory using the embedded distribution
/// strategy.
pub fn provision(lucli_home: &Path, config: &ServerConfig, base_dir: &Path, force: bool) -> Result<bool, LucliError> {
    if !base::prepare_for_build(base_dir, force)? {
        return Ok(false);
    }

    let version = if config.version.is_empty() { "6.0.0" } else { &config.version };
    let distribution = ensure_distribution(lucli_home, version)?;
    copy_conf(&distribution, base_dir)?;

    let server_xml_template = fs::read_to_string(distribution.join("conf/server.xml"))
        .unwrap_or_else(|_| server_xml::DEFAULT_SERVER_XML_TEMPLATE.to_string());
    let mut conditions = std::collections::BTreeMap::new();
    conditions.insert("AJP_ENABLED".to_string(), config.ajp.enabled);
    conditions.insert("HTTPS_ENABLED".to_string(), config.https.enabled);
    let filtered = lucli_template::apply_conditionals(&server_xml_template, &conditions)?;
    let patches = server_xml::patches_for(config, &config.name);
    let rendered = server_xml::patch(&filtered, &patches)?;
    let server_xml_path = base_dir.join("conf/server.xml");
    let tmp = server_xml_path.with_extension("xml.tmp");
    fs::write(&tmp, rendered)?;
    fs::rename(&tmp, &server_xml_path)?;

    let web_xml_template = fs::read_to_string(distribution.join("conf/web.xml"))
        .unwrap_or_else(|_| web_xml::DEFAULT_TEMPLATE.to_string());
    web_xml::render(config, &web_xml_template, &base_dir.join("conf/web.xml"))?;

    if config.url_rewrite.enabled {
        deploy_url_rewrite_filter(&distribution, &config.webroot)?;
    }

    base::write_setenv_scripts(base_dir, &jvm_args(config))?;
    Ok(true)
}

/// Classpath / JVM argument assembly shared with the external provider.
pub fn jvm_args(config: &ServerConfig) -> Vec<String> {
    let mut args = vec![
        format!("-Xmx{}", config.jvm.max_memory),
        format!("-Xms{}", config.jvm.min_memory),
    ];
    args.extend(config.jvm.additional_args.iter().cloned());
    for agent in config.agents.values() {
        if agent.enabled {
            args.extend(agent.jvm_args.iter().cloned());
        }
    }
    if config.monitoring.jmx.enabled {
        if let Some(port) = config.monitoring.jmx.port {
            args.push(format!("-Dcom.sun.management.jmxremote.port={port}"));
        }
    }
    args
}
