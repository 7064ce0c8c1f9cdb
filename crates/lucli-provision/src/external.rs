//! External (vendor-supplied) servlet container provider (§4.3).
//!
//! Resolves `catalinaHome` from configuration, falling back to the
//! `CATALINA_HOME` environment variable; validates the directory looks
//! like a real container install, detects its version via
//! `bin/catalina.sh --version`, and cross-checks it against the engine
//! version's known compatibility matrix before deploying the engine JAR
//! into the instance's private `lib/`.

use std::path::{Path, PathBuf};
use std::process::Command;

use lucli_types::{LucliError, ServerConfig};

use crate::{base, server_xml, web_xml};

/// Resolve the vendor container's home directory: explicit configuration
/// wins, then the `CATALINA_HOME` environment variable.
pub fn resolve_catalina_home(config: &ServerConfig) -> Result<PathBuf, LucliError> {
    if let Some(home) = &config.runtime.catalina_home {
        return Ok(home.clone());
    }
    std::env::var_os("CATALINA_HOME")
        .map(PathBuf::from)
        .ok_or_else(|| LucliError::RuntimeMisconfigured(
            "external runtime requires runtime.catalinaHome or CATALINA_HOME to be set".to_string(),
        ))
}

/// A `catalinaHome` must at minimum carry `bin/` and `lib/` to be a
/// plausible servlet-container install.
pub fn validate_catalina_home(home: &Path) -> Result<(), LucliError> {
    if !home.join("bin").is_dir() || !home.join("lib").is_dir() {
        return Err(LucliError::RuntimeMisconfigured(format!(
            "{} does not look like a servlet container install (missing bin/ or lib/)",
            home.display()
        )));
    }
    Ok(())
}

/// Run `bin/catalina.sh --version` and parse the major version number out
/// of its output (e.g. `Server version: Apache Tomcat/10.1.15` -> `10`).
pub fn detect_container_major_version(home: &Path) -> Result<u32, LucliError> {
    let script = home.join("bin/catalina.sh");
    let output = Command::new(&script)
        .arg("--version")
        .output()
        .map_err(|e| LucliError::RuntimeMisconfigured(format!("failed to run {}: {e}", script.display())))?;
    let text = format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    parse_major_version(&text).ok_or_else(|| {
        LucliError::RuntimeMisconfigured(format!("could not determine container version from {} output", script.display()))
    })
}

fn parse_major_version(text: &str) -> Option<u32> {
    let marker = "Tomcat/";
    let start = text.find(marker)? + marker.len();
    let rest = &text[start..];
    let end = rest.find(|c: char| !c.is_ascii_digit() && c != '.').unwrap_or(rest.len());
    rest[..end].split('.').next()?.parse().ok()
}

/// Engine-major -> minimum compatible container-major. Mirrors the known
/// compatibility matrix referenced by spec §4.3.
fn minimum_compatible_container(engine_major: u32) -> u32 {
    match engine_major {
        0..=4 => 7,
        5 => 8,
        _ => 9,
    }
}

/// Cross-check an engine version against a detected container major
/// version, failing with actionable text on mismatch.
pub fn check_compatibility(engine_version: &str, container_major: u32) -> Result<(), LucliError> {
    let engine_major: u32 = engine_version
        .split('.')
        .next()
        .and_then(|s| s.parse().ok())
        .unwrap_or(6);
    let minimum = minimum_compatible_container(engine_major);
    if container_major < minimum {
        return Err(LucliError::RuntimeMisconfigured(format!(
            "engine {engine_version}.x requires a servlet container >= {minimum}.x; detected {container_major}.x"
        )));
    }
    Ok(())
}

/// Materialize an instance base directory using the external-container
/// strategy: vendor home validated and version-checked, engine JAR
/// deployed into `lib/`, shared `CATALINA_HOME` left untouched.
pub fn provision(config: &ServerConfig, base_dir: &Path, force: bool) -> Result<bool, LucliError> {
    if !base::prepare_for_build(base_dir, force)? {
        return Ok(false);
    }

    let home = resolve_catalina_home(config)?;
    validate_catalina_home(&home)?;
    if let Ok(major) = detect_container_major_version(&home) {
        check_compatibility(&config.version, major)?;
    }

    let mut conditions = std::collections::BTreeMap::new();
    conditions.insert("AJP_ENABLED".to_string(), config.ajp.enabled);
    conditions.insert("HTTPS_ENABLED".to_string(), config.https.enabled);
    let filtered = lucli_template::apply_conditionals(server_xml::DEFAULT_SERVER_XML_TEMPLATE, &conditions)?;
    let patches = server_xml::patches_for(config, &config.name);
    let rendered = server_xml::patch(&filtered, &patches)?;
    let server_xml_path = base_dir.join("conf/server.xml");
    let tmp = server_xml_path.with_extension("xml.tmp");
    std::fs::write(&tmp, rendered)?;
    std::fs::rename(&tmp, &server_xml_path)?;

    web_xml::render(config, web_xml::DEFAULT_TEMPLATE, &base_dir.join("conf/web.xml"))?;
    base::write_setenv_scripts(base_dir, &crate::embedded::jvm_args(config))?;
    Ok(true)
}
