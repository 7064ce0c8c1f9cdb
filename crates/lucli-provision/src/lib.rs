//! Runtime-base builder (C6) and the three runtime provider strategies
//! (C7): embedded distribution, vendor-supplied external container, and
//! container engine.
//!
//! §9 calls for a small tagged-variant over the provider strategies plus
//! a provider-agnostic interface, rather than open-world subclassing;
//! [`RuntimeType`] is already that tag (defined in `lucli-types`), so
//! [`provision`] simply matches on it and dispatches to one of
//! [`embedded`], [`external`], or [`container`]. Each provider module
//! shares the common base layout ([`base`]) and the templating
//! primitives ([`server_xml`], [`web_xml`]).

pub mod base;
pub mod container;
pub mod embedded;
pub mod external;
pub mod server_xml;
pub mod web_xml;

use std::path::{Path, PathBuf};

use lucli_types::{LucliError, RuntimeType, ServerConfig, Warning};
use serde::Serialize;

/// What a provisioning call would do, reported instead of performed when
/// dry-run mode is active (SPEC_FULL ambient feature, spec.md §7).
#[derive(Debug, Clone, Serialize)]
pub struct ProvisionPlan {
    pub base_dir: PathBuf,
    pub provider: String,
    pub would_rebuild: bool,
    pub server_xml_patches: Vec<String>,
}

/// Outcome of a real (non-dry-run) provisioning call.
#[derive(Debug, Clone)]
pub struct ProvisionOutcome {
    pub base_dir: PathBuf,
    pub rebuilt: bool,
    pub warnings: Vec<Warning>,
}

fn provider_label(runtime_type: RuntimeType) -> &'static str {
    match runtime_type {
        RuntimeType::Embedded => "embedded",
        RuntimeType::External => "external",
        RuntimeType::Container => "container",
    }
}

/// Materialize (or skip, per overwrite discipline) the instance base
/// directory for `config` under `lucli_home`, using whichever provider
/// `config.runtime.type` selects.
pub fn provision(lucli_home: &Path, config: &ServerConfig, force: bool) -> Result<ProvisionOutcome, LucliError> {
    let base_dir = base::base_dir(lucli_home, &config.name);
    tracing::info!(instance = %config.name, provider = provider_label(config.runtime.r#type), "provisioning instance");

    let rebuilt = match config.runtime.r#type {
        RuntimeType::Embedded => embedded::provision(lucli_home, config, &base_dir, force)?,
        RuntimeType::External => external::provision(config, &base_dir, force)?,
        RuntimeType::Container => container::provision(config, &base_dir, force)?,
    };

    if let Some(environment) = &config.active_environment {
        base::write_environment_marker(&base_dir, environment)?;
    }

    Ok(ProvisionOutcome {
        base_dir,
        rebuilt,
        warnings: Vec::new(),
    })
}

/// Describe what [`provision`] would do without touching disk (dry-run
/// mode, spec.md §7). Reports the target base directory, the selected
/// provider, whether a rebuild would actually occur under the overwrite
/// discipline, and the server.xml attribute writes that would apply.
pub fn plan(lucli_home: &Path, config: &ServerConfig, force: bool) -> ProvisionPlan {
    let base_dir = base::base_dir(lucli_home, &config.name);
    let would_rebuild = force || !base::is_provisioned(&base_dir);
    let patches = server_xml::patches_for(config, &config.name);
    let server_xml_patches = patches
        .iter()
        .map(|p| {
            let selector = match &p.selector.match_attr {
                Some((k, v)) => format!("{}[@{k}={v:?}]", p.selector.element),
                None => p.selector.element.clone(),
            };
            let sets = p
                .set
                .iter()
                .map(|(k, v)| format!("{k}={v:?}"))
                .collect::<Vec<_>>()
                .join(", ");
            format!("{selector} -> {sets}")
        })
        .collect();

    ProvisionPlan {
        base_dir,
        provider: provider_label(config.runtime.r#type).to_string(),
        would_rebuild,
        server_xml_patches,
    }
}

/// Resolve the directory containing the engine's launch scripts for the
/// configured runtime strategy, for the process supervisor to compose a
/// [`lucli_process::LaunchSpec`] against. Not meaningful for the
/// container strategy, which launches via the container engine rather
/// than a local script.
pub fn engine_home(lucli_home: &Path, config: &ServerConfig) -> Result<PathBuf, LucliError> {
    match config.runtime.r#type {
        RuntimeType::Embedded => {
            let version = if config.version.is_empty() { "6.0.0" } else { &config.version };
            Ok(embedded::distribution_dir(lucli_home, version))
        }
        RuntimeType::External => external::resolve_catalina_home(config),
        RuntimeType::Container => Err(LucliError::RuntimeMisconfigured(
            "container runtime has no local engine home; launch via container::run_args instead".to_string(),
        )),
    }
}
