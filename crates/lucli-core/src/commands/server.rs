//! `server` command group (§4.2-§4.4, C6-C9): `start`, `run`, `stop`,
//! `restart`, `status`, `list`, `prune`, `log`, `monitor`.
//!
//! `start`/`run` materialize dependencies and the runtime base, launch
//! the supervised child, and register it; `stop`/`restart` drive the
//! two-phase shutdown in `lucli-process`; `status`/`list`/`log`/`monitor`
//! are read-only and must never prompt for a secret-store passphrase
//! (§4.1) — see [`status`] for how that's kept true even when a
//! project's configuration references an unresolved `${secret:...}`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use lucli_config::SecretAccess;
use lucli_registry::{InstanceRecord, Registry};
use lucli_types::{InstanceStatus, LucliError, RuntimeType, ServerConfig};

use super::args::Args;
use crate::{CommandResult, Context};

pub fn dispatch(command: &str, argv: &[String], ctx: &mut Context) -> Result<CommandResult, LucliError> {
    let args = Args::new(argv);
    match command {
        "start" => start(&args, ctx, false),
        "run" => start(&args, ctx, true),
        "stop" => stop(&args, ctx),
        "restart" => restart(&args, ctx),
        "status" => status(&args, ctx),
        "list" => list(ctx),
        "prune" => prune(&args, ctx),
        "log" => log(&args, ctx),
        "monitor" => monitor(&args, ctx),
        other => Err(LucliError::Usage(format!("unknown server command {other:?}"))),
    }
}

fn build_launch_spec(lucli_home: &Path, config: &ServerConfig, base_dir: &Path) -> Result<lucli_process::LaunchSpec, LucliError> {
    let stdout_log = base_dir.join("logs/lucli.out.log");
    let stderr_log = base_dir.join("logs/lucli.err.log");

    if config.runtime.r#type == RuntimeType::Container {
        let args = lucli_provision::container::run_args(config, base_dir)?;
        return Ok(lucli_process::LaunchSpec {
            program: lucli_provision::container::container_bin(),
            args,
            working_dir: config.webroot.clone(),
            env: Vec::new(),
            stdout_log,
            stderr_log,
        });
    }

    let engine_home = lucli_provision::engine_home(lucli_home, config)?;
    let script = engine_home.join("bin").join("catalina.sh");
    Ok(lucli_process::LaunchSpec {
        program: script.display().to_string(),
        args: vec!["run".to_string()],
        working_dir: config.webroot.clone(),
        env: vec![
            ("CATALINA_HOME".to_string(), engine_home.display().to_string()),
            ("CATALINA_BASE".to_string(), base_dir.display().to_string()),
        ],
        stdout_log,
        stderr_log,
    })
}

fn start(args: &Args, ctx: &mut Context, foreground: bool) -> Result<CommandResult, LucliError> {
    let environment = args.value("env");
    let force = args.flag("force");

    let store = super::secret_access::open_if_needed(ctx)?;
    let (config, mut warnings) = lucli_config::load(&ctx.cwd, environment.as_deref(), store.as_ref(), SecretAccess::Allowed)?;

    let registry = Registry::new(&ctx.lucli_home);
    let base_dir = registry.base_dir(&config.name);

    if lucli_process::is_live(&base_dir, &config.host, config.port, lucli_registry::FRESHNESS_WINDOW) {
        return Err(LucliError::AlreadyRunning(config.name.clone()));
    }

    if ctx.dry_run.0 {
        let provision_plan = lucli_provision::plan(&ctx.lucli_home, &config, force);
        let existing_lock = lucli_lockfile::LockFile::load(&ctx.cwd)?;
        let install_options = lucli_deps::InstallOptions { force, dry_run: true, include_dev: false };
        let install_plan = lucli_deps::plan(&config.webroot, &config, existing_lock.as_ref(), install_options);
        let output = serde_json::to_string_pretty(&serde_json::json!({
            "dryRun": true,
            "provision": provision_plan,
            "dependencies": install_plan,
        }))?;
        return Ok(CommandResult::ok_with_warnings(output, warnings));
    }

    let _lock = lucli_filelock::InstanceLock::acquire_with_timeout(&base_dir, Duration::from_secs(3600))?;

    let install_options = lucli_deps::InstallOptions { force, dry_run: false, include_dev: false };
    lucli_deps::install_all(&ctx.cwd, &config, env!("CARGO_PKG_VERSION"), install_options)?;

    let outcome = lucli_provision::provision(&ctx.lucli_home, &config, force)?;
    warnings.extend(outcome.warnings);

    let launch_spec = build_launch_spec(&ctx.lucli_home, &config, &base_dir)?;
    let pid = lucli_process::spawn_detached(&launch_spec)?;
    lucli_process::PidFile::write(&base_dir, pid)?;

    let created_at = registry.load_instance(&config.name)?.map(|i| i.created_at).unwrap_or_else(Utc::now);
    let instance = lucli_types::ServerInstance {
        name: config.name.clone(),
        base_dir: base_dir.clone(),
        webroot: config.webroot.clone(),
        pid: Some(pid),
        port: Some(config.port),
        environment: config.active_environment.clone(),
        created_at,
        updated_at: Utc::now(),
    };
    registry.save_instance(&instance)?;

    if lucli_process::wait_until_ready(&config.host, config.port, ctx.home_config.start_timeout()).is_err() {
        let tail = lucli_process::tail_log(&base_dir.join("logs/lucli.out.log"), 4096);
        return Err(LucliError::StartTimeout(format!("{} did not become ready; log tail:\n{tail}", config.name)));
    }

    if foreground {
        run_foreground(&base_dir, &config, ctx)?;
        return Ok(CommandResult::ok_with_warnings(format!("{} stopped", config.name), warnings));
    }

    Ok(CommandResult::ok_with_warnings(
        format!("started {} (pid {pid}) on {}:{}", config.name, config.host, config.port),
        warnings,
    ))
}

/// Block until interrupted or the instance stops on its own, then drive
/// the same stop sequence as an explicit `stop` (§5 "interrupt during a
/// foreground run triggers the standard stop sequence, then exits").
fn run_foreground(base_dir: &Path, config: &ServerConfig, ctx: &Context) -> Result<(), LucliError> {
    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = interrupted.clone();
    let _ = ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst));

    while !interrupted.load(Ordering::SeqCst) {
        if !lucli_process::is_live(base_dir, &config.host, config.port, lucli_registry::FRESHNESS_WINDOW) {
            break;
        }
        std::thread::sleep(Duration::from_millis(250));
    }

    if let Some(pid) = lucli_process::PidFile::read(base_dir) {
        lucli_process::stop(
            base_dir,
            &config.host,
            config.resolve_shutdown_port(),
            "SHUTDOWN",
            pid,
            ctx.home_config.stop_timeouts(),
        )?;
    }

    let registry = Registry::new(&ctx.lucli_home);
    if let Some(mut instance) = registry.load_instance(&config.name)? {
        instance.pid = None;
        instance.updated_at = Utc::now();
        registry.save_instance(&instance)?;
    }

    if interrupted.load(Ordering::SeqCst) {
        return Err(LucliError::Interrupted);
    }
    Ok(())
}

/// Reload the config and registry entry for the instance `args` targets:
/// an explicit name, else the one registered against the current
/// directory. Used by commands that must actually address the running
/// engine (`stop`, `restart`, `log`), as opposed to [`status`]/[`list`]
/// which only read persisted registry metadata.
fn resolve_instance(args: &Args, ctx: &Context) -> Result<(ServerConfig, lucli_types::ServerInstance), LucliError> {
    let registry = Registry::new(&ctx.lucli_home);
    let instance = match args.positional(0) {
        Some(name) => registry
            .load_instance(name)?
            .ok_or_else(|| LucliError::NotRunning(name.to_string()))?,
        None => registry
            .for_cwd(&ctx.cwd)?
            .map(|r| r.instance)
            .ok_or_else(|| LucliError::NotRunning("(current directory)".to_string()))?,
    };
    let (config, _warnings) = lucli_config::load(&instance.webroot, instance.environment.as_deref(), None, SecretAccess::Denied)?;
    Ok((config, instance))
}

fn stop(args: &Args, ctx: &mut Context) -> Result<CommandResult, LucliError> {
    let (config, instance) = resolve_instance(args, ctx)?;
    let pid = instance.pid.ok_or_else(|| LucliError::NotRunning(instance.name.clone()))?;

    if ctx.dry_run.0 {
        return Ok(CommandResult::ok(format!("would stop {} (pid {pid})", instance.name)));
    }

    if !lucli_process::is_pid_alive(pid) {
        return Err(LucliError::NotRunning(instance.name.clone()));
    }

    let _lock = lucli_filelock::InstanceLock::acquire_with_timeout(&instance.base_dir, Duration::from_secs(3600))?;
    lucli_process::stop(
        &instance.base_dir,
        &config.host,
        config.resolve_shutdown_port(),
        "SHUTDOWN",
        pid,
        ctx.home_config.stop_timeouts(),
    )?;

    let registry = Registry::new(&ctx.lucli_home);
    let mut updated = instance;
    updated.pid = None;
    updated.updated_at = Utc::now();
    registry.save_instance(&updated)?;

    Ok(CommandResult::ok(format!("stopped {}", updated.name)))
}

fn restart(args: &Args, ctx: &mut Context) -> Result<CommandResult, LucliError> {
    match stop(args, ctx) {
        Ok(_) => {}
        Err(LucliError::NotRunning(_)) => {}
        Err(other) => return Err(other),
    }
    start(args, ctx, false)
}

fn format_record(record: &InstanceRecord) -> String {
    format!(
        "{}: {} (pid={}, port={}, webroot={})",
        record.instance.name,
        match record.status {
            InstanceStatus::Running => "running",
            InstanceStatus::Stopped => "stopped",
        },
        record.instance.pid.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string()),
        record.instance.port.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string()),
        record.instance.webroot.display(),
    )
}

/// Read-only status lookup. Deliberately never opens the secret store:
/// it reports from the registry's persisted metadata when the instance
/// has ever been started, and otherwise does a `SecretAccess::Denied`
/// load of the project file for its name/port alone. If that load fails
/// because of an unresolved `${secret:...}` placeholder, the command
/// still succeeds — with a warning instead of a hard failure — so that
/// inspecting a never-started project never requires the passphrase
/// (spec.md §8 scenario 3).
fn status(args: &Args, ctx: &mut Context) -> Result<CommandResult, LucliError> {
    let registry = Registry::new(&ctx.lucli_home);

    let target_name = match args.positional(0) {
        Some(name) => Some(name.to_string()),
        None => registry.for_cwd(&ctx.cwd)?.map(|r| r.instance.name),
    };

    if let Some(name) = target_name {
        let record = registry
            .list()?
            .into_iter()
            .find(|r| r.instance.name == name)
            .ok_or_else(|| LucliError::NotRunning(name))?;
        return Ok(CommandResult::ok(format_record(&record)));
    }

    match lucli_config::load(&ctx.cwd, None, None, SecretAccess::Denied) {
        Ok((config, warnings)) => Ok(CommandResult::ok_with_warnings(
            format!("{}: stopped (never started, port {})", config.name, config.port),
            warnings,
        )),
        Err(LucliError::PlaceholderUnresolved { .. }) => {
            let project = lucli_config::load_project_file(&ctx.cwd)?;
            let name = project.get("name").and_then(|v| v.as_str()).unwrap_or("(unnamed)").to_string();
            Ok(CommandResult::ok_with_warnings(
                format!("{name}: stopped (never started; one or more secret placeholders not resolved for this read-only command)"),
                vec![lucli_types::Warning::new(
                    "${secret:...} placeholders were left unresolved; status never opens the secret store",
                )],
            ))
        }
        Err(other) => Err(other),
    }
}

fn list(ctx: &Context) -> Result<CommandResult, LucliError> {
    let registry = Registry::new(&ctx.lucli_home);
    let records = registry.list()?;
    if records.is_empty() {
        return Ok(CommandResult::ok("no instances registered"));
    }
    let body = records.iter().map(format_record).collect::<Vec<_>>().join("\n");
    Ok(CommandResult::ok(body))
}

fn prune(args: &Args, ctx: &mut Context) -> Result<CommandResult, LucliError> {
    let registry = Registry::new(&ctx.lucli_home);
    let force = args.flag("force");
    let all = args.flag("all");

    if ctx.dry_run.0 {
        let candidates: Vec<String> = registry
            .list()?
            .into_iter()
            .filter(|r| r.status == InstanceStatus::Stopped)
            .map(|r| r.instance.name)
            .collect();
        return Ok(CommandResult::ok(format!("would prune: {}", candidates.join(", "))));
    }

    if all {
        if !force && !ctx.confirm.confirm("prune all stopped instances?") {
            return Ok(CommandResult::ok("aborted"));
        }
        let pruned = registry.prune_all(true)?;
        return Ok(CommandResult::ok(format!("pruned {} instance(s): {}", pruned.len(), pruned.join(", "))));
    }

    let Some(name) = args.positional(0) else {
        return Err(LucliError::Usage("prune requires an instance name or --all".to_string()));
    };
    if !force && !ctx.confirm.confirm(&format!("prune {name}?")) {
        return Ok(CommandResult::ok("aborted"));
    }
    if registry.prune_one(name)? {
        Ok(CommandResult::ok(format!("pruned {name}")))
    } else {
        Ok(CommandResult::ok(format!("{name} is live or not registered; not pruned")))
    }
}

fn log(args: &Args, ctx: &mut Context) -> Result<CommandResult, LucliError> {
    let (_config, instance) = resolve_instance(args, ctx)?;
    let max_bytes = args.value("bytes").and_then(|v| v.parse::<usize>().ok()).unwrap_or(8192);
    let tail = lucli_process::tail_log(&instance.base_dir.join("logs/lucli.out.log"), max_bytes);
    Ok(CommandResult::ok(tail))
}

/// One status snapshot. `monitor` as a standing watch is a front-end
/// concern (repeatedly invoking the facade and rendering the diff);
/// `execute()` itself always returns rather than looping, so every
/// command call completes in bounded time (§4.8).
fn monitor(args: &Args, ctx: &mut Context) -> Result<CommandResult, LucliError> {
    status(args, ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DryRun, NeverConfirm};

    fn ctx<'a>(lucli_home: PathBuf, cwd: PathBuf, confirm: &'a mut dyn crate::Confirm) -> Context<'a> {
        Context {
            home_config: crate::home::LucliHomeConfig::load(&lucli_home),
            lucli_home,
            cwd,
            dry_run: DryRun(false),
            confirm,
        }
    }

    #[test]
    fn status_without_lucee_json_is_config_not_found() {
        let td = tempfile::tempdir().unwrap();
        let mut confirm = NeverConfirm;
        let mut c = ctx(td.path().join("home"), td.path().join("project"), &mut confirm);
        std::fs::create_dir_all(&c.cwd).unwrap();
        let args = Args::new(&[]);
        let err = status(&args, &mut c).unwrap_err();
        assert!(matches!(err, LucliError::ConfigNotFound(_)));
    }

    #[test]
    fn status_on_unresolved_secret_placeholder_succeeds_with_warning() {
        let td = tempfile::tempdir().unwrap();
        let project = td.path().join("project");
        std::fs::create_dir_all(&project).unwrap();
        std::fs::write(
            project.join("lucee.json"),
            serde_json::json!({
                "name": "app", "webroot": ".",
                "admin": {"password": "${secret:db.password}"}
            })
            .to_string(),
        )
        .unwrap();

        let mut confirm = NeverConfirm;
        let mut c = ctx(td.path().join("home"), project, &mut confirm);
        let args = Args::new(&[]);
        let result = status(&args, &mut c).unwrap();
        assert_eq!(result.exit_code, 0);
        assert!(result.output.contains("app"));
        assert!(!result.warnings.is_empty());
        assert!(!lucli_secrets::SecretStore::exists(&c.lucli_home));
    }

    #[test]
    fn list_is_empty_message_with_no_registry() {
        let td = tempfile::tempdir().unwrap();
        let mut confirm = NeverConfirm;
        let mut c = ctx(td.path().join("home"), td.path().to_path_buf(), &mut confirm);
        let result = list(&mut c).unwrap();
        assert_eq!(result.output, "no instances registered");
    }

    #[test]
    fn stop_with_no_registered_instance_is_not_running() {
        let td = tempfile::tempdir().unwrap();
        let mut confirm = NeverConfirm;
        let mut c = ctx(td.path().join("home"), td.path().to_path_buf(), &mut confirm);
        let args = Args::new(&[]);
        let err = stop(&args, &mut c).unwrap_err();
        assert!(matches!(err, LucliError::NotRunning(_)));
    }

    #[test]
    fn prune_without_name_or_all_is_usage_error() {
        let td = tempfile::tempdir().unwrap();
        let mut confirm = NeverConfirm;
        let mut c = ctx(td.path().join("home"), td.path().to_path_buf(), &mut confirm);
        let args = Args::new(&[]);
        let err = prune(&args, &mut c).unwrap_err();
        assert!(matches!(err, LucliError::Usage(_)));
    }

    #[test]
    fn prune_declines_without_force_or_confirmation() {
        let td = tempfile::tempdir().unwrap();
        let lucli_home = td.path().join("home");
        let registry = Registry::new(&lucli_home);
        let base_dir = registry.base_dir("app");
        registry
            .save_instance(&lucli_types::ServerInstance {
                name: "app".to_string(),
                base_dir,
                webroot: td.path().to_path_buf(),
                pid: None,
                port: None,
                environment: None,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
            .unwrap();

        let mut confirm = NeverConfirm;
        let mut c = ctx(lucli_home, td.path().to_path_buf(), &mut confirm);
        let args = Args::new(&["app".to_string()]);
        let result = prune(&args, &mut c).unwrap();
        assert_eq!(result.output, "aborted");
        assert!(Registry::new(&c.lucli_home).load_instance("app").unwrap().is_some());
    }
}
