//! Command facade (§4.8, C13).
//!
//! `execute(lucli_home, command, argv, cwd, dry_run, confirm)` is the
//! single entrypoint used identically by the one-shot CLI, interactive
//! mode, and the daemon (`lucli-daemon` calls back into it through a
//! `Dispatcher` impl). Command bodies live in [`commands`]; this module
//! owns dispatch-by-name, the ambient home-directory configuration layer
//! ([`home`]), dry-run threading, and folding every `LucliError` into a
//! uniform [`CommandResult`] so no front end ever sees a bare `Result`.

pub mod commands;
pub mod home;

use std::path::{Path, PathBuf};

pub use home::{LucliHome, LucliHomeConfig};
use lucli_types::{LucliError, Warning};

/// The result of one `execute` call (§4.8): identical shape across the
/// one-shot CLI, interactive mode, and the daemon.
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: i32,
    pub output: String,
    pub warnings: Vec<Warning>,
}

impl CommandResult {
    pub(crate) fn ok(output: impl Into<String>) -> Self {
        Self { exit_code: 0, output: output.into(), warnings: Vec::new() }
    }

    pub(crate) fn ok_with_warnings(output: impl Into<String>, warnings: Vec<Warning>) -> Self {
        Self { exit_code: 0, output: output.into(), warnings }
    }

    fn from_error(err: LucliError) -> Self {
        let mut output = err.to_string();
        if let Some(remedy) = err.remedy() {
            output.push_str("\nremedy: ");
            output.push_str(&remedy);
        }
        Self { exit_code: err.exit_code(), output, warnings: Vec::new() }
    }
}

/// Cross-cutting dry-run flag (SPEC_FULL ambient feature, spec.md §7):
/// threaded through the facade, provisioning, and the dependency
/// installer so each reports a plan instead of mutating anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DryRun(pub bool);

/// Confirmation callback for destructive operations that default to
/// requiring a human yes (`prune` without `--all`/`--force`). The CLI
/// front end prompts on a TTY; the daemon and any non-interactive caller
/// should pass [`NeverConfirm`] so an explicit force flag is the only way
/// to proceed (SPEC_FULL ambient feature).
pub trait Confirm {
    fn confirm(&mut self, prompt: &str) -> bool;
}

/// Declines every confirmation. The correct choice for the daemon and
/// any caller that can't present a prompt.
pub struct NeverConfirm;

impl Confirm for NeverConfirm {
    fn confirm(&mut self, _prompt: &str) -> bool {
        false
    }
}

/// Everything one command invocation needs: resolved home paths, the
/// working directory it was invoked from, the dry-run flag, and a
/// confirmation callback. Built fresh by [`execute`] for each call so no
/// state survives between unrelated invocations except what's on disk
/// (§5 "Global state is confined to the per-user home path discovery...;
/// pass both through the command facade rather than reading them from
/// process-wide singletons").
pub struct Context<'a> {
    pub lucli_home: PathBuf,
    pub home_config: LucliHomeConfig,
    pub cwd: PathBuf,
    pub dry_run: DryRun,
    pub confirm: &'a mut dyn Confirm,
}

/// Dispatch one command by name (§4.8). `command` is the top-level verb
/// (`"start"`, `"secrets"`, `"daemon"`, `"versions-list"`, ...); `argv` is
/// everything after it, in the same shape the daemon protocol and a
/// one-shot CLI invocation both produce. Never panics; every failure
/// folds into the returned [`CommandResult`] rather than propagating.
pub fn execute(lucli_home: &Path, command: &str, argv: &[String], cwd: &Path, dry_run: DryRun, confirm: &mut dyn Confirm) -> CommandResult {
    let home_config = LucliHomeConfig::load(lucli_home);
    let mut ctx = Context {
        lucli_home: lucli_home.to_path_buf(),
        home_config,
        cwd: cwd.to_path_buf(),
        dry_run,
        confirm,
    };

    let result = dispatch(command, argv, &mut ctx);
    match result {
        Ok(command_result) => command_result,
        Err(err) => CommandResult::from_error(err),
    }
}

fn dispatch(command: &str, argv: &[String], ctx: &mut Context) -> Result<CommandResult, LucliError> {
    match command {
        "start" | "run" | "stop" | "restart" | "status" | "list" | "prune" | "log" | "monitor" => {
            commands::server::dispatch(command, argv, ctx)
        }
        "install" | "uninstall" | "update" => commands::deps::dispatch(command, argv, ctx),
        "secrets" => commands::secrets::dispatch(argv, ctx),
        "daemon" => commands::daemon::dispatch(argv, ctx),
        "versions-list" => commands::versions::dispatch(argv, ctx),
        other => Err(LucliError::Usage(format!("unknown command {other:?}"))),
    }
}
