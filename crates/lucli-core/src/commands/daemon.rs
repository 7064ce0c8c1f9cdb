//! `daemon [--port]` command (§4.7, C12, C13).
//!
//! Wires the facade into `lucli-daemon` via its [`lucli_daemon::Dispatcher`]
//! trait, so every command served over the loopback socket runs through
//! the exact same `execute()` path the one-shot CLI uses — always with
//! dry-run off and a confirmation policy that declines everything, since
//! there is no terminal on the other end to prompt.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use lucli_types::LucliError;

use super::args::Args;
use crate::{CommandResult, Context, DryRun, NeverConfirm};

struct FacadeDispatcher {
    lucli_home: PathBuf,
}

impl lucli_daemon::Dispatcher for FacadeDispatcher {
    fn dispatch(&self, argv: &[String]) -> (i32, String) {
        let Some((command, rest)) = argv.split_first() else {
            return (2, "usage error: empty request".to_string());
        };
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let mut confirm = NeverConfirm;
        let result = crate::execute(&self.lucli_home, command, rest, &cwd, DryRun(false), &mut confirm);
        (result.exit_code, result.output)
    }
}

pub fn dispatch(argv: &[String], ctx: &mut Context) -> Result<CommandResult, LucliError> {
    let args = Args::new(argv);
    let port = args
        .value("port")
        .and_then(|v| v.parse::<u16>().ok())
        .unwrap_or(lucli_daemon::DEFAULT_PORT);

    if ctx.dry_run.0 {
        return Ok(CommandResult::ok(format!("would listen on 127.0.0.1:{port}")));
    }

    let listener = lucli_daemon::bind(port).map_err(LucliError::Io)?;
    let dispatcher = FacadeDispatcher { lucli_home: ctx.lucli_home.clone() };

    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = interrupted.clone();
    let _ = ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst));

    tracing::info!(port, "daemon listening on loopback");
    lucli_daemon::serve(&listener, &dispatcher, || interrupted.load(Ordering::SeqCst)).map_err(LucliError::Io)?;

    Ok(CommandResult::ok(format!("daemon on port {port} stopped")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NeverConfirm;

    #[test]
    fn dry_run_reports_port_without_binding() {
        let td = tempfile::tempdir().unwrap();
        let mut confirm = NeverConfirm;
        let mut c = Context {
            home_config: crate::home::LucliHomeConfig::load(&td.path().join("home")),
            lucli_home: td.path().join("home"),
            cwd: td.path().to_path_buf(),
            dry_run: DryRun(true),
            confirm: &mut confirm,
        };
        let result = dispatch(&["--port".to_string(), "54321".to_string()], &mut c).unwrap();
        assert!(result.output.contains("54321"));
    }
}
