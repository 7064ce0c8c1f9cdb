//! `lucli`: the one-shot CLI front end. Parses argv into a command name
//! plus a trailing argument list and hands both straight to
//! `lucli_core::execute`, which is the same entrypoint interactive mode
//! and the daemon dispatcher use. This binary owns nothing but argv
//! parsing, a TTY confirmation prompt, and process exit codes.

use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use lucli_core::{Confirm, DryRun};

/// Operator's toolkit for Lucee/servlet application servers.
#[derive(Parser)]
#[command(name = "lucli", version, about)]
struct Cli {
    /// Override the LuCLI home directory (defaults to `$LUCLI_HOME` or `~/.lucli`).
    #[arg(long, global = true)]
    home: Option<PathBuf>,

    /// Report what would happen without changing anything on disk.
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Command,
}

/// One variant per top-level verb the command facade understands.
/// Each just forwards its trailing arguments verbatim; flag parsing
/// within a command body is `lucli_core::commands::args::Args`'s job,
/// not clap's, so the CLI, interactive mode, and the daemon all see
/// identical argument handling.
#[derive(Subcommand)]
enum Command {
    Start(Passthrough),
    Run(Passthrough),
    Stop(Passthrough),
    Restart(Passthrough),
    Status(Passthrough),
    List(Passthrough),
    Prune(Passthrough),
    Log(Passthrough),
    Monitor(Passthrough),
    Install(Passthrough),
    Uninstall(Passthrough),
    Update(Passthrough),
    Secrets(Passthrough),
    Daemon(Passthrough),
    #[command(name = "versions-list")]
    VersionsList(Passthrough),
}

#[derive(clap::Args)]
struct Passthrough {
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    rest: Vec<String>,
}

impl Command {
    fn name_and_args(&self) -> (&'static str, &[String]) {
        match self {
            Command::Start(p) => ("start", &p.rest),
            Command::Run(p) => ("run", &p.rest),
            Command::Stop(p) => ("stop", &p.rest),
            Command::Restart(p) => ("restart", &p.rest),
            Command::Status(p) => ("status", &p.rest),
            Command::List(p) => ("list", &p.rest),
            Command::Prune(p) => ("prune", &p.rest),
            Command::Log(p) => ("log", &p.rest),
            Command::Monitor(p) => ("monitor", &p.rest),
            Command::Install(p) => ("install", &p.rest),
            Command::Uninstall(p) => ("uninstall", &p.rest),
            Command::Update(p) => ("update", &p.rest),
            Command::Secrets(p) => ("secrets", &p.rest),
            Command::Daemon(p) => ("daemon", &p.rest),
            Command::VersionsList(p) => ("versions-list", &p.rest),
        }
    }
}

/// Confirms destructive operations (`prune` without `--force`) by
/// prompting on the controlling terminal. Piped/non-interactive stdin
/// declines automatically, so scripted invocations never hang waiting
/// for a prompt they can't answer.
struct TtyConfirm;

impl Confirm for TtyConfirm {
    fn confirm(&mut self, prompt: &str) -> bool {
        if !io::stdin().is_terminal() {
            return false;
        }
        eprint!("{prompt} [y/N] ");
        let _ = io::stderr().flush();
        let mut answer = String::new();
        if io::stdin().read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
    }
}

fn init_tracing(home_config: &lucli_core::LucliHomeConfig) {
    let default_level = home_config.verbosity.clone();
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(io::stderr).init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let lucli_home = lucli_core::home::resolve(cli.home.as_deref());
    let home_config = lucli_core::LucliHomeConfig::load(&lucli_home);
    init_tracing(&home_config);

    let cwd = match std::env::current_dir() {
        Ok(cwd) => cwd,
        Err(err) => {
            eprintln!("error: could not determine the current directory: {err}");
            return ExitCode::from(1);
        }
    };

    let (command, rest) = cli.command.name_and_args();
    let mut confirm = TtyConfirm;
    let result = lucli_core::execute(&lucli_home, command, rest, &cwd, DryRun(cli.dry_run), &mut confirm);

    for warning in &result.warnings {
        eprintln!("warning: {}", warning.message);
    }
    if !result.output.is_empty() {
        println!("{}", result.output);
    }

    ExitCode::from(result.exit_code.clamp(0, 255) as u8)
}
