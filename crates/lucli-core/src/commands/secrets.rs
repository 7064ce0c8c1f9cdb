//! `secrets {init|set|get|list|rm}` command group (§4.6, C3).
//!
//! Values and descriptions are ordinary positional/`--flag` arguments
//! rather than an interactive no-echo prompt: the facade runs identically
//! behind the daemon, which has no terminal to prompt on, so only the
//! store *passphrase* (via [`lucli_secrets::acquire_passphrase`], env var
//! first) gets that treatment. A CLI front end that wants an interactive
//! prompt for the secret value itself can still collect it before calling
//! in here — this command body just never assumes it can.

use std::time::Duration;

use lucli_types::LucliError;

use super::args::Args;
use crate::{CommandResult, Context};

pub fn dispatch(argv: &[String], ctx: &mut Context) -> Result<CommandResult, LucliError> {
    let args = Args::new(argv);
    let Some(sub) = args.positional(0) else {
        return Err(LucliError::Usage("secrets requires a subcommand: init|set|get|list|rm".to_string()));
    };
    match sub {
        "init" => init(&args, ctx),
        "set" => set(&args, ctx),
        "get" => get(&args, ctx),
        "list" => list(ctx),
        "rm" => rm(&args, ctx),
        other => Err(LucliError::Usage(format!("unknown secrets subcommand {other:?}"))),
    }
}

fn open_store(ctx: &Context) -> Result<lucli_secrets::SecretStore, LucliError> {
    let passphrase = lucli_secrets::acquire_passphrase()?;
    lucli_secrets::SecretStore::open(&ctx.lucli_home, &passphrase)
}

fn init(args: &Args, ctx: &Context) -> Result<CommandResult, LucliError> {
    let reset = args.flag("reset");

    if ctx.dry_run.0 {
        return Ok(CommandResult::ok("would initialize the secret store"));
    }

    let passphrase = lucli_secrets::acquire_passphrase()?;
    let _lock = lucli_filelock::InstanceLock::acquire_with_timeout(&ctx.lucli_home, Duration::from_secs(60))?;
    lucli_secrets::SecretStore::init(&ctx.lucli_home, &passphrase, reset)?;
    Ok(CommandResult::ok("secret store initialized"))
}

fn set(args: &Args, ctx: &Context) -> Result<CommandResult, LucliError> {
    let name = args
        .positional(1)
        .ok_or_else(|| LucliError::Usage("secrets set requires NAME VALUE".to_string()))?;
    let value = args
        .positional(2)
        .ok_or_else(|| LucliError::Usage("secrets set requires NAME VALUE".to_string()))?;
    let description = args.value("description");

    if ctx.dry_run.0 {
        return Ok(CommandResult::ok(format!("would set secret {name}")));
    }

    let _lock = lucli_filelock::InstanceLock::acquire_with_timeout(&ctx.lucli_home, Duration::from_secs(60))?;
    let mut store = open_store(ctx)?;
    store.set(name, value, description)?;
    Ok(CommandResult::ok(format!("set secret {name}")))
}

fn get(args: &Args, ctx: &Context) -> Result<CommandResult, LucliError> {
    let name = args
        .positional(1)
        .ok_or_else(|| LucliError::Usage("secrets get requires NAME".to_string()))?;
    if !args.flag("show") {
        return Err(LucliError::Usage(
            "secrets get requires --show to print a secret value to stdout".to_string(),
        ));
    }
    let store = open_store(ctx)?;
    let value = store.get(name)?;
    Ok(CommandResult::ok(value))
}

fn list(ctx: &Context) -> Result<CommandResult, LucliError> {
    let store = open_store(ctx)?;
    let summaries = store.list();
    if summaries.is_empty() {
        return Ok(CommandResult::ok("no secrets stored"));
    }
    let body = summaries
        .iter()
        .map(|s| match &s.description {
            Some(desc) => format!("{} - {desc}", s.name),
            None => s.name.clone(),
        })
        .collect::<Vec<_>>()
        .join("\n");
    Ok(CommandResult::ok(body))
}

fn rm(args: &Args, ctx: &Context) -> Result<CommandResult, LucliError> {
    let name = args
        .positional(1)
        .ok_or_else(|| LucliError::Usage("secrets rm requires NAME".to_string()))?;

    if ctx.dry_run.0 {
        return Ok(CommandResult::ok(format!("would remove secret {name}")));
    }

    let _lock = lucli_filelock::InstanceLock::acquire_with_timeout(&ctx.lucli_home, Duration::from_secs(60))?;
    let mut store = open_store(ctx)?;
    store.delete(name)?;
    Ok(CommandResult::ok(format!("removed secret {name}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DryRun, NeverConfirm};
    use std::path::PathBuf;

    fn ctx<'a>(lucli_home: PathBuf, confirm: &'a mut dyn crate::Confirm) -> Context<'a> {
        Context {
            home_config: crate::home::LucliHomeConfig::load(&lucli_home),
            cwd: lucli_home.clone(),
            lucli_home,
            dry_run: DryRun(false),
            confirm,
        }
    }

    #[test]
    fn dispatch_without_subcommand_is_usage_error() {
        let td = tempfile::tempdir().unwrap();
        let mut confirm = NeverConfirm;
        let mut c = ctx(td.path().join("home"), &mut confirm);
        let err = dispatch(&[], &mut c).unwrap_err();
        assert!(matches!(err, LucliError::Usage(_)));
    }

    #[test]
    fn get_without_show_flag_is_usage_error() {
        let td = tempfile::tempdir().unwrap();
        let mut confirm = NeverConfirm;
        let mut c = ctx(td.path().join("home"), &mut confirm);
        let args = Args::new(&["get".to_string(), "db.password".to_string()]);
        let err = get(&args, &mut c).unwrap_err();
        assert!(matches!(err, LucliError::Usage(_)));
    }

    #[test]
    #[serial_test::serial]
    fn init_then_set_then_list_roundtrips() {
        temp_env::with_var(lucli_secrets::PASSPHRASE_ENV_VAR, Some("correct horse"), || {
            let td = tempfile::tempdir().unwrap();
            let mut confirm = NeverConfirm;
            let mut c = ctx(td.path().join("home"), &mut confirm);

            init(&Args::new(&[]), &mut c).unwrap();
            set(
                &Args::new(&["set".to_string(), "db.password".to_string(), "hunter2".to_string()]),
                &mut c,
            )
            .unwrap();

            let listed = list(&mut c).unwrap();
            assert!(listed.output.contains("db.password"));

            let fetched = get(&Args::new(&["get".to_string(), "db.password".to_string(), "--show".to_string()]), &mut c).unwrap();
            assert_eq!(fetched.output, "hunter2");
        });
    }

    #[test]
    fn rm_without_name_is_usage_error() {
        let td = tempfile::tempdir().unwrap();
        let mut confirm = NeverConfirm;
        let mut c = ctx(td.path().join("home"), &mut confirm);
        let err = rm(&Args::new(&[]), &mut c).unwrap_err();
        assert!(matches!(err, LucliError::Usage(_)));
    }
}
