//! `install`/`uninstall`/`update` command group (§4.5, C10).

use lucli_config::SecretAccess;
use lucli_types::LucliError;

use super::args::Args;
use crate::{CommandResult, Context};

pub fn dispatch(command: &str, argv: &[String], ctx: &mut Context) -> Result<CommandResult, LucliError> {
    let args = Args::new(argv);
    match command {
        "install" => install(&args, ctx, false),
        "update" => install(&args, ctx, true),
        "uninstall" => uninstall(&args, ctx),
        other => Err(LucliError::Usage(format!("unknown dependency command {other:?}"))),
    }
}

fn install(args: &Args, ctx: &Context, force_default: bool) -> Result<CommandResult, LucliError> {
    let environment = args.value("env");
    let include_dev = args.flag("dev") || args.flag("include-dev");
    let force = args.flag("force") || force_default;

    let store = super::secret_access::open_if_needed(ctx)?;
    let (config, warnings) = lucli_config::load(&ctx.cwd, environment.as_deref(), store.as_ref(), SecretAccess::Allowed)?;
    let options = lucli_deps::InstallOptions { force, dry_run: ctx.dry_run.0, include_dev };

    if ctx.dry_run.0 {
        let existing_lock = lucli_lockfile::LockFile::load(&ctx.cwd)?;
        let plan = lucli_deps::plan(&config.webroot, &config, existing_lock.as_ref(), options);
        let output = serde_json::to_string_pretty(&plan)?;
        return Ok(CommandResult::ok_with_warnings(output, warnings));
    }

    let lock = lucli_deps::install_all(&ctx.cwd, &config, env!("CARGO_PKG_VERSION"), options)?;
    let count = lock.dependencies.len() + if include_dev { lock.dev_dependencies.len() } else { 0 };
    Ok(CommandResult::ok_with_warnings(
        format!("installed {count} dependencies into {}", config.webroot.display()),
        warnings,
    ))
}

fn uninstall(args: &Args, ctx: &Context) -> Result<CommandResult, LucliError> {
    let Some(name) = args.positional(0) else {
        return Err(LucliError::Usage("uninstall requires a dependency name".to_string()));
    };

    if ctx.dry_run.0 {
        return Ok(CommandResult::ok(format!("would uninstall {name}")));
    }

    let (config, _warnings) = lucli_config::load(&ctx.cwd, None, None, SecretAccess::Denied)?;
    if lucli_deps::uninstall(&ctx.cwd, &config.webroot, name)? {
        Ok(CommandResult::ok(format!("uninstalled {name}")))
    } else {
        Ok(CommandResult::ok(format!("{name} was not installed")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DryRun, NeverConfirm};
    use std::path::PathBuf;

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
    fn uninstall_without_name_is_usage_error() {
        let td = tempfile::tempdir().unwrap();
        let mut confirm = NeverConfirm;
        let mut c = ctx(td.path().join("home"), td.path().to_path_buf(), &mut confirm);
        let args = Args::new(&[]);
        let err = uninstall(&args, &mut c).unwrap_err();
        assert!(matches!(err, LucliError::Usage(_)));
    }

    #[test]
    fn uninstall_missing_project_config_is_config_not_found() {
        let td = tempfile::tempdir().unwrap();
        let mut confirm = NeverConfirm;
        let mut c = ctx(td.path().join("home"), td.path().to_path_buf(), &mut confirm);
        let args = Args::new(&["widget".to_string()]);
        let err = uninstall(&args, &mut c).unwrap_err();
        assert!(matches!(err, LucliError::ConfigNotFound(_)));
    }

    #[test]
    fn install_without_project_config_is_config_not_found() {
        let td = tempfile::tempdir().unwrap();
        let mut confirm = NeverConfirm;
        let mut c = ctx(td.path().join("home"), td.path().to_path_buf(), &mut confirm);
        let args = Args::new(&[]);
        let err = install(&args, &mut c, false).unwrap_err();
        assert!(matches!(err, LucliError::ConfigNotFound(_)));
    }
}
