//! Common runtime-base layout shared by every provider (§4.3, C6).

use std::fs;
use std::path::{Path, PathBuf};

use lucli_types::LucliError;

/// Every instance base directory carries this layout regardless of which
/// provider materializes it. `bin/setenv.{sh,bat}` is created only when
/// JVM options are non-empty; callers add it explicitly.
pub const BASE_SUBDIRS: &[&str] = &[
    "conf",
    "conf/Catalina/localhost",
    "lib",
    "logs",
    "temp",
    "work",
    "webapps",
    "engine-server",
    "engine-web",
];

/// The instance base directory for `name` under the LuCLI home.
pub fn base_dir(lucli_home: &Path, name: &str) -> PathBuf {
    lucli_home.join("servers").join(name)
}

/// Create the common subdirectory skeleton under `base`. Idempotent.
pub fn ensure_layout(base: &Path) -> Result<(), LucliError> {
    for sub in BASE_SUBDIRS {
        fs::create_dir_all(base.join(sub))?;
    }
    Ok(())
}

/// Whether a base directory has already been provisioned (has a `conf/server.xml`).
pub fn is_provisioned(base: &Path) -> bool {
    base.join("conf/server.xml").exists()
}

/// Regeneration is skipped when the base already exists unless `force` is
/// set; force wipes the base and rebuilds from scratch (§4.3 overwrite
/// discipline).
pub fn prepare_for_build(base: &Path, force: bool) -> Result<bool, LucliError> {
    if is_provisioned(base) {
        if !force {
            return Ok(false);
        }
        fs::remove_dir_all(base)?;
    }
    ensure_layout(base)?;
    Ok(true)
}

/// Write the `.environment` marker used to label the instance in registry
/// listings once an environment has been applied (§4.1).
pub fn write_environment_marker(base: &Path, environment: &str) -> Result<(), LucliError> {
    let path = base.join(".environment");
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, environment)?;
    fs::rename(&tmp, &path)?;
    Ok(())
}

/// Write `bin/setenv.sh` and `bin/setenv.bat` exporting `JAVA_OPTS`, only
/// when there is anything to set (§4.3).
pub fn write_setenv_scripts(base: &Path, java_opts: &[String]) -> Result<(), LucliError> {
    if java_opts.is_empty() {
        return Ok(());
    }
    let bin = base.join("bin");
    fs::create_dir_all(&bin)?;
    let opts = java_opts.join(" ");

    let sh_path = bin.join("setenv.sh");
    let sh_tmp = sh_path.with_extension("sh.tmp");
    fs::write(&sh_tmp, format!("#!/bin/sh\nexport JAVA_OPTS=\"{opts}\"\n"))?;
    fs::rename(&sh_tmp, &sh_path)?;

    let bat_path = bin.join("setenv.bat");
    let bat_tmp = bat_path.with_extension("bat.tmp");
    fs::write(&bat_tmp, format!("set JAVA_OPTS={opts}\r\n"))?;
    fs::rename(&bat_tmp, &bat_path)?;
    Ok(())
}
