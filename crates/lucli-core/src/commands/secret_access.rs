//! Shared helper for commands that materialize a project (`start`, `run`,
//! `install`, `update`): open the secret store only when the project's
//! configuration actually references `${secret:...}`, instead of
//! unconditionally prompting for a passphrase on every mutating command
//! (§4.1, §4.6).

use lucli_types::LucliError;

use crate::Context;

fn references_secret(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::String(s) => s.contains("${secret:"),
        serde_json::Value::Array(items) => items.iter().any(references_secret),
        serde_json::Value::Object(map) => map.values().any(references_secret),
        _ => false,
    }
}

/// Open the secret store for `ctx.cwd`'s project if (and only if) its
/// raw `lucee.json` references a secret placeholder anywhere.
pub fn open_if_needed(ctx: &Context) -> Result<Option<lucli_secrets::SecretStore>, LucliError> {
    let project = lucli_config::load_project_file(&ctx.cwd)?;
    if !references_secret(&project) {
        return Ok(None);
    }
    let passphrase = lucli_secrets::acquire_passphrase()?;
    Ok(Some(lucli_secrets::SecretStore::open(&ctx.lucli_home, &passphrase)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn references_secret_finds_nested_placeholder() {
        let value = serde_json::json!({"admin": {"password": "${secret:db.password}"}});
        assert!(references_secret(&value));
    }

    #[test]
    fn references_secret_false_for_plain_config() {
        let value = serde_json::json!({"admin": {"password": "${ADMIN_PASSWORD}"}});
        assert!(!references_secret(&value));
    }
}
