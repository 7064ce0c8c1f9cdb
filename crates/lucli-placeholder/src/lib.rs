//! Placeholder substitution for LuCLI configuration values (§4.2, C1).
//!
//! Three forms are recognized inside a string value:
//!
//! - `${NAME}` — resolved against the environment chain; unresolved is fatal.
//! - `${NAME:-default}` — falls back to the literal default when unresolved.
//! - `${secret:NAME}` — resolved against the secret store.
//!
//! Substitution walks every string in a `serde_json::Value` tree, including
//! the opaque `configuration` sub-tree LuCLI otherwise never interprets, so
//! a value and a secret can be referenced from inside engine-specific
//! configuration too.

use lucli_types::LucliError;
use serde_json::Value;

/// Supplies the values a placeholder resolves against.
pub trait Resolver {
    /// Look up a plain `${NAME}` reference (environment, `.env`, built-ins).
    fn resolve_env(&self, name: &str) -> Option<String>;
    /// Look up a `${secret:NAME}` reference against the secret store.
    fn resolve_secret(&self, name: &str) -> Result<Option<String>, LucliError>;
}

/// A resolver backed purely by a fixed map, useful for tests and for
/// resolving the ambient home-directory config (SPEC_FULL.md ambient stack).
#[derive(Debug, Clone, Default)]
pub struct MapResolver {
    pub env: std::collections::BTreeMap<String, String>,
    pub secrets: std::collections::BTreeMap<String, String>,
}

impl Resolver for MapResolver {
    fn resolve_env(&self, name: &str) -> Option<String> {
        self.env.get(name).cloned()
    }

    fn resolve_secret(&self, name: &str) -> Result<Option<String>, LucliError> {
        Ok(self.secrets.get(name).cloned())
    }
}

enum Token<'a> {
    Env { name: &'a str, default: Option<&'a str> },
    Secret { name: &'a str },
}

fn parse_token(inner: &str) -> Token<'_> {
    if let Some(name) = inner.strip_prefix("secret:") {
        return Token::Secret { name };
    }
    if let Some((name, default)) = inner.split_once(":-") {
        return Token::Env {
            name,
            default: Some(default),
        };
    }
    Token::Env {
        name: inner,
        default: None,
    }
}

/// Substitute every `${...}` placeholder in `input`. `path` identifies the
/// field being substituted, for error reporting (§7's `PlaceholderUnresolved`).
pub fn substitute(path: &str, input: &str, resolver: &dyn Resolver) -> Result<String, LucliError> {
    let mut out = String::with_capacity(input.len());
    let bytes = input.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'$' && bytes.get(i + 1) == Some(&b'{') {
            let Some(end_rel) = input[i + 2..].find('}') else {
                out.push_str(&input[i..]);
                break;
            };
            let inner = &input[i + 2..i + 2 + end_rel];
            match parse_token(inner) {
                Token::Env { name, default } => match resolver.resolve_env(name) {
                    Some(value) => out.push_str(&value),
                    None => match default {
                        Some(default) => out.push_str(default),
                        None => {
                            return Err(LucliError::PlaceholderUnresolved {
                                path: path.to_string(),
                                name: name.to_string(),
                            });
                        }
                    },
                },
                Token::Secret { name } => match resolver.resolve_secret(name)? {
                    Some(value) => out.push_str(&value),
                    None => {
                        return Err(LucliError::PlaceholderUnresolved {
                            path: path.to_string(),
                            name: format!("secret:{name}"),
                        });
                    }
                },
            }
            i += 2 + end_rel + 1;
        } else {
            let ch_len = input[i..].chars().next().map(char::len_utf8).unwrap_or(1);
            out.push_str(&input[i..i + ch_len]);
            i += ch_len;
        }
    }

    Ok(out)
}

/// Recursively substitute placeholders through a JSON value tree, dotted
/// `path` accumulating the field path for error messages.
pub fn substitute_value(path: &str, value: &Value, resolver: &dyn Resolver) -> Result<Value, LucliError> {
    match value {
        Value::String(s) => Ok(Value::String(substitute(path, s, resolver)?)),
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for (idx, item) in items.iter().enumerate() {
                out.push(substitute_value(&format!("{path}[{idx}]"), item, resolver)?);
            }
            Ok(Value::Array(out))
        }
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (key, val) in map {
                let child_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{path}.{key}")
                };
                out.insert(key.clone(), substitute_value(&child_path, val, resolver)?);
            }
            Ok(Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> MapResolver {
        let mut r = MapResolver::default();
        r.env.insert("HOST".into(), "example.com".into());
        r.secrets.insert("DB_PASSWORD".into(), "hunter2".into());
        r
    }

    #[test]
    fn substitutes_plain_reference() {
        let r = resolver();
        assert_eq!(
            substitute("x", "https://${HOST}/app", &r).unwrap(),
            "https://example.com/app"
        );
    }

    #[test]
    fn unresolved_plain_reference_is_fatal() {
        let r = resolver();
        let err = substitute("jvm.additionalArgs[0]", "${MISSING}", &r).unwrap_err();
        assert!(matches!(err, LucliError::PlaceholderUnresolved { .. }));
    }

    #[test]
    fn default_fallback_used_when_unresolved() {
        let r = resolver();
        assert_eq!(substitute("x", "${MISSING:-fallback}", &r).unwrap(), "fallback");
    }

    #[test]
    fn default_fallback_ignored_when_resolved() {
        let r = resolver();
        assert_eq!(substitute("x", "${HOST:-fallback}", &r).unwrap(), "example.com");
    }

    #[test]
    fn secret_reference_resolves_from_secret_store() {
        let r = resolver();
        assert_eq!(
            substitute("x", "${secret:DB_PASSWORD}", &r).unwrap(),
            "hunter2"
        );
    }

    #[test]
    fn unresolved_secret_is_fatal_with_secret_prefixed_name() {
        let r = resolver();
        let err = substitute("x", "${secret:MISSING}", &r).unwrap_err();
        match err {
            LucliError::PlaceholderUnresolved { name, .. } => assert_eq!(name, "secret:MISSING"),
            _ => panic!("wrong error kind"),
        }
    }

    #[test]
    fn substitutes_recursively_through_json_tree_including_configuration() {
        let r = resolver();
        let value = serde_json::json!({
            "host": "${HOST}",
            "configuration": { "datasource": { "url": "jdbc://${HOST}/db" } },
            "list": ["${HOST}", "literal"],
        });
        let out = substitute_value("", &value, &r).unwrap();
        assert_eq!(out["host"], "example.com");
        assert_eq!(out["configuration"]["datasource"]["url"], "jdbc://example.com/db");
        assert_eq!(out["list"][0], "example.com");
        assert_eq!(out["list"][1], "literal");
    }

    #[test]
    fn non_string_scalars_pass_through_unchanged() {
        let r = resolver();
        let value = serde_json::json!({"port": 8080, "enabled": true, "tag": null});
        let out = substitute_value("", &value, &r).unwrap();
        assert_eq!(out, value);
    }

    #[test]
    fn unterminated_placeholder_is_left_literal() {
        let r = resolver();
        assert_eq!(substitute("x", "abc${HOST", &r).unwrap(), "abc${HOST");
    }
}
