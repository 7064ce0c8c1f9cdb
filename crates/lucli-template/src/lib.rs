//! Template rendering for generated configuration files (§4.2, C5).
//!
//! Two passes, always in this order: `${name}` placeholder replacement
//! against a caller-supplied mapping (unknown tokens warn, they don't
//! fail), then `<!-- IF_TAG -->...<!-- END_IF_TAG -->` conditional block
//! evaluation against a caller-supplied boolean mapping. Nested blocks
//! are not supported; an unbalanced or nested marker is a fatal template
//! error, since it means the builder produced an inconsistent template.

use std::collections::BTreeMap;
use std::path::Path;

use lucli_types::{LucliError, Warning};

/// Replace every `${name}` token in `input` using `values`. A token with
/// no entry in `values` is left as a warning, not a failure.
pub fn replace_placeholders(input: &str, values: &BTreeMap<String, String>) -> (String, Vec<Warning>) {
    let mut out = String::with_capacity(input.len());
    let mut warnings = Vec::new();
    let bytes = input.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'$' && bytes.get(i + 1) == Some(&b'{') {
            if let Some(end_rel) = input[i + 2..].find('}') {
                let name = &input[i + 2..i + 2 + end_rel];
                match values.get(name) {
                    Some(value) => out.push_str(value),
                    None => {
                        warnings.push(Warning::new(format!("unknown template placeholder: ${{{name}}}")));
                        out.push_str(&input[i..i + 2 + end_rel + 1]);
                    }
                }
                i += 2 + end_rel + 1;
                continue;
            }
        }
        let ch_len = input[i..].chars().next().map(char::len_utf8).unwrap_or(1);
        out.push_str(&input[i..i + ch_len]);
        i += ch_len;
    }

    (out, warnings)
}

const IF_PREFIX: &str = "<!-- IF_";
const END_IF_PREFIX: &str = "<!-- END_IF_";
const MARKER_SUFFIX: &str = " -->";

/// Evaluate `<!-- IF_TAG -->...<!-- END_IF_TAG -->` blocks against
/// `conditions`. A tag with no entry in `conditions` is treated as false.
/// Unbalanced or nested markers are fatal.
pub fn apply_conditionals(input: &str, conditions: &BTreeMap<String, bool>) -> Result<String, LucliError> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    loop {
        let Some(if_pos) = rest.find(IF_PREFIX) else {
            out.push_str(rest);
            break;
        };

        out.push_str(&rest[..if_pos]);
        let after_prefix = &rest[if_pos + IF_PREFIX.len()..];
        let Some(suffix_rel) = after_prefix.find(MARKER_SUFFIX) else {
            return Err(LucliError::RuntimeMisconfigured(
                "unterminated IF_TAG marker in template".to_string(),
            ));
        };
        let tag = &after_prefix[..suffix_rel];
        validate_tag(tag)?;

        let end_marker = format!("<!-- END_IF_{tag} -->");
        let body_start = if_pos + IF_PREFIX.len() + suffix_rel + MARKER_SUFFIX.len();
        let body_and_after = &rest[body_start..];

        let Some(end_rel) = body_and_after.find(&end_marker) else {
            return Err(LucliError::RuntimeMisconfigured(format!(
                "unbalanced conditional block: IF_{tag} has no matching END_IF_{tag}"
            )));
        };
        let body = &body_and_after[..end_rel];

        if body.contains(IF_PREFIX) {
            return Err(LucliError::RuntimeMisconfigured(format!(
                "nested conditional blocks are not supported (inside IF_{tag})"
            )));
        }

        if conditions.get(tag).copied().unwrap_or(false) {
            out.push_str(body);
        }

        rest = &body_and_after[end_rel + end_marker.len()..];
    }

    Ok(out)
}

fn validate_tag(tag: &str) -> Result<(), LucliError> {
    let is_upper_snake = !tag.is_empty()
        && tag
            .chars()
            .all(|c| c.is_ascii_uppercase() || c == '_' || c.is_ascii_digit());
    if !is_upper_snake {
        return Err(LucliError::RuntimeMisconfigured(format!(
            "conditional tag {tag:?} is not UPPER_SNAKE_CASE"
        )));
    }
    Ok(())
}

/// Render a template string through both passes.
pub fn render(
    input: &str,
    values: &BTreeMap<String, String>,
    conditions: &BTreeMap<String, bool>,
) -> Result<(String, Vec<Warning>), LucliError> {
    let (replaced, warnings) = replace_placeholders(input, values);
    let rendered = apply_conditionals(&replaced, conditions)?;
    Ok((rendered, warnings))
}

/// Render a template and write it atomically (write-to-temp, rename) so a
/// concurrently-starting process never observes a half-written file.
pub fn render_to_file(
    template: &str,
    values: &BTreeMap<String, String>,
    conditions: &BTreeMap<String, bool>,
    out_path: &Path,
) -> Result<Vec<Warning>, LucliError> {
    let (rendered, warnings) = render(template, values, conditions)?;
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp_path = out_path.with_extension(format!(
        "{}.tmp",
        out_path.extension().and_then(|e| e.to_str()).unwrap_or("tmp")
    ));
    std::fs::write(&tmp_path, rendered)?;
    std::fs::rename(&tmp_path, out_path)?;
    Ok(warnings)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn conditions(pairs: &[(&str, bool)]) -> BTreeMap<String, bool> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn replaces_known_placeholders() {
        let (out, warnings) = replace_placeholders("port=${port}", &values(&[("port", "8080")]));
        assert_eq!(out, "port=8080");
        assert!(warnings.is_empty());
    }

    #[test]
    fn unknown_placeholder_warns_but_keeps_literal() {
        let (out, warnings) = replace_placeholders("${unknown}", &values(&[]));
        assert_eq!(out, "${unknown}");
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn retains_block_body_when_condition_true() {
        let input = "a<!-- IF_URLREWRITE_ENABLED -->rewrite-filter<!-- END_IF_URLREWRITE_ENABLED -->b";
        let out = apply_conditionals(input, &conditions(&[("URLREWRITE_ENABLED", true)])).unwrap();
        assert_eq!(out, "arewrite-filterb");
    }

    #[test]
    fn removes_block_body_when_condition_false() {
        let input = "a<!-- IF_ADMIN_ENABLED -->admin-servlet<!-- END_IF_ADMIN_ENABLED -->b";
        let out = apply_conditionals(input, &conditions(&[("ADMIN_ENABLED", false)])).unwrap();
        assert_eq!(out, "ab");
    }

    #[test]
    fn missing_condition_entry_defaults_to_false() {
        let input = "<!-- IF_X -->body<!-- END_IF_X -->";
        let out = apply_conditionals(input, &conditions(&[])).unwrap();
        assert_eq!(out, "");
    }

    #[test]
    fn unbalanced_marker_is_fatal() {
        let input = "<!-- IF_X -->body";
        assert!(apply_conditionals(input, &conditions(&[("X", true)])).is_err());
    }

    #[test]
    fn nested_blocks_are_rejected() {
        let input = "<!-- IF_X --><!-- IF_Y -->body<!-- END_IF_Y --><!-- END_IF_X -->";
        assert!(apply_conditionals(input, &conditions(&[("X", true), ("Y", true)])).is_err());
    }

    #[test]
    fn non_upper_snake_tag_is_rejected() {
        let input = "<!-- IF_lowercase -->body<!-- END_IF_lowercase -->";
        assert!(apply_conditionals(input, &conditions(&[])).is_err());
    }

    #[test]
    fn render_applies_both_passes_in_order() {
        let input = "host=${host}<!-- IF_HTTPS_ENABLED -->\nhttps.port=${httpsPort}<!-- END_IF_HTTPS_ENABLED -->";
        let (out, _) = render(
            input,
            &values(&[("host", "127.0.0.1"), ("httpsPort", "8443")]),
            &conditions(&[("HTTPS_ENABLED", true)]),
        )
        .unwrap();
        assert_eq!(out, "host=127.0.0.1\nhttps.port=8443");
    }

    #[test]
    fn render_to_file_writes_atomically() {
        let td = tempfile::tempdir().unwrap();
        let out_path = td.path().join("server.xml");
        render_to_file("port=${port}", &values(&[("port", "8080")]), &conditions(&[]), &out_path).unwrap();
        assert_eq!(std::fs::read_to_string(&out_path).unwrap(), "port=8080");
        assert!(!out_path.with_extension("xml.tmp").exists());
    }
}
