//! Job specification templating.
//!
//! Templates are raw bytes containing `[[ key ]]` placeholders. Rendering is a
//! single left-to-right pass: each placeholder is replaced by its value, and
//! values are never rescanned. Anything that looks like a placeholder but has
//! no value is reported instead of being shipped to the scheduler.

use std::collections::HashMap;
use std::sync::LazyLock;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use regex::bytes::Regex;

use super::error::RenderError;

/// Key the requested version is substituted under.
pub const VERSION_KEY: &str = "version";

#[allow(clippy::expect_used)]
static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[\[([^\[\]]*)\]\]").expect("placeholder pattern is valid")
});

/// Decode the job specification as stored in the scheduler (base64, possibly
/// line-wrapped or followed by a newline).
///
/// # Errors
/// Returns the decode error if the stored value is not valid base64.
pub fn decode_jobspec(raw: &[u8]) -> Result<Vec<u8>, base64::DecodeError> {
    let compact: Vec<u8> = raw
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    STANDARD.decode(compact)
}

/// Merge the service settings with the requested version. The version always
/// wins over a `version` entry in the settings.
#[must_use]
pub fn substitution_values(
    mut settings: HashMap<String, String>,
    version: &str,
) -> HashMap<String, String> {
    settings.insert(VERSION_KEY.to_owned(), version.to_owned());
    settings
}

/// Replace every `[[ key ]]` in `template` with `values[key]`.
///
/// # Errors
/// Returns `RenderError` listing every placeholder left without a value,
/// including misspelled ones such as `[[PORT]]`.
pub fn render(template: &[u8], values: &HashMap<String, String>) -> Result<Vec<u8>, RenderError> {
    let mut out = Vec::with_capacity(template.len());
    let mut unresolved: Vec<String> = Vec::new();
    let mut last = 0;

    for caps in PLACEHOLDER.captures_iter(template) {
        let Some(token) = caps.get(0) else {
            continue;
        };
        let key = caps.get(1).map_or(&b""[..], |m| m.as_bytes().trim_ascii());

        out.extend_from_slice(&template[last..token.start()]);
        if let Some(value) = lookup(token.as_bytes(), key, values) {
            out.extend_from_slice(value.as_bytes());
        } else {
            let token = String::from_utf8_lossy(token.as_bytes()).into_owned();
            if !unresolved.contains(&token) {
                unresolved.push(token);
            }
        }
        last = token.end();
    }
    out.extend_from_slice(&template[last..]);

    if unresolved.is_empty() {
        Ok(out)
    } else {
        Err(RenderError { tokens: unresolved })
    }
}

// Only the canonical `[[ key ]]` spelling is substituted.
fn lookup<'a>(token: &[u8], key: &[u8], values: &'a HashMap<String, String>) -> Option<&'a str> {
    let key = std::str::from_utf8(key).ok()?;
    if token != format!("[[ {key} ]]").as_bytes() {
        return None;
    }
    values.get(key).map(String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn template_without_placeholders_is_unchanged() {
        let template = b"job \"wiki\" {\n  datacenters = [\"dc1\"]\n}\n";
        let out = render(template, &values(&[("PORT", "8080")])).unwrap();
        assert_eq!(out, template);
    }

    #[test]
    fn replaces_every_occurrence() {
        let out = render(
            b"[[ PORT ]]:[[ PORT ]]/[[ PORT ]]",
            &values(&[("PORT", "8080")]),
        )
        .unwrap();
        assert_eq!(out, b"8080:8080/8080");
    }

    #[test]
    fn renders_settings_and_version() {
        let settings = values(&[("PORT", "8080")]);
        let out = render(
            b"port=[[ PORT ]] v=[[ version ]]",
            &substitution_values(settings, "v1.2.3"),
        )
        .unwrap();
        assert_eq!(out, b"port=8080 v=v1.2.3");
    }

    #[test]
    fn request_version_overrides_settings_entry() {
        let settings = values(&[("version", "stale")]);
        let out = render(b"[[ version ]]", &substitution_values(settings, "@fresh")).unwrap();
        assert_eq!(out, b"@fresh");
    }

    #[test]
    fn values_are_not_rescanned() {
        let out = render(
            b"[[ A ]] [[ B ]]",
            &values(&[("A", "[[ B ]]"), ("B", "b")]),
        )
        .unwrap();
        assert_eq!(out, b"[[ B ]] b");
    }

    #[test]
    fn unresolved_placeholders_are_errors() {
        let err = render(
            b"[[ PORT ]] [[ HOST ]] [[PORT]] [[ HOST ]]",
            &values(&[("PORT", "8080")]),
        )
        .unwrap_err();
        assert_eq!(err.tokens, vec!["[[ HOST ]]", "[[PORT]]"]);
    }

    #[test]
    fn keys_may_contain_spaces() {
        let out = render(b"a=[[ MY KEY ]]", &values(&[("MY KEY", "x")])).unwrap();
        assert_eq!(out, b"a=x");
    }

    #[test]
    fn spaced_tokens_without_values_are_errors() {
        let err = render(
            b"a=[[ MY KEY ]] b=[[ not set ]] c=[[MY KEY]] d=[[ ]]",
            &values(&[("MY KEY", "x")]),
        )
        .unwrap_err();
        assert_eq!(err.tokens, vec!["[[ not set ]]", "[[MY KEY]]", "[[ ]]"]);
    }

    #[test]
    fn preserves_non_utf8_bytes() {
        let template = b"\xff\xfe [[ PORT ]] \x80";
        let out = render(template, &values(&[("PORT", "1")])).unwrap();
        assert_eq!(out, b"\xff\xfe 1 \x80");
    }

    #[test]
    fn decode_round_trips_arbitrary_bytes() {
        let original: Vec<u8> = (0..=255u8).rev().chain(0..=255u8).collect();
        let encoded = format!("{}\n", STANDARD.encode(&original));
        assert_eq!(decode_jobspec(encoded.as_bytes()).unwrap(), original);
    }

    #[test]
    fn decode_accepts_wrapped_input() {
        let encoded = STANDARD.encode(b"job \"wiki\" {}");
        let (head, tail) = encoded.split_at(8);
        let wrapped = format!("{head}\n{tail}\n");
        assert_eq!(decode_jobspec(wrapped.as_bytes()).unwrap(), b"job \"wiki\" {}");
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode_jobspec(b"not base64!").is_err());
    }
}
