use serde_json::Value;

use crate::error::ActionResult;
use crate::executor::store::ResultStore;

/// Interpolate a template string with values from earlier action results.
///
/// Token format: `{{identifier.dotted.path}}`, resolved with `ResultStore::get`.
/// `{{identifier}}` alone renders the whole record as JSON.
///
/// Notes:
/// - Whitespace around the token content is ignored: `{{  id.path  }}` == `{{id.path}}`.
/// - Empty tokens (`{{}}`) and unterminated `{{` are left intact.
/// - An unknown identifier or path is an error, never an empty string.
/// - Non-string values are rendered as JSON (e.g., numbers as `42`, objects as `{"x":1}`).
pub fn interpolate_string(template: &str, store: &ResultStore) -> ActionResult<String> {
    let mut out = String::with_capacity(template.len());
    let mut idx = 0;
    let bytes = template.as_bytes();

    while let Some(start) = find_subslice(bytes, b"{{", idx) {
        // Push everything up to the start of the token
        out.push_str(&template[idx..start]);

        let content_start = start + 2;
        if let Some(end) = find_subslice(bytes, b"}}", content_start) {
            let token = template[content_start..end].trim();

            if token.is_empty() {
                out.push_str(&template[start..end + 2]);
            } else {
                let (identifier, path) = split_token(token);
                let value = store.get(identifier, path)?;
                out.push_str(&json_value_to_string(&value));
            }

            idx = end + 2;
        } else {
            // No matching end, push rest and stop
            out.push_str(&template[start..]);
            idx = template.len();
            break;
        }
    }

    if idx < template.len() {
        out.push_str(&template[idx..]);
    }

    Ok(out)
}

/// Identifiers referenced by `{{...}}` tokens in `template`, in order of appearance.
pub fn referenced_identifiers(template: &str) -> Vec<String> {
    let mut ids = Vec::new();
    let bytes = template.as_bytes();
    let mut idx = 0;

    while let Some(start) = find_subslice(bytes, b"{{", idx) {
        let content_start = start + 2;
        let Some(end) = find_subslice(bytes, b"}}", content_start) else {
            break;
        };
        let token = template[content_start..end].trim();
        if !token.is_empty() {
            ids.push(split_token(token).0.to_string());
        }
        idx = end + 2;
    }
    ids
}

/// Convert a JSON value to a user-friendly string:
/// - Strings are returned as-is.
/// - Numbers/bools are rendered via to_string().
/// - Arrays/objects are serialized as compact JSON.
pub fn json_value_to_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn split_token(token: &str) -> (&str, &str) {
    match token.split_once('.') {
        Some((id, path)) => (id.trim(), path.trim()),
        None => (token, ""),
    }
}

/// Find the first occurrence of `needle` in `haystack` starting at `from`.
fn find_subslice(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() || from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|pos| pos + from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Point;
    use crate::error::ActionError;
    use crate::executor::store::{ActionOutput, StoredResult};

    fn store_with_copy() -> ResultStore {
        let mut store = ResultStore::new();
        store.set(
            "copy",
            StoredResult {
                action: "send_hotkey".into(),
                coordinates: None,
                result: ActionOutput::Hotkey {
                    keys: vec!["ctrl".into(), "c".into()],
                    clipboard: Some("report.txt".into()),
                },
            },
        );
        store.set(
            "btn",
            StoredResult {
                action: "mouse".into(),
                coordinates: Some(Point::new(40, 12)),
                result: ActionOutput::Mouse {
                    position: Point::new(40, 12),
                },
            },
        );
        store
    }

    #[test]
    fn test_interpolate_store_values() {
        let store = store_with_copy();
        let out = interpolate_string(
            "Saving {{copy.result.clipboard}} at {{ btn.coordinates.x }},{{btn.coordinates.y}}",
            &store,
        )
        .unwrap();
        assert_eq!(out, "Saving report.txt at 40,12");
    }

    #[test]
    fn test_plain_text_and_empty_tokens() {
        let store = ResultStore::new();
        assert_eq!(interpolate_string("no tokens", &store).unwrap(), "no tokens");
        assert_eq!(interpolate_string("keep {{}} this", &store).unwrap(), "keep {{}} this");
        assert_eq!(interpolate_string("open {{end", &store).unwrap(), "open {{end");
    }

    #[test]
    fn test_missing_reference_is_an_error() {
        let store = store_with_copy();
        let err = interpolate_string("{{copy.result.missing}}", &store).unwrap_err();
        assert!(matches!(err, ActionError::ResultLookupFailed { ref identifier, .. } if identifier == "copy"));
        assert!(interpolate_string("{{ghost.result}}", &store).is_err());
    }

    #[test]
    fn test_non_string_values_render_as_json() {
        let store = store_with_copy();
        let out = interpolate_string("{{copy.result.keys}}", &store).unwrap();
        assert_eq!(out, r#"["ctrl","c"]"#);
    }

    #[test]
    fn test_referenced_identifiers() {
        let ids = referenced_identifiers("a {{one.result.x}} b {{ two }} {{}} {{three");
        assert_eq!(ids, vec!["one".to_string(), "two".to_string()]);
    }
}
