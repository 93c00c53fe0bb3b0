use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;

use crate::config::Point;
use crate::error::{ActionError, ActionResult};
use crate::vision::matcher::ImageMatch;
use crate::vision::ocr::TextMatch;

/// Result of one executed action.
///
/// The JSON view (used by dotted-path lookups) is
/// `{"action": "...", "coordinates": {"x", "y"} | null, "result": {"kind": "...", ...}}`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StoredResult {
    /// Action type that produced this record.
    pub action: String,
    /// Point associated with the action: the located point for searches, the
    /// pointer position after mouse actions. Absent otherwise.
    pub coordinates: Option<Point>,
    pub result: ActionOutput,
}

/// Typed per-kind payload.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionOutput {
    Screenshot {
        path: PathBuf,
        width: u32,
        height: u32,
    },
    ImageSearch(ImageMatch),
    TextSearch(TextMatch),
    Mouse {
        position: Point,
    },
    Text {
        chars: usize,
    },
    Hotkey {
        keys: Vec<String>,
        clipboard: Option<String>,
    },
    Delay {
        waited_ms: u64,
    },
}

/// Results of the current run, keyed by execute identifier.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct ResultStore {
    entries: HashMap<String, StoredResult>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.entries.contains_key(identifier)
    }

    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Drop every entry. Called at the start of each queue run.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Store (or overwrite) a record. Returns the previous one, if any.
    pub fn set(&mut self, identifier: impl Into<String>, record: StoredResult) -> Option<StoredResult> {
        self.entries.insert(identifier.into(), record)
    }

    /// The whole record for `identifier`.
    pub fn record(&self, identifier: &str) -> ActionResult<&StoredResult> {
        self.entries
            .get(identifier)
            .ok_or_else(|| ActionError::lookup(identifier, "no result stored under this identifier"))
    }

    /// Coordinates recorded by `identifier` (e.g. where an image was found).
    pub fn coordinates(&self, identifier: &str) -> ActionResult<Point> {
        self.record(identifier)?.coordinates.ok_or_else(|| {
            ActionError::lookup(
                identifier,
                "result has no coordinates (nothing was found, or the action does not locate anything)",
            )
        })
    }

    /// Dotted-path lookup into the JSON view of a record, e.g. `get("copy", "result.clipboard")`.
    /// An empty path returns the whole record. A missing identifier, a missing path
    /// segment or a `null` leaf is an error.
    pub fn get(&self, identifier: &str, path: &str) -> ActionResult<Value> {
        let record = self.record(identifier)?;
        let view = serde_json::to_value(record)
            .map_err(|e| ActionError::lookup(identifier, format!("cannot serialize result: {e}")))?;
        match get_json_path(&view, path) {
            Some(Value::Null) => Err(ActionError::lookup(
                identifier,
                format!("'{path}' is null"),
            )),
            Some(v) => Ok(v.clone()),
            None => Err(ActionError::lookup(
                identifier,
                format!("path '{path}' not found"),
            )),
        }
    }
}

/// Get a JSON value by a dotted path (e.g., "result.position.x").
/// Numeric segments index into arrays.
fn get_json_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }
    let mut current = value;
    for seg in path.split('.') {
        match current {
            Value::Object(map) => {
                current = map.get(seg)?;
            }
            Value::Array(items) => {
                current = items.get(seg.parse::<usize>().ok()?)?;
            }
            _ => return None,
        }
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn hotkey(clip: Option<&str>) -> StoredResult {
        StoredResult {
            action: "send_hotkey".into(),
            coordinates: None,
            result: ActionOutput::Hotkey {
                keys: vec!["ctrl".into(), "c".into()],
                clipboard: clip.map(str::to_string),
            },
        }
    }

    #[test]
    fn test_get_json_path() {
        let v = json!({"a":{"b":{"c":"ok"}}, "list": [1, {"x": 2}]});
        assert_eq!(get_json_path(&v, "a.b.c"), Some(&Value::String("ok".into())));
        assert_eq!(get_json_path(&v, "list.1.x"), Some(&json!(2)));
        assert!(get_json_path(&v, "a.b.x").is_none());
        assert!(get_json_path(&v, "a.b.c.d").is_none());
        assert!(get_json_path(&v, "list.9").is_none());
    }

    #[test]
    fn get_resolves_nested_fields() {
        let mut store = ResultStore::new();
        store.set("copy", hotkey(Some("hello")));
        assert_eq!(store.get("copy", "result.clipboard").unwrap(), json!("hello"));
        assert_eq!(store.get("copy", "result.kind").unwrap(), json!("hotkey"));
        assert_eq!(store.get("copy", "action").unwrap(), json!("send_hotkey"));
        assert!(store.get("copy", "").unwrap().is_object());
    }

    #[test]
    fn lookups_fail_clearly() {
        let mut store = ResultStore::new();
        store.set("copy", hotkey(None));

        let err = store.get("missing", "result").unwrap_err();
        assert!(err.to_string().contains("missing"));

        let err = store.get("copy", "result.nope").unwrap_err();
        assert!(err.to_string().contains("result.nope"));

        // null leaf counts as absent
        assert!(store.get("copy", "result.clipboard").is_err());
        assert!(store.coordinates("copy").is_err());
    }

    #[test]
    fn set_overwrites_and_clear_empties() {
        let mut store = ResultStore::new();
        assert!(store.set("a", hotkey(Some("1"))).is_none());
        assert!(store.set("a", hotkey(Some("2"))).is_some());
        assert_eq!(store.get("a", "result.clipboard").unwrap(), json!("2"));
        assert_eq!(store.len(), 1);
        store.clear();
        assert!(store.is_empty());
        assert!(!store.contains("a"));
    }

    #[test]
    fn coordinates_accessor() {
        let mut store = ResultStore::new();
        store.set(
            "m",
            StoredResult {
                action: "mouse".into(),
                coordinates: Some(Point::new(3, 4)),
                result: ActionOutput::Mouse {
                    position: Point::new(3, 4),
                },
            },
        );
        assert_eq!(store.coordinates("m").unwrap(), Point::new(3, 4));
        assert_eq!(store.get("m", "coordinates.y").unwrap(), json!(4));
    }
}
