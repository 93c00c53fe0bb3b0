use anyhow::{Context, Result, bail};
use schemars::{Schema, schema_for};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use tracing::{debug, trace};

use super::actions::{ActionDef, MouseTarget};
use super::models::{ActionDescriptor, QueueDocument};
use crate::utils::interpolation;

/// Parse a queue document from an already-decoded JSON value.
///
/// Accepts a bare array of actions or an object with `settings`/`actions`.
/// Only the document shape is checked here; see `validate_queue` for the rest.
pub fn parse_queue_value(value: Value) -> Result<QueueDocument> {
    match value {
        Value::Array(_) => {
            let actions: Vec<ActionDescriptor> =
                serde_json::from_value(value).context("Failed to parse action list")?;
            Ok(QueueDocument {
                settings: None,
                actions,
            })
        }
        Value::Object(_) => {
            serde_json::from_value(value).context("Failed to parse queue document")
        }
        other => bail!("A queue must be a JSON array or object, got {other}"),
    }
}

/// Load a queue document from a string slice.
pub fn load_from_str(s: &str) -> Result<QueueDocument> {
    let value: Value = serde_json::from_str(s).context("Failed to parse JSON queue string")?;
    parse_queue_value(value)
}

/// Load a queue document from any reader (e.g., a file).
pub fn load_from_reader<R: Read>(reader: R) -> Result<QueueDocument> {
    let value: Value =
        serde_json::from_reader(reader).context("Failed to parse JSON queue from reader")?;
    parse_queue_value(value)
}

/// Load a queue document from a file path synchronously.
pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<QueueDocument> {
    let path_ref = path.as_ref();
    let file = File::open(path_ref)
        .with_context(|| format!("Failed to open queue file {}", path_ref.display()))?;
    let doc = load_from_reader(file)
        .with_context(|| format!("Invalid queue file {}", path_ref.display()))?;
    debug!(target: "screenqueue::config", actions = doc.actions.len(), "Loaded queue from {}", path_ref.display());
    Ok(doc)
}

/// Load a queue document from a file path asynchronously (Tokio).
pub async fn load_from_path_async<P: AsRef<Path>>(path: P) -> Result<QueueDocument> {
    use tokio::fs;
    let path_ref = path.as_ref();
    let bytes = fs::read(path_ref)
        .await
        .with_context(|| format!("Failed to read queue file {}", path_ref.display()))?;
    let value: Value = serde_json::from_slice(&bytes)
        .with_context(|| format!("Failed to parse JSON queue from {}", path_ref.display()))?;
    let doc = parse_queue_value(value)?;
    debug!(target: "screenqueue::config", actions = doc.actions.len(), "Loaded queue from {}", path_ref.display());
    Ok(doc)
}

/// Generate the JSON Schema for queue documents.
pub fn generate_schema() -> Schema {
    schema_for!(QueueDocument)
}

/// Generate the JSON Schema for typed actions (the shape each `{type, params}` must take).
pub fn generate_action_schema() -> Schema {
    schema_for!(ActionDef)
}

/// Write the queue JSON Schema to any writer (pretty-printed).
pub fn write_schema_to_writer<W: Write>(mut writer: W) -> Result<()> {
    let schema = generate_schema();
    let json = serde_json::to_string_pretty(&schema).context("Failed to serialize schema")?;
    writer
        .write_all(json.as_bytes())
        .context("Failed to write schema to writer")?;
    Ok(())
}

/// Check a whole queue before running it.
///
/// - settings are in range
/// - every action has a known type and well-formed params
/// - execute identifiers are unique
/// - mouse `result` targets and `{{id...}}` tokens of interpolated text refer to an earlier identifier
///
/// The runner performs the same checks lazily; this gives a dry verdict up front.
pub fn validate_queue(doc: &QueueDocument) -> Result<()> {
    if let Some(settings) = &doc.settings {
        settings.check().context("Invalid queue settings")?;
    }

    let mut seen = BTreeSet::<String>::new();
    for (idx, descriptor) in doc.actions.iter().enumerate() {
        let action = descriptor
            .to_action()
            .with_context(|| format!("Invalid action #{idx} ('{}')", descriptor.action_type))?;

        validate_action_refs(&action.def, &seen)
            .with_context(|| format!("Invalid reference in action #{idx}"))?;

        if let Some(id) = action.execute_identifier {
            trace!(target: "screenqueue::config", %id, idx, "Registering identifier");
            if !seen.insert(id.clone()) {
                bail!("Action #{idx} reuses execute_identifier '{id}'");
            }
        }
    }
    Ok(())
}

fn validate_action_refs(action: &ActionDef, earlier: &BTreeSet<String>) -> Result<()> {
    match action {
        ActionDef::Mouse(params) => {
            if let Some(MouseTarget::Result(id)) = &params.target {
                if !earlier.contains(id) {
                    bail!("Mouse target refers to '{id}', which no earlier action defines");
                }
            }
        }
        ActionDef::SendText(params) if params.interpolate => {
            for id in interpolation::referenced_identifiers(&params.text) {
                if !earlier.contains(&id) {
                    bail!("Text refers to '{id}', which no earlier action defines");
                }
            }
        }
        // Leaf actions: nothing to validate
        ActionDef::SendText(_)
        | ActionDef::Screenshot(_)
        | ActionDef::FindImage(_)
        | ActionDef::FindText(_)
        | ActionDef::SendHotkey(_)
        | ActionDef::Delay(_) => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_array_and_document_forms() {
        let doc = load_from_str(r#"[{"type": "delay", "params": {"duration": 0}}]"#).unwrap();
        assert!(doc.settings.is_none());
        assert_eq!(doc.actions.len(), 1);

        let doc = load_from_str(
            r#"{"settings": {"threshold": 0.9}, "actions": [{"type": "delay"}]}"#,
        )
        .unwrap();
        let settings = doc.settings.unwrap();
        assert_eq!(settings.threshold, 0.9);
        assert_eq!(settings.scale_factor, 1.0);
        assert_eq!(doc.actions[0].action_type, "delay");
    }

    #[test]
    fn scalar_is_rejected() {
        assert!(load_from_str("42").is_err());
    }

    #[test]
    fn validate_accepts_forward_flow() {
        let doc = load_from_str(
            r#"[
                {"type": "find_image", "params": {"src_image": "s.png", "target_image": "t.png", "execute_identifier": "btn"}},
                {"type": "mouse", "params": {"operation": "click", "target": {"result": "btn"}}},
                {"type": "send_hotkey", "params": {"hot_keys": ["ctrl", "c"], "execute_identifier": "copy"}},
                {"type": "send_text", "params": {"text": "got {{copy.result.clipboard}}", "interpolate": true}}
            ]"#,
        )
        .unwrap();
        validate_queue(&doc).unwrap();
    }

    #[test]
    fn validate_ignores_braces_in_literal_text() {
        let doc = load_from_str(r#"[{"type": "send_text", "params": {"text": "Hello {{ name }}!"}}]"#).unwrap();
        validate_queue(&doc).unwrap();

        let doc = load_from_str(
            r#"[{"type": "send_text", "params": {"text": "Hello {{ name }}!", "interpolate": true}}]"#,
        )
        .unwrap();
        let err = format!("{:#}", validate_queue(&doc).unwrap_err());
        assert!(err.contains("name"), "{err}");
    }

    #[test]
    fn validate_rejects_dangling_reference() {
        let doc = load_from_str(
            r#"[{"type": "mouse", "params": {"operation": "move", "target": {"result": "nope"}}}]"#,
        )
        .unwrap();
        let err = format!("{:#}", validate_queue(&doc).unwrap_err());
        assert!(err.contains("nope"), "{err}");
    }

    #[test]
    fn validate_rejects_duplicates_and_unknown_types() {
        let doc = load_from_str(
            r#"[
                {"type": "delay", "params": {"duration": 0, "execute_identifier": "a"}},
                {"type": "delay", "params": {"duration": 0, "execute_identifier": "a"}}
            ]"#,
        )
        .unwrap();
        assert!(validate_queue(&doc).is_err());

        let doc = load_from_str(r#"[{"type": "jump"}]"#).unwrap();
        let err = format!("{:#}", validate_queue(&doc).unwrap_err());
        assert!(err.contains("jump"), "{err}");
    }

    #[test]
    fn schema_mentions_actions() {
        let mut buf = Vec::new();
        write_schema_to_writer(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("actions"));
        let action_schema = serde_json::to_string(&generate_action_schema()).unwrap();
        assert!(action_schema.contains("find_image"));
    }
}
