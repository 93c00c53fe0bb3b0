use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_valid::Validate;
use std::path::PathBuf;

use crate::error::{ActionError, ActionResult};

use super::actions::{Action, ActionDef};

/// Runtime settings for a queue run.
///
/// Owned by the `Runtime`; every field applies to all subsequent actions until changed
/// through one of the runtime setters or a queue document carrying its own `settings`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Validate, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Multiplier from image pixel space to input coordinate space.
    /// Reported match coordinates are multiplied by this value.
    #[validate(exclusive_minimum = 0.0)]
    pub scale_factor: f32,

    /// Minimum template-matching confidence (0..=1) for a match to count as found.
    #[validate(minimum = 0.0)]
    #[validate(maximum = 1.0)]
    pub threshold: f32,

    /// Verbose tracing plus annotated match images written to `debug_dir`.
    pub debug: bool,

    /// Where debug images go.
    pub debug_dir: PathBuf,

    /// Record failed actions and keep going instead of stopping the queue.
    pub continue_on_error: bool,

    /// Log input actions instead of simulating them (virtual pointer and clipboard).
    pub dry_run: bool,

    /// Attempts per queued action before it counts as failed (1 = no retry).
    #[validate(minimum = 1)]
    pub max_retries: u32,

    /// Wait before reading the clipboard after a copy/cut/paste chord.
    pub clipboard_settle_ms: u64,

    /// Pause between typed characters (0 types the whole string at once).
    pub type_interval_ms: u64,

    /// OCR engine settings used by `find_text`.
    pub ocr: OcrSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            scale_factor: 1.0,
            threshold: 0.8,
            debug: false,
            debug_dir: PathBuf::from("debug"),
            continue_on_error: false,
            dry_run: false,
            max_retries: 1,
            clipboard_settle_ms: 300,
            type_interval_ms: 0,
            ocr: OcrSettings::default(),
        }
    }
}

impl Settings {
    /// Range-check the numeric fields.
    pub fn check(&self) -> ActionResult<()> {
        if !self.scale_factor.is_finite() || !self.threshold.is_finite() {
            return Err(ActionError::InvalidSetting(
                "scale_factor and threshold must be finite".into(),
            ));
        }
        self.validate()
            .map_err(|e| ActionError::InvalidSetting(e.to_string()))
    }
}

/// Tesseract invocation defaults.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct OcrSettings {
    /// Program name or path of the tesseract executable.
    pub tesseract: PathBuf,
    /// Language codes passed with `-l` (e.g. "eng" or "chi_sim+eng").
    pub lang: String,
    /// Extra engine options (e.g. "--oem 3 --psm 6").
    pub config: String,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            tesseract: PathBuf::from("tesseract"),
            lang: "eng".into(),
            config: "--oem 3 --psm 6".into(),
        }
    }
}

/// One automation step as written by the caller: `{ "type": ..., "params": {...} }`.
///
/// Params are only checked when the step is dispatched (`to_action`), so a queue
/// with a bad step still runs every step before it.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ActionDescriptor {
    #[serde(rename = "type")]
    pub action_type: String,
    #[serde(default)]
    pub params: Value,
}

impl ActionDescriptor {
    pub fn new(action_type: impl Into<String>, params: Value) -> Self {
        Self {
            action_type: action_type.into(),
            params,
        }
    }

    /// The caller-supplied `params.execute_identifier`, if it is a string.
    pub fn execute_identifier(&self) -> Option<&str> {
        self.params.get("execute_identifier").and_then(Value::as_str)
    }

    /// Convert into a typed action.
    ///
    /// Fails with `UnknownActionType` for an unrecognized `type` and with
    /// `InvalidParams` when the params do not fit that type's record.
    pub fn to_action(&self) -> ActionResult<Action> {
        let kind = self.action_type.as_str();
        if !ActionDef::KINDS.contains(&kind) {
            return Err(ActionError::UnknownActionType(self.action_type.clone()));
        }

        let mut params = match &self.params {
            Value::Null => serde_json::Map::new(),
            Value::Object(map) => map.clone(),
            other => {
                return Err(ActionError::invalid_params(
                    kind,
                    format!("params must be an object, got {other}"),
                ));
            }
        };

        let execute_identifier = match params.remove("execute_identifier") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) if !s.is_empty() => Some(s),
            Some(other) => {
                return Err(ActionError::invalid_params(
                    kind,
                    format!("execute_identifier must be a non-empty string, got {other}"),
                ));
            }
        };

        let tagged = serde_json::json!({ "type": kind, "params": Value::Object(params) });
        let def: ActionDef = serde_json::from_value(tagged)
            .map_err(|e| ActionError::invalid_params(kind, e.to_string()))?;

        Ok(Action {
            execute_identifier,
            def,
        })
    }
}

/// A queue document: optional settings plus the ordered actions.
///
/// On disk either `{ "settings": {...}, "actions": [...] }` or a bare array of actions.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
pub struct QueueDocument {
    #[serde(default)]
    pub settings: Option<Settings>,
    #[serde(default)]
    pub actions: Vec<ActionDescriptor>,
}

/// Queue source configuration for the long-running mode of the binary.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceConfig {
    /// Poll a single file for queue documents.
    File {
        path: String,
        /// Poll interval in milliseconds (default: 100).
        #[serde(default)]
        poll_ms: Option<u64>,
        /// Delete the file after it was read (default: false).
        #[serde(default)]
        delete_on_success: Option<bool>,
    },

    /// Read newline-delimited queue documents from standard input.
    Stdin,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::actions::{MouseOperation, MouseTarget};
    use serde_json::json;

    #[test]
    fn settings_defaults_are_valid() {
        Settings::default().check().unwrap();
    }

    #[test]
    fn settings_reject_out_of_range() {
        let mut s = Settings::default();
        s.threshold = 1.5;
        assert!(matches!(s.check(), Err(ActionError::InvalidSetting(_))));

        let mut s = Settings::default();
        s.scale_factor = 0.0;
        assert!(s.check().is_err());

        let mut s = Settings::default();
        s.scale_factor = f32::NAN;
        assert!(s.check().is_err());

        let mut s = Settings::default();
        s.max_retries = 0;
        assert!(s.check().is_err());
    }

    #[test]
    fn max_retries_defaults_to_one_attempt() {
        assert_eq!(Settings::default().max_retries, 1);
        let s: Settings = serde_json::from_value(json!({"max_retries": 3})).unwrap();
        assert_eq!(s.max_retries, 3);
        s.check().unwrap();
    }

    #[test]
    fn descriptor_extracts_identifier() {
        let d = ActionDescriptor::new(
            "mouse",
            json!({"operation": "move", "target": {"at": {"x": 5, "y": 6}}, "execute_identifier": "m1"}),
        );
        assert_eq!(d.execute_identifier(), Some("m1"));
        let action = d.to_action().unwrap();
        assert_eq!(action.execute_identifier.as_deref(), Some("m1"));
        match action.def {
            ActionDef::Mouse(p) => {
                assert_eq!(p.operation, MouseOperation::Move);
                assert!(matches!(p.target, Some(MouseTarget::At(_))));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn descriptor_unknown_type() {
        let d = ActionDescriptor::new("teleport", Value::Null);
        assert!(matches!(
            d.to_action(),
            Err(ActionError::UnknownActionType(t)) if t == "teleport"
        ));
    }

    #[test]
    fn descriptor_invalid_params() {
        let d = ActionDescriptor::new("send_text", json!({"txt": "typo"}));
        let err = d.to_action().unwrap_err();
        assert!(matches!(err, ActionError::InvalidParams { ref action_type, .. } if action_type == "send_text"));

        let d = ActionDescriptor::new("delay", json!([1, 2]));
        assert!(matches!(d.to_action(), Err(ActionError::InvalidParams { .. })));
    }

    #[test]
    fn null_params_use_defaults() {
        let d = ActionDescriptor::new("delay", Value::Null);
        match d.to_action().unwrap().def {
            ActionDef::Delay(p) => assert_eq!(p.duration, 1.0),
            other => panic!("unexpected {other:?}"),
        }
    }
}
