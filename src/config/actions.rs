//! Typed action records.
//!
//! `ActionDef` is the closed set of operations a queue can contain. Each variant
//! carries its own parameter record; the JSON form is
//! `{ "type": "<snake_case name>", "params": { ... } }`.

use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::PathBuf;

/// A typed action plus the identifier its result is stored under.
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    pub execute_identifier: Option<String>,
    pub def: ActionDef,
}

impl Action {
    pub fn new(def: ActionDef) -> Self {
        Self {
            execute_identifier: None,
            def,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.execute_identifier = Some(id.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(tag = "type", content = "params", rename_all = "snake_case")]
pub enum ActionDef {
    /// Capture the screen (or a region of it) to a file.
    Screenshot(ScreenshotParams),

    /// Locate a template image inside a source image.
    FindImage(FindImageParams),

    /// Locate a word inside a source image through OCR.
    FindText(FindTextParams),

    /// Move, click or scroll.
    Mouse(MouseParams),

    /// Type text. With `interpolate`, `{{identifier.path}}` tokens are filled from earlier results.
    SendText(SendTextParams),

    /// Press a key chord, e.g. `["ctrl", "c"]`.
    SendHotkey(SendHotkeyParams),

    /// Sleep.
    Delay(DelayParams),
}

impl ActionDef {
    /// Every accepted `type` string.
    pub const KINDS: [&'static str; 7] = [
        "screenshot",
        "find_image",
        "find_text",
        "mouse",
        "send_text",
        "send_hotkey",
        "delay",
    ];

    pub fn kind(&self) -> &'static str {
        match self {
            ActionDef::Screenshot(_) => "screenshot",
            ActionDef::FindImage(_) => "find_image",
            ActionDef::FindText(_) => "find_text",
            ActionDef::Mouse(_) => "mouse",
            ActionDef::SendText(_) => "send_text",
            ActionDef::SendHotkey(_) => "send_hotkey",
            ActionDef::Delay(_) => "delay",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ScreenshotParams {
    /// Output file; overwritten if it exists. The format follows the extension.
    pub screenshot_file: PathBuf,
    /// Crop to this region of the captured monitor.
    #[serde(default)]
    pub region: Option<Region>,
    /// Monitor index (default: the primary monitor).
    #[serde(default)]
    pub monitor: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FindImageParams {
    /// Image to search in. A live capture of the primary monitor when omitted.
    #[serde(default)]
    pub src_image: Option<PathBuf>,
    /// Template to look for.
    pub target_image: PathBuf,
    /// Per-action override of the configured match threshold.
    #[serde(default)]
    pub threshold: Option<f32>,
    /// Keep only matches whose surroundings also contain this image.
    #[serde(default)]
    pub target_context_image: Option<PathBuf>,
    /// Threshold for the context image (default: the match threshold).
    #[serde(default)]
    pub context_threshold: Option<f32>,
    /// Half-size in pixels of the area searched for the context image.
    #[serde(default = "default_context_area_size")]
    pub context_area_size: u32,
    #[serde(default)]
    pub preprocess_options: PreprocessOptions,
    /// Fail with `ImageNotFound` instead of returning a not-found result.
    #[serde(default)]
    pub fail_if_missing: bool,
}

fn default_context_area_size() -> u32 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FindTextParams {
    /// Image to read. A live capture of the primary monitor when omitted.
    #[serde(default)]
    pub src_image: Option<PathBuf>,
    /// Text to look for (case-insensitive substring of an OCR word).
    pub target_text: String,
    /// Words expected near the target; used to disambiguate several hits.
    #[serde(default, deserialize_with = "one_or_many")]
    pub target_context_text: Vec<String>,
    /// Maximum centre distance in pixels between the target and a context word.
    #[serde(default = "default_context_distance")]
    pub context_distance: f32,
    /// OCR languages (default: the configured ones).
    #[serde(default)]
    pub lang: Option<String>,
    /// OCR engine options (default: the configured ones).
    #[serde(default)]
    pub custom_config: Option<String>,
    #[serde(default)]
    pub preprocess_options: PreprocessOptions,
    /// Fail with `TextNotFound` instead of returning a not-found result.
    #[serde(default)]
    pub fail_if_missing: bool,
}

fn default_context_distance() -> f32 {
    10.0
}

/// Image preprocessing applied before matching or OCR. Images are always
/// converted to grayscale first.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(default)]
pub struct PreprocessOptions {
    /// Gaussian blur.
    pub blur: bool,
    /// Blur sigma (default: 1.5).
    pub blur_sigma: Option<f32>,
    /// Histogram equalization.
    pub equalize: bool,
    /// Binary threshold: pixels above `binarize_level` become white, others black.
    #[serde(alias = "threshold")]
    pub binarize: bool,
    /// Binarization level (default: 150).
    #[serde(alias = "threshold_value")]
    pub binarize_level: Option<u8>,
}

impl PreprocessOptions {
    pub fn is_noop(&self) -> bool {
        !self.blur && !self.equalize && !self.binarize
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct MouseParams {
    pub operation: MouseOperation,
    /// Where to act. Required for `move` and `drag`; `click` defaults to the cursor.
    #[serde(default)]
    pub target: Option<MouseTarget>,
    /// Added to the resolved target.
    #[serde(default)]
    pub offset: Option<Point>,
    #[serde(default, alias = "mouse_click_action")]
    pub click: ClickKind,
    /// Scroll amount; sign follows the platform convention.
    #[serde(default)]
    pub delta: i32,
    #[serde(default)]
    pub axis: ScrollAxis,
}

#[derive(Debug, Copy, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MouseOperation {
    Move,
    Click,
    Scroll,
    /// Press `click` at the cursor, move to the target, release.
    Drag,
}

/// Explicit coordinate source for a mouse action.
///
/// JSON: `"cursor"`, `{"at": {"x": 10, "y": 20}}` or `{"result": "find_button"}`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MouseTarget {
    /// Current pointer position.
    Cursor,
    /// Absolute screen coordinates.
    At(Point),
    /// Coordinates recorded by an earlier action with this execute identifier.
    Result(String),
}

#[derive(Debug, Copy, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ClickKind {
    #[default]
    Left,
    Right,
    Middle,
    Double,
}

#[derive(Debug, Copy, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScrollAxis {
    #[default]
    Vertical,
    Horizontal,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SendTextParams {
    pub text: String,
    /// Substitute `{{id.path}}` tokens from the result store. Off: the text is typed as written.
    #[serde(default)]
    pub interpolate: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SendHotkeyParams {
    /// Key names pressed together, in press order.
    pub hot_keys: Vec<String>,
    /// Read the clipboard after the chord. Defaults to true for copy/cut/paste chords.
    #[serde(default)]
    pub capture_clipboard: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct DelayParams {
    /// Seconds to wait.
    #[serde(default = "default_delay")]
    pub duration: f64,
    /// When set, wait a random duration in `[duration, max_duration]`.
    #[serde(default)]
    pub max_duration: Option<f64>,
}

fn default_delay() -> f64 {
    1.0
}

/// A screen point in input coordinates.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// `self` shifted by `offset`, or `None` when a coordinate overflows.
    pub fn checked_offset(self, offset: Option<Point>) -> Option<Self> {
        match offset {
            Some(o) => Some(Self::new(self.x.checked_add(o.x)?, self.y.checked_add(o.y)?)),
            None => Some(self),
        }
    }
}

/// A rectangle given by its edges: `(left, top)` inclusive, `(right, bottom)` exclusive.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct Region {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Region {
    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(s)) => vec![s],
        Some(OneOrMany::Many(v)) => v,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn kinds_match_serde_names() {
        let samples = vec![
            ActionDef::Screenshot(ScreenshotParams {
                screenshot_file: "s.png".into(),
                region: None,
                monitor: None,
            }),
            ActionDef::SendText(SendTextParams { text: "x".into(), interpolate: false }),
            ActionDef::Delay(DelayParams {
                duration: 0.0,
                max_duration: None,
            }),
        ];
        for def in samples {
            let v = serde_json::to_value(&def).unwrap();
            assert_eq!(v["type"], def.kind());
            assert!(ActionDef::KINDS.contains(&def.kind()));
        }
    }

    #[test]
    fn mouse_target_forms() {
        let t: MouseTarget = serde_json::from_value(json!("cursor")).unwrap();
        assert_eq!(t, MouseTarget::Cursor);
        let t: MouseTarget = serde_json::from_value(json!({"at": {"x": 1, "y": 2}})).unwrap();
        assert_eq!(t, MouseTarget::At(Point::new(1, 2)));
        let t: MouseTarget = serde_json::from_value(json!({"result": "btn"})).unwrap();
        assert_eq!(t, MouseTarget::Result("btn".into()));
    }

    #[test]
    fn click_alias_and_defaults() {
        let p: MouseParams =
            serde_json::from_value(json!({"operation": "click", "mouse_click_action": "double"}))
                .unwrap();
        assert_eq!(p.click, ClickKind::Double);
        assert!(p.target.is_none());
        assert_eq!(p.axis, ScrollAxis::Vertical);
    }

    #[test]
    fn context_text_accepts_string_or_list() {
        let p: FindTextParams = serde_json::from_value(
            json!({"target_text": "File", "target_context_text": "Edit"}),
        )
        .unwrap();
        assert_eq!(p.target_context_text, vec!["Edit".to_string()]);

        let p: FindTextParams = serde_json::from_value(
            json!({"target_text": "File", "target_context_text": ["Edit", "View"]}),
        )
        .unwrap();
        assert_eq!(p.target_context_text.len(), 2);

        let p: FindTextParams = serde_json::from_value(json!({"target_text": "File"})).unwrap();
        assert!(p.target_context_text.is_empty());
        assert_eq!(p.context_distance, 10.0);
    }

    #[test]
    fn preprocess_accepts_legacy_names() {
        let p: PreprocessOptions =
            serde_json::from_value(json!({"threshold": true, "threshold_value": 90, "gray": true}))
                .unwrap();
        assert!(p.binarize);
        assert_eq!(p.binarize_level, Some(90));
        assert!(!p.is_noop());
        assert!(PreprocessOptions::default().is_noop());
    }

    #[test]
    fn offset_overflow_is_detected() {
        let p = Point::new(10, -5);
        assert_eq!(p.checked_offset(None), Some(p));
        assert_eq!(p.checked_offset(Some(Point::new(3, 5))), Some(Point::new(13, 0)));
        assert_eq!(Point::new(i32::MAX, 0).checked_offset(Some(Point::new(1, 0))), None);
        assert_eq!(Point::new(0, i32::MIN).checked_offset(Some(Point::new(0, -1))), None);
    }

    #[test]
    fn send_text_is_literal_unless_asked() {
        let p: SendTextParams = serde_json::from_value(json!({"text": "Hello {{ name }}!"})).unwrap();
        assert!(!p.interpolate);
        let p: SendTextParams =
            serde_json::from_value(json!({"text": "{{a.b}}", "interpolate": true})).unwrap();
        assert!(p.interpolate);
    }

    #[test]
    fn drag_operation_parses() {
        let p: MouseParams = serde_json::from_value(
            json!({"operation": "drag", "target": {"at": {"x": 5, "y": 6}}, "click": "right"}),
        )
        .unwrap();
        assert_eq!(p.operation, MouseOperation::Drag);
        assert_eq!(p.click, ClickKind::Right);
    }
}
