//! Configuration module for screenqueue.
//!
//! Wires together the runtime settings, the queue document models, the typed
//! action records and the loading/validation helpers.
//!
//! Example:
//! use screenqueue::config::{load_from_path, validate_queue};
//!
//! let doc = load_from_path("queues/login.json")?;
//! validate_queue(&doc)?;

pub mod actions;
pub mod loader;
pub mod models;

// Re-export core data models
pub use actions::{
    Action, ActionDef, ClickKind, DelayParams, FindImageParams, FindTextParams, MouseOperation,
    MouseParams, MouseTarget, Point, PreprocessOptions, Region, ScreenshotParams, ScrollAxis,
    SendHotkeyParams, SendTextParams,
};
pub use models::{ActionDescriptor, OcrSettings, QueueDocument, Settings, SourceConfig};

// Re-export loader utilities
pub use loader::{
    generate_action_schema, generate_schema, load_from_path, load_from_path_async,
    load_from_reader, load_from_str, parse_queue_value, validate_queue, write_schema_to_writer,
};
