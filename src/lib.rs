#![forbid(unsafe_code)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

//! screenqueue: screen-driven desktop automation from JSON action queues.
//!
//! A queue is an ordered list of `{type, params}` descriptors (screenshot, image
//! and text search, mouse, typing, hotkeys, delays). Actions run one after another;
//! each result is stored under its `execute_identifier` so later actions can click
//! on what an earlier search found or type what an earlier hotkey copied.
//!
//! - `config`: settings, queue documents, typed actions, loader and schema helpers.
//! - `error`: the action and queue error types.
//! - `executor`: input executor, result store and the queue runtime.
//! - `sources`: queue sources (file, stdin) for the long-running binary.
//! - `utils`: `{{id.path}}` interpolation.
//! - `vision`: screen capture, template matching and OCR lookup.
//!
//! Use `screenqueue::prelude::*` to bring commonly used items into scope quickly.

/// Public module: configuration (models, loader, schema helpers).
pub mod config;
/// Public module: error types.
pub mod error;
/// Public module: execution engine (input, result store, runtime).
pub mod executor;
/// Public module: queue sources (file, stdin).
pub mod sources;
/// Public module: utilities (interpolation).
pub mod utils;
/// Public module: capture, matching and OCR.
pub mod vision;

/// Crate-level constants for consumers that want to inspect package metadata at runtime.
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Returns the crate version (e.g., "0.1.0").
#[inline]
pub const fn version() -> &'static str {
    PKG_VERSION
}

/// Parse a level name (trace|debug|info|warn|error).
pub fn parse_level(s: &str) -> Option<tracing::Level> {
    use tracing::Level;
    match s.trim().to_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" | "warning" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

/// Initialize tracing (logging).
/// - `level` wins when given.
/// - Otherwise honors `RUST_LOG` as a simple level name.
/// - Falls back to `info`.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init_tracing(level: Option<tracing::Level>) {
    use tracing_subscriber::fmt;

    let level = level
        .or_else(|| std::env::var("RUST_LOG").ok().as_deref().and_then(parse_level))
        .unwrap_or(tracing::Level::INFO);

    // Ignore the error if the global subscriber was already set.
    let _ = fmt().with_max_level(level).try_init();
}

/// A convenient set of exports for most consumers.
///
/// Bring this into scope with:
/// `use screenqueue::prelude::*;`
pub mod prelude {
    pub use anyhow::{Context, Error, Result, anyhow, bail, ensure};

    pub use serde::{Deserialize, Serialize};

    pub use tracing::{debug, error, info, instrument, trace, warn};

    pub use std::time::Duration;

    pub use crate as screenqueue;
    pub use enigo;
    pub use rand;

    pub use crate::config::{Action, ActionDef, ActionDescriptor, QueueDocument, Settings};
    pub use crate::error::{ActionError, ActionResult, QueueError};
    pub use crate::executor::{QueueReport, ResultStore, Runtime};
    pub use crate::{config, executor, sources, utils, vision};
}
