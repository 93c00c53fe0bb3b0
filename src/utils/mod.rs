//! Utilities for screenqueue.
//!
//! Submodules:
//! - `interpolation`: `{{identifier.path}}` templating against earlier action results.

pub mod interpolation;
