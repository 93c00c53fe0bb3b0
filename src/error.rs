//! Error types surfaced by the action interpreter and the queue runner.
//!
//! Every failed step maps to one `ActionError` variant so automation scripts can
//! react to the cause (missing image vs. bad params vs. input failure) instead of
//! parsing messages. The loader and the binary keep using `anyhow` on top.

use std::path::PathBuf;

use thiserror::Error;

/// Failure of a single action.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("unknown action type '{0}'")]
    UnknownActionType(String),

    #[error("invalid params for '{action_type}': {reason}")]
    InvalidParams { action_type: String, reason: String },

    #[error("image {target} was not found in {source_image}")]
    ImageNotFound {
        target: PathBuf,
        source_image: String,
    },

    #[error("text '{text}' was not found in {source_image}")]
    TextNotFound { text: String, source_image: String },

    #[error("input injection failed: {0}")]
    InputInjectionFailed(String),

    #[error("result lookup failed for '{identifier}': {reason}")]
    ResultLookupFailed { identifier: String, reason: String },

    #[error("execute_identifier '{0}' is already used in this run")]
    DuplicateIdentifier(String),

    #[error("screen capture failed: {0}")]
    Capture(String),

    #[error("ocr failed: {0}")]
    Ocr(String),

    #[error("image error for {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("i/o error for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid setting: {0}")]
    InvalidSetting(String),
}

impl ActionError {
    pub(crate) fn invalid_params(action_type: &str, reason: impl Into<String>) -> Self {
        Self::InvalidParams {
            action_type: action_type.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn lookup(identifier: &str, reason: impl Into<String>) -> Self {
        Self::ResultLookupFailed {
            identifier: identifier.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn image(path: impl Into<PathBuf>, source: image::ImageError) -> Self {
        Self::Image {
            path: path.into(),
            source,
        }
    }
}

/// A queue run stopped at `index` because the action there failed.
#[derive(Debug, Error)]
#[error("action #{index} ('{action_type}') failed: {source}")]
pub struct QueueError {
    pub index: usize,
    pub action_type: String,
    pub execute_identifier: Option<String>,
    #[source]
    pub source: ActionError,
}

pub type ActionResult<T> = std::result::Result<T, ActionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_error_names_index_and_type() {
        let err = QueueError {
            index: 3,
            action_type: "bogus".into(),
            execute_identifier: None,
            source: ActionError::UnknownActionType("bogus".into()),
        };
        let msg = err.to_string();
        assert!(msg.contains("#3"));
        assert!(msg.contains("unknown action type 'bogus'"));
    }
}
