use std::time::Duration;

use thiserror::Error;

use crate::records::CollectionKind;

/// Failure of a single backend request.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FetchError {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("backend returned HTTP {0}")]
    Status(u16),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("response body could not be decoded: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Transport(format!("timeout: {}", err))
        } else if err.is_decode() {
            FetchError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            FetchError::Status(status.as_u16())
        } else {
            FetchError::Transport(err.to_string())
        }
    }
}

/// A response that decoded as JSON but is neither `{count, results}` nor a bare array.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ShapeError {
    #[error("expected an object with `results` or an array, got {0}")]
    UnexpectedShape(&'static str),
    #[error("`results` is not an array")]
    ResultsNotArray,
}

/// The only error that reaches the presentation layer: nothing could be loaded.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("{kind} data unavailable: backend failed ({backend}) and snapshot unusable ({snapshot})")]
    Unavailable {
        kind: CollectionKind,
        backend: String,
        snapshot: String,
    },
    #[error("{kind} snapshot is unusable: {reason}")]
    Snapshot { kind: CollectionKind, reason: String },
}
