//! Error classification for the ingestion pipeline.
//!
//! Only fatal conditions are represented here. Unparsable legends, ambiguous
//! live latencies and failing tag predicates degrade individual fields and
//! never surface as a [`ParkError`].

use std::path::PathBuf;

use thiserror::Error;

/// Fatal pipeline error. Any of these aborts the requested read entirely.
#[derive(Debug, Error)]
pub enum ParkError {
    /// Upstream unreachable, non-success status, timeout, or a query-level
    /// error payload.
    #[error("upstream error: {0}")]
    Upstream(String),

    /// Upstream has no published package, or local configuration is unusable.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The downloaded archive violates the package contract.
    #[error("package format error: {0}")]
    PackageFormat(String),

    /// The extracted snapshot could not be opened or queried.
    #[error("failed to read snapshot {path:?}")]
    Snapshot {
        #[source]
        source: sqlx::Error,
        path: PathBuf,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ParkError {
    /// Classify a transport failure. Timeouts are upstream errors too.
    pub(crate) fn from_transport(context: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ParkError::Upstream(format!("{context}: request timed out"))
        } else {
            ParkError::Upstream(format!("{context}: {err}"))
        }
    }
}

pub type Result<T> = std::result::Result<T, ParkError>;
