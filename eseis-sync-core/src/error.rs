//! Error taxonomy shared by every stage of the synchronisation pipeline.
//!
//! Errors carry enough context (endpoint, identifier, path) to be logged as the
//! last line of a failed run. Whether a given error ends the run or only the
//! current item is decided by [`ErrorPolicy`].

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure of the credential exchange or of token bookkeeping.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("authentication request to {endpoint} failed: {source}")]
    Request {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("authentication rejected by {endpoint} with status {status}")]
    Rejected { endpoint: String, status: u16 },

    #[error("malformed authentication response: {0}")]
    Malformed(String),
}

/// Failure inside the browser-driven snapshot pipeline.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("failed to launch browser: {0}")]
    Launch(String),

    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("element {selector} never became ready: {reason}")]
    Readiness { selector: String, reason: String },

    #[error("script evaluation failed: {0}")]
    Script(String),

    #[error("input into {selector} failed: {reason}")]
    Input { selector: String, reason: String },

    #[error("print to PDF failed: {0}")]
    Print(String),

    #[error("browser produced an empty PDF for {0}")]
    EmptyPdf(String),

    #[error("browser session is not logged in")]
    NotAuthenticated,

    #[error("browser session is closed")]
    Closed,

    #[error("lost connection to the browser: {0}")]
    Disconnected(String),
}

/// Top-level error for API calls, exports and traversal.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("request to {endpoint} failed: {reason}")]
    Transport { endpoint: String, reason: String },

    #[error("could not decode response from {endpoint}: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("could not encode metadata for {}: {source}", path.display())]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("filesystem operation on {} failed: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl SyncError {
    pub fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SyncError::Filesystem {
            path: path.into(),
            source,
        }
    }

    pub fn transport(endpoint: impl Into<String>, reason: impl ToString) -> Self {
        SyncError::Transport {
            endpoint: endpoint.into(),
            reason: reason.to_string(),
        }
    }

    /// Errors that invalidate every later remote call or browser interaction.
    pub fn is_always_fatal(&self) -> bool {
        matches!(
            self,
            SyncError::Auth(_)
                | SyncError::Config(_)
                | SyncError::Snapshot(SnapshotError::Closed)
                | SyncError::Snapshot(SnapshotError::NotAuthenticated)
                | SyncError::Snapshot(SnapshotError::Disconnected(_))
        )
    }
}

/// Decides whether an error ends the whole run or only the current item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// First error of any kind ends the run.
    Abort,
    /// Item-level errors are logged, recorded and skipped.
    #[default]
    SkipItem,
}

impl ErrorPolicy {
    pub fn tolerates(&self, error: &SyncError) -> bool {
        match self {
            ErrorPolicy::Abort => false,
            ErrorPolicy::SkipItem => !error.is_always_fatal(),
        }
    }
}
