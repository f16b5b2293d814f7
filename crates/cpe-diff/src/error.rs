//! Error types for the diff harness

use reqwest::StatusCode;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for harness operations
pub type HarnessResult<T> = Result<T, HarnessError>;

/// Errors that stop a diff run
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Invalid run configuration
    #[error("invalid configuration value for '{key}': {reason}")]
    Config { key: String, reason: String },

    /// Key list file does not exist
    #[error("failed to find list path: {path}")]
    ListNotFound { path: PathBuf },

    /// Failed to read the key list
    #[error("failed to read list {path}: {source}")]
    ReadList {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A line of the key list has no `|` delimiter
    #[error("malformed line {line} in {path}: {content:?}")]
    MalformedInput {
        path: PathBuf,
        line: usize,
        content: String,
    },

    /// A backend never answered its health endpoint
    #[error("failed to communicate with {backend} at {url} after {attempts} attempts")]
    HealthCheck {
        backend: String,
        url: String,
        attempts: u32,
    },

    /// A fetch failed in a way that invalidates the run
    #[error("failed to fetch {key} ({path}) from {backend}: {source}")]
    Fetch {
        key: String,
        path: String,
        backend: String,
        #[source]
        source: FetchError,
    },

    /// Failed to reset or write the diff output directory
    #[error("failed to write diff artifact {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A worker task panicked or was aborted
    #[error("diff worker failed: {0}")]
    Worker(String),

    /// The run was cancelled before every sampled key was compared
    #[error("run cancelled with {cancelled} of {sampled} keys unprocessed")]
    Cancelled { cancelled: usize, sampled: usize },
}

/// Errors from a single backend request
#[derive(Debug, Error)]
pub enum FetchError {
    /// The host could not be reached
    #[error("failed to connect to {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Connected, but the response did not arrive in time
    #[error("timed out reading {url}: {source}")]
    Timeout {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Still busy after every allowed attempt
    #[error("{url} still returned {status} after {attempts} attempts")]
    RetriesExhausted {
        url: String,
        status: StatusCode,
        attempts: u32,
    },

    /// Body was not valid JSON
    #[error("failed to decode JSON from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    /// Any other request-level failure
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The request URL could not be built
    #[error("invalid request url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

impl FetchError {
    /// Whether the run may continue past this error by skipping the key.
    ///
    /// Only a read timeout qualifies: the backend was reachable, just slow.
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Timeout { .. })
    }

    /// Classify a transport error from reqwest
    pub(crate) fn from_reqwest(url: &str, source: reqwest::Error) -> Self {
        let url = url.to_string();
        if source.is_connect() {
            FetchError::Connect { url, source }
        } else if source.is_timeout() {
            FetchError::Timeout { url, source }
        } else {
            FetchError::Request { url, source }
        }
    }
}

impl HarnessError {
    pub(crate) fn config(key: &str, reason: impl Into<String>) -> Self {
        HarnessError::Config {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}
