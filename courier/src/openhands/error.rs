//! API client error types.

use std::path::Path;
use thiserror::Error;

/// Errors from the OpenHands API clients.
#[derive(Debug, Error)]
pub enum ApiError {
    /// No usable API key was provided or found in the environment.
    #[error("Missing API key. Set OPENHANDS_API_KEY or pass a key explicitly.")]
    MissingApiKey,

    /// Transport-level failure or a malformed response body.
    #[error("API request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("API call failed (HTTP {status}). url={url} Response: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Redacted form of the request URL.
        url: String,
        /// Response body, truncated to 500 characters.
        body: String,
    },

    /// The server returned a shape the client could not interpret.
    #[error("Unexpected response shape from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    /// A prompt or output file could not be read or written.
    #[error("Failed to access '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A downloaded trajectory archive could not be opened or extracted.
    #[error("Failed to extract archive '{path}': {source}")]
    Archive {
        path: String,
        #[source]
        source: zip::result::ZipError,
    },

    /// A conversation did not reach a terminal state in time.
    #[error("Conversation {conversation_id} did not reach a terminal state within {timeout_secs}s")]
    PollTimeout {
        conversation_id: String,
        timeout_secs: u64,
    },

    /// A start task did not reach a terminal state in time.
    #[error("Start task {task_id} did not reach a terminal state within {timeout_secs}s")]
    StartTaskTimeout { task_id: String, timeout_secs: u64 },
}

impl ApiError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }

    pub(crate) fn archive(path: &Path, source: zip::result::ZipError) -> Self {
        Self::Archive {
            path: path.display().to_string(),
            source,
        }
    }
}
