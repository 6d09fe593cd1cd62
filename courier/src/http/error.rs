//! Poster error types.

use super::RateLimitInfo;
use thiserror::Error;

/// Errors produced by [`post_json`](super::post_json).
///
/// Every variant carries the target URL in secret-redacted form; raw
/// webhook URLs never reach an error message.
#[derive(Debug, Error)]
pub enum PostError {
    /// Network-level failure (DNS, connection, timeout). Never retried.
    #[error("HTTP request failed ({source}). url={url}")]
    Transport {
        /// Redacted form of the target URL.
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Non-retryable HTTP failure: any status >= 400 other than a 429
    /// carrying usable retry information.
    #[error("HTTP request failed (HTTP {status}). url={url} Response: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Redacted form of the target URL.
        url: String,
        /// Response body, truncated to 500 characters.
        body: String,
    },

    /// A 429 persisted past the retry budget.
    #[error(
        "HTTP request failed (HTTP 429) after {attempts} attempts. url={url} {rate_limit} Response: {body}"
    )]
    RetryExhausted {
        /// Total attempts made, including the first.
        attempts: u32,
        /// Redacted form of the target URL.
        url: String,
        /// Diagnostics from the last rate-limited response.
        rate_limit: RateLimitInfo,
        /// Response body, truncated to 500 characters.
        body: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_exhausted_message_carries_diagnostics() {
        let error = PostError::RetryExhausted {
            attempts: 4,
            url: "https://host/api/webhooks/123/<redacted>".to_string(),
            rate_limit: RateLimitInfo {
                retry_after: 2.5,
                is_global: true,
                bucket: Some("abc".to_string()),
                remaining: Some("0".to_string()),
                reset_after: Some("2.5".to_string()),
            },
            body: "{\"message\": \"slow down\"}".to_string(),
        };

        let message = error.to_string();
        assert!(message.contains("after 4 attempts"));
        assert!(message.contains("url=https://host/api/webhooks/123/<redacted>"));
        assert!(message.contains("rate_limit_global=true"));
        assert!(message.contains("rate_limit_bucket=abc"));
        assert!(message.contains("slow down"));
    }

    #[test]
    fn status_message_names_the_code() {
        let error = PostError::Status {
            status: 500,
            url: "https://example.com/hook".to_string(),
            body: "boom".to_string(),
        };
        assert!(error.to_string().contains("HTTP 500"));
    }
}
