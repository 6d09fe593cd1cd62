//! Rate-limit-aware JSON POST helper.
//!
//! This module provides [`post_json`], which submits a JSON payload to an
//! HTTP endpoint, transparently retries rate-limited responses using
//! server-provided delay hints, and fails with full diagnostic context
//! otherwise. URLs are passed through [`redact_url`] before they appear in
//! any error.

mod error;
mod rate_limit;
mod redact;

pub use error::PostError;
pub use rate_limit::RateLimitInfo;
pub use redact::redact_url;

use rand::Rng;
use reqwest::header::HeaderMap;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Maximum number of response-body characters carried in error context.
const BODY_SNIPPET_CHARS: usize = 500;

/// Options controlling a single [`post_json`] call.
#[derive(Debug, Clone)]
pub struct PostOptions {
    /// Per-request timeout.
    pub timeout: Duration,

    /// Bound on retry attempts after the initial try.
    pub max_retries: u32,

    /// Cap applied to any server-suggested delay, so a misconfigured or
    /// malicious server cannot stall the caller indefinitely.
    pub max_retry_after: Duration,

    /// Upper bound of the uniformly-distributed random delay added after
    /// each computed sleep, de-synchronizing retries across callers.
    pub jitter: Duration,
}

impl Default for PostOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 3,
            max_retry_after: Duration::from_secs(60),
            jitter: Duration::from_millis(250),
        }
    }
}

impl PostOptions {
    /// Sets the per-request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the retry budget for rate-limited responses.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the cap on server-suggested delays.
    #[must_use]
    pub fn with_max_retry_after(mut self, max_retry_after: Duration) -> Self {
        self.max_retry_after = max_retry_after;
        self
    }

    /// Sets the jitter bound.
    #[must_use]
    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }
}

/// Body of a successful POST.
#[derive(Debug, Clone, PartialEq)]
pub enum PostBody {
    /// The response parsed as JSON.
    Json(serde_json::Value),

    /// The response carried no body.
    NoContent,

    /// The response body was not JSON.
    Raw(String),
}

impl PostBody {
    /// JSON view of the body. Raw text is wrapped as `{"raw": <text>}`;
    /// empty responses have no JSON form.
    #[must_use]
    pub fn to_value(&self) -> Option<serde_json::Value> {
        match self {
            Self::Json(value) => Some(value.clone()),
            Self::NoContent => None,
            Self::Raw(text) => Some(serde_json::json!({ "raw": text })),
        }
    }
}

/// Outcome of a failed attempt.
enum Disposition {
    /// Replay the request after the given delay.
    Retry(Duration),

    /// Surface the failure to the caller.
    Fail,
}

/// Posts `payload` as JSON to `url`, retrying rate-limited responses.
///
/// Responses with status 429 are retried up to `options.max_retries` times
/// when the server provides a retry delay (checked in priority order: the
/// `retry_after` field of a JSON body, the `Retry-After` header, then the
/// `X-RateLimit-Reset-After` header). A 429 without any hint is treated as
/// non-retryable: retrying blind risks hammering a limited endpoint.
///
/// The same request is replayed on every attempt; the payload is serialized
/// once per attempt from the same value and never changes between tries.
///
/// # Errors
///
/// - [`PostError::Transport`] on network-level failures, never retried.
/// - [`PostError::Status`] on any other status >= 400, including a 429
///   without retry information.
/// - [`PostError::RetryExhausted`] when a 429 persists past the retry
///   budget.
pub async fn post_json<T: Serialize + ?Sized>(
    client: &Client,
    url: &Url,
    headers: HeaderMap,
    payload: &T,
    options: &PostOptions,
) -> Result<PostBody, PostError> {
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        debug!(attempt, "Sending POST request");

        let response = client
            .post(url.clone())
            .headers(headers.clone())
            .timeout(options.timeout)
            .json(payload)
            .send()
            .await
            .map_err(|source| PostError::Transport {
                url: redact_url(url),
                source,
            })?;

        let status = response.status();
        let response_headers = response.headers().clone();
        let body = response
            .text()
            .await
            .map_err(|source| PostError::Transport {
                url: redact_url(url),
                source,
            })?;

        if status.as_u16() < 400 {
            return Ok(parse_body(&body));
        }

        let info = RateLimitInfo::from_response(status, &response_headers, &body);

        match disposition(info.as_ref(), attempt, options) {
            Disposition::Retry(delay) => {
                let delay = delay + sample_jitter(options.jitter);
                info!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Rate limited, waiting before retry"
                );
                tokio::time::sleep(delay).await;
            }
            Disposition::Fail => return Err(build_error(url, status, attempt, info, &body)),
        }
    }
}

/// Classifies an empty, JSON, or plain-text success body.
fn parse_body(body: &str) -> PostBody {
    if body.is_empty() {
        return PostBody::NoContent;
    }
    match serde_json::from_str(body) {
        Ok(value) => PostBody::Json(value),
        Err(_) => PostBody::Raw(body.to_string()),
    }
}

/// Decides whether a failed attempt is replayed or surfaced.
fn disposition(
    info: Option<&RateLimitInfo>,
    attempt: u32,
    options: &PostOptions,
) -> Disposition {
    match info {
        Some(info) if attempt <= options.max_retries => {
            Disposition::Retry(backoff_delay(info.retry_after, options))
        }
        _ => Disposition::Fail,
    }
}

/// Server-suggested delay clamped into `[0, max_retry_after]`.
fn backoff_delay(retry_after: f64, options: &PostOptions) -> Duration {
    let capped = retry_after.clamp(0.0, options.max_retry_after.as_secs_f64());
    Duration::from_secs_f64(capped)
}

/// Uniform sample from `[0, jitter)`.
fn sample_jitter(jitter: Duration) -> Duration {
    if jitter.is_zero() {
        return Duration::ZERO;
    }
    Duration::from_secs_f64(rand::thread_rng().gen_range(0.0..jitter.as_secs_f64()))
}

/// Builds the terminal error for a failed request.
fn build_error(
    url: &Url,
    status: StatusCode,
    attempts: u32,
    info: Option<RateLimitInfo>,
    body: &str,
) -> PostError {
    let body = body_snippet(body);
    match info {
        Some(rate_limit) => PostError::RetryExhausted {
            attempts,
            url: redact_url(url),
            rate_limit,
            body,
        },
        None => PostError::Status {
            status: status.as_u16(),
            url: redact_url(url),
            body,
        },
    }
}

/// First [`BODY_SNIPPET_CHARS`] characters of a response body.
pub(crate) fn body_snippet(body: &str) -> String {
    body.chars().take(BODY_SNIPPET_CHARS).collect()
}
