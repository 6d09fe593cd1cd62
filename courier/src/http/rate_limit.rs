//! Rate-limit hints parsed from 429 responses.

use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde_json::Value;
use std::fmt;

/// Rate-limit diagnostics extracted from a 429 response.
///
/// Constructed per failed attempt and discarded once the retry decision has
/// been made; nothing here outlives a single [`post_json`](super::post_json)
/// call.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitInfo {
    /// Seconds to wait before retrying. Non-negative.
    pub retry_after: f64,

    /// Whether the limit applies across the whole API rather than one route.
    pub is_global: bool,

    /// Rate-limit bucket identifier, if the server sent one.
    pub bucket: Option<String>,

    /// Requests remaining in the window, as reported by the server.
    pub remaining: Option<String>,

    /// Seconds until the window resets, as reported by the server.
    pub reset_after: Option<String>,
}

impl RateLimitInfo {
    /// Extracts retry information from a failed response.
    ///
    /// Returns `None` unless the status is 429 and a retry delay could be
    /// determined. The delay is checked in priority order: the
    /// `retry_after` field of a JSON body, the `Retry-After` header, then
    /// the `X-RateLimit-Reset-After` header.
    #[must_use]
    pub fn from_response(status: StatusCode, headers: &HeaderMap, body: &str) -> Option<Self> {
        if status != StatusCode::TOO_MANY_REQUESTS {
            return None;
        }

        let parsed: Option<Value> = if body.is_empty() {
            None
        } else {
            serde_json::from_str(body).ok()
        };

        let retry_after = parsed
            .as_ref()
            .and_then(|value| value.get("retry_after"))
            .and_then(json_secs)
            .or_else(|| header_secs(headers, "Retry-After"))
            .or_else(|| header_secs(headers, "X-RateLimit-Reset-After"))?;

        let is_global = parsed
            .as_ref()
            .and_then(|value| value.get("global"))
            .and_then(Value::as_bool)
            .unwrap_or(false);

        Some(Self {
            retry_after,
            is_global,
            bucket: header_string(headers, "X-RateLimit-Bucket"),
            remaining: header_string(headers, "X-RateLimit-Remaining"),
            reset_after: header_string(headers, "X-RateLimit-Reset-After"),
        })
    }
}

impl fmt::Display for RateLimitInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rate_limit_global={}", self.is_global)?;
        if let Some(bucket) = &self.bucket {
            write!(f, " rate_limit_bucket={bucket}")?;
        }
        if let Some(remaining) = &self.remaining {
            write!(f, " rate_limit_remaining={remaining}")?;
        }
        if let Some(reset_after) = &self.reset_after {
            write!(f, " rate_limit_reset_after={reset_after}")?;
        }
        Ok(())
    }
}

/// Seconds from a JSON number or numeric string. Non-finite values are
/// treated as absent.
fn json_secs(value: &Value) -> Option<f64> {
    let secs = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    };
    secs.filter(|secs| secs.is_finite())
}

/// Seconds parsed from a response header.
fn header_secs(headers: &HeaderMap, name: &str) -> Option<f64> {
    headers
        .get(name)?
        .to_str()
        .ok()?
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|secs| secs.is_finite())
}

/// String value of a response header.
fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        headers
    }

    #[test]
    fn non_429_yields_nothing() {
        let info = RateLimitInfo::from_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            &headers(&[("Retry-After", "5")]),
            "",
        );
        assert!(info.is_none());
    }

    #[test]
    fn body_field_takes_priority_over_headers() {
        let info = RateLimitInfo::from_response(
            StatusCode::TOO_MANY_REQUESTS,
            &headers(&[("Retry-After", "9")]),
            r#"{"retry_after": 0.5, "global": true}"#,
        )
        .unwrap();

        assert_eq!(info.retry_after, 0.5);
        assert!(info.is_global);
    }

    #[test]
    fn string_retry_after_is_accepted() {
        let info = RateLimitInfo::from_response(
            StatusCode::TOO_MANY_REQUESTS,
            &HeaderMap::new(),
            r#"{"retry_after": "1.5"}"#,
        )
        .unwrap();

        assert_eq!(info.retry_after, 1.5);
        assert!(!info.is_global);
    }

    #[test]
    fn falls_back_to_retry_after_header() {
        let info = RateLimitInfo::from_response(
            StatusCode::TOO_MANY_REQUESTS,
            &headers(&[("Retry-After", "2")]),
            "not json",
        )
        .unwrap();

        assert_eq!(info.retry_after, 2.0);
    }

    #[test]
    fn falls_back_to_reset_after_header() {
        let info = RateLimitInfo::from_response(
            StatusCode::TOO_MANY_REQUESTS,
            &headers(&[
                ("Retry-After", "bogus"),
                ("X-RateLimit-Reset-After", "3.25"),
                ("X-RateLimit-Bucket", "abcd"),
                ("X-RateLimit-Remaining", "0"),
            ]),
            "",
        )
        .unwrap();

        assert_eq!(info.retry_after, 3.25);
        assert_eq!(info.bucket.as_deref(), Some("abcd"));
        assert_eq!(info.remaining.as_deref(), Some("0"));
        assert_eq!(info.reset_after.as_deref(), Some("3.25"));
    }

    #[test]
    fn missing_hints_yield_nothing() {
        let info =
            RateLimitInfo::from_response(StatusCode::TOO_MANY_REQUESTS, &HeaderMap::new(), "{}");
        assert!(info.is_none());
    }

    #[test]
    fn non_finite_values_are_ignored() {
        let info = RateLimitInfo::from_response(
            StatusCode::TOO_MANY_REQUESTS,
            &headers(&[("Retry-After", "NaN")]),
            "",
        );
        assert!(info.is_none());
    }
}
