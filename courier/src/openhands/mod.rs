//! OpenHands Cloud REST API clients.
//!
//! Thin wrappers over the app server's V0 (legacy) and V1 route families,
//! plus the agent server running inside a sandbox. Responses are returned
//! as raw [`serde_json::Value`] so callers can explore server fields
//! without this crate maintaining a strict schema.

mod agent;
mod error;
mod v0;
mod v1;

pub use agent::{AgentServerClient, EventFilter, SortOrder};
pub use error::ApiError;
pub use v0::{EventQuery, ListQuery, NewConversation, V0Client};
pub use v1::{DownloadedFile, StartConversation, TrajectorySummary, V1Client};

use crate::http::{body_snippet, redact_url};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::Value;
use std::path::Path;

/// Hosted OpenHands Cloud app server.
pub const DEFAULT_BASE_URL: &str = "https://app.all-hands.dev";

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "OPENHANDS_API_KEY";

/// Resolves an API key, falling back to [`API_KEY_ENV`].
fn resolve_api_key(api_key: Option<&str>) -> Result<String, ApiError> {
    match api_key.map(str::trim) {
        Some(key) if !key.is_empty() => Ok(key.to_string()),
        _ => std::env::var(API_KEY_ENV)
            .ok()
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
            .ok_or(ApiError::MissingApiKey),
    }
}

/// Builds a client with `Authorization: Bearer <key>` on every request.
fn bearer_client(api_key: &str) -> Result<reqwest::Client, ApiError> {
    let mut auth = HeaderValue::from_str(&format!("Bearer {api_key}"))
        .map_err(|_| ApiError::MissingApiKey)?;
    auth.set_sensitive(true);

    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, auth);
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    Ok(reqwest::Client::builder()
        .default_headers(headers)
        .timeout(std::time::Duration::from_secs(30))
        .build()?)
}

/// Maps a response to its JSON body, surfacing non-success statuses as
/// [`ApiError::Status`] with redacted-URL context.
async fn expect_json(response: reqwest::Response) -> Result<Value, ApiError> {
    let status = response.status();
    let url = response.url().clone();

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ApiError::Status {
            status: status.as_u16(),
            url: redact_url(&url),
            body: body_snippet(&body),
        });
    }

    Ok(response.json().await?)
}

/// Deserializes a JSON value, reporting shape mismatches with the URL that
/// produced it.
fn decode<T: serde::de::DeserializeOwned>(url: &str, value: Value) -> Result<T, ApiError> {
    serde_json::from_value(value).map_err(|source| ApiError::Decode {
        url: url.to_string(),
        source,
    })
}

/// Reads a prompt file, appending a second file separated by a blank line.
///
/// Automation workflows keep a main prompt template plus an optional shared
/// tail with conventions; a missing tail file is skipped.
fn read_prompt(prompt_file: &Path, append_file: Option<&Path>) -> Result<String, ApiError> {
    let main_text = std::fs::read_to_string(prompt_file)
        .map_err(|source| ApiError::io(prompt_file, source))?;

    match append_file {
        Some(tail_path) if tail_path.exists() => {
            let tail = std::fs::read_to_string(tail_path)
                .map_err(|source| ApiError::io(tail_path, source))?;
            Ok(format!("{main_text}\n\n{tail}"))
        }
        _ => Ok(main_text),
    }
}

/// Uppercased `status` field of a conversation or task object.
fn status_of(value: &Value) -> String {
    value
        .get("status")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn explicit_key_wins_over_environment() {
        temp_env::with_var(API_KEY_ENV, Some("env-key"), || {
            assert_eq!(resolve_api_key(Some("arg-key")).unwrap(), "arg-key");
        });
    }

    #[test]
    fn falls_back_to_environment() {
        temp_env::with_var(API_KEY_ENV, Some("env-key"), || {
            assert_eq!(resolve_api_key(None).unwrap(), "env-key");
            assert_eq!(resolve_api_key(Some("  ")).unwrap(), "env-key");
        });
    }

    #[test]
    fn missing_key_is_an_error() {
        temp_env::with_var(API_KEY_ENV, None::<&str>, || {
            assert!(matches!(
                resolve_api_key(None),
                Err(ApiError::MissingApiKey)
            ));
        });
    }

    #[test]
    fn prompt_files_are_joined_with_a_blank_line() {
        let temp = TempDir::new().unwrap();
        let prompt = temp.path().join("prompt.md");
        let tail = temp.path().join("tail.md");
        fs::write(&prompt, "main").unwrap();
        fs::write(&tail, "tail").unwrap();

        let text = read_prompt(&prompt, Some(&tail)).unwrap();
        assert_eq!(text, "main\n\ntail");
    }

    #[test]
    fn missing_tail_file_is_skipped() {
        let temp = TempDir::new().unwrap();
        let prompt = temp.path().join("prompt.md");
        fs::write(&prompt, "main").unwrap();

        let text = read_prompt(&prompt, Some(&temp.path().join("absent.md"))).unwrap();
        assert_eq!(text, "main");
    }

    #[test]
    fn missing_prompt_file_reports_the_path() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("absent.md");

        let error = read_prompt(&missing, None).unwrap_err();
        assert!(error.to_string().contains("absent.md"));
    }

    #[test]
    fn status_of_uppercases_and_defaults() {
        assert_eq!(status_of(&serde_json::json!({"status": "stopped"})), "STOPPED");
        assert_eq!(status_of(&serde_json::json!({})), "");
    }
}
