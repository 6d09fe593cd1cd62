//! Agent-server client.
//!
//! Some operations run against the agent server inside a sandbox rather
//! than the app server. Those authenticate with an `X-Session-API-Key`
//! header instead of Bearer auth.

use super::error::ApiError;
use super::v1::DownloadedFile;
use super::{decode, expect_json};
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::{json, Value};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Header carrying the sandbox session key.
const SESSION_KEY_HEADER: &str = "X-Session-API-Key";

/// Event sort orders accepted by the agent server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Oldest first.
    Timestamp,
    /// Newest first.
    TimestampDesc,
}

impl SortOrder {
    fn as_str(self) -> &'static str {
        match self {
            Self::Timestamp => "TIMESTAMP",
            Self::TimestampDesc => "TIMESTAMP_DESC",
        }
    }
}

/// Filters for agent-server event queries.
///
/// Timestamp bounds are ISO-8601 strings (e.g. `2026-02-14T21:54:00Z`);
/// the server accepts both timezone-aware and naive datetimes.
#[derive(Debug, Clone)]
pub struct EventFilter {
    /// Page size for searches, at least 1. Ignored by counts.
    pub limit: u32,

    /// Sort order for searches. Ignored by counts.
    pub sort_order: Option<SortOrder>,

    /// Inclusive lower timestamp bound.
    pub timestamp_gte: Option<String>,

    /// Exclusive upper timestamp bound.
    pub timestamp_lt: Option<String>,

    /// Event kind filter.
    pub kind: Option<String>,

    /// Event source filter.
    pub source: Option<String>,

    /// Substring match against event bodies.
    pub body: Option<String>,
}

impl Default for EventFilter {
    fn default() -> Self {
        Self {
            limit: 50,
            sort_order: None,
            timestamp_gte: None,
            timestamp_lt: None,
            kind: None,
            source: None,
            body: None,
        }
    }
}

impl EventFilter {
    fn search_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![("limit", self.limit.max(1).to_string())];
        if let Some(sort_order) = self.sort_order {
            params.push(("sort_order", sort_order.as_str().to_string()));
        }
        params.extend(self.filter_params());
        params
    }

    fn filter_params(&self) -> Vec<(&'static str, String)> {
        let fields = [
            ("timestamp__gte", &self.timestamp_gte),
            ("timestamp__lt", &self.timestamp_lt),
            ("kind", &self.kind),
            ("source", &self.source),
            ("body", &self.body),
        ];

        fields
            .into_iter()
            .filter_map(|(name, value)| value.as_ref().map(|value| (name, value.clone())))
            .collect()
    }
}

/// Client for the agent server running inside a sandbox.
pub struct AgentServerClient {
    http: reqwest::Client,
    base_url: String,
}

impl AgentServerClient {
    /// Creates a client for the given agent server and session key.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::MissingApiKey`] if the session key is blank or
    /// cannot travel in a header.
    pub fn new(agent_server_url: &str, session_api_key: &str) -> Result<Self, ApiError> {
        let session_api_key = session_api_key.trim();
        if session_api_key.is_empty() {
            return Err(ApiError::MissingApiKey);
        }

        let mut key =
            HeaderValue::from_str(session_api_key).map_err(|_| ApiError::MissingApiKey)?;
        key.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(SESSION_KEY_HEADER, key);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            base_url: agent_server_url.trim_end_matches('/').to_string(),
        })
    }

    /// GET `/api/conversations/{conversation_id}/events/search`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the request fails.
    pub async fn events_search(
        &self,
        conversation_id: &str,
        filter: &EventFilter,
    ) -> Result<Value, ApiError> {
        let url = format!(
            "{}/api/conversations/{}/events/search",
            self.base_url, conversation_id
        );
        let response = self
            .http
            .get(&url)
            .query(&filter.search_params())
            .send()
            .await?;
        expect_json(response).await
    }

    /// GET `/api/conversations/{conversation_id}/events/count` — the
    /// response body is a bare integer.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the request fails or the count does not
    /// parse.
    pub async fn events_count(
        &self,
        conversation_id: &str,
        filter: &EventFilter,
    ) -> Result<u64, ApiError> {
        let url = format!(
            "{}/api/conversations/{}/events/count",
            self.base_url, conversation_id
        );

        let mut request = self.http.get(&url);
        let params = filter.filter_params();
        if !params.is_empty() {
            request = request.query(&params);
        }

        let value = expect_json(request.send().await?).await?;
        decode(&url, value)
    }

    /// POST `/api/bash/execute_bash_command` — run a shell command inside
    /// the sandbox.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the request fails.
    pub async fn execute_bash(
        &self,
        command: &str,
        cwd: Option<&str>,
        timeout: Duration,
    ) -> Result<Value, ApiError> {
        let url = format!("{}/api/bash/execute_bash_command", self.base_url);

        let mut payload = json!({
            "command": command,
            "timeout": timeout.as_secs(),
        });
        if let Some(cwd) = cwd {
            payload["cwd"] = json!(cwd);
        }

        info!(command, "Executing bash command in sandbox");
        expect_json(
            self.http
                .post(&url)
                .timeout(Duration::from_secs(60))
                .json(&payload)
                .send()
                .await?,
        )
        .await
    }

    /// GET `/api/file/download/{path}` — fetch a sandbox file to disk.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the request fails or the file cannot be
    /// written.
    pub async fn download_file(
        &self,
        path: &str,
        output_file: &Path,
    ) -> Result<DownloadedFile, ApiError> {
        let url = format!("{}/api/file/download{}", self.base_url, normalize_path(path));

        let response = self.http.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let url = crate::http::redact_url(response.url());
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                status: status.as_u16(),
                url,
                body: crate::http::body_snippet(&body),
            });
        }

        let bytes = response.bytes().await?;
        std::fs::write(output_file, &bytes).map_err(|source| ApiError::io(output_file, source))?;

        Ok(DownloadedFile {
            file: output_file.to_path_buf(),
            size: bytes.len() as u64,
            content_type: None,
        })
    }

    /// POST `/api/file/upload/{path}` — multipart upload of a text file
    /// into the sandbox. An empty response body reports success.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the request fails.
    pub async fn upload_text_file(
        &self,
        path: &str,
        content: &str,
        content_type: &str,
    ) -> Result<Value, ApiError> {
        let remote = normalize_path(path);
        let url = format!("{}/api/file/upload{}", self.base_url, remote);
        let filename = file_name(&remote);

        let part = reqwest::multipart::Part::bytes(content.as_bytes().to_vec())
            .file_name(filename)
            .mime_str(content_type)?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self.http.post(&url).multipart(form).send().await?;
        let status = response.status();
        if !status.is_success() {
            let url = crate::http::redact_url(response.url());
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                status: status.as_u16(),
                url,
                body: crate::http::body_snippet(&body),
            });
        }

        let text = response.text().await?;
        if text.is_empty() {
            return Ok(json!({ "success": true }));
        }
        serde_json::from_str(&text).map_err(|source| ApiError::Decode { url, source })
    }
}

/// Normalizes a sandbox path to a leading slash.
fn normalize_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

/// Final component of a normalized sandbox path.
fn file_name(path: &str) -> String {
    path.rsplit('/').next().unwrap_or_default().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_normalized_to_a_leading_slash() {
        assert_eq!(normalize_path("tmp/out.txt"), "/tmp/out.txt");
        assert_eq!(normalize_path("/tmp/out.txt"), "/tmp/out.txt");
    }

    #[test]
    fn file_name_takes_the_final_component() {
        assert_eq!(file_name("/tmp/out.txt"), "out.txt");
        assert_eq!(file_name("/out.txt"), "out.txt");
    }

    #[test]
    fn search_params_include_sort_and_filters() {
        let filter = EventFilter {
            limit: 25,
            sort_order: Some(SortOrder::TimestampDesc),
            timestamp_gte: Some("2026-02-14T21:54:00Z".to_string()),
            kind: Some("action".to_string()),
            ..EventFilter::default()
        };

        let params = filter.search_params();
        assert_eq!(
            params,
            vec![
                ("limit", "25".to_string()),
                ("sort_order", "TIMESTAMP_DESC".to_string()),
                ("timestamp__gte", "2026-02-14T21:54:00Z".to_string()),
                ("kind", "action".to_string()),
            ]
        );
    }

    #[test]
    fn count_params_skip_paging_fields() {
        let filter = EventFilter {
            limit: 25,
            sort_order: Some(SortOrder::Timestamp),
            source: Some("agent".to_string()),
            ..EventFilter::default()
        };

        assert_eq!(
            filter.filter_params(),
            vec![("source", "agent".to_string())]
        );
    }

    #[test]
    fn blank_session_key_is_rejected() {
        assert!(matches!(
            AgentServerClient::new("http://sandbox", "  "),
            Err(ApiError::MissingApiKey)
        ));
    }
}
