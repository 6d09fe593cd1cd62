//! V1 app server client.
//!
//! Routes live under `{base}/api/v1/...`. Starting a conversation creates a
//! sandbox (and may incur costs); monitoring happens through the event
//! search routes or a downloaded trajectory archive.

use super::error::ApiError;
use super::{
    bearer_client, decode, expect_json, read_prompt, resolve_api_key, status_of, DEFAULT_BASE_URL,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Start-task statuses treated as terminal when polling.
const TERMINAL_TASK_STATUSES: [&str; 4] = ["READY", "ERROR", "FAILED", "CANCELLED"];

/// Request to start an app conversation.
#[derive(Debug, Clone)]
pub struct StartConversation {
    /// The initial user message.
    pub initial_message: String,

    /// Optional "owner/repo" to attach.
    pub selected_repository: Option<String>,

    /// Optional git branch.
    pub selected_branch: Option<String>,

    /// Optional conversation title.
    pub title: Option<String>,

    /// Whether the agent runs immediately after the initial message.
    pub run: bool,
}

impl StartConversation {
    /// Starts a request with the given initial message; the agent runs
    /// immediately unless [`with_run`](Self::with_run) disables it.
    #[must_use]
    pub fn new(initial_message: impl Into<String>) -> Self {
        Self {
            initial_message: initial_message.into(),
            selected_repository: None,
            selected_branch: None,
            title: None,
            run: true,
        }
    }

    /// Attaches an "owner/repo" repository.
    #[must_use]
    pub fn with_repository(mut self, repository: impl Into<String>) -> Self {
        self.selected_repository = Some(repository.into());
        self
    }

    /// Selects a git branch.
    #[must_use]
    pub fn with_selected_branch(mut self, branch: impl Into<String>) -> Self {
        self.selected_branch = Some(branch.into());
        self
    }

    /// Sets the conversation title.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Controls whether the agent runs immediately.
    #[must_use]
    pub fn with_run(mut self, run: bool) -> Self {
        self.run = run;
        self
    }

    /// Wire form expected by the app server: the initial message content is
    /// a list of content parts.
    fn to_payload(&self) -> Value {
        let mut payload = json!({
            "initial_message": {
                "role": "user",
                "content": [{ "type": "text", "text": self.initial_message }],
                "run": self.run,
            }
        });
        if let Some(repository) = &self.selected_repository {
            payload["selected_repository"] = json!(repository);
        }
        if let Some(branch) = &self.selected_branch {
            payload["selected_branch"] = json!(branch);
        }
        if let Some(title) = &self.title {
            payload["title"] = json!(title);
        }
        payload
    }
}

/// Metadata for a file downloaded to disk.
#[derive(Debug, Clone, Serialize)]
pub struct DownloadedFile {
    /// Where the file was written.
    pub file: PathBuf,

    /// Size in bytes.
    pub size: u64,

    /// `Content-Type` reported by the server.
    pub content_type: Option<String>,
}

/// Summary of an extracted trajectory archive.
#[derive(Debug, Clone, Serialize)]
pub struct TrajectorySummary {
    /// Number of `event_*.json` files in the archive.
    pub event_count: usize,

    /// Whether the archive carried a `meta.json`.
    pub has_meta: bool,

    /// The downloaded archive itself.
    pub archive: DownloadedFile,

    /// Where the archive was extracted.
    pub extract_dir: PathBuf,
}

/// Minimal client for the V1 app server routes.
pub struct V1Client {
    http: reqwest::Client,
    base_url: String,
}

impl V1Client {
    /// Creates a client.
    ///
    /// The key falls back to `OPENHANDS_API_KEY` when `api_key` is absent
    /// or blank; `base_url` falls back to the hosted cloud.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::MissingApiKey`] if no usable key is available.
    pub fn new(api_key: Option<&str>, base_url: Option<&str>) -> Result<Self, ApiError> {
        let api_key = resolve_api_key(api_key)?;
        Ok(Self {
            http: bearer_client(&api_key)?,
            base_url: base_url
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
        })
    }

    /// Returns the configured base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the `/api/v1` route prefix.
    #[must_use]
    pub fn api_v1_url(&self) -> String {
        format!("{}/api/v1", self.base_url)
    }

    /// GET `/api/v1/users/me` — the discovery call.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the request fails.
    pub async fn users_me(&self) -> Result<Value, ApiError> {
        let url = format!("{}/users/me", self.api_v1_url());
        expect_json(self.http.get(&url).send().await?).await
    }

    /// GET `/api/v1/app-conversations/search`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the request fails.
    pub async fn app_conversations_search(&self, limit: u32) -> Result<Value, ApiError> {
        let url = format!("{}/app-conversations/search", self.api_v1_url());
        self.get_limited(&url, limit).await
    }

    /// GET `/api/v1/app-conversations/count`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the request fails.
    pub async fn app_conversations_count(&self) -> Result<Value, ApiError> {
        let url = format!("{}/app-conversations/count", self.api_v1_url());
        expect_json(self.http.get(&url).send().await?).await
    }

    /// GET `/api/v1/app-conversations?ids=...` — batch lookup. An empty
    /// `ids` slice short-circuits without a request.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the request fails.
    pub async fn app_conversations_get_batch(
        &self,
        ids: &[&str],
    ) -> Result<Vec<Value>, ApiError> {
        let url = format!("{}/app-conversations", self.api_v1_url());
        self.get_batch(&url, ids).await
    }

    /// Looks up a single app conversation, if it exists.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the request fails.
    pub async fn app_conversation_get(
        &self,
        conversation_id: &str,
    ) -> Result<Option<Value>, ApiError> {
        let items = self.app_conversations_get_batch(&[conversation_id]).await?;
        Ok(items.into_iter().next())
    }

    /// GET `/api/v1/sandboxes/search`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the request fails.
    pub async fn sandboxes_search(&self, limit: u32) -> Result<Value, ApiError> {
        let url = format!("{}/sandboxes/search", self.api_v1_url());
        self.get_limited(&url, limit).await
    }

    /// GET `/api/v1/sandbox-specs/search`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the request fails.
    pub async fn sandbox_specs_search(&self, limit: u32) -> Result<Value, ApiError> {
        let url = format!("{}/sandbox-specs/search", self.api_v1_url());
        self.get_limited(&url, limit).await
    }

    /// GET `/api/v1/conversation/{conversation_id}/events/search`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the request fails.
    pub async fn conversation_events_search(
        &self,
        conversation_id: &str,
        limit: u32,
    ) -> Result<Value, ApiError> {
        let url = format!(
            "{}/conversation/{}/events/search",
            self.api_v1_url(),
            conversation_id
        );
        self.get_limited(&url, limit).await
    }

    /// GET `/api/v1/conversation/{conversation_id}/events/count`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the request fails.
    pub async fn conversation_events_count(
        &self,
        conversation_id: &str,
    ) -> Result<Value, ApiError> {
        let url = format!(
            "{}/conversation/{}/events/count",
            self.api_v1_url(),
            conversation_id
        );
        expect_json(self.http.get(&url).send().await?).await
    }

    /// POST `/api/v1/app-conversations` — start a new app conversation.
    ///
    /// This typically creates a sandbox and may incur costs, so the request
    /// gets a generous 120s timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the request fails.
    pub async fn app_conversation_start(
        &self,
        request: &StartConversation,
    ) -> Result<Value, ApiError> {
        info!(
            repository = request.selected_repository.as_deref().unwrap_or("-"),
            run = request.run,
            "Starting app conversation"
        );
        let url = format!("{}/app-conversations", self.api_v1_url());
        expect_json(
            self.http
                .post(&url)
                .timeout(Duration::from_secs(120))
                .json(&request.to_payload())
                .send()
                .await?,
        )
        .await
    }

    /// GET `/api/v1/app-conversations/start-tasks?ids=...` — batch lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the request fails.
    pub async fn start_tasks_get_batch(&self, ids: &[&str]) -> Result<Vec<Value>, ApiError> {
        let url = format!("{}/app-conversations/start-tasks", self.api_v1_url());
        self.get_batch(&url, ids).await
    }

    /// Looks up a single start task, if it exists.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the request fails.
    pub async fn start_task_get(&self, task_id: &str) -> Result<Option<Value>, ApiError> {
        let items = self.start_tasks_get_batch(&[task_id]).await?;
        Ok(items.into_iter().next())
    }

    /// POST `/api/v1/sandboxes/{sandbox_id}/pause`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the request fails.
    pub async fn sandboxes_pause(&self, sandbox_id: &str) -> Result<Value, ApiError> {
        let url = format!("{}/sandboxes/{}/pause", self.api_v1_url(), sandbox_id);
        self.post_empty(&url).await
    }

    /// POST `/api/v1/sandboxes/{sandbox_id}/resume`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the request fails.
    pub async fn sandboxes_resume(&self, sandbox_id: &str) -> Result<Value, ApiError> {
        let url = format!("{}/sandboxes/{}/resume", self.api_v1_url(), sandbox_id);
        self.post_empty(&url).await
    }

    /// GET `/api/v1/app-conversations/{conversation_id}/download` — write
    /// the trajectory archive to disk.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the request fails or the file cannot be
    /// written.
    pub async fn download_trajectory(
        &self,
        conversation_id: &str,
        output_file: &Path,
    ) -> Result<DownloadedFile, ApiError> {
        let url = format!(
            "{}/app-conversations/{}/download",
            self.api_v1_url(),
            conversation_id
        );

        let response = self
            .http
            .get(&url)
            .timeout(Duration::from_secs(60))
            .send()
            .await?;

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

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let bytes = response.bytes().await?;
        std::fs::write(output_file, &bytes).map_err(|source| ApiError::io(output_file, source))?;

        info!(
            conversation_id,
            size = bytes.len(),
            file = %output_file.display(),
            "Trajectory archive downloaded"
        );

        Ok(DownloadedFile {
            file: output_file.to_path_buf(),
            size: bytes.len() as u64,
            content_type,
        })
    }

    /// Fallback event counting: download the trajectory archive, extract
    /// it, and count the exported event files.
    ///
    /// Heavier than the count endpoint, but it is still a single API call
    /// and leaves the full exported event payloads on disk.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the download, extraction, or directory scan
    /// fails.
    pub async fn count_events_via_trajectory_zip(
        &self,
        conversation_id: &str,
        zip_file: &Path,
        extract_dir: &Path,
    ) -> Result<TrajectorySummary, ApiError> {
        let archive = self.download_trajectory(conversation_id, zip_file).await?;

        std::fs::create_dir_all(extract_dir)
            .map_err(|source| ApiError::io(extract_dir, source))?;

        let file = std::fs::File::open(zip_file).map_err(|source| ApiError::io(zip_file, source))?;
        let mut contents =
            zip::ZipArchive::new(file).map_err(|source| ApiError::archive(zip_file, source))?;
        contents
            .extract(extract_dir)
            .map_err(|source| ApiError::archive(zip_file, source))?;

        let event_count = count_event_files(extract_dir)?;
        let has_meta = extract_dir.join("meta.json").exists();

        Ok(TrajectorySummary {
            event_count,
            has_meta,
            archive,
            extract_dir: extract_dir.to_path_buf(),
        })
    }

    /// Starts an app conversation from a prompt file, optionally appending
    /// a second file separated by a blank line.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Io`] if a file cannot be read, or any request
    /// error from starting the conversation.
    pub async fn start_from_prompt_files(
        &self,
        prompt_file: &Path,
        append_file: Option<&Path>,
        selected_repository: Option<&str>,
        selected_branch: Option<&str>,
        title: Option<&str>,
        run: bool,
    ) -> Result<Value, ApiError> {
        let initial = read_prompt(prompt_file, append_file)?;

        let mut request = StartConversation::new(initial).with_run(run);
        if let Some(repository) = selected_repository {
            request = request.with_repository(repository);
        }
        if let Some(branch) = selected_branch {
            request = request.with_selected_branch(branch);
        }
        if let Some(title) = title {
            request = request.with_title(title);
        }

        self.app_conversation_start(&request).await
    }

    /// Polls a start task until it reaches a terminal state (READY, ERROR,
    /// FAILED, or CANCELLED). A task that is not visible yet is treated as
    /// still pending.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::StartTaskTimeout`] if the deadline passes first,
    /// or any request error from polling.
    pub async fn poll_start_task_until_ready(
        &self,
        task_id: &str,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<Value, ApiError> {
        let start = tokio::time::Instant::now();

        while start.elapsed() < timeout {
            match self.start_task_get(task_id).await? {
                Some(task) => {
                    let status = status_of(&task);
                    if TERMINAL_TASK_STATUSES.contains(&status.as_str()) {
                        info!(task_id, status = %status, "Start task reached terminal state");
                        return Ok(task);
                    }
                    debug!(task_id, status = %status, "Start task still pending");
                }
                None => warn!(task_id, "Start task not visible yet"),
            }
            tokio::time::sleep(poll_interval).await;
        }

        Err(ApiError::StartTaskTimeout {
            task_id: task_id.to_string(),
            timeout_secs: timeout.as_secs(),
        })
    }

    async fn get_limited(&self, url: &str, limit: u32) -> Result<Value, ApiError> {
        let response = self
            .http
            .get(url)
            .query(&[("limit", limit.max(1).to_string())])
            .send()
            .await?;
        expect_json(response).await
    }

    async fn get_batch(&self, url: &str, ids: &[&str]) -> Result<Vec<Value>, ApiError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let params: Vec<(&str, &str)> = ids.iter().map(|id| ("ids", *id)).collect();
        let response = self.http.get(url).query(&params).send().await?;
        let value = expect_json(response).await?;
        decode(url, value)
    }

    async fn post_empty(&self, url: &str) -> Result<Value, ApiError> {
        expect_json(
            self.http
                .post(url)
                .timeout(Duration::from_secs(60))
                .send()
                .await?,
        )
        .await
    }
}

/// Counts `event_*.json` files directly under `dir`.
fn count_event_files(dir: &Path) -> Result<usize, ApiError> {
    let entries = std::fs::read_dir(dir).map_err(|source| ApiError::io(dir, source))?;

    let mut count = 0;
    for entry in entries {
        let entry = entry.map_err(|source| ApiError::io(dir, source))?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with("event_") && name.ends_with(".json") {
            count += 1;
        }
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn start_payload_wraps_content_in_parts() {
        let request = StartConversation::new("hello")
            .with_repository("owner/repo")
            .with_title("nightly run")
            .with_run(false);

        assert_eq!(
            request.to_payload(),
            json!({
                "initial_message": {
                    "role": "user",
                    "content": [{ "type": "text", "text": "hello" }],
                    "run": false,
                },
                "selected_repository": "owner/repo",
                "title": "nightly run",
            })
        );
    }

    #[test]
    fn start_payload_omits_absent_fields() {
        let payload = StartConversation::new("hi").to_payload();
        assert!(payload.get("selected_repository").is_none());
        assert!(payload.get("selected_branch").is_none());
        assert!(payload.get("title").is_none());
    }

    #[test]
    fn counts_only_event_files() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("event_0.json"), "{}").unwrap();
        fs::write(temp.path().join("event_1.json"), "{}").unwrap();
        fs::write(temp.path().join("meta.json"), "{}").unwrap();
        fs::write(temp.path().join("event_2.txt"), "").unwrap();

        assert_eq!(count_event_files(temp.path()).unwrap(), 2);
    }

    #[test]
    fn terminal_task_statuses_include_ready() {
        assert!(TERMINAL_TASK_STATUSES.contains(&"READY"));
        assert!(!TERMINAL_TASK_STATUSES.contains(&"WORKING"));
    }
}
