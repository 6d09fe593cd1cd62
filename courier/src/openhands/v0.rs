//! Legacy (V0) app server client.
//!
//! Routes live under `{base}/api/...`. The usual automation workflow:
//! create a conversation, then monitor it via the conversation object, the
//! incremental event feed, or the full trajectory.

use super::error::ApiError;
use super::{
    bearer_client, expect_json, read_prompt, resolve_api_key, status_of, DEFAULT_BASE_URL,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Conversation statuses treated as terminal when polling.
///
/// Terminal states are not strictly standardized; this is the safe set
/// observed in practice.
const TERMINAL_STATUSES: [&str; 4] = ["STOPPED", "ERROR", "FAILED", "CANCELLED"];

/// Request to create a conversation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NewConversation {
    /// The first user message.
    pub initial_user_msg: String,

    /// Optional "owner/repo" to attach.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,

    /// Optional git branch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_branch: Option<String>,

    /// Optional provider hint ("github", "gitlab", ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_provider: Option<String>,

    /// Optional extra instructions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_instructions: Option<String>,
}

impl NewConversation {
    /// Starts a request with the given first user message.
    #[must_use]
    pub fn new(initial_user_msg: impl Into<String>) -> Self {
        Self {
            initial_user_msg: initial_user_msg.into(),
            ..Self::default()
        }
    }

    /// Attaches an "owner/repo" repository.
    #[must_use]
    pub fn with_repository(mut self, repository: impl Into<String>) -> Self {
        self.repository = Some(repository.into());
        self
    }

    /// Selects a git branch.
    #[must_use]
    pub fn with_selected_branch(mut self, branch: impl Into<String>) -> Self {
        self.selected_branch = Some(branch.into());
        self
    }

    /// Hints the git provider.
    #[must_use]
    pub fn with_git_provider(mut self, provider: impl Into<String>) -> Self {
        self.git_provider = Some(provider.into());
        self
    }

    /// Adds conversation instructions.
    #[must_use]
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.conversation_instructions = Some(instructions.into());
        self
    }
}

/// Query for the incremental event feed.
#[derive(Debug, Clone)]
pub struct EventQuery {
    /// First event id to return.
    pub start_id: u64,

    /// Last event id to return, exclusive.
    pub end_id: Option<u64>,

    /// Return newest events first.
    pub reverse: bool,

    /// Page size. The server enforces 1..=100; the client clamps too.
    pub limit: u32,
}

impl Default for EventQuery {
    fn default() -> Self {
        Self {
            start_id: 0,
            end_id: None,
            reverse: false,
            limit: 20,
        }
    }
}

impl EventQuery {
    fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("start_id", self.start_id.to_string()),
            ("reverse", self.reverse.to_string()),
            ("limit", self.limit.clamp(1, 100).to_string()),
        ];
        if let Some(end_id) = self.end_id {
            params.push(("end_id", end_id.to_string()));
        }
        params
    }
}

/// Query for listing conversations.
#[derive(Debug, Clone)]
pub struct ListQuery {
    /// Page size, at least 1.
    pub limit: u32,

    /// Continuation token from a previous page.
    pub page_id: Option<String>,

    /// Restrict to conversations attached to this repository.
    pub selected_repository: Option<String>,

    /// Include sub-conversations in the result set.
    pub include_sub_conversations: Option<bool>,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            limit: 20,
            page_id: None,
            selected_repository: None,
            include_sub_conversations: None,
        }
    }
}

impl ListQuery {
    fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![("limit", self.limit.max(1).to_string())];
        if let Some(page_id) = &self.page_id {
            params.push(("page_id", page_id.clone()));
        }
        if let Some(repository) = &self.selected_repository {
            params.push(("selected_repository", repository.clone()));
        }
        if let Some(include) = self.include_sub_conversations {
            params.push(("include_sub_conversations", include.to_string()));
        }
        params
    }
}

/// Minimal client for the legacy V0 REST routes.
pub struct V0Client {
    http: reqwest::Client,
    base_url: String,
}

impl V0Client {
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

    /// POST `/api/conversations` — the entry point for most automations.
    ///
    /// The response carries at least `conversation_id` and `status`, and
    /// often `url`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the request fails.
    pub async fn create_conversation(&self, request: &NewConversation) -> Result<Value, ApiError> {
        info!(
            repository = request.repository.as_deref().unwrap_or("-"),
            "Creating conversation"
        );
        let url = format!("{}/api/conversations", self.base_url);
        expect_json(self.http.post(&url).json(request).send().await?).await
    }

    /// GET `/api/conversations/{conversation_id}`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the request fails.
    pub async fn get_conversation(&self, conversation_id: &str) -> Result<Value, ApiError> {
        let url = format!("{}/api/conversations/{}", self.base_url, conversation_id);
        self.get(url, &[]).await
    }

    /// GET `/api/conversations/{conversation_id}/events` — the most useful
    /// endpoint for incremental monitoring.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the request fails.
    pub async fn get_events(
        &self,
        conversation_id: &str,
        query: &EventQuery,
    ) -> Result<Value, ApiError> {
        let url = format!(
            "{}/api/conversations/{}/events",
            self.base_url, conversation_id
        );
        self.get(url, &query.to_params()).await
    }

    /// GET `/api/conversations/{conversation_id}/trajectory` — the entire
    /// event history, heavier than the event feed.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the request fails.
    pub async fn get_trajectory(&self, conversation_id: &str) -> Result<Value, ApiError> {
        let url = format!(
            "{}/api/conversations/{}/trajectory",
            self.base_url, conversation_id
        );
        self.get(url, &[]).await
    }

    /// GET `/api/conversations` — a paginated result set of the form
    /// `{ results: [...], next_page_id: ... }`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the request fails.
    pub async fn list_conversations(&self, query: &ListQuery) -> Result<Value, ApiError> {
        let url = format!("{}/api/conversations", self.base_url);
        self.get(url, &query.to_params()).await
    }

    /// PATCH `/api/conversations/{conversation_id}` — set a deterministic
    /// title for automation-created conversations.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the request fails.
    pub async fn update_conversation_title(
        &self,
        conversation_id: &str,
        title: &str,
    ) -> Result<Value, ApiError> {
        let url = format!("{}/api/conversations/{}", self.base_url, conversation_id);
        expect_json(
            self.http
                .patch(&url)
                .json(&json!({ "title": title }))
                .send()
                .await?,
        )
        .await
    }

    /// DELETE `/api/conversations/{conversation_id}`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the request fails.
    pub async fn delete_conversation(&self, conversation_id: &str) -> Result<Value, ApiError> {
        let url = format!("{}/api/conversations/{}", self.base_url, conversation_id);
        expect_json(self.http.delete(&url).send().await?).await
    }

    /// POST `/api/conversations/{conversation_id}/message` — send a user
    /// message into an existing conversation.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the request fails.
    pub async fn add_message(
        &self,
        conversation_id: &str,
        message: &str,
    ) -> Result<Value, ApiError> {
        let url = format!(
            "{}/api/conversations/{}/message",
            self.base_url, conversation_id
        );
        expect_json(
            self.http
                .post(&url)
                .json(&json!({ "message": message }))
                .send()
                .await?,
        )
        .await
    }

    /// GET `/api/conversations/{conversation_id}/list-files` — files in the
    /// sandbox workspace.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the request fails.
    pub async fn list_workspace_files(
        &self,
        conversation_id: &str,
        path: Option<&str>,
    ) -> Result<Value, ApiError> {
        let url = format!(
            "{}/api/conversations/{}/list-files",
            self.base_url, conversation_id
        );
        let mut params = Vec::new();
        if let Some(path) = path {
            params.push(("path", path.to_string()));
        }
        self.get(url, &params).await
    }

    /// GET `/api/conversations/{conversation_id}/select-file?file=...` —
    /// returns `{ code: "..." }` for text files.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the request fails.
    pub async fn get_file_content(
        &self,
        conversation_id: &str,
        file_path: &str,
    ) -> Result<Value, ApiError> {
        let url = format!(
            "{}/api/conversations/{}/select-file",
            self.base_url, conversation_id
        );
        self.get(url, &[("file", file_path.to_string())]).await
    }

    /// Creates a conversation from a prompt file, optionally appending a
    /// second file (a shared tail with conventions) separated by a blank
    /// line.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Io`] if a file cannot be read, or any request
    /// error from conversation creation.
    pub async fn create_conversation_from_prompt_files(
        &self,
        prompt_file: &Path,
        append_file: Option<&Path>,
        repository: Option<&str>,
        selected_branch: Option<&str>,
    ) -> Result<Value, ApiError> {
        let initial = read_prompt(prompt_file, append_file)?;

        let mut request = NewConversation::new(initial);
        if let Some(repository) = repository {
            request = request.with_repository(repository);
        }
        if let Some(branch) = selected_branch {
            request = request.with_selected_branch(branch);
        }

        self.create_conversation(&request).await
    }

    /// Polls the conversation until it reaches a terminal state (STOPPED,
    /// ERROR, FAILED, or CANCELLED).
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::PollTimeout`] if the deadline passes first, or
    /// any request error from polling.
    pub async fn poll_until_terminal(
        &self,
        conversation_id: &str,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<Value, ApiError> {
        let start = tokio::time::Instant::now();

        while start.elapsed() < timeout {
            let conversation = self.get_conversation(conversation_id).await?;
            let status = status_of(&conversation);
            if is_terminal(&status) {
                info!(conversation_id, status = %status, "Conversation reached terminal state");
                return Ok(conversation);
            }
            debug!(conversation_id, status = %status, "Conversation still running");
            tokio::time::sleep(poll_interval).await;
        }

        Err(ApiError::PollTimeout {
            conversation_id: conversation_id.to_string(),
            timeout_secs: timeout.as_secs(),
        })
    }

    async fn get(&self, url: String, params: &[(&'static str, String)]) -> Result<Value, ApiError> {
        let mut request = self.http.get(&url);
        if !params.is_empty() {
            request = request.query(params);
        }
        expect_json(request.send().await?).await
    }
}

/// Whether a status string is one of the terminal conversation states.
fn is_terminal(status: &str) -> bool {
    TERMINAL_STATUSES.contains(&status)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses_cover_the_safe_set() {
        for status in ["STOPPED", "ERROR", "FAILED", "CANCELLED"] {
            assert!(is_terminal(status));
        }
        assert!(!is_terminal("RUNNING"));
        assert!(!is_terminal(""));
    }

    #[test]
    fn new_conversation_omits_absent_fields() {
        let request = NewConversation::new("do the thing");
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value, json!({"initial_user_msg": "do the thing"}));
    }

    #[test]
    fn new_conversation_builders_fill_fields() {
        let request = NewConversation::new("msg")
            .with_repository("owner/repo")
            .with_selected_branch("main")
            .with_git_provider("github")
            .with_instructions("be careful");

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({
                "initial_user_msg": "msg",
                "repository": "owner/repo",
                "selected_branch": "main",
                "git_provider": "github",
                "conversation_instructions": "be careful",
            })
        );
    }

    #[test]
    fn event_query_clamps_limit() {
        let params = EventQuery {
            limit: 500,
            ..EventQuery::default()
        }
        .to_params();
        assert!(params.contains(&("limit", "100".to_string())));

        let params = EventQuery {
            limit: 0,
            ..EventQuery::default()
        }
        .to_params();
        assert!(params.contains(&("limit", "1".to_string())));
    }

    #[test]
    fn event_query_includes_end_id_when_set() {
        let params = EventQuery {
            start_id: 5,
            end_id: Some(9),
            reverse: true,
            limit: 20,
        }
        .to_params();

        assert_eq!(
            params,
            vec![
                ("start_id", "5".to_string()),
                ("reverse", "true".to_string()),
                ("limit", "20".to_string()),
                ("end_id", "9".to_string()),
            ]
        );
    }

    #[test]
    fn list_query_keeps_limit_positive() {
        let params = ListQuery {
            limit: 0,
            ..ListQuery::default()
        }
        .to_params();
        assert_eq!(params, vec![("limit", "1".to_string())]);
    }

    #[test]
    fn list_query_serializes_flags_lowercase() {
        let params = ListQuery {
            limit: 10,
            page_id: Some("p2".to_string()),
            selected_repository: Some("owner/repo".to_string()),
            include_sub_conversations: Some(false),
        }
        .to_params();

        assert!(params.contains(&("include_sub_conversations", "false".to_string())));
        assert!(params.contains(&("page_id", "p2".to_string())));
    }
}
