//! Bot-token channel message client.

use super::error::DiscordError;
use super::payload::MessagePayload;
use super::{default_headers, API_BASE};
use crate::http::{post_json, PostBody, PostOptions};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use tracing::info;
use url::Url;

/// Posts channel messages with bot-token authentication.
///
/// Messages go to `{base}/channels/{channel_id}/messages` with an
/// `Authorization: Bot <token>` header. The token never travels in a URL,
/// so it cannot leak through error context.
pub struct BotClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    options: PostOptions,
}

impl BotClient {
    /// Creates a client for the given bot token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: API_BASE.to_string(),
            token: token.into(),
            options: PostOptions::default(),
        }
    }

    /// Overrides the API base URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Replaces the posting options.
    #[must_use]
    pub fn with_options(mut self, options: PostOptions) -> Self {
        self.options = options;
        self
    }

    /// Sends a message to a channel.
    ///
    /// The bot route always returns the created message object.
    ///
    /// # Errors
    ///
    /// Returns [`DiscordError::InvalidToken`] for tokens that cannot be
    /// sent as a header, [`DiscordError::InvalidUrl`] for channel ids that
    /// break the route, and [`DiscordError::Post`] for request failures.
    pub async fn send(
        &self,
        channel_id: &str,
        content: &str,
        allow_mentions: bool,
    ) -> Result<PostBody, DiscordError> {
        let url = Url::parse(&format!(
            "{}/channels/{}/messages",
            self.base_url, channel_id
        ))?;

        let payload = MessagePayload::new(content, allow_mentions);
        let body = post_json(&self.http, &url, self.headers()?, &payload, &self.options).await?;
        info!(channel_id, chars = content.len(), "Channel message sent");
        Ok(body)
    }

    fn headers(&self) -> Result<HeaderMap, DiscordError> {
        let mut headers = default_headers();
        let mut auth = HeaderValue::from_str(&format!("Bot {}", self.token))
            .map_err(|_| DiscordError::InvalidToken)?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        Ok(headers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authorization_header_uses_bot_scheme() {
        let client = BotClient::new("abc123");
        let headers = client.headers().unwrap();
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bot abc123");
        assert!(headers.get(AUTHORIZATION).unwrap().is_sensitive());
    }

    #[test]
    fn rejects_tokens_with_control_characters() {
        let client = BotClient::new("bad\ntoken");
        assert!(matches!(client.headers(), Err(DiscordError::InvalidToken)));
    }

    #[test]
    fn base_url_override_trims_trailing_slash() {
        let client = BotClient::new("t").with_base_url("http://127.0.0.1:9999/");
        assert_eq!(client.base_url, "http://127.0.0.1:9999");
    }
}
