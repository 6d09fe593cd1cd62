//! Incoming-webhook client.

use super::default_headers;
use super::error::DiscordError;
use super::payload::MessagePayload;
use crate::http::{post_json, PostBody, PostOptions};
use tracing::info;
use url::Url;

/// Posts messages through a Discord incoming webhook.
///
/// The webhook URL embeds a secret token. The client never logs the URL,
/// and every error path passes it through redaction first.
pub struct WebhookClient {
    http: reqwest::Client,
    url: Url,
    options: PostOptions,
}

impl WebhookClient {
    /// Creates a client for the given webhook URL.
    ///
    /// # Errors
    ///
    /// Returns [`DiscordError::InvalidUrl`] if the URL does not parse.
    pub fn new(webhook_url: &str) -> Result<Self, DiscordError> {
        Ok(Self {
            http: reqwest::Client::new(),
            url: Url::parse(webhook_url)?,
            options: PostOptions::default(),
        })
    }

    /// Replaces the posting options.
    #[must_use]
    pub fn with_options(mut self, options: PostOptions) -> Self {
        self.options = options;
        self
    }

    /// Posts a message.
    ///
    /// With `wait` set, Discord returns the created message object instead
    /// of an empty response.
    ///
    /// # Errors
    ///
    /// Returns [`DiscordError::Post`] if the request fails or exhausts its
    /// retry budget.
    pub async fn post(
        &self,
        content: &str,
        wait: bool,
        allow_mentions: bool,
    ) -> Result<PostBody, DiscordError> {
        let url = if wait {
            with_wait_param(&self.url)
        } else {
            self.url.clone()
        };

        let payload = MessagePayload::new(content, allow_mentions);
        let body = post_json(&self.http, &url, default_headers(), &payload, &self.options).await?;
        info!(chars = content.len(), wait, "Webhook message posted");
        Ok(body)
    }
}

/// Returns `url` with `wait=true` set, replacing any existing `wait` value.
fn with_wait_param(url: &Url) -> Url {
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != "wait")
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    let mut updated = url.clone();
    {
        let mut editor = updated.query_pairs_mut();
        editor.clear();
        for (key, value) in &kept {
            editor.append_pair(key, value);
        }
        editor.append_pair("wait", "true");
    }
    updated
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unparseable_url() {
        assert!(matches!(
            WebhookClient::new("not a url"),
            Err(DiscordError::InvalidUrl(_))
        ));
    }

    #[test]
    fn wait_param_is_appended() {
        let url = Url::parse("https://discord.com/api/webhooks/1/tok").unwrap();
        assert_eq!(
            with_wait_param(&url).as_str(),
            "https://discord.com/api/webhooks/1/tok?wait=true"
        );
    }

    #[test]
    fn wait_param_replaces_existing_value() {
        let url = Url::parse("https://discord.com/api/webhooks/1/tok?wait=false&thread_id=9").unwrap();
        assert_eq!(
            with_wait_param(&url).as_str(),
            "https://discord.com/api/webhooks/1/tok?thread_id=9&wait=true"
        );
    }
}
