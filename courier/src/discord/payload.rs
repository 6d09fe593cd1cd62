//! Message payloads.

use serde::Serialize;

/// Mention parsing controls attached to outgoing messages.
#[derive(Debug, Clone, Serialize)]
pub struct AllowedMentions {
    /// Mention types Discord may parse out of the content. Empty disables
    /// all of them.
    pub parse: Vec<String>,
}

impl AllowedMentions {
    /// Suppresses every mention type.
    #[must_use]
    pub fn none() -> Self {
        Self { parse: Vec::new() }
    }
}

/// Body of a message create request.
#[derive(Debug, Clone, Serialize)]
pub struct MessagePayload {
    /// Message content. Discord caps this at 2000 characters server-side.
    pub content: String,

    /// Mention controls; absent means Discord parses mentions normally.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_mentions: Option<AllowedMentions>,
}

impl MessagePayload {
    /// Builds a payload, suppressing mentions unless explicitly allowed.
    #[must_use]
    pub fn new(content: impl Into<String>, allow_mentions: bool) -> Self {
        Self {
            content: content.into(),
            allowed_mentions: (!allow_mentions).then(AllowedMentions::none),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn suppresses_mentions_by_default() {
        let payload = MessagePayload::new("hello", false);
        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            json!({"content": "hello", "allowed_mentions": {"parse": []}})
        );
    }

    #[test]
    fn omits_mention_controls_when_allowed() {
        let payload = MessagePayload::new("hello @here", true);
        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            json!({"content": "hello @here"})
        );
    }
}
