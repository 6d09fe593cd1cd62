//! Discord message posting.
//!
//! Two thin clients over the rate-limit-aware poster:
//! - [`WebhookClient`] posts through a secret incoming-webhook URL.
//! - [`BotClient`] posts to a channel with a bot token.
//!
//! Both suppress mentions unless a message explicitly allows them.

mod bot;
mod error;
mod payload;
mod webhook;

pub use bot::BotClient;
pub use error::DiscordError;
pub use payload::{AllowedMentions, MessagePayload};
pub use webhook::WebhookClient;

use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};

/// Base URL for bot-authenticated API calls.
pub const API_BASE: &str = "https://discord.com/api/v10";

/// User agent sent with every request.
const CLIENT_USER_AGENT: &str = concat!(
    "courier/",
    env!("CARGO_PKG_VERSION"),
    " (+https://github.com/courier-rs/courier)"
);

/// Headers common to both clients. Content type is set by the poster.
fn default_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));
    headers
}
