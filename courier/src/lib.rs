#![doc = include_str!(concat!("../", env!("CARGO_PKG_README")))]

pub mod discord;
pub mod http;
pub mod openhands;

pub use discord::{BotClient, DiscordError, WebhookClient};
pub use http::{post_json, PostBody, PostError, PostOptions, RateLimitInfo};
pub use openhands::{
    AgentServerClient, ApiError, EventFilter, EventQuery, ListQuery, NewConversation, SortOrder,
    StartConversation, V0Client, V1Client, DEFAULT_BASE_URL,
};
