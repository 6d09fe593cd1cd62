//! Discord client error types.

use crate::http::PostError;
use thiserror::Error;

/// Errors from the Discord clients.
#[derive(Debug, Error)]
pub enum DiscordError {
    /// The webhook URL did not parse. The message deliberately omits the
    /// URL itself: webhook URLs embed a secret token.
    #[error("Invalid webhook URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The bot token contains characters that cannot travel in a header.
    #[error("Bot token is not a valid header value")]
    InvalidToken,

    /// The underlying POST failed.
    #[error(transparent)]
    Post(#[from] PostError),
}
