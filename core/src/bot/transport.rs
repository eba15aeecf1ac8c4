//! Chat transport abstraction: deliver replies, acknowledge callbacks, register the command
//! menu. Implemented per chat platform; the rest of the bot never sees platform types.

use async_trait::async_trait;

/// Error from a transport call. Rate-limited responses can be retried after a delay.
#[derive(Debug, Clone)]
pub enum SendError {
    /// API returned 429; retry after this many seconds.
    #[allow(dead_code)]
    RateLimited { retry_after_secs: f64 },
    /// Other error (network, auth, etc.).
    Other(String),
}

impl std::fmt::Display for SendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SendError::RateLimited { retry_after_secs } => {
                write!(f, "rate limited, retry after {}s", retry_after_secs)
            }
            SendError::Other(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for SendError {}

/// One callback button: (label shown to the user, opaque payload echoed back).
pub type Action = (String, String);

/// Transport that delivers bot output to a chat platform. Must truncate to its own
/// message-length limit; callers do not chunk.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Send a plain text reply to a chat.
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), SendError>;

    /// Send text with one callback button per action (platform renders the keyboard).
    async fn send_with_actions(
        &self,
        chat_id: i64,
        text: &str,
        actions: &[Action],
    ) -> Result<(), SendError>;

    /// Acknowledge a callback, optionally with transient notification text.
    /// Callbacks left unacknowledged cause client-side spinners.
    async fn ack_callback(&self, callback_id: &str, text: Option<&str>) -> Result<(), SendError>;

    /// Register the bot's command menu with the platform.
    async fn set_commands(&self, commands: &[(String, String)]) -> Result<(), SendError>;
}
