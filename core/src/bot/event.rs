//! Inbound event model: one tagged event per update, decoded at the transport edge.
//! Updates carrying neither a message nor a callback are dropped there (silent no-op).

use crate::users::UserIdentity;

/// One inbound chat event.
#[derive(Debug, Clone)]
pub enum ChatEvent {
    /// A text message from a user.
    Message {
        chat_id: i64,
        sender: UserIdentity,
        text: String,
    },
    /// A callback notification (button tap). Must be acknowledged.
    Callback {
        callback_id: String,
        chat_id: i64,
        sender: UserIdentity,
        payload: String,
    },
}

/// Callback payload prefix for removing a server from the tapping user's list.
pub const REMOVE_SERVER_PREFIX: &str = "remove_server:";

/// Decoded callback payload. Payloads are validated here, at construction time, so the
/// dispatcher never branches on raw strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackAction {
    RemoveServer { server_key: String },
}

impl CallbackAction {
    /// Parse an opaque callback payload. Returns None for unrecognized or empty payloads.
    pub fn parse(payload: &str) -> Option<Self> {
        if let Some(key) = payload.strip_prefix(REMOVE_SERVER_PREFIX) {
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            return Some(CallbackAction::RemoveServer { server_key: key.to_string() });
        }
        None
    }

    /// Encode the action back into a payload string (for keyboard buttons).
    pub fn payload(&self) -> String {
        match self {
            CallbackAction::RemoveServer { server_key } => {
                format!("{}{}", REMOVE_SERVER_PREFIX, server_key)
            }
        }
    }
}
