//! Shared test doubles for bot modules.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::bot::transport::{Action, ChatTransport, SendError};
use crate::users::{User, UserIdentity};

/// Transport double that records every outgoing text and callback ack.
pub struct RecordingTransport {
    pub sent: Mutex<Vec<(i64, String)>>,
    pub actions: Mutex<Vec<Vec<Action>>>,
    pub acks: Mutex<Vec<(String, Option<String>)>>,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            actions: Mutex::new(Vec::new()),
            acks: Mutex::new(Vec::new()),
        })
    }

    pub fn texts(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|(_, t)| t.clone()).collect()
    }

    pub fn acked(&self) -> Vec<(String, Option<String>)> {
        self.acks.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), SendError> {
        self.sent.lock().unwrap().push((chat_id, text.to_string()));
        Ok(())
    }

    async fn send_with_actions(
        &self,
        chat_id: i64,
        text: &str,
        actions: &[Action],
    ) -> Result<(), SendError> {
        self.sent.lock().unwrap().push((chat_id, text.to_string()));
        self.actions.lock().unwrap().push(actions.to_vec());
        Ok(())
    }

    async fn ack_callback(&self, callback_id: &str, text: Option<&str>) -> Result<(), SendError> {
        self.acks
            .lock()
            .unwrap()
            .push((callback_id.to_string(), text.map(|t| t.to_string())));
        Ok(())
    }

    async fn set_commands(&self, _commands: &[(String, String)]) -> Result<(), SendError> {
        Ok(())
    }
}

pub fn identity(user_id: i64) -> UserIdentity {
    UserIdentity {
        user_id,
        username: Some(format!("user{}", user_id)),
        first_name: Some("Test".to_string()),
        last_name: None,
    }
}

pub fn user(user_id: i64, is_admin: bool) -> User {
    let mut u = User::from_identity(&identity(user_id));
    u.is_admin = is_admin;
    u
}
