//! Update dispatcher: one inbound event at a time. Derives/updates the caller from the
//! event's identity fields (best-effort: a store failure is logged and never aborts the
//! event), classifies the event, and delegates commands to the router. No locking here and
//! no ordering guarantee across chats; concurrency lives in the transport loop.

use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::bot::event::{CallbackAction, ChatEvent};
use crate::bot::log::{prefix_component, truncate_content_default};
use crate::bot::router::{HandlerContext, Router};
use crate::bot::transport::ChatTransport;
use crate::cache::MetricsCache;
use crate::servers;
use crate::users::{self, User, UserIdentity};

pub const MSG_USAGE_HINT: &str =
    "I only understand commands. Send /help to see what I can do.";
pub const MSG_UNKNOWN_ACTION: &str = "Unknown action.";

pub struct Dispatcher {
    db: Arc<Mutex<Connection>>,
    router: Router,
    transport: Arc<dyn ChatTransport>,
    cache: Arc<MetricsCache>,
    admin_user_ids: Vec<i64>,
}

impl Dispatcher {
    pub fn new(
        db: Arc<Mutex<Connection>>,
        router: Router,
        transport: Arc<dyn ChatTransport>,
        cache: Arc<MetricsCache>,
        admin_user_ids: Vec<i64>,
    ) -> Self {
        Self { db, router, transport, cache, admin_user_ids }
    }

    /// Menu for /help parity with the platform command list.
    pub fn command_menu(&self) -> Vec<(String, String)> {
        self.router.command_menu()
    }

    /// Handle one inbound event to completion.
    pub async fn handle(&self, event: ChatEvent) {
        match event {
            ChatEvent::Message { chat_id, sender, text } => {
                self.handle_message(chat_id, sender, &text).await;
            }
            ChatEvent::Callback { callback_id, chat_id, sender, payload } => {
                self.handle_callback(&callback_id, chat_id, sender, &payload).await;
            }
        }
    }

    async fn handle_message(&self, chat_id: i64, sender: UserIdentity, text: &str) {
        let user = self.resolve_user(&sender);
        let trimmed = text.trim();

        let Some(rest) = trimmed.strip_prefix('/') else {
            eprintln!(
                "{} chat_id={} user_id={} kind=text content={}",
                prefix_component("dispatch"),
                chat_id,
                user.user_id,
                truncate_content_default(trimmed)
            );
            self.send(chat_id, MSG_USAGE_HINT).await;
            return;
        };

        let mut parts = rest.split_whitespace();
        let Some(first) = parts.next() else {
            // a bare "/" carries no command name
            self.send(chat_id, MSG_USAGE_HINT).await;
            return;
        };
        // "/add@MyBot key" arrives in group chats; the suffix is not part of the name.
        let name = first.split('@').next().unwrap_or(first);
        let args: Vec<String> = parts.map(|s| s.to_string()).collect();

        eprintln!(
            "{} chat_id={} user_id={} kind=command name={} args={}",
            prefix_component("dispatch"),
            chat_id,
            user.user_id,
            name,
            args.len()
        );

        let ctx = HandlerContext { user, chat_id, transport: Arc::clone(&self.transport) };
        self.router.route(name, &args, &ctx).await;
    }

    async fn handle_callback(
        &self,
        callback_id: &str,
        chat_id: i64,
        sender: UserIdentity,
        payload: &str,
    ) {
        // Acknowledge before doing anything else; unacknowledged callbacks spin client-side.
        if let Err(e) = self.transport.ack_callback(callback_id, None).await {
            eprintln!(
                "{} op=ack_callback chat_id={} error={}",
                prefix_component("dispatch"),
                chat_id,
                e
            );
        }

        let user = self.resolve_user(&sender);
        match CallbackAction::parse(payload) {
            Some(CallbackAction::RemoveServer { server_key }) => {
                self.remove_server(chat_id, &user, &server_key).await;
            }
            None => {
                eprintln!(
                    "{} chat_id={} user_id={} kind=callback payload={} action=unknown",
                    prefix_component("dispatch"),
                    chat_id,
                    user.user_id,
                    truncate_content_default(payload)
                );
                self.send(chat_id, MSG_UNKNOWN_ACTION).await;
            }
        }
    }

    async fn remove_server(&self, chat_id: i64, user: &User, server_key: &str) {
        let removed = {
            let conn = self.db.lock().unwrap();
            servers::detach_server(&conn, user.user_id, server_key)
        };
        match removed {
            Ok(true) => {
                self.cache.evict(server_key);
                self.send(chat_id, &format!("Server {} removed from your list.", server_key))
                    .await;
            }
            Ok(false) => {
                self.send(chat_id, &format!("Server {} was not in your list.", server_key))
                    .await;
            }
            Err(e) => {
                eprintln!(
                    "{} op=remove_server server_key={} user_id={} error={}",
                    prefix_component("dispatch"),
                    server_key,
                    user.user_id,
                    e
                );
                self.send(chat_id, crate::bot::router::MSG_HANDLER_FAILED).await;
            }
        }
    }

    /// Upsert the caller from identity fields. Best-effort: on a store failure the event
    /// continues with an in-memory user so the bot stays responsive.
    fn resolve_user(&self, sender: &UserIdentity) -> User {
        let is_admin = self.admin_user_ids.contains(&sender.user_id);
        let upserted = {
            let conn = self.db.lock().unwrap();
            users::upsert_user(&conn, sender, is_admin)
        };
        match upserted {
            Ok(user) => user,
            Err(e) => {
                eprintln!(
                    "{} op=upsert_user user_id={} error={}",
                    prefix_component("dispatch"),
                    sender.user_id,
                    e
                );
                let mut user = User::from_identity(sender);
                user.is_admin = is_admin;
                user
            }
        }
    }

    async fn send(&self, chat_id: i64, text: &str) {
        if let Err(e) = self.transport.send_text(chat_id, text).await {
            eprintln!(
                "{} op=send chat_id={} content={} error={}",
                prefix_component("dispatch"),
                chat_id,
                truncate_content_default(text),
                e
            );
        }
    }
}
