//! Telegram channel: all teloxide usage is confined here. Exposes the transport (send,
//! ack, command menu) and the long-poll loop that decodes updates into ChatEvents for the
//! dispatcher. Updates with neither a message nor a callback are dropped at this edge.

use std::sync::Arc;

use teloxide::dispatching::Dispatcher as TgDispatcher;
use teloxide::prelude::*;
use teloxide::types::{
    BotCommand, CallbackQuery, CallbackQueryId, InlineKeyboardButton, InlineKeyboardMarkup,
    MaybeInaccessibleMessage,
};

use crate::bot::dispatcher::Dispatcher;
use crate::bot::event::ChatEvent;
use crate::bot::log::{prefix_component, truncate_content_default};
use crate::bot::transport::{Action, ChatTransport, SendError};
use crate::users::UserIdentity;

pub const TELEGRAM_MAX_MESSAGE_LEN: usize = 4096;

const TELEGRAM_API_GET_ME: &str = "https://api.telegram.org/bot";

/// Telegram send implementation. All teloxide types stay inside this module.
pub struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait::async_trait]
impl ChatTransport for TelegramTransport {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), SendError> {
        let text = truncate_to_max(text).into_owned();
        self.bot
            .send_message(ChatId(chat_id), text.as_str())
            .await
            .map_err(|e| SendError::Other(e.to_string()))?;
        Ok(())
    }

    async fn send_with_actions(
        &self,
        chat_id: i64,
        text: &str,
        actions: &[Action],
    ) -> Result<(), SendError> {
        let text = truncate_to_max(text).into_owned();
        let rows: Vec<Vec<InlineKeyboardButton>> = actions
            .iter()
            .map(|(label, payload)| {
                vec![InlineKeyboardButton::callback(label.clone(), payload.clone())]
            })
            .collect();
        self.bot
            .send_message(ChatId(chat_id), text.as_str())
            .reply_markup(InlineKeyboardMarkup::new(rows))
            .await
            .map_err(|e| SendError::Other(e.to_string()))?;
        Ok(())
    }

    async fn ack_callback(&self, callback_id: &str, text: Option<&str>) -> Result<(), SendError> {
        let id = CallbackQueryId(callback_id.to_string());
        let req = self.bot.answer_callback_query(id);
        let req = match text {
            Some(t) => req.text(t.to_string()),
            None => req,
        };
        req.await.map_err(|e| SendError::Other(e.to_string()))?;
        Ok(())
    }

    async fn set_commands(&self, commands: &[(String, String)]) -> Result<(), SendError> {
        let commands: Vec<BotCommand> = commands
            .iter()
            .map(|(name, description)| BotCommand::new(name.clone(), description.clone()))
            .collect();
        self.bot
            .set_my_commands(commands)
            .await
            .map_err(|e| SendError::Other(e.to_string()))?;
        Ok(())
    }
}

fn truncate_to_max(text: &str) -> std::borrow::Cow<'_, str> {
    if text.len() <= TELEGRAM_MAX_MESSAGE_LEN {
        std::borrow::Cow::Borrowed(text)
    } else {
        let cut = crate::bot::log::floor_char_boundary(text, TELEGRAM_MAX_MESSAGE_LEN);
        std::borrow::Cow::Owned(text[..cut].to_string())
    }
}

fn identity_from(user: &teloxide::types::User) -> UserIdentity {
    UserIdentity {
        user_id: user.id.0 as i64,
        username: user.username.clone(),
        first_name: Some(user.first_name.clone()),
        last_name: user.last_name.clone(),
    }
}

/// Decode one Telegram message into a ChatEvent. Non-text and sender-less messages are
/// dropped (media is out of scope; channel posts carry no user).
fn event_from_message(msg: &Message) -> Option<ChatEvent> {
    let from = msg.from.as_ref()?;
    let text = msg.text()?.trim();
    if text.is_empty() {
        return None;
    }
    Some(ChatEvent::Message {
        chat_id: msg.chat.id.0,
        sender: identity_from(from),
        text: text.to_string(),
    })
}

/// Decode one callback query. Queries without a payload are dropped.
fn event_from_callback(q: &CallbackQuery) -> Option<ChatEvent> {
    let payload = q.data.as_deref()?.to_string();
    // Private chats: the chat id equals the user id, which also covers detached callbacks.
    let chat_id = match q.message.as_ref() {
        Some(MaybeInaccessibleMessage::Regular(m)) => m.chat.id.0,
        Some(MaybeInaccessibleMessage::Inaccessible(m)) => m.chat.id.0,
        None => q.from.id.0 as i64,
    };
    Some(ChatEvent::Callback {
        callback_id: q.id.0.clone(),
        chat_id,
        sender: identity_from(&q.from),
        payload,
    })
}

/// Pre-check Telegram API (getMe). Returns Ok(()) if reachable and token valid.
async fn check_telegram_api(token: &str) -> Result<(), String> {
    let url = format!("{}{}/getMe", TELEGRAM_API_GET_ME, token);
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(10))
        .build()
        .map_err(|e| format!("reqwest client: {}", e))?;
    let res = client
        .get(&url)
        .send()
        .await
        .map_err(|e| format!("Telegram API unreachable: {}", e))?;
    if !res.status().is_success() {
        return Err(format!("getMe returned status {}", res.status()));
    }
    let body = res.text().await.map_err(|e| format!("read body: {}", e))?;
    if body.trim().is_empty() {
        return Err("getMe returned empty body (API may be blocked or proxy needed)".to_string());
    }
    let _: serde_json::Value = serde_json::from_str(&body)
        .map_err(|_| format!("getMe invalid JSON (raw: {} bytes)", body.len()))?;
    Ok(())
}

/// Build a Bot from the configured token after a getMe pre-check.
/// Returns None (and logs why) when the token is missing or the API is unreachable.
pub async fn build_bot(token: Option<&str>) -> Option<Bot> {
    let token = match token {
        Some(t) if !t.trim().is_empty() => t,
        _ => {
            eprintln!("{} config=missing bot_token disabled", prefix_component("telegram"));
            return None;
        }
    };

    if let Err(e) = check_telegram_api(token).await {
        eprintln!(
            "{} config=API check failed error={} (set HTTPS_PROXY if blocked)",
            prefix_component("telegram"),
            e
        );
        return None;
    }

    let bot = Bot::new(token);
    match bot.get_me().await {
        Ok(me) => {
            let name = me.user.username.as_deref().unwrap_or("(no username)");
            eprintln!("{} event=bot_started bot=@{}", prefix_component("telegram"), name);
            Some(bot)
        }
        Err(e) => {
            eprintln!("{} config=get_me failed error={}", prefix_component("telegram"), e);
            None
        }
    }
}

/// Run the Telegram long-poll loop: decode each update into a ChatEvent and hand it to the
/// dispatcher. One event is handled per endpoint invocation; distinct chats may be in
/// flight concurrently. Returns when the bot stops (e.g. Ctrl+C).
pub async fn run_telegram_bot(bot: Bot, dispatcher: Arc<Dispatcher>) {
    let transport = TelegramTransport::new(bot.clone());
    if let Err(e) = transport.set_commands(&dispatcher.command_menu()).await {
        eprintln!("{} op=set_commands error={}", prefix_component("telegram"), e);
    }

    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint({
            let dispatcher = Arc::clone(&dispatcher);
            move |msg: Message| {
                let dispatcher = Arc::clone(&dispatcher);
                async move {
                    if let Some(event) = event_from_message(&msg) {
                        eprintln!(
                            "{} chat_id={} direction=incoming content={}",
                            prefix_component("telegram"),
                            msg.chat.id.0,
                            truncate_content_default(msg.text().unwrap_or(""))
                        );
                        dispatcher.handle(event).await;
                    }
                    respond(())
                }
            }
        }))
        .branch(Update::filter_callback_query().endpoint({
            let dispatcher = Arc::clone(&dispatcher);
            move |q: CallbackQuery| {
                let dispatcher = Arc::clone(&dispatcher);
                async move {
                    if let Some(event) = event_from_callback(&q) {
                        dispatcher.handle(event).await;
                    }
                    respond(())
                }
            }
        }));

    TgDispatcher::builder(bot, handler)
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}
