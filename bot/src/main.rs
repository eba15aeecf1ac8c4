//! Standalone PulseBot binary. Reads settings.json, opens the database, wires the
//! dispatcher and runs the Telegram long-poll loop until Ctrl+C.

use std::sync::{Arc, Mutex};

use common::bot::dispatcher::Dispatcher;
use common::bot::handlers::{build_router, HandlerDeps};
use common::bot::telegram;
use common::cache::MetricsCache;
use common::config;
use common::db;
use common::monitor::{HttpMonitorClient, MonitorApi};

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = config::ensure_loaded();
    std::fs::create_dir_all(&config.working_dir)?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(config))
}

async fn run(
    config: &'static config::Config,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let conn = db::open_db(&config.working_dir)?;
    let db = Arc::new(Mutex::new(conn));

    let api: Arc<dyn MonitorApi> =
        Arc::new(HttpMonitorClient::new(config.monitor_base_url.clone()));
    let cache = Arc::new(MetricsCache::new(Arc::clone(&api)));

    let deps = HandlerDeps {
        db: Arc::clone(&db),
        api,
        cache: Arc::clone(&cache),
        source_tag: config.monitor_source_tag.clone(),
    };
    let router = build_router(&deps);

    let bot = match telegram::build_bot(config.telegram_bot_token.as_deref()).await {
        Some(bot) => bot,
        None => return Err("telegram bot token missing or API unreachable".into()),
    };

    let transport = Arc::new(telegram::TelegramTransport::new(bot.clone()));
    let dispatcher = Arc::new(Dispatcher::new(
        db,
        router,
        transport,
        cache,
        config.admin_user_ids.clone(),
    ));

    telegram::run_telegram_bot(bot, dispatcher).await;
    Ok(())
}
