//! Command implementations and router wiring. Each handler owns exactly the dependencies it
//! needs; the request-scoped caller/chat context arrives through HandlerContext. Input
//! problems (missing argument, bad key, unknown upstream key) get specific corrective
//! replies and are never treated as failures.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::Connection;

use crate::bot::event::CallbackAction;
use crate::bot::log::prefix_component;
use crate::bot::router::{CommandHandler, CommandSpec, HandlerContext, Router};
use crate::cache::MetricsCache;
use crate::monitor::{format_metrics, MonitorApi, MonitorError};
use crate::reconcile::{ensure_registered, ReconcileError, Reconciliation};
use crate::servers;

pub const MSG_SERVER_NOT_FOUND: &str =
    "The monitoring service doesn't know that server key. Check it and try again.";
pub const MSG_MONITOR_UNAVAILABLE: &str =
    "The monitoring service is unavailable right now, please try again later.";

/// Shared dependencies handed to `build_router`.
pub struct HandlerDeps {
    pub db: Arc<Mutex<Connection>>,
    pub api: Arc<dyn MonitorApi>,
    pub cache: Arc<MetricsCache>,
    /// Source tag registered upstream (e.g. "TGBot").
    pub source_tag: String,
}

/// Build the router with the full command set registered. Called once at startup.
pub fn build_router(deps: &HandlerDeps) -> Router {
    let mut router = Router::new();

    router.register(
        CommandSpec::new("start", "what this bot does"),
        Arc::new(StartCmd),
    );
    router.register(
        CommandSpec::new("add", "register a server by key"),
        Arc::new(AddServerCmd {
            db: Arc::clone(&deps.db),
            api: Arc::clone(&deps.api),
            source_tag: deps.source_tag.clone(),
        }),
    );
    router.register(
        CommandSpec::new("servers", "list your servers"),
        Arc::new(ListServersCmd { db: Arc::clone(&deps.db) }),
    );
    router.register(
        CommandSpec::new("metrics", "show metrics for a server"),
        Arc::new(MetricsCmd { cache: Arc::clone(&deps.cache) }),
    );
    router.register(
        CommandSpec::admin_only("cache_clear", "drop cached metrics"),
        Arc::new(CacheClearCmd { cache: Arc::clone(&deps.cache) }),
    );
    router.register(
        CommandSpec::admin_only("stats", "cache statistics"),
        Arc::new(StatsCmd { cache: Arc::clone(&deps.cache) }),
    );

    // /help renders the final menu, itself included, so it registers last.
    let mut menu = router.command_menu();
    menu.push(("help".to_string(), "list available commands".to_string()));
    menu.sort();
    router.register(
        CommandSpec::new("help", "list available commands"),
        Arc::new(HelpCmd { menu }),
    );

    router
}

struct StartCmd;

#[async_trait]
impl CommandHandler for StartCmd {
    async fn run(&self, ctx: &HandlerContext, _args: &[String]) -> anyhow::Result<()> {
        ctx.reply(
            "Hi! I watch your servers through the monitoring service.\n\
             /add <server_key> registers a server, /servers lists yours, \
             /metrics <server_key> shows its latest numbers.",
        )
        .await;
        Ok(())
    }
}

struct HelpCmd {
    menu: Vec<(String, String)>,
}

#[async_trait]
impl CommandHandler for HelpCmd {
    async fn run(&self, ctx: &HandlerContext, _args: &[String]) -> anyhow::Result<()> {
        let lines: Vec<String> = self
            .menu
            .iter()
            .map(|(name, description)| format!("/{} - {}", name, description))
            .collect();
        ctx.reply(&lines.join("\n")).await;
        Ok(())
    }
}

struct AddServerCmd {
    db: Arc<Mutex<Connection>>,
    api: Arc<dyn MonitorApi>,
    source_tag: String,
}

#[async_trait]
impl CommandHandler for AddServerCmd {
    async fn run(&self, ctx: &HandlerContext, args: &[String]) -> anyhow::Result<()> {
        let Some(server_key) = args.first() else {
            ctx.reply("Usage: /add <server_key>").await;
            return Ok(());
        };

        match ensure_registered(self.api.as_ref(), &self.source_tag, server_key).await {
            Ok(outcome) => {
                // The relation is persisted with the user-typed key, and only now that the
                // upstream registration is confirmed.
                let newly_attached = {
                    let conn = self.db.lock().unwrap();
                    servers::ensure_server(&conn, server_key)?;
                    servers::attach_server(&conn, ctx.user.user_id, server_key, servers::ROLE_OWNER)?
                };
                if outcome == Reconciliation::Registered {
                    eprintln!(
                        "{} op=add server_key={} user_id={} registered=1",
                        prefix_component("handlers"),
                        server_key,
                        ctx.user.user_id
                    );
                }
                if newly_attached {
                    ctx.reply(&format!("Server {} added to your list.", server_key)).await;
                } else {
                    ctx.reply(&format!("Server {} is already in your list.", server_key)).await;
                }
            }
            Err(ReconcileError::InvalidKey(reason)) => {
                ctx.reply(&format!("Invalid server key: {}.", reason)).await;
            }
            Err(ReconcileError::NotFound) => {
                ctx.reply(MSG_SERVER_NOT_FOUND).await;
            }
            Err(ReconcileError::External(e)) => {
                eprintln!(
                    "{} op=add server_key={} user_id={} error={}",
                    prefix_component("handlers"),
                    server_key,
                    ctx.user.user_id,
                    e
                );
                ctx.reply(MSG_MONITOR_UNAVAILABLE).await;
            }
        }
        Ok(())
    }
}

struct ListServersCmd {
    db: Arc<Mutex<Connection>>,
}

#[async_trait]
impl CommandHandler for ListServersCmd {
    async fn run(&self, ctx: &HandlerContext, _args: &[String]) -> anyhow::Result<()> {
        let listed = {
            let conn = self.db.lock().unwrap();
            servers::list_servers_for_user(&conn, ctx.user.user_id)?
        };
        if listed.is_empty() {
            ctx.reply("No servers yet. Add one with /add <server_key>.").await;
            return Ok(());
        }

        let lines: Vec<String> = listed
            .iter()
            .map(|s| format!("{} ({})", s.server_key, s.role))
            .collect();
        let actions: Vec<(String, String)> = listed
            .iter()
            .map(|s| {
                let payload =
                    CallbackAction::RemoveServer { server_key: s.server_key.clone() }.payload();
                (format!("Remove {}", s.server_key), payload)
            })
            .collect();

        let text = format!("Your servers (newest first):\n{}", lines.join("\n"));
        if let Err(e) = ctx.transport.send_with_actions(ctx.chat_id, &text, &actions).await {
            eprintln!(
                "{} op=servers chat_id={} error={}",
                prefix_component("handlers"),
                ctx.chat_id,
                e
            );
        }
        Ok(())
    }
}

struct MetricsCmd {
    cache: Arc<MetricsCache>,
}

#[async_trait]
impl CommandHandler for MetricsCmd {
    async fn run(&self, ctx: &HandlerContext, args: &[String]) -> anyhow::Result<()> {
        let Some(server_key) = args.first() else {
            ctx.reply("Usage: /metrics <server_key>").await;
            return Ok(());
        };
        if let Err(reason) = servers::validate_server_key(server_key) {
            ctx.reply(&format!("Invalid server key: {}.", reason)).await;
            return Ok(());
        }

        match self.cache.get(server_key).await {
            Ok(snapshot) => {
                let body = format_metrics(&snapshot);
                ctx.reply(&format!("Metrics for {}:\n{}", server_key, body)).await;
            }
            Err(MonitorError::NotFound) => {
                ctx.reply(MSG_SERVER_NOT_FOUND).await;
            }
            Err(MonitorError::External(e)) => {
                eprintln!(
                    "{} op=metrics server_key={} user_id={} error={}",
                    prefix_component("handlers"),
                    server_key,
                    ctx.user.user_id,
                    e
                );
                ctx.reply(MSG_MONITOR_UNAVAILABLE).await;
            }
        }
        Ok(())
    }
}

struct CacheClearCmd {
    cache: Arc<MetricsCache>,
}

#[async_trait]
impl CommandHandler for CacheClearCmd {
    async fn run(&self, ctx: &HandlerContext, args: &[String]) -> anyhow::Result<()> {
        self.cache.clear(args);
        if args.is_empty() {
            ctx.reply("Cache cleared.").await;
        } else {
            ctx.reply(&format!("Dropped {} cache entries.", args.len())).await;
        }
        Ok(())
    }
}

struct StatsCmd {
    cache: Arc<MetricsCache>,
}

#[async_trait]
impl CommandHandler for StatsCmd {
    async fn run(&self, ctx: &HandlerContext, _args: &[String]) -> anyhow::Result<()> {
        let stats = self.cache.stats();
        ctx.reply(&format!(
            "Cache: {} hits, {} misses, {} entries.",
            stats.hits, stats.misses, stats.entries
        ))
        .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::bot::testutil::{user, RecordingTransport};
    use crate::cache::MetricsCache;
    use crate::db;
    use crate::monitor::{AddedSource, MetricsSnapshot, ServerSources};
    use crate::users;

    /// Upstream double: fixed source list, counts writes, serves one metrics document.
    struct ScriptedMonitor {
        sources: Mutex<Vec<String>>,
        known: bool,
        reads: AtomicUsize,
        writes: AtomicUsize,
    }

    impl ScriptedMonitor {
        fn known(sources: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                sources: Mutex::new(sources.iter().map(|s| s.to_string()).collect()),
                known: true,
                reads: AtomicUsize::new(0),
                writes: AtomicUsize::new(0),
            })
        }

        fn unknown() -> Arc<Self> {
            Arc::new(Self {
                sources: Mutex::new(Vec::new()),
                known: false,
                reads: AtomicUsize::new(0),
                writes: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl MonitorApi for ScriptedMonitor {
        async fn server_sources(&self, key: &str) -> Result<ServerSources, MonitorError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            if !self.known {
                return Err(MonitorError::NotFound);
            }
            Ok(ServerSources {
                server_id: 7,
                server_key: key.to_string(),
                sources: self.sources.lock().unwrap().clone(),
            })
        }

        async fn add_source(&self, _key: &str, tag: &str) -> Result<AddedSource, MonitorError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.sources.lock().unwrap().push(tag.to_string());
            Ok(AddedSource { server_id: 7, source: tag.to_string(), message: String::new() })
        }

        async fn server_metrics(&self, _key: &str) -> Result<MetricsSnapshot, MonitorError> {
            if !self.known {
                return Err(MonitorError::NotFound);
            }
            Ok(serde_json::json!({ "cpu_percent": 12.5 }))
        }
    }

    fn deps(api: Arc<ScriptedMonitor>) -> HandlerDeps {
        let conn = db::open_db_in_memory().unwrap();
        HandlerDeps {
            db: Arc::new(Mutex::new(conn)),
            api: api.clone() as Arc<dyn MonitorApi>,
            cache: Arc::new(MetricsCache::new(api as Arc<dyn MonitorApi>)),
            source_tag: "TGBot".to_string(),
        }
    }

    fn ctx(transport: Arc<RecordingTransport>, is_admin: bool) -> HandlerContext {
        HandlerContext { user: user(1, is_admin), chat_id: 10, transport }
    }

    fn seed_user(deps: &HandlerDeps) {
        let conn = deps.db.lock().unwrap();
        users::upsert_user(&conn, &crate::bot::testutil::identity(1), false).unwrap();
    }

    #[tokio::test]
    async fn add_without_argument_replies_usage() {
        let api = ScriptedMonitor::known(&["Web"]);
        let deps = deps(api.clone());
        let router = build_router(&deps);
        let transport = RecordingTransport::new();

        router.route("add", &[], &ctx(transport.clone(), false)).await;
        assert_eq!(transport.texts(), vec!["Usage: /add <server_key>".to_string()]);
        assert_eq!(api.reads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn add_rejects_bad_key_before_upstream() {
        let api = ScriptedMonitor::known(&["Web"]);
        let deps = deps(api.clone());
        let router = build_router(&deps);
        let transport = RecordingTransport::new();

        router.route("add", &["ab".to_string()], &ctx(transport.clone(), false)).await;
        assert!(transport.texts()[0].starts_with("Invalid server key"));
        assert_eq!(api.reads.load(Ordering::SeqCst), 0);
        assert_eq!(api.writes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn add_registers_and_persists_relation() {
        let api = ScriptedMonitor::known(&["Web"]);
        let deps = deps(api.clone());
        seed_user(&deps);
        let router = build_router(&deps);
        let transport = RecordingTransport::new();

        router.route("add", &["srv_12313".to_string()], &ctx(transport.clone(), false)).await;
        assert_eq!(transport.texts(), vec!["Server srv_12313 added to your list.".to_string()]);
        assert_eq!(api.writes.load(Ordering::SeqCst), 1);
        assert!(api.sources.lock().unwrap().contains(&"TGBot".to_string()));

        let conn = deps.db.lock().unwrap();
        let listed = servers::list_servers_for_user(&conn, 1).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].server_key, "srv_12313");
        assert_eq!(listed[0].role, servers::ROLE_OWNER);
    }

    #[tokio::test]
    async fn re_adding_is_a_noop_with_one_write_total() {
        let api = ScriptedMonitor::known(&["Web"]);
        let deps = deps(api.clone());
        seed_user(&deps);
        let router = build_router(&deps);
        let transport = RecordingTransport::new();
        let args = vec!["srv_12313".to_string()];

        router.route("add", &args, &ctx(transport.clone(), false)).await;
        router.route("add", &args, &ctx(transport.clone(), false)).await;

        assert_eq!(api.writes.load(Ordering::SeqCst), 1);
        assert_eq!(
            transport.texts()[1],
            "Server srv_12313 is already in your list.".to_string()
        );
        let conn = deps.db.lock().unwrap();
        assert_eq!(servers::list_servers_for_user(&conn, 1).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn add_unknown_key_gets_distinct_reply() {
        let api = ScriptedMonitor::unknown();
        let deps = deps(api.clone());
        let router = build_router(&deps);
        let transport = RecordingTransport::new();

        router.route("add", &["srv_typo".to_string()], &ctx(transport.clone(), false)).await;
        assert_eq!(transport.texts(), vec![MSG_SERVER_NOT_FOUND.to_string()]);
    }

    #[tokio::test]
    async fn servers_lists_with_remove_buttons() {
        let api = ScriptedMonitor::known(&["Web"]);
        let deps = deps(api.clone());
        seed_user(&deps);
        let router = build_router(&deps);
        let transport = RecordingTransport::new();

        router.route("add", &["srv_12313".to_string()], &ctx(transport.clone(), false)).await;
        router.route("servers", &[], &ctx(transport.clone(), false)).await;

        let texts = transport.texts();
        assert!(texts[1].contains("srv_12313 (owner)"));
        let actions = transport.actions.lock().unwrap();
        assert_eq!(actions[0][0].1, "remove_server:srv_12313");
    }

    #[tokio::test]
    async fn metrics_renders_cached_snapshot() {
        let api = ScriptedMonitor::known(&["Web", "TGBot"]);
        let deps = deps(api.clone());
        let router = build_router(&deps);
        let transport = RecordingTransport::new();

        router.route("metrics", &["srv_12313".to_string()], &ctx(transport.clone(), false)).await;
        assert_eq!(
            transport.texts(),
            vec!["Metrics for srv_12313:\ncpu_percent: 12.5".to_string()]
        );
    }

    #[tokio::test]
    async fn help_lists_every_command() {
        let api = ScriptedMonitor::known(&[]);
        let deps = deps(api.clone());
        let router = build_router(&deps);
        let transport = RecordingTransport::new();

        router.route("help", &[], &ctx(transport.clone(), false)).await;
        let help = &transport.texts()[0];
        for name in ["/start", "/help", "/add", "/servers", "/metrics", "/cache_clear", "/stats"] {
            assert!(help.contains(name), "missing {} in help: {}", name, help);
        }
    }
}
