//! Command router: name -> handler mapping with per-command permission checks.
//! Owned explicitly and built once at startup; registering the same name again overwrites
//! the earlier entry (last registration wins). Handler failures are caught here and turned
//! into a generic reply; raw internal errors never reach the user.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::bot::log::prefix_component;
use crate::bot::transport::ChatTransport;
use crate::users::User;

pub const MSG_UNKNOWN_COMMAND: &str = "Unknown command. Send /help to see what I can do.";
pub const MSG_PERMISSION_DENIED: &str = "You are not allowed to use this command.";
pub const MSG_HANDLER_FAILED: &str = "Something went wrong, please try again later.";

/// Permission predicate evaluated before a handler runs. The only defined kind is Admin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    /// Satisfied only when the caller's admin flag is set.
    Admin,
}

impl Permission {
    fn allows(&self, user: &User) -> bool {
        match self {
            Permission::Admin => user.is_admin,
        }
    }
}

/// Static description of one command: dispatch name, menu text, permission predicates.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub permissions: Vec<Permission>,
}

impl CommandSpec {
    pub fn new(name: &'static str, description: &'static str) -> Self {
        Self { name, description, permissions: Vec::new() }
    }

    pub fn admin_only(name: &'static str, description: &'static str) -> Self {
        Self { name, description, permissions: vec![Permission::Admin] }
    }
}

/// Request-scoped context handed to a handler: the resolved caller and where to reply.
pub struct HandlerContext {
    pub user: User,
    pub chat_id: i64,
    pub transport: Arc<dyn ChatTransport>,
}

impl HandlerContext {
    /// Reply to the caller's chat; a failed send is logged, never propagated.
    pub async fn reply(&self, text: &str) {
        if let Err(e) = self.transport.send_text(self.chat_id, text).await {
            eprintln!(
                "{} op=reply chat_id={} error={}",
                prefix_component("router"),
                self.chat_id,
                e
            );
        }
    }
}

/// One command implementation.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn run(&self, ctx: &HandlerContext, args: &[String]) -> anyhow::Result<()>;
}

struct CommandEntry {
    spec: CommandSpec,
    handler: Arc<dyn CommandHandler>,
}

/// Name -> command mapping. Mutable only while the bot is being wired; shared read-only after.
#[derive(Default)]
pub struct Router {
    commands: HashMap<String, CommandEntry>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert (or overwrite) a command under its name. Idempotent, no error path.
    pub fn register(&mut self, spec: CommandSpec, handler: Arc<dyn CommandHandler>) {
        self.commands.insert(spec.name.to_string(), CommandEntry { spec, handler });
    }

    /// (name, description) pairs for /help and the platform command menu, sorted by name.
    pub fn command_menu(&self) -> Vec<(String, String)> {
        let mut menu: Vec<(String, String)> = self
            .commands
            .values()
            .map(|e| (e.spec.name.to_string(), e.spec.description.to_string()))
            .collect();
        menu.sort();
        menu
    }

    /// Route one invocation. Unknown names and permission denials are normal outcomes with
    /// fixed replies; only handler errors are logged as failures.
    pub async fn route(&self, name: &str, args: &[String], ctx: &HandlerContext) {
        let Some(entry) = self.commands.get(name) else {
            ctx.reply(MSG_UNKNOWN_COMMAND).await;
            return;
        };

        for permission in &entry.spec.permissions {
            if !permission.allows(&ctx.user) {
                ctx.reply(MSG_PERMISSION_DENIED).await;
                return;
            }
        }

        if let Err(e) = entry.handler.run(ctx, args).await {
            eprintln!(
                "{} op=handle command={} user_id={} error={:#}",
                prefix_component("router"),
                name,
                ctx.user.user_id,
                e
            );
            ctx.reply(MSG_HANDLER_FAILED).await;
        }
    }
}
