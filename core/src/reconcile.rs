//! Source reconciler: make sure the bot is listed as a metrics source on a remote server
//! record before that server is worth polling. The upstream has no native "ensure" endpoint,
//! so this is check-then-act: read the source list, write only when the tag is absent.
//! Safe to call on every add request; repeats and retries cause at most a redundant write,
//! which the upstream treats as a no-op.

use crate::bot::log::prefix_component;
use crate::monitor::{MonitorApi, MonitorError};
use crate::servers::validate_server_key;

/// Successful reconciliation outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// The tag was already on the source list; no write was issued.
    AlreadyRegistered,
    /// The add-source write went through.
    Registered,
}

/// Failure modes, in user-facing order of specificity. InvalidKey is caller input and is
/// rejected before any network call; NotFound means the key has no upstream record; External
/// is anything else and is retried only by the user re-issuing the command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    InvalidKey(&'static str),
    NotFound,
    External(String),
}

impl std::fmt::Display for ReconcileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReconcileError::InvalidKey(reason) => write!(f, "invalid server key: {}", reason),
            ReconcileError::NotFound => write!(f, "server key not found upstream"),
            ReconcileError::External(e) => write!(f, "monitoring API failure: {}", e),
        }
    }
}

impl std::error::Error for ReconcileError {}

impl From<MonitorError> for ReconcileError {
    fn from(e: MonitorError) -> Self {
        match e {
            MonitorError::NotFound => ReconcileError::NotFound,
            MonitorError::External(msg) => ReconcileError::External(msg),
        }
    }
}

/// Ensure `source_tag` is registered on the server record behind `server_key`.
/// Callers persist the local (user, server) relation only after this returns Ok, so a
/// recorded relation always implies a best-effort-confirmed upstream registration.
pub async fn ensure_registered(
    api: &dyn MonitorApi,
    source_tag: &str,
    server_key: &str,
) -> Result<Reconciliation, ReconcileError> {
    validate_server_key(server_key).map_err(ReconcileError::InvalidKey)?;

    let listed = api.server_sources(server_key).await?;
    if listed.sources.iter().any(|s| s == source_tag) {
        return Ok(Reconciliation::AlreadyRegistered);
    }

    let added = api.add_source(server_key, source_tag).await?;
    eprintln!(
        "{} op=add_source server_key={} source={} server_id={}",
        prefix_component("reconcile"),
        server_key,
        added.source,
        added.server_id
    );
    Ok(Reconciliation::Registered)
}
