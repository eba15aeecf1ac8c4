//! PulseBot core: config, SQLite storage, monitoring API client, metrics cache,
//! source reconciler, bot dispatch. No binary, no UI.

pub mod bot;
pub mod cache;
pub mod config;
pub mod db;
pub mod monitor;
pub mod reconcile;
pub mod servers;
pub mod users;
