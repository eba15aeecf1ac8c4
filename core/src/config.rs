//! Global config singleton. Load settings.json once; the binary and tests both call
//! `ensure_loaded()` so the first caller does the work, later callers get the same instance.
//! All config (telegram, monitoring API, admins) comes from settings.json.

use std::path::PathBuf;
use std::sync::Once;
use std::sync::OnceLock;

/// Default base URL for the monitoring API when settings.json does not set one.
const DEFAULT_MONITOR_BASE_URL: &str = "http://127.0.0.1:8080";

/// Source tag the bot registers on remote server records.
pub const DEFAULT_SOURCE_TAG: &str = "TGBot";

/// Root directory for config: settings.json lives here (workspace root).
fn config_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("..")
}

/// Install rustls default crypto provider once (required by rustls 0.22+ before any TLS use).
fn ensure_rustls_provider() {
    static ONCE: Once = Once::new();
    ONCE.call_once(|| {
        rustls::crypto::aws_lc_rs::default_provider()
            .install_default()
            .expect("rustls default crypto provider");
    });
}

static CONFIG: OnceLock<Config> = OnceLock::new();

/// Cached config from settings.json.
pub struct Config {
    pub telegram_bot_token: Option<String>,
    /// Base URL of the monitoring API (e.g. https://metrics.example.com).
    pub monitor_base_url: String,
    /// Source tag registered on server records. Default: TGBot.
    pub monitor_source_tag: String,
    /// Telegram user ids granted the admin flag at startup.
    pub admin_user_ids: Vec<i64>,
    /// Root for the SQLite database. Default: ~/.pulsebot.
    pub working_dir: PathBuf,
}

/// Ensure config is loaded (idempotent). Loads settings.json on first call; returns the same instance afterwards.
pub fn ensure_loaded() -> &'static Config {
    ensure_rustls_provider();
    CONFIG.get_or_init(|| {
        let path = config_root().join("settings.json");
        load_settings_from(&path)
    })
}

fn load_settings_from(path: &std::path::Path) -> Config {
    let Ok(data) = std::fs::read_to_string(path) else {
        return Config::default();
    };
    let Ok(root) = serde_json::from_str::<serde_json::Value>(&data) else {
        return Config::default();
    };

    let telegram_bot_token = root
        .get("telegram")
        .and_then(|t| t.get("bot_token"))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .filter(|s| !s.is_empty());

    let monitor = root.get("monitor");
    let monitor_base_url = monitor
        .and_then(|m| m.get("base_url"))
        .and_then(|v| v.as_str())
        .map(|s| s.trim().trim_end_matches('/').to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_MONITOR_BASE_URL.to_string());
    let monitor_source_tag = monitor
        .and_then(|m| m.get("source_tag"))
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_SOURCE_TAG.to_string());

    let admin_user_ids = root
        .get("admins")
        .and_then(|v| v.as_array())
        .map(|a| a.iter().filter_map(|v| v.as_i64()).collect())
        .unwrap_or_default();

    let working_dir = root
        .get("working_dir")
        .and_then(|v| v.as_str())
        .map(|s| PathBuf::from(s.trim()))
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(default_working_dir);

    Config {
        telegram_bot_token,
        monitor_base_url,
        monitor_source_tag,
        admin_user_ids,
        working_dir,
    }
}

/// Default working directory for the database: ~/.pulsebot.
fn default_working_dir() -> PathBuf {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| "/tmp".into());
    PathBuf::from(home).join(".pulsebot")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            telegram_bot_token: None,
            monitor_base_url: DEFAULT_MONITOR_BASE_URL.to_string(),
            monitor_source_tag: DEFAULT_SOURCE_TAG.to_string(),
            admin_user_ids: Vec::new(),
            working_dir: default_working_dir(),
        }
    }
}
