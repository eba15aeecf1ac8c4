//! Monitoring API client: all reqwest usage for the external metrics service is confined here.
//! Every call carries the client-level 30s timeout and is fallible; a 404 on a server key is
//! surfaced as NotFound so callers can tell a mistyped key from an outage.

use async_trait::async_trait;
use serde::Deserialize;

/// Timeout for every monitoring API call. Requests past this are abandoned and reported as failures.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Error from the monitoring API. NotFound means the server key has no upstream record;
/// External covers timeouts, non-2xx responses and transport failures. Raw bodies are never
/// carried here, only a short description for logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorError {
    NotFound,
    External(String),
}

impl std::fmt::Display for MonitorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MonitorError::NotFound => write!(f, "server key not found upstream"),
            MonitorError::External(e) => write!(f, "monitoring API failure: {}", e),
        }
    }
}

impl std::error::Error for MonitorError {}

/// Source list for one server record: who may report metrics for it.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSources {
    pub server_id: i64,
    pub server_key: String,
    pub sources: Vec<String>,
}

/// Response to an add-source write.
#[derive(Debug, Clone, Deserialize)]
pub struct AddedSource {
    pub server_id: i64,
    pub source: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
struct MetricsEnvelope {
    metrics: serde_json::Value,
}

/// One performance snapshot. The collector owns the schema, so the body stays opaque JSON;
/// `format_metrics` renders it for chat replies.
pub type MetricsSnapshot = serde_json::Value;

/// Monitoring API operations the core calls. Implemented by HttpMonitorClient; mocked in tests.
#[async_trait]
pub trait MonitorApi: Send + Sync {
    /// GET /servers/by-key/{key}/sources
    async fn server_sources(&self, server_key: &str) -> Result<ServerSources, MonitorError>;

    /// POST /servers/by-key/{key}/sources {"source": tag}
    async fn add_source(&self, server_key: &str, tag: &str) -> Result<AddedSource, MonitorError>;

    /// GET /servers/by-key/{key}/metrics
    async fn server_metrics(&self, server_key: &str) -> Result<MetricsSnapshot, MonitorError>;
}

/// HTTP implementation against the monitoring API base URL.
pub struct HttpMonitorClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpMonitorClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("reqwest client");
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn sources_url(&self, server_key: &str) -> String {
        format!("{}/servers/by-key/{}/sources", self.base_url, server_key)
    }

    fn metrics_url(&self, server_key: &str) -> String {
        format!("{}/servers/by-key/{}/metrics", self.base_url, server_key)
    }
}

/// Map a response status to NotFound/External, or pass the 2xx response through.
fn check_status(res: reqwest::Response) -> Result<reqwest::Response, MonitorError> {
    let status = res.status();
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(MonitorError::NotFound);
    }
    if !status.is_success() {
        return Err(MonitorError::External(format!("status {}", status)));
    }
    Ok(res)
}

impl From<reqwest::Error> for MonitorError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            return MonitorError::External("request timed out".to_string());
        }
        MonitorError::External(e.to_string())
    }
}

#[async_trait]
impl MonitorApi for HttpMonitorClient {
    async fn server_sources(&self, server_key: &str) -> Result<ServerSources, MonitorError> {
        let res = self.client.get(self.sources_url(server_key)).send().await?;
        let res = check_status(res)?;
        Ok(res.json::<ServerSources>().await?)
    }

    async fn add_source(&self, server_key: &str, tag: &str) -> Result<AddedSource, MonitorError> {
        let body = serde_json::json!({ "source": tag });
        let res = self
            .client
            .post(self.sources_url(server_key))
            .json(&body)
            .send()
            .await?;
        let res = check_status(res)?;
        Ok(res.json::<AddedSource>().await?)
    }

    async fn server_metrics(&self, server_key: &str) -> Result<MetricsSnapshot, MonitorError> {
        let res = self.client.get(self.metrics_url(server_key)).send().await?;
        let res = check_status(res)?;
        let envelope = res.json::<MetricsEnvelope>().await?;
        Ok(envelope.metrics)
    }
}

/// Render a snapshot as one `key: value` line per top-level field, keys sorted.
/// Non-object snapshots fall back to their JSON text.
pub fn format_metrics(snapshot: &MetricsSnapshot) -> String {
    let Some(map) = snapshot.as_object() else {
        return snapshot.to_string();
    };
    if map.is_empty() {
        return "(no metrics reported)".to_string();
    }
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();
    keys.iter()
        .map(|k| {
            let v = &map[k.as_str()];
            match v.as_str() {
                Some(s) => format!("{}: {}", k, s),
                None => format!("{}: {}", k, v),
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
