use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{RetryPolicy, TrackerSettings, TransportKind};

/// Everything the engine needs to reach the backend and pace its retries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Backend origin serving `/api/generate/*`, `/api/file/*`, `/api/project/*`
    /// and `/api/events/*`.
    pub base_url: String,
    pub transport: TransportKind,
    /// WebSocket endpoint, used when `transport` is `web_socket`. Derived from
    /// `base_url` when unset.
    pub websocket_url: Option<String>,
    pub request_timeout: Duration,
    pub tracker: TrackerSettings,
    pub polling: RetryPolicy,
    pub recovery: RetryPolicy,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000/".to_string(),
            transport: TransportKind::Sse,
            websocket_url: None,
            request_timeout: Duration::from_secs(30),
            tracker: TrackerSettings::default(),
            polling: RetryPolicy::polling(),
            recovery: RetryPolicy::recovery(),
        }
    }
}

impl TrackerConfig {
    pub fn websocket_endpoint(&self) -> String {
        if let Some(url) = &self.websocket_url {
            return url.clone();
        }
        let base = self.base_url.trim_end_matches('/');
        let base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            base.to_string()
        };
        format!("{base}/api/ws")
    }
}
