use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::JobRef;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid transport url: {0}")]
    InvalidUrl(String),
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("stream error: {0}")]
    Stream(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    #[default]
    Sse,
    WebSocket,
}

/// Opens real-time connections to a job's channel.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn open(&self, target: &JobRef) -> Result<Box<dyn Connection>, TransportError>;
}

/// One live real-time connection.
#[async_trait]
pub trait Connection: Send {
    /// Next text message; `None` once the peer closed the stream.
    async fn next_message(&mut self) -> Option<Result<String, TransportError>>;

    async fn close(&mut self);
}
