//! HTTP status checks and the polling fallback loop.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracker_logging::{job_debug, job_info};
use url::Url;

use crate::{EngineEvent, EventSink, JobRef, ProbeSource, RetryPolicy};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PollError {
    #[error("invalid status url: {0}")]
    InvalidUrl(String),
    #[error("http status {0}")]
    HttpStatus(u16),
    #[error("network error: {0}")]
    Network(String),
    #[error("undecodable status body: {0}")]
    Decode(String),
}

/// Result of one status check that reached the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Ready { url: String },
    Failed { message: String },
    Pending { progress: Option<u8> },
}

#[async_trait]
pub trait StatusProbe: Send + Sync {
    async fn check(&self, target: &JobRef) -> Result<PollOutcome, PollError>;

    /// Looks up the download URL for a file id, if it has one yet.
    async fn resolve_file_url(&self, file_id: &str) -> Result<Option<String>, PollError> {
        match self.check(&JobRef::file(file_id)).await? {
            PollOutcome::Ready { url } => Ok(Some(url)),
            PollOutcome::Failed { .. } | PollOutcome::Pending { .. } => Ok(None),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct StatusBody {
    url: Option<String>,
    status: Option<String>,
    progress: Option<f64>,
    error: Option<Value>,
    #[serde(default)]
    files: Vec<FileBody>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileBody {
    url: Option<String>,
}

impl StatusBody {
    fn into_outcome(self) -> PollOutcome {
        if let Some(message) = self.error.as_ref().and_then(error_text) {
            return PollOutcome::Failed { message };
        }
        let url = self
            .url
            .filter(|url| !url.is_empty())
            .or_else(|| {
                self.files
                    .into_iter()
                    .filter_map(|file| file.url)
                    .find(|url| !url.is_empty())
            });
        if let Some(url) = url {
            return PollOutcome::Ready { url };
        }
        match self.status.as_deref() {
            Some("failed" | "error") => PollOutcome::Failed {
                message: "generation failed".to_string(),
            },
            _ => PollOutcome::Pending {
                progress: self
                    .progress
                    .filter(|p| p.is_finite())
                    .map(|p| p.round().clamp(0.0, 100.0) as u8),
            },
        }
    }
}

fn error_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Object(map) => map
            .get("message")
            .and_then(Value::as_str)
            .map(ToString::to_string)
            .or_else(|| Some(value.to_string())),
        Value::Bool(true) => Some("generation failed".to_string()),
        _ => None,
    }
}

/// Status checks against `GET /api/file/{id}` and `GET /api/project/{id}`.
#[derive(Debug, Clone)]
pub struct HttpStatusProbe {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpStatusProbe {
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, PollError> {
        let base_url =
            Url::parse(base_url).map_err(|err| PollError::InvalidUrl(err.to_string()))?;
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|err| PollError::Network(err.to_string()))?;
        Ok(Self { client, base_url })
    }
}

#[async_trait]
impl StatusProbe for HttpStatusProbe {
    async fn check(&self, target: &JobRef) -> Result<PollOutcome, PollError> {
        let url = self
            .base_url
            .join(&target.status_path())
            .map_err(|err| PollError::InvalidUrl(err.to_string()))?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| PollError::Network(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PollError::HttpStatus(status.as_u16()));
        }
        let body: StatusBody = response
            .json()
            .await
            .map_err(|err| PollError::Decode(err.to_string()))?;
        Ok(body.into_outcome())
    }
}

/// How a polling run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollVerdict {
    Ready { url: String },
    Failed { message: String },
    Exhausted { attempts: u32 },
    Cancelled,
}

/// Polls until the job is ready or failed, the policy runs out, or `cancel` fires.
///
/// Errors and not-ready bodies count as "try again". Intermediate progress is
/// reported through `sink`.
pub async fn poll_until_done(
    probe: &dyn StatusProbe,
    target: &JobRef,
    policy: &RetryPolicy,
    source: ProbeSource,
    cancel: &CancellationToken,
    sink: &dyn EventSink,
) -> PollVerdict {
    if !sleep_or_cancel(policy.initial_delay, cancel).await {
        return PollVerdict::Cancelled;
    }

    for attempt in 0..policy.max_attempts {
        if attempt > 0 && !sleep_or_cancel(policy.delay_for(attempt - 1), cancel).await {
            return PollVerdict::Cancelled;
        }

        let result = tokio::select! {
            _ = cancel.cancelled() => return PollVerdict::Cancelled,
            result = probe.check(target) => result,
        };
        // A check that raced a cancellation is discarded.
        if cancel.is_cancelled() {
            return PollVerdict::Cancelled;
        }

        match result {
            Ok(PollOutcome::Ready { url }) => {
                job_info!(target.id, "ready after {} checks", attempt + 1);
                return PollVerdict::Ready { url };
            }
            Ok(PollOutcome::Failed { message }) => return PollVerdict::Failed { message },
            Ok(PollOutcome::Pending { progress }) => {
                job_debug!(target.id, "check {} not ready", attempt + 1);
                if let Some(percent) = progress {
                    sink.emit(EngineEvent::Progress {
                        job_id: target.id.clone(),
                        percent,
                        source,
                    });
                }
            }
            Err(err) => job_debug!(target.id, "check {} not ready: {}", attempt + 1, err),
        }
    }

    job_info!(target.id, "no result after {} checks", policy.max_attempts);
    PollVerdict::Exhausted {
        attempts: policy.max_attempts,
    }
}

async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> bool {
    if delay.is_zero() {
        return !cancel.is_cancelled();
    }
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
