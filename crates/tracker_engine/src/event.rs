//! Real-time message envelope and the closed set of event kinds it carries.
//!
//! Wire shape: `{ type, projectId?, requestId?, object?, progress?, url?, error? }`.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::JobId;

#[derive(Debug, Error)]
pub enum EventParseError {
    #[error("invalid event json: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("unknown event type {0:?}")]
    UnknownKind(String),
    #[error("{kind} event missing {field}")]
    MissingField {
        kind: &'static str,
        field: &'static str,
    },
}

/// Where a finished file can be fetched from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileRef {
    Url(String),
    /// Only the id is known; the URL needs a status lookup.
    FileId(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RealtimeEvent {
    Subscribed,
    FileReady(FileRef),
    Progress { percent: u8 },
    Error { message: String },
    /// Provider task changed state; resolved by a deferred status check.
    TaskStatus { status: String },
}

impl RealtimeEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            RealtimeEvent::Subscribed => "subscribed",
            RealtimeEvent::FileReady(_) => "file",
            RealtimeEvent::Progress { .. } => "progress",
            RealtimeEvent::Error { .. } => "error",
            RealtimeEvent::TaskStatus { .. } => "task",
        }
    }
}

/// Event handed to handlers: the resolved job plus the original payload.
#[derive(Debug, Clone, PartialEq)]
pub struct JobEvent {
    pub job_id: JobId,
    pub event: RealtimeEvent,
    /// Raw payload with `jobId` injected.
    pub payload: Value,
}

impl JobEvent {
    pub(crate) fn new(job_id: JobId, event: RealtimeEvent, mut payload: Value) -> Self {
        if let Value::Object(map) = &mut payload {
            map.insert("jobId".to_string(), Value::String(job_id.clone()));
        }
        Self {
            job_id,
            event,
            payload,
        }
    }

    /// Builds an event that did not come off the wire (deferred status checks).
    pub(crate) fn synthetic(job_id: JobId, event: RealtimeEvent) -> Self {
        let payload = serde_json::json!({ "type": event.kind(), "synthetic": true });
        Self::new(job_id, event, payload)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    project_id: Option<String>,
    request_id: Option<String>,
    object: Option<Value>,
    progress: Option<f64>,
    url: Option<String>,
    error: Option<Value>,
}

/// A parsed message before its job is resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedMessage {
    pub event: RealtimeEvent,
    /// Id candidates in resolution order.
    pub candidates: Vec<JobId>,
    pub payload: Value,
}

pub fn parse_message(raw: &str) -> Result<ParsedMessage, EventParseError> {
    let payload: Value = serde_json::from_str(raw)?;
    let envelope: Envelope = serde_json::from_value(payload.clone())?;
    let object = envelope.object.as_ref();

    let event = match envelope.kind.as_str() {
        "subscribe" | "subscribed" => RealtimeEvent::Subscribed,
        "file" | "file_ready" => {
            let url = envelope
                .url
                .clone()
                .or_else(|| object_str(object, "url"))
                .filter(|url| !url.is_empty());
            match url {
                Some(url) => RealtimeEvent::FileReady(FileRef::Url(url)),
                None => {
                    let id = object_str(object, "id").ok_or(EventParseError::MissingField {
                        kind: "file",
                        field: "url",
                    })?;
                    RealtimeEvent::FileReady(FileRef::FileId(id))
                }
            }
        }
        "progress" | "render_progress" => {
            let raw = envelope
                .progress
                .or_else(|| object.and_then(|o| o.get("progress")).and_then(Value::as_f64))
                .ok_or(EventParseError::MissingField {
                    kind: "progress",
                    field: "progress",
                })?;
            RealtimeEvent::Progress {
                percent: clamp_percent(raw),
            }
        }
        "error" => RealtimeEvent::Error {
            message: error_message(envelope.error.as_ref())
                .or_else(|| error_message(object.and_then(|o| o.get("error"))))
                .unwrap_or_else(|| "unknown error".to_string()),
        },
        "task" | "task_status" => RealtimeEvent::TaskStatus {
            status: object_str(object, "status").unwrap_or_else(|| "unknown".to_string()),
        },
        other => return Err(EventParseError::UnknownKind(other.to_string())),
    };

    let mut candidates = Vec::new();
    for candidate in [
        object_str(object, "fileId"),
        object_str(object, "id"),
        envelope.project_id.clone(),
        envelope.request_id.clone(),
    ]
    .into_iter()
    .flatten()
    {
        if !candidate.is_empty() && !candidates.contains(&candidate) {
            candidates.push(candidate);
        }
    }

    Ok(ParsedMessage {
        event,
        candidates,
        payload,
    })
}

fn object_str(object: Option<&Value>, key: &str) -> Option<String> {
    object
        .and_then(|o| o.get(key))
        .and_then(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

fn error_message(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Object(map) => map
            .get("message")
            .and_then(Value::as_str)
            .map(ToString::to_string),
        _ => None,
    }
}

fn clamp_percent(raw: f64) -> u8 {
    if raw.is_nan() {
        return 0;
    }
    raw.round().clamp(0.0, 100.0) as u8
}
