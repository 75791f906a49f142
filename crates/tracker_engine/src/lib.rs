//! Tracker engine: real-time transports, polling fallback and effect execution.
mod broadcast;
mod callback;
mod config;
mod dispatch;
mod engine;
mod event;
mod job_ref;
mod persist;
mod poll;
mod registry;
mod retry;
mod sse;
mod submit;
mod tracker;
mod transport;
mod types;
mod websocket;

pub use broadcast::{notify_all, ConnectionBroadcaster};
pub use callback::{Callback, ConnectionHandler, EventHandler};
pub use config::TrackerConfig;
pub use dispatch::{deliver, resolve_job, DispatchOutcome, UntaggedPolicy};
pub use engine::{EngineError, EngineHandle, EngineServices};
pub use event::{parse_message, EventParseError, FileRef, JobEvent, ParsedMessage, RealtimeEvent};
pub use job_ref::{JobId, JobKind, JobRef};
pub use persist::{ensure_state_dir, PersistError, StateFile};
pub use poll::{poll_until_done, HttpStatusProbe, PollError, PollOutcome, PollVerdict, StatusProbe};
pub use registry::HandlerRegistry;
pub use retry::RetryPolicy;
pub use sse::SseTransport;
pub use submit::{
    GenerationClient, GenerationKind, GenerationRequest, SourceImage, SubmitError, SubmittedJob,
};
pub use tracker::{InitOutcome, JobTracker, TrackerSettings};
pub use transport::{Connection, Transport, TransportError, TransportKind};
pub use types::{ChannelEventSink, EngineEvent, EventSink, ProbeSource};
pub use websocket::{subscribe_message, WebSocketTransport};
