//! Tracker core: pure job model, reconcile rule and state machine.
mod effect;
mod job;
mod msg;
mod reconcile;
mod state;
mod update;
mod view_model;

pub use effect::{Effect, Notification, NotificationLevel};
pub use job::{Job, JobError, JobId, JobStatus, MediaKind};
pub use msg::Msg;
pub use reconcile::{reconcile, Incoming, Observation, Reconciled, Source, Transition};
pub use state::{AppState, JobSnapshot, MediaRecord, PersistedSnapshot, MAX_MEDIA_RECORDS};
pub use update::update;
pub use view_model::{AppViewModel, JobRowView};
