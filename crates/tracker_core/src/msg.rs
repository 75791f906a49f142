use crate::{Incoming, JobId, MediaKind, PersistedSnapshot};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Msg {
    /// A generation request was accepted by the backend.
    Submitted {
        job_id: JobId,
        project_id: Option<String>,
        request_id: Option<String>,
        kind: MediaKind,
        prompt: Option<String>,
        at_ms: u64,
    },
    /// A push event or status check reported something about a job.
    Observed { job_id: JobId, incoming: Incoming },
    /// The polling fallback ran out of attempts.
    PollExhausted { job_id: JobId, attempts: u32 },
    /// User asked for an immediate status check.
    ForceCheckRequested { job_id: JobId },
    /// Restore jobs and media saved before the last shutdown.
    Restore(PersistedSnapshot),
    /// User stopped tracking a job.
    StopGeneration { job_id: JobId },
    /// User removed a job from the list.
    ClearJob { job_id: JobId },
    /// Real-time transport opened or closed.
    ConnectionChanged(bool),
    /// Render tick.
    Tick,
    NoOp,
}
