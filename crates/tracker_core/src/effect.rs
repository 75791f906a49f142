use crate::JobId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Subscribe to push events for the job and start the polling fallback.
    StartTracking {
        job_id: JobId,
        project_id: Option<String>,
    },
    /// Drop push handlers and cancel any polling for the job.
    StopTracking { job_id: JobId },
    /// Run one status check now.
    PollNow { job_id: JobId },
    /// Resume a job found in persisted state after a restart.
    Recover {
        job_id: JobId,
        project_id: Option<String>,
    },
    /// Write the persisted snapshot.
    Persist,
    Notify(Notification),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Success,
    Error,
}

/// User-facing toast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub job_id: JobId,
    pub level: NotificationLevel,
    pub message: String,
}
