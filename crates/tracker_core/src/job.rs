use std::fmt;

/// Correlation key of a generation job (the provider's file id).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for JobId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JobStatus {
    #[default]
    Idle,
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    /// The provider reported an explicit error.
    Provider(String),
    /// Status checks ran out before a result showed up.
    Timeout { attempts: u32 },
    /// The user stopped tracking the job.
    Cancelled,
}

impl JobError {
    /// Timeouts and cancellations may still be superseded by a late result.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, JobError::Timeout { .. } | JobError::Cancelled)
    }
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobError::Provider(message) => write!(f, "{message}"),
            JobError::Timeout { attempts } => {
                write!(f, "generation timed out after {attempts} status checks")
            }
            JobError::Cancelled => write!(f, "generation cancelled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub id: JobId,
    pub project_id: Option<String>,
    pub request_id: Option<String>,
    pub kind: MediaKind,
    pub prompt: Option<String>,
    pub status: JobStatus,
    pub progress: u8,
    pub result_url: Option<String>,
    pub error: Option<JobError>,
    pub created_at_ms: u64,
}

impl Job {
    pub fn pending(id: JobId, kind: MediaKind, created_at_ms: u64) -> Self {
        Self {
            id,
            project_id: None,
            request_id: None,
            kind,
            prompt: None,
            status: JobStatus::Pending,
            progress: 0,
            result_url: None,
            error: None,
            created_at_ms,
        }
    }
}
