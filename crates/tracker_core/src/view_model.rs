use crate::{JobId, JobStatus, MediaKind, MediaRecord};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AppViewModel {
    pub connected: bool,
    pub active_count: usize,
    pub jobs: Vec<JobRowView>,
    pub media: Vec<MediaRecord>,
    pub dirty: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRowView {
    pub job_id: JobId,
    pub kind: MediaKind,
    pub status: JobStatus,
    pub progress: u8,
    pub result_url: Option<String>,
    pub error: Option<String>,
}
