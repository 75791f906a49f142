use std::collections::{BTreeMap, VecDeque};

use crate::view_model::{AppViewModel, JobRowView};
use crate::{Job, JobId, JobStatus, MediaKind};

/// Upper bound on remembered generated media; oldest records fall off first.
pub const MAX_MEDIA_RECORDS: usize = 50;

/// A finished generation kept for the gallery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRecord {
    pub job_id: JobId,
    pub kind: MediaKind,
    pub url: String,
    pub prompt: Option<String>,
    pub created_at_ms: u64,
}

/// In-flight job state that survives a restart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSnapshot {
    pub job_id: JobId,
    pub project_id: Option<String>,
    pub request_id: Option<String>,
    pub kind: MediaKind,
    pub prompt: Option<String>,
    pub status: JobStatus,
    pub progress: u8,
    pub created_at_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PersistedSnapshot {
    pub jobs: Vec<JobSnapshot>,
    pub media: Vec<MediaRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AppState {
    jobs: BTreeMap<JobId, Job>,
    media: VecDeque<MediaRecord>,
    connected: bool,
    dirty: bool,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn job(&self, job_id: &JobId) -> Option<&Job> {
        self.jobs.get(job_id)
    }

    pub fn active_jobs(&self) -> impl Iterator<Item = &Job> {
        self.jobs.values().filter(|job| !job.status.is_terminal())
    }

    pub fn has_active_jobs(&self) -> bool {
        self.active_jobs().next().is_some()
    }

    pub fn view(&self) -> AppViewModel {
        AppViewModel {
            connected: self.connected,
            active_count: self.active_jobs().count(),
            jobs: self
                .jobs
                .values()
                .map(|job| JobRowView {
                    job_id: job.id.clone(),
                    kind: job.kind,
                    status: job.status,
                    progress: job.progress,
                    result_url: job.result_url.clone(),
                    error: job.error.as_ref().map(ToString::to_string),
                })
                .collect(),
            media: self.media.iter().cloned().collect(),
            dirty: self.dirty,
        }
    }

    /// Returns whether anything changed since the last call and clears the flag.
    pub fn consume_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    /// Non-terminal jobs plus the media gallery; finished jobs are pruned.
    pub fn snapshot(&self) -> PersistedSnapshot {
        PersistedSnapshot {
            jobs: self
                .active_jobs()
                .map(|job| JobSnapshot {
                    job_id: job.id.clone(),
                    project_id: job.project_id.clone(),
                    request_id: job.request_id.clone(),
                    kind: job.kind,
                    prompt: job.prompt.clone(),
                    status: job.status,
                    progress: job.progress,
                    created_at_ms: job.created_at_ms,
                })
                .collect(),
            media: self.media.iter().cloned().collect(),
        }
    }

    pub(crate) fn insert_job(&mut self, job: Job) -> bool {
        if self.jobs.contains_key(&job.id) {
            return false;
        }
        self.jobs.insert(job.id.clone(), job);
        self.dirty = true;
        true
    }

    pub(crate) fn replace_job(&mut self, job: Job) {
        self.jobs.insert(job.id.clone(), job);
        self.dirty = true;
    }

    pub(crate) fn remove_job(&mut self, job_id: &JobId) -> Option<Job> {
        let removed = self.jobs.remove(job_id);
        if removed.is_some() {
            self.dirty = true;
        }
        removed
    }

    pub(crate) fn push_media(&mut self, record: MediaRecord) {
        if self
            .media
            .iter()
            .any(|existing| existing.job_id == record.job_id && existing.url == record.url)
        {
            return;
        }
        self.media.push_back(record);
        while self.media.len() > MAX_MEDIA_RECORDS {
            self.media.pop_front();
        }
        self.dirty = true;
    }

    pub(crate) fn set_connected(&mut self, connected: bool) {
        if self.connected != connected {
            self.connected = connected;
            self.dirty = true;
        }
    }
}
