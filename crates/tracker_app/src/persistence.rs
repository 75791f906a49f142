use serde::{Deserialize, Serialize};
use tracker_core::{JobId, JobSnapshot, JobStatus, MediaKind, MediaRecord, PersistedSnapshot};
use tracker_engine::StateFile;
use tracker_logging::{tracker_error, tracker_info, tracker_warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum PersistedKind {
    Image,
    Video,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum PersistedStatus {
    Pending,
    Processing,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistedJob {
    job_id: String,
    #[serde(default)]
    project_id: Option<String>,
    #[serde(default)]
    request_id: Option<String>,
    kind: PersistedKind,
    #[serde(default)]
    prompt: Option<String>,
    status: PersistedStatus,
    #[serde(default)]
    progress: u8,
    created_at_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistedMedia {
    job_id: String,
    kind: PersistedKind,
    url: String,
    #[serde(default)]
    prompt: Option<String>,
    created_at_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct PersistedState {
    #[serde(default)]
    jobs: Vec<PersistedJob>,
    #[serde(default)]
    media: Vec<PersistedMedia>,
}

/// Reads the saved snapshot. Missing or unreadable state starts empty.
pub(crate) fn load_snapshot(file: &StateFile) -> PersistedSnapshot {
    let content = match file.read() {
        Ok(Some(text)) => text,
        Ok(None) => return PersistedSnapshot::default(),
        Err(err) => {
            tracker_warn!("failed to read state from {:?}: {}", file.path(), err);
            return PersistedSnapshot::default();
        }
    };

    let state: PersistedState = match ron::from_str(&content) {
        Ok(state) => state,
        Err(err) => {
            tracker_warn!("failed to parse state from {:?}: {}", file.path(), err);
            return PersistedSnapshot::default();
        }
    };

    let snapshot = PersistedSnapshot {
        jobs: state
            .jobs
            .into_iter()
            .map(|job| JobSnapshot {
                job_id: JobId::new(job.job_id),
                project_id: job.project_id,
                request_id: job.request_id,
                kind: job.kind.into(),
                prompt: job.prompt,
                status: match job.status {
                    PersistedStatus::Pending => JobStatus::Pending,
                    PersistedStatus::Processing => JobStatus::Processing,
                },
                progress: job.progress.min(100),
                created_at_ms: job.created_at_ms,
            })
            .collect(),
        media: state
            .media
            .into_iter()
            .map(|media| MediaRecord {
                job_id: JobId::new(media.job_id),
                kind: media.kind.into(),
                url: media.url,
                prompt: media.prompt,
                created_at_ms: media.created_at_ms,
            })
            .collect(),
    };
    tracker_info!(
        "loaded {} in-flight jobs and {} media records from {:?}",
        snapshot.jobs.len(),
        snapshot.media.len(),
        file.path()
    );
    snapshot
}

pub(crate) fn save_snapshot(file: &StateFile, snapshot: &PersistedSnapshot) {
    let state = PersistedState {
        jobs: snapshot
            .jobs
            .iter()
            .filter_map(|job| {
                let status = match job.status {
                    JobStatus::Idle | JobStatus::Pending => PersistedStatus::Pending,
                    JobStatus::Processing => PersistedStatus::Processing,
                    JobStatus::Completed | JobStatus::Failed => return None,
                };
                Some(PersistedJob {
                    job_id: job.job_id.to_string(),
                    project_id: job.project_id.clone(),
                    request_id: job.request_id.clone(),
                    kind: job.kind.into(),
                    prompt: job.prompt.clone(),
                    status,
                    progress: job.progress,
                    created_at_ms: job.created_at_ms,
                })
            })
            .collect(),
        media: snapshot
            .media
            .iter()
            .map(|media| PersistedMedia {
                job_id: media.job_id.to_string(),
                kind: media.kind.into(),
                url: media.url.clone(),
                prompt: media.prompt.clone(),
                created_at_ms: media.created_at_ms,
            })
            .collect(),
    };

    let pretty = ron::ser::PrettyConfig::new();
    let content = match ron::ser::to_string_pretty(&state, pretty) {
        Ok(text) => text,
        Err(err) => {
            tracker_error!("failed to serialize state: {}", err);
            return;
        }
    };

    if let Err(err) = file.write(&content) {
        tracker_error!("failed to write state to {:?}: {}", file.path(), err);
    }
}

impl From<PersistedKind> for MediaKind {
    fn from(value: PersistedKind) -> Self {
        match value {
            PersistedKind::Image => MediaKind::Image,
            PersistedKind::Video => MediaKind::Video,
        }
    }
}

impl From<MediaKind> for PersistedKind {
    fn from(value: MediaKind) -> Self {
        match value {
            MediaKind::Image => PersistedKind::Image,
            MediaKind::Video => PersistedKind::Video,
        }
    }
}
