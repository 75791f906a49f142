use std::fmt;

use serde::{Deserialize, Serialize};

pub type JobId = String;

/// Provider resource a job is tracked through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    File,
    Project,
}

/// A job as the backend addresses it: which resource, which id.
///
/// Doubles as the real-time channel key (`file.{id}` / `project.{id}`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobRef {
    pub kind: JobKind,
    pub id: JobId,
}

impl JobRef {
    pub fn file(id: impl Into<String>) -> Self {
        Self {
            kind: JobKind::File,
            id: id.into(),
        }
    }

    pub fn project(id: impl Into<String>) -> Self {
        Self {
            kind: JobKind::Project,
            id: id.into(),
        }
    }

    pub fn job_id(&self) -> &str {
        &self.id
    }

    pub fn channel(&self) -> String {
        self.to_string()
    }

    /// Backend route answering status checks for this job.
    pub fn status_path(&self) -> String {
        match self.kind {
            JobKind::File => format!("api/file/{}", self.id),
            JobKind::Project => format!("api/project/{}", self.id),
        }
    }
}

impl fmt::Display for JobRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            JobKind::File => write!(f, "file.{}", self.id),
            JobKind::Project => write!(f, "project.{}", self.id),
        }
    }
}
