//! Merge rule for the two paths (push events and status polls) that update a job.
//!
//! Precedence:
//! - `Completed` is sticky. Once a job holds a result URL nothing replaces it.
//! - `Failed` with a provider error is terminal.
//! - `Failed` by timeout or cancellation yields only to a late `Completed`.
//! - Progress never goes backwards and is clamped to 100.

use crate::{Job, JobError, JobStatus};

/// Which path produced an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Realtime,
    Poll,
    ForceCheck,
    Recovery,
}

impl Source {
    pub fn describe(self) -> &'static str {
        match self {
            Source::Realtime => "push event",
            Source::Poll => "status check",
            Source::ForceCheck => "manual check",
            Source::Recovery => "recovery check",
        }
    }
}

/// What a path observed about a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    Processing,
    Progress(u8),
    Completed { url: String },
    Failed { message: String },
    TimedOut { attempts: u32 },
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Incoming {
    pub source: Source,
    pub observation: Observation,
}

impl Incoming {
    pub fn new(source: Source, observation: Observation) -> Self {
        Self {
            source,
            observation,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The observation did not change the job.
    None,
    /// Status or progress moved forward without reaching a terminal state.
    Progressed,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    pub job: Job,
    pub transition: Transition,
}

pub fn reconcile(current: &Job, incoming: &Incoming) -> Reconciled {
    let mut job = current.clone();

    let transition = match current.status {
        JobStatus::Completed => Transition::None,
        JobStatus::Failed => match (&current.error, &incoming.observation) {
            (Some(err), Observation::Completed { url }) if err.is_recoverable() => {
                complete(&mut job, url)
            }
            _ => Transition::None,
        },
        JobStatus::Idle | JobStatus::Pending | JobStatus::Processing => {
            match &incoming.observation {
                Observation::Processing => advance(&mut job, current.progress),
                Observation::Progress(percent) => advance(&mut job, (*percent).min(100)),
                Observation::Completed { url } => complete(&mut job, url),
                Observation::Failed { message } => {
                    fail(&mut job, JobError::Provider(message.clone()))
                }
                Observation::TimedOut { attempts } => fail(
                    &mut job,
                    JobError::Timeout {
                        attempts: *attempts,
                    },
                ),
                Observation::Cancelled => fail(&mut job, JobError::Cancelled),
            }
        }
    };

    Reconciled { job, transition }
}

fn advance(job: &mut Job, percent: u8) -> Transition {
    let status_changed = job.status != JobStatus::Processing;
    let progress_changed = percent > job.progress;
    job.status = JobStatus::Processing;
    job.progress = job.progress.max(percent);
    if status_changed || progress_changed {
        Transition::Progressed
    } else {
        Transition::None
    }
}

fn complete(job: &mut Job, url: &str) -> Transition {
    job.status = JobStatus::Completed;
    job.progress = 100;
    job.result_url = Some(url.to_string());
    job.error = None;
    Transition::Completed
}

fn fail(job: &mut Job, error: JobError) -> Transition {
    job.status = JobStatus::Failed;
    job.error = Some(error);
    Transition::Failed
}
