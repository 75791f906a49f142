use std::time::Duration;

use tracker_core::{
    AppState, Effect, Incoming, JobId, MediaKind, Msg, Observation, Source,
};
use tracker_engine::{
    EngineEvent, EngineHandle, FileRef, GenerationKind, JobRef, PollVerdict, ProbeSource,
    RealtimeEvent,
};
use tracker_logging::{job_debug, tracker_error, tracker_info};

/// What the session should do with an engine event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Msg(Msg),
    SubmitFailed(String),
    Ignored,
}

/// Turns core effects into engine commands.
pub struct EffectRunner {
    engine: EngineHandle,
}

impl EffectRunner {
    pub fn new(engine: EngineHandle) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &EngineHandle {
        &self.engine
    }

    /// Runs every effect except `Persist` and `Notify`, which belong to the caller.
    pub fn run(&self, effect: &Effect, state: &AppState) {
        match effect {
            Effect::StartTracking { job_id, project_id } => {
                let target = job_ref(job_id, project_id.as_deref());
                let request_id = state.job(job_id).and_then(|job| job.request_id.clone());
                tracker_info!("start tracking {}", target);
                self.engine.track(target, request_id);
            }
            Effect::Recover { job_id, project_id } => {
                let target = job_ref(job_id, project_id.as_deref());
                tracker_info!("recovering {}", target);
                self.engine.recover(target);
            }
            Effect::StopTracking { job_id } => self.engine.stop(job_id.as_str()),
            Effect::PollNow { job_id } => {
                let project_id = state.job(job_id).and_then(|job| job.project_id.clone());
                self.engine
                    .force_check(job_ref(job_id, project_id.as_deref()));
            }
            Effect::Persist | Effect::Notify(_) => {}
        }
    }

    pub fn next_event(&self, timeout: Duration) -> Option<EngineEvent> {
        self.engine.recv_timeout(timeout)
    }

    pub fn shutdown(self) {
        self.engine.shutdown();
    }
}

/// Jobs are keyed by file id; the id equals the project id only when the
/// backend never named a file.
fn job_ref(job_id: &JobId, project_id: Option<&str>) -> JobRef {
    if project_id == Some(job_id.as_str()) {
        JobRef::project(job_id.as_str())
    } else {
        JobRef::file(job_id.as_str())
    }
}

pub fn map_event(event: EngineEvent, now_ms: u64) -> Inbound {
    match event {
        EngineEvent::Submitted(job) => Inbound::Msg(Msg::Submitted {
            job_id: JobId::new(job.file_id),
            project_id: job.project_id,
            request_id: job.request_id,
            kind: map_kind(job.kind),
            prompt: Some(job.prompt),
            at_ms: now_ms,
        }),
        EngineEvent::SubmitFailed { message } => {
            tracker_error!("generation request failed: {}", message);
            Inbound::SubmitFailed(message)
        }
        EngineEvent::Realtime { job_id, event } => {
            let observation = match event {
                RealtimeEvent::FileReady(FileRef::Url(url)) => Observation::Completed { url },
                RealtimeEvent::Progress { percent } => Observation::Progress(percent),
                RealtimeEvent::Error { message } => Observation::Failed { message },
                RealtimeEvent::FileReady(FileRef::FileId(_))
                | RealtimeEvent::Subscribed
                | RealtimeEvent::TaskStatus { .. } => {
                    job_debug!(job_id, "{} event needs no state change", event.kind());
                    return Inbound::Ignored;
                }
            };
            observed(job_id, Source::Realtime, observation)
        }
        EngineEvent::Progress {
            job_id,
            percent,
            source,
        } => observed(job_id, map_source(source), Observation::Progress(percent)),
        EngineEvent::PollFinished {
            job_id,
            source,
            verdict,
        } => match verdict {
            PollVerdict::Ready { url } => {
                observed(job_id, map_source(source), Observation::Completed { url })
            }
            PollVerdict::Failed { message } => {
                observed(job_id, map_source(source), Observation::Failed { message })
            }
            PollVerdict::Exhausted { attempts } => Inbound::Msg(Msg::PollExhausted {
                job_id: JobId::new(job_id),
                attempts,
            }),
            PollVerdict::Cancelled => Inbound::Ignored,
        },
        EngineEvent::Connection(connected) => Inbound::Msg(Msg::ConnectionChanged(connected)),
    }
}

fn observed(job_id: String, source: Source, observation: Observation) -> Inbound {
    Inbound::Msg(Msg::Observed {
        job_id: JobId::new(job_id),
        incoming: Incoming::new(source, observation),
    })
}

fn map_source(source: ProbeSource) -> Source {
    match source {
        ProbeSource::Scheduled => Source::Poll,
        ProbeSource::Recovery => Source::Recovery,
        ProbeSource::ForceCheck => Source::ForceCheck,
    }
}

fn map_kind(kind: GenerationKind) -> MediaKind {
    match kind {
        GenerationKind::Image => MediaKind::Image,
        GenerationKind::Video => MediaKind::Video,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tracker_engine::SubmittedJob;

    #[test]
    fn submission_becomes_a_pending_job() {
        let event = EngineEvent::Submitted(SubmittedJob {
            kind: GenerationKind::Video,
            prompt: "waves".into(),
            file_id: "f-1".into(),
            project_id: Some("p-1".into()),
            request_id: None,
        });
        assert_eq!(
            map_event(event, 7),
            Inbound::Msg(Msg::Submitted {
                job_id: JobId::new("f-1"),
                project_id: Some("p-1".into()),
                request_id: None,
                kind: MediaKind::Video,
                prompt: Some("waves".into()),
                at_ms: 7,
            })
        );
    }

    #[test]
    fn poll_verdicts_map_to_observations() {
        let ready = EngineEvent::PollFinished {
            job_id: "f-1".into(),
            source: ProbeSource::ForceCheck,
            verdict: PollVerdict::Ready {
                url: "https://cdn/x.png".into(),
            },
        };
        assert_eq!(
            map_event(ready, 0),
            Inbound::Msg(Msg::Observed {
                job_id: JobId::new("f-1"),
                incoming: Incoming::new(
                    Source::ForceCheck,
                    Observation::Completed {
                        url: "https://cdn/x.png".into()
                    }
                ),
            })
        );

        let exhausted = EngineEvent::PollFinished {
            job_id: "f-1".into(),
            source: ProbeSource::Scheduled,
            verdict: PollVerdict::Exhausted { attempts: 18 },
        };
        assert_eq!(
            map_event(exhausted, 0),
            Inbound::Msg(Msg::PollExhausted {
                job_id: JobId::new("f-1"),
                attempts: 18
            })
        );
    }

    #[test]
    fn unresolved_file_events_are_ignored() {
        let event = EngineEvent::Realtime {
            job_id: "f-1".into(),
            event: RealtimeEvent::FileReady(FileRef::FileId("f-1".into())),
        };
        assert_eq!(map_event(event, 0), Inbound::Ignored);
    }

    #[test]
    fn project_only_jobs_track_the_project_channel() {
        let id = JobId::new("p-1");
        assert_eq!(job_ref(&id, Some("p-1")), JobRef::project("p-1"));
        assert_eq!(job_ref(&id, None), JobRef::file("p-1"));
    }
}
