use crate::{
    reconcile, AppState, Effect, Incoming, Job, JobError, JobId, MediaRecord, Msg,
    Notification, NotificationLevel, Observation, PersistedSnapshot, Source, Transition,
};

/// Pure update function: applies a message to state and returns any effects.
pub fn update(mut state: AppState, msg: Msg) -> (AppState, Vec<Effect>) {
    let effects = match msg {
        Msg::Submitted {
            job_id,
            project_id,
            request_id,
            kind,
            prompt,
            at_ms,
        } => {
            let mut job = Job::pending(job_id.clone(), kind, at_ms);
            job.project_id = project_id.clone();
            job.request_id = request_id;
            job.prompt = prompt;
            match state.job(&job_id) {
                // A remembered job that is still open resumes instead of restarting.
                Some(known) if !known.status.is_terminal() => vec![Effect::Recover {
                    project_id: known.project_id.clone(),
                    job_id,
                }],
                Some(_) => Vec::new(),
                None => {
                    state.insert_job(job);
                    vec![
                        Effect::StartTracking { job_id, project_id },
                        Effect::Persist,
                    ]
                }
            }
        }
        Msg::Observed { job_id, incoming } => apply_observation(&mut state, &job_id, &incoming),
        Msg::PollExhausted { job_id, attempts } => apply_observation(
            &mut state,
            &job_id,
            &Incoming::new(Source::Poll, Observation::TimedOut { attempts }),
        ),
        Msg::ForceCheckRequested { job_id } => match state.job(&job_id) {
            Some(job) if !job.status.is_terminal() => vec![Effect::PollNow { job_id }],
            _ => Vec::new(),
        },
        Msg::Restore(snapshot) => restore(&mut state, snapshot),
        Msg::StopGeneration { job_id } => {
            apply_observation(
                &mut state,
                &job_id,
                &Incoming::new(Source::Poll, Observation::Cancelled),
            )
        }
        Msg::ClearJob { job_id } => match state.remove_job(&job_id) {
            Some(job) if !job.status.is_terminal() => {
                vec![Effect::StopTracking { job_id }, Effect::Persist]
            }
            Some(_) => vec![Effect::Persist],
            None => Vec::new(),
        },
        Msg::ConnectionChanged(connected) => {
            state.set_connected(connected);
            Vec::new()
        }
        Msg::Tick | Msg::NoOp => Vec::new(),
    };

    (state, effects)
}

fn apply_observation(state: &mut AppState, job_id: &JobId, incoming: &Incoming) -> Vec<Effect> {
    // Events for jobs this state never saw are dropped untouched.
    let Some(current) = state.job(job_id) else {
        return Vec::new();
    };
    let was_terminal = current.status.is_terminal();
    let next = reconcile(current, incoming);

    match next.transition {
        Transition::None => Vec::new(),
        Transition::Progressed => {
            let status_changed = next.job.status != current.status;
            state.replace_job(next.job);
            if status_changed {
                vec![Effect::Persist]
            } else {
                Vec::new()
            }
        }
        Transition::Completed => {
            let job = next.job;
            let url = job.result_url.clone().unwrap_or_default();
            state.push_media(MediaRecord {
                job_id: job.id.clone(),
                kind: job.kind,
                url: url.clone(),
                prompt: job.prompt.clone(),
                created_at_ms: job.created_at_ms,
            });
            let kind = job.kind;
            state.replace_job(job);
            let mut effects = Vec::with_capacity(3);
            if !was_terminal {
                effects.push(Effect::StopTracking {
                    job_id: job_id.clone(),
                });
            }
            effects.push(Effect::Persist);
            effects.push(Effect::Notify(Notification {
                job_id: job_id.clone(),
                level: NotificationLevel::Success,
                message: format!(
                    "{} ready via {}: {url}",
                    kind.as_str(),
                    incoming.source.describe()
                ),
            }));
            effects
        }
        Transition::Failed => {
            let (level, message) = match next.job.error.as_ref() {
                Some(JobError::Cancelled) => {
                    (NotificationLevel::Info, JobError::Cancelled.to_string())
                }
                Some(err) => (NotificationLevel::Error, err.to_string()),
                None => (NotificationLevel::Error, String::new()),
            };
            state.replace_job(next.job);
            vec![
                Effect::StopTracking {
                    job_id: job_id.clone(),
                },
                Effect::Persist,
                Effect::Notify(Notification {
                    job_id: job_id.clone(),
                    level,
                    message,
                }),
            ]
        }
    }
}

fn restore(state: &mut AppState, snapshot: PersistedSnapshot) -> Vec<Effect> {
    for record in snapshot.media {
        state.push_media(record);
    }

    let mut effects = Vec::new();
    for saved in snapshot.jobs {
        let mut job = Job::pending(saved.job_id.clone(), saved.kind, saved.created_at_ms);
        job.project_id = saved.project_id.clone();
        job.request_id = saved.request_id;
        job.prompt = saved.prompt;
        job.status = saved.status;
        job.progress = saved.progress.min(100);
        let terminal = job.status.is_terminal();
        if state.insert_job(job) && !terminal {
            effects.push(Effect::Recover {
                job_id: saved.job_id,
                project_id: saved.project_id,
            });
        }
    }
    effects
}
