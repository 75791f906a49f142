use std::sync::Once;

use pretty_assertions::assert_eq;
use tracker_core::{
    update, AppState, Effect, Incoming, JobError, JobId, JobStatus, MediaKind, Msg,
    NotificationLevel, Observation, Source,
};

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(tracker_logging::initialize_for_tests);
}

fn submit(state: AppState, id: &str) -> (AppState, Vec<Effect>) {
    update(
        state,
        Msg::Submitted {
            job_id: JobId::new(id),
            project_id: Some(format!("project-{id}")),
            request_id: None,
            kind: MediaKind::Image,
            prompt: Some("a lighthouse at dusk".to_string()),
            at_ms: 1_700_000_000_000,
        },
    )
}

fn observed(id: &str, source: Source, observation: Observation) -> Msg {
    Msg::Observed {
        job_id: JobId::new(id),
        incoming: Incoming::new(source, observation),
    }
}

#[test]
fn submission_starts_tracking_and_persists() {
    init_logging();
    let (mut state, effects) = submit(AppState::new(), "file-1");

    assert_eq!(
        effects,
        vec![
            Effect::StartTracking {
                job_id: JobId::new("file-1"),
                project_id: Some("project-file-1".to_string()),
            },
            Effect::Persist,
        ]
    );
    assert_eq!(
        state.job(&JobId::new("file-1")).unwrap().status,
        JobStatus::Pending
    );
    assert!(state.consume_dirty());

    let (_state, effects) = submit(state, "file-1");
    assert_eq!(
        effects,
        vec![Effect::Recover {
            job_id: JobId::new("file-1"),
            project_id: Some("project-file-1".to_string()),
        }]
    );
}

#[test]
fn update_is_noop() {
    let state = AppState::new();
    let (next, effects) = update(state.clone(), Msg::NoOp);

    assert_eq!(state, next);
    assert!(effects.is_empty());
}

#[test]
fn tracking_a_restored_job_resumes_it() {
    init_logging();
    let (state, _) = submit(AppState::new(), "file-5");
    let snapshot = state.snapshot();

    let (restored, _) = update(AppState::new(), Msg::Restore(snapshot));
    let (restored, effects) = update(
        restored,
        Msg::Submitted {
            job_id: JobId::new("file-5"),
            project_id: None,
            request_id: None,
            kind: MediaKind::Image,
            prompt: None,
            at_ms: 1_800_000_000_000,
        },
    );

    assert_eq!(
        effects,
        vec![Effect::Recover {
            job_id: JobId::new("file-5"),
            project_id: Some("project-file-5".to_string()),
        }]
    );
    let job = restored.job(&JobId::new("file-5")).unwrap();
    assert_eq!(job.created_at_ms, 1_700_000_000_000);
    assert_eq!(job.prompt.as_deref(), Some("a lighthouse at dusk"));
}

#[test]
fn tracking_a_finished_job_again_does_nothing() {
    init_logging();
    let (state, _) = submit(AppState::new(), "file-6");
    let (state, _) = update(
        state,
        observed(
            "file-6",
            Source::Realtime,
            Observation::Completed {
                url: "https://cdn.example.com/six.png".to_string(),
            },
        ),
    );

    let (state, effects) = submit(state, "file-6");
    assert!(effects.is_empty());
    assert_eq!(
        state.job(&JobId::new("file-6")).unwrap().status,
        JobStatus::Completed
    );
}

#[test]
fn realtime_completion_then_force_check_is_noop() {
    init_logging();
    let (state, _) = submit(AppState::new(), "file-1");
    let (state, effects) = update(
        state,
        observed("file-1", Source::Realtime, Observation::Progress(35)),
    );
    assert_eq!(effects, vec![Effect::Persist]);
    let job = state.job(&JobId::new("file-1")).unwrap();
    assert_eq!(job.status, JobStatus::Processing);
    assert_eq!(job.progress, 35);

    let (state, effects) = update(
        state,
        observed(
            "file-1",
            Source::Realtime,
            Observation::Completed {
                url: "https://cdn.example.com/a.png".to_string(),
            },
        ),
    );
    assert_eq!(effects.len(), 3);
    assert_eq!(
        effects[0],
        Effect::StopTracking {
            job_id: JobId::new("file-1")
        }
    );
    assert!(matches!(
        &effects[2],
        Effect::Notify(n) if n.level == NotificationLevel::Success
            && n.message == "image ready via push event: https://cdn.example.com/a.png"
    ));
    let job = state.job(&JobId::new("file-1")).unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.result_url.as_deref(), Some("https://cdn.example.com/a.png"));
    assert_eq!(state.view().media.len(), 1);

    let (state, effects) = update(
        state,
        Msg::ForceCheckRequested {
            job_id: JobId::new("file-1"),
        },
    );
    assert!(effects.is_empty());

    // A slower poll reporting a different URL changes nothing.
    let (state, effects) = update(
        state,
        observed(
            "file-1",
            Source::Poll,
            Observation::Completed {
                url: "https://cdn.example.com/other.png".to_string(),
            },
        ),
    );
    assert!(effects.is_empty());
    assert_eq!(
        state.job(&JobId::new("file-1")).unwrap().result_url.as_deref(),
        Some("https://cdn.example.com/a.png")
    );
    assert_eq!(state.view().media.len(), 1);
}

#[test]
fn force_check_on_active_job_polls_now() {
    init_logging();
    let (state, _) = submit(AppState::new(), "file-2");
    let (_state, effects) = update(
        state,
        Msg::ForceCheckRequested {
            job_id: JobId::new("file-2"),
        },
    );
    assert_eq!(
        effects,
        vec![Effect::PollNow {
            job_id: JobId::new("file-2")
        }]
    );
}

#[test]
fn poll_exhaustion_fails_with_timeout() {
    init_logging();
    let (state, _) = submit(AppState::new(), "file-3");
    let (state, effects) = update(
        state,
        Msg::PollExhausted {
            job_id: JobId::new("file-3"),
            attempts: 18,
        },
    );
    let job = state.job(&JobId::new("file-3")).unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error, Some(JobError::Timeout { attempts: 18 }));
    assert!(effects.iter().any(|effect| matches!(
        effect,
        Effect::Notify(n) if n.message == "generation timed out after 18 status checks"
    )));
}

#[test]
fn events_for_unknown_jobs_do_not_touch_state() {
    init_logging();
    let (mut state, _) = submit(AppState::new(), "file-1");
    state.consume_dirty();
    let before = state.clone();

    let (mut after, effects) = update(
        state,
        observed("ghost", Source::Realtime, Observation::Progress(50)),
    );
    assert!(effects.is_empty());
    assert!(!after.consume_dirty());
    assert_eq!(after, before);
}

#[test]
fn concurrent_jobs_update_independently() {
    init_logging();
    let (state, _) = submit(AppState::new(), "file-a");
    let (state, _) = submit(state, "file-b");
    let (state, _) = update(
        state,
        observed(
            "file-a",
            Source::Realtime,
            Observation::Completed {
                url: "https://cdn.example.com/a.png".to_string(),
            },
        ),
    );

    assert_eq!(
        state.job(&JobId::new("file-a")).unwrap().status,
        JobStatus::Completed
    );
    assert_eq!(
        state.job(&JobId::new("file-b")).unwrap().status,
        JobStatus::Pending
    );
    assert_eq!(state.view().active_count, 1);
}

#[test]
fn stop_generation_cancels_with_info_notice() {
    init_logging();
    let (state, _) = submit(AppState::new(), "file-4");
    let (state, effects) = update(
        state,
        Msg::StopGeneration {
            job_id: JobId::new("file-4"),
        },
    );
    assert_eq!(
        state.job(&JobId::new("file-4")).unwrap().error,
        Some(JobError::Cancelled)
    );
    assert!(effects.iter().any(|effect| matches!(
        effect,
        Effect::Notify(n) if n.level == NotificationLevel::Info
    )));
}

#[test]
fn connection_changes_mark_dirty_only_on_flip() {
    init_logging();
    let (mut state, _) = update(AppState::new(), Msg::ConnectionChanged(true));
    assert!(state.view().connected);
    assert!(state.consume_dirty());

    let (mut state, _) = update(state, Msg::ConnectionChanged(true));
    assert!(!state.consume_dirty());
}
