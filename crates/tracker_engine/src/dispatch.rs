use serde::{Deserialize, Serialize};
use tracker_logging::{job_warn, tracker_debug};

use crate::{EventHandler, JobEvent, JobId, ParsedMessage};

/// What to do with a message that names no job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UntaggedPolicy {
    /// Attribute it to the job of the most recently opened channel.
    #[default]
    FallbackToCurrent,
    /// Drop it.
    Reject,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Delivered { job_id: JobId, handlers: usize },
    NoHandlers { job_id: JobId },
    /// Handed to a deferred status check instead of the handlers.
    PollScheduled { job_id: JobId },
    Untagged,
    Malformed,
    ShutDown,
}

/// Picks the job a message belongs to.
///
/// The first candidate with registered handlers wins; otherwise the first
/// candidate at all. Untagged messages follow `policy`.
pub fn resolve_job(
    message: &ParsedMessage,
    current: Option<&str>,
    policy: UntaggedPolicy,
    has_handlers: impl Fn(&str) -> bool,
) -> Option<JobId> {
    if let Some(hit) = message.candidates.iter().find(|id| has_handlers(id)) {
        return Some(hit.clone());
    }
    if let Some(first) = message.candidates.first() {
        return Some(first.clone());
    }
    match policy {
        UntaggedPolicy::FallbackToCurrent => current.map(ToString::to_string),
        UntaggedPolicy::Reject => None,
    }
}

/// Runs every handler in registration order. A panicking handler does not
/// stop the rest. Returns how many handlers ran to completion.
pub fn deliver(handlers: &[EventHandler], event: &JobEvent) -> usize {
    if handlers.is_empty() {
        job_warn!(
            event.job_id,
            "dropping {} event: no handlers registered",
            event.event.kind()
        );
        return 0;
    }
    let completed = handlers
        .iter()
        .filter(|handler| handler.call_guarded(event))
        .count();
    tracker_debug!(
        "delivered {} event for {} to {}/{} handlers",
        event.event.kind(),
        event.job_id,
        completed,
        handlers.len()
    );
    completed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{parse_message, RealtimeEvent};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn prefers_candidate_with_handlers() {
        let message =
            parse_message(r#"{"type":"progress","projectId":"p-1","object":{"id":"t-1","progress":5}}"#)
                .unwrap();
        let resolved = resolve_job(&message, None, UntaggedPolicy::Reject, |id| id == "p-1");
        assert_eq!(resolved.as_deref(), Some("p-1"));

        let resolved = resolve_job(&message, None, UntaggedPolicy::Reject, |_| false);
        assert_eq!(resolved.as_deref(), Some("t-1"));
    }

    #[test]
    fn untagged_follows_policy() {
        let message = parse_message(r#"{"type":"progress","progress":5}"#).unwrap();
        assert_eq!(
            resolve_job(&message, Some("cur"), UntaggedPolicy::FallbackToCurrent, |_| true)
                .as_deref(),
            Some("cur")
        );
        assert_eq!(
            resolve_job(&message, Some("cur"), UntaggedPolicy::Reject, |_| true),
            None
        );
    }

    #[test]
    fn panicking_handler_does_not_stop_the_rest() {
        let hits = Arc::new(AtomicUsize::new(0));
        let tail = hits.clone();
        let handlers = vec![
            EventHandler::new(|_| panic!("first handler broke")),
            EventHandler::new(move |_| {
                tail.fetch_add(1, Ordering::SeqCst);
            }),
        ];
        let event = JobEvent::synthetic("job".into(), RealtimeEvent::Progress { percent: 1 });
        assert_eq!(deliver(&handlers, &event), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn no_handlers_is_a_quiet_drop() {
        let event = JobEvent::synthetic("job".into(), RealtimeEvent::Subscribed);
        assert_eq!(deliver(&[], &event), 0);
    }
}
