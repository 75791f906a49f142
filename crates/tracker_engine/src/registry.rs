use std::collections::HashMap;
use std::time::Instant;

use tracker_logging::job_debug;

use crate::{EventHandler, JobId};

#[derive(Debug, Clone)]
struct Registration {
    handler: EventHandler,
    request_id: Option<String>,
    registered_at: Instant,
}

/// Per-job handler lists, bounded and deduplicated by handler identity.
#[derive(Debug)]
pub struct HandlerRegistry {
    jobs: HashMap<JobId, Vec<Registration>>,
    per_job_cap: usize,
}

impl HandlerRegistry {
    pub fn new(per_job_cap: usize) -> Self {
        Self {
            jobs: HashMap::new(),
            per_job_cap: per_job_cap.max(1),
        }
    }

    /// Registers handlers in order. Returns how many older handlers were evicted.
    pub fn add_handlers(
        &mut self,
        job_id: &str,
        handlers: &[EventHandler],
        request_id: Option<&str>,
    ) -> usize {
        let cap = self.per_job_cap;
        let list = self.jobs.entry(job_id.to_string()).or_default();
        let mut evicted = 0;
        for handler in handlers {
            if list.iter().any(|reg| reg.handler.same(handler)) {
                continue;
            }
            if list.len() >= cap {
                let oldest = list.remove(0);
                evicted += 1;
                job_debug!(
                    job_id,
                    "handler cap {} reached; evicting handler registered {:?} ago",
                    cap,
                    oldest.registered_at.elapsed()
                );
            }
            list.push(Registration {
                handler: handler.clone(),
                request_id: request_id.map(ToString::to_string),
                registered_at: Instant::now(),
            });
        }
        if list.is_empty() {
            self.jobs.remove(job_id);
        }
        evicted
    }

    /// Unregisters handlers by identity. Returns how many were removed.
    pub fn remove_handlers(&mut self, job_id: &str, handlers: &[EventHandler]) -> usize {
        let Some(list) = self.jobs.get_mut(job_id) else {
            return 0;
        };
        let before = list.len();
        list.retain(|reg| !handlers.iter().any(|h| h.same(&reg.handler)));
        let removed = before - list.len();
        if list.is_empty() {
            self.jobs.remove(job_id);
        }
        removed
    }

    /// Handlers for a job in registration order.
    pub fn handlers_for(&self, job_id: &str) -> Vec<EventHandler> {
        self.jobs
            .get(job_id)
            .map(|list| list.iter().map(|reg| reg.handler.clone()).collect())
            .unwrap_or_default()
    }

    /// The job whose handlers were registered under `request_id`.
    pub fn job_for_request(&self, request_id: &str) -> Option<JobId> {
        self.jobs.iter().find_map(|(job_id, list)| {
            list.iter()
                .any(|reg| reg.request_id.as_deref() == Some(request_id))
                .then(|| job_id.clone())
        })
    }

    pub fn has_handlers(&self, job_id: &str) -> bool {
        self.jobs.contains_key(job_id)
    }

    pub fn handler_count(&self, job_id: &str) -> usize {
        self.jobs.get(job_id).map_or(0, Vec::len)
    }

    pub fn total(&self) -> usize {
        self.jobs.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn clear(&mut self) {
        self.jobs.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{JobEvent, RealtimeEvent};
    use std::sync::{Arc, Mutex};

    fn recording(tag: &'static str, log: &Arc<Mutex<Vec<&'static str>>>) -> EventHandler {
        let log = log.clone();
        EventHandler::new(move |_| log.lock().unwrap().push(tag))
    }

    #[test]
    fn duplicates_are_ignored() {
        let mut registry = HandlerRegistry::new(3);
        let handler = EventHandler::new(|_| {});
        registry.add_handlers("job", &[handler.clone(), handler.clone()], None);
        registry.add_handlers("job", &[handler], None);
        assert_eq!(registry.handler_count("job"), 1);
    }

    #[test]
    fn cap_evicts_oldest_first() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = HandlerRegistry::new(3);
        let handlers: Vec<_> = ["a", "b", "c", "d", "e"]
            .into_iter()
            .map(|tag| recording(tag, &log))
            .collect();

        for handler in &handlers {
            registry.add_handlers("job", std::slice::from_ref(handler), None);
            assert!(registry.handler_count("job") <= 3);
        }

        let event = JobEvent::synthetic("job".into(), RealtimeEvent::Subscribed);
        for handler in registry.handlers_for("job") {
            handler.call(&event);
        }
        assert_eq!(*log.lock().unwrap(), vec!["c", "d", "e"]);
    }

    #[test]
    fn removing_last_handler_drops_job_entry() {
        let mut registry = HandlerRegistry::new(3);
        let a = EventHandler::new(|_| {});
        let b = EventHandler::new(|_| {});
        registry.add_handlers("job", &[a.clone(), b.clone()], Some("req-1"));
        assert_eq!(registry.job_for_request("req-1").as_deref(), Some("job"));
        assert_eq!(registry.job_for_request("req-2"), None);

        assert_eq!(registry.remove_handlers("job", &[a]), 1);
        assert!(registry.has_handlers("job"));
        assert_eq!(registry.remove_handlers("job", &[b]), 1);
        assert!(!registry.has_handlers("job"));
        assert!(registry.is_empty());
        assert_eq!(registry.total(), 0);
    }

    #[test]
    fn jobs_are_isolated() {
        let mut registry = HandlerRegistry::new(3);
        registry.add_handlers("a", &[EventHandler::new(|_| {})], None);
        registry.add_handlers("b", &[EventHandler::new(|_| {}), EventHandler::new(|_| {})], None);
        assert_eq!(registry.handler_count("a"), 1);
        assert_eq!(registry.handler_count("b"), 2);
        assert_eq!(registry.total(), 3);
    }
}
