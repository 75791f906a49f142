use tracker_logging::{tracker_debug, tracker_warn};

use crate::ConnectionHandler;

/// Subscribers to the transport's connected/disconnected flag.
#[derive(Debug)]
pub struct ConnectionBroadcaster {
    handlers: Vec<ConnectionHandler>,
    cap: usize,
}

impl ConnectionBroadcaster {
    pub fn new(cap: usize) -> Self {
        Self {
            handlers: Vec::new(),
            cap: cap.max(1),
        }
    }

    /// Returns `false` if the handler was already subscribed.
    pub fn add(&mut self, handler: ConnectionHandler) -> bool {
        if self.handlers.iter().any(|h| h.same(&handler)) {
            return false;
        }
        if self.handlers.len() >= self.cap {
            tracker_warn!(
                "connection handler cap {} reached; dropping the oldest subscriber",
                self.cap
            );
            self.handlers.remove(0);
        }
        self.handlers.push(handler);
        true
    }

    pub fn remove(&mut self, handler: &ConnectionHandler) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|h| !h.same(handler));
        before != self.handlers.len()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn clear(&mut self) {
        self.handlers.clear();
    }

    /// Copy of the subscriber list, for notifying without holding a lock.
    pub fn snapshot(&self) -> Vec<ConnectionHandler> {
        self.handlers.clone()
    }
}

/// Notifies every handler; a panicking one is logged and skipped.
/// Returns how many handlers panicked.
pub fn notify_all(handlers: &[ConnectionHandler], connected: bool) -> usize {
    tracker_debug!(
        "broadcasting connected={} to {} handlers",
        connected,
        handlers.len()
    );
    handlers
        .iter()
        .filter(|handler| !handler.call_guarded(&connected))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counter() -> (ConnectionHandler, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let inner = hits.clone();
        let handler = ConnectionHandler::new(move |_| {
            inner.fetch_add(1, Ordering::SeqCst);
        });
        (handler, hits)
    }

    #[test]
    fn cap_bounds_subscribers() {
        let mut broadcaster = ConnectionBroadcaster::new(5);
        let (first, first_hits) = counter();
        broadcaster.add(first);
        for _ in 0..5 {
            broadcaster.add(counter().0);
        }
        assert_eq!(broadcaster.len(), 5);
        notify_all(&broadcaster.snapshot(), true);
        assert_eq!(first_hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn panicking_subscriber_does_not_block_others() {
        let mut broadcaster = ConnectionBroadcaster::new(5);
        broadcaster.add(ConnectionHandler::new(|_| panic!("bad subscriber")));
        let (good, hits) = counter();
        broadcaster.add(good.clone());

        assert_eq!(notify_all(&broadcaster.snapshot(), false), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        assert!(broadcaster.remove(&good));
        assert!(!broadcaster.remove(&good));
    }
}
