//! The real-time side of job tracking.
//!
//! A [`JobTracker`] owns at most one live transport connection, bound to the
//! channel of the most recently initiated job. Incoming messages are routed to
//! the handlers registered for the job they name. The connection is retried
//! with backoff while anyone is listening and closed after a grace period once
//! nobody is.
//!
//! Handlers are always invoked without the internal lock held, so they may call
//! back into the tracker.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracker_logging::{job_debug, job_info, job_warn, tracker_debug, tracker_info, tracker_warn};

use crate::broadcast::notify_all;
use crate::dispatch::{deliver, resolve_job};
use crate::{
    parse_message, ConnectionBroadcaster, ConnectionHandler, DispatchOutcome, EventHandler,
    FileRef, HandlerRegistry, JobEvent, JobId, JobRef, PollOutcome, RealtimeEvent, RetryPolicy,
    StatusProbe, Transport, UntaggedPolicy,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerSettings {
    pub max_handlers_per_job: usize,
    pub max_connection_handlers: usize,
    /// Repeated connects to the same channel inside this window are coalesced.
    pub connect_debounce: Duration,
    /// How long the connection outlives its last handler.
    pub idle_disconnect_grace: Duration,
    pub reconnect: RetryPolicy,
    pub untagged: UntaggedPolicy,
    /// Delay before the status check triggered by a task-status event.
    pub task_status_poll_delay: Duration,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            max_handlers_per_job: 3,
            max_connection_handlers: 5,
            connect_debounce: Duration::from_millis(300),
            idle_disconnect_grace: Duration::from_secs(1),
            reconnect: RetryPolicy::reconnect(),
            untagged: UntaggedPolicy::FallbackToCurrent,
            task_status_poll_delay: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    /// A new connection is being opened.
    Connecting,
    /// Already bound to this channel; only the handlers were added.
    AlreadyConnected,
    /// A connect to this channel started moments ago and has not opened yet;
    /// only the handlers were added.
    Debounced,
    ShutDown,
}

struct Session {
    id: u64,
    cancel: CancellationToken,
}

struct TrackerState {
    registry: HandlerRegistry,
    connection_handlers: ConnectionBroadcaster,
    channel: Option<JobRef>,
    current_job: Option<JobId>,
    connected: bool,
    session: Option<Session>,
    last_attempt: Option<(JobRef, Instant)>,
    idle_timer: Option<CancellationToken>,
    next_session_id: u64,
    shut_down: bool,
}

struct Inner {
    transport: Arc<dyn Transport>,
    probe: Option<Arc<dyn StatusProbe>>,
    settings: TrackerSettings,
    root: CancellationToken,
    state: Mutex<TrackerState>,
}

/// Routes real-time job events to registered handlers.
///
/// Cheap to clone; clones share one connection and one registry. All methods
/// that may start background work must be called from within a Tokio runtime.
#[derive(Clone)]
pub struct JobTracker {
    inner: Arc<Inner>,
}

impl JobTracker {
    pub fn new(transport: Arc<dyn Transport>, settings: TrackerSettings) -> Self {
        Self::build(transport, None, settings)
    }

    /// A tracker that resolves task-status events with `probe`.
    pub fn with_probe(
        transport: Arc<dyn Transport>,
        probe: Arc<dyn StatusProbe>,
        settings: TrackerSettings,
    ) -> Self {
        Self::build(transport, Some(probe), settings)
    }

    fn build(
        transport: Arc<dyn Transport>,
        probe: Option<Arc<dyn StatusProbe>>,
        settings: TrackerSettings,
    ) -> Self {
        let state = TrackerState {
            registry: HandlerRegistry::new(settings.max_handlers_per_job),
            connection_handlers: ConnectionBroadcaster::new(settings.max_connection_handlers),
            channel: None,
            current_job: None,
            connected: false,
            session: None,
            last_attempt: None,
            idle_timer: None,
            next_session_id: 0,
            shut_down: false,
        };
        Self {
            inner: Arc::new(Inner {
                transport,
                probe,
                settings,
                root: CancellationToken::new(),
                state: Mutex::new(state),
            }),
        }
    }

    pub fn settings(&self) -> &TrackerSettings {
        &self.inner.settings
    }

    /// Registers `handlers` for the target job and makes sure the transport is
    /// bound to its channel. Never fails; connection trouble only shows up in
    /// the connected flag.
    pub fn init_connection(&self, target: JobRef, handlers: &[EventHandler]) -> InitOutcome {
        let mut state = self.inner.state.lock();
        if state.shut_down {
            tracker_warn!("init_connection for {} after shutdown", target);
            return InitOutcome::ShutDown;
        }

        state.registry.add_handlers(target.job_id(), handlers, None);
        cancel_idle_timer(&mut state);
        state.current_job = Some(target.id.clone());

        let now = Instant::now();
        if state.channel.as_ref() == Some(&target) && state.session.is_some() {
            let in_flight = !state.connected
                && state.last_attempt.as_ref().is_some_and(|(last, at)| {
                    *last == target
                        && now.duration_since(*at) < self.inner.settings.connect_debounce
                });
            if in_flight {
                job_debug!(target.id, "debounced connect to {}", target);
                return InitOutcome::Debounced;
            }
            job_debug!(target.id, "already bound to {}", target);
            return InitOutcome::AlreadyConnected;
        }

        let to_notify = teardown(&mut state);
        state.channel = Some(target.clone());
        state.last_attempt = Some((target.clone(), now));
        state.next_session_id += 1;
        let session_id = state.next_session_id;
        let cancel = self.inner.root.child_token();
        state.session = Some(Session {
            id: session_id,
            cancel: cancel.clone(),
        });
        drop(state);

        if let Some(handlers) = to_notify {
            notify_all(&handlers, false);
        }

        job_info!(target.id, "connecting to {}", target);
        tokio::spawn(run_session(self.inner.clone(), session_id, target, cancel));
        InitOutcome::Connecting
    }

    /// Returns how many older handlers were evicted to respect the cap.
    pub fn add_handlers(
        &self,
        job_id: &str,
        handlers: &[EventHandler],
        request_id: Option<&str>,
    ) -> usize {
        let mut state = self.inner.state.lock();
        if state.shut_down {
            return 0;
        }
        let evicted = state.registry.add_handlers(job_id, handlers, request_id);
        if !state.registry.is_empty() {
            cancel_idle_timer(&mut state);
        }
        evicted
    }

    /// Returns how many handlers were removed. Removing the last handler of
    /// the last job schedules the idle disconnect.
    pub fn remove_handlers(&self, job_id: &str, handlers: &[EventHandler]) -> usize {
        let mut state = self.inner.state.lock();
        let removed = state.registry.remove_handlers(job_id, handlers);
        if removed > 0 && state.registry.is_empty() {
            self.schedule_idle_disconnect(&mut state);
        }
        removed
    }

    pub fn add_connection_handler(&self, handler: ConnectionHandler) -> bool {
        self.inner.state.lock().connection_handlers.add(handler)
    }

    pub fn remove_connection_handler(&self, handler: &ConnectionHandler) -> bool {
        self.inner.state.lock().connection_handlers.remove(handler)
    }

    pub fn is_connected(&self) -> bool {
        self.inner.state.lock().connected
    }

    pub fn channel(&self) -> Option<JobRef> {
        self.inner.state.lock().channel.clone()
    }

    pub fn current_job(&self) -> Option<JobId> {
        self.inner.state.lock().current_job.clone()
    }

    pub fn handler_count(&self, job_id: &str) -> usize {
        self.inner.state.lock().registry.handler_count(job_id)
    }

    pub fn total_handlers(&self) -> usize {
        self.inner.state.lock().registry.total()
    }

    /// Routes one raw message as if it arrived on the transport.
    pub fn dispatch_raw(&self, raw: &str) -> DispatchOutcome {
        self.inner.dispatch_raw(raw)
    }

    /// Closes the connection now, keeping registered handlers.
    pub fn disconnect(&self) {
        let to_notify = {
            let mut state = self.inner.state.lock();
            cancel_idle_timer(&mut state);
            let to_notify = teardown(&mut state);
            state.channel = None;
            to_notify
        };
        if let Some(handlers) = to_notify {
            notify_all(&handlers, false);
        }
    }

    /// Stops all background work and forgets every handler. Later calls are no-ops.
    pub fn shutdown(&self) {
        let to_notify = {
            let mut state = self.inner.state.lock();
            if state.shut_down {
                return;
            }
            state.shut_down = true;
            cancel_idle_timer(&mut state);
            let to_notify = teardown(&mut state);
            state.channel = None;
            state.current_job = None;
            state.registry.clear();
            state.connection_handlers.clear();
            to_notify
        };
        self.inner.root.cancel();
        if let Some(handlers) = to_notify {
            notify_all(&handlers, false);
        }
        tracker_info!("job tracker shut down");
    }

    fn schedule_idle_disconnect(&self, state: &mut TrackerState) {
        if state.idle_timer.is_some() || state.session.is_none() {
            return;
        }
        let timer = self.inner.root.child_token();
        state.idle_timer = Some(timer.clone());
        let grace = self.inner.settings.idle_disconnect_grace;
        let inner = self.inner.clone();
        tracker_debug!("no handlers left; disconnecting in {:?}", grace);

        tokio::spawn(async move {
            tokio::select! {
                _ = timer.cancelled() => return,
                _ = tokio::time::sleep(grace) => {}
            }
            let to_notify = {
                let mut state = inner.state.lock();
                // Re-registration cancels the token while we waited for the lock.
                if timer.is_cancelled() {
                    return;
                }
                state.idle_timer = None;
                if !state.registry.is_empty() {
                    return;
                }
                tracker_info!("idle grace elapsed; closing transport");
                let to_notify = teardown(&mut state);
                state.channel = None;
                to_notify
            };
            if let Some(handlers) = to_notify {
                notify_all(&handlers, false);
            }
        });
    }
}

impl Inner {
    fn dispatch_raw(self: &Arc<Self>, raw: &str) -> DispatchOutcome {
        let mut message = match parse_message(raw) {
            Ok(message) => message,
            Err(err) => {
                tracker_warn!("dropping real-time message: {}", err);
                return DispatchOutcome::Malformed;
            }
        };

        let (job_id, handlers) = {
            let state = self.state.lock();
            if state.shut_down {
                return DispatchOutcome::ShutDown;
            }
            // A request id stands for the job registered under it.
            for candidate in &mut message.candidates {
                if state.registry.has_handlers(candidate) {
                    continue;
                }
                if let Some(job_id) = state.registry.job_for_request(candidate) {
                    *candidate = job_id;
                }
            }
            let resolved = resolve_job(
                &message,
                state.current_job.as_deref(),
                self.settings.untagged,
                |id| state.registry.has_handlers(id),
            );
            let Some(job_id) = resolved else {
                tracker_warn!("dropping untagged {} event", message.event.kind());
                return DispatchOutcome::Untagged;
            };
            let handlers = state.registry.handlers_for(&job_id);
            (job_id, handlers)
        };

        if handlers.is_empty() {
            job_warn!(job_id, "no handlers for {} event", message.event.kind());
            return DispatchOutcome::NoHandlers { job_id };
        }

        if let RealtimeEvent::TaskStatus { status } = &message.event {
            job_debug!(job_id, "task status {}", status);
            return self.schedule_task_check(job_id);
        }

        let event = JobEvent::new(job_id.clone(), message.event, message.payload);
        let delivered = deliver(&handlers, &event);
        DispatchOutcome::Delivered {
            job_id,
            handlers: delivered,
        }
    }

    fn schedule_task_check(self: &Arc<Self>, job_id: JobId) -> DispatchOutcome {
        let Some(probe) = self.probe.clone() else {
            job_debug!(job_id, "task status ignored: no status probe configured");
            return DispatchOutcome::NoHandlers { job_id };
        };
        let target = {
            let state = self.state.lock();
            match &state.channel {
                Some(channel) if channel.id == job_id => channel.clone(),
                _ => JobRef::file(job_id.clone()),
            }
        };
        let delay = self.settings.task_status_poll_delay;
        let cancel = self.root.child_token();
        let inner = self.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            let event = match probe.check(&target).await {
                Ok(PollOutcome::Ready { url }) => RealtimeEvent::FileReady(FileRef::Url(url)),
                Ok(PollOutcome::Failed { message }) => RealtimeEvent::Error { message },
                Ok(PollOutcome::Pending { progress: Some(percent) }) => {
                    RealtimeEvent::Progress { percent }
                }
                Ok(PollOutcome::Pending { progress: None }) => return,
                Err(err) => {
                    job_debug!(target.id, "task status check not ready: {}", err);
                    return;
                }
            };
            if cancel.is_cancelled() {
                return;
            }
            let handlers = inner.state.lock().registry.handlers_for(&target.id);
            deliver(&handlers, &JobEvent::synthetic(target.id.clone(), event));
        });

        DispatchOutcome::PollScheduled { job_id }
    }

    /// Applies a connection flip from `session_id`; stale sessions are ignored.
    fn set_connected(&self, session_id: u64, connected: bool) {
        let handlers = {
            let mut state = self.state.lock();
            if state.session.as_ref().map(|s| s.id) != Some(session_id) {
                return;
            }
            if state.connected == connected {
                return;
            }
            state.connected = connected;
            state.connection_handlers.snapshot()
        };
        notify_all(&handlers, connected);
    }

    /// Decides whether a closed session should reconnect. Clears the session
    /// when it should not.
    fn should_reconnect(&self, session_id: u64, failures: u32) -> bool {
        let mut state = self.state.lock();
        if state.session.as_ref().map(|s| s.id) != Some(session_id) {
            return false;
        }
        if state.registry.is_empty() {
            tracker_info!("connection closed with no handlers left; not reconnecting");
            state.session = None;
            state.channel = None;
            return false;
        }
        if !self.settings.reconnect.allows(failures) {
            tracker_warn!(
                "giving up on real-time connection after {} consecutive failures",
                failures
            );
            state.session = None;
            return false;
        }
        true
    }
}

async fn run_session(
    inner: Arc<Inner>,
    session_id: u64,
    target: JobRef,
    cancel: CancellationToken,
) {
    let mut failures: u32 = 0;
    loop {
        let opened = tokio::select! {
            _ = cancel.cancelled() => return,
            opened = inner.transport.open(&target) => opened,
        };

        match opened {
            Ok(mut connection) => {
                inner.set_connected(session_id, true);
                let closed_by_us = loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break true,
                        frame = connection.next_message() => match frame {
                            Some(Ok(text)) => {
                                failures = 0;
                                inner.dispatch_raw(&text);
                            }
                            Some(Err(err)) => {
                                tracker_warn!("real-time stream for {} failed: {}", target, err);
                                break false;
                            }
                            None => {
                                tracker_info!("real-time stream for {} closed by peer", target);
                                break false;
                            }
                        },
                    }
                };
                connection.close().await;
                if closed_by_us {
                    return;
                }
                inner.set_connected(session_id, false);
            }
            Err(err) => {
                tracker_warn!("connecting to {} failed: {}", target, err);
            }
        }

        failures += 1;
        if !inner.should_reconnect(session_id, failures) {
            return;
        }
        let delay = inner.settings.reconnect.delay_for(failures - 1);
        tracker_debug!("reconnecting to {} in {:?} (attempt {})", target, delay, failures + 1);
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

fn cancel_idle_timer(state: &mut TrackerState) {
    if let Some(timer) = state.idle_timer.take() {
        timer.cancel();
        tracker_debug!("pending idle disconnect cancelled");
    }
}

/// Stops the current session. Returns the handlers to tell about the drop, if
/// the tracker was connected.
fn teardown(state: &mut TrackerState) -> Option<Vec<ConnectionHandler>> {
    if let Some(session) = state.session.take() {
        session.cancel.cancel();
    }
    state.last_attempt = None;
    if std::mem::replace(&mut state.connected, false) {
        Some(state.connection_handlers.snapshot())
    } else {
        None
    }
}
