use std::collections::HashMap;
use std::io;
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc as async_mpsc;
use tokio_util::sync::CancellationToken;
use tracker_logging::{job_debug, job_info, tracker_debug, tracker_info, tracker_warn};

use crate::{
    poll_until_done, ChannelEventSink, ConnectionHandler, EngineEvent, EventHandler, EventSink,
    FileRef, GenerationClient, GenerationRequest, HttpStatusProbe, JobEvent, JobId, JobRef,
    JobTracker, PollError, PollOutcome, PollVerdict, ProbeSource, RealtimeEvent, SseTransport,
    StatusProbe, SubmitError, TrackerConfig, Transport, TransportError, TransportKind,
    WebSocketTransport,
};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Poll(#[from] PollError),
    #[error(transparent)]
    Submit(#[from] SubmitError),
    #[error("failed to start engine runtime: {0}")]
    Runtime(#[from] io::Error),
}

enum EngineCommand {
    Submit(GenerationRequest),
    Track {
        target: JobRef,
        request_id: Option<String>,
    },
    Recover {
        target: JobRef,
    },
    ForceCheck {
        target: JobRef,
    },
    Stop {
        job_id: JobId,
    },
    Shutdown,
}

/// The IO pieces the engine drives. Swappable so tests can script them.
#[derive(Clone)]
pub struct EngineServices {
    pub transport: Arc<dyn Transport>,
    pub probe: Arc<dyn StatusProbe>,
    pub client: Option<GenerationClient>,
}

impl EngineServices {
    pub fn from_config(config: &TrackerConfig) -> Result<Self, EngineError> {
        let transport: Arc<dyn Transport> = match config.transport {
            TransportKind::Sse => Arc::new(SseTransport::new(&config.base_url)?),
            TransportKind::WebSocket => {
                Arc::new(WebSocketTransport::new(config.websocket_endpoint()))
            }
        };
        let probe = Arc::new(HttpStatusProbe::new(&config.base_url, config.request_timeout)?);
        let client = GenerationClient::new(&config.base_url, config.request_timeout)?;
        Ok(Self {
            transport,
            probe,
            client: Some(client),
        })
    }
}

/// Runs the tracker, pollers and submissions on a background runtime.
///
/// Commands go in through the methods; [`EngineEvent`]s come out through
/// [`EngineHandle::try_recv`] and [`EngineHandle::recv_timeout`].
pub struct EngineHandle {
    cmd_tx: async_mpsc::UnboundedSender<EngineCommand>,
    event_rx: mpsc::Receiver<EngineEvent>,
    thread: Option<thread::JoinHandle<()>>,
}

impl EngineHandle {
    pub fn new(config: TrackerConfig) -> Result<Self, EngineError> {
        let services = EngineServices::from_config(&config)?;
        Self::with_services(config, services)
    }

    pub fn with_services(
        config: TrackerConfig,
        services: EngineServices,
    ) -> Result<Self, EngineError> {
        let (cmd_tx, cmd_rx) = async_mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::channel();
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("tracker-runtime")
            .build()?;

        let thread = thread::Builder::new()
            .name("tracker-engine".to_string())
            .spawn(move || {
                let sink: Arc<dyn EventSink> = Arc::new(ChannelEventSink::new(event_tx));
                runtime.block_on(run_engine(config, services, cmd_rx, sink));
            })?;

        Ok(Self {
            cmd_tx,
            event_rx,
            thread: Some(thread),
        })
    }

    pub fn submit(&self, request: GenerationRequest) {
        self.send(EngineCommand::Submit(request));
    }

    /// Starts real-time tracking and scheduled polling for a job.
    pub fn track(&self, target: JobRef, request_id: Option<String>) {
        self.send(EngineCommand::Track { target, request_id });
    }

    /// Like [`EngineHandle::track`], but polls with the recovery policy first.
    pub fn recover(&self, target: JobRef) {
        self.send(EngineCommand::Recover { target });
    }

    pub fn force_check(&self, target: JobRef) {
        self.send(EngineCommand::ForceCheck { target });
    }

    pub fn stop(&self, job_id: impl Into<JobId>) {
        self.send(EngineCommand::Stop {
            job_id: job_id.into(),
        });
    }

    pub fn try_recv(&self) -> Option<EngineEvent> {
        self.event_rx.try_recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<EngineEvent> {
        self.event_rx.recv_timeout(timeout).ok()
    }

    /// Stops all background work and waits for the engine thread.
    pub fn shutdown(mut self) {
        self.stop_thread();
    }

    fn send(&self, command: EngineCommand) {
        if self.cmd_tx.send(command).is_err() {
            tracker_warn!("engine is not running; command dropped");
        }
    }

    fn stop_thread(&mut self) {
        let _ = self.cmd_tx.send(EngineCommand::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracker_warn!("engine thread panicked");
            }
        }
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        self.stop_thread();
    }
}

struct TrackedJob {
    target: JobRef,
    handler: EventHandler,
    cancel: CancellationToken,
}

struct Engine {
    config: TrackerConfig,
    tracker: JobTracker,
    probe: Arc<dyn StatusProbe>,
    client: Option<GenerationClient>,
    sink: Arc<dyn EventSink>,
    realtime_tx: async_mpsc::UnboundedSender<JobEvent>,
    root: CancellationToken,
    jobs: HashMap<JobId, TrackedJob>,
}

async fn run_engine(
    config: TrackerConfig,
    services: EngineServices,
    mut cmd_rx: async_mpsc::UnboundedReceiver<EngineCommand>,
    sink: Arc<dyn EventSink>,
) {
    let tracker = JobTracker::with_probe(
        services.transport,
        services.probe.clone(),
        config.tracker.clone(),
    );
    let connection_sink = sink.clone();
    tracker.add_connection_handler(ConnectionHandler::new(move |connected: &bool| {
        connection_sink.emit(EngineEvent::Connection(*connected));
    }));

    let (realtime_tx, mut realtime_rx) = async_mpsc::unbounded_channel();
    let mut engine = Engine {
        config,
        tracker,
        probe: services.probe,
        client: services.client,
        sink,
        realtime_tx,
        root: CancellationToken::new(),
        jobs: HashMap::new(),
    };
    tracker_info!("engine started");

    loop {
        tokio::select! {
            command = cmd_rx.recv() => match command {
                Some(EngineCommand::Shutdown) | None => break,
                Some(command) => engine.handle(command),
            },
            Some(event) = realtime_rx.recv() => engine.forward_realtime(event),
        }
    }

    engine.root.cancel();
    engine.tracker.shutdown();
    tracker_info!("engine stopped");
}

impl Engine {
    fn handle(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::Submit(request) => self.submit(request),
            EngineCommand::Track { target, request_id } => {
                if let Some(cancel) = self.start_tracking(target.clone(), request_id) {
                    self.spawn_poller(target, cancel, false);
                }
            }
            EngineCommand::Recover { target } => {
                if let Some(cancel) = self.start_tracking(target.clone(), None) {
                    self.spawn_poller(target, cancel, true);
                }
            }
            EngineCommand::ForceCheck { target } => self.force_check(target),
            EngineCommand::Stop { job_id } => self.stop(&job_id),
            EngineCommand::Shutdown => {}
        }
    }

    fn submit(&self, request: GenerationRequest) {
        let Some(client) = self.client.clone() else {
            self.sink.emit(EngineEvent::SubmitFailed {
                message: "no generation backend configured".to_string(),
            });
            return;
        };
        let sink = self.sink.clone();
        tokio::spawn(async move {
            match client.submit(&request).await {
                Ok(job) => sink.emit(EngineEvent::Submitted(job)),
                Err(err) => {
                    tracker_warn!("submission failed: {}", err);
                    sink.emit(EngineEvent::SubmitFailed {
                        message: err.to_string(),
                    });
                }
            }
        });
    }

    /// Registers the forwarding handler and opens the channel. `None` when the
    /// job is already tracked.
    fn start_tracking(
        &mut self,
        target: JobRef,
        request_id: Option<String>,
    ) -> Option<CancellationToken> {
        if self.jobs.contains_key(&target.id) {
            job_debug!(target.id, "already tracked");
            return None;
        }

        let tx = self.realtime_tx.clone();
        let handler = EventHandler::new(move |event: &JobEvent| {
            let _ = tx.send(event.clone());
        });
        self.tracker
            .add_handlers(target.job_id(), &[handler.clone()], request_id.as_deref());
        self.tracker
            .init_connection(target.clone(), &[handler.clone()]);

        let cancel = self.root.child_token();
        job_info!(target.id, "tracking via {}", target);
        self.jobs.insert(
            target.id.clone(),
            TrackedJob {
                target,
                handler,
                cancel: cancel.clone(),
            },
        );
        Some(cancel)
    }

    fn spawn_poller(&self, target: JobRef, cancel: CancellationToken, recovering: bool) {
        let probe = self.probe.clone();
        let sink = self.sink.clone();
        let polling = self.config.polling;
        let recovery = self.config.recovery;

        tokio::spawn(async move {
            if recovering {
                let verdict = poll_until_done(
                    probe.as_ref(),
                    &target,
                    &recovery,
                    ProbeSource::Recovery,
                    &cancel,
                    sink.as_ref(),
                )
                .await;
                match verdict {
                    PollVerdict::Cancelled => return,
                    PollVerdict::Exhausted { .. } => {
                        job_info!(target.id, "recovery checks exhausted; falling back to polling");
                    }
                    verdict => {
                        sink.emit(EngineEvent::PollFinished {
                            job_id: target.id.clone(),
                            source: ProbeSource::Recovery,
                            verdict,
                        });
                        return;
                    }
                }
            }

            let verdict = poll_until_done(
                probe.as_ref(),
                &target,
                &polling,
                ProbeSource::Scheduled,
                &cancel,
                sink.as_ref(),
            )
            .await;
            if verdict != PollVerdict::Cancelled {
                sink.emit(EngineEvent::PollFinished {
                    job_id: target.id.clone(),
                    source: ProbeSource::Scheduled,
                    verdict,
                });
            }
        });
    }

    fn force_check(&self, target: JobRef) {
        let cancel = match self.jobs.get(&target.id) {
            Some(job) => job.cancel.child_token(),
            None => self.root.child_token(),
        };
        let probe = self.probe.clone();
        let sink = self.sink.clone();

        tokio::spawn(async move {
            let result = tokio::select! {
                _ = cancel.cancelled() => return,
                result = probe.check(&target) => result,
            };
            if cancel.is_cancelled() {
                return;
            }
            let verdict = match result {
                Ok(PollOutcome::Ready { url }) => PollVerdict::Ready { url },
                Ok(PollOutcome::Failed { message }) => PollVerdict::Failed { message },
                Ok(PollOutcome::Pending { progress }) => {
                    job_debug!(target.id, "force check: not ready");
                    if let Some(percent) = progress {
                        sink.emit(EngineEvent::Progress {
                            job_id: target.id.clone(),
                            percent,
                            source: ProbeSource::ForceCheck,
                        });
                    }
                    return;
                }
                Err(err) => {
                    job_debug!(target.id, "force check not ready: {}", err);
                    return;
                }
            };
            sink.emit(EngineEvent::PollFinished {
                job_id: target.id.clone(),
                source: ProbeSource::ForceCheck,
                verdict,
            });
        });
    }

    fn stop(&mut self, job_id: &str) {
        let Some(job) = self.jobs.remove(job_id) else {
            job_debug!(job_id, "stop requested for untracked job");
            return;
        };
        job.cancel.cancel();
        self.tracker.remove_handlers(job_id, &[job.handler]);
        job_info!(job_id, "tracking of {} stopped", job.target);
    }

    fn forward_realtime(&self, event: JobEvent) {
        match event.event {
            RealtimeEvent::Subscribed => job_debug!(event.job_id, "subscribed"),
            RealtimeEvent::FileReady(FileRef::FileId(file_id)) => {
                let probe = self.probe.clone();
                let sink = self.sink.clone();
                let job_id = event.job_id;
                tokio::spawn(async move {
                    match probe.resolve_file_url(&file_id).await {
                        Ok(Some(url)) => sink.emit(EngineEvent::Realtime {
                            job_id,
                            event: RealtimeEvent::FileReady(FileRef::Url(url)),
                        }),
                        Ok(None) => job_debug!(job_id, "file {} has no url yet", file_id),
                        Err(err) => {
                            job_debug!(job_id, "resolving file {} failed: {}", file_id, err)
                        }
                    }
                });
            }
            other => {
                tracker_debug!("forwarding {} event for {}", other.kind(), event.job_id);
                self.sink.emit(EngineEvent::Realtime {
                    job_id: event.job_id,
                    event: other,
                });
            }
        }
    }
}
