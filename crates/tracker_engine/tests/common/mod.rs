#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracker_engine::{
    Connection, ConnectionHandler, EngineEvent, EventHandler, EventSink, JobEvent, JobRef,
    PollError, PollOutcome, StatusProbe, Transport, TransportError,
};

/// How the next `open` behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Stays open until the test drops the feed.
    Hold,
    /// Opens, then the peer closes right away.
    CloseImmediately,
    Refuse,
}

#[derive(Default)]
struct FakeState {
    mode: Option<OpenMode>,
    opens: usize,
    closes: usize,
    channels: Vec<String>,
    feeds: Vec<mpsc::UnboundedSender<String>>,
}

/// In-memory transport; every open hands the test a feed to push messages.
#[derive(Clone, Default)]
pub struct FakeTransport {
    state: Arc<Mutex<FakeState>>,
}

impl FakeTransport {
    pub fn new(mode: OpenMode) -> Self {
        let transport = Self::default();
        transport.state.lock().unwrap().mode = Some(mode);
        transport
    }

    pub fn opens(&self) -> usize {
        self.state.lock().unwrap().opens
    }

    pub fn closes(&self) -> usize {
        self.state.lock().unwrap().closes
    }

    pub fn channels(&self) -> Vec<String> {
        self.state.lock().unwrap().channels.clone()
    }

    /// Pushes a message into the most recent connection.
    pub fn push(&self, message: &str) -> bool {
        let state = self.state.lock().unwrap();
        state
            .feeds
            .last()
            .map(|feed| feed.send(message.to_string()).is_ok())
            .unwrap_or(false)
    }

    /// Simulates the server dropping the latest connection.
    pub fn drop_latest(&self) {
        self.state.lock().unwrap().feeds.pop();
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn open(&self, target: &JobRef) -> Result<Box<dyn Connection>, TransportError> {
        let mut state = self.state.lock().unwrap();
        state.opens += 1;
        state.channels.push(target.channel());
        let (tx, rx) = mpsc::unbounded_channel();
        match state.mode.unwrap_or(OpenMode::Hold) {
            OpenMode::Refuse => return Err(TransportError::Connect("refused".into())),
            OpenMode::CloseImmediately => drop(tx),
            OpenMode::Hold => state.feeds.push(tx),
        }
        Ok(Box::new(FakeConnection {
            rx,
            state: self.state.clone(),
        }))
    }
}

struct FakeConnection {
    rx: mpsc::UnboundedReceiver<String>,
    state: Arc<Mutex<FakeState>>,
}

#[async_trait]
impl Connection for FakeConnection {
    async fn next_message(&mut self) -> Option<Result<String, TransportError>> {
        self.rx.recv().await.map(Ok)
    }

    async fn close(&mut self) {
        self.state.lock().unwrap().closes += 1;
    }
}

/// Status probe answering from a script; the last answer repeats.
pub struct FakeProbe {
    answers: Mutex<VecDeque<Result<PollOutcome, PollError>>>,
    checks: AtomicUsize,
}

impl FakeProbe {
    pub fn new(answers: Vec<Result<PollOutcome, PollError>>) -> Self {
        Self {
            answers: Mutex::new(answers.into()),
            checks: AtomicUsize::new(0),
        }
    }

    pub fn pending() -> Self {
        Self::new(vec![Ok(PollOutcome::Pending { progress: None })])
    }

    pub fn checks(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StatusProbe for FakeProbe {
    async fn check(&self, _target: &JobRef) -> Result<PollOutcome, PollError> {
        self.checks.fetch_add(1, Ordering::SeqCst);
        let mut answers = self.answers.lock().unwrap();
        if answers.len() > 1 {
            answers.pop_front().unwrap_or(Err(PollError::HttpStatus(404)))
        } else {
            answers
                .front()
                .cloned()
                .unwrap_or(Err(PollError::HttpStatus(404)))
        }
    }
}

#[derive(Clone, Default)]
pub struct TestSink {
    events: Arc<Mutex<Vec<EngineEvent>>>,
}

impl TestSink {
    pub fn take(&self) -> Vec<EngineEvent> {
        self.events.lock().unwrap().drain(..).collect()
    }
}

impl EventSink for TestSink {
    fn emit(&self, event: EngineEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Handler that records every event it sees.
pub fn recording_handler() -> (EventHandler, Arc<Mutex<Vec<JobEvent>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let handler = EventHandler::new(move |event: &JobEvent| {
        sink.lock().unwrap().push(event.clone());
    });
    (handler, seen)
}

/// Connection handler that records every flip.
pub fn recording_connection_handler() -> (ConnectionHandler, Arc<Mutex<Vec<bool>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let handler = ConnectionHandler::new(move |connected: &bool| {
        sink.lock().unwrap().push(*connected);
    });
    (handler, seen)
}
