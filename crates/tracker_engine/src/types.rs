use std::sync::mpsc;

use crate::{JobId, PollVerdict, RealtimeEvent, SubmittedJob};

/// Why a status check ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeSource {
    /// Regular polling after submission.
    Scheduled,
    /// Quick checks for a job restored after a restart.
    Recovery,
    /// User asked for a check.
    ForceCheck,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Submitted(SubmittedJob),
    SubmitFailed { message: String },
    Realtime { job_id: JobId, event: RealtimeEvent },
    Progress {
        job_id: JobId,
        percent: u8,
        source: ProbeSource,
    },
    PollFinished {
        job_id: JobId,
        source: ProbeSource,
        verdict: PollVerdict,
    },
    Connection(bool),
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: EngineEvent);
}

pub struct ChannelEventSink {
    tx: mpsc::Sender<EngineEvent>,
}

impl ChannelEventSink {
    pub fn new(tx: mpsc::Sender<EngineEvent>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelEventSink {
    fn emit(&self, event: EngineEvent) {
        let _ = self.tx.send(event);
    }
}
