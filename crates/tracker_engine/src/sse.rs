use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest_eventsource::{retry::Never, Error as SseError, Event, EventSource};
use tracker_logging::{tracker_debug, tracker_info};
use url::Url;

use crate::{Connection, JobRef, Transport, TransportError};

/// Server-Sent Events against `{base}/api/events/{channel}`.
#[derive(Debug, Clone)]
pub struct SseTransport {
    base_url: Url,
}

impl SseTransport {
    pub fn new(base_url: &str) -> Result<Self, TransportError> {
        let base_url =
            Url::parse(base_url).map_err(|err| TransportError::InvalidUrl(err.to_string()))?;
        Ok(Self { base_url })
    }

    pub fn channel_url(&self, target: &JobRef) -> Result<Url, TransportError> {
        self.base_url
            .join(&format!("api/events/{}", target.channel()))
            .map_err(|err| TransportError::InvalidUrl(err.to_string()))
    }
}

#[async_trait]
impl Transport for SseTransport {
    async fn open(&self, target: &JobRef) -> Result<Box<dyn Connection>, TransportError> {
        let url = self.channel_url(target)?;
        let mut source = EventSource::get(url.as_str());
        // Reconnects are owned by the tracker's retry policy.
        source.set_retry_policy(Box::new(Never));

        let mut pending = None;
        match source.next().await {
            Some(Ok(Event::Open)) => {}
            Some(Ok(Event::Message(message))) => pending = Some(message.data),
            Some(Err(err)) => {
                source.close();
                return Err(TransportError::Connect(err.to_string()));
            }
            None => return Err(TransportError::Connect("event stream ended".into())),
        }
        tracker_info!("sse connected to {}", url);
        Ok(Box::new(SseConnection { source, pending }))
    }
}

struct SseConnection {
    source: EventSource,
    pending: Option<String>,
}

#[async_trait]
impl Connection for SseConnection {
    async fn next_message(&mut self) -> Option<Result<String, TransportError>> {
        if let Some(data) = self.pending.take() {
            return Some(Ok(data));
        }
        loop {
            match self.source.next().await? {
                Ok(Event::Open) => continue,
                Ok(Event::Message(message)) => {
                    if message.data.trim().is_empty() {
                        continue;
                    }
                    return Some(Ok(message.data));
                }
                Err(SseError::StreamEnded) => return None,
                Err(err) => return Some(Err(TransportError::Stream(err.to_string()))),
            }
        }
    }

    async fn close(&mut self) {
        tracker_debug!("closing sse stream");
        self.source.close();
    }
}
