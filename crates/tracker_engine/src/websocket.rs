use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracker_logging::{tracker_debug, tracker_info};

use crate::{Connection, JobRef, Transport, TransportError};

/// Raw WebSocket transport; the channel is chosen by a subscribe message
/// sent right after the socket opens.
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    url: String,
}

impl WebSocketTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

pub fn subscribe_message(target: &JobRef) -> String {
    serde_json::json!({ "type": "subscribe", "channel": target.channel() }).to_string()
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn open(&self, target: &JobRef) -> Result<Box<dyn Connection>, TransportError> {
        let (mut stream, _) = connect_async(self.url.as_str())
            .await
            .map_err(|err| TransportError::Connect(err.to_string()))?;
        stream
            .send(Message::Text(subscribe_message(target)))
            .await
            .map_err(|err| TransportError::Connect(err.to_string()))?;
        tracker_info!("websocket connected to {} for {}", self.url, target);
        Ok(Box::new(WebSocketConnection { stream }))
    }
}

struct WebSocketConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Connection for WebSocketConnection {
    async fn next_message(&mut self) -> Option<Result<String, TransportError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Binary(data)) => {
                    return Some(
                        String::from_utf8(data)
                            .map_err(|err| TransportError::Stream(err.to_string())),
                    )
                }
                Ok(Message::Close(_)) => return None,
                Ok(_) => continue,
                Err(err) => return Some(Err(TransportError::Stream(err.to_string()))),
            }
        }
    }

    async fn close(&mut self) {
        tracker_debug!("closing websocket");
        let _ = self.stream.close(None).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_names_the_channel() {
        let value: serde_json::Value =
            serde_json::from_str(&subscribe_message(&JobRef::project("p-7"))).unwrap();
        assert_eq!(value["type"], "subscribe");
        assert_eq!(value["channel"], "project.p-7");
    }
}
