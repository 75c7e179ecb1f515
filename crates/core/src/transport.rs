//! Transport seam between the engine and the realtime service.
//!
//! The session actor only ever sees the [`Transport`] trait, so the engine is
//! testable against a channel-backed double while production sessions run
//! over a tokio-tungstenite WebSocket.

use crate::error::EngineError;
use crate::events::{ClientEvent, ServerEvent};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, warn};

/// One established bidirectional connection to the realtime service.
#[async_trait]
pub trait Transport: Send {
    async fn send(&mut self, event: ClientEvent) -> Result<(), EngineError>;

    /// Next inbound event. `None` means the remote end closed the stream;
    /// an `Err` is a transport-level failure.
    async fn next_event(&mut self) -> Option<Result<ServerEvent, EngineError>>;

    async fn close(&mut self);
}

/// Dials new transports. Held as `Arc<dyn Connector>` by the registry.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn Transport>, EngineError>;
}

/// Production connector for an OpenAI-style realtime WebSocket endpoint.
pub struct RealtimeConnector {
    endpoint: String,
    api_key: String,
}

impl RealtimeConnector {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl Connector for RealtimeConnector {
    async fn connect(&self) -> Result<Box<dyn Transport>, EngineError> {
        let mut request = self
            .endpoint
            .as_str()
            .into_client_request()
            .map_err(|e| EngineError::ConnectionError(format!("bad endpoint: {e}")))?;
        let auth = HeaderValue::from_str(&format!("Bearer {}", self.api_key)).map_err(|_| {
            EngineError::ConnectionError("api key is not a valid header value".to_string())
        })?;
        let headers = request.headers_mut();
        headers.insert("Authorization", auth);
        headers.insert("OpenAI-Beta", HeaderValue::from_static("realtime=v1"));

        let (stream, _) = connect_async(request)
            .await
            .map_err(|e| EngineError::ConnectionError(e.to_string()))?;
        debug!(endpoint = %self.endpoint, "realtime transport established");
        Ok(Box::new(WsTransport { stream }))
    }
}

/// [`Transport`] over a tungstenite WebSocket stream.
pub struct WsTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&mut self, event: ClientEvent) -> Result<(), EngineError> {
        let frame = event.to_json().to_string();
        self.stream
            .send(Message::Text(frame.into()))
            .await
            .map_err(|e| EngineError::ConnectionError(e.to_string()))
    }

    async fn next_event(&mut self) -> Option<Result<ServerEvent, EngineError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => match ServerEvent::parse(&text) {
                    Ok(event) => return Some(Ok(event)),
                    Err(e) => {
                        // A single garbled frame is not worth a teardown.
                        warn!(error = %e, "skipping unparseable realtime frame");
                    }
                },
                Ok(Message::Close(_)) => return None,
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Binary(_) | Message::Frame(_)) => {
                }
                Err(e) => return Some(Err(EngineError::ConnectionError(e.to_string()))),
            }
        }
    }

    async fn close(&mut self) {
        let _ = self.stream.close(None).await;
    }
}
