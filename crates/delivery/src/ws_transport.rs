//! WebSocket transport to the collector.
//!
//! One persistent session per [`connect`](Transport::connect). Each record
//! goes out as a JSON text frame and the collector answers with one
//! [`CollectorAck`] text frame before the next record is sent.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::{HeaderValue, StatusCode, header};
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, tungstenite};
use tracing::{debug, trace};

use sentinel_protocol::constants::WS_MAX_MESSAGE_SIZE;
use sentinel_protocol::{CollectorAck, WireRecord};

use crate::error::{ConnectError, TransportError};
use crate::transport::{Transport, TransportFuture};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket session to a collector endpoint (`ws://host:port/path`).
pub struct WsTransport {
    endpoint: String,
    auth_token: Option<String>,
    stream: Option<WsStream>,
}

impl WsTransport {
    /// Creates a transport. `auth_token` is sent as a bearer token during
    /// the handshake.
    pub fn new(endpoint: impl Into<String>, auth_token: Option<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            auth_token,
            stream: None,
        }
    }

    /// Returns `true` while a session is open.
    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    fn build_request(&self) -> Result<Request, ConnectError> {
        let mut request = self
            .endpoint
            .as_str()
            .into_client_request()
            .map_err(|e| ConnectError::Unreachable(format!("invalid endpoint: {e}")))?;

        if let Some(token) = &self.auth_token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| ConnectError::AuthFailed("token is not a valid header value".into()))?;
            request.headers_mut().insert(header::AUTHORIZATION, value);
        }

        Ok(request)
    }

    async fn open(&mut self) -> Result<(), ConnectError> {
        self.shut().await;

        let request = self.build_request()?;
        let mut ws_config = WebSocketConfig::default();
        ws_config.max_message_size = Some(WS_MAX_MESSAGE_SIZE);
        ws_config.max_frame_size = Some(WS_MAX_MESSAGE_SIZE);

        let (stream, _) =
            tokio_tungstenite::connect_async_with_config(request, Some(ws_config), false)
                .await
                .map_err(classify_connect_error)?;

        debug!(endpoint = %self.endpoint, "collector session opened");
        self.stream = Some(stream);
        Ok(())
    }

    async fn exchange(&mut self, record: &WireRecord) -> Result<CollectorAck, TransportError> {
        let json = record.to_json()?;
        let stream = self.stream.as_mut().ok_or(TransportError::Closed)?;

        stream
            .send(tungstenite::Message::Text(json.into()))
            .await?;

        loop {
            match stream.next().await {
                Some(Ok(tungstenite::Message::Text(text))) => {
                    let ack: CollectorAck = serde_json::from_str(&text)?;
                    trace!(success = ack.success, alert_id = %ack.alert_id, "collector ack");
                    return Ok(ack);
                }
                Some(Ok(tungstenite::Message::Close(frame))) => {
                    debug!(?frame, "collector closed the session");
                    self.stream = None;
                    return Err(TransportError::Closed);
                }
                // Pings are answered by tungstenite on the next write.
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
                None => {
                    self.stream = None;
                    return Err(TransportError::Closed);
                }
            }
        }
    }

    async fn shut(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.close(None).await {
                trace!("close handshake failed: {e}");
            }
        }
    }
}

impl Transport for WsTransport {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn connect(&mut self) -> TransportFuture<'_, Result<(), ConnectError>> {
        Box::pin(self.open())
    }

    fn send<'a>(
        &'a mut self,
        record: &'a WireRecord,
    ) -> TransportFuture<'a, Result<CollectorAck, TransportError>> {
        Box::pin(self.exchange(record))
    }

    fn close(&mut self) -> TransportFuture<'_, ()> {
        Box::pin(self.shut())
    }
}

/// Maps a handshake failure onto the connect taxonomy.
fn classify_connect_error(err: tungstenite::Error) -> ConnectError {
    match err {
        tungstenite::Error::Http(response)
            if response.status() == StatusCode::UNAUTHORIZED
                || response.status() == StatusCode::FORBIDDEN =>
        {
            ConnectError::AuthFailed(format!("collector answered HTTP {}", response.status()))
        }
        other => ConnectError::Unreachable(other.to_string()),
    }
}
