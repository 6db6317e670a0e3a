//! Websocket transport built on tokio-tungstenite

use std::io;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use super::{CloseInfo, ConnectRequest, Connector, Frame, FrameStream};
use crate::error::TransportError;

/// Opens the subscription socket over websockets
///
/// `wss://` endpoints need the crate's `tls` feature.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(
        &self,
        request: &ConnectRequest,
    ) -> Result<Box<dyn FrameStream>, TransportError> {
        let mut upgrade = request
            .url
            .as_str()
            .into_client_request()
            .map_err(connect_error)?;

        for (name, value) in &request.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| TransportError::InvalidRequest(format!("header {name}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| TransportError::InvalidRequest(format!("header {name}: {e}")))?;
            upgrade.headers_mut().insert(name, value);
        }

        let (socket, response) = connect_async(upgrade).await.map_err(connect_error)?;
        debug!(status = %response.status(), url = %request.url, "Websocket upgrade accepted");

        Ok(Box::new(WebSocketFrames { socket }))
    }
}

struct WebSocketFrames {
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl FrameStream for WebSocketFrames {
    async fn next_frame(&mut self) -> Option<Result<Frame, TransportError>> {
        loop {
            let message = match self.socket.next().await? {
                Ok(message) => message,
                Err(e) => return Some(Err(stream_error(e))),
            };

            let frame = match message {
                Message::Text(text) => Frame::Text(text),
                Message::Binary(data) => Frame::Binary(data),
                Message::Ping(_) => Frame::Ping,
                Message::Pong(_) => Frame::Pong,
                Message::Close(close) => Frame::Close(close.map(|close| CloseInfo {
                    code: u16::from(close.code),
                    reason: close.reason.into_owned(),
                })),
                // Raw frames only show up when writing
                Message::Frame(_) => continue,
            };
            return Some(Ok(frame));
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.socket.close(None).await {
            debug!("Error while closing websocket: {}", e);
        }
    }
}

fn is_reset(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
    )
}

/// Map failures of the connect phase
fn connect_error(error: WsError) -> TransportError {
    match error {
        WsError::Http(response) => {
            let status = response.status();
            let message = response
                .body()
                .as_ref()
                .map(|body| String::from_utf8_lossy(body).trim().to_string())
                .filter(|body| !body.is_empty())
                .or_else(|| status.canonical_reason().map(str::to_string))
                .unwrap_or_default();
            TransportError::Handshake {
                status: Some(status.as_u16()),
                message,
            }
        }
        WsError::Protocol(e) => TransportError::Handshake {
            status: None,
            message: e.to_string(),
        },
        WsError::Io(e) if is_reset(e.kind()) => TransportError::ServerDisconnected(e.to_string()),
        WsError::Io(e) => TransportError::Connector(e.to_string()),
        WsError::ConnectionClosed | WsError::AlreadyClosed => {
            TransportError::ServerDisconnected(error.to_string())
        }
        WsError::Url(e) => TransportError::InvalidRequest(e.to_string()),
        WsError::HttpFormat(e) => TransportError::InvalidRequest(e.to_string()),
        other => TransportError::Other(other.to_string()),
    }
}

/// Map failures while streaming
fn stream_error(error: WsError) -> TransportError {
    match error {
        WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake) => {
            TransportError::UnexpectedEof
        }
        WsError::ConnectionClosed | WsError::AlreadyClosed => {
            TransportError::ServerDisconnected(error.to_string())
        }
        WsError::Io(e) if is_reset(e.kind()) => TransportError::ServerDisconnected(e.to_string()),
        other => TransportError::Stream(other.to_string()),
    }
}
