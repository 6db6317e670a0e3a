//! Socket abstraction underneath the stream engine
//!
//! The engine only ever talks to a [`Connector`] and the [`FrameStream`] it
//! hands back. [`WebSocketConnector`] is the production implementation; tests
//! substitute scripted connectors.

mod websocket;

pub use websocket::WebSocketConnector;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::config::StreamConfig;
use crate::error::{Result, TransportError};

/// Everything needed to open a subscription socket
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    pub url: String,
    /// Extra request headers, applied in order
    pub headers: Vec<(String, String)>,
}

impl std::fmt::Debug for ConnectRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let headers: Vec<(&str, &str)> = self
            .headers
            .iter()
            .map(|(name, value)| {
                if name.eq_ignore_ascii_case("authorization") {
                    (name.as_str(), "<redacted>")
                } else {
                    (name.as_str(), value.as_str())
                }
            })
            .collect();
        f.debug_struct("ConnectRequest")
            .field("url", &self.url)
            .field("headers", &headers)
            .finish()
    }
}

impl ConnectRequest {
    /// Build the request for a validated configuration: protocol headers plus
    /// Basic auth when a username is set
    pub fn from_config(config: &StreamConfig) -> Result<Self> {
        let url = config.parsed_url()?;
        let mut headers = config.protocol_headers();

        if !config.username.is_empty() {
            let token = STANDARD.encode(format!("{}:{}", config.username, config.password));
            headers.push(("Authorization".to_string(), format!("Basic {token}")));
        }

        Ok(Self {
            url: url.to_string(),
            headers,
        })
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Close frame detail
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    pub code: u16,
    pub reason: String,
}

/// One inbound transport frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    Ping,
    Pong,
    Close(Option<CloseInfo>),
}

/// Opens subscription sockets
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        request: &ConnectRequest,
    ) -> std::result::Result<Box<dyn FrameStream>, TransportError>;
}

/// An open socket delivering frames in arrival order
#[async_trait]
pub trait FrameStream: Send {
    /// Next frame; `None` once the stream has ended
    async fn next_frame(&mut self) -> Option<std::result::Result<Frame, TransportError>>;

    /// Close the socket cleanly. Errors are swallowed: the socket is gone
    /// either way.
    async fn close(&mut self);
}
