//! Error types for the isy-stream crate.

use std::time::Duration;

use isy_parser::ParseError;

/// Errors surfaced by construction and configuration of the stream engine.
///
/// Once a controller is running nothing is returned to the caller: transport
/// failures are logged and fed into the reconnect path instead.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// Invalid configuration provided
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A transport operation failed
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// A frame could not be decoded
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),
}

/// How loudly a transport failure is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Expected churn such as timeouts or a server restarting
    Debug,
    /// Worth a look but recoverable
    Warn,
    /// Unexpected failure, logged with full context
    Error,
}

/// Failures of the socket underneath the event stream.
///
/// Every variant is recoverable; they differ only in how they are logged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The connect phase did not finish in time
    #[error("Connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// No frame arrived within the current heartbeat interval
    #[error("No frame received within {0:?}")]
    ReceiveTimeout(Duration),

    /// The socket could not be opened
    #[error("Connector error: {0}")]
    Connector(String),

    /// The server dropped the connection or is not accepting yet
    #[error("Server disconnected: {0}")]
    ServerDisconnected(String),

    /// The websocket upgrade was rejected
    #[error("Handshake failed{}: {message}", http_status_suffix(.status))]
    Handshake {
        /// HTTP status of the rejected upgrade, when one was received
        status: Option<u16>,
        /// Detail reported by the server or the client library
        message: String,
    },

    /// The server sent a close frame
    #[error("Stream closed by server (code {code:?}): {reason}")]
    Closed {
        /// Close code, if the frame carried one
        code: Option<u16>,
        /// Close reason text
        reason: String,
    },

    /// The connection ended without a closing handshake
    #[error("Stream ended unexpectedly")]
    UnexpectedEof,

    /// The transport reported an error while streaming
    #[error("Stream error: {0}")]
    Stream(String),

    /// The connect request could not be built
    #[error("Invalid connect request: {0}")]
    InvalidRequest(String),

    /// Anything the classifier does not recognise
    #[error("Unexpected transport failure: {0}")]
    Other(String),
}

impl TransportError {
    /// Log level this failure is reported at before reconnecting.
    pub fn severity(&self) -> Severity {
        match self {
            TransportError::ConnectTimeout(_)
            | TransportError::ReceiveTimeout(_)
            | TransportError::ServerDisconnected(_) => Severity::Debug,
            TransportError::Handshake { .. }
            | TransportError::Closed { .. }
            | TransportError::UnexpectedEof => Severity::Warn,
            TransportError::Connector(_)
            | TransportError::Stream(_)
            | TransportError::InvalidRequest(_)
            | TransportError::Other(_) => Severity::Error,
        }
    }
}

fn http_status_suffix(status: &Option<u16>) -> String {
    status
        .map(|s| format!(" with HTTP {s}"))
        .unwrap_or_default()
}

/// Convenience type alias for Results using StreamError.
pub type Result<T> = std::result::Result<T, StreamError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_display() {
        let error = TransportError::ConnectTimeout(Duration::from_secs(10));
        assert_eq!(error.to_string(), "Connect timed out after 10s");

        let error = TransportError::Handshake {
            status: Some(401),
            message: "Unauthorized".to_string(),
        };
        assert_eq!(error.to_string(), "Handshake failed with HTTP 401: Unauthorized");

        let error = TransportError::Handshake {
            status: None,
            message: "bad subprotocol".to_string(),
        };
        assert_eq!(error.to_string(), "Handshake failed: bad subprotocol");

        let error = TransportError::Closed {
            code: Some(1001),
            reason: "going away".to_string(),
        };
        assert!(error.to_string().contains("1001"));
    }

    #[test]
    fn test_severity_classification() {
        assert_eq!(
            TransportError::ReceiveTimeout(Duration::from_secs(30)).severity(),
            Severity::Debug
        );
        assert_eq!(
            TransportError::ServerDisconnected("reset".into()).severity(),
            Severity::Debug
        );
        assert_eq!(
            TransportError::Handshake {
                status: Some(403),
                message: String::new()
            }
            .severity(),
            Severity::Warn
        );
        assert_eq!(TransportError::UnexpectedEof.severity(), Severity::Warn);
        assert_eq!(
            TransportError::Connector("refused".into()).severity(),
            Severity::Error
        );
        assert_eq!(TransportError::Other("?".into()).severity(), Severity::Error);
    }

    #[test]
    fn test_error_conversion_from_transport_error() {
        let transport = TransportError::Stream("broken pipe".to_string());
        let error: StreamError = transport.into();

        match error {
            StreamError::Transport(e) => assert_eq!(e.to_string(), "Stream error: broken pipe"),
            _ => panic!("Expected Transport variant"),
        }
    }

    #[test]
    fn test_error_conversion_from_parse_error() {
        let error: StreamError = ParseError::malformed("eof").into();
        assert_eq!(error.to_string(), "Parse error: malformed XML: eof");
    }
}
