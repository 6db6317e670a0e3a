//! Configuration for the event-stream engine
//!
//! Everything here is fixed at construction time. The one value the device may
//! change while running is the heartbeat interval, which each session tracks
//! on its own starting from [`StreamConfig::heartbeat_interval`].

use std::fmt;
use std::time::Duration;

use url::Url;

use crate::error::{Result, StreamError};

/// Subprotocol the device requires on the upgrade request
pub const SUBPROTOCOL: &str = "ISYSUB";
/// Websocket version header value
pub const WEBSOCKET_VERSION: &str = "13";
/// Origin the device expects subscription clients to present
pub const ORIGIN: &str = "com.universal-devices.websockets.isy";
/// REST path of the subscription endpoint
pub const SUBSCRIBE_PATH: &str = "/rest/subscribe";

/// Configuration for a [`StreamController`](crate::StreamController)
#[derive(Clone)]
pub struct StreamConfig {
    /// Websocket endpoint, `ws://` or `wss://`
    /// Default: ws://localhost/rest/subscribe
    pub url: String,

    /// Basic auth user
    /// Default: empty
    pub username: String,

    /// Basic auth password
    /// Default: empty
    pub password: String,

    /// Heartbeat interval assumed until the device sends its own
    /// Default: 30 seconds
    pub heartbeat_interval: Duration,

    /// Retry attempt at which the backoff schedule stops advancing
    /// Default: 4
    pub max_retries: u32,

    /// Delay before each reconnect, indexed by attempt
    /// Default: [10ms, 1s, 10s, 30s, 60s]
    pub backoff_schedule: Vec<Duration>,

    /// Limit on opening the socket
    /// Default: 10 seconds
    pub connect_timeout: Duration,

    /// How long `disconnect` waits for the read loop to close the socket
    /// Default: 5 seconds
    pub shutdown_timeout: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            url: format!("ws://localhost{SUBSCRIBE_PATH}"),
            username: String::new(),
            password: String::new(),
            heartbeat_interval: Duration::from_secs(30),
            max_retries: 4,
            backoff_schedule: vec![
                Duration::from_millis(10),
                Duration::from_secs(1),
                Duration::from_secs(10),
                Duration::from_secs(30),
                Duration::from_secs(60),
            ],
            connect_timeout: Duration::from_secs(10),
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

impl fmt::Debug for StreamConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamConfig")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("heartbeat_interval", &self.heartbeat_interval)
            .field("max_retries", &self.max_retries)
            .field("backoff_schedule", &self.backoff_schedule)
            .field("connect_timeout", &self.connect_timeout)
            .field("shutdown_timeout", &self.shutdown_timeout)
            .finish()
    }
}

impl StreamConfig {
    /// Create a new StreamConfig with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Config pointing at the subscription endpoint of `host`
    ///
    /// `host` may include a port (`192.168.1.20:8080`).
    pub fn for_host(host: &str, tls: bool) -> Self {
        let scheme = if tls { "wss" } else { "ws" };
        Self {
            url: format!("{scheme}://{host}{SUBSCRIBE_PATH}"),
            ..Default::default()
        }
    }

    /// Set the endpoint URL
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Set Basic auth credentials
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    /// Set the default heartbeat interval
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Set the retry clamp
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Replace the backoff schedule
    pub fn with_backoff_schedule(mut self, schedule: Vec<Duration>) -> Self {
        self.backoff_schedule = schedule;
        self
    }

    /// Set the connect timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the graceful shutdown timeout
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Parse the endpoint URL, checking its scheme
    pub fn parsed_url(&self) -> Result<Url> {
        let url = Url::parse(&self.url).map_err(|e| {
            StreamError::Configuration(format!("Invalid stream URL '{}': {e}", self.url))
        })?;

        match url.scheme() {
            "ws" | "wss" => Ok(url),
            other => Err(StreamError::Configuration(format!(
                "Stream URL must use ws:// or wss://, got '{other}://'"
            ))),
        }
    }

    /// Validate the configuration and return any issues
    pub fn validate(&self) -> Result<()> {
        self.parsed_url()?;

        if self.heartbeat_interval == Duration::ZERO {
            return Err(StreamError::Configuration(
                "Heartbeat interval must be greater than 0".to_string(),
            ));
        }

        if self.backoff_schedule.is_empty() {
            return Err(StreamError::Configuration(
                "Backoff schedule must contain at least one delay".to_string(),
            ));
        }

        if self.backoff_schedule.windows(2).any(|w| w[0] > w[1]) {
            return Err(StreamError::Configuration(
                "Backoff schedule must be non-decreasing".to_string(),
            ));
        }

        if self.connect_timeout == Duration::ZERO {
            return Err(StreamError::Configuration(
                "Connect timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Headers the device requires on every subscription request
    pub fn protocol_headers(&self) -> Vec<(String, String)> {
        vec![
            ("Sec-WebSocket-Protocol".to_string(), SUBPROTOCOL.to_string()),
            ("Sec-WebSocket-Version".to_string(), WEBSOCKET_VERSION.to_string()),
            ("Origin".to_string(), ORIGIN.to_string()),
        ]
    }
}
