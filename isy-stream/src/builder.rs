//! Builder for creating and configuring a StreamController.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use isy_stream::{StreamConfig, StreamControllerBuilder};
//!
//! # fn example() -> isy_stream::Result<()> {
//! let controller = StreamControllerBuilder::new()
//!     .with_config(StreamConfig::for_host("192.168.1.20", false))
//!     .with_credentials("admin", "admin")
//!     .with_heartbeat_interval(Duration::from_secs(60))
//!     .build()?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use crate::config::StreamConfig;
use crate::controller::{ProgramRefresh, StreamController};
use crate::error::Result;
use crate::transport::{Connector, WebSocketConnector};

/// Assembles configuration, transport and hooks into a [`StreamController`]
///
/// `build()` validates the configuration; the websocket transport is used
/// unless another connector is supplied.
pub struct StreamControllerBuilder {
    config: StreamConfig,
    connector: Option<Arc<dyn Connector>>,
    program_refresh: Option<Arc<dyn ProgramRefresh>>,
}

impl StreamControllerBuilder {
    pub fn new() -> Self {
        Self {
            config: StreamConfig::default(),
            connector: None,
            program_refresh: None,
        }
    }

    /// Replace the whole configuration
    pub fn with_config(mut self, config: StreamConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.config.url = url.into();
        self
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.config = self.config.with_credentials(username, password);
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.config.heartbeat_interval = interval;
        self
    }

    /// Set the retry clamp and the delay table
    pub fn with_backoff(mut self, schedule: Vec<Duration>, max_retries: u32) -> Self {
        self.config.backoff_schedule = schedule;
        self.config.max_retries = max_retries;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Use a custom transport
    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Hook called when the device reports that programs changed
    pub fn with_program_refresh(mut self, hook: Arc<dyn ProgramRefresh>) -> Self {
        self.program_refresh = Some(hook);
        self
    }

    /// Validate the configuration and create the controller
    pub fn build(self) -> Result<StreamController> {
        let connector = self
            .connector
            .unwrap_or_else(|| Arc::new(WebSocketConnector::new()));
        StreamController::from_parts(self.config, connector, self.program_refresh)
    }
}

impl Default for StreamControllerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
