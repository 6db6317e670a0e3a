//! Core type definitions for the isy-stream crate

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::envelope::EventEnvelope;

/// Connection status of the event stream
///
/// Displays as the status strings used by the device integration layer
/// (`connected`, `lost_connection`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Nothing has been started yet
    NotStarted,
    /// A session is being opened
    #[serde(rename = "stream_initializing")]
    Initializing,
    /// The socket is open and streaming
    Connected,
    /// The session failed and a reconnect is scheduled
    LostConnection,
    /// Waiting out the backoff delay before the next attempt
    Reconnecting,
    /// A graceful shutdown is closing the socket
    #[serde(rename = "stream_disconnecting")]
    Disconnecting,
    /// Graceful shutdown finished
    Disconnected,
    /// Stopped by the caller; only an explicit start leaves this state
    StopUpdates,
    /// Reserved for integrations that give up on reconnecting
    ReconnectFailed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::NotStarted => "not_started",
            ConnectionState::Initializing => "stream_initializing",
            ConnectionState::Connected => "connected",
            ConnectionState::LostConnection => "lost_connection",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Disconnecting => "stream_disconnecting",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::StopUpdates => "stop_updates",
            ConnectionState::ReconnectFailed => "reconnect_failed",
        }
    }

    /// States that background tasks may never transition out of
    pub fn is_halted(&self) -> bool {
        matches!(
            self,
            ConnectionState::StopUpdates
                | ConnectionState::Disconnecting
                | ConnectionState::Disconnected
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Consecutive-failure counter that drives the backoff lookup
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryState {
    pub attempt: u32,
}

impl RetryState {
    pub fn new(attempt: u32) -> Self {
        Self { attempt }
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

/// Topics routed events are published under
///
/// Connection status is not a topic; it has its own emitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Topic {
    NodeStatus,
    NodeControl,
    ProgramUpdate,
    VariableUpdate,
    NodeChanged,
    SystemStatus,
    ProgressReport,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::NodeStatus => "node-status",
            Topic::NodeControl => "node-control",
            Topic::ProgramUpdate => "program-update",
            Topic::VariableUpdate => "variable-update",
            Topic::NodeChanged => "node-changed",
            Topic::SystemStatus => "system-status",
            Topic::ProgressReport => "progress-report",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified frame together with the topic it was routed to
#[derive(Debug, Clone, Serialize)]
pub struct RoutedEvent {
    pub topic: Topic,
    pub envelope: Arc<EventEnvelope>,
}

impl RoutedEvent {
    pub fn new(topic: Topic, envelope: EventEnvelope) -> Self {
        Self {
            topic,
            envelope: Arc::new(envelope),
        }
    }
}
