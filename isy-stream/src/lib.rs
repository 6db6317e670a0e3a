//! # isy-stream
//!
//! A self-healing client for the event subscription socket of an ISY home
//! controller.
//!
//! The [`StreamController`] opens the subscription, watches the device's
//! heartbeat, reconnects with a fixed backoff schedule when the stream goes
//! quiet or fails, and routes each frame to subscribers by topic:
//!
//! | control code        | topic                        |
//! |---------------------|------------------------------|
//! | `_0`                | heartbeat (consumed)         |
//! | `ST`                | [`Topic::NodeStatus`]        |
//! | any non-`_` code    | [`Topic::NodeControl`]       |
//! | `_1` with `<var`    | [`Topic::VariableUpdate`]    |
//! | `_1` with `<id>`    | [`Topic::ProgramUpdate`]     |
//! | `_3`                | [`Topic::NodeChanged`]       |
//! | `_5`                | [`Topic::SystemStatus`]      |
//! | `_7`                | [`Topic::ProgressReport`]    |
//!
//! Nothing the stream does at runtime is fatal. Malformed frames are logged
//! and dropped; transport failures set [`ConnectionState::LostConnection`] and
//! schedule a reconnect. Only [`StreamController::stop`] or
//! [`StreamController::disconnect`] end the stream.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use isy_stream::{StreamConfig, StreamController};
//!
//! #[tokio::main]
//! async fn main() -> isy_stream::Result<()> {
//!     let config = StreamConfig::for_host("192.168.1.20", false)
//!         .with_credentials("admin", "admin");
//!     let controller = StreamController::new(config)?;
//!
//!     controller.subscribe_all(|event| println!("{}: {:?}", event.topic, event.envelope.action));
//!     controller.start(0);
//!
//!     tokio::signal::ctrl_c().await.ok();
//!     controller.disconnect().await;
//!     Ok(())
//! }
//! ```

pub mod backoff;
pub mod builder;
pub mod classifier;
pub mod config;
pub mod controller;
pub mod emitter;
pub mod envelope;
pub mod error;
pub mod events;
pub mod session;
pub mod transport;
pub mod types;

mod guardian;
mod supervisor;

pub use backoff::BackoffPolicy;
pub use builder::StreamControllerBuilder;
pub use classifier::{classify, route, DiscardReason, Route};
pub use config::StreamConfig;
pub use controller::{ProgramRefresh, RefreshError, StreamController};
pub use emitter::{EventEmitter, SubscriptionHandle};
pub use envelope::{ControlCode, ControlFamily, EventEnvelope};
pub use error::{Result, Severity, StreamError, TransportError};
pub use events::{MemoryWrite, NodeChange, NodeChangeAction, ProgressReport, SystemStatus};
pub use transport::{CloseInfo, ConnectRequest, Connector, Frame, FrameStream, WebSocketConnector};
pub use types::{ConnectionState, RetryState, RoutedEvent, Topic};

// Re-export the frame decoder for consumers that parse frames themselves
pub use isy_parser::{EventFrame, ParseError, ParseErrorKind};
