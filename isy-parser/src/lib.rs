//! # isy-parser
//!
//! XML decoding for the frames an ISY home controller pushes over its
//! event subscription socket. This crate knows nothing about connections or
//! routing; it turns one text frame into an [`EventFrame`] and reports
//! malformed documents as [`ParseError`].
//!
//! ## Usage
//!
//! ```rust
//! use isy_parser::EventFrame;
//!
//! let frame = EventFrame::parse(
//!     r#"<Event seqnum="1" sid="uuid:2"><control>_0</control><action>30</action></Event>"#,
//! )?;
//! assert_eq!(frame.control.as_deref(), Some("_0"));
//! assert_eq!(frame.action_value(), Some("30"));
//! # Ok::<(), isy_parser::ParseError>(())
//! ```

pub mod error;
pub mod event;

pub use error::{ParseError, ParseErrorKind, ParseResult};
pub use event::{ActionValue, EventFrame, EventInfo};
