//! Typed views over routed envelopes
//!
//! These decoders read the detail of a few event families that integrations
//! commonly need. They never fail: fields the device did not send come back as
//! `None` and unknown codes keep their raw value.

pub mod node_change;
pub mod progress;
pub mod system;

pub use node_change::{NodeChange, NodeChangeAction};
pub use progress::{MemoryWrite, ProgressReport};
pub use system::SystemStatus;
