//! `_7` progress reports
//!
//! The `eventInfo` text reads `[address] message`, for example
//! `[  1 2 3 1] Memory : Write dbAddr=0x0264 [FF] cmd1=0x2E cmd2=0x00`.

use serde::Serialize;

use super::node_change::NodeChangeAction;
use crate::envelope::{ControlFamily, EventEnvelope};

/// Detail of a device memory write
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemoryWrite {
    /// `dbAddr` value, e.g. `0x0264`
    pub memory: String,
    pub cmd1: String,
    pub cmd2: String,
    /// The bracketed byte written
    pub value: u8,
}

/// A decoded `_7` event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressReport {
    /// Device address, or `All`
    pub address: String,
    pub message: String,
    /// `DeviceMemory` for memory writes to one device, else `DeviceWriting`
    pub action: NodeChangeAction,
    pub memory: Option<MemoryWrite>,
}

impl ProgressReport {
    pub fn from_envelope(envelope: &EventEnvelope) -> Option<Self> {
        if envelope.family != ControlFamily::ProgressReport {
            return None;
        }
        Some(Self::parse(envelope.event_info_text.as_deref().unwrap_or_default()))
    }

    pub fn parse(text: &str) -> Self {
        let (address, message) = text.split_once(']').unwrap_or((text, ""));
        let address = address.trim_matches(|c| c == '[' || c == ' ').to_string();
        let message = message.trim().to_string();

        let is_memory = address != "All" && message.starts_with("Memory");
        let memory = if is_memory { parse_memory(&message) } else { None };

        Self {
            action: if is_memory {
                NodeChangeAction::DeviceMemory
            } else {
                NodeChangeAction::DeviceWriting
            },
            address,
            message,
            memory,
        }
    }
}

fn field_after<'a>(message: &'a str, key: &str) -> Option<&'a str> {
    let start = message.find(key)? + key.len();
    let rest = &message[start..];
    let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
    Some(&rest[..end]).filter(|value| !value.is_empty())
}

fn parse_memory(message: &str) -> Option<MemoryWrite> {
    let memory = field_after(message, "dbAddr=")?;
    let after_addr = &message[message.find("dbAddr=")?..];
    let open = after_addr.find('[')?;
    let close = open + after_addr[open..].find(']')?;
    let value = u8::from_str_radix(after_addr[open + 1..close].trim(), 16).ok()?;

    Some(MemoryWrite {
        memory: memory.to_string(),
        cmd1: field_after(message, "cmd1=")?.to_string(),
        cmd2: field_after(message, "cmd2=")?.to_string(),
        value,
    })
}
