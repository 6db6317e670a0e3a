//! Control-code grammar and the immutable envelope built from each frame

use std::collections::BTreeMap;

use isy_parser::EventFrame;
use serde::Serialize;

/// Heartbeat control code
pub const CONTROL_HEARTBEAT: &str = "_0";
/// Generic status property
pub const CONTROL_STATUS: &str = "ST";
/// Generic trigger (programs, variables, keys)
pub const CONTROL_TRIGGER: &str = "_1";
/// Node added, removed or edited
pub const CONTROL_NODE_CHANGED: &str = "_3";
/// System busy/idle status
pub const CONTROL_SYSTEM_STATUS: &str = "_5";
/// Device write progress
pub const CONTROL_PROGRESS: &str = "_7";

/// Broad event family selected by the control code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ControlFamily {
    Heartbeat,
    StatusUpdate,
    ControlEvent,
    GenericTrigger,
    NodeChanged,
    SystemStatusChanged,
    ProgressReport,
    Unrecognized,
}

/// A decoded control code
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCode {
    Heartbeat,
    Status,
    /// Any code without a leading underscore, e.g. `DON` or `CLISPH`
    Property(String),
    Trigger,
    NodeChanged,
    SystemStatus,
    Progress,
    /// Reserved or future underscore codes
    Other(String),
}

impl ControlCode {
    /// Decode a control value. The arms are ordered: `ST` wins over the
    /// generic property case and `_0` over the underscore codes.
    pub fn parse(code: &str) -> Self {
        match code {
            CONTROL_HEARTBEAT => ControlCode::Heartbeat,
            CONTROL_STATUS => ControlCode::Status,
            property if !property.starts_with('_') => ControlCode::Property(property.to_string()),
            CONTROL_TRIGGER => ControlCode::Trigger,
            CONTROL_NODE_CHANGED => ControlCode::NodeChanged,
            CONTROL_SYSTEM_STATUS => ControlCode::SystemStatus,
            CONTROL_PROGRESS => ControlCode::Progress,
            other => ControlCode::Other(other.to_string()),
        }
    }

    pub fn family(&self) -> ControlFamily {
        match self {
            ControlCode::Heartbeat => ControlFamily::Heartbeat,
            ControlCode::Status => ControlFamily::StatusUpdate,
            ControlCode::Property(_) => ControlFamily::ControlEvent,
            ControlCode::Trigger => ControlFamily::GenericTrigger,
            ControlCode::NodeChanged => ControlFamily::NodeChanged,
            ControlCode::SystemStatus => ControlFamily::SystemStatusChanged,
            ControlCode::Progress => ControlFamily::ProgressReport,
            ControlCode::Other(_) => ControlFamily::Unrecognized,
        }
    }
}

/// One classified frame. Never modified after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventEnvelope {
    /// Family selected by the control code
    pub family: ControlFamily,
    /// Raw control value, empty when the frame had none
    pub control_code: String,
    /// Action text
    pub action: Option<String>,
    /// Attributes of the action element (`uom`, `prec`, ...)
    pub action_attributes: BTreeMap<String, String>,
    /// Node address
    pub node: Option<String>,
    /// Node address, else variable id, else program id
    pub node_or_variable_id: Option<String>,
    /// Flattened `eventInfo` children
    pub event_info: BTreeMap<String, String>,
    /// Text directly inside `eventInfo`
    pub event_info_text: Option<String>,
    pub seqnum: Option<String>,
    /// Stream id (`sid`) carried by this frame
    pub stream_id: Option<String>,
    pub formatted_action: Option<String>,
    pub formatted_name: Option<String>,
    /// The frame as received
    pub raw: String,
}

impl EventEnvelope {
    /// Build an envelope from a decoded frame and its source text
    pub fn from_frame(frame: EventFrame, raw: &str) -> Self {
        let family = frame
            .control
            .as_deref()
            .map(|code| ControlCode::parse(code).family())
            .unwrap_or(ControlFamily::Unrecognized);

        let node_or_variable_id = frame
            .node
            .clone()
            .or_else(|| frame.event_info.get("var.id").map(str::to_string))
            .or_else(|| frame.event_info.get("id").map(str::to_string));

        let (action, action_attributes) = match frame.action {
            Some(action) => {
                let value = Some(action.value).filter(|v| !v.is_empty());
                (value, action.attributes)
            }
            None => (None, BTreeMap::new()),
        };

        Self {
            family,
            control_code: frame.control.unwrap_or_default(),
            action,
            action_attributes,
            node: frame.node,
            node_or_variable_id,
            event_info: frame.event_info.fields,
            event_info_text: frame.event_info.text,
            seqnum: frame.seqnum,
            stream_id: frame.sid,
            formatted_action: frame.formatted_action,
            formatted_name: frame.formatted_name,
            raw: raw.to_string(),
        }
    }

    /// Decoded control code, `None` when the frame had no control value
    pub fn control(&self) -> Option<ControlCode> {
        (!self.control_code.is_empty()).then(|| ControlCode::parse(&self.control_code))
    }

    pub fn event_info(&self, key: &str) -> Option<&str> {
        self.event_info.get(key).map(String::as_str)
    }

    pub fn action_attribute(&self, name: &str) -> Option<&str> {
        self.action_attributes.get(name).map(String::as_str)
    }
}
