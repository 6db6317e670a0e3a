//! `_3` node-changed events

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::envelope::{ControlFamily, EventEnvelope};

/// What changed about a node, folder or group
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum NodeChangeAction {
    ClearError,
    FolderAdded,
    FolderRemoved,
    FolderRenamed,
    GroupAdded,
    GroupRemoved,
    GroupRenamed,
    NetRenamed,
    NodeAdded,
    NodeEnabled,
    NodeError,
    NodeMoved,
    NodeRemovedFromGroup,
    NodeRemoved,
    NodeRenamed,
    NodeRevised,
    ParentChanged,
    PendingDeviceOp,
    ProgrammingDevice,
    /// Derived from a `_7` progress report
    DeviceWriting,
    /// Derived from a `_7` progress report about a memory write
    DeviceMemory,
    Unknown(String),
}

impl NodeChangeAction {
    pub fn from_code(code: &str) -> Self {
        match code {
            "CE" => Self::ClearError,
            "FD" => Self::FolderAdded,
            "FR" => Self::FolderRemoved,
            "FN" => Self::FolderRenamed,
            "GD" => Self::GroupAdded,
            "GR" => Self::GroupRemoved,
            "GN" => Self::GroupRenamed,
            "WR" => Self::NetRenamed,
            "ND" => Self::NodeAdded,
            "EN" => Self::NodeEnabled,
            "NE" => Self::NodeError,
            "MV" => Self::NodeMoved,
            "RG" => Self::NodeRemovedFromGroup,
            "NR" => Self::NodeRemoved,
            "NN" => Self::NodeRenamed,
            "RV" => Self::NodeRevised,
            "PC" => Self::ParentChanged,
            "WH" => Self::PendingDeviceOp,
            "WD" => Self::ProgrammingDevice,
            "_7A" => Self::DeviceWriting,
            "_7M" => Self::DeviceMemory,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn code(&self) -> &str {
        match self {
            Self::ClearError => "CE",
            Self::FolderAdded => "FD",
            Self::FolderRemoved => "FR",
            Self::FolderRenamed => "FN",
            Self::GroupAdded => "GD",
            Self::GroupRemoved => "GR",
            Self::GroupRenamed => "GN",
            Self::NetRenamed => "WR",
            Self::NodeAdded => "ND",
            Self::NodeEnabled => "EN",
            Self::NodeError => "NE",
            Self::NodeMoved => "MV",
            Self::NodeRemovedFromGroup => "RG",
            Self::NodeRemoved => "NR",
            Self::NodeRenamed => "NN",
            Self::NodeRevised => "RV",
            Self::ParentChanged => "PC",
            Self::PendingDeviceOp => "WH",
            Self::ProgrammingDevice => "WD",
            Self::DeviceWriting => "_7A",
            Self::DeviceMemory => "_7M",
            Self::Unknown(code) => code.as_str(),
        }
    }

    pub fn description(&self) -> &str {
        match self {
            Self::ClearError => "clear error",
            Self::FolderAdded => "folder added",
            Self::FolderRemoved => "folder removed",
            Self::FolderRenamed => "folder renamed",
            Self::GroupAdded => "group added",
            Self::GroupRemoved => "group removed",
            Self::GroupRenamed => "group renamed",
            Self::NetRenamed => "network renamed",
            Self::NodeAdded => "node added",
            Self::NodeEnabled => "node enabled",
            Self::NodeError => "node error",
            Self::NodeMoved => "node moved",
            Self::NodeRemovedFromGroup => "node removed from group",
            Self::NodeRemoved => "node removed",
            Self::NodeRenamed => "node renamed",
            Self::NodeRevised => "node revised",
            Self::ParentChanged => "parent changed",
            Self::PendingDeviceOp => "pending device operation",
            Self::ProgrammingDevice => "programming device",
            Self::DeviceWriting => "device writing",
            Self::DeviceMemory => "device memory",
            Self::Unknown(code) => code.as_str(),
        }
    }

    /// `eventInfo` tags this action carries
    pub fn detail_tags(&self) -> &'static [&'static str] {
        match self {
            Self::FolderRenamed | Self::GroupRenamed | Self::NodeRenamed => &["newName"],
            Self::GroupAdded => &["groupName", "groupType"],
            Self::NodeAdded => &["nodeName", "nodeType"],
            Self::NodeEnabled => &["enabled"],
            Self::NodeMoved => &["movedNode", "linkType"],
            Self::NodeRemovedFromGroup => &["removedNode"],
            Self::ParentChanged => &["node", "nodeType", "parent", "parentType"],
            Self::DeviceWriting => &["message"],
            Self::DeviceMemory => &["memory", "cmd1", "cmd2", "value"],
            _ => &[],
        }
    }
}

impl fmt::Display for NodeChangeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// A decoded `_3` event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeChange {
    pub address: String,
    pub action: NodeChangeAction,
    /// The action's known tags that were present; every field for unknown
    /// actions
    pub detail: BTreeMap<String, String>,
}

impl NodeChange {
    /// Decode a node-changed envelope; `None` for other families or when the
    /// frame had no action
    pub fn from_envelope(envelope: &EventEnvelope) -> Option<Self> {
        if envelope.family != ControlFamily::NodeChanged {
            return None;
        }
        let action = NodeChangeAction::from_code(envelope.action.as_deref()?);

        let detail = match &action {
            NodeChangeAction::Unknown(_) => envelope.event_info.clone(),
            known => known
                .detail_tags()
                .iter()
                .filter_map(|tag| {
                    envelope
                        .event_info(tag)
                        .map(|value| (tag.to_string(), value.to_string()))
                })
                .collect(),
        };

        Some(Self {
            address: envelope.node.clone().unwrap_or_default(),
            action,
            detail,
        })
    }

    /// Value of `enabled` for node-enabled events
    pub fn enabled(&self) -> Option<bool> {
        match self.detail.get("enabled")?.as_str() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        }
    }
}
