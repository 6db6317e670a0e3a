//! `_5` system status events

use std::fmt;

use serde::Serialize;

use crate::envelope::{ControlFamily, EventEnvelope};

/// Busy state of the controller
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum SystemStatus {
    NotBusy,
    Busy,
    Idle,
    SafeMode,
    Unknown(String),
}

impl SystemStatus {
    pub fn from_code(code: &str) -> Self {
        match code {
            "0" => Self::NotBusy,
            "1" => Self::Busy,
            "2" => Self::Idle,
            "3" => Self::SafeMode,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn from_envelope(envelope: &EventEnvelope) -> Option<Self> {
        if envelope.family != ControlFamily::SystemStatusChanged {
            return None;
        }
        envelope.action.as_deref().map(Self::from_code)
    }

    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Busy)
    }
}

impl fmt::Display for SystemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotBusy => write!(f, "not busy"),
            Self::Busy => write!(f, "busy"),
            Self::Idle => write!(f, "idle"),
            Self::SafeMode => write!(f, "safe mode"),
            Self::Unknown(code) => write!(f, "unknown ({code})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::classify;

    #[test]
    fn test_from_envelope() {
        let envelope =
            classify("<Event><control>_5</control><action>1</action><node></node></Event>").unwrap();
        let status = SystemStatus::from_envelope(&envelope).unwrap();
        assert_eq!(status, SystemStatus::Busy);
        assert!(status.is_busy());
    }

    #[test]
    fn test_unknown_code() {
        assert_eq!(SystemStatus::from_code("9").to_string(), "unknown (9)");
        assert_eq!(SystemStatus::from_code("3"), SystemStatus::SafeMode);
    }
}
