//! Frame classification and routing
//!
//! [`classify`] decodes a raw frame into an [`EventEnvelope`]; [`route`] then
//! decides what the engine does with it. Both are pure so the precedence rules
//! can be exercised without a socket.
//!
//! Routing is a two-level decode. The control code picks a broad family, and
//! the `_1` trigger family is multiplexed a second time on the *shape* of the
//! payload, checked in this order:
//!
//! 1. a `<var` tag: variable update
//! 2. an `<id>` tag: program update
//! 3. a `<node>` tag together with `[`: a repeated node update, discarded
//! 4. an `<action>` tag: program key handling (see [`ACTION_KEY`])
//!
//! Rule 3 mirrors what current firmware emits and is not part of any
//! published protocol; newer firmware may need it revisited.

use std::time::Duration;

use isy_parser::{EventFrame, ParseError};

use crate::envelope::{ControlCode, EventEnvelope};
use crate::types::Topic;

/// `_1` action carrying the program key in `eventInfo`
pub const ACTION_KEY: &str = "6";
/// `_1` action announcing a new program key in `node`
pub const ACTION_KEY_CHANGED: &str = "7";

const MARKER_VARIABLE: &str = "<var";
const MARKER_PROGRAM_ID: &str = "<id>";
const MARKER_NODE: &str = "<node>";
const MARKER_ACTION: &str = "<action>";

/// What the engine should do with a classified frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Liveness frame; `interval` is the server-assigned heartbeat period, if
    /// the action carried a valid one
    Heartbeat { interval: Option<Duration> },
    /// Hand the envelope to the consumers of a topic
    Publish(Topic),
    /// Remember the program key and stop
    CacheProgramKey(String),
    /// Ask the program collection to reload, optionally after caching a new key
    RefreshPrograms { program_key: Option<String> },
    /// Drop the frame
    Discard(DiscardReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// The frame had no control value
    NoControl,
    /// Control code this engine does not know
    UnknownControl,
    /// `_1` frame repeating a node update
    DuplicateNodeUpdate,
    /// `_1` frame with none of the known markers
    EmptyTrigger,
}

/// Decode one raw frame.
///
/// # Errors
///
/// Returns a `MalformedXml` [`ParseError`] when the frame is not well formed.
pub fn classify(raw: &str) -> Result<EventEnvelope, ParseError> {
    let frame = EventFrame::parse(raw)?;
    Ok(EventEnvelope::from_frame(frame, raw))
}

/// Decide what to do with a classified envelope
pub fn route(envelope: &EventEnvelope) -> Route {
    let Some(code) = envelope.control() else {
        return Route::Discard(DiscardReason::NoControl);
    };

    match code {
        ControlCode::Heartbeat => Route::Heartbeat {
            interval: heartbeat_interval(envelope.action.as_deref()),
        },
        ControlCode::Status => Route::Publish(Topic::NodeStatus),
        ControlCode::Property(_) => Route::Publish(Topic::NodeControl),
        ControlCode::Trigger => route_trigger(envelope),
        ControlCode::NodeChanged => Route::Publish(Topic::NodeChanged),
        ControlCode::SystemStatus => Route::Publish(Topic::SystemStatus),
        ControlCode::Progress => Route::Publish(Topic::ProgressReport),
        ControlCode::Other(_) => Route::Discard(DiscardReason::UnknownControl),
    }
}

fn route_trigger(envelope: &EventEnvelope) -> Route {
    let raw = envelope.raw.as_str();

    if raw.contains(MARKER_VARIABLE) {
        return Route::Publish(Topic::VariableUpdate);
    }
    if raw.contains(MARKER_PROGRAM_ID) {
        return Route::Publish(Topic::ProgramUpdate);
    }
    if raw.contains(MARKER_NODE) && raw.contains('[') {
        return Route::Discard(DiscardReason::DuplicateNodeUpdate);
    }
    if !raw.contains(MARKER_ACTION) {
        return Route::Discard(DiscardReason::EmptyTrigger);
    }

    match envelope.action.as_deref() {
        Some(ACTION_KEY) => {
            Route::CacheProgramKey(envelope.event_info_text.clone().unwrap_or_default())
        }
        Some(ACTION_KEY_CHANGED) => Route::RefreshPrograms {
            program_key: Some(envelope.node.clone().unwrap_or_default()),
        },
        _ => Route::RefreshPrograms { program_key: None },
    }
}

/// Whole positive seconds from a heartbeat action
fn heartbeat_interval(action: Option<&str>) -> Option<Duration> {
    action
        .and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use isy_parser::ParseErrorKind;
    use rstest::rstest;

    fn routed(raw: &str) -> Route {
        route(&classify(raw).unwrap())
    }

    #[rstest]
    #[case("30", Some(Duration::from_secs(30)))]
    #[case("45", Some(Duration::from_secs(45)))]
    #[case("0", None)]
    #[case("-5", None)]
    #[case("abc", None)]
    #[case("", None)]
    fn test_heartbeat_interval(#[case] action: &str, #[case] expected: Option<Duration>) {
        let raw = format!("<Event><control>_0</control><action>{action}</action></Event>");
        assert_eq!(routed(&raw), Route::Heartbeat { interval: expected });
    }

    #[rstest]
    #[case("<Event><control>ST</control><action>0</action><node>1 2 3 1</node></Event>", Topic::NodeStatus)]
    #[case("<Event><control>ST</control><action>0</action><node>1 2 3 1</node><eventInfo><var /></eventInfo></Event>", Topic::NodeStatus)]
    #[case("<Event><control>DON</control><action>255</action><node>1 2 3 1</node></Event>", Topic::NodeControl)]
    #[case("<Event><control>_3</control><action>NN</action><node>1 2 3 1</node></Event>", Topic::NodeChanged)]
    #[case("<Event><control>_5</control><action>1</action><node></node></Event>", Topic::SystemStatus)]
    #[case("<Event><control>_7</control><action>1</action><node></node></Event>", Topic::ProgressReport)]
    fn test_publish_routes(#[case] raw: &str, #[case] topic: Topic) {
        assert_eq!(routed(raw), Route::Publish(topic));
    }

    #[test]
    fn test_variable_marker_has_priority() {
        let raw = r#"<Event><control>_1</control><action>6</action><node></node><eventInfo><var type="2" id="3"><val>1</val></var><id>00A1</id></eventInfo></Event>"#;
        assert_eq!(routed(raw), Route::Publish(Topic::VariableUpdate));
    }

    #[test]
    fn test_program_update() {
        let raw = r#"<Event><control>_1</control><action>0</action><node></node><eventInfo><id>1F</id><status>21</status><on /></eventInfo></Event>"#;
        assert_eq!(routed(raw), Route::Publish(Topic::ProgramUpdate));
    }

    #[test]
    fn test_duplicate_node_update_discarded() {
        let raw = r#"<Event><control>_1</control><action>3</action><node>1 2 3 1</node><eventInfo>[  1 2 3 1]   ST 255</eventInfo></Event>"#;
        assert_eq!(routed(raw), Route::Discard(DiscardReason::DuplicateNodeUpdate));
    }

    #[test]
    fn test_program_key_cached() {
        let raw = r#"<Event><control>_1</control><action>6</action><node></node><eventInfo>0A1B2C</eventInfo></Event>"#;
        assert_eq!(routed(raw), Route::CacheProgramKey("0A1B2C".to_string()));
    }

    #[test]
    fn test_program_key_changed_refreshes() {
        let raw = r#"<Event><control>_1</control><action>7</action><node>0D0E0F</node><eventInfo></eventInfo></Event>"#;
        assert_eq!(
            routed(raw),
            Route::RefreshPrograms {
                program_key: Some("0D0E0F".to_string())
            }
        );
    }

    #[test]
    fn test_other_trigger_action_refreshes() {
        let raw = r#"<Event><control>_1</control><action>2</action><eventInfo></eventInfo></Event>"#;
        assert_eq!(routed(raw), Route::RefreshPrograms { program_key: None });
    }

    #[test]
    fn test_trigger_without_markers() {
        assert_eq!(
            routed("<Event><control>_1</control></Event>"),
            Route::Discard(DiscardReason::EmptyTrigger)
        );
    }

    #[rstest]
    #[case("<Event><control>_2</control><action>1</action></Event>", DiscardReason::UnknownControl)]
    #[case("<Event><control>_19</control></Event>", DiscardReason::UnknownControl)]
    #[case("<Event><action>1</action></Event>", DiscardReason::NoControl)]
    #[case("<Event><control></control></Event>", DiscardReason::NoControl)]
    fn test_discarded(#[case] raw: &str, #[case] reason: DiscardReason) {
        assert_eq!(routed(raw), Route::Discard(reason));
    }

    #[test]
    fn test_malformed_frame_is_recoverable() {
        let err = classify("<Event><control>_0</control>").unwrap_err();
        assert_eq!(err.kind(), ParseErrorKind::MalformedXml);
    }
}
