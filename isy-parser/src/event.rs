//! Decoding of `<Event>` frames pushed over the controller's subscription socket.
//!
//! Every frame is a small standalone XML document:
//!
//! ```xml
//! <?xml version="1.0"?>
//! <Event seqnum="12" sid="uuid:74">
//!   <control>ST</control>
//!   <action uom="100" prec="0">255</action>
//!   <node>1A 2B 3C 1</node>
//!   <eventInfo></eventInfo>
//!   <fmtAct>100%</fmtAct>
//! </Event>
//! ```
//!
//! The decoder is deliberately schema-less: only the handful of tags the
//! stream engine routes on are pulled out, and `eventInfo` is flattened into a
//! string map so consumers can pick the fields they understand.

use std::collections::BTreeMap;

use serde::Serialize;
use xmltree::{Element, XMLNode};

use crate::error::ParseResult;

/// Root attribute carrying the per-frame sequence number
pub const ATTR_SEQNUM: &str = "seqnum";
/// Root attribute carrying the stream (resync) id
pub const ATTR_STREAM_ID: &str = "sid";
/// Tag holding the control code
pub const TAG_CONTROL: &str = "control";
/// Tag holding the action value
pub const TAG_ACTION: &str = "action";
/// Tag holding the node address
pub const TAG_NODE: &str = "node";
/// Tag holding free-form event detail
pub const TAG_EVENT_INFO: &str = "eventInfo";
/// Tag holding the device-formatted action
pub const TAG_FORMATTED_ACTION: &str = "fmtAct";
/// Tag holding the device-formatted property name
pub const TAG_FORMATTED_NAME: &str = "fmtName";

/// The `<action>` element: its text plus any attributes such as `uom` or `prec`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActionValue {
    /// Trimmed text content
    pub value: String,
    /// Element attributes
    pub attributes: BTreeMap<String, String>,
}

impl ActionValue {
    /// Look up an attribute of the action element
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// Flattened `<eventInfo>` block.
///
/// Every descendant element contributes `name -> text` and each of its
/// attributes contributes `name.attribute -> value`. When a name repeats, the
/// first occurrence in document order wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EventInfo {
    /// Flattened descendant values
    pub fields: BTreeMap<String, String>,
    /// Text placed directly inside `<eventInfo>`, if any
    pub text: Option<String>,
}

impl EventInfo {
    /// Get a flattened field
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// Whether a flattened field exists (empty elements like `<on />` count)
    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// True when neither fields nor text were present
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.text.is_none()
    }

    fn from_element(element: &Element) -> Self {
        let mut fields = BTreeMap::new();
        flatten_into(element, &mut fields);
        Self {
            fields,
            text: element_text(element),
        }
    }
}

/// A decoded event frame
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EventFrame {
    /// Name of the root element (normally `Event`)
    pub root: String,
    /// `seqnum` root attribute
    pub seqnum: Option<String>,
    /// `sid` root attribute
    pub sid: Option<String>,
    /// Control code, `None` when the tag is missing or empty
    pub control: Option<String>,
    /// Action element, `None` when the tag is missing
    pub action: Option<ActionValue>,
    /// Node address, `None` when the tag is missing or empty
    pub node: Option<String>,
    /// Flattened event detail
    pub event_info: EventInfo,
    /// `fmtAct` text
    pub formatted_action: Option<String>,
    /// `fmtName` text
    pub formatted_name: Option<String>,
}

impl EventFrame {
    /// Parse one raw frame.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError`](crate::ParseError) with kind `MalformedXml` when
    /// the text is not a well-formed document.
    pub fn parse(xml: &str) -> ParseResult<Self> {
        let root = Element::parse(xml.as_bytes())?;
        Ok(Self::from_element(&root))
    }

    /// Build a frame from an already parsed root element
    pub fn from_element(root: &Element) -> Self {
        Self {
            root: root.name.clone(),
            seqnum: root.attributes.get(ATTR_SEQNUM).cloned(),
            sid: root.attributes.get(ATTR_STREAM_ID).cloned(),
            control: child_text(root, TAG_CONTROL),
            action: root.get_child(TAG_ACTION).map(|action| ActionValue {
                value: element_text(action).unwrap_or_default(),
                attributes: action
                    .attributes
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            }),
            node: child_text(root, TAG_NODE),
            event_info: root
                .get_child(TAG_EVENT_INFO)
                .map(EventInfo::from_element)
                .unwrap_or_default(),
            formatted_action: child_text(root, TAG_FORMATTED_ACTION),
            formatted_name: child_text(root, TAG_FORMATTED_NAME),
        }
    }

    /// Action text, `None` when absent or empty
    pub fn action_value(&self) -> Option<&str> {
        self.action
            .as_ref()
            .map(|a| a.value.as_str())
            .filter(|v| !v.is_empty())
    }
}

fn child_text(parent: &Element, name: &str) -> Option<String> {
    parent.get_child(name).and_then(element_text)
}

fn element_text(element: &Element) -> Option<String> {
    element
        .get_text()
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

fn flatten_into(element: &Element, fields: &mut BTreeMap<String, String>) {
    for node in &element.children {
        let XMLNode::Element(child) = node else {
            continue;
        };
        for (attr, value) in &child.attributes {
            fields
                .entry(format!("{}.{}", child.name, attr))
                .or_insert_with(|| value.clone());
        }
        fields
            .entry(child.name.clone())
            .or_insert_with(|| element_text(child).unwrap_or_default());
        flatten_into(child, fields);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ParseErrorKind;

    #[test]
    fn test_parse_heartbeat() {
        let frame = EventFrame::parse(
            r#"<?xml version="1.0"?><Event seqnum="0" sid="uuid:46"><control>_0</control><action>120</action><node></node><eventInfo></eventInfo></Event>"#,
        )
        .unwrap();

        assert_eq!(frame.root, "Event");
        assert_eq!(frame.seqnum.as_deref(), Some("0"));
        assert_eq!(frame.sid.as_deref(), Some("uuid:46"));
        assert_eq!(frame.control.as_deref(), Some("_0"));
        assert_eq!(frame.action_value(), Some("120"));
        assert_eq!(frame.node, None);
        assert!(frame.event_info.is_empty());
    }

    #[test]
    fn test_action_attributes() {
        let frame = EventFrame::parse(
            r#"<Event seqnum="9"><control>ST</control><action uom="100" prec="0">255</action><node>1A 2B 3C 1</node><eventInfo></eventInfo><fmtAct>100%</fmtAct><fmtName>Status</fmtName></Event>"#,
        )
        .unwrap();

        let action = frame.action.as_ref().unwrap();
        assert_eq!(action.value, "255");
        assert_eq!(action.attribute("uom"), Some("100"));
        assert_eq!(action.attribute("prec"), Some("0"));
        assert_eq!(frame.node.as_deref(), Some("1A 2B 3C 1"));
        assert_eq!(frame.formatted_action.as_deref(), Some("100%"));
        assert_eq!(frame.formatted_name.as_deref(), Some("Status"));
        assert_eq!(frame.sid, None);
    }

    #[test]
    fn test_event_info_flattening() {
        let frame = EventFrame::parse(
            r#"<Event><control>_1</control><action>6</action><node></node><eventInfo><var type="2" id="7"><val>42</val><ts>20240101 10:00:00</ts></var></eventInfo></Event>"#,
        )
        .unwrap();

        let info = &frame.event_info;
        assert_eq!(info.get("var.type"), Some("2"));
        assert_eq!(info.get("var.id"), Some("7"));
        assert_eq!(info.get("val"), Some("42"));
        assert_eq!(info.get("ts"), Some("20240101 10:00:00"));
        assert_eq!(info.get("var"), Some(""));
        assert_eq!(info.text, None);
    }

    #[test]
    fn test_empty_elements_are_recorded() {
        let frame = EventFrame::parse(
            r#"<Event><control>_1</control><action>0</action><eventInfo><id>1A</id><on /><rr /><s>21</s></eventInfo></Event>"#,
        )
        .unwrap();

        assert!(frame.event_info.contains("on"));
        assert!(frame.event_info.contains("rr"));
        assert!(!frame.event_info.contains("off"));
        assert_eq!(frame.event_info.get("id"), Some("1A"));
    }

    #[test]
    fn test_event_info_text() {
        let frame = EventFrame::parse(
            r#"<Event><control>_7</control><action>1</action><node></node><eventInfo>[  1 2 3 1] Memory : Write dbAddr=0x0264 [FF] cmd1=0x2E cmd2=0x00</eventInfo></Event>"#,
        )
        .unwrap();

        assert_eq!(
            frame.event_info.text.as_deref(),
            Some("[  1 2 3 1] Memory : Write dbAddr=0x0264 [FF] cmd1=0x2E cmd2=0x00")
        );
    }

    #[test]
    fn test_missing_control() {
        let frame = EventFrame::parse("<Event><action>1</action></Event>").unwrap();
        assert_eq!(frame.control, None);
        assert_eq!(frame.action_value(), Some("1"));
    }

    #[test]
    fn test_malformed_xml() {
        let err = EventFrame::parse("<Event><control>_0</control>").unwrap_err();
        assert_eq!(err.kind(), ParseErrorKind::MalformedXml);

        let err = EventFrame::parse("<Event><control>_0</action></Event>").unwrap_err();
        assert_eq!(err.kind(), ParseErrorKind::MalformedXml);
    }
}
