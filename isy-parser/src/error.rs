//! Error types for event frame decoding

use std::fmt;

use thiserror::Error;

/// Category of a frame decoding failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParseErrorKind {
    /// The frame is not a well-formed XML document
    MalformedXml,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseErrorKind::MalformedXml => f.write_str("malformed XML"),
        }
    }
}

/// Error returned when a raw frame cannot be decoded
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct ParseError {
    kind: ParseErrorKind,
    message: String,
}

impl ParseError {
    /// Create a malformed-XML error with the underlying parser message
    pub fn malformed(message: impl Into<String>) -> Self {
        Self {
            kind: ParseErrorKind::MalformedXml,
            message: message.into(),
        }
    }

    /// The failure category
    pub fn kind(&self) -> ParseErrorKind {
        self.kind
    }

    /// Detail reported by the XML parser
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<xmltree::ParseError> for ParseError {
    fn from(err: xmltree::ParseError) -> Self {
        ParseError::malformed(err.to_string())
    }
}

/// Result type alias for frame decoding
pub type ParseResult<T> = Result<T, ParseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_display() {
        let err = ParseError::malformed("unexpected end of stream");
        assert_eq!(err.kind(), ParseErrorKind::MalformedXml);
        assert_eq!(err.to_string(), "malformed XML: unexpected end of stream");
    }
}
