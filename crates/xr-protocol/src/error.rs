//! Protocol error types

use thiserror::Error;

/// Errors that can occur while encoding, decoding or interpreting RPC payloads
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    /// The document is not well-formed XML
    #[error("Malformed XML: {0}")]
    Xml(String),

    /// An element appeared where another was required
    #[error("Unexpected element: expected <{expected}>, found <{found}>")]
    UnexpectedElement { expected: &'static str, found: String },

    /// A required element is absent
    #[error("Missing element <{0}>")]
    MissingElement(&'static str),

    /// A scalar could not be parsed as its declared type
    #[error("Invalid {kind} value: {value:?}")]
    InvalidValue { kind: &'static str, value: String },

    /// A `<value>` child uses a type tag this codec does not know
    #[error("Unknown value type <{0}>")]
    UnknownType(String),

    /// The server answered with an XML-RPC fault instead of a response
    #[error("XML-RPC fault {code}: {message}")]
    Fault { code: i64, message: String },

    /// Encoding a request or response failed
    #[error("Encoding error: {0}")]
    Encode(String),

    /// The response envelope has no `Status` field
    #[error("Response is missing the Status field")]
    MissingStatusField,

    /// A successful response envelope has no `Value` field
    #[error("Response is missing the Value field")]
    MissingValueField,

    /// A failed response envelope has no `ErrorDescription` field
    #[error("Error response is missing the ErrorDescription field")]
    MissingErrorDescriptionField,

    /// A value had a different shape than the caller required
    #[error("Unexpected value type: expected {expected}, found {found}")]
    UnexpectedType {
        expected: &'static str,
        found: &'static str,
    },

    /// A response lacked an opaque reference the caller needed
    #[error("No opaque reference found in {0}")]
    MissingReference(String),
}

impl From<quick_xml::Error> for ProtocolError {
    fn from(err: quick_xml::Error) -> Self {
        ProtocolError::Xml(err.to_string())
    }
}
