//! RPC response envelope
//!
//! Every API call answers with a struct carrying a `Status` field and either
//! a `Value` (on `"Success"`) or an `ErrorDescription` list whose first
//! element is the error code.

use crate::error::ProtocolError;
use crate::value::Value;

/// Status string of a successful call
pub const STATUS_SUCCESS: &str = "Success";

/// Status string used when encoding failures
pub const STATUS_FAILURE: &str = "Failure";

/// A validated response envelope
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    /// The call succeeded with this value
    Success(Value),
    /// The call failed; first element is the error code, the rest are parameters
    Failure(Vec<String>),
}

impl Envelope {
    /// Validate a decoded response value
    ///
    /// Missing fields are protocol violations, never application errors.
    pub fn from_response(response: Value) -> Result<Self, ProtocolError> {
        let mut members = match response {
            Value::Struct(members) => members,
            _ => return Err(ProtocolError::MissingStatusField),
        };

        let status = members
            .remove("Status")
            .ok_or(ProtocolError::MissingStatusField)?;

        if status.as_str() == Some(STATUS_SUCCESS) {
            let value = members
                .remove("Value")
                .ok_or(ProtocolError::MissingValueField)?;
            return Ok(Envelope::Success(value));
        }

        let description = members
            .remove("ErrorDescription")
            .ok_or(ProtocolError::MissingErrorDescriptionField)?;
        Ok(Envelope::Failure(description.into_string_list()?))
    }

    /// Build the response struct for this envelope
    pub fn into_value(self) -> Value {
        match self {
            Envelope::Success(value) => Value::structure([
                ("Status", Value::from(STATUS_SUCCESS)),
                ("Value", value),
            ]),
            Envelope::Failure(description) => Value::structure([
                ("Status", Value::from(STATUS_FAILURE)),
                (
                    "ErrorDescription",
                    Value::Array(description.into_iter().map(Value::String).collect()),
                ),
            ]),
        }
    }

    /// Shorthand for a failure envelope from string slices
    pub fn failure<I, S>(description: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Envelope::Failure(description.into_iter().map(Into::into).collect())
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Envelope::Success(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_envelope() {
        let response = Envelope::Success(Value::from("OpaqueRef:1")).into_value();
        let envelope = Envelope::from_response(response).unwrap();
        assert_eq!(envelope, Envelope::Success(Value::from("OpaqueRef:1")));
        assert!(envelope.is_success());
    }

    #[test]
    fn test_failure_envelope_keeps_order() {
        let response = Envelope::failure(["HOST_IS_SLAVE", "10.0.0.1"]).into_value();
        assert_eq!(
            Envelope::from_response(response).unwrap(),
            Envelope::Failure(vec!["HOST_IS_SLAVE".into(), "10.0.0.1".into()])
        );
    }

    #[test]
    fn test_missing_status() {
        let response = Value::structure([("Value", Value::from("x"))]);
        assert_eq!(
            Envelope::from_response(response),
            Err(ProtocolError::MissingStatusField)
        );
        assert_eq!(
            Envelope::from_response(Value::from("bare string")),
            Err(ProtocolError::MissingStatusField)
        );
    }

    #[test]
    fn test_missing_value_on_success() {
        let response = Value::structure([("Status", Value::from("Success"))]);
        assert_eq!(
            Envelope::from_response(response),
            Err(ProtocolError::MissingValueField)
        );
    }

    #[test]
    fn test_missing_error_description_on_failure() {
        let response = Value::structure([("Status", Value::from("Failure"))]);
        assert_eq!(
            Envelope::from_response(response),
            Err(ProtocolError::MissingErrorDescriptionField)
        );
    }
}
