//! Core error types for xenrpc

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use xr_protocol::ProtocolError;

use crate::api_error::{ApiError, ErrorKind};
use crate::types::TaskStatus;

/// Result alias used throughout the client
pub type XapiResult<T> = Result<T, XapiError>;

/// Top-level error type for xenrpc
#[derive(Error, Debug)]
pub enum XapiError {
    /// Network-level failure talking to an endpoint
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The server broke the RPC contract (malformed XML, missing envelope fields)
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Classified application error returned by the server
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Re-authentication was needed but no login was ever performed
    #[error("Login required: no credentials on record")]
    LoginRequired,

    /// Every endpoint of the pool was tried and failed
    #[error("No server reachable, tried: {}", .tried.join(", "))]
    NoHostsAvailable { tried: Vec<String> },

    /// An asynchronous task ended in a non-success state
    #[error("Task {task} ended with status {status}: {}", .error_info.join(", "))]
    TaskFailed {
        task: String,
        status: TaskStatus,
        error_info: Vec<String>,
    },

    /// Polling gave up before the task finished; the task keeps running
    #[error("Task {task} still pending after {waited:?}")]
    TaskTimeout { task: String, waited: Duration },
}

impl XapiError {
    /// The classified application error, if this is one
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            XapiError::Api(e) => Some(e),
            _ => None,
        }
    }

    /// Whether the server reported the session as expired
    pub fn is_session_invalid(&self) -> bool {
        self.api_error()
            .is_some_and(|e| e.kind == ErrorKind::SessionInvalid)
    }

    /// Whether this is a configuration-class error that must never be retried
    pub fn is_fatal_config(&self) -> bool {
        matches!(self, XapiError::LoginRequired | XapiError::Config(_))
    }
}

/// Kinds of transient failure that earn one retry against the same endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    Timeout,
    EndOfStream,
    BrokenPipe,
}

/// Transport-level failures
#[derive(Error, Debug)]
pub enum TransportError {
    /// Connect or read timed out
    #[error("Request timed out")]
    Timeout,

    /// The endpoint actively refused the connection
    #[error("Connection refused: {0}")]
    ConnectionRefused(String),

    /// Writing to the connection failed
    #[error("Broken pipe")]
    BrokenPipe,

    /// The connection closed before a full response arrived
    #[error("Connection closed before the response completed")]
    EndOfStream,

    /// No route to the endpoint (includes name resolution failures)
    #[error("Host unreachable: {0}")]
    HostUnreachable(String),

    /// The server answered with a non-success HTTP status
    #[error("HTTP status {0}")]
    Status(u16),

    /// Any other request failure
    #[error("Request failed: {0}")]
    Request(String),

    /// The response body could not be decoded
    #[error("Undecodable response: {0}")]
    Decode(#[from] ProtocolError),
}

impl TransportError {
    /// Failures worth one retry on the same endpoint before reconnecting
    pub fn retry_class(&self) -> Option<RetryClass> {
        match self {
            TransportError::Timeout => Some(RetryClass::Timeout),
            TransportError::EndOfStream => Some(RetryClass::EndOfStream),
            TransportError::BrokenPipe => Some(RetryClass::BrokenPipe),
            _ => None,
        }
    }

    /// Failures that go straight to reconnection
    pub fn is_unreachable(&self) -> bool {
        matches!(
            self,
            TransportError::HostUnreachable(_) | TransportError::ConnectionRefused(_)
        )
    }
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// Endpoint URI could not be used
    #[error("Invalid endpoint {uri:?}: {reason}")]
    InvalidEndpoint { uri: String, reason: String },

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Missing required field
    #[error("Missing required field: {0}")]
    MissingField(String),
}
