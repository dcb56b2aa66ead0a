//! xr-core: Core abstractions and configuration for xenrpc
//!
//! This crate provides the shared types, the error taxonomy (including the
//! classifier that maps protocol error codes to [`ErrorKind`]s), client
//! configuration, and the transport traits the session client is built on.

pub mod api_error;
pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use api_error::{ApiError, ErrorKind};
pub use error::{ConfigError, RetryClass, TransportError, XapiError, XapiResult};
pub use types::{Credentials, Endpoint, EndpointPool, LoginMethod, Reference, TaskStatus};
pub use config::{ClientConfig, RetryConfig, TaskConfig, TlsVerify};
pub use traits::{Connector, Transport};
