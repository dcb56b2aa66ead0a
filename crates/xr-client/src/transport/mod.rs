//! Transport adapters
//!
//! A transport is bound to exactly one endpoint. Rebinding after a failure
//! (or after a `HOST_IS_SLAVE` redirect) means asking the connector for a
//! fresh one.

mod http;

pub use http::{HttpConnector, HttpTransport};
