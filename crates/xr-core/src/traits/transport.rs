//! Transport traits

use async_trait::async_trait;
use xr_protocol::Value;

use crate::error::TransportError;
use crate::types::Endpoint;

/// A binding to one endpoint that can perform a single RPC round trip
///
/// Implementations return the decoded response value as-is. Envelope
/// handling (`Status` / `Value` / `ErrorDescription`) and error
/// classification happen above this layer.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Endpoint this transport is bound to
    fn endpoint(&self) -> &Endpoint;

    /// Invoke `method` with positional `params`
    async fn call(&self, method: &str, params: &[Value]) -> Result<Value, TransportError>;
}

/// Creates transports for endpoints
///
/// Binding never touches the network; connection failures surface from the
/// first [`Transport::call`].
pub trait Connector: Send + Sync {
    /// The transport type produced by this connector
    type Transport: Transport;

    /// Bind a transport to `endpoint`
    fn bind(&self, endpoint: &Endpoint) -> Result<Self::Transport, TransportError>;
}
