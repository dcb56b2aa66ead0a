//! xr-protocol: Wire protocol for xenrpc
//!
//! This crate defines the XML-RPC marshaling layer used to talk to a
//! session-authenticated management API: the dynamically typed [`Value`],
//! request/response encoding, and the `Status`/`Value`/`ErrorDescription`
//! response envelope every call returns.

pub mod codec;
pub mod envelope;
pub mod error;
pub mod value;

pub use codec::{decode_call, decode_response, encode_call, encode_fault, encode_response, MethodCall};
pub use envelope::Envelope;
pub use error::ProtocolError;
pub use value::Value;
