//! Session-authenticated client
//!
//! [`SessionClient`] owns the session token, the endpoint pool and the
//! transport bound to the current endpoint. Calls prepend the token, and
//! expired sessions, dropped connections and dead hosts are recovered from
//! within a bounded retry budget.

mod client;
mod retry;

pub use client::{ClientState, Hook, SessionClient};
