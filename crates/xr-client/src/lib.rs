//! xr-client: Session client for XenAPI-style management servers
//!
//! The client logs in against one endpoint of a pool, prepends the session
//! token to every call and recovers on its own from expired sessions,
//! dropped connections and unreachable hosts. Long-running operations are
//! started through [`AsyncDispatcher`] and awaited with [`TaskPoller`].
//!
//! ```no_run
//! # async fn run() -> xr_core::XapiResult<()> {
//! use xr_client::{connect, Namespace, TaskPoller};
//! use xr_core::{ClientConfig, Credentials};
//! use xr_protocol::Value;
//!
//! let config = ClientConfig::with_endpoints(["https://xen1.example.com", "https://xen2.example.com"]);
//! let mut client = connect(&config, &Credentials::new("root", "secret")).await?;
//!
//! let task = client
//!     .async_dispatch(Namespace::Vm)
//!     .call("clone", &[Value::from("OpaqueRef:template"), Value::from("web-01")])
//!     .await?;
//! let vm = TaskPoller::from_config(&config.task)
//!     .await_completion(&mut client, task)
//!     .await?;
//!
//! client.logout().await;
//! # let _ = vm;
//! # Ok(())
//! # }
//! ```

pub mod connect;
pub mod dispatch;
pub mod session;
pub mod task;
pub mod transport;

#[cfg(test)]
mod testing;

pub use connect::{connect, scoped, with_session};
pub use dispatch::{AsyncDispatcher, Dispatcher, MethodName, Namespace};
pub use session::{ClientState, Hook, SessionClient};
pub use task::{TaskPoller, TaskRef};
pub use transport::{HttpConnector, HttpTransport};
