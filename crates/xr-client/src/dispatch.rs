//! Namespaced method dispatch
//!
//! Methods are addressed as `Namespace.method`; asynchronous variants live
//! under `Async.Namespace.method` and answer with a task reference instead
//! of the result.

use std::fmt;

use xr_core::{Connector, Reference, XapiResult};
use xr_protocol::Value;

use crate::session::SessionClient;
use crate::task::TaskRef;

macro_rules! namespaces {
    ($($variant:ident => $name:literal,)+) => {
        /// Object classes published by the management API
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub enum Namespace {
            $($variant,)+
            /// Any class not listed above, by wire name
            Other(String),
        }

        impl Namespace {
            pub fn as_str(&self) -> &str {
                match self {
                    $(Namespace::$variant => $name,)+
                    Namespace::Other(name) => name,
                }
            }
        }

        impl From<&str> for Namespace {
            fn from(name: &str) -> Self {
                match name {
                    $($name => Namespace::$variant,)+
                    other => Namespace::Other(other.to_string()),
                }
            }
        }
    };
}

namespaces! {
    Session => "session",
    Task => "task",
    Event => "event",
    Pool => "pool",
    PoolPatch => "pool_patch",
    Host => "host",
    HostCpu => "host_cpu",
    HostMetrics => "host_metrics",
    Vm => "VM",
    VmMetrics => "VM_metrics",
    VmGuestMetrics => "VM_guest_metrics",
    Vdi => "VDI",
    Vbd => "VBD",
    Vif => "VIF",
    Pif => "PIF",
    Sr => "SR",
    Pbd => "PBD",
    Network => "network",
    Console => "console",
    Message => "message",
    Secret => "secret",
    Tunnel => "tunnel",
    Vlan => "VLAN",
    Bond => "Bond",
    Crashdump => "crashdump",
    Blob => "blob",
    User => "user",
}

impl From<String> for Namespace {
    fn from(name: String) -> Self {
        Namespace::from(name.as_str())
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fully qualified method name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodName {
    pub asynchronous: bool,
    pub namespace: Namespace,
    pub method: String,
}

impl MethodName {
    pub fn new(namespace: impl Into<Namespace>, method: impl Into<String>) -> Self {
        Self {
            asynchronous: false,
            namespace: namespace.into(),
            method: method.into(),
        }
    }

    /// The `Async.` variant of a method
    pub fn asynchronous(namespace: impl Into<Namespace>, method: impl Into<String>) -> Self {
        Self {
            asynchronous: true,
            ..Self::new(namespace, method)
        }
    }
}

impl fmt::Display for MethodName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.asynchronous {
            f.write_str("Async.")?;
        }
        write!(f, "{}.{}", self.namespace, self.method)
    }
}

/// Synchronous calls within one namespace
pub struct Dispatcher<'a, C: Connector> {
    client: &'a mut SessionClient<C>,
    namespace: Namespace,
}

impl<'a, C: Connector> Dispatcher<'a, C> {
    pub(crate) fn new(client: &'a mut SessionClient<C>, namespace: Namespace) -> Self {
        Self { client, namespace }
    }

    /// Call `method` and return its result
    pub async fn call(self, method: &str, args: &[Value]) -> XapiResult<Value> {
        let name = MethodName::new(self.namespace, method);
        self.client.call(&name, args).await
    }
}

/// Asynchronous calls within one namespace
pub struct AsyncDispatcher<'a, C: Connector> {
    client: &'a mut SessionClient<C>,
    namespace: Namespace,
}

impl<'a, C: Connector> AsyncDispatcher<'a, C> {
    pub(crate) fn new(client: &'a mut SessionClient<C>, namespace: Namespace) -> Self {
        Self { client, namespace }
    }

    /// Start `method` server-side; the returned task tracks its progress
    pub async fn call(self, method: &str, args: &[Value]) -> XapiResult<TaskRef> {
        let name = MethodName::asynchronous(self.namespace, method);
        let task = self.client.call(&name, args).await?.into_string()?;
        Ok(TaskRef::new(Reference::new(task)))
    }
}
