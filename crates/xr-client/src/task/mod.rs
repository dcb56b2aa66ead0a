//! Server-side tasks
//!
//! Asynchronous calls return a task handle. [`TaskPoller`] waits for the
//! task to finish, extracts the object reference from its result and
//! destroys the task.

mod poller;

pub use poller::TaskPoller;

use std::fmt;

use xr_core::{Connector, Reference, TaskStatus, XapiResult};
use xr_protocol::{ProtocolError, Value};

use crate::dispatch::Namespace;
use crate::session::SessionClient;

/// Handle to a server-side task
///
/// Not `Clone`: [`TaskRef::destroy`] consumes the handle, so a destroyed
/// task cannot be polled or destroyed again.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct TaskRef(Reference);

impl TaskRef {
    pub fn new(reference: Reference) -> Self {
        Self(reference)
    }

    pub fn reference(&self) -> &Reference {
        &self.0
    }

    pub fn into_reference(self) -> Reference {
        self.0
    }

    pub async fn get_status<C: Connector>(
        &self,
        client: &mut SessionClient<C>,
    ) -> XapiResult<TaskStatus> {
        let status = self.invoke(client, "get_status").await?.into_string()?;
        Ok(TaskStatus::parse(&status))
    }

    /// Completion fraction between 0 and 1
    pub async fn get_progress<C: Connector>(
        &self,
        client: &mut SessionClient<C>,
    ) -> XapiResult<f64> {
        let value = self.invoke(client, "get_progress").await?;
        let progress = value.as_f64().ok_or(ProtocolError::UnexpectedType {
            expected: "double",
            found: value.type_name(),
        })?;
        Ok(progress)
    }

    /// Raw result text of a successful task
    pub async fn get_result<C: Connector>(
        &self,
        client: &mut SessionClient<C>,
    ) -> XapiResult<String> {
        Ok(self.invoke(client, "get_result").await?.into_string()?)
    }

    /// Error description of a failed task, exactly as the server reports it
    pub async fn get_error_info<C: Connector>(
        &self,
        client: &mut SessionClient<C>,
    ) -> XapiResult<Vec<String>> {
        Ok(self.invoke(client, "get_error_info").await?.into_string_list()?)
    }

    pub async fn destroy<C: Connector>(self, client: &mut SessionClient<C>) -> XapiResult<()> {
        self.invoke(client, "destroy").await?;
        Ok(())
    }

    async fn invoke<C: Connector>(
        &self,
        client: &mut SessionClient<C>,
        method: &str,
    ) -> XapiResult<Value> {
        client
            .dispatch(Namespace::Task)
            .call(method, &[Value::from(self.0.as_str())])
            .await
    }
}

impl fmt::Display for TaskRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl From<Reference> for TaskRef {
    fn from(reference: Reference) -> Self {
        Self(reference)
    }
}
