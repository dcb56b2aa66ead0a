//! Polling tasks to completion

use std::time::Duration;

use tokio::time::{sleep, Instant};

use xr_core::config::TaskConfig;
use xr_core::{Connector, Reference, TaskStatus, XapiError, XapiResult};

use super::TaskRef;
use crate::session::SessionClient;

/// Waits for server-side tasks to leave the `pending` state
#[derive(Debug, Clone)]
pub struct TaskPoller {
    /// Delay between status checks
    pub poll_interval: Duration,
    /// Give up after this long; `None` waits indefinitely
    pub deadline: Option<Duration>,
    /// Destroy tasks that end in failure
    pub destroy_on_failure: bool,
}

impl TaskPoller {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            ..Default::default()
        }
    }

    pub fn from_config(config: &TaskConfig) -> Self {
        Self {
            poll_interval: config.poll_interval,
            deadline: config.deadline,
            destroy_on_failure: config.destroy_on_failure,
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Leave failed tasks on the server for inspection
    pub fn keep_failed_tasks(mut self) -> Self {
        self.destroy_on_failure = false;
        self
    }

    /// Poll until the task is no longer pending and return its final status
    ///
    /// Fails with [`XapiError::TaskTimeout`] once the deadline passes. The
    /// task itself keeps running on the server.
    pub async fn wait<C: Connector>(
        &self,
        client: &mut SessionClient<C>,
        task: &TaskRef,
    ) -> XapiResult<TaskStatus> {
        let started = Instant::now();

        loop {
            let status = task.get_status(client).await?;
            if !status.is_pending() {
                tracing::debug!("Task {} finished with status {}", task, status);
                return Ok(status);
            }

            match task.get_progress(client).await {
                Ok(progress) => {
                    tracing::trace!("Task {} pending ({:.0}%)", task, progress * 100.0)
                }
                Err(e) => tracing::debug!("Could not read progress of task {}: {}", task, e),
            }

            if let Some(deadline) = self.deadline {
                let waited = started.elapsed();
                if waited >= deadline {
                    tracing::warn!("Gave up on task {} after {:?}", task, waited);
                    return Err(XapiError::TaskTimeout {
                        task: task.to_string(),
                        waited,
                    });
                }
            }

            sleep(self.poll_interval).await;
        }
    }

    /// Wait for the task, then return the object reference it produced
    ///
    /// The task is destroyed once its result has been read, even when reading
    /// it failed. A task that ends
    /// in any other state yields [`XapiError::TaskFailed`] carrying the
    /// server's error info; it is destroyed too unless
    /// [`keep_failed_tasks`](Self::keep_failed_tasks) was set. Results
    /// without a reference yield the null reference.
    pub async fn await_completion<C: Connector>(
        &self,
        client: &mut SessionClient<C>,
        task: TaskRef,
    ) -> XapiResult<Reference> {
        let status = self.wait(client, &task).await?;

        if status == TaskStatus::Success {
            let result = task.get_result(client).await;
            destroy_quietly(client, task).await;

            let result = result?;
            return Ok(Reference::extract(&result).unwrap_or_else(|| {
                tracing::debug!("Task result carries no reference: {:?}", result);
                Reference::new(Reference::NULL)
            }));
        }

        let error_info = task.get_error_info(client).await;
        let name = task.to_string();
        if self.destroy_on_failure {
            destroy_quietly(client, task).await;
        }

        Err(XapiError::TaskFailed {
            task: name,
            status,
            error_info: error_info?,
        })
    }
}

impl Default for TaskPoller {
    fn default() -> Self {
        Self::from_config(&TaskConfig::default())
    }
}

/// Destroy a finished task; failures are logged, never returned
async fn destroy_quietly<C: Connector>(client: &mut SessionClient<C>, task: TaskRef) {
    let name = task.to_string();
    if let Err(e) = task.destroy(client).await {
        tracing::warn!("Failed to destroy task {}: {}", name, e);
    }
}
