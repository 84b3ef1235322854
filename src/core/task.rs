//! Task contract between user code and the scheduler.
//!
//! A task body receives exactly one [`Lease`] plus its caller-supplied
//! arguments and must hand the same lease back together with its result:
//!
//! ```rust,ignore
//! fn get_title(browser: Lease<Browser>, url: String) -> (Lease<Browser>, AppResult<String>) {
//!     let title = browser.navigate(&url).and_then(|page| page.title());
//!     (browser, title)
//! }
//! ```

use std::any::Any;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::error::AppResult;
use super::resource_pool::{Lease, ResourceId};

/// Identifier assigned to each submitted task, in submission order.
pub type TaskId = u64;

/// Type-erased task body with its arguments already bound.
pub(crate) type TaskBody<R, T> = Box<dyn FnOnce(Lease<R>) -> (Lease<R>, AppResult<T>) + Send + 'static>;

/// Why a task did not produce a value.
#[derive(Debug, Error)]
pub enum TaskFailure {
    /// The task body returned an error.
    #[error("task failed: {0:#}")]
    Errored(anyhow::Error),
    /// The task body panicked.
    #[error("task panicked: {0}")]
    Panicked(String),
    /// The task body returned a lease other than the one it was given.
    ///
    /// If the body kept its own lease, that resource is unavailable to later
    /// tasks until the lease is dropped; it is counted in
    /// `PoolStats::missing_resources` meanwhile.
    #[error("task returned lease {returned} instead of {expected}")]
    LeaseMismatch {
        /// Lease handed to the task.
        expected: ResourceId,
        /// Lease the task gave back.
        returned: ResourceId,
    },
}

/// Lifecycle state of a submitted task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Submitted, not yet finished.
    Pending,
    /// Finished with a value.
    Succeeded,
    /// Finished with a [`TaskFailure`].
    Failed,
}

/// Completion record of one task, as stored in the result store.
#[derive(Debug)]
pub struct TaskReport<T> {
    /// Task identifier returned by `submit`.
    pub task_id: TaskId,
    /// Resource the task ran against.
    pub resource: ResourceId,
    /// Worker thread that ran the task.
    pub worker_id: usize,
    /// Value or failure.
    pub outcome: Result<T, TaskFailure>,
}

impl<T> TaskReport<T> {
    /// Whether the task produced a value.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Status derived from the outcome.
    #[must_use]
    pub const fn status(&self) -> TaskStatus {
        if self.outcome.is_ok() {
            TaskStatus::Succeeded
        } else {
            TaskStatus::Failed
        }
    }

    /// Discard the bookkeeping and keep the outcome.
    ///
    /// # Errors
    ///
    /// Returns the task's failure if it did not succeed.
    pub fn into_result(self) -> Result<T, TaskFailure> {
        self.outcome
    }
}

/// Lightweight view of a tracked task, returned by `wait_all`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskHandle {
    /// Task identifier.
    pub id: TaskId,
    /// State at the time the handle was taken.
    pub status: TaskStatus,
}

/// Extract a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
