//! Core pool, scheduler and result-store abstractions.

pub mod error;
pub mod resource_pool;
pub mod result_store;
pub mod scheduler;
pub mod task;

pub use error::{AppResult, PoolError, ReleaseError};
pub use resource_pool::{Lease, ResourceFactory, ResourceId, ResourcePool};
pub use result_store::ResultStore;
pub use scheduler::{PoolStats, TaskScheduler, WaitSummary};
pub use task::{TaskFailure, TaskHandle, TaskId, TaskReport, TaskStatus};
