//! Configuration models for the scheduler.

pub mod pool;

pub use pool::{SchedulerConfig, DEFAULT_MAX_WORKERS, DEFAULT_STACK_SIZE, MIN_STACK_SIZE};
