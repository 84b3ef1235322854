//! Builders to construct schedulers from configuration.

pub mod pool_builder;

pub use pool_builder::{build_scheduler, build_scheduler_from_env, build_scheduler_from_json};
