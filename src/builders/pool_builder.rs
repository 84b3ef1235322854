//! Builders to construct a task scheduler from configuration.

use crate::config::SchedulerConfig;
use crate::core::{PoolError, ResourceFactory, TaskScheduler};

/// Build a scheduler from an already parsed configuration.
///
/// # Errors
///
/// Returns `PoolError::InvalidConfig` for an invalid configuration, and any
/// error [`TaskScheduler::new`] reports.
pub fn build_scheduler<R, T, F>(
    cfg: &SchedulerConfig,
    factory: &F,
) -> Result<TaskScheduler<R, T>, PoolError>
where
    R: Send + 'static,
    T: Send + 'static,
    F: ResourceFactory<R> + ?Sized,
{
    cfg.validate()
        .map_err(|e| PoolError::InvalidConfig(format!("config invalid: {e}")))?;
    tracing::debug!(max_workers = cfg.resolved_max_workers(), "building scheduler from config");
    TaskScheduler::new(cfg.clone(), factory)
}

/// Parse a JSON configuration and build a scheduler from it.
///
/// # Errors
///
/// Returns `PoolError::InvalidConfig` if the JSON does not parse or validate.
pub fn build_scheduler_from_json<R, T, F>(
    json: &str,
    factory: &F,
) -> Result<TaskScheduler<R, T>, PoolError>
where
    R: Send + 'static,
    T: Send + 'static,
    F: ResourceFactory<R> + ?Sized,
{
    let cfg = SchedulerConfig::from_json_str(json).map_err(PoolError::InvalidConfig)?;
    build_scheduler(&cfg, factory)
}

/// Read configuration from the environment (and `.env`) and build a scheduler.
///
/// # Errors
///
/// Returns `PoolError::InvalidConfig` if a variable is malformed.
pub fn build_scheduler_from_env<R, T, F>(factory: &F) -> Result<TaskScheduler<R, T>, PoolError>
where
    R: Send + 'static,
    T: Send + 'static,
    F: ResourceFactory<R> + ?Sized,
{
    let cfg = SchedulerConfig::from_env().map_err(PoolError::InvalidConfig)?;
    build_scheduler(&cfg, factory)
}
