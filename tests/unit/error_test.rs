//! Tests for error types

use prometheus_lease_pool::core::{AppResult, PoolError, ResourcePool, TaskFailure};
use std::error::Error;

#[test]
fn test_invalid_config_error() {
    let err = PoolError::InvalidConfig("size must be positive".to_string());
    assert_eq!(format!("{}", err), "invalid configuration: size must be positive");
}

#[test]
fn test_timeout_error() {
    assert_eq!(format!("{}", PoolError::Timeout), "operation timed out");
}

#[test]
fn test_shutdown_error() {
    assert_eq!(format!("{}", PoolError::PoolShutdown), "pool has been shut down");
}

#[test]
fn test_provisioning_error_keeps_source() {
    let err = PoolError::Provisioning {
        index: 2,
        source: "driver crashed".into(),
    };
    assert_eq!(format!("{}", err), "failed to provision resource 2");
    assert_eq!(err.source().unwrap().to_string(), "driver crashed");
}

#[test]
fn test_release_error_display_and_source() {
    let pool = ResourcePool::new(1, &|i: usize| -> AppResult<usize> { Ok(i) }).unwrap();
    let other = ResourcePool::new(1, &|i: usize| -> AppResult<usize> { Ok(i) }).unwrap();

    let err = pool.release(other.acquire()).unwrap_err();
    assert!(format!("{}", err).starts_with("release rejected: resource"));
    assert!(matches!(
        err.source().and_then(|s| s.downcast_ref::<PoolError>()),
        Some(PoolError::UnknownResource(_))
    ));

    drop(err.into_lease());
    assert_eq!(other.free_count(), 1);
}

#[test]
fn test_task_failure_display() {
    let failure = TaskFailure::Errored(anyhow::anyhow!("inner").context("loading page"));
    assert_eq!(format!("{}", failure), "task failed: loading page: inner");

    let failure = TaskFailure::Panicked("boom".to_string());
    assert!(format!("{}", failure).contains("boom"));
}
