//! Tests for scheduler builders

use prometheus_lease_pool::builders::{build_scheduler, build_scheduler_from_json};
use prometheus_lease_pool::config::SchedulerConfig;
use prometheus_lease_pool::core::{AppResult, Lease, PoolError, TaskScheduler};

fn make(index: usize) -> AppResult<String> {
    Ok(format!("session-{index}"))
}

#[test]
fn test_build_scheduler_from_config() {
    let cfg = SchedulerConfig::new().with_max_workers(2);
    let scheduler: TaskScheduler<String, usize> = build_scheduler(&cfg, &make).unwrap();
    assert_eq!(scheduler.max_workers(), 2);

    scheduler
        .submit(|session: Lease<String>, ()| {
            let len = session.len();
            (session, Ok(len))
        }, ())
        .unwrap();
    let report = scheduler.take_one_result();
    assert_eq!(report.into_result().unwrap(), "session-0".len());
    scheduler.shutdown();
}

#[test]
fn test_build_scheduler_from_json() {
    let json = r#"{"max_workers": 3, "thread_name_prefix": "session"}"#;
    let scheduler: TaskScheduler<String, ()> = build_scheduler_from_json(json, &make).unwrap();
    assert_eq!(scheduler.max_workers(), 3);
    assert_eq!(scheduler.config().thread_name_prefix, "session");
    assert_eq!(scheduler.stats().free_resources, 3);
    scheduler.shutdown();
}

#[test]
fn test_build_scheduler_invalid_config() {
    let cfg = SchedulerConfig::new().with_thread_stack_size(16);
    let result: Result<TaskScheduler<String, ()>, _> = build_scheduler(&cfg, &make);
    assert!(matches!(result, Err(PoolError::InvalidConfig(_))));

    let result: Result<TaskScheduler<String, ()>, _> = build_scheduler_from_json("[1, 2]", &make);
    assert!(matches!(result, Err(PoolError::InvalidConfig(_))));
}
