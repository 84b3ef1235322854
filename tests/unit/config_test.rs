//! Tests for configuration validation

use prometheus_lease_pool::config::{SchedulerConfig, DEFAULT_MAX_WORKERS, DEFAULT_STACK_SIZE, MIN_STACK_SIZE};
use std::time::Duration;

#[test]
fn test_default_config_is_valid() {
    let cfg = SchedulerConfig::default();
    assert!(cfg.validate().is_ok());
    assert_eq!(cfg.max_workers, None);
    assert_eq!(cfg.resolved_max_workers(), DEFAULT_MAX_WORKERS);
    assert_eq!(cfg.thread_stack_size, DEFAULT_STACK_SIZE);
    assert_eq!(cfg.acquire_timeout(), None);
}

#[test]
fn test_zero_workers_falls_back_to_default() {
    let cfg = SchedulerConfig::new().with_max_workers(0);
    assert!(cfg.validate().is_ok());
    assert_eq!(cfg.resolved_max_workers(), DEFAULT_MAX_WORKERS);
}

#[test]
fn test_explicit_workers() {
    let cfg = SchedulerConfig::new().with_max_workers(12);
    assert_eq!(cfg.resolved_max_workers(), 12);
}

#[test]
fn test_invalid_thread_prefix() {
    let cfg = SchedulerConfig::new().with_thread_name_prefix("  ");
    assert!(cfg.validate().is_err());
}

#[test]
fn test_invalid_stack_size() {
    let cfg = SchedulerConfig::new().with_thread_stack_size(MIN_STACK_SIZE - 1);
    assert!(cfg.validate().is_err());

    let cfg = SchedulerConfig::new().with_thread_stack_size(MIN_STACK_SIZE);
    assert!(cfg.validate().is_ok());
}

#[test]
fn test_invalid_acquire_timeout() {
    let cfg = SchedulerConfig::new().with_acquire_timeout_secs(0);
    assert!(cfg.validate().is_err());

    let cfg = SchedulerConfig::new().with_acquire_timeout_secs(15);
    assert_eq!(cfg.acquire_timeout(), Some(Duration::from_secs(15)));
}

#[test]
fn test_config_from_json() {
    let json = r#"{
        "max_workers": 3,
        "thread_name_prefix": "browser",
        "acquire_timeout_secs": 20
    }"#;

    let cfg = SchedulerConfig::from_json_str(json).unwrap();
    assert_eq!(cfg.resolved_max_workers(), 3);
    assert_eq!(cfg.thread_name_prefix, "browser");
    assert_eq!(cfg.thread_stack_size, DEFAULT_STACK_SIZE);
    assert_eq!(cfg.acquire_timeout_secs, Some(20));
}

#[test]
fn test_config_from_empty_json_uses_defaults() {
    let cfg = SchedulerConfig::from_json_str("{}").unwrap();
    assert_eq!(cfg, SchedulerConfig::default());
}

#[test]
fn test_config_from_json_rejects_invalid() {
    let err = SchedulerConfig::from_json_str(r#"{"thread_stack_size": 1024}"#).unwrap_err();
    assert!(err.contains("thread_stack_size"));

    let err = SchedulerConfig::from_json_str("not json").unwrap_err();
    assert!(err.starts_with("parse error"));
}

#[test]
fn test_config_serde_roundtrip() {
    let cfg = SchedulerConfig::new()
        .with_max_workers(4)
        .with_thread_name_prefix("gpu")
        .with_acquire_timeout_secs(5);
    let json = serde_json::to_string(&cfg).unwrap();
    let back: SchedulerConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(back, cfg);
}
