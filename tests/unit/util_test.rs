//! Tests for utility functions

use prometheus_lease_pool::util::{init_tracing, DEFAULT_LOG_FILTER};

#[test]
fn test_default_log_filter() {
    assert_eq!(DEFAULT_LOG_FILTER, "info");
}

#[test]
fn test_init_tracing_is_idempotent() {
    init_tracing();
    init_tracing();
    assert!(tracing::dispatcher::has_been_set());
}
