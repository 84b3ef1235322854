//! Scheduler configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Concurrency used when `max_workers` is unset or zero.
///
/// This is a fixed fallback, not derived from the host or the workload.
pub const DEFAULT_MAX_WORKERS: usize = 5;

/// Default worker thread stack size (2 MiB).
pub const DEFAULT_STACK_SIZE: usize = 2 * 1024 * 1024;

/// Smallest stack size accepted for worker threads.
pub const MIN_STACK_SIZE: usize = 64 * 1024;

const ENV_MAX_WORKERS: &str = "LEASE_POOL_MAX_WORKERS";
const ENV_THREAD_PREFIX: &str = "LEASE_POOL_THREAD_PREFIX";
const ENV_STACK_SIZE: &str = "LEASE_POOL_STACK_SIZE";
const ENV_ACQUIRE_TIMEOUT: &str = "LEASE_POOL_ACQUIRE_TIMEOUT_SECS";

/// Task scheduler configuration.
///
/// The same number is used for worker threads and pooled resources: one
/// resource per active worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Number of workers and resources. `None` or `0` selects [`DEFAULT_MAX_WORKERS`].
    pub max_workers: Option<usize>,
    /// Prefix for worker thread names (`{prefix}-{id}`).
    pub thread_name_prefix: String,
    /// Worker thread stack size in bytes.
    pub thread_stack_size: usize,
    /// How long `submit` waits for a free resource. `None` waits indefinitely.
    pub acquire_timeout_secs: Option<u64>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_workers: None,
            thread_name_prefix: "lease-worker".into(),
            thread_stack_size: DEFAULT_STACK_SIZE,
            acquire_timeout_secs: None,
        }
    }
}

impl SchedulerConfig {
    /// Configuration with all defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of workers (and resources).
    #[must_use]
    pub const fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = Some(max_workers);
        self
    }

    /// Set the worker thread name prefix.
    #[must_use]
    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Set the worker thread stack size.
    #[must_use]
    pub const fn with_thread_stack_size(mut self, bytes: usize) -> Self {
        self.thread_stack_size = bytes;
        self
    }

    /// Bound how long `submit` waits for a resource.
    #[must_use]
    pub const fn with_acquire_timeout_secs(mut self, secs: u64) -> Self {
        self.acquire_timeout_secs = Some(secs);
        self
    }

    /// Effective worker count after applying the default.
    #[must_use]
    pub fn resolved_max_workers(&self) -> usize {
        match self.max_workers {
            Some(n) if n > 0 => n,
            _ => DEFAULT_MAX_WORKERS,
        }
    }

    /// Effective acquire timeout.
    #[must_use]
    pub fn acquire_timeout(&self) -> Option<Duration> {
        self.acquire_timeout_secs.map(Duration::from_secs)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.resolved_max_workers() == 0 {
            return Err("max_workers must resolve to a value greater than 0".into());
        }
        if self.thread_name_prefix.trim().is_empty() {
            return Err("thread_name_prefix must not be empty".into());
        }
        if self.thread_stack_size < MIN_STACK_SIZE {
            return Err(format!(
                "thread_stack_size must be at least {MIN_STACK_SIZE} bytes"
            ));
        }
        if self.acquire_timeout_secs == Some(0) {
            return Err("acquire_timeout_secs must be greater than 0 when set".into());
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Returns a description of the parse or validation failure.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Build configuration from the process environment, loading a `.env`
    /// file first if one is present. Unset variables keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns a description of the first malformed variable or validation failure.
    pub fn from_env() -> Result<Self, String> {
        // A missing .env file is not an error.
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        if let Some(raw) = lookup(ENV_MAX_WORKERS) {
            cfg.max_workers = Some(parse_var(ENV_MAX_WORKERS, &raw)?);
        }
        if let Some(raw) = lookup(ENV_THREAD_PREFIX) {
            cfg.thread_name_prefix = raw;
        }
        if let Some(raw) = lookup(ENV_STACK_SIZE) {
            cfg.thread_stack_size = parse_var(ENV_STACK_SIZE, &raw)?;
        }
        if let Some(raw) = lookup(ENV_ACQUIRE_TIMEOUT) {
            cfg.acquire_timeout_secs = Some(parse_var(ENV_ACQUIRE_TIMEOUT, &raw)?);
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, String>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| format!("{key}: cannot parse `{raw}`: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_from_lookup_reads_variables() {
        let vars: HashMap<&str, &str> = [
            ("LEASE_POOL_MAX_WORKERS", "3"),
            ("LEASE_POOL_THREAD_PREFIX", "browser"),
            ("LEASE_POOL_ACQUIRE_TIMEOUT_SECS", "30"),
        ]
        .into_iter()
        .collect();

        let cfg = SchedulerConfig::from_lookup(|k| vars.get(k).map(ToString::to_string)).unwrap();
        assert_eq!(cfg.resolved_max_workers(), 3);
        assert_eq!(cfg.thread_name_prefix, "browser");
        assert_eq!(cfg.acquire_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(cfg.thread_stack_size, DEFAULT_STACK_SIZE);
    }

    #[test]
    fn test_from_lookup_rejects_garbage() {
        let err = SchedulerConfig::from_lookup(|k| {
            (k == "LEASE_POOL_MAX_WORKERS").then(|| "many".to_string())
        })
        .unwrap_err();
        assert!(err.contains("LEASE_POOL_MAX_WORKERS"));
    }

    #[test]
    fn test_from_lookup_empty_is_default() {
        let cfg = SchedulerConfig::from_lookup(|_| None).unwrap();
        assert_eq!(cfg, SchedulerConfig::default());
    }
}
