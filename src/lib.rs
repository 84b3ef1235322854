//! # Prometheus Lease Pool
//!
//! A bounded worker pool that runs many short-lived tasks over a small, fixed
//! set of expensive, exclusive-use resources (browser instances, GPU contexts,
//! device handles, ...).
//!
//! ## Core Problem Solved
//!
//! Some resources are costly to create and cannot be shared:
//!
//! - **Expensive Provisioning**: each resource is a process or device session, so
//!   the pool is sized once at startup and never grows
//! - **Exclusive Use**: two tasks must never drive the same resource at once
//! - **Failure Isolation**: a task that errors or panics must not cost the pool a
//!   resource or a worker
//!
//! ## Key Features
//!
//! - **Typed Leases**: [`core::ResourcePool::acquire`] returns a [`core::Lease`];
//!   release is checked and a dropped lease returns home automatically
//! - **Two Admission Gates**: worker slots and resource availability, both
//!   blocking on condition variables (no spinning)
//! - **Completion-Ordered Results**: drain one report or everything at once
//! - **Barrier**: [`core::TaskScheduler::wait_all`] waits for everything
//!   submitted before it
//!
//! ## Example
//!
//! ```rust,ignore
//! use prometheus_lease_pool::config::SchedulerConfig;
//! use prometheus_lease_pool::core::{AppResult, Lease, TaskScheduler};
//!
//! fn launch(index: usize) -> AppResult<Browser> {
//!     Browser::launch(index)
//! }
//!
//! fn get_title(browser: Lease<Browser>, url: String) -> (Lease<Browser>, AppResult<String>) {
//!     let title = browser.open(&url).map(|page| page.title());
//!     (browser, title)
//! }
//!
//! let scheduler = TaskScheduler::new(SchedulerConfig::new().with_max_workers(2), &launch)?;
//! for url in urls {
//!     scheduler.submit(get_title, url)?;
//! }
//! scheduler.wait_all();
//! for report in scheduler.take_all_results() {
//!     println!("{}: {:?}", report.task_id, report.outcome);
//! }
//! scheduler.shutdown();
//! ```
//!
//! For complete examples, see:
//! - `tests/scheduler_test.rs` - Scheduling scenarios and invariants
//! - `demos/page_titles.rs` - Page-title scraping over a mock browser pool

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core resource pool, scheduler and result store.
pub mod core;
/// Configuration models for the scheduler.
pub mod config;
/// Builders to construct schedulers from configuration.
pub mod builders;
/// Shared utilities.
pub mod util;
