//! Task scheduler running leased tasks on dedicated OS threads.
//!
//! Admission goes through two independent gates: a worker slot (bounded
//! concurrency) and a resource lease. Both are `parking_lot` `Mutex` +
//! `Condvar` pairs, so blocked submitters sleep instead of spinning.
//!
//! # Design Principles
//!
//! - **No polling**: workers block on channel recv; submitters and consumers
//!   block on condition variables
//! - **Slot held until completion**: a worker slot is freed only after the
//!   completion callback has released the resource and stored the result, and
//!   before `wait_all` can observe the task as finished
//! - **Failures are results**: errors and panics become `TaskFailure` reports,
//!   the scheduler's bookkeeping never unwinds
//! - **Clean shutdown**: dropping the sender drains and stops the workers

use std::collections::{BTreeMap, BTreeSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::SchedulerConfig;

use super::error::{AppResult, PoolError};
use super::resource_pool::{Lease, ResourceFactory, ResourceId, ResourcePool};
use super::result_store::ResultStore;
use super::task::{panic_message, TaskBody, TaskFailure, TaskHandle, TaskId, TaskReport, TaskStatus};

/// Statistics about scheduler utilization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Number of worker threads (and pooled resources).
    pub worker_count: usize,
    /// Tasks currently executing.
    pub active_tasks: u64,
    /// Tasks submitted but not yet finished.
    pub pending_tasks: usize,
    /// Resources currently free.
    pub free_resources: usize,
    /// Resources currently leased.
    pub leased_resources: usize,
    /// Resources a finished task kept instead of handing back. Until those
    /// leases are dropped the pool is short by this many resources.
    pub missing_resources: usize,
    /// Results waiting to be drained.
    pub buffered_results: usize,
    /// Total tasks dispatched to workers.
    pub submitted_tasks: u64,
    /// Total tasks that finished with a value.
    pub completed_tasks: u64,
    /// Total tasks that finished with a failure.
    pub failed_tasks: u64,
}

/// Internal counters for scheduler statistics.
#[derive(Debug, Default)]
struct PoolCounters {
    active_tasks: AtomicU64,
    submitted_tasks: AtomicU64,
    completed_tasks: AtomicU64,
    failed_tasks: AtomicU64,
}

/// Outcome of [`TaskScheduler::wait_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitSummary {
    /// Tasks that finished and have not been reported yet, in id order. A
    /// task is reported once: by a `wait_all` or by taking its result.
    pub completed: Vec<TaskHandle>,
    /// Tasks submitted after the wait began and still unfinished at return.
    pub pending: Vec<TaskHandle>,
}

impl WaitSummary {
    /// Whether nothing was left pending.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Counting gate bounding concurrently executing tasks.
#[derive(Debug)]
struct WorkerSlots {
    capacity: usize,
    in_use: Mutex<usize>,
    freed: Condvar,
}

impl WorkerSlots {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            in_use: Mutex::new(0),
            freed: Condvar::new(),
        }
    }

    fn acquire(self: &Arc<Self>) -> SlotPermit {
        let mut in_use = self.in_use.lock();
        while *in_use >= self.capacity {
            self.freed.wait(&mut in_use);
        }
        *in_use += 1;
        SlotPermit {
            slots: Arc::clone(self),
        }
    }

    fn in_use(&self) -> usize {
        *self.in_use.lock()
    }
}

/// An occupied worker slot. Dropping it frees the slot.
#[derive(Debug)]
struct SlotPermit {
    slots: Arc<WorkerSlots>,
}

impl Drop for SlotPermit {
    fn drop(&mut self) {
        let mut in_use = self.slots.in_use.lock();
        *in_use -= 1;
        drop(in_use);
        self.slots.freed.notify_one();
    }
}

#[derive(Debug, Default)]
struct InFlightState {
    next_id: TaskId,
    pending: BTreeSet<TaskId>,
    /// Finished tasks not yet reported by a `wait_all` or a result take.
    finished: BTreeMap<TaskId, TaskStatus>,
    /// Tasks whose result was taken before they were marked complete.
    taken_early: BTreeSet<TaskId>,
}

/// Tracks submitted tasks for `wait_all`.
#[derive(Debug, Default)]
struct InFlight {
    state: Mutex<InFlightState>,
    settled: Condvar,
}

impl InFlight {
    /// Allocate an id and mark it pending in one step, so a concurrent
    /// `wait_all` either sees the task or does not cover it.
    fn register(&self) -> TaskId {
        let mut state = self.state.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.pending.insert(id);
        id
    }

    /// Drop a task that never reached a worker.
    fn forget(&self, id: TaskId) {
        let mut state = self.state.lock();
        state.pending.remove(&id);
        drop(state);
        self.settled.notify_all();
    }

    fn complete(&self, id: TaskId, status: TaskStatus) {
        let mut state = self.state.lock();
        if state.pending.remove(&id) {
            if !state.taken_early.remove(&id) {
                state.finished.insert(id, status);
            }
        } else {
            error!(task_id = id, "completion for a task that is not in flight");
        }
        drop(state);
        self.settled.notify_all();
    }

    /// Forget tasks whose results the caller has taken.
    fn acknowledge<I>(&self, ids: I)
    where
        I: IntoIterator<Item = TaskId>,
    {
        let mut state = self.state.lock();
        for id in ids {
            if state.finished.remove(&id).is_none() && state.pending.contains(&id) {
                state.taken_early.insert(id);
            }
        }
    }

    fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    #[cfg(test)]
    fn retained(&self) -> usize {
        let state = self.state.lock();
        state.finished.len() + state.taken_early.len()
    }

    fn wait_all(&self) -> WaitSummary {
        let mut state = self.state.lock();
        let snapshot = state.next_id;
        while state.pending.range(..snapshot).next().is_some() {
            self.settled.wait(&mut state);
        }
        Self::summarize(&mut state, snapshot)
    }

    fn wait_all_until(&self, deadline: Instant) -> Result<WaitSummary, PoolError> {
        let mut state = self.state.lock();
        let snapshot = state.next_id;
        while state.pending.range(..snapshot).next().is_some() {
            if self.settled.wait_until(&mut state, deadline).timed_out()
                && state.pending.range(..snapshot).next().is_some()
            {
                return Err(PoolError::Timeout);
            }
        }
        Ok(Self::summarize(&mut state, snapshot))
    }

    /// Hand out finished tasks below `snapshot` and list what is still running.
    fn summarize(state: &mut InFlightState, snapshot: TaskId) -> WaitSummary {
        let later = state.finished.split_off(&snapshot);
        let completed = std::mem::replace(&mut state.finished, later)
            .into_iter()
            .map(|(id, status)| TaskHandle { id, status })
            .collect();
        let pending = state
            .pending
            .iter()
            .map(|&id| TaskHandle {
                id,
                status: TaskStatus::Pending,
            })
            .collect();
        WaitSummary { completed, pending }
    }
}

/// A task paired with its lease and slot, on its way to a worker.
struct WorkerTask<R, T> {
    id: TaskId,
    lease: Lease<R>,
    body: TaskBody<R, T>,
    permit: SlotPermit,
}

/// State shared between the scheduler handle and its workers.
struct Shared<R, T> {
    resources: ResourcePool<R>,
    results: Arc<ResultStore<TaskReport<T>>>,
    in_flight: Arc<InFlight>,
    counters: PoolCounters,
    /// Leases (resource, checkout) kept by tasks that returned another lease.
    withheld: Mutex<Vec<(ResourceId, u64)>>,
}

impl<R, T> Shared<R, T> {
    /// Count withheld leases that are still out, dropping the returned ones.
    fn missing_resources(&self) -> usize {
        let mut withheld = self.withheld.lock();
        withheld.retain(|&(id, checkout)| self.resources.is_checked_out(id, checkout));
        withheld.len()
    }
}

/// Mark drained reports as seen so the in-flight tracker can forget them.
fn acknowledged<T>(in_flight: &InFlight, reports: Vec<TaskReport<T>>) -> Vec<TaskReport<T>> {
    in_flight.acknowledge(reports.iter().map(|r| r.task_id));
    reports
}

/// Bounded-concurrency scheduler that leases one pooled resource to each task.
///
/// ```rust,ignore
/// let scheduler = TaskScheduler::new(SchedulerConfig::new().with_max_workers(2), &launch_browser)?;
/// for url in urls {
///     scheduler.submit(get_title, url)?;
/// }
/// let summary = scheduler.wait_all();
/// let titles = scheduler.take_all_results();
/// ```
pub struct TaskScheduler<R, T>
where
    R: Send + 'static,
    T: Send + 'static,
{
    config: SchedulerConfig,
    max_workers: usize,
    shared: Arc<Shared<R, T>>,
    slots: Arc<WorkerSlots>,
    /// Job sender. `None` once shut down, which stops the workers.
    task_tx: Mutex<Option<Sender<WorkerTask<R, T>>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    shutdown: AtomicBool,
}

impl<R, T> TaskScheduler<R, T>
where
    R: Send + 'static,
    T: Send + 'static,
{
    /// Provision the resource pool and spawn the worker threads.
    ///
    /// # Errors
    ///
    /// - `PoolError::InvalidConfig` if the configuration is invalid
    /// - `PoolError::Provisioning` if the factory fails (nothing stays allocated)
    /// - `PoolError::Internal` if a worker thread cannot be spawned
    pub fn new<F>(config: SchedulerConfig, factory: &F) -> Result<Self, PoolError>
    where
        F: ResourceFactory<R> + ?Sized,
    {
        config.validate().map_err(PoolError::InvalidConfig)?;
        let max_workers = config.resolved_max_workers();

        let resources = ResourcePool::new(max_workers, factory)?;
        let shared = Arc::new(Shared {
            resources,
            results: Arc::new(ResultStore::new()),
            in_flight: Arc::new(InFlight::default()),
            counters: PoolCounters::default(),
            withheld: Mutex::new(Vec::new()),
        });

        // Every queued job holds a slot, so the channel never holds more than
        // `max_workers` jobs and sends never block.
        let (task_tx, task_rx) = bounded::<WorkerTask<R, T>>(max_workers);

        let mut workers = Vec::with_capacity(max_workers);
        for worker_id in 0..max_workers {
            match spawn_worker(worker_id, task_rx.clone(), Arc::clone(&shared), &config) {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    error!(worker_id, error = %e, "failed to spawn worker thread");
                    drop(task_tx);
                    for handle in workers {
                        let _ = handle.join();
                    }
                    return Err(PoolError::Internal(format!(
                        "failed to spawn worker {worker_id}: {e}"
                    )));
                }
            }
        }

        info!(
            max_workers,
            pool_id = %shared.resources.id(),
            "TaskScheduler initialized"
        );

        Ok(Self {
            config,
            max_workers,
            shared,
            slots: Arc::new(WorkerSlots::new(max_workers)),
            task_tx: Mutex::new(Some(task_tx)),
            workers: Mutex::new(workers),
            shutdown: AtomicBool::new(false),
        })
    }

    /// Effective concurrency (workers and resources).
    #[must_use]
    pub const fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Configuration the scheduler was built from.
    #[must_use]
    pub const fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Submit `task` to run with `args` against a leased resource.
    ///
    /// Blocks until a worker slot is free, then (still holding the slot) until a
    /// resource can be leased, then hands the task to a worker and returns. The
    /// task's outcome shows up in the result store.
    ///
    /// A task that keeps its lease and hands back a different one is reported
    /// as [`TaskFailure::LeaseMismatch`], and the kept resource stays out of the
    /// pool until that lease is dropped (see [`PoolStats::missing_resources`]).
    /// Without an acquire timeout, a pool drained that way blocks `submit`
    /// indefinitely.
    ///
    /// # Errors
    ///
    /// - `PoolError::PoolShutdown` if the scheduler has been shut down
    /// - `PoolError::Timeout` if an acquire timeout is configured and expired
    /// - `PoolError::Internal` if the workers are gone
    pub fn submit<F, A>(&self, task: F, args: A) -> Result<TaskId, PoolError>
    where
        F: FnOnce(Lease<R>, A) -> (Lease<R>, AppResult<T>) + Send + 'static,
        A: Send + 'static,
    {
        if self.shutdown.load(Ordering::Acquire) {
            return Err(PoolError::PoolShutdown);
        }

        let in_flight = &self.shared.in_flight;
        let id = in_flight.register();

        let permit = self.slots.acquire();
        if self.shutdown.load(Ordering::Acquire) {
            in_flight.forget(id);
            return Err(PoolError::PoolShutdown);
        }

        let lease = match self.config.acquire_timeout() {
            None => self.shared.resources.acquire(),
            Some(timeout) => match self.shared.resources.acquire_timeout(timeout) {
                Ok(lease) => lease,
                Err(e) => {
                    warn!(task_id = id, ?timeout, "no resource became free in time");
                    in_flight.forget(id);
                    return Err(e);
                }
            },
        };
        let resource = lease.id();

        let job = WorkerTask {
            id,
            lease,
            body: Box::new(move |lease| task(lease, args)),
            permit,
        };

        let task_tx = self.task_tx.lock();
        let Some(tx) = task_tx.as_ref() else {
            in_flight.forget(id);
            return Err(PoolError::PoolShutdown);
        };
        let submitted = &self.shared.counters.submitted_tasks;
        submitted.fetch_add(1, Ordering::SeqCst);
        if tx.send(job).is_err() {
            // The rejected job drops here, returning its lease and slot.
            submitted.fetch_sub(1, Ordering::SeqCst);
            in_flight.forget(id);
            return Err(PoolError::Internal("worker channel closed".into()));
        }
        drop(task_tx);

        debug!(task_id = id, %resource, "task dispatched");
        Ok(id)
    }

    /// Block until every task submitted before this call has finished.
    #[must_use]
    pub fn wait_all(&self) -> WaitSummary {
        self.shared.in_flight.wait_all()
    }

    /// Like [`wait_all`](Self::wait_all) with an upper bound on the wait.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::Timeout` if tasks are still running at the deadline.
    pub fn wait_all_timeout(&self, timeout: Duration) -> Result<WaitSummary, PoolError> {
        self.shared.in_flight.wait_all_until(Instant::now() + timeout)
    }

    /// Remove the oldest completed result, blocking until one exists.
    #[must_use]
    pub fn take_one_result(&self) -> TaskReport<T> {
        let report = self.shared.results.take_one();
        self.shared.in_flight.acknowledge([report.task_id]);
        report
    }

    /// Remove the oldest completed result if there is one.
    #[must_use]
    pub fn try_take_result(&self) -> Option<TaskReport<T>> {
        let report = self.shared.results.try_take_one()?;
        self.shared.in_flight.acknowledge([report.task_id]);
        Some(report)
    }

    /// Drain all completed results, blocking until at least one exists.
    #[must_use]
    pub fn take_all_results(&self) -> Vec<TaskReport<T>> {
        acknowledged(&self.shared.in_flight, self.shared.results.take_all())
    }

    /// Drain whatever results are buffered without waiting.
    #[must_use]
    pub fn drain_results(&self) -> Vec<TaskReport<T>> {
        acknowledged(&self.shared.in_flight, self.shared.results.drain())
    }

    /// Current statistics.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let counters = &self.shared.counters;
        // Finished counts are read before the submitted count, so a snapshot
        // never shows more finished tasks than submitted ones.
        let completed_tasks = counters.completed_tasks.load(Ordering::SeqCst);
        let failed_tasks = counters.failed_tasks.load(Ordering::SeqCst);
        let submitted_tasks = counters.submitted_tasks.load(Ordering::SeqCst);
        let free = self.shared.resources.free_count();
        PoolStats {
            worker_count: self.max_workers,
            active_tasks: counters.active_tasks.load(Ordering::Relaxed),
            pending_tasks: self.shared.in_flight.pending_count(),
            free_resources: free,
            leased_resources: self.max_workers - free,
            missing_resources: self.shared.missing_resources(),
            buffered_results: self.shared.results.len(),
            submitted_tasks,
            completed_tasks,
            failed_tasks,
        }
    }

    /// Number of worker slots currently occupied.
    #[must_use]
    pub fn busy_slots(&self) -> usize {
        self.slots.in_use()
    }

    /// Stop accepting tasks, let dispatched tasks finish, and join the workers.
    ///
    /// Buffered results stay available afterwards.
    pub fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }

        info!("Shutting down task scheduler");

        // Workers drain the queue, then recv() fails and they exit.
        *self.task_tx.lock() = None;

        let mut workers = self.workers.lock();
        let worker_count = workers.len();
        for (idx, worker) in workers.drain(..).enumerate() {
            if worker.join().is_err() {
                warn!(worker_id = idx, "Worker panicked");
            } else {
                debug!(worker_id = idx, "Worker joined successfully");
            }
        }

        info!(worker_count, "Task scheduler shut down complete");
    }
}

#[cfg(feature = "tokio-runtime")]
impl<R, T> TaskScheduler<R, T>
where
    R: Send + 'static,
    T: Send + 'static,
{
    /// Async variant of [`wait_all`](Self::wait_all); the wait runs on tokio's
    /// blocking pool.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::Internal` if the blocking task fails.
    pub async fn wait_all_async(&self) -> Result<WaitSummary, PoolError> {
        let in_flight = Arc::clone(&self.shared.in_flight);
        tokio::task::spawn_blocking(move || in_flight.wait_all())
            .await
            .map_err(|e| PoolError::Internal(format!("blocking wait failed: {e}")))
    }

    /// Async variant of [`take_one_result`](Self::take_one_result).
    ///
    /// # Errors
    ///
    /// Returns `PoolError::Internal` if the blocking task fails.
    pub async fn take_one_result_async(&self) -> Result<TaskReport<T>, PoolError> {
        let results = Arc::clone(&self.shared.results);
        let in_flight = Arc::clone(&self.shared.in_flight);
        tokio::task::spawn_blocking(move || {
            let report = results.take_one();
            in_flight.acknowledge([report.task_id]);
            report
        })
        .await
            .map_err(|e| PoolError::Internal(format!("blocking wait failed: {e}")))
    }

    /// Async variant of [`take_all_results`](Self::take_all_results).
    ///
    /// # Errors
    ///
    /// Returns `PoolError::Internal` if the blocking task fails.
    pub async fn take_all_results_async(&self) -> Result<Vec<TaskReport<T>>, PoolError> {
        let results = Arc::clone(&self.shared.results);
        let in_flight = Arc::clone(&self.shared.in_flight);
        tokio::task::spawn_blocking(move || acknowledged(&in_flight, results.take_all()))
            .await
            .map_err(|e| PoolError::Internal(format!("blocking wait failed: {e}")))
    }
}

impl<R, T> Drop for TaskScheduler<R, T>
where
    R: Send + 'static,
    T: Send + 'static,
{
    fn drop(&mut self) {
        // Signal shutdown but don't join: running tasks may take arbitrarily long.
        if !self.shutdown.swap(true, Ordering::AcqRel) {
            *self.task_tx.lock() = None;
            debug!("TaskScheduler dropped without explicit shutdown - workers will be detached");
        }
    }
}

/// Spawn a worker thread.
fn spawn_worker<R, T>(
    worker_id: usize,
    task_rx: Receiver<WorkerTask<R, T>>,
    shared: Arc<Shared<R, T>>,
    config: &SchedulerConfig,
) -> std::io::Result<JoinHandle<()>>
where
    R: Send + 'static,
    T: Send + 'static,
{
    thread::Builder::new()
        .name(format!("{}-{worker_id}", config.thread_name_prefix))
        .stack_size(config.thread_stack_size)
        .spawn(move || {
            debug!(worker_id, "Worker thread started");
            // Blocks until a job arrives; fails once the sender is dropped and
            // the queue is empty.
            while let Ok(job) = task_rx.recv() {
                run_task(worker_id, job, &shared);
            }
            debug!(worker_id, "Worker thread exiting");
        })
}

/// Run one task and its completion callback.
///
/// The callback order is: resource released, result stored, worker slot
/// freed, task marked complete. `wait_all` therefore never returns while a
/// covered task still holds its slot.
fn run_task<R, T>(worker_id: usize, job: WorkerTask<R, T>, shared: &Shared<R, T>)
where
    R: Send + 'static,
    T: Send + 'static,
{
    let WorkerTask {
        id,
        lease,
        body,
        permit,
    } = job;
    let expected = lease.id();
    let checkout = lease.checkout();

    shared.counters.active_tasks.fetch_add(1, Ordering::Relaxed);
    debug!(worker_id, task_id = id, resource = %expected, "Worker executing task");

    // A panicking body drops its lease while unwinding, which returns the
    // resource to the pool.
    let outcome = match panic::catch_unwind(AssertUnwindSafe(move || body(lease))) {
        Ok((returned, result)) if returned.id() == expected => {
            if let Err(e) = shared.resources.release(returned) {
                error!(task_id = id, error = %e, "failed to release task resource");
            }
            result.map_err(TaskFailure::Errored)
        }
        Ok((returned, _)) => {
            let returned_id = returned.id();
            error!(
                task_id = id,
                expected = %expected,
                returned = %returned_id,
                "task returned a lease it was not given"
            );
            if let Err(e) = shared.resources.release(returned) {
                // Dropping the rejected lease sends it back to its own pool.
                debug!(task_id = id, error = %e, "foreign lease handed back");
            }
            if shared.resources.is_checked_out(expected, checkout) {
                shared.withheld.lock().push((expected, checkout));
                error!(
                    task_id = id,
                    resource = %expected,
                    "task kept its lease; the pool is short one resource until it is dropped"
                );
            }
            Err(TaskFailure::LeaseMismatch {
                expected,
                returned: returned_id,
            })
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(task_id = id, worker_id, panic = %message, "Task panicked during execution");
            Err(TaskFailure::Panicked(message))
        }
    };

    let status = match &outcome {
        Ok(_) => {
            shared.counters.completed_tasks.fetch_add(1, Ordering::SeqCst);
            TaskStatus::Succeeded
        }
        Err(failure) => {
            shared.counters.failed_tasks.fetch_add(1, Ordering::SeqCst);
            warn!(task_id = id, error = %failure, "Task failed");
            TaskStatus::Failed
        }
    };

    shared.results.append(TaskReport {
        task_id: id,
        resource: expected,
        worker_id,
        outcome,
    });
    shared.counters.active_tasks.fetch_sub(1, Ordering::Relaxed);
    drop(permit);
    shared.in_flight.complete(id, status);

    debug!(worker_id, task_id = id, "Worker completed task");
}
