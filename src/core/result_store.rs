//! Completion-ordered buffer of task results.
//!
//! Workers append under the store's own mutex; consumers drain one report or
//! everything at once, parking on a `Condvar` while the buffer is empty.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::trace;

/// Ordered buffer of completed results, shared between workers and consumers.
#[derive(Debug)]
pub struct ResultStore<T> {
    items: Mutex<VecDeque<T>>,
    ready: Condvar,
}

impl<T> Default for ResultStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ResultStore<T> {
    /// Create an empty store.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            ready: Condvar::new(),
        }
    }

    /// Append a result at the tail and wake waiting consumers.
    pub fn append(&self, item: T) {
        let mut items = self.items.lock();
        items.push_back(item);
        trace!(buffered = items.len(), "result appended");
        drop(items);
        self.ready.notify_all();
    }

    /// Remove and return the oldest result, blocking while the store is empty.
    #[must_use]
    pub fn take_one(&self) -> T {
        let mut items = self.items.lock();
        loop {
            if let Some(item) = items.pop_front() {
                return item;
            }
            self.ready.wait(&mut items);
        }
    }

    /// Remove and return the oldest result if there is one.
    #[must_use]
    pub fn try_take_one(&self) -> Option<T> {
        self.items.lock().pop_front()
    }

    /// Like [`take_one`](Self::take_one) but gives up after `timeout`.
    #[must_use]
    pub fn take_one_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut items = self.items.lock();
        loop {
            if let Some(item) = items.pop_front() {
                return Some(item);
            }
            if self.ready.wait_until(&mut items, deadline).timed_out() {
                return items.pop_front();
            }
        }
    }

    /// Drain every buffered result, blocking while the store is empty.
    #[must_use]
    pub fn take_all(&self) -> Vec<T> {
        let mut items = self.items.lock();
        while items.is_empty() {
            self.ready.wait(&mut items);
        }
        items.drain(..).collect()
    }

    /// Like [`take_all`](Self::take_all) but returns an empty vector after
    /// `timeout` if nothing arrived.
    #[must_use]
    pub fn take_all_timeout(&self, timeout: Duration) -> Vec<T> {
        let deadline = Instant::now() + timeout;
        let mut items = self.items.lock();
        while items.is_empty() {
            if self.ready.wait_until(&mut items, deadline).timed_out() {
                break;
            }
        }
        items.drain(..).collect()
    }

    /// Drain whatever is buffered without waiting.
    #[must_use]
    pub fn drain(&self) -> Vec<T> {
        self.items.lock().drain(..).collect()
    }

    /// Number of buffered results.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}
