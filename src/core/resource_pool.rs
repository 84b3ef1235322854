//! Fixed-size pool of exclusive-use resources.
//!
//! Resources are created once, up front, by a [`ResourceFactory`] and then
//! cycle between the free set and a single [`Lease`] holder for the lifetime of
//! the pool. Waiters block on a `parking_lot::Condvar` and are served in ticket
//! order, so a waiter cannot be overtaken indefinitely by later arrivals.

use std::collections::{BTreeSet, VecDeque};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::error::{AppResult, PoolError, ReleaseError};

/// Identity of a pooled resource: the pool that owns it plus its slot index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceId {
    /// Identifier of the owning pool.
    pub pool: Uuid,
    /// Slot index inside the owning pool.
    pub index: usize,
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.pool, self.index)
    }
}

/// Creates (and optionally tears down) the resources of a pool.
///
/// `create` is only invoked while the pool is being constructed. If it fails
/// for any index, every resource created so far is handed to `dispose` in
/// reverse order and construction fails.
///
/// Closures of the form `Fn(usize) -> AppResult<R>` implement this trait.
pub trait ResourceFactory<R>: Send + Sync {
    /// Create the resource for slot `index`.
    ///
    /// # Errors
    ///
    /// Any error aborts pool construction.
    fn create(&self, index: usize) -> AppResult<R>;

    /// Tear down a resource created by this factory. Defaults to dropping it.
    ///
    /// Only called when construction is rolled back. The pool does not keep
    /// the factory, so resources of a pool that is dropped normally are torn
    /// down by their own `Drop` impl; put shutdown logic (closing a browser,
    /// releasing a device) there if it must run in both cases.
    fn dispose(&self, index: usize, resource: R) {
        let _ = index;
        drop(resource);
    }
}

impl<R, F> ResourceFactory<R> for F
where
    F: Fn(usize) -> AppResult<R> + Send + Sync,
{
    fn create(&self, index: usize) -> AppResult<R> {
        self(index)
    }
}

/// Mutable pool bookkeeping, guarded by `PoolShared::state`.
///
/// Invariant: `index ∈ free` if and only if `slots[index].is_some()`.
struct PoolState<R> {
    slots: Vec<Option<R>>,
    free: VecDeque<usize>,
    /// Times each slot has been checked out; identifies a specific lease.
    checkouts: Vec<u64>,
    next_ticket: u64,
    now_serving: u64,
    /// Tickets whose holders gave up (timed out) before being served.
    abandoned: BTreeSet<u64>,
}

impl<R> PoolState<R> {
    /// Pop a free resource for `ticket` if it is that ticket's turn.
    fn serve(&mut self, ticket: u64) -> Option<(usize, u64, R)> {
        if self.now_serving != ticket {
            return None;
        }
        while let Some(index) = self.free.pop_front() {
            if let Some(resource) = self.slots[index].take() {
                self.checkouts[index] += 1;
                self.advance();
                return Some((index, self.checkouts[index], resource));
            }
        }
        None
    }

    fn take_ticket(&mut self) -> u64 {
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        ticket
    }

    /// Move on to the next live ticket.
    fn advance(&mut self) {
        self.now_serving += 1;
        while self.abandoned.remove(&self.now_serving) {
            self.now_serving += 1;
        }
    }

    fn abandon(&mut self, ticket: u64) {
        if self.now_serving == ticket {
            self.advance();
        } else {
            self.abandoned.insert(ticket);
        }
    }

    fn waiting(&self) -> usize {
        let queued = self.next_ticket - self.now_serving;
        usize::try_from(queued).unwrap_or(usize::MAX) - self.abandoned.len()
    }
}

struct PoolShared<R> {
    id: Uuid,
    size: usize,
    state: Mutex<PoolState<R>>,
    available: Condvar,
}

impl<R> PoolShared<R> {
    /// Put a resource back into its slot. Hands the resource back if the slot
    /// is already occupied.
    fn check_in(&self, index: usize, resource: R) -> Result<(), R> {
        let mut state = self.state.lock();
        if state.slots[index].is_some() {
            return Err(resource);
        }
        state.slots[index] = Some(resource);
        state.free.push_back(index);
        drop(state);
        self.available.notify_all();
        Ok(())
    }

    fn owns(&self, id: ResourceId) -> bool {
        id.pool == self.id && id.index < self.size
    }
}

/// Exclusive access to one pooled resource.
///
/// A lease dereferences to the resource. It is returned with
/// [`ResourcePool::release`]; a lease that is dropped instead (for example while
/// a panicking task unwinds) goes back to its pool automatically.
pub struct Lease<R> {
    id: ResourceId,
    checkout: u64,
    resource: Option<R>,
    home: Arc<PoolShared<R>>,
}

impl<R> Lease<R> {
    /// Checkout number of this lease within its slot.
    pub(crate) const fn checkout(&self) -> u64 {
        self.checkout
    }

    /// Identity of the leased resource.
    #[must_use]
    pub const fn id(&self) -> ResourceId {
        self.id
    }
}

impl<R> Deref for Lease<R> {
    type Target = R;

    fn deref(&self) -> &R {
        self.resource
            .as_ref()
            .expect("lease holds its resource until released or dropped")
    }
}

impl<R> DerefMut for Lease<R> {
    fn deref_mut(&mut self) -> &mut R {
        self.resource
            .as_mut()
            .expect("lease holds its resource until released or dropped")
    }
}

impl<R> fmt::Debug for Lease<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lease").field("id", &self.id).finish_non_exhaustive()
    }
}

impl<R> Drop for Lease<R> {
    fn drop(&mut self) {
        let Some(resource) = self.resource.take() else {
            return;
        };
        match self.home.check_in(self.id.index, resource) {
            Ok(()) => debug!(resource = %self.id, "lease dropped, resource returned to pool"),
            Err(_duplicate) => error!(
                resource = %self.id,
                "dropped lease targets a slot that is already free; discarding duplicate resource"
            ),
        }
    }
}

/// Fixed-size pool of exclusive resources with blocking, first-come-first-served
/// acquisition.
///
/// Resources are dropped once the pool and every outstanding lease are gone.
/// [`ResourceFactory::dispose`] is not involved in that teardown.
pub struct ResourcePool<R> {
    shared: Arc<PoolShared<R>>,
}

impl<R> Clone for ResourcePool<R> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<R> fmt::Debug for ResourcePool<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourcePool")
            .field("id", &self.shared.id)
            .field("size", &self.shared.size)
            .field("free", &self.free_count())
            .finish()
    }
}

impl<R> ResourcePool<R> {
    /// Provision `count` resources through `factory`.
    ///
    /// # Errors
    ///
    /// - `PoolError::InvalidConfig` if `count` is zero; such a pool could never
    ///   satisfy an acquire.
    /// - `PoolError::Provisioning` if the factory fails. Resources created before
    ///   the failure are disposed, so nothing is left allocated.
    pub fn new<F>(count: usize, factory: &F) -> Result<Self, PoolError>
    where
        F: ResourceFactory<R> + ?Sized,
    {
        if count == 0 {
            return Err(PoolError::InvalidConfig(
                "resource pool size must be greater than 0".into(),
            ));
        }

        let id = Uuid::new_v4();
        let mut created = Vec::with_capacity(count);
        for index in 0..count {
            match factory.create(index) {
                Ok(resource) => {
                    debug!(pool_id = %id, index, "provisioned resource");
                    created.push(resource);
                }
                Err(e) => {
                    error!(pool_id = %id, index, error = %e, "resource provisioning failed, rolling back");
                    for (i, resource) in created.into_iter().enumerate().rev() {
                        factory.dispose(i, resource);
                    }
                    return Err(PoolError::Provisioning {
                        index,
                        source: e.into(),
                    });
                }
            }
        }

        info!(pool_id = %id, size = count, "resource pool provisioned");

        Ok(Self {
            shared: Arc::new(PoolShared {
                id,
                size: count,
                state: Mutex::new(PoolState {
                    slots: created.into_iter().map(Some).collect(),
                    free: (0..count).collect(),
                    checkouts: vec![0; count],
                    next_ticket: 0,
                    now_serving: 0,
                    abandoned: BTreeSet::new(),
                }),
                available: Condvar::new(),
            }),
        })
    }

    /// Identifier of this pool.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    /// Total number of resources, free and leased.
    #[must_use]
    pub fn size(&self) -> usize {
        self.shared.size
    }

    /// Number of resources currently free.
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.shared.state.lock().free.len()
    }

    /// Number of resources currently leased.
    #[must_use]
    pub fn leased_count(&self) -> usize {
        self.shared.size - self.free_count()
    }

    /// Number of callers currently blocked in an acquire.
    #[must_use]
    pub fn waiting(&self) -> usize {
        self.shared.state.lock().waiting()
    }

    /// Block until a resource is free and lease it.
    #[must_use]
    pub fn acquire(&self) -> Lease<R> {
        let mut state = self.shared.state.lock();
        let ticket = state.take_ticket();
        loop {
            if let Some(entry) = state.serve(ticket) {
                return self.check_out(state, entry);
            }
            self.shared.available.wait(&mut state);
        }
    }

    /// Block for at most `timeout` waiting for a resource.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::Timeout` if no resource was handed out in time.
    pub fn acquire_timeout(&self, timeout: Duration) -> Result<Lease<R>, PoolError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        let ticket = state.take_ticket();
        loop {
            if let Some(entry) = state.serve(ticket) {
                return Ok(self.check_out(state, entry));
            }
            if self
                .shared
                .available
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                if let Some(entry) = state.serve(ticket) {
                    return Ok(self.check_out(state, entry));
                }
                state.abandon(ticket);
                drop(state);
                // The next ticket may now be servable.
                self.shared.available.notify_all();
                debug!(pool_id = %self.shared.id, ticket, "acquire timed out");
                return Err(PoolError::Timeout);
            }
        }
    }

    /// Lease a resource only if one is free and nobody is queued ahead.
    #[must_use]
    pub fn try_acquire(&self) -> Option<Lease<R>> {
        let mut state = self.shared.state.lock();
        if state.waiting() > 0 || state.free.is_empty() {
            return None;
        }
        let ticket = state.take_ticket();
        let entry = state.serve(ticket)?;
        Some(self.check_out(state, entry))
    }

    /// Wrap a served resource in a lease, waking the next waiter if more
    /// resources are free.
    fn check_out(
        &self,
        state: parking_lot::MutexGuard<'_, PoolState<R>>,
        (index, checkout, resource): (usize, u64, R),
    ) -> Lease<R> {
        let more = !state.free.is_empty() && state.waiting() > 0;
        drop(state);
        if more {
            self.shared.available.notify_all();
        }

        let id = ResourceId {
            pool: self.shared.id,
            index,
        };
        debug!(resource = %id, "resource leased");
        Lease {
            id,
            checkout,
            resource: Some(resource),
            home: Arc::clone(&self.shared),
        }
    }

    /// Whether the lease identified by `id` and `checkout` is still out.
    pub(crate) fn is_checked_out(&self, id: ResourceId, checkout: u64) -> bool {
        if !self.shared.owns(id) {
            return false;
        }
        let state = self.shared.state.lock();
        state.slots[id.index].is_none() && state.checkouts[id.index] == checkout
    }

    /// Return a leased resource to the free set.
    ///
    /// # Errors
    ///
    /// The lease is handed back inside a [`ReleaseError`] when:
    /// - it was issued by another pool (`PoolError::UnknownResource`);
    /// - its slot is already free (`PoolError::DoubleRelease`).
    ///
    /// Pool state is untouched in both cases.
    pub fn release(&self, mut lease: Lease<R>) -> Result<(), ReleaseError<R>> {
        let id = lease.id;
        if !self.shared.owns(id) || !Arc::ptr_eq(&self.shared, &lease.home) {
            warn!(pool_id = %self.shared.id, resource = %id, "release of a resource this pool does not own");
            return Err(ReleaseError {
                lease,
                reason: PoolError::UnknownResource(id),
            });
        }

        let Some(resource) = lease.resource.take() else {
            return Ok(());
        };
        match self.shared.check_in(id.index, resource) {
            Ok(()) => {
                debug!(resource = %id, "resource released");
                Ok(())
            }
            Err(resource) => {
                warn!(resource = %id, "double release detected");
                lease.resource = Some(resource);
                Err(ReleaseError {
                    lease,
                    reason: PoolError::DoubleRelease(id),
                })
            }
        }
    }
}
