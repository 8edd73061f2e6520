//! Resource pool engine.
//!
//! `Pool<R>` bounds the number of live `R::Instance`s, hands them out to
//! callers, queues callers when the pool is at capacity, retires instances
//! that fail validation, health checks or signal failure, and drains
//! cooperatively on shutdown.
//!
//! All bookkeeping lives behind one mutex. `create` and `check` run without
//! it; `validate` and `destroy` run with it held. A watched signal raised from
//! inside those two is queued and the entry is retired as soon as the
//! collaborator returns, before the pool looks at the entry again.

pub mod config;
mod entry;
mod queue;
mod reaper;
mod reentry;
mod watch;

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, oneshot};
use tokio_util::sync::CancellationToken;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{BoxError, Error, Result};
use crate::events::{EventBus, PoolEvent, RetireReason};
use crate::guard::Guard;
use crate::resource::Resource;

pub use config::{DEFAULT_WATCHED_SIGNALS, PoolConfig};
pub use entry::EntryId;

use entry::{Entry, IdSequence};
use queue::{Waiter, WaiterQueue};
use reentry::LockedScope;
use watch::Watcher;

/// Lifecycle phase of a pool. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Phase {
    /// Accepting work.
    #[default]
    Running,
    /// Shutdown requested; waiting for checked-out resources to come back.
    Draining,
    /// Shutdown complete.
    Closed,
}

/// Point-in-time view of a pool.
#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    /// Resources not yet retired (idle, checked out, or being health checked).
    pub live: usize,
    /// Resources available for hand-out.
    pub idle: usize,
    /// Resources currently lent to callers.
    pub checked_out: usize,
    /// Idle resources temporarily withdrawn for a health check.
    pub probing: usize,
    /// Creations in flight.
    pub pending: usize,
    /// Callers queued for capacity.
    pub waiters: usize,
    /// Current phase.
    pub phase: Phase,
    /// Signal handlers the pool has installed on live clients.
    pub subscriptions: usize,
    /// Total resources ever created.
    pub created: u64,
    /// Total resources ever retired.
    pub destroyed: u64,
    /// Total successful hand-outs.
    pub acquisitions: u64,
}

/// Mutable pool state, guarded by `PoolInner::state`.
struct State<T> {
    phase: Phase,
    live: HashMap<EntryId, Entry<T>>,
    /// LIFO: the most recently returned entry is handed out first.
    idle: Vec<EntryId>,
    probing: HashSet<EntryId>,
    pending: usize,
    waiters: WaiterQueue<T>,
    ids: IdSequence,
    watcher: Watcher,
    on_closed: Vec<oneshot::Sender<()>>,
    created: u64,
    destroyed: u64,
    acquisitions: u64,
}

impl<T> State<T> {
    fn new(capacity: usize) -> Self {
        Self {
            phase: Phase::Running,
            live: HashMap::with_capacity(capacity),
            idle: Vec::with_capacity(capacity),
            probing: HashSet::new(),
            pending: 0,
            waiters: WaiterQueue::new(),
            ids: IdSequence::default(),
            watcher: Watcher::default(),
            on_closed: Vec::new(),
            created: 0,
            destroyed: 0,
            acquisitions: 0,
        }
    }

    fn has_capacity(&self, max: usize) -> bool {
        self.live.len() + self.pending < max
    }

    /// Nothing is lent out or being health checked.
    fn fully_idle(&self) -> bool {
        self.idle.len() == self.live.len()
    }

    fn find(&self, client: &Arc<T>) -> Option<EntryId> {
        self.live.values().find(|e| e.is(client)).map(|e| e.id)
    }

    fn is_checked_out(&self, id: EntryId) -> bool {
        !self.probing.contains(&id) && !self.idle.contains(&id)
    }
}

/// What happened to a continuation handed to [`PoolInner::dispatch`].
enum Dispatch {
    Delivered,
    Creating,
    Rejected,
    Abandoned,
}

/// Inner shared state for the pool.
pub(crate) struct PoolInner<R: Resource> {
    resource: R,
    config: PoolConfig,
    state: Mutex<State<R::Instance>>,
    events: EventBus<R::Instance>,
    runtime: Handle,
    /// Cancelled on shutdown (and drop) to stop the reaper.
    reaper: CancellationToken,
    /// Signals that fired while this pool's lock was held by the firing
    /// thread. Only touched with `state` locked.
    doomed: Mutex<VecDeque<(EntryId, String)>>,
}

impl<R: Resource> Drop for PoolInner<R> {
    fn drop(&mut self) {
        self.reaper.cancel();
    }
}

impl<R: Resource> PoolInner<R> {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn addr(&self) -> usize {
        std::ptr::from_ref(self).addr()
    }

    /// Run `validate` with the lock held. Follow with [`Self::retire_doomed`].
    fn validate_locked(&self, client: &R::Instance) -> bool {
        let _scope = LockedScope::enter(self.addr());
        self.resource.validate(client)
    }

    /// Serve one continuation: idle entry, new creation, or refusal.
    ///
    /// Gives the waiter back when the pool is at capacity so the caller can
    /// decide where in the queue it belongs.
    fn dispatch(
        self: &Arc<Self>,
        state: &mut State<R::Instance>,
        waiter: Waiter<R::Instance>,
    ) -> std::result::Result<Dispatch, Waiter<R::Instance>> {
        match state.phase {
            Phase::Running => {}
            Phase::Draining => {
                let _ = waiter.send(Err(Error::closing(self.name())));
                return Ok(Dispatch::Rejected);
            }
            Phase::Closed => {
                let _ = waiter.send(Err(Error::closed(self.name())));
                return Ok(Dispatch::Rejected);
            }
        }
        if waiter.is_closed() {
            return Ok(Dispatch::Abandoned);
        }

        while let Some(id) = state.idle.pop() {
            let Some(entry) = state.live.get_mut(&id) else {
                continue;
            };
            entry.touch();
            let client = Arc::clone(&entry.client);
            let valid = self.validate_locked(&client);
            self.retire_doomed(state);
            if !state.live.contains_key(&id) {
                continue;
            }
            if !valid {
                self.retire(state, id, RetireReason::ValidationFailed);
                continue;
            }
            if waiter.send(Ok(client)).is_err() {
                state.idle.push(id);
                return Ok(Dispatch::Abandoned);
            }
            state.acquisitions += 1;
            tracing::trace!(pool = %self.name(), id = %id, "handed out idle resource");
            return Ok(Dispatch::Delivered);
        }

        if state.has_capacity(self.config.max_resources) {
            state.pending += 1;
            self.spawn_create(waiter);
            return Ok(Dispatch::Creating);
        }

        Err(waiter)
    }

    fn spawn_create(self: &Arc<Self>, waiter: Waiter<R::Instance>) {
        let inner = Arc::clone(self);
        drop(self.runtime.spawn(async move {
            let result = inner.resource.create().await;
            inner.finish_create(result, waiter);
        }));
    }

    fn finish_create(
        self: &Arc<Self>,
        result: std::result::Result<R::Instance, BoxError>,
        waiter: Waiter<R::Instance>,
    ) {
        let mut state = self.state.lock();
        state.pending = state.pending.saturating_sub(1);

        let client = match result {
            Ok(client) => client,
            Err(source) => {
                tracing::debug!(pool = %self.name(), error = %source, "resource creation failed");
                let _ = waiter.send(Err(Error::CreateFailed {
                    pool: self.name().to_owned(),
                    source,
                }));
                self.settle(&mut state);
                return;
            }
        };

        // Shutdown began while this one was being built: never absorb it.
        if state.phase != Phase::Running {
            tracing::debug!(pool = %self.name(), "discarding resource created during shutdown");
            self.destroy_client(None, &client);
            self.retire_doomed(&mut state);
            let _ = waiter.send(Err(Error::closing(self.name())));
            return;
        }

        let id = state.ids.next_id();
        let entry = Entry::new(id, client);
        let client = Arc::clone(&entry.client);
        self.watch(&mut state, &entry);
        state.live.insert(id, entry);
        state.created += 1;
        tracing::debug!(pool = %self.name(), id = %id, live = state.live.len(), "created resource");
        self.events.emit(PoolEvent::Created {
            id,
            client: Arc::clone(&client),
        });

        if waiter.send(Ok(client)).is_ok() {
            state.acquisitions += 1;
        } else {
            // Nobody is waiting for it any more; treat it as returned.
            state.idle.push(id);
            self.settle(&mut state);
        }
    }

    fn watch(self: &Arc<Self>, state: &mut State<R::Instance>, entry: &Entry<R::Instance>) {
        let Some(signals) = self.resource.signals(&entry.client) else {
            return;
        };
        let weak = Arc::downgrade(self);
        state.watcher.watch(
            entry.id,
            signals,
            &self.config.watched_signals,
            move |id, signal| {
                if let Some(inner) = weak.upgrade() {
                    inner.on_signal(id, signal);
                }
            },
        );
    }

    fn on_signal(self: &Arc<Self>, id: EntryId, signal: &str) {
        // Raised from `validate`/`destroy` on the thread that holds the lock:
        // leave it for the caller, which drains the queue once they return.
        if reentry::is_held(self.addr()) {
            self.doomed.lock().push_back((id, signal.to_owned()));
            return;
        }
        let mut state = self.state.lock();
        tracing::debug!(
            pool = %self.name(),
            id = %id,
            signal,
            "client signal triggered retirement"
        );
        if self.retire(&mut state, id, RetireReason::Signal(signal.to_owned())) {
            self.settle(&mut state);
        }
    }

    /// Retire every entry whose signal fired under the lock. The caller
    /// settles afterwards.
    fn retire_doomed(&self, state: &mut State<R::Instance>) {
        loop {
            let next = self.doomed.lock().pop_front();
            let Some((id, signal)) = next else {
                break;
            };
            tracing::debug!(
                pool = %self.name(),
                id = %id,
                signal,
                "client signal triggered retirement"
            );
            self.retire(state, id, RetireReason::Signal(signal));
        }
    }

    /// The single retirement path. Idempotent: retiring an entry that is no
    /// longer live does nothing and returns `false`.
    fn retire(&self, state: &mut State<R::Instance>, id: EntryId, reason: RetireReason) -> bool {
        let Some(mut entry) = state.live.remove(&id) else {
            return false;
        };
        if !entry.mark_retired() {
            return false;
        }
        state.idle.retain(|idle| *idle != id);
        state.probing.remove(&id);
        // Unsubscribe before destroy so a close emitted by destroy finds no handler.
        let detached = state
            .watcher
            .detach(id, self.resource.signals(&entry.client));
        self.destroy_client(Some(id), &entry.client);
        state.destroyed += 1;

        tracing::debug!(
            pool = %self.name(),
            id = %id,
            reason = %reason,
            lived_ms = entry.lifetime().as_millis() as u64,
            detached,
            "retired resource"
        );
        self.events.emit(PoolEvent::Death {
            id,
            client: entry.client,
            reason,
        });
        // `destroy` may have signalled on behalf of other clients.
        self.retire_doomed(state);
        true
    }

    /// Run `destroy` with the lock held. Errors are logged and dropped.
    fn destroy_client(&self, id: Option<EntryId>, client: &R::Instance) {
        let _scope = LockedScope::enter(self.addr());
        if let Err(e) = self.resource.destroy(client) {
            tracing::warn!(
                pool = %self.name(),
                id = ?id.map(EntryId::get),
                error = %e,
                "destroy failed"
            );
        }
    }

    /// Follow-up after anything that may have freed an idle entry or
    /// capacity: serve queued callers first, otherwise report a drain and,
    /// while draining, complete the shutdown.
    fn settle(self: &Arc<Self>, state: &mut State<R::Instance>) {
        let mut served = false;
        if state.phase == Phase::Running {
            while !state.idle.is_empty() || state.has_capacity(self.config.max_resources) {
                let Some(waiter) = state.waiters.pop() else {
                    break;
                };
                match self.dispatch(state, waiter) {
                    Ok(Dispatch::Delivered | Dispatch::Creating) => served = true,
                    Ok(Dispatch::Rejected | Dispatch::Abandoned) => {}
                    Err(waiter) => {
                        state.waiters.push_front(waiter);
                        break;
                    }
                }
            }
        }

        if served || !state.fully_idle() {
            return;
        }
        match state.phase {
            Phase::Running => {
                tracing::trace!(pool = %self.name(), idle = state.idle.len(), "pool drained");
                self.events.emit(PoolEvent::Drain);
            }
            Phase::Draining => {
                self.events.emit(PoolEvent::Drain);
                self.finalize(state);
            }
            Phase::Closed => {}
        }
    }

    /// Retire everything that is left and move to `Closed`.
    fn finalize(&self, state: &mut State<R::Instance>) {
        let ids: Vec<EntryId> = state.live.keys().copied().collect();
        for id in ids {
            self.retire(state, id, RetireReason::Shutdown);
        }
        state.phase = Phase::Closed;
        tracing::debug!(pool = %self.name(), destroyed = state.destroyed, "pool closed");
        self.events.emit(PoolEvent::End);
        for done in state.on_closed.drain(..) {
            let _ = done.send(());
        }
    }
}

// ---------------------------------------------------------------------------
// Pool<R>
// ---------------------------------------------------------------------------

/// Generic resource pool.
///
/// Cheap to clone; all clones share one pool. Dropping every handle stops
/// the reaper but does not destroy live resources; call
/// [`shutdown`](Pool::shutdown) for that.
pub struct Pool<R: Resource> {
    inner: Arc<PoolInner<R>>,
}

impl<R: Resource> Clone for Pool<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: Resource> fmt::Debug for Pool<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("name", &self.inner.config.name)
            .field("stats", &self.stats())
            .finish()
    }
}

impl<R: Resource> Pool<R> {
    /// Create a pool and start its reaper.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] if `config` is invalid or if called
    /// outside a Tokio runtime.
    pub fn new(resource: R, config: PoolConfig) -> Result<Self> {
        config.validate()?;
        let runtime = Handle::try_current()
            .map_err(|_| Error::invalid_config("a pool must be created inside a Tokio runtime"))?;

        let inner = Arc::new(PoolInner {
            resource,
            state: Mutex::new(State::new(config.max_resources)),
            events: EventBus::new(config.event_buffer),
            runtime,
            reaper: CancellationToken::new(),
            doomed: Mutex::new(VecDeque::new()),
            config,
        });
        reaper::spawn(&inner);
        tracing::debug!(
            pool = %inner.config.name,
            max_resources = inner.config.max_resources,
            "pool created"
        );
        Ok(Self { inner })
    }

    /// Acquire a resource.
    ///
    /// Hands out the most recently returned idle resource, starts a new
    /// creation if there is capacity, or waits in line behind earlier callers.
    /// Fails immediately once shutdown has begun.
    ///
    /// The caller must give the resource back with [`release`](Pool::release)
    /// (or [`remove`](Pool::remove)); [`get`](Pool::get) does that
    /// automatically. Dropping this future before it completes gives up the
    /// place in line without losing any resource.
    pub async fn acquire(&self) -> Result<Arc<R::Instance>> {
        let (tx, rx) = oneshot::channel();
        {
            let mut state = self.inner.state.lock();
            if let Err(waiter) = self.inner.dispatch(&mut state, tx) {
                state.waiters.push(waiter);
                tracing::trace!(
                    pool = %self.inner.name(),
                    waiters = state.waiters.len(),
                    "pool at capacity, caller queued"
                );
            }
        }

        let mut claim = Claim {
            pool: self,
            rx,
            settled: false,
        };
        let outcome = (&mut claim.rx).await;
        claim.settled = true;
        outcome.unwrap_or_else(|_| {
            Err(Error::CreateFailed {
                pool: self.inner.name().to_owned(),
                source: "resource creation was aborted".into(),
            })
        })
    }

    /// Acquire a resource wrapped in a [`Guard`] that releases it on drop.
    pub async fn get(&self) -> Result<Guard<R>> {
        let client = self.acquire().await?;
        Ok(Guard::new(self.clone(), client))
    }

    /// Return a resource to the pool.
    ///
    /// Returns `false` if `client` is not a checked-out resource of this
    /// pool (already released, retired, or foreign); nothing happens then.
    pub fn release(&self, client: &Arc<R::Instance>) -> bool {
        let inner = &self.inner;
        let mut state = inner.state.lock();
        let Some(id) = state.find(client) else {
            tracing::trace!(pool = %inner.name(), "release of unknown client");
            return false;
        };
        if !state.is_checked_out(id) {
            tracing::trace!(
                pool = %inner.name(),
                id = %id,
                "release of resource that is not checked out"
            );
            return false;
        }

        if let Some(entry) = state.live.get_mut(&id) {
            entry.touch();
        }
        let valid = inner.validate_locked(client);
        inner.retire_doomed(&mut state);
        // Not live any more if `validate` raised a watched signal.
        if state.live.contains_key(&id) {
            if !valid {
                inner.retire(&mut state, id, RetireReason::ValidationFailed);
            } else if state.phase == Phase::Running {
                state.idle.push(id);
                tracing::trace!(pool = %inner.name(), id = %id, "resource released");
            } else {
                inner.retire(&mut state, id, RetireReason::Shutdown);
            }
        }
        inner.settle(&mut state);
        true
    }

    /// Retire a live resource on request, whether checked out or idle.
    ///
    /// Returns whether a matching live resource was found.
    pub fn remove(&self, client: &Arc<R::Instance>) -> bool {
        let inner = &self.inner;
        let mut state = inner.state.lock();
        let Some(id) = state.find(client) else {
            return false;
        };
        inner.retire(&mut state, id, RetireReason::Removed);
        inner.settle(&mut state);
        true
    }

    /// Shut the pool down.
    ///
    /// New acquisitions fail from the moment this is called and queued
    /// callers are failed with [`Error::PoolClosing`]. Completes once every
    /// checked-out resource has been released or retired; then all remaining
    /// resources are destroyed and [`PoolEvent::End`] is emitted. Calling it
    /// again (or concurrently) waits for the same completion.
    pub async fn shutdown(&self) {
        let inner = &self.inner;
        let done = {
            let mut state = inner.state.lock();
            match state.phase {
                Phase::Closed => return,
                Phase::Running => {
                    state.phase = Phase::Draining;
                    inner.reaper.cancel();
                    let closing = inner.name();
                    for waiter in state.waiters.drain() {
                        let _ = waiter.send(Err(Error::closing(closing)));
                    }
                    tracing::debug!(
                        pool = %inner.name(),
                        live = state.live.len(),
                        idle = state.idle.len(),
                        "pool draining"
                    );
                }
                Phase::Draining => {}
            }
            if state.fully_idle() {
                inner.finalize(&mut state);
                return;
            }
            let (tx, rx) = oneshot::channel();
            state.on_closed.push(tx);
            rx
        };
        let _ = done.await;
    }

    /// Run one reaper pass now instead of waiting for the next interval.
    pub async fn reap(&self) {
        self.inner.reap_pass().await;
    }

    /// Subscribe to lifecycle events emitted after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PoolEvent<R::Instance>> {
        self.inner.events.subscribe()
    }

    /// Get current pool statistics.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let mut state = self.inner.state.lock();
        let waiters = state.waiters.len();
        PoolStats {
            live: state.live.len(),
            idle: state.idle.len(),
            checked_out: state.live.len() - state.idle.len() - state.probing.len(),
            probing: state.probing.len(),
            pending: state.pending,
            waiters,
            phase: state.phase,
            subscriptions: state.watcher.subscriptions(),
            created: state.created,
            destroyed: state.destroyed,
            acquisitions: state.acquisitions,
        }
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.inner.state.lock().phase
    }

    /// The pool's configuration.
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// The pool's name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.inner.name()
    }

    /// The resource collaborator.
    #[must_use]
    pub fn resource(&self) -> &R {
        &self.inner.resource
    }
}

/// In-flight `acquire`. If the future is dropped after a resource was
/// delivered but before it was observed, the resource goes straight back.
struct Claim<'a, R: Resource> {
    pool: &'a Pool<R>,
    rx: oneshot::Receiver<Result<Arc<R::Instance>>>,
    settled: bool,
}

impl<R: Resource> Drop for Claim<'_, R> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        self.rx.close();
        if let Ok(Ok(client)) = self.rx.try_recv() {
            self.pool.release(&client);
        }
    }
}
