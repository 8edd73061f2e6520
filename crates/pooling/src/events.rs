//! Event broadcasting for pool lifecycle observability.
//!
//! Provides [`PoolEvent`] variants emitted by the pool engine and an
//! [`EventBus`] backed by `tokio::sync::broadcast`.

use std::fmt;
use std::sync::Arc;

use tokio::sync::broadcast;

use crate::pool::EntryId;

// ---------------------------------------------------------------------------
// PoolEvent
// ---------------------------------------------------------------------------

/// Notifications emitted by a pool.
///
/// Subscribers receive cloned copies via [`EventBus::subscribe`]. Clients are
/// carried as `Arc`s, so an event never keeps a retired instance usable by
/// the pool; it only keeps the memory alive for the subscriber.
pub enum PoolEvent<T> {
    /// A new resource was created and registered.
    Created {
        /// Entry identifier.
        id: EntryId,
        /// The new client.
        client: Arc<T>,
    },
    /// A resource was permanently retired and destroyed.
    Death {
        /// Entry identifier.
        id: EntryId,
        /// The retired client.
        client: Arc<T>,
        /// Why it was retired.
        reason: RetireReason,
    },
    /// No resource is checked out.
    Drain,
    /// Shutdown completed.
    End,
}

impl<T> Clone for PoolEvent<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Created { id, client } => Self::Created {
                id: *id,
                client: Arc::clone(client),
            },
            Self::Death { id, client, reason } => Self::Death {
                id: *id,
                client: Arc::clone(client),
                reason: reason.clone(),
            },
            Self::Drain => Self::Drain,
            Self::End => Self::End,
        }
    }
}

impl<T> fmt::Debug for PoolEvent<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created { id, .. } => f.debug_struct("Created").field("id", id).finish(),
            Self::Death { id, reason, .. } => f
                .debug_struct("Death")
                .field("id", id)
                .field("reason", reason)
                .finish(),
            Self::Drain => f.write_str("Drain"),
            Self::End => f.write_str("End"),
        }
    }
}

// ---------------------------------------------------------------------------
// RetireReason
// ---------------------------------------------------------------------------

/// Reason a resource was permanently removed from the pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetireReason {
    /// The reaper's health check reported the resource unhealthy.
    CheckFailed,
    /// The synchronous validator rejected the resource.
    ValidationFailed,
    /// The client emitted a watched lifecycle signal.
    Signal(String),
    /// The pool is shutting down.
    Shutdown,
    /// A caller asked for the resource to be removed.
    Removed,
}

impl fmt::Display for RetireReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CheckFailed => f.write_str("health check failed"),
            Self::ValidationFailed => f.write_str("validation failed"),
            Self::Signal(name) => write!(f, "signal '{name}'"),
            Self::Shutdown => f.write_str("shutdown"),
            Self::Removed => f.write_str("removed"),
        }
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Broadcast-based event bus for pool lifecycle events.
///
/// Emission is fire-and-forget: if no subscribers are listening or the
/// channel is full, events are silently dropped (no backpressure on the
/// emitter, which runs with the pool lock held).
pub struct EventBus<T> {
    sender: broadcast::Sender<PoolEvent<T>>,
}

impl<T> EventBus<T> {
    /// Create a new event bus with the given buffer size.
    ///
    /// # Panics
    /// Panics if `buffer_size` is zero; [`PoolConfig`](crate::PoolConfig)
    /// validation rejects that before a pool gets here.
    #[must_use]
    pub fn new(buffer_size: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer_size);
        Self { sender }
    }

    /// Emit an event to all current subscribers.
    pub fn emit(&self, event: PoolEvent<T>) {
        // An error only means nobody is subscribed.
        let _ = self.sender.send(event);
    }

    /// Subscribe to events emitted after this call.
    ///
    /// A subscriber that falls behind by more than the buffer size receives
    /// a `Lagged` error and skips to the latest event.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PoolEvent<T>> {
        self.sender.subscribe()
    }
}

impl<T> fmt::Debug for EventBus<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.sender.receiver_count())
            .finish()
    }
}
