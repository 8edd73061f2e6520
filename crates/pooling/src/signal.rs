//! Lifecycle signals emitted by pooled clients.
//!
//! A client type embeds a [`Signals`] and calls [`Signals::emit`] when
//! something happens to it (`"close"`, `"error"`, ...). The pool registers
//! one-shot handlers through [`Resource::signals`](crate::Resource::signals)
//! and removes them again when the client is retired.

use std::collections::HashMap;
use std::fmt;

use parking_lot::Mutex;

/// Handle identifying one registered handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

type Handler = Box<dyn FnOnce(&str) + Send>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    handlers: HashMap<String, Vec<(SubscriptionId, Handler)>>,
}

/// Thread-safe emitter of named, one-shot lifecycle signals.
#[derive(Default)]
pub struct Signals {
    registry: Mutex<Registry>,
}

impl Signals {
    /// Create an emitter with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` to run the next time `signal` is emitted.
    ///
    /// The handler is removed before it runs, so it fires at most once.
    pub fn once<F>(&self, signal: &str, handler: F) -> SubscriptionId
    where
        F: FnOnce(&str) + Send + 'static,
    {
        let mut registry = self.registry.lock();
        registry.next_id += 1;
        let id = SubscriptionId(registry.next_id);
        registry
            .handlers
            .entry(signal.to_owned())
            .or_default()
            .push((id, Box::new(handler)));
        id
    }

    /// Remove a handler. Returns `false` if it already fired or was removed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut registry = self.registry.lock();
        let mut found = false;
        registry.handlers.retain(|_, handlers| {
            let before = handlers.len();
            handlers.retain(|(sub, _)| *sub != id);
            found |= handlers.len() != before;
            !handlers.is_empty()
        });
        found
    }

    /// Fire `signal`, running every handler registered for it.
    ///
    /// Handlers run after the internal lock is released, so a handler may
    /// subscribe or unsubscribe on this same emitter. Returns the number of
    /// handlers that ran.
    pub fn emit(&self, signal: &str) -> usize {
        let handlers = self
            .registry
            .lock()
            .handlers
            .remove(signal)
            .unwrap_or_default();
        let count = handlers.len();
        for (_, handler) in handlers {
            handler(signal);
        }
        count
    }

    /// Number of handlers waiting on `signal`.
    #[must_use]
    pub fn listener_count(&self, signal: &str) -> usize {
        self.registry
            .lock()
            .handlers
            .get(signal)
            .map_or(0, Vec::len)
    }

    /// Number of handlers waiting on any signal.
    #[must_use]
    pub fn total_listeners(&self) -> usize {
        self.registry.lock().handlers.values().map(Vec::len).sum()
    }
}

impl fmt::Debug for Signals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.registry.lock();
        let mut signals: Vec<&str> = registry.handlers.keys().map(String::as_str).collect();
        signals.sort_unstable();
        f.debug_struct("Signals")
            .field("signals", &signals)
            .finish()
    }
}
