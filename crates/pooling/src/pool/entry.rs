//! Pool entries and their identifiers.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

/// Pool-scoped identifier of a resource entry.
///
/// Ids come from a per-pool sequence starting at 1 and wrapping back to 1
/// before `u32::MAX`. Uniqueness only matters among live entries, and no pool
/// holds anywhere near 2^32 resources at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(u32);

impl EntryId {
    /// Wrap a raw id.
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// The raw id.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Monotonic id source for one pool.
#[derive(Debug, Default)]
pub(crate) struct IdSequence {
    last: u32,
}

impl IdSequence {
    #[cfg(test)]
    fn starting_after(last: u32) -> Self {
        Self { last }
    }

    pub(crate) fn next_id(&mut self) -> EntryId {
        self.last = match self.last.checked_add(1) {
            Some(n) if n < u32::MAX => n,
            _ => 1,
        };
        EntryId(self.last)
    }
}

/// A live resource plus the pool's bookkeeping about it.
pub(crate) struct Entry<T> {
    pub(crate) id: EntryId,
    pub(crate) client: Arc<T>,
    alive: bool,
    created_at: Instant,
    last_touched: Instant,
    retired_at: Option<Instant>,
}

impl<T> Entry<T> {
    pub(crate) fn new(id: EntryId, client: T) -> Self {
        let now = Instant::now();
        Self {
            id,
            client: Arc::new(client),
            alive: true,
            created_at: now,
            last_touched: now,
            retired_at: None,
        }
    }

    pub(crate) fn touch(&mut self) {
        self.last_touched = Instant::now();
    }

    pub(crate) fn idle_for(&self) -> Duration {
        self.last_touched.elapsed()
    }

    /// Time from creation to retirement, or to now while still alive.
    pub(crate) fn lifetime(&self) -> Duration {
        self.retired_at
            .unwrap_or_else(Instant::now)
            .saturating_duration_since(self.created_at)
    }

    #[cfg(test)]
    fn is_alive(&self) -> bool {
        self.alive
    }

    pub(crate) fn is(&self, client: &Arc<T>) -> bool {
        Arc::ptr_eq(&self.client, client)
    }

    /// Flip to the terminal state. Returns `false` if already retired.
    pub(crate) fn mark_retired(&mut self) -> bool {
        if !self.alive {
            return false;
        }
        self.alive = false;
        self.retired_at = Some(Instant::now());
        true
    }

    #[cfg(test)]
    fn retired_at(&self) -> Option<Instant> {
        self.retired_at
    }
}
