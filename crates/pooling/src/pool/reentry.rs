//! Per-thread record of pools that are running a collaborator (`validate`,
//! `destroy`) while holding their own state lock.
//!
//! A signal handler consults it to tell a re-entrant call, which must not
//! take the lock again, from an ordinary call that should simply wait for it.

use std::cell::RefCell;

thread_local! {
    static HELD: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

/// Marks the pool at `addr` as locked by this thread until dropped.
#[must_use = "the scope ends as soon as it is dropped"]
pub(super) struct LockedScope {
    addr: usize,
}

impl LockedScope {
    pub(super) fn enter(addr: usize) -> Self {
        HELD.with(|held| held.borrow_mut().push(addr));
        Self { addr }
    }
}

impl Drop for LockedScope {
    fn drop(&mut self) {
        HELD.with(|held| {
            let mut held = held.borrow_mut();
            if let Some(pos) = held.iter().rposition(|a| *a == self.addr) {
                held.remove(pos);
            }
        });
    }
}

/// Whether this thread is inside a [`LockedScope`] for the pool at `addr`.
pub(super) fn is_held(addr: usize) -> bool {
    HELD.with(|held| held.borrow().contains(&addr))
}
