//! FIFO queue of callers waiting for a resource.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::oneshot;

use crate::error::Result;

/// Single-use continuation of one `acquire` call.
pub(crate) type Waiter<T> = oneshot::Sender<Result<Arc<T>>>;

pub(crate) struct WaiterQueue<T> {
    waiters: VecDeque<Waiter<T>>,
}

impl<T> WaiterQueue<T> {
    pub(crate) fn new() -> Self {
        Self {
            waiters: VecDeque::new(),
        }
    }

    pub(crate) fn push(&mut self, waiter: Waiter<T>) {
        self.waiters.push_back(waiter);
    }

    /// Put a waiter back at the head, ahead of everyone who queued later.
    pub(crate) fn push_front(&mut self, waiter: Waiter<T>) {
        self.waiters.push_front(waiter);
    }

    /// Oldest waiter whose caller is still listening.
    ///
    /// Waiters whose future was dropped are discarded on the way.
    pub(crate) fn pop(&mut self) -> Option<Waiter<T>> {
        while let Some(waiter) = self.waiters.pop_front() {
            if !waiter.is_closed() {
                return Some(waiter);
            }
        }
        None
    }

    /// Waiters still listening; cancelled ones are pruned first.
    pub(crate) fn len(&mut self) -> usize {
        self.waiters.retain(|w| !w.is_closed());
        self.waiters.len()
    }

    #[cfg(test)]
    fn is_empty(&mut self) -> bool {
        self.len() == 0
    }

    pub(crate) fn drain(&mut self) -> impl Iterator<Item = Waiter<T>> + '_ {
        self.waiters.drain(..)
    }
}
