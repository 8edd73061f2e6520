//! Invalidation watcher: retires a client as soon as it signals failure.
//!
//! Every subscription the pool makes on a client is recorded here, keyed by
//! entry id, so that retirement can remove exactly those handlers and
//! nothing is left behind on a client that outlives its entry.

use std::collections::{BTreeSet, HashMap};

use crate::pool::EntryId;
use crate::signal::{Signals, SubscriptionId};

#[derive(Debug, Default)]
pub(crate) struct Watcher {
    subscriptions: HashMap<EntryId, Vec<SubscriptionId>>,
}

impl Watcher {
    /// Subscribe `on_signal` once per watched signal on `signals`.
    ///
    /// `on_signal` is cloned into each handler; whichever fires first wins,
    /// the rest are removed by [`Watcher::detach`].
    pub(crate) fn watch<F>(
        &mut self,
        id: EntryId,
        signals: &Signals,
        watched: &BTreeSet<String>,
        on_signal: F,
    ) where
        F: Fn(EntryId, &str) + Clone + Send + 'static,
    {
        let subs = watched
            .iter()
            .map(|name| {
                let on_signal = on_signal.clone();
                signals.once(name, move |fired| on_signal(id, fired))
            })
            .collect::<Vec<_>>();
        if !subs.is_empty() {
            self.subscriptions.insert(id, subs);
        }
    }

    /// Remove every handler registered for `id`. Returns how many were
    /// still pending on the client.
    pub(crate) fn detach(&mut self, id: EntryId, signals: Option<&Signals>) -> usize {
        let Some(subs) = self.subscriptions.remove(&id) else {
            return 0;
        };
        let Some(signals) = signals else {
            return 0;
        };
        subs.into_iter()
            .filter(|sub| signals.unsubscribe(*sub))
            .count()
    }

    /// Entries that currently have handlers installed.
    #[cfg(test)]
    fn watched_entries(&self) -> usize {
        self.subscriptions.len()
    }

    /// Total recorded handlers across all entries.
    pub(crate) fn subscriptions(&self) -> usize {
        self.subscriptions.values().map(Vec::len).sum()
    }
}
