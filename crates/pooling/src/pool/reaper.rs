//! Background reaper: health checks resources that sat idle too long.
//!
//! Each pass withdraws stale idle entries, checks them all concurrently and
//! puts the healthy ones back. The next pass is scheduled only after the
//! previous one has fully finished.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;

use super::{EntryId, Phase, PoolInner, State};
use crate::events::RetireReason;
use crate::resource::Resource;

/// Floor for the delay between passes; a zero interval would busy-loop.
const MIN_CHECK_INTERVAL: Duration = Duration::from_millis(1);

/// Start the reaper loop for `inner`.
///
/// The task holds only a weak reference and exits when the pool is dropped,
/// shut down, or its cancellation token fires.
pub(super) fn spawn<R: Resource>(inner: &Arc<PoolInner<R>>) {
    let weak = Arc::downgrade(inner);
    let cancel = inner.reaper.clone();
    let interval = inner.config.check_interval.max(MIN_CHECK_INTERVAL);

    drop(inner.runtime.spawn(async move {
        loop {
            tokio::select! {
                () = tokio::time::sleep(interval) => {}
                () = cancel.cancelled() => break,
            }
            let Some(inner) = weak.upgrade() else {
                break;
            };
            if !inner.reap_pass().await {
                break;
            }
        }
    }));
}

impl<R: Resource> PoolInner<R> {
    /// Run one pass. Returns `false` if the pool is no longer running.
    pub(super) async fn reap_pass(self: &Arc<Self>) -> bool {
        let probes = {
            let mut state = self.state.lock();
            if state.phase != Phase::Running {
                return false;
            }
            let stale = self.withdraw_stale(&mut state);
            if stale.is_empty() {
                return true;
            }

            let mut probes = Vec::with_capacity(stale.len());
            for id in stale {
                let client = match state.live.get(&id) {
                    Some(entry) => Arc::clone(&entry.client),
                    None => continue,
                };
                let valid = self.validate_locked(&client);
                self.retire_doomed(&mut state);
                if !state.live.contains_key(&id) {
                    continue;
                }
                if valid {
                    state.probing.insert(id);
                    probes.push((id, client));
                } else {
                    self.retire(&mut state, id, RetireReason::ValidationFailed);
                }
            }
            tracing::trace!(
                pool = %self.name(),
                probes = probes.len(),
                idle = state.idle.len(),
                "reaper pass started"
            );
            probes
        };

        let results = join_all(probes.iter().map(|(id, client)| async move {
            (*id, self.resource.check(client).await)
        }))
        .await;

        let mut state = self.state.lock();
        for (id, outcome) in results {
            state.probing.remove(&id);
            if !state.live.contains_key(&id) {
                // Retired while being checked (signal or remove).
                continue;
            }
            match outcome {
                Ok(()) if state.phase == Phase::Running => state.idle.push(id),
                Ok(()) => {
                    self.retire(&mut state, id, RetireReason::Shutdown);
                }
                Err(e) => {
                    tracing::debug!(
                        pool = %self.name(),
                        id = %id,
                        error = %e,
                        "health check failed"
                    );
                    self.retire(&mut state, id, RetireReason::CheckFailed);
                }
            }
        }
        self.settle(&mut state);
        true
    }

    /// Move idle entries untouched for at least `max_idle_time` out of the
    /// idle stack. Fresh entries keep their order.
    fn withdraw_stale(&self, state: &mut State<R::Instance>) -> Vec<EntryId> {
        let max_idle = self.config.max_idle_time;
        let State { idle, live, .. } = state;
        let mut stale = Vec::new();
        idle.retain(|id| match live.get(id) {
            Some(entry) if entry.idle_for() >= max_idle => {
                stale.push(*id);
                false
            }
            _ => true,
        });
        stale
    }
}
