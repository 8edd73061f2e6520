//! Cooperative drain-and-shutdown.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use pooling::{BoxError, Error, Phase, Pool, PoolConfig, PoolEvent, Resource, RetireReason, Signals};
use pretty_assertions::assert_eq;
use tokio::sync::{Semaphore, broadcast};

// ---------------------------------------------------------------------------
// Test resource
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Worker {
    id: u32,
    killed: AtomicBool,
    signals: Signals,
}

#[derive(Default)]
struct Workers {
    next: AtomicU32,
    destroyed: AtomicU32,
    /// When set, each creation waits for a permit.
    gate: Option<Arc<Semaphore>>,
}

impl Resource for Workers {
    type Instance = Worker;

    async fn create(&self) -> Result<Worker, BoxError> {
        if let Some(gate) = &self.gate {
            gate.acquire().await?.forget();
        }
        Ok(Worker {
            id: self.next.fetch_add(1, Ordering::SeqCst) + 1,
            killed: AtomicBool::new(false),
            signals: Signals::new(),
        })
    }

    fn destroy(&self, worker: &Worker) -> Result<(), BoxError> {
        worker.killed.store(true, Ordering::SeqCst);
        self.destroyed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn signals<'a>(&self, worker: &'a Worker) -> Option<&'a Signals> {
        Some(&worker.signals)
    }
}

fn pool_with(workers: Workers, max: usize) -> Pool<Workers> {
    Pool::new(
        workers,
        PoolConfig {
            name: "shutdown_test".to_string(),
            ..PoolConfig::with_max_resources(max)
        },
    )
    .unwrap()
}

fn pool(max: usize) -> Pool<Workers> {
    pool_with(Workers::default(), max)
}

async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..1_000 {
        if cond() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition was never reached");
}

fn spawn_shutdown(pool: &Pool<Workers>) -> tokio::task::JoinHandle<()> {
    let pool = pool.clone();
    tokio::spawn(async move { pool.shutdown().await })
}

fn count_ends(events: &mut broadcast::Receiver<PoolEvent<Worker>>) -> usize {
    let mut ends = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, PoolEvent::End) {
            ends += 1;
        }
    }
    ends
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn shutdown_rejects_new_acquisitions() {
    let pool = pool(2);
    let held = pool.acquire().await.unwrap();

    let shutdown = spawn_shutdown(&pool);
    wait_until(|| pool.phase() == Phase::Draining).await;

    let err = pool.acquire().await.unwrap_err();
    assert!(matches!(err, Error::PoolClosing { .. }), "got {err:?}");
    assert!(err.is_shutdown());
    assert!(!err.is_retryable());

    assert!(pool.release(&held));
    shutdown.await.unwrap();

    let err = pool.acquire().await.unwrap_err();
    assert!(matches!(err, Error::PoolClosed { .. }), "got {err:?}");
}

#[tokio::test]
async fn shutdown_waits_for_every_outstanding_client() {
    let pool = pool(3);
    let a = pool.acquire().await.unwrap();
    let b = pool.acquire().await.unwrap();
    let c = pool.acquire().await.unwrap();
    pool.release(&a);
    let mut events = pool.subscribe();

    let shutdown = spawn_shutdown(&pool);
    wait_until(|| pool.phase() == Phase::Draining).await;

    // Returned clients are retired right away, never reused.
    assert!(pool.release(&b));
    assert!(b.killed.load(Ordering::SeqCst));
    assert!(!a.killed.load(Ordering::SeqCst), "idle clients wait for finalization");
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert!(!shutdown.is_finished());

    assert!(pool.release(&c));
    shutdown.await.unwrap();

    assert_eq!(pool.phase(), Phase::Closed);
    for worker in [&a, &b, &c] {
        assert!(worker.killed.load(Ordering::SeqCst), "worker {} survived", worker.id);
    }
    let stats = pool.stats();
    assert_eq!(stats.live, 0);
    assert_eq!(stats.destroyed, 3);
    assert_eq!(count_ends(&mut events), 1);
}

#[tokio::test]
async fn shutdown_of_idle_pool_completes_immediately() {
    let pool = pool(2);
    let a = pool.acquire().await.unwrap();
    let b = pool.acquire().await.unwrap();
    pool.release(&a);
    pool.release(&b);
    let mut events = pool.subscribe();

    pool.shutdown().await;

    assert_eq!(pool.phase(), Phase::Closed);
    assert_eq!(pool.resource().destroyed.load(Ordering::SeqCst), 2);
    let mut reasons = Vec::new();
    let mut saw_end = false;
    while let Ok(event) = events.try_recv() {
        match event {
            PoolEvent::Death { reason, .. } => {
                assert!(!saw_end, "death after end");
                reasons.push(reason);
            }
            PoolEvent::End => saw_end = true,
            _ => {}
        }
    }
    assert_eq!(reasons, vec![RetireReason::Shutdown, RetireReason::Shutdown]);
    assert!(saw_end);
}

#[tokio::test]
async fn queued_waiters_fail_when_shutdown_begins() {
    let pool = pool(1);
    let held = pool.acquire().await.unwrap();

    let mut waiters = Vec::new();
    for _ in 0..3 {
        let pool = pool.clone();
        waiters.push(tokio::spawn(async move { pool.acquire().await }));
    }
    wait_until(|| pool.stats().waiters == 3).await;

    let shutdown = spawn_shutdown(&pool);
    for waiter in waiters {
        let err = waiter.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::PoolClosing { .. }), "got {err:?}");
    }
    assert_eq!(pool.stats().waiters, 0);

    pool.release(&held);
    shutdown.await.unwrap();
    assert!(held.killed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn client_created_during_shutdown_is_destroyed() {
    let gate = Arc::new(Semaphore::new(0));
    let pool = pool_with(
        Workers {
            gate: Some(gate.clone()),
            ..Workers::default()
        },
        2,
    );

    let acquire = tokio::spawn({
        let pool = pool.clone();
        async move { pool.acquire().await }
    });
    wait_until(|| pool.stats().pending == 1).await;

    pool.shutdown().await;
    assert_eq!(pool.phase(), Phase::Closed);

    gate.add_permits(1);
    let err = acquire.await.unwrap().unwrap_err();
    assert!(matches!(err, Error::PoolClosing { .. }), "got {err:?}");

    let stats = pool.stats();
    assert_eq!(stats.pending, 0);
    assert_eq!(stats.live, 0);
    assert_eq!(stats.created, 0);
    assert_eq!(pool.resource().destroyed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn signal_retirement_completes_pending_shutdown() {
    let pool = pool(2);
    let held = pool.acquire().await.unwrap();

    let shutdown = spawn_shutdown(&pool);
    wait_until(|| pool.phase() == Phase::Draining).await;

    held.signals.emit("error");
    shutdown.await.unwrap();

    assert_eq!(pool.phase(), Phase::Closed);
    assert!(held.killed.load(Ordering::SeqCst));
    assert!(!pool.release(&held));
}

#[tokio::test]
async fn remove_completes_pending_shutdown() {
    let pool = pool(2);
    let held = pool.acquire().await.unwrap();

    let shutdown = spawn_shutdown(&pool);
    wait_until(|| pool.phase() == Phase::Draining).await;

    assert!(pool.remove(&held));
    shutdown.await.unwrap();
    assert_eq!(pool.phase(), Phase::Closed);
}

#[tokio::test]
async fn concurrent_shutdowns_share_one_end() {
    let pool = pool(2);
    let held = pool.acquire().await.unwrap();
    let mut events = pool.subscribe();

    let first = spawn_shutdown(&pool);
    let second = spawn_shutdown(&pool);
    wait_until(|| pool.phase() == Phase::Draining).await;
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }

    pool.release(&held);
    first.await.unwrap();
    second.await.unwrap();
    pool.shutdown().await;

    assert_eq!(count_ends(&mut events), 1);
}

#[tokio::test]
async fn guard_dropped_during_shutdown_retires_client() {
    let pool = pool(1);
    let guard = pool.get().await.unwrap();
    let shutdown = spawn_shutdown(&pool);
    wait_until(|| pool.phase() == Phase::Draining).await;

    drop(guard);
    shutdown.await.unwrap();
    assert_eq!(pool.resource().destroyed.load(Ordering::SeqCst), 1);
}
