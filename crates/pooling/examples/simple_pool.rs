//! Simple pooling example
//!
//! Lends out simulated connections, lets one of them fail through a
//! lifecycle signal, and shuts the pool down. Run with
//! `RUST_LOG=pooling=debug` to see the pool's own log lines.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use pooling::{BoxError, Pool, PoolConfig, PoolEvent, Resource, Signals};
use tracing_subscriber::EnvFilter;

/// Simulated database connection
#[derive(Debug)]
struct Connection {
    id: u32,
    signals: Signals,
}

/// Opens connections to a fake host
struct ConnectionResource {
    host: String,
    opened: AtomicU32,
}

impl Resource for ConnectionResource {
    type Instance = Connection;

    async fn create(&self) -> Result<Connection, BoxError> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let id = self.opened.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!(host = %self.host, id, "connection opened");
        Ok(Connection {
            id,
            signals: Signals::new(),
        })
    }

    async fn check(&self, _conn: &Connection) -> Result<(), BoxError> {
        Ok(())
    }

    fn destroy(&self, conn: &Connection) -> Result<(), BoxError> {
        tracing::info!(host = %self.host, id = conn.id, "connection closed");
        Ok(())
    }

    fn signals<'a>(&self, conn: &'a Connection) -> Option<&'a Signals> {
        Some(&conn.signals)
    }
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let pool = Pool::new(
        ConnectionResource {
            host: "localhost".to_string(),
            opened: AtomicU32::new(0),
        },
        PoolConfig {
            name: "example".to_string(),
            max_idle_time: Duration::from_secs(60),
            check_interval: Duration::from_secs(10),
            ..PoolConfig::with_max_resources(2)
        },
    )?;

    let mut events = pool.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            tracing::info!(?event, "pool event");
        }
    });

    {
        let conn = pool.get().await?;
        tracing::info!(id = conn.id, "got connection");
    }

    let conn = pool.acquire().await?;
    conn.signals.emit("error");
    tracing::info!(released = pool.release(&conn), "released a failed connection");

    let stats = pool.stats();
    tracing::info!(
        live = stats.live,
        idle = stats.idle,
        created = stats.created,
        "pool stats"
    );

    pool.shutdown().await;
    Ok(())
}
