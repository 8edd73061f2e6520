//! # pooling
//!
//! Generic resource pool for anything that can be created, checked and
//! destroyed (network connections, sessions, worker handles).
//!
//! A [`Pool`] caps the number of live instances, lends them out, queues
//! callers when it is full, health checks instances that sat idle too long,
//! retires instances the moment they emit a watched lifecycle signal, and
//! drains cooperatively on [`shutdown`](Pool::shutdown).
//!
//! ```no_run
//! use pooling::{BoxError, Pool, PoolConfig, Resource};
//!
//! struct Sessions;
//!
//! impl Resource for Sessions {
//!     type Instance = String;
//!
//!     async fn create(&self) -> Result<String, BoxError> {
//!         Ok("session".to_string())
//!     }
//! }
//!
//! # async fn run() -> pooling::Result<()> {
//! let pool = Pool::new(Sessions, PoolConfig::with_max_resources(4))?;
//! let session = pool.get().await?;
//! assert_eq!(session.as_str(), "session");
//! drop(session);
//! pool.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod events;
pub mod guard;
pub mod pool;
pub mod resource;
pub mod signal;

pub use error::{BoxError, Error, Result};
pub use events::{EventBus, PoolEvent, RetireReason};
pub use guard::Guard;
pub use pool::{EntryId, Phase, Pool, PoolConfig, PoolStats};
pub use resource::Resource;
pub use signal::{Signals, SubscriptionId};
