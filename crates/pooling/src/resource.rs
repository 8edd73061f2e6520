//! Core resource trait
//!
//! The `Resource` trait defines how to create, check, validate and destroy
//! pooled instances. It is the only thing a pool needs to know about the
//! resource it manages.

use std::future::Future;

use crate::error::BoxError;
use crate::signal::Signals;

/// Collaborators the pool calls to manage instances.
///
/// Only [`create`](Resource::create) is required. The defaults mirror a pool
/// that knows nothing about its clients: destruction is a no-op, every
/// instance is valid, and the idle health check always fails so stale idle
/// instances are periodically replaced.
pub trait Resource: Send + Sync + 'static {
    /// The instance type produced by this resource.
    type Instance: Send + Sync + 'static;

    /// Create a new instance.
    ///
    /// Runs on a spawned task without the pool lock held; a slow creation
    /// does not stall acquisition or release of other instances.
    fn create(&self) -> impl Future<Output = Result<Self::Instance, BoxError>> + Send;

    /// Liveness check run by the reaper on instances idle for longer than
    /// `max_idle_time`. An error retires the instance.
    fn check(
        &self,
        _instance: &Self::Instance,
    ) -> impl Future<Output = Result<(), BoxError>> + Send {
        async { Err("idle timeout reached".into()) }
    }

    /// Release whatever the instance holds. Called exactly once per instance,
    /// with the pool lock held; keep it fast. Errors are logged and dropped.
    fn destroy(&self, _instance: &Self::Instance) -> Result<(), BoxError> {
        Ok(())
    }

    /// Synchronous pre-use validation, run on every hand-out, on every
    /// return and before each idle health check. `false` retires the
    /// instance without surfacing an error to anyone.
    fn validate(&self, _instance: &Self::Instance) -> bool {
        true
    }

    /// Lifecycle signals emitted by the instance, if it has any.
    ///
    /// When present, the pool subscribes to the configured watched signals
    /// and retires the instance as soon as one of them fires.
    fn signals<'a>(&self, _instance: &'a Self::Instance) -> Option<&'a Signals> {
        None
    }
}
