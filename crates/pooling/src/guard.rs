//! RAII guard for pooled resources

use std::sync::Arc;

use crate::pool::Pool;
use crate::resource::Resource;

/// RAII guard around a checked-out resource.
///
/// Dropping the guard releases the resource back to its pool. Use
/// [`remove`](Guard::remove) to retire it instead, or
/// [`detach`](Guard::detach) to take over the obligation to release it.
pub struct Guard<R: Resource> {
    client: Option<Arc<R::Instance>>,
    pool: Pool<R>,
}

impl<R: Resource> Guard<R> {
    pub(crate) fn new(pool: Pool<R>, client: Arc<R::Instance>) -> Self {
        Self {
            client: Some(client),
            pool,
        }
    }

    /// The shared handle to the resource.
    #[must_use]
    pub fn client(&self) -> &Arc<R::Instance> {
        self.client.as_ref().expect("guard used after being consumed")
    }

    /// Release the resource now. Returns what [`Pool::release`] returned.
    pub fn release(mut self) -> bool {
        self.client
            .take()
            .is_some_and(|client| self.pool.release(&client))
    }

    /// Retire the resource instead of returning it.
    pub fn remove(mut self) -> bool {
        self.client
            .take()
            .is_some_and(|client| self.pool.remove(&client))
    }

    /// Take the handle out without releasing it. The caller must release or
    /// remove it later, or it stays checked out.
    #[must_use]
    pub fn detach(mut self) -> Arc<R::Instance> {
        self.client.take().expect("guard used after being consumed")
    }
}

impl<R: Resource> std::ops::Deref for Guard<R> {
    type Target = R::Instance;

    fn deref(&self) -> &R::Instance {
        self.client()
    }
}

impl<R: Resource> Drop for Guard<R> {
    fn drop(&mut self) {
        if let Some(client) = self.client.take() {
            self.pool.release(&client);
        }
    }
}

impl<R: Resource> std::fmt::Debug for Guard<R>
where
    R::Instance: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Guard")
            .field("client", &self.client)
            .field("pool", &self.pool.name())
            .finish()
    }
}
