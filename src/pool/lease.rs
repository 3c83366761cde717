use super::controller::{PoolState, Shared};
use crate::connector::Connector;
use crate::utils::error::{PoolError, Result};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};
use tracing::trace;

/// Holder for a leased connection, shared between the lease and the pool so
/// that termination can take the connection back.
pub(crate) struct LeaseSlot<T> {
    revoked: AtomicBool,
    conn: Mutex<Option<T>>,
}

impl<T> LeaseSlot<T> {
    pub(crate) fn new(conn: T) -> Self {
        Self {
            revoked: AtomicBool::new(false),
            conn: Mutex::new(Some(conn)),
        }
    }

    /// Mark the slot revoked. Returns true for the single caller that claims
    /// ownership of the connection.
    pub(crate) fn revoke(&self) -> bool {
        !self.revoked.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn is_revoked(&self) -> bool {
        self.revoked.load(Ordering::Acquire)
    }

    /// Take the connection, waiting for any outstanding `lock` guard.
    pub(crate) async fn take(&self) -> Option<T> {
        self.conn.lock().await.take()
    }

    fn try_take(&self) -> Option<T> {
        self.conn.try_lock().ok().and_then(|mut conn| conn.take())
    }
}

/// Exclusive grant of one pooled connection.
///
/// Use [`lock`](Lease::lock) to reach the connection and
/// [`release`](Lease::release) to hand it back. A lease that is dropped
/// without being released is released automatically. Once released, or
/// revoked by a pool termination, every operation fails with
/// [`PoolError::Revoked`].
pub struct Lease<C: Connector> {
    id: u64,
    slot: Arc<LeaseSlot<C::Connection>>,
    shared: Arc<Shared<C>>,
}

impl<C: Connector> Lease<C> {
    pub(super) fn new(id: u64, slot: Arc<LeaseSlot<C::Connection>>, shared: Arc<Shared<C>>) -> Self {
        Self { id, slot, shared }
    }

    /// Pool-unique lease number.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_revoked(&self) -> bool {
        self.slot.is_revoked()
    }

    /// Borrow the connection exclusively.
    ///
    /// A hard termination waits for an outstanding guard to be dropped
    /// before destroying the connection.
    pub async fn lock(&self) -> Result<MappedMutexGuard<'_, C::Connection>> {
        if self.slot.is_revoked() {
            return Err(PoolError::Revoked);
        }

        let guard = self.slot.conn.lock().await;
        if self.slot.is_revoked() {
            return Err(PoolError::Revoked);
        }
        MutexGuard::try_map(guard, |conn| conn.as_mut()).map_err(|_| PoolError::Revoked)
    }

    /// Return the connection to the pool. A second call fails with `Revoked`.
    ///
    /// Never waits: if the pool is shutting down the connection is destroyed
    /// in the background. If a guard from `lock` is still alive the lease is
    /// revoked at once and the connection goes back when the guard drops.
    pub async fn release(&self) -> Result<()> {
        if !self.slot.revoke() {
            return Err(PoolError::Revoked);
        }
        self.give_back();
        Ok(())
    }

    /// Hand the connection of a revoked lease back to the pool.
    fn give_back(&self) {
        if let Ok(mut guard) = self.slot.conn.try_lock() {
            let conn = guard.take();
            drop(guard);
            self.shared.reclaim(self.id, conn);
            return;
        }

        trace!("Lease {} released while locked, deferring return", self.id);
        let id = self.id;
        let slot = Arc::clone(&self.slot);
        let shared = Arc::clone(&self.shared);
        self.shared.runtime.spawn(async move {
            let conn = slot.take().await;
            shared.reclaim(id, conn);
        });
    }

    /// Detach a lease that never reached its caller and recover the
    /// connection. Runs under the pool lock.
    pub(super) fn disarm(self, st: &mut PoolState<C>) -> Option<C::Connection> {
        st.leased.remove(&self.id);
        st.counters.leases -= 1;
        self.slot.revoke();
        self.slot.try_take()
    }
}

impl<C: Connector> Drop for Lease<C> {
    fn drop(&mut self) {
        if self.slot.revoke() {
            self.give_back();
        }
    }
}

impl<C: Connector> fmt::Debug for Lease<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lease")
            .field("id", &self.id)
            .field("pool", &self.shared.config.name)
            .field("revoked", &self.slot.is_revoked())
            .finish()
    }
}
