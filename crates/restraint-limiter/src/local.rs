//! In-process limiter.

use crate::error::LimiterError;
use crate::slot::Slot;
use crate::{ConcurrencyLimiter, SharedLimiter};
use futures::future::{self, BoxFuture};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A [`ConcurrencyLimiter`] that keeps pool state in process memory.
///
/// Every clone shares the same pools, so one instance can be handed to many
/// throttles. Occupancy is only consistent within this process; deployments
/// that need a limit across processes should plug in a limiter backed by a
/// shared store instead.
///
/// All operations complete synchronously; the returned futures are already
/// resolved.
#[derive(Clone, Default)]
pub struct LocalLimiter {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    pools: Mutex<HashMap<String, HashSet<u64>>>,
    next_id: AtomicU64,
}

impl LocalLimiter {
    /// Creates a limiter with no pools.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a limiter already wrapped for sharing.
    pub fn shared() -> SharedLimiter {
        Arc::new(Self::new())
    }

    /// Takes a slot in `pool` if fewer than `capacity` are held.
    pub fn try_acquire(&self, pool: &str, capacity: usize) -> Result<Slot, LimiterError> {
        let mut pools = self.pools();
        if pools.get(pool).map_or(0, HashSet::len) >= capacity {
            return Err(LimiterError::CapacityExceeded {
                pool: pool.to_string(),
                capacity,
            });
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        pools.entry(pool.to_string()).or_default().insert(id);
        Ok(Slot::new(pool, id))
    }

    /// Gives `slot` back. Fails if the slot is not currently held.
    pub fn try_release(&self, slot: Slot) -> Result<(), LimiterError> {
        let mut pools = self.pools();
        let removed = pools
            .get_mut(slot.pool())
            .map(|held| held.remove(&slot.id()))
            .unwrap_or(false);

        if !removed {
            return Err(LimiterError::UnknownSlot {
                pool: slot.pool().to_string(),
                id: slot.id(),
            });
        }

        if pools.get(slot.pool()).is_some_and(HashSet::is_empty) {
            pools.remove(slot.pool());
        }
        Ok(())
    }

    /// Number of slots currently held in `pool`.
    pub fn occupancy(&self, pool: &str) -> usize {
        self.pools().get(pool).map_or(0, HashSet::len)
    }

    fn pools(&self) -> MutexGuard<'_, HashMap<String, HashSet<u64>>> {
        // Every critical section leaves the map consistent, so a poisoned lock is still usable.
        self.inner
            .pools
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl ConcurrencyLimiter for LocalLimiter {
    fn acquire(&self, pool: &str, capacity: usize) -> BoxFuture<'static, crate::Result<Slot>> {
        Box::pin(future::ready(self.try_acquire(pool, capacity)))
    }

    fn release(&self, slot: Slot) -> BoxFuture<'static, crate::Result<()>> {
        Box::pin(future::ready(self.try_release(slot)))
    }

    fn current_occupancy(&self, pool: &str) -> BoxFuture<'static, crate::Result<usize>> {
        Box::pin(future::ready(Ok(self.occupancy(pool))))
    }
}

impl std::fmt::Debug for LocalLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalLimiter")
            .field("pools", &self.pools().len())
            .finish()
    }
}
