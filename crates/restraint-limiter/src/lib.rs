//! Concurrency limiter contract for restraint.
//!
//! A concurrency limiter counts how many callers currently hold a slot in a
//! named pool, and refuses new slots once a pool reaches its capacity. The
//! counting itself usually lives in a store every process can reach; this
//! crate only defines the contract ([`ConcurrencyLimiter`]), the slot handle
//! ([`Slot`]) and a scoped guard that guarantees the slot is given back
//! ([`SlotGuard`]).
//!
//! [`LocalLimiter`] is an in-process implementation, suitable for a single
//! process or for tests.
//!
//! # Example
//!
//! ```rust
//! use restraint_limiter::{ConcurrencyLimiter, LimiterError, LocalLimiter, SlotGuard};
//!
//! # async fn example() -> Result<(), LimiterError> {
//! let limiter = LocalLimiter::shared();
//!
//! let guard = SlotGuard::acquire(&limiter, "reports", 2).await?;
//! assert_eq!(limiter.current_occupancy("reports").await?, 1);
//!
//! guard.release().await?;
//! assert_eq!(limiter.current_occupancy("reports").await?, 0);
//! # Ok(())
//! # }
//! ```
//!
//! # Implementing a limiter
//!
//! Operations return `'static` boxed futures so a [`SlotGuard`] can finish a
//! release after its owner is gone. Implementations should clone whatever
//! client handle they need into the future instead of borrowing `self`.

pub mod error;
pub mod local;
pub mod slot;

pub use error::{LimiterError, Result};
pub use local::LocalLimiter;
pub use slot::{ReleaseFailureHook, Slot, SlotGuard};

use futures::future::BoxFuture;
use std::sync::Arc;

/// Counts slot holders per named pool.
///
/// Implementations must be safe to call from any number of tasks at once,
/// and `acquire` must check-and-increment atomically.
pub trait ConcurrencyLimiter: Send + Sync + 'static {
    /// Takes a slot in `pool`, failing with
    /// [`LimiterError::CapacityExceeded`] when `capacity` slots are already
    /// held. Never waits for capacity to free up.
    fn acquire(&self, pool: &str, capacity: usize) -> BoxFuture<'static, Result<Slot>>;

    /// Gives a slot back. Each slot must be released exactly once.
    fn release(&self, slot: Slot) -> BoxFuture<'static, Result<()>>;

    /// Number of slots currently held in `pool`.
    fn current_occupancy(&self, pool: &str) -> BoxFuture<'static, Result<usize>>;
}

/// A limiter shared between throttles and guards.
pub type SharedLimiter = Arc<dyn ConcurrencyLimiter>;
