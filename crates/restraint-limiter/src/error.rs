//! Error types reported by concurrency limiters.

/// Errors a [`ConcurrencyLimiter`](crate::ConcurrencyLimiter) can return.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LimiterError {
    /// The pool already holds `capacity` slots.
    #[error("pool '{pool}' is at capacity ({capacity})")]
    CapacityExceeded {
        /// Pool that refused the slot.
        pool: String,
        /// Capacity that was requested for the pool.
        capacity: usize,
    },
    /// A release was attempted for a slot the limiter does not hold.
    ///
    /// Usually means the slot was released twice.
    #[error("slot {id} is not held in pool '{pool}'")]
    UnknownSlot {
        /// Pool named by the slot.
        pool: String,
        /// Slot id.
        id: u64,
    },
    /// The backing store could not be reached or the operation could not run.
    #[error("concurrency limiter unavailable: {0}")]
    Unavailable(String),
}

impl LimiterError {
    /// Returns true for [`LimiterError::CapacityExceeded`].
    pub fn is_capacity_exceeded(&self) -> bool {
        matches!(self, LimiterError::CapacityExceeded { .. })
    }
}

/// Result type for limiter operations.
pub type Result<T> = std::result::Result<T, LimiterError>;
