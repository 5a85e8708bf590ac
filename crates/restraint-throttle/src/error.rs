//! Error types for the dual-pool throttle.

use crate::classifier::IsTimeout;
use crate::pool::PoolTier;
use restraint_limiter::LimiterError;
use std::fmt;

/// A pool was full when an attempt tried to enter it.
///
/// Callers usually back off and retry later, or reject the upstream request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{tier} pool '{pool}' is full ({capacity} concurrent calls)")]
pub struct ThrottledError {
    /// Limiter name of the exhausted pool.
    pub pool: String,
    /// Which of the throttle's pools was exhausted.
    pub tier: PoolTier,
    /// Capacity of that pool.
    pub capacity: usize,
}

/// Errors returned by [`DualPoolThrottle::execute`](crate::DualPoolThrottle::execute).
#[derive(Debug)]
pub enum RestraintError<E> {
    /// A pool was at capacity; the work was not run for that attempt.
    Throttled(ThrottledError),
    /// The limiter itself failed, e.g. its backing store was unreachable.
    Limiter(LimiterError),
    /// The work returned this error. Passed through untouched.
    Inner(E),
}

impl<E: fmt::Display> fmt::Display for RestraintError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RestraintError::Throttled(e) => write!(f, "throttled: {}", e),
            RestraintError::Limiter(e) => write!(f, "limiter error: {}", e),
            RestraintError::Inner(e) => write!(f, "{}", e),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for RestraintError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RestraintError::Throttled(e) => Some(e),
            RestraintError::Limiter(e) => Some(e),
            RestraintError::Inner(e) => Some(e),
        }
    }
}

impl<E> From<ThrottledError> for RestraintError<E> {
    fn from(err: ThrottledError) -> Self {
        RestraintError::Throttled(err)
    }
}

impl<E> RestraintError<E> {
    /// Returns true if a pool was full.
    pub fn is_throttled(&self) -> bool {
        matches!(self, RestraintError::Throttled(_))
    }

    /// The exhausted pool's tier, if this is a throttling error.
    pub fn throttled_tier(&self) -> Option<PoolTier> {
        match self {
            RestraintError::Throttled(e) => Some(e.tier),
            _ => None,
        }
    }

    /// Returns true if the work itself failed.
    pub fn is_inner(&self) -> bool {
        matches!(self, RestraintError::Inner(_))
    }

    /// Converts into the work's error, if any.
    pub fn into_inner(self) -> Option<E> {
        match self {
            RestraintError::Inner(e) => Some(e),
            _ => None,
        }
    }
}

/// Nested throttles: an inner throttle's timeout still counts as a timeout
/// for the outer one. Throttling and limiter failures do not.
impl<E: IsTimeout> IsTimeout for RestraintError<E> {
    fn is_timeout(&self) -> bool {
        match self {
            RestraintError::Inner(e) => e.is_timeout(),
            _ => false,
        }
    }
}

/// Invalid throttle configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// The throttle name is empty.
    #[error("throttle name must not be empty")]
    EmptyName,
    /// No long-running limit was configured.
    #[error("long_running_limit is required")]
    MissingLongRunningLimit,
    /// The long-running limit was zero, which would reject every escalation.
    #[error("long_running_limit must be at least 1")]
    ZeroLongRunningLimit,
}
