//! Events reported by the dual-pool throttle.

use crate::pool::PoolTier;
use restraint_core::events::RestraintEvent;
use std::time::{Duration, Instant};

/// Events emitted by a [`DualPoolThrottle`](crate::DualPoolThrottle).
#[derive(Debug, Clone)]
pub enum ThrottleEvent {
    /// An attempt took a slot in a pool.
    CallPermitted {
        pattern_name: String,
        timestamp: Instant,
        tier: PoolTier,
    },
    /// An attempt was refused because its pool was full.
    CallRejected {
        pattern_name: String,
        timestamp: Instant,
        tier: PoolTier,
        capacity: usize,
    },
    /// The first attempt timed out and the work is moving to the long-running pool.
    Escalated {
        pattern_name: String,
        timestamp: Instant,
        /// How long the first attempt ran before reporting its timeout.
        first_attempt: Duration,
    },
    /// The work succeeded.
    CallSucceeded {
        pattern_name: String,
        timestamp: Instant,
        tier: PoolTier,
        duration: Duration,
    },
    /// The work failed and the error is being returned to the caller.
    CallFailed {
        pattern_name: String,
        timestamp: Instant,
        tier: PoolTier,
        duration: Duration,
    },
    /// A slot could not be given back to the limiter.
    ReleaseFailed {
        pattern_name: String,
        timestamp: Instant,
        pool: String,
        error: String,
    },
}

impl RestraintEvent for ThrottleEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ThrottleEvent::CallPermitted { .. } => "call_permitted",
            ThrottleEvent::CallRejected { .. } => "call_rejected",
            ThrottleEvent::Escalated { .. } => "escalated",
            ThrottleEvent::CallSucceeded { .. } => "call_succeeded",
            ThrottleEvent::CallFailed { .. } => "call_failed",
            ThrottleEvent::ReleaseFailed { .. } => "release_failed",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            ThrottleEvent::CallPermitted { timestamp, .. }
            | ThrottleEvent::CallRejected { timestamp, .. }
            | ThrottleEvent::Escalated { timestamp, .. }
            | ThrottleEvent::CallSucceeded { timestamp, .. }
            | ThrottleEvent::CallFailed { timestamp, .. }
            | ThrottleEvent::ReleaseFailed { timestamp, .. } => *timestamp,
        }
    }

    fn instance_name(&self) -> &str {
        match self {
            ThrottleEvent::CallPermitted { pattern_name, .. }
            | ThrottleEvent::CallRejected { pattern_name, .. }
            | ThrottleEvent::Escalated { pattern_name, .. }
            | ThrottleEvent::CallSucceeded { pattern_name, .. }
            | ThrottleEvent::CallFailed { pattern_name, .. }
            | ThrottleEvent::ReleaseFailed { pattern_name, .. } => pattern_name,
        }
    }
}

impl ThrottleEvent {
    /// Pool tier the event concerns, when it concerns a single attempt.
    pub fn tier(&self) -> Option<PoolTier> {
        match self {
            ThrottleEvent::CallPermitted { tier, .. }
            | ThrottleEvent::CallRejected { tier, .. }
            | ThrottleEvent::CallSucceeded { tier, .. }
            | ThrottleEvent::CallFailed { tier, .. } => Some(*tier),
            ThrottleEvent::Escalated { .. } | ThrottleEvent::ReleaseFailed { .. } => None,
        }
    }
}
