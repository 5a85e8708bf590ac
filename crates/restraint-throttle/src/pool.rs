//! The two pools a throttle admits work into.

use std::fmt;

/// Which of the two pools an attempt runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolTier {
    /// First attempt, run with the normal timeout.
    Default,
    /// Escalated attempt, run with the long-running timeout.
    LongRunning,
}

impl PoolTier {
    /// Label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            PoolTier::Default => "default",
            PoolTier::LongRunning => "long_running",
        }
    }
}

impl fmt::Display for PoolTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named pool and its capacity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    name: String,
    capacity_limit: Option<usize>,
}

impl PoolConfig {
    /// Creates a pool. A limit of `Some(0)` is treated as unlimited.
    pub fn new(name: impl Into<String>, capacity_limit: Option<usize>) -> Self {
        Self {
            name: name.into(),
            capacity_limit: capacity_limit.filter(|limit| *limit > 0),
        }
    }

    /// Name under which the limiter tracks this pool.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Capacity, or `None` when admission is not checked.
    pub fn capacity_limit(&self) -> Option<usize> {
        self.capacity_limit
    }

    /// Default pool name for a throttle.
    pub(crate) fn default_pool_name(throttle: &str) -> String {
        format!("double_restraint({throttle})")
    }

    /// Long-running pool name for a throttle.
    pub(crate) fn long_running_pool_name(throttle: &str) -> String {
        format!("double_restraint({throttle}).long_running")
    }
}
