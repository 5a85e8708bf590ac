//! Configuration for the dual-pool throttle.

use crate::classifier::{IsTimeout, TimeoutErrors};
use crate::error::ConfigError;
use crate::events::ThrottleEvent;
use crate::pool::{PoolConfig, PoolTier};
use crate::throttle::DualPoolThrottle;
use restraint_core::events::{EventListeners, FnListener};
use restraint_limiter::{LocalLimiter, SharedLimiter};
use std::fmt;
use std::time::Duration;

#[cfg(feature = "metrics")]
use metrics::{describe_counter, describe_histogram};
#[cfg(feature = "metrics")]
use std::sync::Once;

#[cfg(feature = "metrics")]
static METRICS_INIT: Once = Once::new();

/// Validated configuration of a [`DualPoolThrottle`].
pub struct DualPoolThrottleConfig<E> {
    pub(crate) name: String,
    pub(crate) timeout: Duration,
    pub(crate) long_running_timeout: Duration,
    pub(crate) default_pool: PoolConfig,
    pub(crate) long_running_pool: PoolConfig,
    pub(crate) long_running_limit: usize,
    pub(crate) timeout_errors: TimeoutErrors<E>,
    pub(crate) limiter: SharedLimiter,
    pub(crate) event_listeners: EventListeners<ThrottleEvent>,
}

impl<E> fmt::Debug for DualPoolThrottleConfig<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DualPoolThrottleConfig")
            .field("name", &self.name)
            .field("timeout", &self.timeout)
            .field("long_running_timeout", &self.long_running_timeout)
            .field("default_pool", &self.default_pool)
            .field("long_running_pool", &self.long_running_pool)
            .field("timeout_errors", &self.timeout_errors)
            .field("event_listeners", &self.event_listeners)
            .finish_non_exhaustive()
    }
}

/// Builder for [`DualPoolThrottle`].
///
/// Only the long-running limit is mandatory. Everything else has a default:
///
/// | setting | default |
/// |---|---|
/// | `timeout` | 1s |
/// | `long_running_timeout` | 10s |
/// | `limit` | unlimited |
/// | `limiter` | a new [`LocalLimiter`] owned by this throttle |
/// | timeout errors | [`IsTimeout`] (builder created with `new`) |
pub struct DualPoolThrottleConfigBuilder<E> {
    name: String,
    timeout: Duration,
    long_running_timeout: Duration,
    limit: Option<usize>,
    long_running_limit: Option<usize>,
    timeout_errors: TimeoutErrors<E>,
    limiter: Option<SharedLimiter>,
    event_listeners: EventListeners<ThrottleEvent>,
}

impl<E: IsTimeout + 'static> DualPoolThrottleConfigBuilder<E> {
    /// Creates a builder that escalates errors reporting
    /// [`IsTimeout::is_timeout`].
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_timeout_errors(name, TimeoutErrors::default())
    }
}

impl<E> DualPoolThrottleConfigBuilder<E> {
    /// Creates a builder with an explicit timeout error set.
    ///
    /// Use this for error types that do not implement [`IsTimeout`].
    pub fn with_timeout_errors(name: impl Into<String>, timeout_errors: TimeoutErrors<E>) -> Self {
        Self {
            name: name.into(),
            timeout: Duration::from_secs(1),
            long_running_timeout: Duration::from_secs(10),
            limit: None,
            long_running_limit: None,
            timeout_errors,
            limiter: None,
            event_listeners: EventListeners::new(),
        }
    }

    /// Timeout handed to the work on its first attempt.
    ///
    /// Default: 1 second
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Timeout handed to the work when it is escalated.
    ///
    /// Default: 10 seconds
    pub fn long_running_timeout(mut self, timeout: Duration) -> Self {
        self.long_running_timeout = timeout;
        self
    }

    /// Maximum concurrent first attempts across everyone sharing the limiter.
    ///
    /// `None` (or `Some(0)`) disables admission control for first attempts:
    /// no slot is taken and nothing is counted.
    ///
    /// Default: None
    pub fn limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    /// Maximum concurrent escalated attempts. Required, at least 1.
    pub fn long_running_limit(mut self, limit: usize) -> Self {
        self.long_running_limit = Some(limit);
        self
    }

    /// Limiter that tracks both pools.
    ///
    /// Pass the same limiter to every throttle (and every process) that
    /// should share capacity.
    pub fn limiter(mut self, limiter: SharedLimiter) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// Replaces the timeout error set.
    pub fn timeout_errors(mut self, timeout_errors: TimeoutErrors<E>) -> Self {
        self.timeout_errors = timeout_errors;
        self
    }

    /// Replaces the timeout error set with a single predicate.
    pub fn timeout_on<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.timeout_errors = TimeoutErrors::matching(predicate);
        self
    }

    /// Adds a predicate to the timeout error set.
    pub fn also_timeout_on<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.timeout_errors = self.timeout_errors.or(predicate);
        self
    }

    /// Registers a callback for when an attempt takes a slot.
    ///
    /// Not called for first attempts when the default pool is unlimited,
    /// since no slot is taken.
    ///
    /// # Example
    /// ```rust,no_run
    /// use restraint_throttle::{DualPoolThrottle, PoolTier};
    ///
    /// let throttle = DualPoolThrottle::<std::io::Error>::builder("search")
    ///     .limit(Some(10))
    ///     .long_running_limit(2)
    ///     .on_call_permitted(|tier| {
    ///         if tier == PoolTier::LongRunning {
    ///             println!("slow search admitted");
    ///         }
    ///     })
    ///     .build();
    /// ```
    pub fn on_call_permitted<F>(mut self, f: F) -> Self
    where
        F: Fn(PoolTier) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let ThrottleEvent::CallPermitted { tier, .. } = event {
                f(*tier);
            }
        }));
        self
    }

    /// Registers a callback for when an attempt is refused because its pool is full.
    ///
    /// # Callback Signature
    /// `Fn(PoolTier, usize)` - the full pool and its capacity.
    ///
    /// # Example
    /// ```rust,no_run
    /// use restraint_throttle::DualPoolThrottle;
    /// use std::sync::atomic::{AtomicUsize, Ordering};
    /// use std::sync::Arc;
    ///
    /// let rejections = Arc::new(AtomicUsize::new(0));
    /// let counter = Arc::clone(&rejections);
    ///
    /// let throttle = DualPoolThrottle::<std::io::Error>::builder("search")
    ///     .limit(Some(10))
    ///     .long_running_limit(2)
    ///     .on_call_rejected(move |tier, capacity| {
    ///         counter.fetch_add(1, Ordering::SeqCst);
    ///         println!("{} pool full ({} max)", tier, capacity);
    ///     })
    ///     .build();
    /// ```
    pub fn on_call_rejected<F>(mut self, f: F) -> Self
    where
        F: Fn(PoolTier, usize) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let ThrottleEvent::CallRejected { tier, capacity, .. } = event {
                f(*tier, *capacity);
            }
        }));
        self
    }

    /// Registers a callback for when a timed-out first attempt is escalated.
    ///
    /// Called with how long the first attempt ran.
    pub fn on_escalation<F>(mut self, f: F) -> Self
    where
        F: Fn(Duration) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let ThrottleEvent::Escalated { first_attempt, .. } = event {
                f(*first_attempt);
            }
        }));
        self
    }

    /// Registers a callback for when an attempt's work succeeds.
    pub fn on_success<F>(mut self, f: F) -> Self
    where
        F: Fn(PoolTier, Duration) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let ThrottleEvent::CallSucceeded { tier, duration, .. } = event {
                f(*tier, *duration);
            }
        }));
        self
    }

    /// Registers a callback for when an attempt's work returns an error.
    ///
    /// A first attempt that times out and is escalated is reported here too,
    /// before the escalation callback.
    pub fn on_failure<F>(mut self, f: F) -> Self
    where
        F: Fn(PoolTier, Duration) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let ThrottleEvent::CallFailed { tier, duration, .. } = event {
                f(*tier, *duration);
            }
        }));
        self
    }

    /// Registers a callback for when a slot could not be released.
    ///
    /// Called with the limiter pool name and the error message. This means
    /// the pool may be permanently short of capacity; alert on it.
    pub fn on_release_failed<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, &str) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let ThrottleEvent::ReleaseFailed { pool, error, .. } = event {
                f(pool, error);
            }
        }));
        self
    }

    /// Validates the configuration and builds the throttle.
    pub fn try_build(self) -> Result<DualPoolThrottle<E>, ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::EmptyName);
        }
        let long_running_limit = match self.long_running_limit {
            None => return Err(ConfigError::MissingLongRunningLimit),
            Some(0) => return Err(ConfigError::ZeroLongRunningLimit),
            Some(limit) => limit,
        };

        #[cfg(feature = "metrics")]
        describe_metrics();

        let config = DualPoolThrottleConfig {
            default_pool: PoolConfig::new(PoolConfig::default_pool_name(&self.name), self.limit),
            long_running_pool: PoolConfig::new(
                PoolConfig::long_running_pool_name(&self.name),
                Some(long_running_limit),
            ),
            long_running_limit,
            name: self.name,
            timeout: self.timeout,
            long_running_timeout: self.long_running_timeout,
            timeout_errors: self.timeout_errors,
            limiter: self.limiter.unwrap_or_else(LocalLimiter::shared),
            event_listeners: self.event_listeners,
        };
        Ok(DualPoolThrottle::from_config(config))
    }

    /// Builds the throttle.
    ///
    /// # Panics
    ///
    /// Panics if the configuration is invalid; see [`try_build`](Self::try_build).
    pub fn build(self) -> DualPoolThrottle<E> {
        match self.try_build() {
            Ok(throttle) => throttle,
            Err(err) => panic!("invalid dual-pool throttle configuration: {err}"),
        }
    }
}

#[cfg(feature = "metrics")]
fn describe_metrics() {
    METRICS_INIT.call_once(|| {
        describe_counter!(
            "double_restraint_calls_permitted_total",
            "Total number of attempts admitted into a pool"
        );
        describe_counter!(
            "double_restraint_calls_rejected_total",
            "Total number of attempts rejected because a pool was full"
        );
        describe_counter!(
            "double_restraint_escalations_total",
            "Total number of timed-out first attempts moved to the long-running pool"
        );
        describe_counter!(
            "double_restraint_calls_total",
            "Total number of completed attempts by result"
        );
        describe_counter!(
            "double_restraint_release_failures_total",
            "Total number of slots that could not be released"
        );
        describe_histogram!(
            "double_restraint_call_duration_seconds",
            "Duration of work invocations"
        );
    });
}
