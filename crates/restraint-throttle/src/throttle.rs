//! The dual-pool throttle.

use crate::classifier::{IsTimeout, TimeoutErrors};
use crate::config::{DualPoolThrottleConfig, DualPoolThrottleConfigBuilder};
use crate::error::{RestraintError, ThrottledError};
use crate::events::ThrottleEvent;
use crate::pool::{PoolConfig, PoolTier};
use restraint_core::events::EventListeners;
use restraint_limiter::{LimiterError, ReleaseFailureHook, SharedLimiter, SlotGuard};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[cfg(feature = "metrics")]
use metrics::{counter, histogram};

#[cfg(feature = "tracing")]
use tracing::{debug, warn};

/// Runs work under a tight concurrency limit and escalates timeouts into a
/// separate long-running pool.
///
/// Cloning is cheap and every clone shares configuration. Pool occupancy lives
/// in the [limiter](restraint_limiter::ConcurrencyLimiter), not in the
/// throttle.
pub struct DualPoolThrottle<E> {
    config: Arc<DualPoolThrottleConfig<E>>,
    release_hook: ReleaseFailureHook,
}

impl<E> Clone for DualPoolThrottle<E> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            release_hook: Arc::clone(&self.release_hook),
        }
    }
}

impl<E: IsTimeout + 'static> DualPoolThrottle<E> {
    /// Starts building a throttle that escalates errors reporting
    /// [`IsTimeout::is_timeout`].
    ///
    /// # Example
    ///
    /// ```rust
    /// use restraint_throttle::DualPoolThrottle;
    /// use std::time::Duration;
    ///
    /// let throttle = DualPoolThrottle::<std::io::Error>::builder("reports")
    ///     .timeout(Duration::from_millis(250))
    ///     .long_running_timeout(Duration::from_secs(5))
    ///     .limit(Some(20))
    ///     .long_running_limit(2)
    ///     .build();
    ///
    /// assert_eq!(throttle.default_pool_limit(), Some(20));
    /// ```
    pub fn builder(name: impl Into<String>) -> DualPoolThrottleConfigBuilder<E> {
        DualPoolThrottleConfigBuilder::new(name)
    }
}

impl<E> DualPoolThrottle<E> {
    /// Starts building a throttle with an explicit timeout error set.
    pub fn builder_with(
        name: impl Into<String>,
        timeout_errors: TimeoutErrors<E>,
    ) -> DualPoolThrottleConfigBuilder<E> {
        DualPoolThrottleConfigBuilder::with_timeout_errors(name, timeout_errors)
    }

    pub(crate) fn from_config(config: DualPoolThrottleConfig<E>) -> Self {
        let release_hook = release_hook(&config);
        Self {
            config: Arc::new(config),
            release_hook,
        }
    }

    /// Runs `work`, escalating to the long-running pool at most once.
    ///
    /// `work` receives the timeout it should honour. It is called with the
    /// normal timeout first; if that attempt fails with a timeout-class error
    /// it is called again with the long-running timeout. Because of that it
    /// must be idempotent.
    ///
    /// Returns [`RestraintError::Throttled`] without running the work when
    /// the pool for an attempt is full. Errors from the work come back as
    /// [`RestraintError::Inner`], including a timeout from the second attempt.
    ///
    /// The throttle never enforces the timeouts itself.
    ///
    /// # Example
    ///
    /// ```rust
    /// use restraint_throttle::DualPoolThrottle;
    /// use std::io;
    /// use std::time::Duration;
    ///
    /// # async fn example() {
    /// let throttle = DualPoolThrottle::<io::Error>::builder("lookup")
    ///     .timeout(Duration::from_millis(50))
    ///     .long_running_timeout(Duration::from_millis(500))
    ///     .limit(Some(8))
    ///     .long_running_limit(1)
    ///     .build();
    ///
    /// let answer = throttle
    ///     .execute(|timeout| async move {
    ///         tokio::time::timeout(timeout, async { 42 })
    ///             .await
    ///             .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "lookup timed out"))
    ///     })
    ///     .await
    ///     .unwrap();
    /// assert_eq!(answer, 42);
    /// # }
    /// ```
    pub async fn execute<T, F, Fut>(&self, mut work: F) -> Result<T, RestraintError<E>>
    where
        F: FnMut(Duration) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let (first, first_attempt) = self.attempt(PoolTier::Default, &mut work).await?;
        let error = match first {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };

        if !self.config.timeout_errors.matches(&error) {
            return Err(RestraintError::Inner(error));
        }
        drop(error);

        self.record_escalation(first_attempt);

        let (second, _) = self.attempt(PoolTier::LongRunning, &mut work).await?;
        second.map_err(RestraintError::Inner)
    }

    /// One work invocation inside one pool. The slot, if any, is released
    /// before this returns.
    async fn attempt<T, F, Fut>(
        &self,
        tier: PoolTier,
        work: &mut F,
    ) -> Result<(Result<T, E>, Duration), RestraintError<E>>
    where
        F: FnMut(Duration) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let pool = self.pool(tier);
        let guard = match pool.capacity_limit() {
            Some(capacity) => Some(self.admit(tier, pool, capacity).await?),
            None => None,
        };

        let start = Instant::now();
        let result = work(self.timeout_for(tier)).await;
        let duration = start.elapsed();

        if let Some(guard) = guard {
            // Failures are reported through the release hook.
            let _ = guard.release().await;
        }

        self.record_outcome(tier, result.is_ok(), duration);
        Ok((result, duration))
    }

    async fn admit(
        &self,
        tier: PoolTier,
        pool: &PoolConfig,
        capacity: usize,
    ) -> Result<SlotGuard, RestraintError<E>> {
        let config = &self.config;

        match SlotGuard::acquire(&config.limiter, pool.name(), capacity).await {
            Ok(guard) => {
                config.event_listeners.emit(&ThrottleEvent::CallPermitted {
                    pattern_name: config.name.clone(),
                    timestamp: Instant::now(),
                    tier,
                });

                #[cfg(feature = "metrics")]
                counter!("double_restraint_calls_permitted_total", "throttle" => config.name.clone(), "pool" => tier.as_str())
                    .increment(1);

                #[cfg(feature = "tracing")]
                debug!(throttle = %config.name, pool = %tier, "slot acquired");

                Ok(guard.on_release_failure(Arc::clone(&self.release_hook)))
            }
            Err(LimiterError::CapacityExceeded { .. }) => {
                config.event_listeners.emit(&ThrottleEvent::CallRejected {
                    pattern_name: config.name.clone(),
                    timestamp: Instant::now(),
                    tier,
                    capacity,
                });

                #[cfg(feature = "metrics")]
                counter!("double_restraint_calls_rejected_total", "throttle" => config.name.clone(), "pool" => tier.as_str())
                    .increment(1);

                #[cfg(feature = "tracing")]
                warn!(throttle = %config.name, pool = %tier, capacity, "pool full, rejecting call");

                Err(ThrottledError {
                    pool: pool.name().to_string(),
                    tier,
                    capacity,
                }
                .into())
            }
            Err(err) => {
                #[cfg(feature = "tracing")]
                warn!(throttle = %config.name, pool = %tier, error = %err, "concurrency limiter failed");

                Err(RestraintError::Limiter(err))
            }
        }
    }

    fn record_escalation(&self, first_attempt: Duration) {
        let config = &self.config;
        config.event_listeners.emit(&ThrottleEvent::Escalated {
            pattern_name: config.name.clone(),
            timestamp: Instant::now(),
            first_attempt,
        });

        #[cfg(feature = "metrics")]
        counter!("double_restraint_escalations_total", "throttle" => config.name.clone())
            .increment(1);

        #[cfg(feature = "tracing")]
        debug!(
            throttle = %config.name,
            first_attempt_ms = first_attempt.as_millis(),
            long_running_timeout_ms = config.long_running_timeout.as_millis(),
            "first attempt timed out, escalating to long-running pool"
        );
    }

    fn record_outcome(&self, tier: PoolTier, succeeded: bool, duration: Duration) {
        let config = &self.config;
        let event = if succeeded {
            ThrottleEvent::CallSucceeded {
                pattern_name: config.name.clone(),
                timestamp: Instant::now(),
                tier,
                duration,
            }
        } else {
            ThrottleEvent::CallFailed {
                pattern_name: config.name.clone(),
                timestamp: Instant::now(),
                tier,
                duration,
            }
        };
        config.event_listeners.emit(&event);

        #[cfg(feature = "metrics")]
        {
            let result = if succeeded { "success" } else { "failure" };
            counter!("double_restraint_calls_total", "throttle" => config.name.clone(), "pool" => tier.as_str(), "result" => result)
                .increment(1);
            histogram!("double_restraint_call_duration_seconds", "throttle" => config.name.clone(), "pool" => tier.as_str())
                .record(duration.as_secs_f64());
        }

        #[cfg(feature = "tracing")]
        debug!(
            throttle = %config.name,
            pool = %tier,
            succeeded,
            duration_ms = duration.as_millis(),
            "work finished"
        );
    }

    fn pool(&self, tier: PoolTier) -> &PoolConfig {
        match tier {
            PoolTier::Default => &self.config.default_pool,
            PoolTier::LongRunning => &self.config.long_running_pool,
        }
    }

    fn timeout_for(&self, tier: PoolTier) -> Duration {
        match tier {
            PoolTier::Default => self.config.timeout,
            PoolTier::LongRunning => self.config.long_running_timeout,
        }
    }

    /// Slots currently held in the default pool, across everyone sharing the limiter.
    ///
    /// For monitoring only; the value may be stale by the time it is read.
    /// Always 0 when the default pool is unlimited.
    pub async fn default_pool_occupancy(&self) -> Result<usize, LimiterError> {
        self.config
            .limiter
            .current_occupancy(self.config.default_pool.name())
            .await
    }

    /// Slots currently held in the long-running pool.
    pub async fn long_running_pool_occupancy(&self) -> Result<usize, LimiterError> {
        self.config
            .limiter
            .current_occupancy(self.config.long_running_pool.name())
            .await
    }

    /// Capacity of the default pool, or `None` when it is unlimited.
    pub fn default_pool_limit(&self) -> Option<usize> {
        self.config.default_pool.capacity_limit()
    }

    /// Capacity of the long-running pool.
    pub fn long_running_pool_limit(&self) -> usize {
        self.config.long_running_limit
    }

    /// Returns true if `timeout` is the long-running timeout.
    ///
    /// Lets work tell which attempt it is running in from the timeout it was
    /// given. Both values are compared in seconds rounded to six decimal
    /// places.
    ///
    /// This cannot tell the attempts apart when the two configured timeouts
    /// are equal; it then returns true for both.
    pub fn is_long_running_timeout(&self, timeout: Duration) -> bool {
        micros_rounded(timeout) == micros_rounded(self.config.long_running_timeout)
    }

    /// Name of this throttle.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Timeout handed to first attempts.
    pub fn timeout(&self) -> Duration {
        self.config.timeout
    }

    /// Timeout handed to escalated attempts.
    pub fn long_running_timeout(&self) -> Duration {
        self.config.long_running_timeout
    }

    /// Limiter pool name of the default pool.
    pub fn default_pool_name(&self) -> &str {
        self.config.default_pool.name()
    }

    /// Limiter pool name of the long-running pool.
    pub fn long_running_pool_name(&self) -> &str {
        self.config.long_running_pool.name()
    }

    /// The limiter tracking both pools.
    pub fn limiter(&self) -> &SharedLimiter {
        &self.config.limiter
    }

    /// Wraps this throttle in a Tower layer.
    pub fn layer(&self) -> crate::DualPoolThrottleLayer<E> {
        crate::DualPoolThrottleLayer::new(self.clone())
    }
}

impl<E> fmt::Debug for DualPoolThrottle<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DualPoolThrottle")
            .field("config", &self.config)
            .finish()
    }
}

fn micros_rounded(duration: Duration) -> f64 {
    (duration.as_secs_f64() * 1_000_000.0).round()
}

fn release_hook<E>(config: &DualPoolThrottleConfig<E>) -> ReleaseFailureHook {
    let name = config.name.clone();
    let listeners: EventListeners<ThrottleEvent> = config.event_listeners.clone();
    #[cfg(feature = "metrics")]
    let long_running_pool = config.long_running_pool.name().to_string();

    Arc::new(move |pool: &str, _id: u64, err: &LimiterError| {
        listeners.emit(&ThrottleEvent::ReleaseFailed {
            pattern_name: name.clone(),
            timestamp: Instant::now(),
            pool: pool.to_string(),
            error: err.to_string(),
        });

        #[cfg(feature = "metrics")]
        {
            let tier = if pool == long_running_pool {
                PoolTier::LongRunning
            } else {
                PoolTier::Default
            };
            counter!("double_restraint_release_failures_total", "throttle" => name.clone(), "pool" => tier.as_str())
                .increment(1);
        }
    })
}
