//! Dual-pool admission control.
//!
//! A [`DualPoolThrottle`] protects a shared resource (a database, a search
//! cluster, a rendering backend) from slow requests without refusing every
//! slow request outright. Work is admitted in two tiers:
//!
//! - **Default pool**: every call starts here, under an optional concurrency
//!   limit, and is handed the short timeout.
//! - **Long-running pool**: a call whose first attempt fails with a
//!   timeout-class error is run once more here, under a separate (usually
//!   much smaller) limit, with the long timeout.
//!
//! A full pool fails fast with [`RestraintError::Throttled`]; nothing queues.
//! Pool capacity is counted by a [`ConcurrencyLimiter`](restraint_limiter::ConcurrencyLimiter),
//! so every process pointed at the same limiter shares the same limits.
//!
//! The work runs twice when it is escalated. It must be idempotent.
//!
//! ## Usage
//!
//! ```rust
//! use restraint_throttle::{DualPoolThrottle, RestraintError};
//! use std::io;
//! use std::time::Duration;
//!
//! async fn query(sql: &str, timeout: Duration) -> Result<Vec<String>, io::Error> {
//!     # let _ = (sql, timeout);
//!     Ok(vec![])
//! }
//!
//! # async fn example() {
//! let throttle = DualPoolThrottle::<io::Error>::builder("reporting-db")
//!     .timeout(Duration::from_millis(200))
//!     .long_running_timeout(Duration::from_secs(5))
//!     .limit(Some(20))
//!     .long_running_limit(2)
//!     .build();
//!
//! match throttle.execute(|timeout| query("select 1", timeout)).await {
//!     Ok(rows) => println!("{} rows", rows.len()),
//!     Err(RestraintError::Throttled(full)) => println!("busy: {}", full),
//!     Err(err) => println!("failed: {}", err),
//! }
//! # }
//! ```
//!
//! ## Deciding what counts as a timeout
//!
//! Builders created with [`DualPoolThrottle::builder`] escalate any error whose
//! [`IsTimeout::is_timeout`] is true. Other error types, or other notions of
//! "too slow", are expressed as predicates:
//!
//! ```rust
//! use restraint_throttle::{DualPoolThrottle, TimeoutErrors};
//!
//! #[derive(Debug)]
//! enum DbError {
//!     StatementTimeout,
//!     LockWaitTimeout,
//!     Syntax(String),
//! }
//!
//! let throttle = DualPoolThrottle::builder_with(
//!     "orders",
//!     TimeoutErrors::matching(|e: &DbError| matches!(e, DbError::StatementTimeout)),
//! )
//! .also_timeout_on(|e| matches!(e, DbError::LockWaitTimeout))
//! .long_running_limit(1)
//! .build();
//! # let _ = DbError::Syntax(String::new());
//! # let _ = throttle;
//! ```
//!
//! ## Sharing capacity
//!
//! Throttles built without [`limiter`](DualPoolThrottleConfigBuilder::limiter)
//! get a private in-process limiter. To share pools between throttles, hand
//! them the same limiter; throttles with the same name then share both pools.
//!
//! ```rust
//! use restraint_limiter::LocalLimiter;
//! use restraint_throttle::DualPoolThrottle;
//! use std::sync::Arc;
//!
//! let limiter = LocalLimiter::shared();
//!
//! let a = DualPoolThrottle::<std::io::Error>::builder("search")
//!     .limit(Some(10))
//!     .long_running_limit(1)
//!     .limiter(Arc::clone(&limiter))
//!     .build();
//! let b = a.clone();
//! assert_eq!(a.default_pool_name(), b.default_pool_name());
//! ```
//!
//! ## Feature flags
//!
//! - `tracing` (default): debug logs for admissions and escalations, warnings
//!   for rejections, errors for slots that could not be released
//! - `metrics`: counters and histograms via the `metrics` crate

mod classifier;
mod config;
mod error;
mod events;
mod layer;
mod pool;
mod service;
mod throttle;

pub use classifier::{IsTimeout, TimeoutErrors, TimeoutPredicate, is_timeout_error};
pub use config::{DualPoolThrottleConfig, DualPoolThrottleConfigBuilder};
pub use error::{ConfigError, RestraintError, ThrottledError};
pub use events::ThrottleEvent;
pub use layer::{DualPoolThrottleLayer, Timed};
pub use pool::{PoolConfig, PoolTier};
pub use service::DualPoolThrottleService;
pub use throttle::DualPoolThrottle;

pub use restraint_limiter::{ConcurrencyLimiter, LimiterError, LocalLimiter, SharedLimiter};
