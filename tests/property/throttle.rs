//! Property tests for the dual-pool throttle.
//!
//! Invariants tested:
//! - Concurrent first attempts never exceed the default limit
//! - Concurrent escalated attempts never exceed the long-running limit
//! - Every call either returns the work's outcome or is throttled
//! - Work runs at most twice per call, twice only after a timeout
//! - Both pools are empty once every call has finished

use proptest::prelude::*;
use restraint_throttle::{DualPoolThrottle, PoolTier, RestraintError};
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::runtime::Runtime;

const FAST: Duration = Duration::from_millis(5);
const SLOW: Duration = Duration::from_millis(50);

/// Tracks how many attempts run at once in each tier.
#[derive(Default)]
struct Tracker {
    fast_current: AtomicUsize,
    fast_peak: AtomicUsize,
    slow_current: AtomicUsize,
    slow_peak: AtomicUsize,
}

impl Tracker {
    fn enter(&self, slow: bool) {
        let (current, peak) = self.counters(slow);
        let now = current.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self, slow: bool) {
        self.counters(slow).0.fetch_sub(1, Ordering::SeqCst);
    }

    fn counters(&self, slow: bool) -> (&AtomicUsize, &AtomicUsize) {
        if slow {
            (&self.slow_current, &self.slow_peak)
        } else {
            (&self.fast_current, &self.fast_peak)
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(30))]

    /// Property: neither pool ever runs more attempts than its limit
    #[test]
    fn pools_respect_their_limits(
        limit in 1usize..=6,
        long_running_limit in 1usize..=3,
        calls in 1usize..=40,
        slow_every in 1usize..=4,
    ) {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let throttle = DualPoolThrottle::<io::Error>::builder("prop_limits")
                .timeout(FAST)
                .long_running_timeout(SLOW)
                .limit(Some(limit))
                .long_running_limit(long_running_limit)
                .build();
            let tracker = Arc::new(Tracker::default());

            let mut handles = Vec::new();
            for call in 0..calls {
                let throttle = throttle.clone();
                let tracker = Arc::clone(&tracker);
                let slow_call = call % slow_every == 0;
                handles.push(tokio::spawn(async move {
                    let invocations = AtomicUsize::new(0);
                    let result = throttle
                        .execute(|timeout| {
                            invocations.fetch_add(1, Ordering::SeqCst);
                            let tracker = Arc::clone(&tracker);
                            async move {
                                let escalated = timeout == SLOW;
                                tracker.enter(escalated);
                                tokio::time::sleep(Duration::from_millis(2)).await;
                                tracker.exit(escalated);
                                if slow_call && !escalated {
                                    Err(io::Error::new(io::ErrorKind::TimedOut, "slow"))
                                } else {
                                    Ok(())
                                }
                            }
                        })
                        .await;
                    (slow_call, invocations.load(Ordering::SeqCst), result)
                }));
            }

            for handle in handles {
                let (slow_call, invocations, result) = handle.await.unwrap();
                match result {
                    Ok(()) => {
                        let expected = if slow_call { 2 } else { 1 };
                        prop_assert_eq!(invocations, expected);
                    }
                    Err(RestraintError::Throttled(full)) => {
                        prop_assert!(invocations <= 1);
                        if full.tier == PoolTier::LongRunning {
                            prop_assert!(slow_call);
                            prop_assert_eq!(invocations, 1);
                        } else {
                            prop_assert_eq!(invocations, 0);
                        }
                    }
                    Err(other) => prop_assert!(false, "unexpected error: {}", other),
                }
            }

            prop_assert!(tracker.fast_peak.load(Ordering::SeqCst) <= limit);
            prop_assert!(tracker.slow_peak.load(Ordering::SeqCst) <= long_running_limit);
            prop_assert_eq!(throttle.default_pool_occupancy().await.unwrap(), 0);
            prop_assert_eq!(throttle.long_running_pool_occupancy().await.unwrap(), 0);

            Ok(())
        })?;
    }

    /// Property: sequential calls are never throttled, whatever the limits
    #[test]
    fn sequential_calls_always_fit(
        limit in 1usize..=4,
        long_running_limit in 1usize..=2,
        outcomes in prop::collection::vec(0u8..3, 1..20),
    ) {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let throttle = DualPoolThrottle::<io::Error>::builder("prop_sequential")
                .timeout(FAST)
                .long_running_timeout(SLOW)
                .limit(Some(limit))
                .long_running_limit(long_running_limit)
                .build();

            for outcome in outcomes {
                // 0: succeeds, 1: times out once, 2: fails with an unrelated error
                let result = throttle
                    .execute(|timeout| async move {
                        match outcome {
                            1 if timeout == FAST => {
                                Err(io::Error::new(io::ErrorKind::TimedOut, "slow"))
                            }
                            2 => Err(io::Error::other("broken")),
                            _ => Ok(()),
                        }
                    })
                    .await;

                match outcome {
                    2 => prop_assert!(result.map_err(|e| e.is_inner()).unwrap_err()),
                    _ => prop_assert!(result.is_ok()),
                }
            }

            prop_assert_eq!(throttle.default_pool_occupancy().await.unwrap(), 0);
            prop_assert_eq!(throttle.long_running_pool_occupancy().await.unwrap(), 0);
            Ok(())
        })?;
    }
}
