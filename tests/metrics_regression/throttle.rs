//! Dual-pool throttle metrics regression tests

use super::helpers::*;
use futures::future::BoxFuture;
use restraint_limiter::{ConcurrencyLimiter, LimiterError, LocalLimiter, Slot};
use restraint_throttle::DualPoolThrottle;
use serial_test::serial;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

fn timed_out() -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, "timed out")
}

#[tokio::test]
#[serial]
async fn throttle_metrics_exist() {
    init_recorder();

    let throttle = DualPoolThrottle::<io::Error>::builder("metrics_dp")
        .timeout(Duration::from_millis(10))
        .long_running_timeout(Duration::from_millis(100))
        .limit(Some(3))
        .long_running_limit(2)
        .build();

    // One plain success, one escalation, one unrelated failure
    throttle
        .execute(|_| async { Ok::<_, io::Error>(()) })
        .await
        .unwrap();
    throttle
        .execute(|timeout| async move {
            if timeout == Duration::from_millis(10) {
                Err(timed_out())
            } else {
                Ok(())
            }
        })
        .await
        .unwrap();
    let _ = throttle
        .execute(|_| async { Err::<(), _>(io::Error::other("broken")) })
        .await;

    assert_counter_exists("double_restraint_calls_permitted_total");
    assert_metric_has_label("double_restraint_calls_permitted_total", "throttle", "metrics_dp");
    assert_metric_has_label("double_restraint_calls_permitted_total", "pool", "default");
    assert_metric_has_label("double_restraint_calls_permitted_total", "pool", "long_running");

    assert_counter_exists("double_restraint_escalations_total");
    assert_metric_has_label("double_restraint_escalations_total", "throttle", "metrics_dp");

    assert_counter_exists("double_restraint_calls_total");
    assert_metric_has_label("double_restraint_calls_total", "result", "success");
    assert_metric_has_label("double_restraint_calls_total", "result", "failure");

    assert_histogram_exists("double_restraint_call_duration_seconds");
    assert_metric_has_label("double_restraint_call_duration_seconds", "throttle", "metrics_dp");

    assert_eq!(
        counter_value(
            "double_restraint_calls_permitted_total",
            &[("throttle", "metrics_dp"), ("pool", "default")]
        ),
        3
    );
    assert_eq!(
        counter_value(
            "double_restraint_calls_permitted_total",
            &[("throttle", "metrics_dp"), ("pool", "long_running")]
        ),
        1
    );
    assert_eq!(
        counter_value("double_restraint_escalations_total", &[("throttle", "metrics_dp")]),
        1
    );
    assert_eq!(
        counter_value(
            "double_restraint_calls_total",
            &[("throttle", "metrics_dp"), ("result", "failure")]
        ),
        2
    );
}

#[tokio::test]
#[serial]
async fn throttle_rejection_metrics() {
    init_recorder();

    let throttle = DualPoolThrottle::<io::Error>::builder("metrics_full")
        .limit(Some(1))
        .long_running_limit(1)
        .build();

    let gate = Arc::new(Semaphore::new(0));
    let holder = {
        let throttle = throttle.clone();
        let gate = Arc::clone(&gate);
        tokio::spawn(async move {
            throttle
                .execute(|_| {
                    let gate = Arc::clone(&gate);
                    async move {
                        let _ = gate.acquire().await;
                        Ok::<_, io::Error>(())
                    }
                })
                .await
        })
    };
    while throttle.default_pool_occupancy().await.unwrap() < 1 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    let err = throttle
        .execute(|_| async { Ok::<_, io::Error>(()) })
        .await
        .unwrap_err();
    assert!(err.is_throttled());

    gate.close();
    holder.await.unwrap().unwrap();

    assert_counter_exists("double_restraint_calls_rejected_total");
    assert_metric_has_label("double_restraint_calls_rejected_total", "throttle", "metrics_full");
    assert_metric_has_label("double_restraint_calls_rejected_total", "pool", "default");
    assert_eq!(
        counter_value(
            "double_restraint_calls_rejected_total",
            &[("throttle", "metrics_full")]
        ),
        1
    );
}

struct FailingRelease(LocalLimiter);

impl ConcurrencyLimiter for FailingRelease {
    fn acquire(
        &self,
        pool: &str,
        capacity: usize,
    ) -> BoxFuture<'static, restraint_limiter::Result<Slot>> {
        self.0.acquire(pool, capacity)
    }

    fn release(&self, _slot: Slot) -> BoxFuture<'static, restraint_limiter::Result<()>> {
        Box::pin(async { Err(LimiterError::Unavailable("gone".to_string())) })
    }

    fn current_occupancy(
        &self,
        pool: &str,
    ) -> BoxFuture<'static, restraint_limiter::Result<usize>> {
        self.0.current_occupancy(pool)
    }
}

#[tokio::test]
#[serial]
async fn throttle_release_failure_metrics() {
    init_recorder();

    let throttle = DualPoolThrottle::<io::Error>::builder("metrics_leak")
        .timeout(Duration::from_millis(10))
        .long_running_timeout(Duration::from_millis(100))
        .limit(Some(5))
        .long_running_limit(5)
        .limiter(Arc::new(FailingRelease(LocalLimiter::new())))
        .build();

    throttle
        .execute(|timeout| async move {
            if timeout == Duration::from_millis(10) {
                Err(timed_out())
            } else {
                Ok(())
            }
        })
        .await
        .unwrap();

    assert_counter_exists("double_restraint_release_failures_total");
    assert_eq!(
        counter_value(
            "double_restraint_release_failures_total",
            &[("throttle", "metrics_leak"), ("pool", "default")]
        ),
        1
    );
    assert_eq!(
        counter_value(
            "double_restraint_release_failures_total",
            &[("throttle", "metrics_leak"), ("pool", "long_running")]
        ),
        1
    );
}
