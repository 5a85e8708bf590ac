use restraint_throttle::{DualPoolThrottle, PoolTier};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const FAST: Duration = Duration::from_millis(10);
const SLOW: Duration = Duration::from_millis(100);

#[tokio::test]
async fn panicking_callbacks_do_not_break_execution() {
    let successes = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&successes);

    let throttle = DualPoolThrottle::<io::Error>::builder("panicky_callbacks")
        .timeout(FAST)
        .long_running_timeout(SLOW)
        .limit(Some(2))
        .long_running_limit(1)
        .on_call_permitted(|_| panic!("permitted callback failed"))
        .on_escalation(|_| panic!("escalation callback failed"))
        .on_success(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .build();

    let value = throttle
        .execute(|timeout| async move {
            if timeout == FAST {
                Err(io::Error::new(io::ErrorKind::TimedOut, "slow"))
            } else {
                Ok("done")
            }
        })
        .await
        .unwrap();

    assert_eq!(value, "done");
    assert_eq!(successes.load(Ordering::SeqCst), 1);
    assert_eq!(throttle.default_pool_occupancy().await.unwrap(), 0);
    assert_eq!(throttle.long_running_pool_occupancy().await.unwrap(), 0);
}

#[tokio::test]
async fn escalation_reports_how_long_the_first_attempt_ran() {
    let first_attempts = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::clone(&first_attempts);

    let throttle = DualPoolThrottle::<io::Error>::builder("first_attempt_duration")
        .timeout(FAST)
        .long_running_timeout(SLOW)
        .long_running_limit(1)
        .on_escalation(move |ran_for| recorder.lock().unwrap().push(ran_for))
        .build();

    throttle
        .execute(|timeout| async move {
            tokio::time::sleep(Duration::from_millis(15)).await;
            if timeout == FAST {
                Err(io::Error::new(io::ErrorKind::TimedOut, "slow"))
            } else {
                Ok(())
            }
        })
        .await
        .unwrap();

    let first_attempts = first_attempts.lock().unwrap();
    assert_eq!(first_attempts.len(), 1);
    assert!(first_attempts[0] >= Duration::from_millis(15));
}

#[tokio::test]
async fn failure_and_success_durations_are_reported_per_tier() {
    let outcomes = Arc::new(Mutex::new(Vec::new()));
    let failures = Arc::clone(&outcomes);
    let successes = Arc::clone(&outcomes);

    let throttle = DualPoolThrottle::<io::Error>::builder("durations")
        .timeout(FAST)
        .long_running_timeout(SLOW)
        .limit(Some(1))
        .long_running_limit(1)
        .on_failure(move |tier, duration| failures.lock().unwrap().push((tier, false, duration)))
        .on_success(move |tier, duration| successes.lock().unwrap().push((tier, true, duration)))
        .build();

    let _ = throttle
        .execute(|_| async { Err::<(), _>(io::Error::other("broken")) })
        .await;
    let _ = throttle
        .execute(|_| async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok::<_, io::Error>(())
        })
        .await;

    let outcomes = outcomes.lock().unwrap();
    assert_eq!(outcomes.len(), 2);
    assert_eq!((outcomes[0].0, outcomes[0].1), (PoolTier::Default, false));
    assert_eq!((outcomes[1].0, outcomes[1].1), (PoolTier::Default, true));
    assert!(outcomes[1].2 >= Duration::from_millis(5));
}
