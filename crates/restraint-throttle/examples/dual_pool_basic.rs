use restraint_throttle::{DualPoolThrottle, PoolTier, RestraintError};
use std::io;
use std::time::Duration;

/// Pretend report query: report 7 is slow, everything else is fast.
async fn run_report(id: u32, timeout: Duration) -> Result<String, io::Error> {
    let cost = if id == 7 {
        Duration::from_millis(150)
    } else {
        Duration::from_millis(5)
    };

    tokio::time::timeout(timeout, tokio::time::sleep(cost))
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "report timed out"))?;
    Ok(format!("report {} ({:?} budget)", id, timeout))
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    println!("Dual-Pool Throttle Example\n");

    let throttle = DualPoolThrottle::<io::Error>::builder("reports")
        .timeout(Duration::from_millis(50))
        .long_running_timeout(Duration::from_millis(500))
        .limit(Some(4))
        .long_running_limit(1)
        .on_escalation(|first_attempt| {
            println!("  escalating after {:?}", first_attempt);
        })
        .on_call_rejected(|tier, capacity| {
            println!("  {} pool full ({} slots)", tier, capacity);
        })
        .on_success(|tier, duration| {
            if tier == PoolTier::LongRunning {
                println!("  long-running attempt took {:?}", duration);
            }
        })
        .build();

    for id in [1, 7, 3] {
        match throttle.execute(|timeout| run_report(id, timeout)).await {
            Ok(report) => println!("{}", report),
            Err(RestraintError::Throttled(full)) => println!("busy: {}", full),
            Err(err) => println!("failed: {}", err),
        }
    }

    println!("\nTwo slow reports at once:");
    let (a, b) = tokio::join!(
        throttle.execute(|timeout| run_report(7, timeout)),
        throttle.execute(|timeout| run_report(7, timeout)),
    );
    for result in [a, b] {
        match result {
            Ok(report) => println!("{}", report),
            Err(err) => println!("{}", err),
        }
    }
}
