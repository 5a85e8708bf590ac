use super::{FAST, Gate, SLOW, throttle, timed_out, wait_for_occupancy};
use restraint_throttle::{DualPoolThrottleLayer, PoolTier, RestraintError, Timed};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tower::{Layer, Service, ServiceBuilder, ServiceExt};

#[tokio::test]
async fn layer_escalates_timed_out_requests() {
    let throttle = throttle("layer_escalation");
    let timeouts = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::clone(&timeouts);

    let mut service = ServiceBuilder::new()
        .layer(throttle.layer())
        .service_fn(move |req: Timed<String>| {
            let recorder = Arc::clone(&recorder);
            async move {
                recorder.lock().unwrap().push(req.timeout);
                if req.timeout == FAST {
                    Err(timed_out())
                } else {
                    Ok(req.request.to_uppercase())
                }
            }
        });

    let response = service
        .ready()
        .await
        .unwrap()
        .call("report".to_string())
        .await
        .unwrap();

    assert_eq!(response, "REPORT");
    assert_eq!(*timeouts.lock().unwrap(), vec![FAST, SLOW]);
}

#[tokio::test]
async fn layer_rejects_when_the_pool_is_full() {
    let throttle = throttle("layer_full");
    let gate = Gate::new();
    let calls = Arc::new(AtomicUsize::new(0));

    let inner = {
        let gate = gate.clone();
        let calls = Arc::clone(&calls);
        tower::service_fn(move |req: Timed<u32>| {
            let gate = gate.clone();
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                gate.wait().await;
                Ok::<_, io::Error>(req.request)
            }
        })
    };
    let service = DualPoolThrottleLayer::new(throttle.clone()).layer(inner);

    let mut holders = Vec::new();
    for i in 0..3 {
        let mut service = service.clone();
        holders.push(tokio::spawn(async move {
            service.ready().await?.call(i).await
        }));
    }
    wait_for_occupancy(&throttle, PoolTier::Default, 3).await;

    let mut rejected = service.clone();
    let err = rejected.ready().await.unwrap().call(99).await.unwrap_err();
    assert!(matches!(
        err,
        RestraintError::Throttled(ref full) if full.tier == PoolTier::Default
    ));
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    gate.open();
    let mut served = Vec::new();
    for holder in holders {
        served.push(holder.await.unwrap().unwrap());
    }
    served.sort_unstable();
    assert_eq!(served, vec![0, 1, 2]);
}

#[tokio::test]
async fn layered_services_share_the_throttle() {
    let throttle = throttle("layer_shared");
    let layer = throttle.layer();
    assert_eq!(layer.throttle().name(), "layer_shared");

    let a = layer.layer(tower::service_fn(|req: Timed<()>| async move {
        Ok::<_, io::Error>(req.timeout)
    }));
    let b = layer.layer(tower::service_fn(|req: Timed<()>| async move {
        Ok::<_, io::Error>(req.timeout)
    }));

    assert_eq!(a.throttle().default_pool_name(), b.throttle().default_pool_name());
    assert!(Arc::ptr_eq(a.throttle().limiter(), b.throttle().limiter()));
}
