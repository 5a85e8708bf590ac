//! Tower layer for the dual-pool throttle.

use crate::service::DualPoolThrottleService;
use crate::throttle::DualPoolThrottle;
use std::time::Duration;
use tower::Layer;

/// A request together with the timeout of the attempt carrying it.
///
/// The wrapped service is expected to give up after `timeout` and return a
/// timeout-class error, which is what moves the request into the
/// long-running pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timed<Req> {
    /// The caller's request.
    pub request: Req,
    /// How long this attempt may take.
    pub timeout: Duration,
}

impl<Req> Timed<Req> {
    /// Pairs a request with a timeout.
    pub fn new(request: Req, timeout: Duration) -> Self {
        Self { request, timeout }
    }

    /// Discards the timeout.
    pub fn into_request(self) -> Req {
        self.request
    }
}

/// Layer that runs every request through a [`DualPoolThrottle`].
///
/// The inner service receives [`Timed`] requests. Requests must be `Clone`
/// because an escalated request is sent a second time.
///
/// # Example
///
/// ```rust
/// use restraint_throttle::{DualPoolThrottle, Timed};
/// use std::io;
/// use std::time::Duration;
/// use tower::{Service, ServiceBuilder, ServiceExt};
///
/// # async fn example() {
/// let throttle = DualPoolThrottle::<io::Error>::builder("render")
///     .timeout(Duration::from_millis(100))
///     .long_running_timeout(Duration::from_secs(2))
///     .limit(Some(16))
///     .long_running_limit(2)
///     .build();
///
/// let mut service = ServiceBuilder::new()
///     .layer(throttle.layer())
///     .service_fn(|req: Timed<String>| async move {
///         tokio::time::timeout(req.timeout, async move { req.request.len() })
///             .await
///             .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "render timed out"))
///     });
///
/// let len = service.ready().await.unwrap().call("page".to_string()).await.unwrap();
/// assert_eq!(len, 4);
/// # }
/// ```
pub struct DualPoolThrottleLayer<E> {
    throttle: DualPoolThrottle<E>,
}

impl<E> DualPoolThrottleLayer<E> {
    /// Creates a layer from a built throttle.
    pub fn new(throttle: DualPoolThrottle<E>) -> Self {
        Self { throttle }
    }

    /// The throttle every layered service shares.
    pub fn throttle(&self) -> &DualPoolThrottle<E> {
        &self.throttle
    }
}

impl<E> Clone for DualPoolThrottleLayer<E> {
    fn clone(&self) -> Self {
        Self {
            throttle: self.throttle.clone(),
        }
    }
}

impl<E> std::fmt::Debug for DualPoolThrottleLayer<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DualPoolThrottleLayer")
            .field("throttle", &self.throttle.name())
            .finish()
    }
}

impl<S, E> Layer<S> for DualPoolThrottleLayer<E> {
    type Service = DualPoolThrottleService<S, E>;

    fn layer(&self, service: S) -> Self::Service {
        DualPoolThrottleService::new(service, self.throttle.clone())
    }
}
