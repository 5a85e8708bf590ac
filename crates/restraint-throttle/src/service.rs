//! Tower service for the dual-pool throttle.

use crate::error::RestraintError;
use crate::layer::Timed;
use crate::throttle::DualPoolThrottle;
use futures::future::BoxFuture;
use std::task::{Context, Poll};
use tower::{Service, ServiceExt};

/// Service produced by [`DualPoolThrottleLayer`](crate::DualPoolThrottleLayer).
pub struct DualPoolThrottleService<S, E> {
    inner: S,
    throttle: DualPoolThrottle<E>,
}

impl<S, E> DualPoolThrottleService<S, E> {
    pub(crate) fn new(inner: S, throttle: DualPoolThrottle<E>) -> Self {
        Self { inner, throttle }
    }

    /// The throttle guarding this service.
    pub fn throttle(&self) -> &DualPoolThrottle<E> {
        &self.throttle
    }
}

impl<S: Clone, E> Clone for DualPoolThrottleService<S, E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            throttle: self.throttle.clone(),
        }
    }
}

impl<S, E, Req> Service<Req> for DualPoolThrottleService<S, E>
where
    S: Service<Timed<Req>, Error = E> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Response: Send + 'static,
    E: Send + 'static,
    Req: Clone + Send + 'static,
{
    type Response = S::Response;
    type Error = RestraintError<E>;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(RestraintError::Inner)
    }

    fn call(&mut self, request: Req) -> Self::Future {
        let throttle = self.throttle.clone();
        let service = self.inner.clone();

        Box::pin(async move {
            throttle
                .execute(move |timeout| {
                    // Each attempt drives readiness on its own clone.
                    let mut service = service.clone();
                    let timed = Timed::new(request.clone(), timeout);
                    async move { service.ready().await?.call(timed).await }
                })
                .await
        })
    }
}
