//! Slots and the guard that releases them.

use crate::error::LimiterError;
use crate::{ConcurrencyLimiter, SharedLimiter};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::fmt;
use std::sync::Arc;

/// One unit of occupied capacity in a named pool.
///
/// Slots are handed out by a limiter and must be given back to the same
/// limiter exactly once. They are deliberately not `Clone`.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct Slot {
    pool: Arc<str>,
    id: u64,
}

impl Slot {
    /// Creates a slot handle. Intended for limiter implementations.
    pub fn new(pool: impl Into<Arc<str>>, id: u64) -> Self {
        Self {
            pool: pool.into(),
            id,
        }
    }

    /// Name of the pool this slot belongs to.
    pub fn pool(&self) -> &str {
        &self.pool
    }

    /// Limiter-assigned id, unique within the pool.
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Callback invoked when a slot could not be released.
///
/// Receives the pool name, the slot id and the error.
pub type ReleaseFailureHook = Arc<dyn Fn(&str, u64, &LimiterError) + Send + Sync>;

/// Scoped ownership of a [`Slot`].
///
/// Call [`SlotGuard::release`] on the normal path. If the guard is dropped
/// while still holding its slot (a panic unwound through the owner, or the
/// owning future was cancelled) the release is started from `Drop`: it
/// completes inline when the limiter can answer immediately, and is spawned on
/// the current Tokio runtime otherwise. Failures on either path go to the
/// failure hook and are logged; they are never dropped on the floor.
#[must_use = "dropping a SlotGuard releases the slot immediately"]
pub struct SlotGuard {
    limiter: SharedLimiter,
    slot: Option<Slot>,
    in_flight: Option<InFlightRelease>,
    on_failure: Option<ReleaseFailureHook>,
}

/// A release handed to the limiter but not yet confirmed.
struct InFlightRelease {
    pool: Arc<str>,
    id: u64,
    future: BoxFuture<'static, Result<(), LimiterError>>,
}

impl SlotGuard {
    /// Takes ownership of `slot`, which must have come from `limiter`.
    pub fn new(limiter: SharedLimiter, slot: Slot) -> Self {
        Self {
            limiter,
            slot: Some(slot),
            in_flight: None,
            on_failure: None,
        }
    }

    /// Acquires a slot in `pool` and wraps it in a guard.
    pub async fn acquire(
        limiter: &SharedLimiter,
        pool: &str,
        capacity: usize,
    ) -> Result<Self, LimiterError> {
        let slot = limiter.acquire(pool, capacity).await?;
        Ok(Self::new(Arc::clone(limiter), slot))
    }

    /// Sets the hook that is told about failed releases.
    pub fn on_release_failure(mut self, hook: ReleaseFailureHook) -> Self {
        self.on_failure = Some(hook);
        self
    }

    /// The slot held by this guard.
    pub fn slot(&self) -> Option<&Slot> {
        self.slot.as_ref()
    }

    /// Returns the slot to the limiter.
    ///
    /// A failure is reported to the hook before it is returned. If this
    /// future is dropped before the limiter answers, the guard keeps the
    /// pending release and finishes it from `Drop`.
    pub async fn release(mut self) -> Result<(), LimiterError> {
        let Some(slot) = self.slot.take() else {
            return Ok(());
        };
        self.in_flight = Some(InFlightRelease {
            pool: Arc::clone(&slot.pool),
            id: slot.id,
            future: self.limiter.release(slot),
        });

        let result = match self.in_flight.as_mut() {
            Some(in_flight) => (&mut in_flight.future).await,
            None => Ok(()),
        };
        if let (Some(in_flight), Err(err)) = (self.in_flight.take(), &result) {
            report_failure(self.on_failure.as_ref(), &in_flight.pool, in_flight.id, err);
        }
        result
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        let in_flight = match (self.in_flight.take(), self.slot.take()) {
            (Some(in_flight), _) => in_flight,
            (None, Some(slot)) => InFlightRelease {
                pool: Arc::clone(&slot.pool),
                id: slot.id,
                future: self.limiter.release(slot),
            },
            (None, None) => return,
        };
        finish_release(in_flight, self.on_failure.clone());
    }
}

/// Completes a release inline when the limiter is ready, otherwise on the
/// current runtime.
fn finish_release(mut in_flight: InFlightRelease, hook: Option<ReleaseFailureHook>) {
    match (&mut in_flight.future).now_or_never() {
        Some(Ok(())) => {}
        Some(Err(err)) => report_failure(hook.as_ref(), &in_flight.pool, in_flight.id, &err),
        None => match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(err) = in_flight.future.await {
                        report_failure(hook.as_ref(), &in_flight.pool, in_flight.id, &err);
                    }
                });
            }
            Err(_) => {
                let err = LimiterError::Unavailable(
                    "no async runtime to finish releasing a dropped slot".to_string(),
                );
                report_failure(hook.as_ref(), &in_flight.pool, in_flight.id, &err);
            }
        },
    }
}

impl fmt::Debug for SlotGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotGuard")
            .field("slot", &self.slot)
            .field("releasing", &self.in_flight.is_some())
            .field("on_failure", &self.on_failure.is_some())
            .finish()
    }
}

fn report_failure(hook: Option<&ReleaseFailureHook>, pool: &str, id: u64, err: &LimiterError) {
    #[cfg(feature = "tracing")]
    tracing::error!(
        pool,
        slot = id,
        error = %err,
        "failed to release concurrency slot, pool capacity may leak"
    );

    if let Some(hook) = hook {
        hook(pool, id, err);
    }
}
