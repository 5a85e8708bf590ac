//! Event plumbing for admission-control components.
//!
//! Components describe what happened to a call (permitted, rejected,
//! escalated, ...) as a value implementing [`RestraintEvent`] and hand it to an
//! [`EventListeners`] collection. Listeners are plain callbacks; they run
//! inline on the calling task, so they should be cheap.

use std::fmt;
use std::marker::PhantomData;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Instant;

/// An observable occurrence inside an admission-control component.
pub trait RestraintEvent: Send + Sync + fmt::Debug {
    /// Short machine-friendly name, e.g. `"call_rejected"`.
    fn event_type(&self) -> &'static str;

    /// When the event was recorded.
    fn timestamp(&self) -> Instant;

    /// Name of the component instance that recorded the event.
    fn instance_name(&self) -> &str;
}

/// Receives events of type `E`.
pub trait EventListener<E: RestraintEvent>: Send + Sync {
    /// Handles a single event.
    fn on_event(&self, event: &E);
}

/// An ordered set of listeners for one event type.
///
/// Cloning is cheap: listeners are reference counted.
#[derive(Clone)]
pub struct EventListeners<E: RestraintEvent> {
    listeners: Vec<Arc<dyn EventListener<E>>>,
}

impl<E: RestraintEvent> EventListeners<E> {
    /// Creates an empty collection.
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }

    /// Appends a listener. Listeners are notified in insertion order.
    pub fn add<L>(&mut self, listener: L)
    where
        L: EventListener<E> + 'static,
    {
        self.listeners.push(Arc::new(listener));
    }

    /// Delivers `event` to every listener.
    ///
    /// A panicking listener is isolated: the panic is caught and the
    /// remaining listeners still run.
    pub fn emit(&self, event: &E) {
        for listener in &self.listeners {
            let outcome = catch_unwind(AssertUnwindSafe(|| listener.on_event(event)));
            if outcome.is_err() {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    instance = event.instance_name(),
                    event = event.event_type(),
                    "event listener panicked"
                );
            }
        }
    }
}

impl<E: RestraintEvent> Default for EventListeners<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: RestraintEvent> fmt::Debug for EventListeners<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventListeners")
            .field("len", &self.listeners.len())
            .finish()
    }
}

/// Listener backed by a closure.
pub struct FnListener<E, F>
where
    F: Fn(&E) + Send + Sync,
{
    f: F,
    _event: PhantomData<fn(&E)>,
}

impl<E, F> FnListener<E, F>
where
    F: Fn(&E) + Send + Sync,
{
    /// Wraps `f` as a listener.
    pub fn new(f: F) -> Self {
        Self {
            f,
            _event: PhantomData,
        }
    }
}

impl<E, F> EventListener<E> for FnListener<E, F>
where
    E: RestraintEvent,
    F: Fn(&E) + Send + Sync,
{
    fn on_event(&self, event: &E) {
        (self.f)(event)
    }
}
