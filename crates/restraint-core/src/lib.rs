//! Core infrastructure shared by the restraint crates.
//!
//! At the moment this is the event system: every admission-control component
//! reports what it does through [`events::EventListeners`], so callers can hook
//! logging, counters, or test probes without touching the component itself.

pub mod events;

pub use events::{EventListener, EventListeners, FnListener, RestraintEvent};
