//! Deciding which errors mean "the work ran out of time".
//!
//! A failed first attempt is escalated into the long-running pool only when
//! its error is in the throttle's [`TimeoutErrors`] set. Everything else is
//! returned to the caller as-is.

use std::error::Error;
use std::fmt;
use std::io;
use std::sync::Arc;
use tokio::time::error::Elapsed;

/// Error types that can say whether they represent a timeout.
///
/// This is the built-in "operation timed out" kind used when a throttle is
/// built without an explicit classifier.
pub trait IsTimeout {
    /// Returns true if this error means the operation ran out of time.
    fn is_timeout(&self) -> bool;
}

impl IsTimeout for io::Error {
    fn is_timeout(&self) -> bool {
        self.kind() == io::ErrorKind::TimedOut
    }
}

impl IsTimeout for Elapsed {
    fn is_timeout(&self) -> bool {
        true
    }
}

impl IsTimeout for Box<dyn Error + Send + Sync> {
    fn is_timeout(&self) -> bool {
        is_timeout_error(&**self)
    }
}

/// Walks `err` and its sources looking for a timed-out I/O error or an
/// elapsed Tokio timer.
pub fn is_timeout_error(err: &(dyn Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(err) = current {
        if let Some(io_err) = err.downcast_ref::<io::Error>() {
            if io_err.kind() == io::ErrorKind::TimedOut {
                return true;
            }
        }
        if err.is::<Elapsed>() {
            return true;
        }
        current = err.source();
    }
    false
}

/// Predicate deciding whether an error is timeout-class.
pub type TimeoutPredicate<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

/// The set of failures that trigger escalation.
///
/// An error matches if any predicate in the set accepts it.
pub struct TimeoutErrors<E> {
    predicates: Vec<TimeoutPredicate<E>>,
}

impl<E> TimeoutErrors<E> {
    /// A set that matches nothing; the throttle will never escalate.
    pub fn none() -> Self {
        Self {
            predicates: Vec::new(),
        }
    }

    /// A set containing a single predicate.
    pub fn matching<F>(predicate: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        Self::none().or(predicate)
    }

    /// Adds another predicate to the set.
    pub fn or<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.predicates.push(Arc::new(predicate));
        self
    }

    /// Returns true if `err` is timeout-class.
    pub fn matches(&self, err: &E) -> bool {
        self.predicates.iter().any(|predicate| predicate(err))
    }

    /// Number of predicates in the set.
    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    /// Returns true if the set has no predicates.
    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }
}

impl TimeoutErrors<io::Error> {
    /// Matches I/O errors whose kind is one of `kinds`.
    pub fn io_kinds(kinds: impl IntoIterator<Item = io::ErrorKind>) -> Self {
        let kinds: Vec<io::ErrorKind> = kinds.into_iter().collect();
        Self::matching(move |err: &io::Error| kinds.contains(&err.kind()))
    }
}

impl<E: IsTimeout + 'static> Default for TimeoutErrors<E> {
    fn default() -> Self {
        Self::matching(|err: &E| err.is_timeout())
    }
}

impl<E> Clone for TimeoutErrors<E> {
    fn clone(&self) -> Self {
        Self {
            predicates: self.predicates.clone(),
        }
    }
}

impl<E> fmt::Debug for TimeoutErrors<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimeoutErrors")
            .field("predicates", &self.predicates.len())
            .finish()
    }
}
