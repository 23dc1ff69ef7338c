//! Error types.
//!
//! The surface here is deliberately small. Misuse that breaks an invariant
//! (double fulfill, double chain, dismissing a mandatory token) panics at
//! the faulty call site; environmental failures that a correct caller can
//! hit (racing another fulfiller) come back as typed errors.

use core::fmt;
use thiserror::Error;

/// The value handed to a fulfill attempt that lost the race.
///
/// Returned by [`Promise::try_fulfill`](crate::Promise::try_fulfill) when
/// the promise was already fulfilled. The rejected value rides along so the
/// caller can recover it instead of losing it to a drop.
#[derive(Error, PartialEq, Eq)]
#[error("promise already fulfilled")]
pub struct FulfillError<T>(pub T);

impl<T> FulfillError<T> {
    /// Recovers the value that was not accepted.
    #[must_use]
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> fmt::Debug for FulfillError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The payload may not be Debug; the fact of the rejection is what matters.
        f.write_str("FulfillError(..)")
    }
}
