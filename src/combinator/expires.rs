//! Deadlines for futures.
//!
//! [`delay`] is the primitive: a future resolved by a timer item bound to
//! the context. [`expires_in`] races an input against such a timer and
//! reports which side won. Both ride on the executor's clock, so tests
//! drive them with the lab executor's virtual time.

use crate::context::{Context, ContextItem, ItemAnchor};
use crate::promise::{Future, Promise};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use super::when_any::{when_any2, AnyWinner};

/// Outcome of [`expires_in`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry<T> {
    /// The input resolved before the deadline.
    Completed(T),
    /// The deadline fired first; the input's eventual value is dropped.
    Expired,
}

impl<T> Expiry<T> {
    /// True when the deadline fired first.
    #[must_use]
    pub const fn is_expired(&self) -> bool {
        matches!(self, Self::Expired)
    }

    /// The completed value, if the input beat the deadline.
    pub fn completed(self) -> Option<T> {
        match self {
            Self::Completed(value) => Some(value),
            Self::Expired => None,
        }
    }
}

/// A context item whose only job is to fulfill a promise when its timer
/// fires. Dropping the context drops the promise, so the future is
/// abandoned rather than resolved.
struct DelayTimer {
    anchor: ItemAnchor,
    pending: Mutex<Option<Promise<()>>>,
}

impl ContextItem for DelayTimer {
    fn anchor(&self) -> &ItemAnchor {
        &self.anchor
    }
}

/// Resolves with `()` once `duration` has elapsed on the context's
/// executor clock. Resetting the context first cancels the timer.
pub fn delay(context: &Context, duration: Duration) -> Future<()> {
    let promise = Promise::new();
    let future = promise.future();
    let timer = Arc::new(DelayTimer {
        anchor: ItemAnchor::new(),
        pending: Mutex::new(Some(promise)),
    });
    context.bind(timer.clone());

    let target = Arc::downgrade(&timer);
    timer.anchor.post_delayed(duration, move || {
        let Some(timer) = target.upgrade() else { return };
        let pending = timer.pending.lock().take();
        if let Some(promise) = pending {
            promise.fulfill(());
        }
        let _ = timer.anchor.decontextualize();
    });
    future
}

/// Bounds `future` by `timeout`: resolves with [`Expiry::Completed`] if
/// the input wins, [`Expiry::Expired`] if the timer does.
pub fn expires_in<T>(context: &Context, timeout: Duration, future: Future<T>) -> Future<Expiry<T>>
where
    T: Send + 'static,
{
    let deadline = delay(context, timeout);
    when_any2(context, future, deadline).then(context, |winner| match winner {
        AnyWinner::First(value) => Expiry::Completed(value),
        AnyWinner::Second(()) => Expiry::Expired,
    })
}
