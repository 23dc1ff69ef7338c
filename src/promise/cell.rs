//! The write-once cell a promise/future pair shares.
//!
//! The cell tracks two independent one-shot slots: the value (written by
//! the fulfiller) and the continuation (armed by `then`). Whichever side
//! arrives second triggers delivery. Delivery never runs user code while
//! the cell lock is held; the lock only routes.

use crate::error::FulfillError;
use crate::tracing_compat::trace;
use core::mem;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};

/// The delivery half of a continuation record: accept the value, schedule
/// the body. Object-safe so cells can hold heterogeneous continuations.
pub(crate) trait Dispatch<T>: Send + Sync {
    fn dispatch(self: Arc<Self>, value: T);
}

enum ValueState<T> {
    Pending,
    Ready(T),
    Delivered,
}

enum ContinuationSlot<T> {
    Empty,
    Armed(Weak<dyn Dispatch<T>>),
    Spent,
}

struct CellState<T> {
    value: ValueState<T>,
    continuation: ContinuationSlot<T>,
}

/// Routing decision made under the lock, acted on outside it.
enum Routed<T> {
    Stored,
    Deliver(Weak<dyn Dispatch<T>>, T),
}

pub(crate) struct SharedCell<T> {
    state: Mutex<CellState<T>>,
}

impl<T: Send + 'static> SharedCell<T> {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(CellState {
                value: ValueState::Pending,
                continuation: ContinuationSlot::Empty,
            }),
        }
    }

    pub(crate) fn resolved(value: T) -> Self {
        Self {
            state: Mutex::new(CellState {
                value: ValueState::Ready(value),
                continuation: ContinuationSlot::Empty,
            }),
        }
    }

    /// Writes the value. Panics if one was already written.
    pub(crate) fn fulfill(&self, value: T) {
        if self.try_fulfill(value).is_err() {
            panic!("promise fulfilled twice");
        }
    }

    /// Writes the value, or hands it back if one was already written.
    pub(crate) fn try_fulfill(&self, value: T) -> Result<(), FulfillError<T>> {
        let routed = {
            let mut state = self.state.lock();
            if !matches!(state.value, ValueState::Pending) {
                return Err(FulfillError(value));
            }
            match mem::replace(&mut state.continuation, ContinuationSlot::Empty) {
                ContinuationSlot::Armed(target) => {
                    state.value = ValueState::Delivered;
                    state.continuation = ContinuationSlot::Spent;
                    Routed::Deliver(target, value)
                }
                ContinuationSlot::Empty => {
                    state.value = ValueState::Ready(value);
                    Routed::Stored
                }
                ContinuationSlot::Spent => {
                    unreachable!("continuation spent while the value was pending")
                }
            }
        };
        if let Routed::Deliver(target, value) = routed {
            match target.upgrade() {
                Some(target) => target.dispatch(value),
                None => trace!("fulfilled value dropped; the continuation's owner is gone"),
            }
        }
        Ok(())
    }

    /// Arms the continuation. If the value is already here, delivery
    /// happens immediately (still via the continuation's scheduling, never
    /// inline user code).
    ///
    /// # Panics
    ///
    /// Panics if a continuation was already armed or consumed.
    pub(crate) fn attach(&self, continuation: Weak<dyn Dispatch<T>>) {
        let pending_delivery = {
            let mut state = self.state.lock();
            assert!(
                matches!(state.continuation, ContinuationSlot::Empty),
                "future chained twice"
            );
            match mem::replace(&mut state.value, ValueState::Pending) {
                ValueState::Ready(value) => {
                    state.value = ValueState::Delivered;
                    state.continuation = ContinuationSlot::Spent;
                    Some((continuation, value))
                }
                ValueState::Pending => {
                    state.continuation = ContinuationSlot::Armed(continuation);
                    None
                }
                ValueState::Delivered => {
                    unreachable!("value delivered with no continuation armed")
                }
            }
        };
        if let Some((target, value)) = pending_delivery {
            match target.upgrade() {
                Some(target) => target.dispatch(value),
                None => trace!("continuation owner died before its resolved input attached"),
            }
        }
    }

    /// True once a value has been written, whether or not it was
    /// delivered onward.
    pub(crate) fn is_resolved(&self) -> bool {
        !matches!(self.state.lock().value, ValueState::Pending)
    }
}
