//! Write-once promise/future pairs and continuation chaining.
//!
//! A [`Promise`] is the producer half, a [`Future`] the consumer half of
//! one shared write-once cell. The rules, enforced at runtime or by the
//! type system:
//!
//! - **Fulfill at most once.** A second [`Promise::fulfill`] panics;
//!   [`Promise::try_fulfill`] reports the loss instead (the racing-
//!   fulfillers case).
//! - **One future per promise, one chain per future.** The future is
//!   taken once from its promise; [`Future::then`] consumes the future,
//!   so re-chaining is a compile error rather than a runtime one.
//! - **Continuations never run inline.** Fulfilling schedules the body
//!   through the chaining context's executor; `fulfill` always returns
//!   before the body runs.
//! - **Dropping is cancellation.** If the context that owns a
//!   continuation dies, the value arriving later is dropped in silence.
//!   If a promise is dropped unfulfilled, its future simply never
//!   resolves.
//! - **Panics stay in their link.** A panicking body is caught and
//!   logged; the chain downstream stays unresolved and the executor keeps
//!   running.
//!
//! ```
//! use tether::{Context, LabExecutor, Promise};
//!
//! let lab = LabExecutor::new();
//! let ctx = Context::new(lab.handle());
//!
//! let promise = Promise::new();
//! let doubled = promise.future().then(&ctx, |n: u32| n * 2);
//! promise.fulfill(4);
//!
//! lab.run_until_idle();
//! assert!(doubled.is_resolved());
//! ```

mod cell;
mod continuation;

pub(crate) use cell::{Dispatch, SharedCell};
pub(crate) use continuation::{Body, Continuation, Step};

use crate::context::{Context, ContextCore};
use crate::error::FulfillError;
use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// The producer half: write the value exactly once.
pub struct Promise<T> {
    cell: Arc<SharedCell<T>>,
    future_taken: AtomicBool,
}

impl<T: Send + 'static> Promise<T> {
    /// Creates an unfulfilled promise.
    #[must_use]
    pub fn new() -> Self {
        Self {
            cell: Arc::new(SharedCell::new()),
            future_taken: AtomicBool::new(false),
        }
    }

    /// Takes the consumer half.
    ///
    /// # Panics
    ///
    /// Panics on a second take; a cell has exactly one consumer.
    #[must_use]
    pub fn future(&self) -> Future<T> {
        let already = self.future_taken.swap(true, Ordering::AcqRel);
        assert!(!already, "future taken twice from the same promise");
        Future {
            cell: self.cell.clone(),
        }
    }

    /// Writes the value, waking the chained continuation if one exists.
    ///
    /// # Panics
    ///
    /// Panics if the promise was already fulfilled.
    pub fn fulfill(&self, value: T) {
        self.cell.fulfill(value);
    }

    /// Writes the value unless one is already there; the losing value
    /// comes back inside the error.
    pub fn try_fulfill(&self, value: T) -> Result<(), FulfillError<T>> {
        self.cell.try_fulfill(value)
    }

    /// True once a value has been written.
    #[must_use]
    pub fn is_fulfilled(&self) -> bool {
        self.cell.is_resolved()
    }
}

impl<T: Send + 'static> Default for Promise<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("future_taken", &self.future_taken.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

/// The consumer half: chain exactly one continuation.
///
/// `then` takes the future by value. Once chained (or dropped), the
/// future is gone; the type system is what enforces the one-continuation
/// rule.
pub struct Future<T> {
    pub(crate) cell: Arc<SharedCell<T>>,
}

impl<T: Send + 'static> Future<T> {
    /// A future that is already resolved with `value`.
    #[must_use]
    pub fn resolved(value: T) -> Self {
        Self {
            cell: Arc::new(SharedCell::resolved(value)),
        }
    }

    /// A future that never resolves. Useful as a degenerate input to
    /// combinators and in tests.
    #[must_use]
    pub fn never() -> Self {
        Self {
            cell: Arc::new(SharedCell::new()),
        }
    }

    /// True once the originating promise has been fulfilled.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.cell.is_resolved()
    }

    /// Chains `body` to run with the value, on `context`'s executor,
    /// once it arrives. Returns the future of the body's result.
    ///
    /// The continuation lives in `context`: reset or drop the context and
    /// the body will never run, even if the value arrives afterwards.
    pub fn then<U, F>(self, context: &Context, body: F) -> Future<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        self.chain(context.core(), Box::new(move |value| Step::Value(body(value))))
    }

    /// Like [`then`](Self::then), but the body returns a future; the
    /// chain continues with that future's eventual value instead of the
    /// future itself.
    pub fn then_future<U, F>(self, context: &Context, body: F) -> Future<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> Future<U> + Send + 'static,
    {
        self.chain(
            context.core(),
            Box::new(move |value| Step::Chained(body(value))),
        )
    }

    pub(crate) fn chain<U: Send + 'static>(
        self,
        core: &Arc<ContextCore>,
        body: Body<T, U>,
    ) -> Future<U> {
        let output = Arc::new(SharedCell::new());
        let record = Continuation::new(body, output.clone());
        core.bind(record.clone());
        let weak = Arc::downgrade(&record);
        let target: Weak<dyn Dispatch<T>> = weak;
        self.cell.attach(target);
        Future { cell: output }
    }
}

impl<T> fmt::Debug for Future<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Future").finish_non_exhaustive()
    }
}
