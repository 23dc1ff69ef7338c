//! Re-poll until a value appears.
//!
//! [`until_done`] keeps posting a synchronous poll closure until it yields
//! `Some`; [`until_done_future`] does the same for polls that themselves
//! return futures. Each round is a separate posted task, so other work
//! interleaves between polls and a context reset stops the loop at the
//! next round boundary.

use crate::context::{Context, ContextItem, ItemAnchor};
use crate::promise::{Future, Promise, Step};
use crate::tracing_compat::error;
use crate::util::panic_message;
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

struct PollRound<T> {
    poll: Box<dyn FnMut() -> Option<T> + Send>,
    promise: Promise<T>,
}

/// Drives a synchronous poll closure, one posted task per round.
struct Poller<T> {
    anchor: ItemAnchor,
    state: Mutex<Option<PollRound<T>>>,
}

impl<T: Send + 'static> ContextItem for Poller<T> {
    fn anchor(&self) -> &ItemAnchor {
        &self.anchor
    }
}

impl<T: Send + 'static> Poller<T> {
    /// Posts the next round. The task holds only a weak handle, so a
    /// reset between rounds makes it a no-op.
    fn step(this: &Arc<Self>) {
        let target = Arc::downgrade(this);
        this.anchor.post(move || {
            if let Some(poller) = target.upgrade() {
                Self::run_once(&poller);
            }
        });
    }

    fn run_once(this: &Arc<Self>) {
        let taken = this.state.lock().take();
        let Some(mut round) = taken else { return };
        match catch_unwind(AssertUnwindSafe(|| (round.poll)())) {
            Ok(Some(value)) => {
                round.promise.fulfill(value);
                let _ = this.anchor.decontextualize();
            }
            Ok(None) => {
                *this.state.lock() = Some(round);
                Self::step(this);
            }
            Err(payload) => {
                error!(
                    panic = panic_message(payload.as_ref()),
                    "poll closure panicked; loop abandoned"
                );
                let _ = this.anchor.decontextualize();
            }
        }
    }
}

/// Resolves once `poll` returns `Some`. The closure runs on the
/// context's executor, once per posted round, starting no earlier than
/// the next drain; it is never called inline.
pub fn until_done<T, F>(context: &Context, poll: F) -> Future<T>
where
    T: Send + 'static,
    F: FnMut() -> Option<T> + Send + 'static,
{
    let promise = Promise::new();
    let future = promise.future();
    let poller = Arc::new(Poller {
        anchor: ItemAnchor::new(),
        state: Mutex::new(Some(PollRound {
            poll: Box::new(poll),
            promise,
        })),
    });
    context.bind(poller.clone());
    Poller::step(&poller);
    future
}

struct AsyncRound<T> {
    poll: Box<dyn FnMut() -> Future<Option<T>> + Send>,
    promise: Promise<T>,
}

/// Drives a future-returning poll closure. Each round chains onto the
/// returned probe future; the next round starts only after the probe
/// resolves with `None`.
struct AsyncPoller<T> {
    anchor: ItemAnchor,
    state: Mutex<Option<AsyncRound<T>>>,
}

impl<T: Send + 'static> ContextItem for AsyncPoller<T> {
    fn anchor(&self) -> &ItemAnchor {
        &self.anchor
    }
}

impl<T: Send + 'static> AsyncPoller<T> {
    fn step(this: &Arc<Self>) {
        let target = Arc::downgrade(this);
        this.anchor.post(move || {
            if let Some(poller) = target.upgrade() {
                Self::run_once(&poller);
            }
        });
    }

    fn run_once(this: &Arc<Self>) {
        let Some(core) = this.anchor.context_core() else {
            return;
        };
        let taken = this.state.lock().take();
        let Some(mut round) = taken else { return };
        let probe = match catch_unwind(AssertUnwindSafe(|| (round.poll)())) {
            Ok(probe) => probe,
            Err(payload) => {
                error!(
                    panic = panic_message(payload.as_ref()),
                    "poll closure panicked; loop abandoned"
                );
                let _ = this.anchor.decontextualize();
                return;
            }
        };
        *this.state.lock() = Some(round);

        let target = Arc::downgrade(this);
        let _ = probe.chain(
            &core,
            Box::new(move |outcome: Option<T>| {
                if let Some(poller) = target.upgrade() {
                    match outcome {
                        Some(value) => {
                            let finished = poller.state.lock().take();
                            if let Some(round) = finished {
                                round.promise.fulfill(value);
                            }
                            let _ = poller.anchor.decontextualize();
                        }
                        None => Self::step(&poller),
                    }
                }
                Step::Value(())
            }),
        );
    }
}

/// Like [`until_done`], but each round's poll returns a future. The next
/// round begins only after the current probe resolves with `None`.
pub fn until_done_future<T, F>(context: &Context, poll: F) -> Future<T>
where
    T: Send + 'static,
    F: FnMut() -> Future<Option<T>> + Send + 'static,
{
    let promise = Promise::new();
    let future = promise.future();
    let poller = Arc::new(AsyncPoller {
        anchor: ItemAnchor::new(),
        state: Mutex::new(Some(AsyncRound {
            poll: Box::new(poll),
            promise,
        })),
    });
    context.bind(poller.clone());
    AsyncPoller::step(&poller);
    future
}
