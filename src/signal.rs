//! Multi-listener broadcast signals.
//!
//! A [`Signal`] fans one payload out to every live listener. Three
//! subscription flavors differ only in *where* the callback runs:
//!
//! | Call | Runs | Lifetime handle |
//! |------|------|-----------------|
//! | [`Signal::subscribe`] | inline, inside `notify` | [`Subscription`] |
//! | [`Signal::subscribe_via`] | posted to an executor | [`Subscription`] |
//! | [`Signal::subscribe_bound`] | posted via a [`Context`] | the context itself |
//!
//! Dropping the [`Subscription`] (or the bound context) is the only way
//! to unsubscribe, and it also suppresses any queued deliveries that have
//! not run yet.
//!
//! # Snapshot semantics
//!
//! `notify` snapshots the listener list before invoking anything, so
//! callbacks may freely subscribe and unsubscribe. Listeners added during
//! a notify round are not called in that round; listeners removed during
//! the round are skipped if their turn had not come yet.

use crate::context::{Context, ContextItem, ItemAnchor};
use crate::executor::ExecutorHandle;
use crate::token::RaiiToken;
use crate::tracing_compat::trace;
use core::fmt;
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::sync::{Arc, Weak};

type Callback<T> = Box<dyn Fn(&T) + Send + Sync>;

enum Delivery {
    Direct,
    Queued(ExecutorHandle),
    Anchored,
}

struct Listener<T> {
    callback: Callback<T>,
    delivery: Delivery,
    anchor: ItemAnchor,
}

impl<T: Send + 'static> Listener<T> {
    fn deliver(this: &Arc<Self>, payload: &T)
    where
        T: Clone,
    {
        match &this.delivery {
            Delivery::Direct => (this.callback)(payload),
            Delivery::Queued(executor) => {
                let target = Arc::downgrade(this);
                let owned = payload.clone();
                executor.post(move || {
                    if let Some(listener) = target.upgrade() {
                        (listener.callback)(&owned);
                    }
                });
            }
            Delivery::Anchored => {
                let target = Arc::downgrade(this);
                let owned = payload.clone();
                this.anchor.post(move || {
                    if let Some(listener) = target.upgrade() {
                        (listener.callback)(&owned);
                    }
                });
            }
        }
    }
}

impl<T: Send + 'static> ContextItem for Listener<T> {
    fn anchor(&self) -> &ItemAnchor {
        &self.anchor
    }
}

struct ListenerEntry<T> {
    id: u64,
    listener: Weak<Listener<T>>,
}

struct SignalState<T> {
    entries: Vec<ListenerEntry<T>>,
    next_id: u64,
}

/// A broadcast channel from one emitter to many listeners.
pub struct Signal<T> {
    state: Arc<Mutex<SignalState<T>>>,
}

impl<T: Send + 'static> Signal<T> {
    /// Creates a signal with no listeners.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SignalState {
                entries: Vec::new(),
                next_id: 0,
            })),
        }
    }

    /// Adds a listener invoked synchronously inside [`notify`](Self::notify).
    pub fn subscribe(&self, callback: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        self.install(Delivery::Direct, Box::new(callback))
    }

    /// Adds a listener whose callback is posted to `executor` with an
    /// owned clone of the payload.
    pub fn subscribe_via(
        &self,
        executor: &ExecutorHandle,
        callback: impl Fn(&T) + Send + Sync + 'static,
    ) -> Subscription {
        self.install(Delivery::Queued(executor.clone()), Box::new(callback))
    }

    /// Adds a listener owned by `context`: deliveries post through the
    /// context's executor, and destroying the context unsubscribes.
    ///
    /// No [`Subscription`] is returned; the context *is* the handle.
    pub fn subscribe_bound(
        &self,
        context: &Context,
        callback: impl Fn(&T) + Send + Sync + 'static,
    ) {
        let listener = Arc::new(Listener {
            callback: Box::new(callback),
            delivery: Delivery::Anchored,
            anchor: ItemAnchor::new(),
        });
        {
            let mut state = self.state.lock();
            let id = state.next_id;
            state.next_id += 1;
            state.entries.push(ListenerEntry {
                id,
                listener: Arc::downgrade(&listener),
            });
        }
        context.bind(listener);
    }

    fn install(&self, delivery: Delivery, callback: Callback<T>) -> Subscription {
        let listener = Arc::new(Listener {
            callback,
            delivery,
            anchor: ItemAnchor::new(),
        });
        let id = {
            let mut state = self.state.lock();
            let id = state.next_id;
            state.next_id += 1;
            state.entries.push(ListenerEntry {
                id,
                listener: Arc::downgrade(&listener),
            });
            id
        };
        let weak_state = Arc::downgrade(&self.state);
        let token = RaiiToken::new(move || {
            // Killing the strong handle is the unsubscribe; the entry is
            // pruned eagerly when the signal still exists.
            drop(listener);
            if let Some(state) = weak_state.upgrade() {
                state.lock().entries.retain(|entry| entry.id != id);
            }
        });
        Subscription { token }
    }

    /// Broadcasts `payload` to every listener subscribed at the start of
    /// the call, in subscription order.
    pub fn notify(&self, payload: &T)
    where
        T: Clone,
    {
        let snapshot: SmallVec<[Weak<Listener<T>>; 8]> = {
            let mut state = self.state.lock();
            state
                .entries
                .retain(|entry| entry.listener.strong_count() > 0);
            state
                .entries
                .iter()
                .map(|entry| entry.listener.clone())
                .collect()
        };
        trace!(listeners = snapshot.len(), "signal notify");
        for weak in snapshot {
            // A listener removed mid-round is skipped here.
            let Some(listener) = weak.upgrade() else { continue };
            Listener::deliver(&listener, payload);
        }
    }

    /// Number of live listeners. Diagnostic.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.state
            .lock()
            .entries
            .iter()
            .filter(|entry| entry.listener.strong_count() > 0)
            .count()
    }
}

impl<T: Send + 'static> Default for Signal<T> {
    fn default() -> Self {
        Self::new()
    }
}

// Handles share one listener list; cloning does not copy listeners.
impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl<T> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("entries", &self.state.lock().entries.len())
            .finish_non_exhaustive()
    }
}

/// Keeps one listener subscribed; dropping it unsubscribes.
#[must_use = "dropping a subscription unsubscribes the listener"]
pub struct Subscription {
    token: RaiiToken,
}

impl Subscription {
    /// Unsubscribes now. Equivalent to dropping, but reads better at
    /// call sites that mean it.
    pub fn unsubscribe(mut self) {
        self.token.reset();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.token.is_armed())
            .finish()
    }
}
