//! Asynchronous reader/writer lock with callback admission.
//!
//! Nothing here blocks. [`RwLock::lock_read`] and [`RwLock::lock_write`]
//! return immediately with a [`RaiiToken`]; when the lock is (eventually)
//! granted, the supplied callback runs through the requesting context's
//! executor. Dropping the token is the release — and, if the request was
//! still queued, the cancellation.
//!
//! # Admission rules
//!
//! - Readers share; a writer is exclusive.
//! - A request is admitted immediately only when it is compatible with
//!   the holders *and* no one is queued ahead of it. Readers arriving
//!   while a writer waits line up behind that writer, so writers are not
//!   starved by a steady stream of readers.
//! - On release, the queue is served from the front: either one writer,
//!   or every reader up to the next writer as a single batch.
//!
//! # Cancellation
//!
//! Requests are [`ContextItem`]s in the caller's [`Context`]. If the
//! context dies while the request is queued, the entry is discarded when
//! it reaches the front. Dropping the token of a queued request removes
//! it immediately; dropping the token of an admitted request releases the
//! lock, and suppresses the grant callback if it has not run yet.

use crate::context::{Context, ContextItem, ItemAnchor};
use crate::token::RaiiToken;
use crate::tracing_compat::trace;
use core::fmt;
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Weak};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Access {
    Read,
    Write,
}

/// A pending or admitted request, owned by the requesting context.
struct Waiter {
    anchor: ItemAnchor,
    grant: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl Waiter {
    fn admit(this: &Arc<Self>) {
        let target = Arc::downgrade(this);
        this.anchor.post(move || {
            let Some(waiter) = target.upgrade() else { return };
            let grant = waiter.grant.lock().take();
            // An empty slot means the token was released before the
            // grant ran; stay silent.
            let Some(grant) = grant else { return };
            grant();
            let _ = waiter.anchor.decontextualize();
        });
    }
}

impl ContextItem for Waiter {
    fn anchor(&self) -> &ItemAnchor {
        &self.anchor
    }
}

struct QueueEntry {
    ticket: u64,
    access: Access,
    waiter: Weak<Waiter>,
}

struct Admitted {
    access: Access,
    waiter: Weak<Waiter>,
}

struct LockState {
    readers: usize,
    writer: bool,
    queue: VecDeque<QueueEntry>,
    admitted: HashMap<u64, Admitted>,
    next_ticket: u64,
}

impl LockState {
    fn compatible(&self, access: Access) -> bool {
        match access {
            Access::Read => !self.writer,
            Access::Write => !self.writer && self.readers == 0,
        }
    }

    fn admit(&mut self, ticket: u64, access: Access, waiter: Weak<Waiter>) {
        match access {
            Access::Read => self.readers += 1,
            Access::Write => self.writer = true,
        }
        self.admitted.insert(ticket, Admitted { access, waiter });
    }

    /// Serves the queue front: one writer, or a contiguous batch of
    /// readers. Returns the waiters to fire (outside the lock).
    fn wake_front(&mut self) -> SmallVec<[Arc<Waiter>; 2]> {
        let mut fire = SmallVec::new();
        loop {
            // Requests whose context died while queued are discarded.
            while self
                .queue
                .front()
                .is_some_and(|entry| entry.waiter.strong_count() == 0)
            {
                self.queue.pop_front();
            }
            let Some(front) = self.queue.front() else { break };
            match front.access {
                Access::Read if !self.writer => {
                    while self
                        .queue
                        .front()
                        .is_some_and(|entry| entry.access == Access::Read)
                    {
                        let Some(entry) = self.queue.pop_front() else { break };
                        if let Some(waiter) = entry.waiter.upgrade() {
                            self.admit(entry.ticket, Access::Read, entry.waiter);
                            fire.push(waiter);
                        }
                    }
                }
                Access::Write if self.compatible(Access::Write) => {
                    let Some(entry) = self.queue.pop_front() else { break };
                    if let Some(waiter) = entry.waiter.upgrade() {
                        self.admit(entry.ticket, Access::Write, entry.waiter);
                        fire.push(waiter);
                        break;
                    }
                    // Dead writer at the front; rescan.
                }
                _ => break,
            }
        }
        fire
    }
}

/// A non-blocking reader/writer lock over an executor.
pub struct RwLock {
    state: Arc<Mutex<LockState>>,
}

impl RwLock {
    /// Creates an unheld lock.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(LockState {
                readers: 0,
                writer: false,
                queue: VecDeque::new(),
                admitted: HashMap::new(),
                next_ticket: 0,
            })),
        }
    }

    /// Requests shared access. `granted` runs through `context`'s
    /// executor once the lock is held; the returned token releases it.
    pub fn lock_read(
        &self,
        context: &Context,
        granted: impl FnOnce() + Send + 'static,
    ) -> RaiiToken {
        self.request(Access::Read, context, Box::new(granted))
    }

    /// Requests exclusive access. `granted` runs through `context`'s
    /// executor once the lock is held; the returned token releases it.
    pub fn lock_write(
        &self,
        context: &Context,
        granted: impl FnOnce() + Send + 'static,
    ) -> RaiiToken {
        self.request(Access::Write, context, Box::new(granted))
    }

    /// Takes shared access immediately, or returns `None` if a writer
    /// holds the lock or anyone is queued.
    #[must_use]
    pub fn try_lock_read(&self) -> Option<RaiiToken> {
        self.try_request(Access::Read)
    }

    /// Takes exclusive access immediately, or returns `None` if the lock
    /// is held at all or anyone is queued.
    #[must_use]
    pub fn try_lock_write(&self) -> Option<RaiiToken> {
        self.try_request(Access::Write)
    }

    fn request(
        &self,
        access: Access,
        context: &Context,
        grant: Box<dyn FnOnce() + Send>,
    ) -> RaiiToken {
        let waiter = Arc::new(Waiter {
            anchor: ItemAnchor::new(),
            grant: Mutex::new(Some(grant)),
        });
        context.bind(waiter.clone());
        let (ticket, admitted) = {
            let mut state = self.state.lock();
            let ticket = state.next_ticket;
            state.next_ticket += 1;
            if state.queue.is_empty() && state.compatible(access) {
                state.admit(ticket, access, Arc::downgrade(&waiter));
                (ticket, true)
            } else {
                state.queue.push_back(QueueEntry {
                    ticket,
                    access,
                    waiter: Arc::downgrade(&waiter),
                });
                (ticket, false)
            }
        };
        if admitted {
            trace!(ticket, ?access, "admitted immediately");
            Waiter::admit(&waiter);
        } else {
            trace!(ticket, ?access, "queued");
        }
        self.release_token(ticket)
    }

    fn try_request(&self, access: Access) -> Option<RaiiToken> {
        let ticket = {
            let mut state = self.state.lock();
            if !state.queue.is_empty() || !state.compatible(access) {
                return None;
            }
            let ticket = state.next_ticket;
            state.next_ticket += 1;
            state.admit(ticket, access, Weak::new());
            ticket
        };
        Some(self.release_token(ticket))
    }

    /// Builds the token whose release/drop undoes request `ticket`,
    /// whatever state the request is in by then.
    fn release_token(&self, ticket: u64) -> RaiiToken {
        let state = Arc::downgrade(&self.state);
        RaiiToken::new(move || {
            // The whole lock may be gone; releasing after that is a no-op.
            let Some(state) = state.upgrade() else { return };
            let (fire, cancelled) = {
                let mut state = state.lock();
                let mut cancelled: Option<Weak<Waiter>> = None;
                if let Some(entry) = state.admitted.remove(&ticket) {
                    match entry.access {
                        Access::Read => state.readers -= 1,
                        Access::Write => state.writer = false,
                    }
                    cancelled = Some(entry.waiter);
                } else if let Some(pos) = state
                    .queue
                    .iter()
                    .position(|entry| entry.ticket == ticket)
                {
                    if let Some(entry) = state.queue.remove(pos) {
                        cancelled = Some(entry.waiter);
                    }
                }
                (state.wake_front(), cancelled)
            };
            // Outside the lock: suppress the departing waiter's grant (it
            // may own arbitrary user state) and fire the newly admitted.
            if let Some(waiter) = cancelled.and_then(|weak| weak.upgrade()) {
                drop(waiter.grant.lock().take());
                let _ = waiter.anchor.decontextualize();
            }
            for waiter in fire {
                Waiter::admit(&waiter);
            }
        })
    }

    /// Number of readers currently admitted. Diagnostic.
    #[must_use]
    pub fn reader_count(&self) -> usize {
        self.state.lock().readers
    }

    /// True while a writer is admitted. Diagnostic.
    #[must_use]
    pub fn is_writer_held(&self) -> bool {
        self.state.lock().writer
    }

    /// Number of queued (not yet admitted) requests. Diagnostic.
    #[must_use]
    pub fn waiting_count(&self) -> usize {
        self.state.lock().queue.len()
    }
}

impl Default for RwLock {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RwLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("RwLock")
            .field("readers", &state.readers)
            .field("writer", &state.writer)
            .field("queued", &state.queue.len())
            .finish()
    }
}
