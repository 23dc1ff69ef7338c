//! The consumed executor interface.
//!
//! Everything in this crate schedules work through [`Executor`], a trait
//! the host event loop implements. The crate never spins up threads or
//! owns a run loop of its own; it only *consumes* scheduling:
//!
//! | Operation | Meaning |
//! |-----------|---------|
//! | [`post`](Executor::post) | run a task on the loop, later |
//! | [`post_delayed`](Executor::post_delayed) | run a task after a delay |
//! | [`watch`](Executor::watch) | invoke a watcher on fd readiness |
//! | [`now`](Executor::now) | the loop's current [`Time`] |
//! | [`stop`](Executor::stop) | ask the loop to terminate |
//!
//! Tasks must never run inline inside `post`; callers rely on `post`
//! returning before the task executes. The deterministic in-crate
//! implementation lives in [`lab`](crate::lab).

use crate::time::Time;
use core::fmt;
use core::ops::{BitOr, BitOrAssign};
use core::time::Duration;
use std::os::fd::RawFd;
use std::sync::Arc;

/// A unit of deferred work.
pub type Task = Box<dyn FnOnce() + Send>;

/// An fd watcher. Receives the ready events; returns true to stay armed.
pub type WatchTask = Box<dyn FnMut(FdInterest) -> bool + Send>;

/// A bitmask of file-descriptor readiness events.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FdInterest(u8);

impl FdInterest {
    /// No events.
    pub const NONE: Self = Self(0);
    /// The descriptor has data to read.
    pub const READABLE: Self = Self(0b001);
    /// The descriptor accepts writes.
    pub const WRITABLE: Self = Self(0b010);
    /// The peer hung up.
    pub const HANGUP: Self = Self(0b100);

    /// Returns true if every bit of `other` is set in `self`.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns true if any bit of `other` is set in `self`.
    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Returns the events present in both masks.
    #[must_use]
    pub const fn intersection(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    /// Returns true if no event is set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for FdInterest {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for FdInterest {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for FdInterest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tags = [""; 3];
        let mut n = 0;
        if self.contains(Self::READABLE) {
            tags[n] = "READABLE";
            n += 1;
        }
        if self.contains(Self::WRITABLE) {
            tags[n] = "WRITABLE";
            n += 1;
        }
        if self.contains(Self::HANGUP) {
            tags[n] = "HANGUP";
            n += 1;
        }
        if n == 0 {
            f.write_str("FdInterest(NONE)")
        } else {
            write!(f, "FdInterest({})", tags[..n].join("|"))
        }
    }
}

/// A host event loop, seen from the scheduling side.
///
/// Implementations must be safe to call from the loop's own tasks
/// (everything here is re-entrant) and must never execute a posted task
/// before `post` returns.
pub trait Executor: Send + Sync {
    /// Queues `task` to run on the loop.
    fn post(&self, task: Task);

    /// Queues `task` to run once `delay` has elapsed on the loop's clock.
    fn post_delayed(&self, delay: Duration, task: Task);

    /// Arms `watcher` for readiness events on `fd`.
    ///
    /// The watcher is invoked with the intersection of the ready events
    /// and `interest`; returning false disarms it.
    fn watch(&self, fd: RawFd, interest: FdInterest, watcher: WatchTask);

    /// Returns the loop's current time.
    fn now(&self) -> Time;

    /// Asks the loop to terminate with `exit_code`.
    ///
    /// Tasks posted after a stop are dropped.
    fn stop(&self, exit_code: i32);
}

/// A shared, cloneable handle to an [`Executor`].
///
/// This is the form the rest of the crate passes around: contexts hold
/// one, combinators schedule through one. The generic methods box the
/// closures once and forward to the object-safe trait.
#[derive(Clone)]
pub struct ExecutorHandle {
    inner: Arc<dyn Executor>,
}

impl ExecutorHandle {
    /// Wraps an executor in a shared handle.
    #[must_use]
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self { inner: executor }
    }

    /// Queues a closure to run on the loop.
    pub fn post(&self, task: impl FnOnce() + Send + 'static) {
        self.inner.post(Box::new(task));
    }

    /// Queues a closure to run after `delay`.
    pub fn post_delayed(&self, delay: Duration, task: impl FnOnce() + Send + 'static) {
        self.inner.post_delayed(delay, Box::new(task));
    }

    /// Arms a readiness watcher on `fd`.
    pub fn watch(
        &self,
        fd: RawFd,
        interest: FdInterest,
        watcher: impl FnMut(FdInterest) -> bool + Send + 'static,
    ) {
        self.inner.watch(fd, interest, Box::new(watcher));
    }

    /// Returns the loop's current time.
    #[must_use]
    pub fn now(&self) -> Time {
        self.inner.now()
    }

    /// Asks the loop to terminate with `exit_code`.
    pub fn stop(&self, exit_code: i32) {
        self.inner.stop(exit_code);
    }
}

impl<E: Executor + 'static> From<Arc<E>> for ExecutorHandle {
    fn from(executor: Arc<E>) -> Self {
        Self { inner: executor }
    }
}

impl fmt::Debug for ExecutorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutorHandle").finish_non_exhaustive()
    }
}
