//! Deterministic in-process executor for tests.
//!
//! [`LabExecutor`] implements [`Executor`] over a virtual clock: nothing
//! runs until the test drains the queue, time only moves when the test
//! advances it, and fd readiness is injected explicitly. Every run of a
//! test observes the same interleaving.
//!
//! # Model
//!
//! - `post` appends to a FIFO queue; [`LabExecutor::run_until_idle`]
//!   drains it, always popping under the lock and running outside it so
//!   tasks can re-post freely.
//! - `post_delayed` parks the task in a min-heap keyed by
//!   `(deadline, sequence)`; [`LabExecutor::advance`] walks the heap in
//!   deadline order, setting the clock to each deadline before the task
//!   runs, so a timer task observes `now()` equal to its own deadline.
//! - `watch` arms a readiness watcher; [`LabExecutor::fire_fd`] injects
//!   events and disarms watchers that return false.
//! - `stop` records an exit code; queued and later-posted tasks are
//!   dropped from then on.

use crate::executor::{Executor, ExecutorHandle, FdInterest, Task, WatchTask};
use crate::time::Time;
use crate::tracing_compat::trace;
use core::cmp::Ordering;
use core::time::Duration;
use parking_lot::Mutex;
use std::collections::{BinaryHeap, VecDeque};
use std::os::fd::RawFd;
use std::sync::Arc;

/// Default ceiling on tasks drained by one `run_until_idle` call.
const DEFAULT_DRAIN_BUDGET: usize = 100_000;

/// Construction parameters for a [`LabExecutor`].
#[derive(Debug, Clone, Copy)]
pub struct LabConfig {
    start_time: Time,
    drain_budget: usize,
}

impl LabConfig {
    /// The default configuration: clock at [`Time::ZERO`], drain budget
    /// of 100 000 tasks.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            start_time: Time::ZERO,
            drain_budget: DEFAULT_DRAIN_BUDGET,
        }
    }

    /// Starts the virtual clock at `start_time` instead of zero.
    #[must_use]
    pub const fn with_start_time(mut self, start_time: Time) -> Self {
        self.start_time = start_time;
        self
    }

    /// Caps how many tasks a single drain may run before panicking.
    /// Guards tests against accidental self-reposting livelocks.
    #[must_use]
    pub const fn with_drain_budget(mut self, drain_budget: usize) -> Self {
        self.drain_budget = drain_budget;
        self
    }
}

impl Default for LabConfig {
    fn default() -> Self {
        Self::new()
    }
}

struct TimerEntry {
    deadline: Time,
    seq: u64,
    task: Task,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so the max-heap pops the earliest deadline; sequence
        // breaks ties in submission order.
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct WatchEntry {
    fd: RawFd,
    interest: FdInterest,
    watcher: WatchTask,
}

struct LabInner {
    now: Time,
    queue: VecDeque<Task>,
    timers: BinaryHeap<TimerEntry>,
    watches: Vec<WatchEntry>,
    next_seq: u64,
    stop_code: Option<i32>,
}

struct LabCore {
    state: Mutex<LabInner>,
    drain_budget: usize,
}

impl Executor for LabCore {
    fn post(&self, task: Task) {
        let mut state = self.state.lock();
        if state.stop_code.is_some() {
            trace!("task posted after stop; dropped");
            return;
        }
        state.queue.push_back(task);
    }

    fn post_delayed(&self, delay: Duration, task: Task) {
        let mut state = self.state.lock();
        if state.stop_code.is_some() {
            trace!("delayed task posted after stop; dropped");
            return;
        }
        let deadline = state.now + delay;
        let seq = state.next_seq;
        state.next_seq += 1;
        state.timers.push(TimerEntry {
            deadline,
            seq,
            task,
        });
    }

    fn watch(&self, fd: RawFd, interest: FdInterest, watcher: WatchTask) {
        let mut state = self.state.lock();
        if state.stop_code.is_some() {
            trace!(fd, "watch armed after stop; dropped");
            return;
        }
        state.watches.push(WatchEntry {
            fd,
            interest,
            watcher,
        });
    }

    fn now(&self) -> Time {
        self.state.lock().now
    }

    fn stop(&self, exit_code: i32) {
        let mut state = self.state.lock();
        if state.stop_code.is_none() {
            state.stop_code = Some(exit_code);
        }
    }
}

/// A deterministic executor driven manually by the test.
pub struct LabExecutor {
    core: Arc<LabCore>,
}

impl LabExecutor {
    /// Creates an executor with the default [`LabConfig`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(LabConfig::default())
    }

    /// Creates an executor with an explicit configuration.
    #[must_use]
    pub fn with_config(config: LabConfig) -> Self {
        Self {
            core: Arc::new(LabCore {
                state: Mutex::new(LabInner {
                    now: config.start_time,
                    queue: VecDeque::new(),
                    timers: BinaryHeap::new(),
                    watches: Vec::new(),
                    next_seq: 0,
                    stop_code: None,
                }),
                drain_budget: config.drain_budget,
            }),
        }
    }

    /// Returns a shareable [`ExecutorHandle`] onto this executor.
    #[must_use]
    pub fn handle(&self) -> ExecutorHandle {
        ExecutorHandle::new(self.core.clone())
    }

    /// Runs queued tasks until the queue is empty. Returns how many ran.
    ///
    /// Tasks run outside the state lock, so they may post, watch, and
    /// stop freely.
    ///
    /// # Panics
    ///
    /// Panics if the drain exceeds the configured budget, which almost
    /// always means a task is unconditionally re-posting itself.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        loop {
            let task = {
                let mut state = self.core.state.lock();
                if state.stop_code.is_some() {
                    state.queue.clear();
                    None
                } else {
                    state.queue.pop_front()
                }
            };
            let Some(task) = task else { break };
            task();
            ran += 1;
            assert!(
                ran <= self.core.drain_budget,
                "lab executor ran {ran} tasks without going idle; livelock?"
            );
        }
        ran
    }

    /// Runs at most one queued task. Returns whether one ran.
    ///
    /// Useful when a test needs to interleave its own actions between
    /// tasks of a single drain.
    pub fn run_one(&self) -> bool {
        let task = {
            let mut state = self.core.state.lock();
            if state.stop_code.is_some() {
                state.queue.clear();
                None
            } else {
                state.queue.pop_front()
            }
        };
        match task {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }

    /// Advances the virtual clock by `delta`, firing due timers in
    /// deadline order and draining the queue after each batch. Returns
    /// how many tasks ran.
    pub fn advance(&self, delta: Duration) -> usize {
        let target = {
            let state = self.core.state.lock();
            state.now + delta
        };
        let mut ran = self.run_until_idle();
        loop {
            let progressed = {
                let mut state = self.core.state.lock();
                match state.timers.peek() {
                    Some(entry) if entry.deadline <= target => {
                        let instant = entry.deadline;
                        state.now = instant;
                        while state
                            .timers
                            .peek()
                            .is_some_and(|entry| entry.deadline <= instant)
                        {
                            if let Some(entry) = state.timers.pop() {
                                state.queue.push_back(entry.task);
                            }
                        }
                        true
                    }
                    _ => false,
                }
            };
            if !progressed {
                break;
            }
            ran += self.run_until_idle();
        }
        self.core.state.lock().now = target;
        ran
    }

    /// Jumps the clock to the earliest pending timer and fires it.
    ///
    /// Returns false (without moving the clock) when no timer is pending.
    pub fn advance_to_next_timer(&self) -> bool {
        let delta = {
            let state = self.core.state.lock();
            match state.timers.peek() {
                Some(entry) => entry.deadline.duration_since(state.now),
                None => return false,
            }
        };
        self.advance(delta);
        true
    }

    /// Injects readiness events for `fd`, invoking every watcher whose
    /// interest intersects `events`. Watchers that return false are
    /// disarmed. Returns how many watchers fired.
    pub fn fire_fd(&self, fd: RawFd, events: FdInterest) -> usize {
        let entries = {
            let mut state = self.core.state.lock();
            core::mem::take(&mut state.watches)
        };
        let mut kept = Vec::with_capacity(entries.len());
        let mut fired = 0;
        for mut entry in entries {
            let hit = entry.fd == fd && entry.interest.intersects(events);
            if hit {
                fired += 1;
                let ready = entry.interest.intersection(events);
                if (entry.watcher)(ready) {
                    kept.push(entry);
                }
            } else {
                kept.push(entry);
            }
        }
        {
            let mut state = self.core.state.lock();
            // Watchers may have armed new entries while the list was detached.
            kept.append(&mut state.watches);
            state.watches = kept;
        }
        fired
    }

    /// The current virtual time.
    #[must_use]
    pub fn now(&self) -> Time {
        self.core.state.lock().now
    }

    /// Number of tasks waiting in the FIFO queue.
    #[must_use]
    pub fn pending_tasks(&self) -> usize {
        self.core.state.lock().queue.len()
    }

    /// Number of timers that have not yet fired.
    #[must_use]
    pub fn pending_timers(&self) -> usize {
        self.core.state.lock().timers.len()
    }

    /// Number of armed fd watchers.
    #[must_use]
    pub fn watch_count(&self) -> usize {
        self.core.state.lock().watches.len()
    }

    /// True once `stop` has been called.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.core.state.lock().stop_code.is_some()
    }

    /// The exit code passed to the first `stop` call, if any.
    #[must_use]
    pub fn exit_code(&self) -> Option<i32> {
        self.core.state.lock().stop_code
    }
}

impl Default for LabExecutor {
    fn default() -> Self {
        Self::new()
    }
}
