//! Tether: continuation-passing futures whose lifetimes are tethered to
//! the scopes that created them.
//!
//! # Overview
//!
//! Tether is a callback-chaining execution layer for event-loop programs.
//! It does not own a scheduler: everything runs on an [`Executor`] the
//! host supplies (post, delayed post, fd watching, a clock, and stop).
//! On top of that loop it builds write-once promises, chainable futures,
//! and pub/sub signals whose callbacks are all scoped to a [`Context`] —
//! destroy or reset the context and every pending callback it owns is
//! dropped without running.
//!
//! # Core Guarantees
//!
//! - **Write-once**: A promise is fulfilled at most once; a future is
//!   chained at most once
//! - **Never inline**: Values are delivered as posted tasks, never inside
//!   the fulfilling call
//! - **Drop is cancel**: The context registry holds the only strong
//!   handle to each pending callback; reset drops them all
//! - **Panics stay local**: A panicking continuation abandons its own
//!   chain and nothing else
//! - **Deterministic testing**: The lab executor runs the whole stack on
//!   virtual time, single-threaded
//!
//! # Module Structure
//!
//! - [`executor`]: The consumed loop interface and its shared handle
//! - [`context`]: Lifetime scoping and the item registry
//! - [`promise`]: Write-once promise/future pairs and chaining
//! - [`signal`]: Multi-listener broadcast with RAII subscriptions
//! - [`rwlock`]: Callback-admission reader/writer lock
//! - [`combinator`]: when_all, when_any, deadlines, polling loops
//! - [`token`]: Scope-exit actions
//! - [`lab`]: Deterministic executor for tests
//! - [`time`]: Nanosecond loop-clock timestamps
//! - [`error`]: Error types
//! - [`util`]: Internal utilities (generation-checked slot arena)
//!
//! # Example
//!
//! ```
//! use tether::{Context, LabExecutor, Promise};
//!
//! let lab = LabExecutor::new();
//! let context = Context::new(lab.handle());
//!
//! let promise = Promise::new();
//! promise.future().then(&context, |n: u32| {
//!     assert_eq!(n, 41);
//!     n + 1
//! });
//!
//! promise.fulfill(41);
//! lab.run_until_idle();
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::doc_markdown)]

pub mod combinator;
pub mod context;
pub mod error;
pub mod executor;
pub mod lab;
pub mod promise;
pub mod rwlock;
pub mod signal;
pub mod test_utils;
pub mod time;
pub mod token;
pub mod tracing_compat;
pub mod util;

// Re-exports for convenient access to core types
pub use combinator::{
    delay, expires_in, until_done, until_done_future, when_all, when_all2, when_all3, when_any,
    when_any2, AnyWinner, Expiry,
};
pub use context::{Context, ContextItem, ItemAnchor, ItemId};
pub use error::FulfillError;
pub use executor::{Executor, ExecutorHandle, FdInterest, Task, WatchTask};
pub use lab::{LabConfig, LabExecutor};
pub use promise::{Future, Promise};
pub use rwlock::RwLock;
pub use signal::{Signal, Subscription};
pub use time::Time;
pub use token::RaiiToken;
