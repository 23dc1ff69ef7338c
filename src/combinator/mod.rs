//! Combinators over futures.
//!
//! Everything here is assembled from the public primitives — promises,
//! chained futures, and anchored timers — and inherits their rules: results
//! are delivered as posted tasks on the owning context's executor, never
//! inline, and resetting the context abandons the combinator silently.
//!
//! - [`when_all2`] / [`when_all3`] / [`when_all`]: wait for every input
//! - [`when_any2`] / [`when_any`]: first input wins, later ones are dropped
//! - [`delay`]: a future that resolves after a virtual-time duration
//! - [`expires_in`]: bound a future by a deadline
//! - [`until_done`] / [`until_done_future`]: re-poll until a value appears

pub mod expires;
pub mod until_done;
pub mod when_all;
pub mod when_any;

pub use expires::{delay, expires_in, Expiry};
pub use until_done::{until_done, until_done_future};
pub use when_all::{when_all, when_all2, when_all3};
pub use when_any::{when_any, when_any2, AnyWinner};
