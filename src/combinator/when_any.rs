//! First input wins.
//!
//! The winner is whichever input's delivery task runs first on the
//! context's executor; later deliveries lose their value silently. A
//! losing value is dropped, not stored, so types with meaningful drops
//! (tokens, guards) release promptly.

use crate::context::Context;
use crate::promise::{Future, Promise};
use crate::tracing_compat::trace;
use std::sync::Arc;

/// Which of two inputs resolved first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnyWinner<A, B> {
    /// The first input won.
    First(A),
    /// The second input won.
    Second(B),
}

impl<A, B> AnyWinner<A, B> {
    /// True when the first input won.
    #[must_use]
    pub const fn is_first(&self) -> bool {
        matches!(self, Self::First(_))
    }

    /// True when the second input won.
    #[must_use]
    pub const fn is_second(&self) -> bool {
        matches!(self, Self::Second(_))
    }

    /// The first input's value, if it won.
    pub fn into_first(self) -> Option<A> {
        match self {
            Self::First(value) => Some(value),
            Self::Second(_) => None,
        }
    }

    /// The second input's value, if it won.
    pub fn into_second(self) -> Option<B> {
        match self {
            Self::First(_) => None,
            Self::Second(value) => Some(value),
        }
    }
}

/// Resolves with whichever input resolves first. The loser's value is
/// dropped when it eventually arrives.
pub fn when_any2<A, B>(
    context: &Context,
    first: Future<A>,
    second: Future<B>,
) -> Future<AnyWinner<A, B>>
where
    A: Send + 'static,
    B: Send + 'static,
{
    let promise = Arc::new(Promise::new());
    let result = promise.future();

    let winner = promise.clone();
    first.then(context, move |value| {
        if winner.try_fulfill(AnyWinner::First(value)).is_err() {
            trace!("when_any2 first input lost the race");
        }
    });
    second.then(context, move |value| {
        if promise.try_fulfill(AnyWinner::Second(value)).is_err() {
            trace!("when_any2 second input lost the race");
        }
    });

    result
}

/// Resolves with the index and value of whichever input resolves first.
///
/// An empty input never resolves; callers that cannot rule that out
/// should bound the result with [`expires_in`](super::expires_in).
pub fn when_any<T>(context: &Context, futures: Vec<Future<T>>) -> Future<(usize, T)>
where
    T: Send + 'static,
{
    let promise = Arc::new(Promise::new());
    let result = promise.future();

    for (index, future) in futures.into_iter().enumerate() {
        let promise = promise.clone();
        future.then(context, move |value| {
            if promise.try_fulfill((index, value)).is_err() {
                trace!(index, "when_any input lost the race");
            }
        });
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{init_test_logging, lab_context};
    use parking_lot::Mutex;

    #[test]
    fn first_resolution_wins() {
        init_test_logging();
        let (lab, ctx) = lab_context();
        let slow: Promise<u32> = Promise::new();
        let fast: Promise<&'static str> = Promise::new();

        let out = Arc::new(Mutex::new(None));
        let sink = out.clone();
        when_any2(&ctx, slow.future(), fast.future()).then(&ctx, move |winner| {
            *sink.lock() = Some(winner);
        });

        fast.fulfill("quick");
        lab.run_until_idle();
        assert_eq!(*out.lock(), Some(AnyWinner::Second("quick")));

        // The loser arriving later is dropped without complaint.
        slow.fulfill(99);
        lab.run_until_idle();
        assert_eq!(*out.lock(), Some(AnyWinner::Second("quick")));
    }

    #[test]
    fn same_drain_ties_go_to_the_earlier_delivery() {
        init_test_logging();
        let (lab, ctx) = lab_context();
        let a: Promise<u8> = Promise::new();
        let b: Promise<u8> = Promise::new();

        let out = Arc::new(Mutex::new(None));
        let sink = out.clone();
        when_any2(&ctx, a.future(), b.future()).then(&ctx, move |winner| {
            *sink.lock() = Some(winner);
        });

        // Both fulfilled before the drain: the executor runs delivery
        // tasks in post order, so the first fulfill wins.
        b.fulfill(2);
        a.fulfill(1);
        lab.run_until_idle();
        assert_eq!(*out.lock(), Some(AnyWinner::Second(2)));
    }

    #[test]
    fn indexed_race_reports_the_winning_slot() {
        init_test_logging();
        crate::test_phase!("indexed race");
        let (lab, ctx) = lab_context();
        let promises: Vec<Promise<&'static str>> = (0..3).map(|_| Promise::new()).collect();
        let futures = promises.iter().map(Promise::future).collect();

        let out = Arc::new(Mutex::new(None));
        let sink = out.clone();
        when_any(&ctx, futures).then(&ctx, move |winner| {
            *sink.lock() = Some(winner);
        });

        promises[1].fulfill("middle");
        lab.run_until_idle();
        promises[0].fulfill("late");
        promises[2].fulfill("later");
        lab.run_until_idle();

        let winner = out.lock().clone();
        crate::assert_with_log!(
            winner == Some((1, "middle")),
            "winning slot",
            Some((1usize, "middle")),
            winner
        );
        crate::test_complete!("indexed race");
    }

    #[test]
    fn winner_accessors() {
        let first: AnyWinner<u8, &str> = AnyWinner::First(3);
        assert!(first.is_first());
        assert!(!first.is_second());
        assert_eq!(first.into_first(), Some(3));

        let second: AnyWinner<u8, &str> = AnyWinner::Second("s");
        assert!(second.is_second());
        assert_eq!(second.into_first(), None);
        assert_eq!(second.into_second(), Some("s"));
    }

    #[test]
    fn reset_abandons_the_race() {
        init_test_logging();
        let (lab, ctx) = lab_context();
        let a: Promise<u8> = Promise::new();
        let b: Promise<u8> = Promise::new();

        let hit = Arc::new(Mutex::new(false));
        let sink = hit.clone();
        when_any2(&ctx, a.future(), b.future()).then(&ctx, move |_| {
            *sink.lock() = true;
        });

        ctx.reset();
        a.fulfill(1);
        b.fulfill(2);
        lab.run_until_idle();
        assert!(!*hit.lock());
    }
}
