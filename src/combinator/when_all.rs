//! Wait for every input future.
//!
//! Each input is chained in `context`, so the gathered result obeys the
//! usual delivery rules: it resolves on a posted task, and resetting the
//! context abandons the whole gather without resolving it.

use crate::context::Context;
use crate::promise::{Future, Promise};
use parking_lot::Mutex;
use std::sync::Arc;

struct Pair<A, B> {
    first: Option<A>,
    second: Option<B>,
    promise: Option<Promise<(A, B)>>,
}

impl<A, B> Pair<A, B> {
    /// Takes the promise and both values once everything has landed.
    /// The fulfill itself happens outside the slot lock.
    fn take_ready(&mut self) -> Option<(Promise<(A, B)>, (A, B))> {
        if self.first.is_some() && self.second.is_some() {
            let promise = self.promise.take()?;
            let first = self.first.take()?;
            let second = self.second.take()?;
            Some((promise, (first, second)))
        } else {
            None
        }
    }
}

/// Resolves with both values once both inputs have resolved, in either
/// order.
pub fn when_all2<A, B>(context: &Context, first: Future<A>, second: Future<B>) -> Future<(A, B)>
where
    A: Send + 'static,
    B: Send + 'static,
{
    let promise = Promise::new();
    let result = promise.future();
    let slots = Arc::new(Mutex::new(Pair {
        first: None,
        second: None,
        promise: Some(promise),
    }));

    let pair = slots.clone();
    first.then(context, move |value| {
        let ready = {
            let mut slots = pair.lock();
            slots.first = Some(value);
            slots.take_ready()
        };
        if let Some((promise, both)) = ready {
            promise.fulfill(both);
        }
    });

    second.then(context, move |value| {
        let ready = {
            let mut slots = slots.lock();
            slots.second = Some(value);
            slots.take_ready()
        };
        if let Some((promise, both)) = ready {
            promise.fulfill(both);
        }
    });

    result
}

/// Three-input [`when_all2`], flattened to a triple.
pub fn when_all3<A, B, C>(
    context: &Context,
    first: Future<A>,
    second: Future<B>,
    third: Future<C>,
) -> Future<(A, B, C)>
where
    A: Send + 'static,
    B: Send + 'static,
    C: Send + 'static,
{
    let front = when_all2(context, first, second);
    when_all2(context, front, third).then(context, |((a, b), c)| (a, b, c))
}

struct Gather<T> {
    slots: Vec<Option<T>>,
    remaining: usize,
    promise: Option<Promise<Vec<T>>>,
}

impl<T> Gather<T> {
    fn take_ready(&mut self) -> Option<(Promise<Vec<T>>, Vec<T>)> {
        let promise = self.promise.take()?;
        let values = self
            .slots
            .iter_mut()
            .map(Option::take)
            .collect::<Option<Vec<T>>>()?;
        Some((promise, values))
    }
}

/// Resolves with every value, in input order, once all inputs have
/// resolved. An empty input resolves immediately with an empty `Vec`.
pub fn when_all<T>(context: &Context, futures: Vec<Future<T>>) -> Future<Vec<T>>
where
    T: Send + 'static,
{
    if futures.is_empty() {
        return Future::resolved(Vec::new());
    }

    let promise = Promise::new();
    let result = promise.future();
    let gather = Arc::new(Mutex::new(Gather {
        slots: futures.iter().map(|_| None).collect(),
        remaining: futures.len(),
        promise: Some(promise),
    }));

    for (index, future) in futures.into_iter().enumerate() {
        let gather = gather.clone();
        future.then(context, move |value| {
            let ready = {
                let mut gather = gather.lock();
                gather.slots[index] = Some(value);
                gather.remaining -= 1;
                if gather.remaining == 0 {
                    gather.take_ready()
                } else {
                    None
                }
            };
            if let Some((promise, values)) = ready {
                promise.fulfill(values);
            }
        });
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{init_test_logging, lab_context};

    #[test]
    fn pair_resolves_once_both_inputs_do() {
        init_test_logging();
        let (lab, ctx) = lab_context();
        let first: Promise<u32> = Promise::new();
        let second: Promise<&'static str> = Promise::new();

        let out = Arc::new(Mutex::new(None));
        let sink = out.clone();
        when_all2(&ctx, first.future(), second.future()).then(&ctx, move |pair| {
            *sink.lock() = Some(pair);
        });

        // Reverse order on purpose.
        second.fulfill("ready");
        lab.run_until_idle();
        assert!(out.lock().is_none());

        first.fulfill(7);
        lab.run_until_idle();
        assert_eq!(*out.lock(), Some((7, "ready")));
    }

    #[test]
    fn triple_flattens_in_input_order() {
        init_test_logging();
        let (lab, ctx) = lab_context();
        let a: Promise<u8> = Promise::new();
        let b: Promise<u8> = Promise::new();
        let c: Promise<u8> = Promise::new();

        let out = Arc::new(Mutex::new(None));
        let sink = out.clone();
        when_all3(&ctx, a.future(), b.future(), c.future()).then(&ctx, move |triple| {
            *sink.lock() = Some(triple);
        });

        c.fulfill(3);
        a.fulfill(1);
        b.fulfill(2);
        lab.run_until_idle();
        assert_eq!(*out.lock(), Some((1, 2, 3)));
    }

    #[test]
    fn vector_preserves_input_order() {
        init_test_logging();
        crate::test_phase!("n-ary gather");
        let (lab, ctx) = lab_context();
        let promises: Vec<Promise<usize>> = (0..4).map(|_| Promise::new()).collect();
        let futures = promises.iter().map(Promise::future).collect();

        let out: Arc<Mutex<Option<Vec<usize>>>> = Arc::new(Mutex::new(None));
        let sink = out.clone();
        when_all(&ctx, futures).then(&ctx, move |values| {
            *sink.lock() = Some(values);
        });

        // Fulfill out of order; the gather must still come back in
        // input order.
        promises[3].fulfill(30);
        promises[0].fulfill(0);
        promises[2].fulfill(20);
        promises[1].fulfill(10);
        lab.run_until_idle();

        let values = out.lock().clone();
        crate::assert_with_log!(
            values == Some(vec![0, 10, 20, 30]),
            "gathered order",
            Some(vec![0usize, 10, 20, 30]),
            values
        );
        crate::test_complete!("n-ary gather");
    }

    #[test]
    fn empty_vector_resolves_immediately() {
        init_test_logging();
        let (lab, ctx) = lab_context();
        let hit = Arc::new(Mutex::new(false));
        let sink = hit.clone();
        when_all::<u32>(&ctx, Vec::new()).then(&ctx, move |values| {
            assert!(values.is_empty());
            *sink.lock() = true;
        });
        lab.run_until_idle();
        assert!(*hit.lock());
    }

    #[test]
    fn resetting_the_context_abandons_the_gather() {
        init_test_logging();
        let (lab, ctx) = lab_context();
        let first: Promise<u32> = Promise::new();
        let second: Promise<u32> = Promise::new();

        let hit = Arc::new(Mutex::new(false));
        let sink = hit.clone();
        when_all2(&ctx, first.future(), second.future()).then(&ctx, move |_| {
            *sink.lock() = true;
        });

        first.fulfill(1);
        ctx.reset();
        second.fulfill(2);
        lab.run_until_idle();
        assert!(!*hit.lock());
    }
}
