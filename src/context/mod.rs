//! Lifetime scoping for asynchronous work.
//!
//! A [`Context`] owns a registry of [`ContextItem`]s: continuations,
//! timers, listeners, lock waiters. Destroying the context (or calling
//! [`Context::reset`]) destroys every registered item, and everything an
//! item had scheduled is silently skipped from then on. Cancellation in
//! this crate is not a method you call; it is a thing you drop.
//!
//! # Ownership shape
//!
//! Strong references point inward: the registry holds the only long-lived
//! `Arc` to each item. Items point outward with weak references, through
//! their [`ItemAnchor`], to the context and to themselves. Scheduled work
//! captures only weak references and upgrades at run time, so a posted
//! task can never resurrect a dead context or outlive its item.
//!
//! # Example
//!
//! ```
//! use tether::{Context, LabExecutor, Promise};
//!
//! let lab = LabExecutor::new();
//! let ctx = Context::new(lab.handle());
//!
//! let promise = Promise::new();
//! let future = promise.future().then(&ctx, |n: u32| n * 2);
//!
//! promise.fulfill(21);
//! lab.run_until_idle();
//! assert!(future.is_resolved());
//!
//! ctx.reset(); // everything still registered dies here
//! ```

mod item;

pub use item::{ContextItem, ItemAnchor};

use crate::executor::ExecutorHandle;
use crate::tracing_compat::trace;
use crate::util::{Arena, ArenaIndex};
use core::fmt;
use parking_lot::Mutex;
use std::sync::Arc;

/// Identifies an item's slot in a context registry.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ItemId(ArenaIndex);

impl fmt::Debug for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ItemId({}:{})", self.0.index(), self.0.generation())
    }
}

/// Shared interior of a [`Context`]. Items hold this weakly.
pub(crate) struct ContextCore {
    executor: ExecutorHandle,
    registry: Mutex<Arena<Arc<dyn ContextItem>>>,
}

impl ContextCore {
    pub(crate) fn executor(&self) -> &ExecutorHandle {
        &self.executor
    }

    pub(crate) fn bind(self: &Arc<Self>, item: Arc<dyn ContextItem>) {
        let weak_item = Arc::downgrade(&item);
        let anchor_owner = item.clone();
        let id = ItemId(self.registry.lock().insert(item));
        anchor_owner.anchor().attach(Arc::downgrade(self), id, weak_item);
        trace!(?id, "context item bound");
    }

    pub(crate) fn remove(&self, id: ItemId) -> Option<Arc<dyn ContextItem>> {
        self.registry.lock().remove(id.0)
    }

    fn reset(&self) {
        // Drain under the lock, drop outside it: an item's destructor may
        // call back into this registry (self-removal) or drop other handles.
        let drained = { self.registry.lock().drain() };
        if !drained.is_empty() {
            trace!(count = drained.len(), "context reset; dropping items");
        }
        drop(drained);
    }

    fn len(&self) -> usize {
        self.registry.lock().len()
    }
}

/// An ownership scope for asynchronous work.
///
/// Single-owner by design: a `Context` is not `Clone`, so the scope that
/// holds it decides when every item bound to it dies. See the
/// [module docs](self) for the ownership shape.
pub struct Context {
    core: Arc<ContextCore>,
}

impl Context {
    /// Creates a context that schedules through `executor`.
    #[must_use]
    pub fn new(executor: ExecutorHandle) -> Self {
        Self {
            core: Arc::new(ContextCore {
                executor,
                registry: Mutex::new(Arena::new()),
            }),
        }
    }

    /// The executor this context schedules through.
    #[must_use]
    pub fn executor(&self) -> ExecutorHandle {
        self.core.executor.clone()
    }

    /// Transfers ownership of `item` to this context.
    ///
    /// The registry takes a strong handle; the item's anchor is attached
    /// so it can schedule work and remove itself later.
    ///
    /// # Panics
    ///
    /// Panics if `item` is already bound to a context.
    pub fn bind<I: ContextItem + 'static>(&self, item: Arc<I>) {
        self.core.bind(item);
    }

    /// Destroys every bound item now. The context remains usable.
    pub fn reset(&self) {
        self.core.reset();
    }

    /// Number of currently bound items. Diagnostic.
    #[must_use]
    pub fn bound_items(&self) -> usize {
        self.core.len()
    }

    pub(crate) fn core(&self) -> &Arc<ContextCore> {
        &self.core
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        self.core.reset();
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("bound_items", &self.core.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{init_test_logging, lab_context};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct Probe {
        anchor: ItemAnchor,
        dropped: Arc<AtomicBool>,
    }

    impl Probe {
        fn new(dropped: &Arc<AtomicBool>) -> Arc<Self> {
            Arc::new(Self {
                anchor: ItemAnchor::new(),
                dropped: dropped.clone(),
            })
        }
    }

    impl ContextItem for Probe {
        fn anchor(&self) -> &ItemAnchor {
            &self.anchor
        }
    }

    impl Drop for Probe {
        fn drop(&mut self) {
            self.dropped.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn registry_keeps_items_alive() {
        init_test_logging();
        let (_lab, ctx) = lab_context();
        let dropped = Arc::new(AtomicBool::new(false));

        let probe = Probe::new(&dropped);
        ctx.bind(probe.clone());
        drop(probe);

        crate::assert_with_log!(
            !dropped.load(Ordering::SeqCst),
            "registry keeps the item alive",
            false,
            dropped.load(Ordering::SeqCst)
        );
        assert_eq!(ctx.bound_items(), 1);

        ctx.reset();
        assert!(dropped.load(Ordering::SeqCst));
        assert_eq!(ctx.bound_items(), 0);
        crate::test_complete!("registry_keeps_items_alive");
    }

    #[test]
    fn dropping_the_context_destroys_items() {
        init_test_logging();
        let (_lab, ctx) = lab_context();
        let dropped = Arc::new(AtomicBool::new(false));

        ctx.bind(Probe::new(&dropped));
        drop(ctx);
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[test]
    fn reset_leaves_the_context_usable() {
        init_test_logging();
        let (_lab, ctx) = lab_context();
        let first = Arc::new(AtomicBool::new(false));
        let second = Arc::new(AtomicBool::new(false));

        ctx.bind(Probe::new(&first));
        ctx.reset();
        assert!(first.load(Ordering::SeqCst));

        ctx.bind(Probe::new(&second));
        assert_eq!(ctx.bound_items(), 1);
        assert!(!second.load(Ordering::SeqCst));
    }

    #[test]
    fn decontextualize_returns_the_registry_handle() {
        init_test_logging();
        let (_lab, ctx) = lab_context();
        let dropped = Arc::new(AtomicBool::new(false));

        let probe = Probe::new(&dropped);
        ctx.bind(probe.clone());
        let anchor_view = probe.clone();
        drop(probe);

        let handle = anchor_view
            .anchor()
            .decontextualize()
            .expect("item was bound");
        assert_eq!(ctx.bound_items(), 0);
        assert!(!anchor_view.anchor().is_bound());

        // Second call is a harmless no-op.
        assert!(anchor_view.anchor().decontextualize().is_none());

        drop(handle);
        drop(anchor_view);
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[test]
    #[should_panic(expected = "context item bound twice")]
    fn binding_twice_panics() {
        let (_lab, ctx) = lab_context();
        let dropped = Arc::new(AtomicBool::new(false));
        let probe = Probe::new(&dropped);
        ctx.bind(probe.clone());
        ctx.bind(probe);
    }

    #[test]
    fn anchored_post_runs_while_bound() {
        init_test_logging();
        let (lab, ctx) = lab_context();
        let ran = Arc::new(AtomicUsize::new(0));

        let probe = Probe::new(&Arc::new(AtomicBool::new(false)));
        ctx.bind(probe.clone());

        let r = ran.clone();
        probe.anchor().post(move || {
            r.fetch_add(1, Ordering::SeqCst);
        });
        lab.run_until_idle();
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn queued_work_dies_with_the_context() {
        init_test_logging();
        crate::test_phase!("queue then reset");
        let (lab, ctx) = lab_context();
        let ran = Arc::new(AtomicUsize::new(0));

        let probe = Probe::new(&Arc::new(AtomicBool::new(false)));
        ctx.bind(probe.clone());

        let r = ran.clone();
        probe.anchor().post(move || {
            r.fetch_add(1, Ordering::SeqCst);
        });
        ctx.reset();
        lab.run_until_idle();

        crate::assert_with_log!(
            ran.load(Ordering::SeqCst) == 0,
            "queued task skipped after reset",
            0,
            ran.load(Ordering::SeqCst)
        );
        crate::test_complete!("queued_work_dies_with_the_context");
    }

    #[test]
    fn delayed_work_dies_with_the_item() {
        init_test_logging();
        let (lab, ctx) = lab_context();
        let ran = Arc::new(AtomicUsize::new(0));

        let probe = Probe::new(&Arc::new(AtomicBool::new(false)));
        ctx.bind(probe.clone());

        let r = ran.clone();
        probe
            .anchor()
            .post_delayed(core::time::Duration::from_millis(10), move || {
                r.fetch_add(1, Ordering::SeqCst);
            });

        // Remove just the item; the context stays alive.
        let handle = probe.anchor().decontextualize().expect("bound");
        drop(handle);
        drop(probe);

        lab.advance(core::time::Duration::from_millis(20));
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn post_through_dead_context_is_a_silent_noop() {
        init_test_logging();
        let (lab, ctx) = lab_context();
        let probe = Probe::new(&Arc::new(AtomicBool::new(false)));
        ctx.bind(probe.clone());
        drop(ctx);

        probe.anchor().post(|| panic!("must never run"));
        lab.run_until_idle();
        assert!(probe.anchor().executor().is_none());
    }

    #[test]
    fn unbound_anchor_schedules_nothing() {
        init_test_logging();
        let anchor = ItemAnchor::new();
        assert!(!anchor.is_bound());
        anchor.post(|| panic!("must never run"));
        assert!(anchor.decontextualize().is_none());
    }

    struct SelfDetaching {
        anchor: ItemAnchor,
    }

    impl ContextItem for SelfDetaching {
        fn anchor(&self) -> &ItemAnchor {
            &self.anchor
        }
    }

    impl Drop for SelfDetaching {
        fn drop(&mut self) {
            // Items may try to unhook themselves while the registry is
            // already tearing them down.
            let _ = self.anchor.decontextualize();
        }
    }

    #[test]
    fn self_removal_during_reset_does_not_deadlock() {
        init_test_logging();
        let (_lab, ctx) = lab_context();
        ctx.bind(Arc::new(SelfDetaching {
            anchor: ItemAnchor::new(),
        }));
        ctx.reset();
        assert_eq!(ctx.bound_items(), 0);
    }

    #[test]
    fn contexts_are_independent() {
        init_test_logging();
        let (_lab, first) = lab_context();
        let (_lab2, second) = lab_context();
        let a = Arc::new(AtomicBool::new(false));
        let b = Arc::new(AtomicBool::new(false));

        first.bind(Probe::new(&a));
        second.bind(Probe::new(&b));

        first.reset();
        assert!(a.load(Ordering::SeqCst));
        assert!(!b.load(Ordering::SeqCst));
    }
}
