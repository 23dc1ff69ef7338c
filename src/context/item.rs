//! Context items and their anchors.
//!
//! Anything whose lifetime a [`Context`](super::Context) should govern
//! implements [`ContextItem`] by embedding an [`ItemAnchor`]. The anchor
//! is the item's link back to its context: it knows the registry slot the
//! item occupies and schedules work that is automatically skipped once
//! the item or its context is gone.

use super::{ContextCore, ItemId};
use crate::executor::ExecutorHandle;
use crate::tracing_compat::trace;
use core::fmt;
use core::time::Duration;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};

/// An object owned by a [`Context`](super::Context).
///
/// Implementors embed an [`ItemAnchor`] and return it from
/// [`anchor`](ContextItem::anchor). Binding the item to a context stores
/// the strong handle in the context's registry; from then on the context
/// decides when the item dies.
pub trait ContextItem: Send + Sync {
    /// The item's anchor. Must always return the same field.
    fn anchor(&self) -> &ItemAnchor;
}

struct AnchorInner {
    context: Weak<ContextCore>,
    id: Option<ItemId>,
    // `Weak::new` needs a sized target, so the unbound state is None.
    this: Option<Weak<dyn ContextItem>>,
}

/// An item's link to the context that owns it.
///
/// Fresh anchors are unbound; [`Context::bind`](super::Context::bind)
/// attaches them. All scheduling through a bound anchor is weak-guarded:
/// if the context or the item is destroyed before a scheduled task runs,
/// the task is dropped silently.
pub struct ItemAnchor {
    inner: Mutex<AnchorInner>,
}

impl ItemAnchor {
    /// Creates an unbound anchor.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(AnchorInner {
                context: Weak::new(),
                id: None,
                this: None,
            }),
        }
    }

    pub(crate) fn attach(
        &self,
        context: Weak<ContextCore>,
        id: ItemId,
        this: Weak<dyn ContextItem>,
    ) {
        let mut inner = self.inner.lock();
        assert!(inner.id.is_none(), "context item bound twice");
        inner.context = context;
        inner.id = Some(id);
        inner.this = Some(this);
    }

    /// True while the item sits in a live context's registry.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        let inner = self.inner.lock();
        inner.id.is_some() && inner.context.strong_count() > 0
    }

    /// The owning context's executor, if the context is still alive.
    #[must_use]
    pub fn executor(&self) -> Option<ExecutorHandle> {
        self.inner
            .lock()
            .context
            .upgrade()
            .map(|core| core.executor().clone())
    }

    pub(crate) fn context_core(&self) -> Option<Arc<ContextCore>> {
        self.inner.lock().context.upgrade()
    }

    /// Schedules `task` on the owning context's executor.
    ///
    /// The task is dropped without running if the context or the item is
    /// destroyed first, or if the anchor was never bound.
    pub fn post(&self, task: impl FnOnce() + Send + 'static) {
        self.schedule(None, Box::new(task));
    }

    /// Like [`post`](Self::post), but runs after `delay` on the
    /// executor's clock.
    pub fn post_delayed(&self, delay: Duration, task: impl FnOnce() + Send + 'static) {
        self.schedule(Some(delay), Box::new(task));
    }

    fn schedule(&self, delay: Option<Duration>, task: Box<dyn FnOnce() + Send>) {
        let (executor, context, this) = {
            let inner = self.inner.lock();
            let Some(core) = inner.context.upgrade() else {
                trace!("post through a dead context; task dropped");
                return;
            };
            let Some(this) = inner.this.clone() else {
                trace!("post through an unbound anchor; task dropped");
                return;
            };
            (core.executor().clone(), inner.context.clone(), this)
        };
        let guarded = move || {
            if context.upgrade().is_none() {
                trace!("context destroyed before task ran; task dropped");
                return;
            }
            // Hold the item alive for the duration of its own task.
            let Some(_live) = this.upgrade() else {
                trace!("item removed before task ran; task dropped");
                return;
            };
            task();
        };
        match delay {
            None => executor.post(guarded),
            Some(delay) => executor.post_delayed(delay, guarded),
        }
    }

    /// Removes the item from its context's registry and returns the
    /// registry's strong handle.
    ///
    /// The caller decides when that handle drops, which matters when an
    /// item removes *itself*: holding the returned `Arc` keeps the item
    /// alive until the caller's frame unwinds. Returns `None`, harmlessly,
    /// when the anchor is unbound, already removed, or the context is
    /// gone.
    pub fn decontextualize(&self) -> Option<Arc<dyn ContextItem>> {
        let (core, id) = {
            let mut inner = self.inner.lock();
            let id = inner.id.take()?;
            let core = inner.context.upgrade();
            inner.context = Weak::new();
            inner.this = None;
            (core, id)
        };
        core?.remove(id)
    }
}

impl Default for ItemAnchor {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ItemAnchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("ItemAnchor")
            .field("id", &inner.id)
            .field("context_alive", &(inner.context.strong_count() > 0))
            .finish()
    }
}
