//! Continuation records: the links between cells in a chain.
//!
//! A continuation is a [`ContextItem`]: the context registry owns it, the
//! input cell holds it weakly. When the input value arrives, the record
//! posts itself through its anchor, runs the body once, feeds the output
//! cell, and removes itself from the registry. If the context dies first,
//! the weak hop fails and the value is dropped in silence.

use super::cell::{Dispatch, SharedCell};
use super::Future;
use crate::context::{ContextItem, ItemAnchor};
use crate::tracing_compat::{error, trace};
use crate::util::panic_message;
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};

/// What a continuation body yields: a plain value for the output cell, or
/// a nested future whose eventual value feeds it instead.
pub(crate) enum Step<U> {
    Value(U),
    Chained(Future<U>),
}

pub(crate) type Body<In, Out> = Box<dyn FnOnce(In) -> Step<Out> + Send>;

pub(crate) struct Continuation<In, Out> {
    anchor: ItemAnchor,
    body: Mutex<Option<Body<In, Out>>>,
    output: Arc<SharedCell<Out>>,
}

impl<In: Send + 'static, Out: Send + 'static> Continuation<In, Out> {
    pub(crate) fn new(body: Body<In, Out>, output: Arc<SharedCell<Out>>) -> Arc<Self> {
        Arc::new(Self {
            anchor: ItemAnchor::new(),
            body: Mutex::new(Some(body)),
            output,
        })
    }

    /// Runs the body with the delivered value. Consumes the strong handle
    /// so the record outlives its own registry removal.
    fn run(self: Arc<Self>, input: In) {
        let body = self.body.lock().take();
        let Some(body) = body else { return };
        match catch_unwind(AssertUnwindSafe(|| body(input))) {
            Ok(Step::Value(value)) => self.output.fulfill(value),
            Ok(Step::Chained(inner)) => self.forward(inner),
            Err(payload) => {
                error!(
                    panic = panic_message(payload.as_ref()),
                    "continuation body panicked; chain abandoned"
                );
            }
        }
        let _ = self.anchor.decontextualize();
    }

    /// Splices a nested future in front of the output cell.
    fn forward(&self, inner: Future<Out>) {
        let Some(core) = self.anchor.context_core() else {
            trace!("context gone; nested future dropped");
            return;
        };
        let relay = Continuation::new(Box::new(Step::Value), self.output.clone());
        core.bind(relay.clone());
        let weak = Arc::downgrade(&relay);
        let target: Weak<dyn Dispatch<Out>> = weak;
        inner.cell.attach(target);
    }
}

impl<In: Send + 'static, Out: Send + 'static> ContextItem for Continuation<In, Out> {
    fn anchor(&self) -> &ItemAnchor {
        &self.anchor
    }
}

impl<In: Send + 'static, Out: Send + 'static> Dispatch<In> for Continuation<In, Out> {
    fn dispatch(self: Arc<Self>, value: In) {
        let target = Arc::downgrade(&self);
        self.anchor.post(move || {
            if let Some(record) = target.upgrade() {
                record.run(value);
            }
        });
    }
}
