//! Single-shot cleanup tokens.
//!
//! A [`RaiiToken`] carries a deferred action and guarantees it runs at most
//! once: explicitly via [`RaiiToken::reset`], or implicitly when the token
//! drops. Moving the token moves the obligation with it, so whichever scope
//! finally drops the token is the one that pays.
//!
//! Tokens are the cancellation currency of this crate: lock waiters and
//! signal subscriptions hand one back, and releasing it *is* the
//! cancel/release call.

use core::fmt;

type Action = Box<dyn FnOnce() + Send>;

/// A move-only handle that runs its action exactly once.
#[must_use = "dropping a token runs its action immediately"]
pub struct RaiiToken {
    action: Option<Action>,
    dismissible: bool,
}

impl RaiiToken {
    /// Creates a token whose action runs on reset or drop.
    pub fn new(action: impl FnOnce() + Send + 'static) -> Self {
        Self {
            action: Some(Box::new(action)),
            dismissible: false,
        }
    }

    /// Creates a token that may be [dismissed](Self::dismiss) without
    /// running its action.
    pub fn dismissible(action: impl FnOnce() + Send + 'static) -> Self {
        Self {
            action: Some(Box::new(action)),
            dismissible: true,
        }
    }

    /// Creates a token with no action. Useful as a placeholder in
    /// structures that swap a live token in later.
    pub const fn empty() -> Self {
        Self {
            action: None,
            dismissible: true,
        }
    }

    /// Returns true while the action has not yet run or been dismissed.
    #[must_use]
    pub const fn is_armed(&self) -> bool {
        self.action.is_some()
    }

    /// Returns true if [`RaiiToken::dismiss`] is permitted.
    #[must_use]
    pub const fn is_dismissible(&self) -> bool {
        self.dismissible
    }

    /// Runs the action now. Does nothing if it already ran.
    pub fn reset(&mut self) {
        if let Some(action) = self.action.take() {
            action();
        }
    }

    /// Discards the action without running it.
    ///
    /// # Panics
    ///
    /// Panics if the token was not created with [`RaiiToken::dismissible`];
    /// silently skipping a mandatory cleanup is a caller bug.
    pub fn dismiss(mut self) {
        assert!(
            self.dismissible,
            "dismissed a token whose action is mandatory"
        );
        self.action = None;
    }
}

impl Default for RaiiToken {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for RaiiToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RaiiToken")
            .field("armed", &self.is_armed())
            .field("dismissible", &self.dismissible)
            .finish()
    }
}

impl Drop for RaiiToken {
    fn drop(&mut self) {
        if let Some(action) = self.action.take() {
            action();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting_token(counter: &Arc<AtomicUsize>) -> RaiiToken {
        let counter = counter.clone();
        RaiiToken::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn drop_runs_action_once() {
        let counter = Arc::new(AtomicUsize::new(0));
        {
            let _token = counting_token(&counter);
        }
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn reset_runs_action_and_disarms() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut token = counting_token(&counter);
        token.reset();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(!token.is_armed());

        token.reset();
        drop(token);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn move_transfers_the_obligation() {
        let counter = Arc::new(AtomicUsize::new(0));
        let token = counting_token(&counter);
        let moved = token;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        drop(moved);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dismiss_skips_the_action() {
        let counter = Arc::new(AtomicUsize::new(0));
        let inner = counter.clone();
        let token = RaiiToken::dismissible(move || {
            inner.fetch_add(1, Ordering::SeqCst);
        });
        token.dismiss();
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    #[should_panic(expected = "dismissed a token whose action is mandatory")]
    fn dismissing_a_mandatory_token_panics() {
        let token = RaiiToken::new(|| {});
        token.dismiss();
    }

    #[test]
    fn empty_token_is_inert() {
        let mut token = RaiiToken::empty();
        assert!(!token.is_armed());
        token.reset();
        drop(token);
    }
}
