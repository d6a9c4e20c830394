//! Hierarchical cancellation token for cooperative cancellation.

use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::Notify;

#[derive(Default)]
struct TokenState {
    cancelled: AtomicBool,
    /// Set once, by the first cancel.
    reason: RwLock<Option<String>>,
    /// Linked child tokens.
    children: Mutex<Vec<Weak<TokenState>>>,
    /// Wakes tasks awaiting cancellation.
    notify: Notify,
}

impl TokenState {
    fn cancel(&self, reason: String) {
        if self
            .cancelled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        *self.reason.write() = Some(reason.clone());
        self.notify.notify_waiters();

        let children = std::mem::take(&mut *self.children.lock());
        for child in children.iter().filter_map(Weak::upgrade) {
            child.cancel(reason.clone());
        }
    }
}

/// A cheaply cloneable token for cooperative cancellation.
///
/// Clones share state. Tokens created with [`CancellationToken::child_token`]
/// are cancelled whenever their parent is, while cancelling a child leaves
/// the parent untouched. Cancellation is idempotent and only the first reason
/// is kept.
#[derive(Clone, Default)]
pub struct CancellationToken {
    state: Arc<TokenState>,
}

impl CancellationToken {
    /// Creates a new, uncancelled root token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a child token linked to this one.
    ///
    /// If this token is already cancelled the child starts out cancelled.
    #[must_use]
    pub fn child_token(&self) -> Self {
        let child = Self::new();

        let mut children = self.state.children.lock();
        if self.is_cancelled() {
            drop(children);
            child.state.cancel(self.reason().unwrap_or_default());
        } else {
            children.retain(|weak| weak.strong_count() > 0);
            children.push(Arc::downgrade(&child.state));
        }

        child
    }

    /// Requests cancellation with a reason.
    ///
    /// Linked children are cancelled with the same reason.
    pub fn cancel(&self, reason: impl Into<String>) {
        self.state.cancel(reason.into());
    }

    /// Returns whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst)
    }

    /// Returns the cancellation reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.state.reason.read().clone()
    }

    /// Completes once cancellation has been requested.
    pub async fn cancelled(&self) {
        loop {
            // Registered before the flag check so a concurrent cancel is never missed.
            let notified = self.state.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("is_cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .finish_non_exhaustive()
    }
}
