//! Change notification — subscribe/unsubscribe/publish over peer snapshots.
//!
//! Both stores use the same pattern: listeners receive an owned snapshot of
//! the current collection, synchronously, in subscription order. The
//! listener list is copied out of the lock before delivery, so a listener
//! may call back into the store without deadlocking.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Handle identifying one subscribed listener.
pub type ListenerId = u64;

type Listener<T> = Arc<dyn Fn(&[T]) + Send + Sync>;

/// Generic subscribe/notify primitive.
pub struct Notifier<T> {
    listeners: Mutex<Vec<(ListenerId, Listener<T>)>>,
    next_id: AtomicU64,
}

impl<T: Clone> Notifier<T> {
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a listener. It receives every subsequent snapshot until
    /// unsubscribed.
    pub fn subscribe(&self, listener: impl Fn(&[T]) + Send + Sync + 'static) -> ListenerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().push((id, Arc::new(listener)));
        id
    }

    /// Remove a listener. Unknown ids are a no-op.
    pub fn unsubscribe(&self, id: ListenerId) {
        self.lock().retain(|(lid, _)| *lid != id);
    }

    /// Deliver a snapshot to every current listener, in subscription order.
    ///
    /// A panicking listener is caught and logged; delivery continues to the
    /// rest.
    pub fn notify(&self, snapshot: &[T]) {
        let listeners: Vec<Listener<T>> =
            self.lock().iter().map(|(_, l)| l.clone()).collect();
        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(snapshot))).is_err() {
                tracing::warn!("peer listener panicked during notification");
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(ListenerId, Listener<T>)>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Clone> Default for Notifier<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII subscription handle returned by the stores.
///
/// Dropping the handle unsubscribes the listener.
#[must_use = "dropping a Subscription unsubscribes its listener"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub(crate) fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Explicitly unsubscribe. Equivalent to dropping the handle.
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}
