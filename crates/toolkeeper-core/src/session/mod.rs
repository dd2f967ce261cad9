//! Bearer token lifecycle.
//!
//! The in-memory value is what requests use; the store copy is what
//! survives restarts. `set_token` writes the store first and commits to
//! memory only once that succeeded, so the two never disagree after a
//! successful call.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

use crate::error::StorageError;
use crate::storage::{keys, KeyValueStore};

type Listener = Arc<dyn Fn(Option<&str>) + Send + Sync>;

struct Inner {
    store: Arc<dyn KeyValueStore>,
    token: RwLock<Option<String>>,
    listeners: Mutex<Vec<(u64, Listener)>>,
    next_listener_id: AtomicU64,
}

/// Owns the session token. Clones share the same state.
#[derive(Clone)]
pub struct TokenManager {
    inner: Arc<Inner>,
}

impl TokenManager {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                token: RwLock::new(None),
                listeners: Mutex::new(Vec::new()),
                next_listener_id: AtomicU64::new(0),
            }),
        }
    }

    /// Reload the token from the store, replacing whatever is in memory.
    ///
    /// A missing or unreadable stored token clears the in-memory one, so a
    /// session invalidated elsewhere never lingers.
    pub async fn init(&self) {
        let stored = match self.inner.store.get(keys::TOKEN).await {
            Ok(value) => value.filter(|t| !t.is_empty()),
            Err(e) => {
                tracing::warn!(error = %e, "could not read stored session token");
                None
            }
        };
        self.commit(stored);
    }

    /// Current token, if any.
    pub fn token(&self) -> Option<String> {
        self.inner
            .token
            .read()
            .map(|t| t.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    pub fn is_authenticated(&self) -> bool {
        self.token().is_some()
    }

    /// Replace the token. `None` logs the session out locally.
    ///
    /// # Errors
    /// Store failures propagate; memory and listeners are untouched then.
    pub async fn set_token(&self, token: Option<String>) -> Result<(), StorageError> {
        match token.as_deref() {
            Some(t) => self.inner.store.set(keys::TOKEN, t).await?,
            None => self.inner.store.remove(keys::TOKEN).await?,
        }
        self.commit(token);
        Ok(())
    }

    /// Register a callback invoked on every `init` and `set_token`.
    pub fn on_token_change<F>(&self, listener: F) -> Subscription
    where
        F: Fn(Option<&str>) + Send + Sync + 'static,
    {
        let id = self.inner.next_listener_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut listeners) = self.inner.listeners.lock() {
            listeners.push((id, Arc::new(listener)));
        }
        Subscription {
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    fn commit(&self, token: Option<String>) {
        {
            let mut slot = self
                .inner
                .token
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            *slot = token.clone();
        }
        self.notify(token.as_deref());
    }

    fn notify(&self, token: Option<&str>) {
        // snapshot so listeners may (un)subscribe from inside the callback
        let listeners: Vec<Listener> = match self.inner.listeners.lock() {
            Ok(listeners) => listeners.iter().map(|(_, l)| Arc::clone(l)).collect(),
            Err(_) => return,
        };
        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(token))).is_err() {
                tracing::warn!("token change listener panicked");
            }
        }
    }
}

/// Handle returned by [`TokenManager::on_token_change`].
///
/// Dropping it keeps the listener registered.
pub struct Subscription {
    id: u64,
    inner: Weak<Inner>,
}

impl Subscription {
    /// Remove the listener. Safe to call more than once.
    pub fn unsubscribe(&self) {
        if let Some(inner) = self.inner.upgrade() {
            if let Ok(mut listeners) = inner.listeners.lock() {
                listeners.retain(|(id, _)| *id != self.id);
            }
        }
    }
}
