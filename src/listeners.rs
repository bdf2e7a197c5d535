//! Change listeners and their unsubscribe handles

use crate::manager::StoredState;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, PoisonError};

pub(crate) type Listener<V> = Arc<dyn Fn(&StoredState<V>) + Send + Sync>;

/// Registered listeners in registration order
pub(crate) struct Listeners<V> {
    next_id: u64,
    entries: Vec<(u64, Listener<V>)>,
}

impl<V> Listeners<V> {
    pub(crate) fn new() -> Self {
        Self {
            next_id: 0,
            entries: Vec::new(),
        }
    }

    pub(crate) fn insert(&mut self, listener: Listener<V>) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.push((id, listener));
        id
    }

    pub(crate) fn remove(&mut self, id: u64) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry_id, _)| *entry_id != id);
        self.entries.len() != before
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Clone the current listeners so they can be called without holding a lock
    pub(crate) fn snapshot(&self) -> Vec<Listener<V>> {
        self.entries
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect()
    }
}

/// Call every listener with `state`
///
/// A panicking listener is logged and skipped; the rest are still called.
pub(crate) fn notify<V>(listeners: &[Listener<V>], state: &StoredState<V>, storage_key: &str) {
    for (index, listener) in listeners.iter().enumerate() {
        if catch_unwind(AssertUnwindSafe(|| listener(state))).is_err() {
            tracing::error!(storage_key, index, "state listener panicked");
        }
    }
}

/// Handle returned by `subscribe`
///
/// Dropping the handle keeps the listener registered. Call
/// [`unsubscribe`](Self::unsubscribe) to remove it; calling it again is harmless.
#[must_use = "dropping the handle does not remove the listener"]
pub struct Unsubscribe {
    remove: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl Unsubscribe {
    pub(crate) fn new(remove: impl FnOnce() + Send + 'static) -> Self {
        Self {
            remove: Mutex::new(Some(Box::new(remove))),
        }
    }

    /// A handle that removes nothing
    pub fn noop() -> Self {
        Self {
            remove: Mutex::new(None),
        }
    }

    /// Remove the listener this handle was created for
    pub fn unsubscribe(&self) {
        let remove = self
            .remove
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(remove) = remove {
            remove();
        }
    }
}

impl fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let active = self
            .remove
            .lock()
            .map(|remove| remove.is_some())
            .unwrap_or(false);
        write!(f, "Unsubscribe {{ active: {} }}", active)
    }
}
