//! Named store façade over a single state manager

use crate::error::StoreError;
use crate::listeners::Unsubscribe;
use crate::manager::{StateManager, StateValue, StoredState, WriteOutcome};
use crate::storage::StorageAdapter;
use std::fmt;
use std::sync::Arc;

struct StoreInner<V> {
    manager: StateManager<V>,
    initial_state: StoredState<V>,
}

/// A named, persisted store
///
/// Cloning is cheap; every clone refers to the same state. The name doubles
/// as the storage key.
pub struct Store<V = serde_json::Value> {
    inner: Arc<StoreInner<V>>,
}

/// Create a store persisted under `name`, starting from `initial_state`
///
/// The store stays empty until [`Store::initialize_store`] is awaited.
///
/// # Errors
///
/// Returns [`StoreError::KeyInUse`] if a live store already uses `name` in
/// the same storage namespace.
///
/// # Example
///
/// ```
/// use iced_persist::{MemoryStorage, StoredState, create_store};
/// use serde_json::json;
/// use std::sync::Arc;
///
/// # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
/// let storage = Arc::new(MemoryStorage::new());
/// let store = create_store(
///     "profile",
///     StoredState::from([("theme".to_string(), json!("light"))]),
///     storage,
/// )
/// .unwrap();
///
/// let _ = store.initialize_store().await;
/// let _ = store.set("theme", json!("dark")).await;
/// assert_eq!(store.get("theme"), Some(json!("dark")));
/// # });
/// ```
pub fn create_store<V: StateValue>(
    name: impl Into<String>,
    initial_state: StoredState<V>,
    storage: Arc<dyn StorageAdapter>,
) -> Result<Store<V>, StoreError> {
    let manager = StateManager::new(name, storage)?;

    Ok(Store {
        inner: Arc::new(StoreInner {
            manager,
            initial_state,
        }),
    })
}

impl<V: StateValue> Store<V> {
    /// Name of the store, also the key of its persisted record
    pub fn name(&self) -> &str {
        self.inner.manager.storage_key()
    }

    /// Namespace of the storage the store was created on
    ///
    /// Together with [`name`](Self::name) this identifies the persisted record.
    pub fn namespace(&self) -> &str {
        self.inner.manager.namespace()
    }

    /// Load persisted state over the store's initial state
    ///
    /// Only the first completed call has an effect; later calls return
    /// [`WriteOutcome::Ignored`].
    pub async fn initialize_store(&self) -> WriteOutcome {
        self.inner
            .manager
            .initialize(self.inner.initial_state.clone())
            .await
    }

    /// Whether [`initialize_store`](Self::initialize_store) has completed
    pub fn is_initialized(&self) -> bool {
        self.inner.manager.is_initialized()
    }

    /// Read a single value
    ///
    /// Returns `None` if the key is absent or the store is not initialized yet.
    pub fn get(&self, key: &str) -> Option<V> {
        self.inner.manager.get(key)
    }

    /// Snapshot of the whole state, empty before initialization
    pub fn get_state(&self) -> StoredState<V> {
        self.inner.manager.get_state()
    }

    /// Merge `updates` into the state, persist it and notify subscribers
    ///
    /// # Arguments
    ///
    /// * `updates` - Keys to overwrite; keys not present are left unchanged
    pub async fn set_state(&self, updates: StoredState<V>) -> WriteOutcome {
        self.inner.manager.set_state(updates).await
    }

    /// Overwrite a single key, persist it and notify subscribers
    ///
    /// # Arguments
    ///
    /// * `key` - The key to write
    /// * `value` - The new value
    pub async fn set(&self, key: impl Into<String>, value: V) -> WriteOutcome {
        self.inner.manager.set(key, value).await
    }

    /// Call `listener` with the full state after every change
    ///
    /// The listener stays registered until the returned handle's
    /// [`unsubscribe`](Unsubscribe::unsubscribe) is called.
    pub fn subscribe<F>(&self, listener: F) -> Unsubscribe
    where
        F: Fn(&StoredState<V>) + Send + Sync + 'static,
    {
        self.inner.manager.subscribe(listener)
    }

    /// Number of currently registered listeners
    pub fn listener_count(&self) -> usize {
        self.inner.manager.listener_count()
    }
}

impl<V> Clone for Store<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> fmt::Debug for Store<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Store {{ manager: {:?} }}", self.inner.manager)
    }
}
