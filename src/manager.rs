//! State manager: one in-memory state mirrored to one storage record

use crate::error::StoreError;
use crate::listeners::{Listener, Listeners, Unsubscribe, notify};
use crate::registry::KeyLease;
use crate::storage::StorageAdapter;
use serde::{Serialize, de::DeserializeOwned};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, warn};

/// Mapping from state keys to values
pub type StoredState<V = serde_json::Value> = BTreeMap<String, V>;

/// Values that can live in a persisted state
pub trait StateValue: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> StateValue for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

/// Result of an operation that may change and persist the state
#[derive(Clone, Debug)]
#[must_use]
pub enum WriteOutcome {
    /// The change was applied and written to storage
    Persisted,
    /// The change was applied in memory but the storage write failed
    ///
    /// Memory and storage now differ until the next successful write.
    Unpersisted(Arc<StoreError>),
    /// Nothing changed
    Ignored,
}

impl WriteOutcome {
    /// Whether the in-memory state was changed
    pub fn is_applied(&self) -> bool {
        !matches!(self, WriteOutcome::Ignored)
    }

    /// Whether the change reached storage
    pub fn is_persisted(&self) -> bool {
        matches!(self, WriteOutcome::Persisted)
    }
}

impl From<Result<(), StoreError>> for WriteOutcome {
    fn from(result: Result<(), StoreError>) -> Self {
        match result {
            Ok(()) => WriteOutcome::Persisted,
            Err(e) => WriteOutcome::Unpersisted(Arc::new(e)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Uninitialized,
    Initializing,
    Ready,
}

struct Shared<V> {
    phase: Phase,
    state: StoredState<V>,
    listeners: Listeners<V>,
}

/// Puts an unfinished initialization back to `Uninitialized` when dropped
struct InitializingGuard<'a, V> {
    shared: &'a Mutex<Shared<V>>,
    completed: bool,
}

impl<V> Drop for InitializingGuard<'_, V> {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        let mut shared = self.shared.lock().unwrap_or_else(PoisonError::into_inner);
        if shared.phase == Phase::Initializing {
            shared.phase = Phase::Uninitialized;
        }
    }
}

/// Owns a state, persists it under a storage key and notifies listeners
///
/// Misuse never fails: reading or writing before [`initialize`](Self::initialize)
/// and initializing twice are logged and leave everything unchanged.
///
/// # Example
///
/// ```
/// use iced_persist::{MemoryStorage, StateManager, StoredState};
/// use serde_json::json;
/// use std::sync::Arc;
///
/// # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
/// let storage = Arc::new(MemoryStorage::new());
/// let manager: StateManager = StateManager::new("settings", storage).unwrap();
///
/// let defaults = StoredState::from([("theme".to_string(), json!("light"))]);
/// assert!(manager.initialize(defaults).await.is_persisted());
/// assert_eq!(manager.get("theme"), Some(json!("light")));
/// # });
/// ```
pub struct StateManager<V = serde_json::Value> {
    lease: KeyLease,
    storage: Arc<dyn StorageAdapter>,
    shared: Arc<Mutex<Shared<V>>>,
}

impl<V: StateValue> StateManager<V> {
    /// Create an empty, uninitialized manager for `storage_key`
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::KeyInUse`] if another live manager already uses
    /// the same key in the same storage namespace.
    pub fn new(
        storage_key: impl Into<String>,
        storage: Arc<dyn StorageAdapter>,
    ) -> Result<Self, StoreError> {
        let storage_key: String = storage_key.into();
        let lease = KeyLease::acquire(storage.namespace(), &storage_key)?;

        Ok(Self {
            lease,
            storage,
            shared: Arc::new(Mutex::new(Shared {
                phase: Phase::Uninitialized,
                state: StoredState::new(),
                listeners: Listeners::new(),
            })),
        })
    }

    /// Key of the persisted record
    pub fn storage_key(&self) -> &str {
        self.lease.key()
    }

    /// Namespace of the storage adapter holding the record
    pub fn namespace(&self) -> &str {
        self.lease.namespace()
    }

    /// Whether [`initialize`](Self::initialize) has completed
    pub fn is_initialized(&self) -> bool {
        self.lock().phase == Phase::Ready
    }

    /// Number of currently registered listeners
    pub fn listener_count(&self) -> usize {
        self.lock().listeners.len()
    }

    /// Load the persisted state, merge it over `initial_state` and persist the result
    ///
    /// Loaded keys take precedence over defaults. A failed or unparsable load
    /// counts as no prior state. Listeners are notified once the manager is ready.
    /// Only the first call has any effect. If the returned future is dropped
    /// before it completes, the manager is left uninitialized and a later call
    /// starts over.
    pub async fn initialize(&self, initial_state: StoredState<V>) -> WriteOutcome {
        {
            let mut shared = self.lock();
            if shared.phase != Phase::Uninitialized {
                warn!(
                    storage_key = self.storage_key(),
                    "state manager is already initialized or initializing"
                );
                return WriteOutcome::Ignored;
            }
            shared.phase = Phase::Initializing;
        }
        let mut guard = InitializingGuard {
            shared: &*self.shared,
            completed: false,
        };

        let mut state = initial_state;
        if let Some(loaded) = self.load().await {
            state.extend(loaded);
        }

        let persisted = self.save(&state).await;

        {
            let mut shared = self.lock();
            shared.state = state;
            shared.phase = Phase::Ready;
        }
        guard.completed = true;

        debug!(
            storage_key = self.storage_key(),
            namespace = self.lease.namespace(),
            "state manager initialized"
        );
        self.notify_listeners();

        persisted.into()
    }

    /// Value stored under `key`
    ///
    /// Returns `None` for a missing key and before initialization.
    pub fn get(&self, key: &str) -> Option<V> {
        let shared = self.lock();
        if shared.phase != Phase::Ready {
            warn!(
                storage_key = self.storage_key(),
                key, "state manager has not been initialized"
            );
            return None;
        }
        shared.state.get(key).cloned()
    }

    /// Snapshot of the full state
    ///
    /// Empty before initialization. Changes must go through
    /// [`set_state`](Self::set_state) to be persisted and observed.
    pub fn get_state(&self) -> StoredState<V> {
        let shared = self.lock();
        if shared.phase != Phase::Ready {
            warn!(
                storage_key = self.storage_key(),
                "state manager has not been initialized"
            );
            return StoredState::new();
        }
        shared.state.clone()
    }

    /// Merge `updates` over the current state, persist it and notify listeners
    ///
    /// Keys in `updates` replace existing ones; all other keys are kept. A
    /// failed write keeps the in-memory change and is reported as
    /// [`WriteOutcome::Unpersisted`].
    pub async fn set_state(&self, updates: StoredState<V>) -> WriteOutcome {
        let snapshot = {
            let mut shared = self.lock();
            if shared.phase != Phase::Ready {
                warn!(
                    storage_key = self.storage_key(),
                    "state manager has not been initialized"
                );
                return WriteOutcome::Ignored;
            }
            shared.state.extend(updates);
            shared.state.clone()
        };

        let persisted = self.save(&snapshot).await;
        self.notify_listeners();

        persisted.into()
    }

    /// Set a single key
    pub async fn set(&self, key: impl Into<String>, value: V) -> WriteOutcome {
        self.set_state(StoredState::from([(key.into(), value)])).await
    }

    /// Register a listener called with the full state after every change
    pub fn subscribe<F>(&self, listener: F) -> Unsubscribe
    where
        F: Fn(&StoredState<V>) + Send + Sync + 'static,
    {
        let listener: Listener<V> = Arc::new(listener);
        let id = {
            let mut shared = self.lock();
            let id = shared.listeners.insert(listener);
            debug!(
                storage_key = self.storage_key(),
                listeners = shared.listeners.len(),
                "listener subscribed"
            );
            id
        };

        let shared = Arc::downgrade(&self.shared);
        Unsubscribe::new(move || {
            if let Some(shared) = shared.upgrade() {
                shared
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .listeners
                    .remove(id);
            }
        })
    }

    fn notify_listeners(&self) {
        let (listeners, state) = {
            let shared = self.lock();
            (shared.listeners.snapshot(), shared.state.clone())
        };
        notify(&listeners, &state, self.storage_key());
    }

    async fn load(&self) -> Option<StoredState<V>> {
        let key = self.storage_key();

        let raw = match self.storage.get_item(key).await {
            Ok(Some(raw)) if !raw.is_empty() => raw,
            Ok(_) => return None,
            Err(source) => {
                let e = StoreError::Load {
                    key: key.to_string(),
                    source,
                };
                error!(storage_key = key, error = %e, "failed to load persisted state");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(state) => Some(state),
            Err(source) => {
                let e = StoreError::Decode {
                    key: key.to_string(),
                    source,
                };
                error!(storage_key = key, error = %e, "ignoring unreadable persisted state");
                None
            }
        }
    }

    async fn save(&self, state: &StoredState<V>) -> Result<(), StoreError> {
        let key = self.storage_key();

        let result = match serde_json::to_string(state) {
            Ok(encoded) => self
                .storage
                .set_item(key, &encoded)
                .await
                .map_err(|source| StoreError::Save {
                    key: key.to_string(),
                    source,
                }),
            Err(source) => Err(StoreError::Encode {
                key: key.to_string(),
                source,
            }),
        };

        if let Err(e) = &result {
            error!(storage_key = key, error = %e, "failed to persist state");
        }
        result
    }

    fn lock(&self) -> MutexGuard<'_, Shared<V>> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<V> fmt::Debug for StateManager<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "StateManager {{ storage_key: {}, namespace: {} }}",
            self.lease.key(),
            self.lease.namespace()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;
    use crate::storage::MemoryStorage;
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    fn state(pairs: &[(&str, Value)]) -> StoredState {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect()
    }

    /// Memory storage whose reads and writes can be switched to fail
    struct FlakyStorage {
        inner: MemoryStorage,
        fail_reads: AtomicBool,
        fail_writes: AtomicBool,
        stall_reads: AtomicBool,
        yield_reads: AtomicBool,
    }

    impl FlakyStorage {
        fn new() -> Self {
            Self {
                inner: MemoryStorage::new(),
                fail_reads: AtomicBool::new(false),
                fail_writes: AtomicBool::new(false),
                stall_reads: AtomicBool::new(false),
                yield_reads: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl StorageAdapter for FlakyStorage {
        async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
            if self.stall_reads.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            if self.yield_reads.load(Ordering::SeqCst) {
                tokio::task::yield_now().await;
            }
            if self.fail_reads.load(Ordering::SeqCst) {
                return Err(StorageError::Backend("read refused".to_string()));
            }
            self.inner.get_item(key).await
        }

        async fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(StorageError::Backend("write refused".to_string()));
            }
            self.inner.set_item(key, value).await
        }

        fn namespace(&self) -> &str {
            self.inner.namespace()
        }
    }

    #[tokio::test]
    async fn loaded_keys_win_over_defaults() {
        let storage = Arc::new(MemoryStorage::with_items([(
            "prefs",
            r#"{"theme":"dark","lang":"en"}"#,
        )]));
        let manager: StateManager = StateManager::new("prefs", storage.clone()).unwrap();

        let outcome = manager
            .initialize(state(&[("theme", json!("light")), ("size", json!(12))]))
            .await;

        assert!(outcome.is_persisted());
        assert_eq!(
            manager.get_state(),
            state(&[
                ("theme", json!("dark")),
                ("lang", json!("en")),
                ("size", json!(12)),
            ])
        );
        assert_eq!(storage.write_count("prefs"), 1);
    }

    #[tokio::test]
    async fn second_initialize_is_ignored() {
        let storage = Arc::new(MemoryStorage::new());
        let manager: StateManager = StateManager::new("prefs", storage.clone()).unwrap();

        let _ = manager.initialize(state(&[("a", json!(1))])).await;
        let outcome = manager.initialize(state(&[("a", json!(2))])).await;

        assert!(matches!(outcome, WriteOutcome::Ignored));
        assert_eq!(manager.get("a"), Some(json!(1)));
        assert_eq!(storage.write_count("prefs"), 1);
    }

    #[tokio::test]
    async fn uninitialized_access_is_benign() {
        let storage = Arc::new(MemoryStorage::new());
        let manager: StateManager = StateManager::new("prefs", storage.clone()).unwrap();

        assert!(!manager.is_initialized());
        assert_eq!(manager.get("a"), None);
        assert!(manager.get_state().is_empty());

        let outcome = manager.set_state(state(&[("a", json!(1))])).await;
        assert!(!outcome.is_applied());
        assert_eq!(storage.item("prefs"), None);
        assert_eq!(storage.write_count("prefs"), 0);
    }

    #[tokio::test]
    async fn set_state_merges_and_persists() {
        let storage = Arc::new(MemoryStorage::new());
        let manager: StateManager = StateManager::new("prefs", storage.clone()).unwrap();
        let _ = manager
            .initialize(state(&[("a", json!(1)), ("b", json!(2))]))
            .await;

        let outcome = manager
            .set_state(state(&[("b", json!(3)), ("c", json!(4))]))
            .await;

        assert!(outcome.is_persisted());
        let expected = state(&[("a", json!(1)), ("b", json!(3)), ("c", json!(4))]);
        assert_eq!(manager.get_state(), expected);

        let persisted: StoredState = serde_json::from_str(&storage.item("prefs").unwrap()).unwrap();
        assert_eq!(persisted, expected);
    }

    #[tokio::test]
    async fn read_failure_falls_back_to_defaults() {
        let storage = Arc::new(FlakyStorage::new());
        storage.inner.set_item("prefs", r#"{"a":9}"#).await.unwrap();
        storage.fail_reads.store(true, Ordering::SeqCst);
        let manager: StateManager = StateManager::new("prefs", storage.clone()).unwrap();

        let outcome = manager.initialize(state(&[("a", json!(1))])).await;

        assert!(outcome.is_persisted());
        assert_eq!(manager.get("a"), Some(json!(1)));
    }

    #[tokio::test]
    async fn unparsable_record_falls_back_to_defaults() {
        let storage = Arc::new(MemoryStorage::with_items([("prefs", "{not json")]));
        let manager: StateManager = StateManager::new("prefs", storage.clone()).unwrap();

        let _ = manager.initialize(state(&[("a", json!(1))])).await;

        assert_eq!(manager.get_state(), state(&[("a", json!(1))]));
        assert_eq!(storage.item("prefs").as_deref(), Some(r#"{"a":1}"#));
    }

    #[tokio::test]
    async fn non_object_record_falls_back_to_defaults() {
        let storage = Arc::new(MemoryStorage::with_items([("prefs", "[1,2,3]")]));
        let manager: StateManager = StateManager::new("prefs", storage).unwrap();

        let _ = manager.initialize(state(&[("a", json!(1))])).await;

        assert_eq!(manager.get_state(), state(&[("a", json!(1))]));
    }

    #[tokio::test]
    async fn whitespace_and_empty_records_fall_back_to_defaults() {
        for raw in ["", "   \n"] {
            let storage = Arc::new(MemoryStorage::with_items([("prefs", raw)]));
            let manager: StateManager = StateManager::new("prefs", storage.clone()).unwrap();

            let _ = manager.initialize(state(&[("a", json!(1))])).await;

            assert_eq!(manager.get_state(), state(&[("a", json!(1))]));
            assert_eq!(storage.item("prefs").as_deref(), Some(r#"{"a":1}"#));
        }
    }

    #[tokio::test]
    async fn cancelled_initialize_can_be_retried() {
        let storage = Arc::new(FlakyStorage::new());
        storage.inner.set_item("prefs", r#"{"a":9}"#).await.unwrap();
        storage.stall_reads.store(true, Ordering::SeqCst);
        let manager: StateManager = StateManager::new("prefs", storage.clone()).unwrap();

        let attempt = tokio::time::timeout(
            Duration::from_millis(10),
            manager.initialize(state(&[("a", json!(1))])),
        )
        .await;
        assert!(attempt.is_err());
        assert!(!manager.is_initialized());

        storage.stall_reads.store(false, Ordering::SeqCst);
        let outcome = manager.initialize(state(&[("a", json!(1))])).await;

        assert!(outcome.is_persisted());
        assert!(manager.is_initialized());
        assert_eq!(manager.get("a"), Some(json!(9)));
    }

    #[tokio::test]
    async fn initialize_while_in_flight_is_ignored() {
        let storage = Arc::new(FlakyStorage::new());
        storage.yield_reads.store(true, Ordering::SeqCst);
        let manager: StateManager = StateManager::new("prefs", storage.clone()).unwrap();

        let (first, second) = tokio::join!(
            manager.initialize(state(&[("a", json!(1))])),
            manager.initialize(state(&[("a", json!(2))])),
        );

        assert!(first.is_persisted());
        assert!(matches!(second, WriteOutcome::Ignored));
        assert_eq!(manager.get_state(), state(&[("a", json!(1))]));
        assert_eq!(storage.inner.write_count("prefs"), 1);
    }

    #[tokio::test]
    async fn listener_count_tracks_subscriptions() {
        let manager: StateManager =
            StateManager::new("prefs", Arc::new(MemoryStorage::new())).unwrap();

        let first = manager.subscribe(|_| {});
        let _second = manager.subscribe(|_| {});
        assert_eq!(manager.listener_count(), 2);

        first.unsubscribe();
        assert_eq!(manager.listener_count(), 1);
    }

    #[tokio::test]
    async fn write_failure_keeps_memory_and_reports_divergence() {
        let storage = Arc::new(FlakyStorage::new());
        let manager: StateManager = StateManager::new("prefs", storage.clone()).unwrap();
        let _ = manager.initialize(state(&[("a", json!(1))])).await;

        let notified = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&notified);
        let _unsubscribe = manager.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        storage.fail_writes.store(true, Ordering::SeqCst);
        let outcome = manager.set_state(state(&[("a", json!(2))])).await;

        assert!(outcome.is_applied());
        assert!(!outcome.is_persisted());
        assert!(matches!(
            outcome,
            WriteOutcome::Unpersisted(ref e) if matches!(**e, StoreError::Save { .. })
        ));
        assert_eq!(manager.get("a"), Some(json!(2)));
        assert_eq!(storage.inner.item("prefs").as_deref(), Some(r#"{"a":1}"#));
        assert_eq!(notified.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn initialize_notifies_existing_listeners() {
        let storage = Arc::new(MemoryStorage::new());
        let manager: StateManager = StateManager::new("prefs", storage).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _unsubscribe = manager.subscribe(move |state: &StoredState| {
            sink.lock().unwrap().push(state.clone());
        });

        let _ = manager.initialize(state(&[("a", json!(1))])).await;

        assert_eq!(*seen.lock().unwrap(), vec![state(&[("a", json!(1))])]);
    }

    #[tokio::test]
    async fn unsubscribed_listener_is_not_called() {
        let storage = Arc::new(MemoryStorage::new());
        let manager: StateManager = StateManager::new("prefs", storage).unwrap();
        let _ = manager.initialize(StoredState::new()).await;

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let unsubscribe = manager.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let _ = manager.set("count", json!(1)).await;
        unsubscribe.unsubscribe();
        unsubscribe.unsubscribe();
        let _ = manager.set("count", json!(2)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn listener_may_read_back_from_the_manager() {
        let storage = Arc::new(MemoryStorage::new());
        let manager: Arc<StateManager> =
            Arc::new(StateManager::new("prefs", storage).unwrap());
        let _ = manager.initialize(StoredState::new()).await;

        let observed = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&observed);
        let weak = Arc::downgrade(&manager);
        let _unsubscribe = manager.subscribe(move |_| {
            if let Some(manager) = weak.upgrade() {
                *sink.lock().unwrap() = manager.get("count");
            }
        });

        let _ = manager.set("count", json!(5)).await;

        assert_eq!(*observed.lock().unwrap(), Some(json!(5)));
    }

    #[tokio::test]
    async fn typed_values_round_trip() {
        let storage = Arc::new(MemoryStorage::new());
        let first: StateManager<u32> = StateManager::new("counters", storage.clone()).unwrap();
        let _ = first.initialize(StoredState::from([("hits".to_string(), 0)])).await;
        let _ = first.set("hits", 7).await;
        drop(first);

        let second: StateManager<u32> = StateManager::new("counters", storage).unwrap();
        let _ = second
            .initialize(StoredState::from([("hits".to_string(), 0), ("misses".to_string(), 0)]))
            .await;

        assert_eq!(second.get("hits"), Some(7));
        assert_eq!(second.get("misses"), Some(0));
    }

    #[test]
    fn duplicate_key_is_rejected_until_released() {
        let storage: Arc<dyn StorageAdapter> = Arc::new(MemoryStorage::new());
        let first: StateManager = StateManager::new("prefs", storage.clone()).unwrap();

        let duplicate = StateManager::<Value>::new("prefs", storage.clone());
        assert!(matches!(duplicate, Err(StoreError::KeyInUse { .. })));

        drop(first);
        assert!(StateManager::<Value>::new("prefs", storage).is_ok());
    }
}
