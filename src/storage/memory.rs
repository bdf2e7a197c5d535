use super::StorageAdapter;
use crate::error::StorageError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

static NEXT_NAMESPACE: AtomicUsize = AtomicUsize::new(0);

/// In-process storage adapter
///
/// Every instance gets its own namespace, so stores backed by different
/// `MemoryStorage` values never collide in the key registry.
#[derive(Debug)]
pub struct MemoryStorage {
    namespace: String,
    items: Mutex<HashMap<String, String>>,
    writes: Mutex<HashMap<String, usize>>,
}

impl MemoryStorage {
    /// Create an empty storage
    pub fn new() -> Self {
        Self::with_items(std::iter::empty::<(String, String)>())
    }

    /// Create a storage that already holds the given records
    ///
    /// # Example
    ///
    /// ```
    /// use iced_persist::MemoryStorage;
    ///
    /// let storage = MemoryStorage::with_items([("profile", r#"{"theme":"dark"}"#)]);
    /// assert!(storage.item("profile").is_some());
    /// ```
    pub fn with_items<K, V>(items: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let id = NEXT_NAMESPACE.fetch_add(1, Ordering::Relaxed);
        Self {
            namespace: format!("memory-{id}"),
            items: Mutex::new(
                items
                    .into_iter()
                    .map(|(key, value)| (key.into(), value.into()))
                    .collect(),
            ),
            writes: Mutex::new(HashMap::new()),
        }
    }

    /// Raw record currently stored under `key`
    pub fn item(&self, key: &str) -> Option<String> {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Number of successful `set_item` calls for `key`
    pub fn write_count(&self, key: &str) -> usize {
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .copied()
            .unwrap_or(0)
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageAdapter for MemoryStorage {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.item(key))
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        *self
            .writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key.to_string())
            .or_insert(0) += 1;
        Ok(())
    }

    fn namespace(&self) -> &str {
        &self.namespace
    }
}
