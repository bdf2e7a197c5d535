//! Process-wide registry of storage keys held by live state managers

use crate::error::StoreError;
use std::collections::HashSet;
use std::sync::{LazyLock, Mutex, PoisonError};

type KeySet = Mutex<HashSet<(String, String)>>;

static KEYS_IN_USE: LazyLock<KeySet> = LazyLock::new(|| Mutex::new(HashSet::new()));

/// Exclusive claim on a storage key within a namespace
///
/// Released when dropped.
#[derive(Debug)]
pub(crate) struct KeyLease {
    namespace: String,
    key: String,
}

impl KeyLease {
    pub(crate) fn acquire(namespace: &str, key: &str) -> Result<Self, StoreError> {
        let mut keys = KEYS_IN_USE.lock().unwrap_or_else(PoisonError::into_inner);

        if !keys.insert((namespace.to_string(), key.to_string())) {
            return Err(StoreError::KeyInUse {
                namespace: namespace.to_string(),
                key: key.to_string(),
            });
        }

        Ok(Self {
            namespace: namespace.to_string(),
            key: key.to_string(),
        })
    }

    pub(crate) fn key(&self) -> &str {
        &self.key
    }

    pub(crate) fn namespace(&self) -> &str {
        &self.namespace
    }
}

impl Drop for KeyLease {
    fn drop(&mut self) {
        KEYS_IN_USE
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&(std::mem::take(&mut self.namespace), std::mem::take(&mut self.key)));
    }
}
