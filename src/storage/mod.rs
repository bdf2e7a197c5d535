//! Storage adapters that hold serialized store records
//!
//! A record is a single string stored under a single key. Adapters know
//! nothing about the shape of the state they hold.

mod file;
mod memory;

pub use file::FileStorage;
pub use memory::MemoryStorage;

use crate::error::StorageError;
use async_trait::async_trait;

/// Asynchronous get/set access to string records
///
/// Implementations need no cross-key transactions. A failure is reported as
/// an `Err` and is handled by the calling [`StateManager`](crate::StateManager).
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Read the record stored under `key`, `Ok(None)` if there is none
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Replace the record stored under `key`
    async fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Namespace shared by every adapter that can see the same records
    ///
    /// Two managers with the same key in the same namespace would alias one
    /// record, so the key registry refuses the second one. Adapters over
    /// unrelated backends must return distinct namespaces, or they will
    /// refuse each other's keys.
    fn namespace(&self) -> &str;
}
