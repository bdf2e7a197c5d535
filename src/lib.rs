//! Persisted state stores
//!
//! A store keeps a key-value state in memory, mirrors it to a storage record
//! as JSON and notifies subscribers after every change.
//!
//! # Features
//!
//! - Defaults merged under previously persisted state on startup
//! - Shallow-merge updates, persisted before listeners are notified
//! - Pluggable storage: in-memory or one JSON file per store
//! - Storage failures are logged and reported, never raised
//!
//! # Example
//!
//! ```ignore
//! use iced_persist::{AppName, FileStorage, StoredState, create_store};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let storage = Arc::new(FileStorage::new(&AppName::new("com", "example", "myapp")));
//! let store = create_store(
//!     "profile",
//!     StoredState::from([("theme".to_string(), json!("light"))]),
//!     storage,
//! )?;
//!
//! store.initialize_store().await;
//!
//! let unsubscribe = store.subscribe(|state| println!("profile changed: {:?}", state));
//! store.set("theme", json!("dark")).await;
//! unsubscribe.unsubscribe();
//! ```

mod app_name;
mod error;
mod listeners;
mod manager;
mod registry;
mod storage;
mod store;

pub use app_name::AppName;
pub use error::{StorageError, StoreError};
pub use listeners::Unsubscribe;
pub use manager::{StateManager, StateValue, StoredState, WriteOutcome};
pub use storage::{FileStorage, MemoryStorage, StorageAdapter};
pub use store::{Store, create_store};
