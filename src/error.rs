//! Error types for stores and storage adapters

use thiserror::Error;

/// Failure reported by a [`StorageAdapter`](crate::StorageAdapter)
#[derive(Debug, Error)]
pub enum StorageError {
    /// The key cannot name a record in this adapter
    #[error("invalid storage key `{0}`")]
    InvalidKey(String),

    #[error("storage I/O failed for `{key}`: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    /// Adapter-specific failure that has no better representation
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Failure surfaced by a [`StateManager`](crate::StateManager)
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage key `{key}` is already in use in namespace `{namespace}`")]
    KeyInUse { namespace: String, key: String },

    #[error("failed to load state for `{key}`: {source}")]
    Load {
        key: String,
        #[source]
        source: StorageError,
    },

    #[error("failed to save state for `{key}`: {source}")]
    Save {
        key: String,
        #[source]
        source: StorageError,
    },

    #[error("failed to encode state for `{key}`: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to decode state for `{key}`: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}
