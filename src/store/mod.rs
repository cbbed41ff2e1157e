//! Durable key-value storage
//!
//! The repository and the sync coordinator share a single key-value store.
//! Values are JSON documents; every write replaces the whole value, so the
//! last writer wins. `update` is the only read-modify-write primitive and is
//! atomic with respect to other callers of the same store instance.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Key holding the full restaurants snapshot
pub const RESTAURANTS_KEY: &str = "restaurantsData";

/// Key holding the full reviews snapshot
pub const REVIEWS_KEY: &str = "reviewsData";

/// Key holding the pending review outbox
pub const OUTBOX_KEY: &str = "reviewsReadyForSync";

/// Errors that can occur when reading or writing the store
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying file access failed
    #[error("Storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// A stored value could not be (de)serialized
    #[error("Stored value has an unexpected shape: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A blocking storage task panicked or was cancelled
    #[error("Storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// The key cannot be used as a storage location
    #[error("Invalid storage key: '{0}'")]
    InvalidKey(String),
}

/// Read-modify-write function passed to [`KeyValueStore::update`].
///
/// Receives the current value (if any) and returns the replacement.
/// Returning `Ok(None)` deletes the key.
pub type Updater =
    Box<dyn FnOnce(Option<Value>) -> Result<Option<Value>, StoreError> + Send>;

/// Asynchronous get/set/delete storage with an atomic update
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Returns the value stored under `key`, or `None` if absent
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    /// Replaces the value stored under `key`
    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;

    /// Removes `key`. Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Atomically applies `updater` to the value under `key` and returns the
    /// value that was written (`None` when the key ended up deleted).
    async fn update(&self, key: &str, updater: Updater) -> Result<Option<Value>, StoreError>;
}

/// Reads and deserializes the value stored under `key`
pub async fn get_typed<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<T>, StoreError> {
    match store.get(key).await? {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

/// Serializes `value` and stores it under `key`
pub async fn set_typed<T: Serialize + ?Sized>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<(), StoreError> {
    store.set(key, serde_json::to_value(value)?).await
}

/// Typed wrapper around [`KeyValueStore::update`]
pub async fn update_typed<T, F>(
    store: &dyn KeyValueStore,
    key: &str,
    f: F,
) -> Result<Option<T>, StoreError>
where
    T: Serialize + DeserializeOwned + Send + 'static,
    F: FnOnce(Option<T>) -> Option<T> + Send + 'static,
{
    let written = store
        .update(
            key,
            Box::new(move |current: Option<Value>| -> Result<Option<Value>, StoreError> {
                let current = current.map(serde_json::from_value::<T>).transpose()?;
                Ok(f(current).map(serde_json::to_value).transpose()?)
            }),
        )
        .await?;

    Ok(written.map(serde_json::from_value).transpose()?)
}

/// Keys become file names, so only a conservative character set is allowed
pub(crate) fn validate_key(key: &str) -> Result<(), StoreError> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
        && !key.starts_with('.');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidKey(key.to_string()))
    }
}
