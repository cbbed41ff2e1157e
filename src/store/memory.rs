//! In-memory key-value store for ephemeral sessions and tests

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::Mutex;

use super::{KeyValueStore, StoreError, Updater};

/// Non-durable store backed by a `HashMap`
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.values.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.values.lock().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.values.lock().await.remove(key);
        Ok(())
    }

    async fn update(&self, key: &str, updater: Updater) -> Result<Option<Value>, StoreError> {
        let mut values = self.values.lock().await;
        match updater(values.get(key).cloned())? {
            Some(value) => {
                values.insert(key.to_string(), value.clone());
                Ok(Some(value))
            }
            None => {
                values.remove(key);
                Ok(None)
            }
        }
    }
}
