//! File-backed key-value store
//!
//! Each key is persisted as a JSON file in an XDG-compliant data directory
//! (`~/.local/share/tablesync/store/` on Linux). Writes go through a
//! temporary file and a rename so a crash never leaves a half-written value.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use super::{validate_key, KeyValueStore, StoreError, Updater};

/// Wrapper struct for values stored on disk
#[derive(Debug, Serialize, Deserialize)]
struct StoredValue {
    /// The stored document
    value: Value,
    /// When the value was last written
    stored_at: DateTime<Utc>,
}

/// Persists values as one JSON file per key
#[derive(Debug)]
pub struct FileStore {
    /// Directory where value files are stored
    dir: PathBuf,
    /// Serializes access so `update` is atomic within this process
    lock: Mutex<()>,
}

impl FileStore {
    /// Creates a new FileStore under the XDG data directory
    ///
    /// Returns `None` if the data directory cannot be determined (e.g., no home directory).
    pub fn new() -> Option<Self> {
        let project_dirs = ProjectDirs::from("", "", "tablesync")?;
        Some(Self::with_dir(project_dirs.data_dir().join("store")))
    }

    /// Creates a new FileStore with a custom directory
    pub fn with_dir(dir: PathBuf) -> Self {
        Self {
            dir,
            lock: Mutex::new(()),
        }
    }

    /// Directory holding the value files
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Runs a blocking file operation on the blocking thread pool
    async fn run_blocking<T, F>(&self, key: &str, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Path, &str) -> Result<T, StoreError> + Send + 'static,
    {
        validate_key(key)?;
        let dir = self.dir.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || op(&dir, &key)).await?
    }
}

/// Returns the path to the file for the given key
fn value_path(dir: &Path, key: &str) -> PathBuf {
    dir.join(format!("{}.json", key))
}

fn read_value(dir: &Path, key: &str) -> Result<Option<Value>, StoreError> {
    let content = match fs::read_to_string(value_path(dir, key)) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let stored: StoredValue = serde_json::from_str(&content)?;
    Ok(Some(stored.value))
}

fn write_value(dir: &Path, key: &str, value: Value) -> Result<(), StoreError> {
    fs::create_dir_all(dir)?;

    let stored = StoredValue {
        value,
        stored_at: Utc::now(),
    };
    let json = serde_json::to_string_pretty(&stored)?;

    let tmp_path = dir.join(format!(".{}.json.tmp", key));
    fs::write(&tmp_path, json)?;
    fs::rename(&tmp_path, value_path(dir, key))?;
    Ok(())
}

fn remove_value(dir: &Path, key: &str) -> Result<(), StoreError> {
    match fs::remove_file(value_path(dir, key)) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let _guard = self.lock.lock().await;
        self.run_blocking(key, read_value).await
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        self.run_blocking(key, move |dir, key| write_value(dir, key, value))
            .await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        self.run_blocking(key, remove_value).await
    }

    async fn update(&self, key: &str, updater: Updater) -> Result<Option<Value>, StoreError> {
        // The guard stays held until the blocking read-modify-write finishes
        let _guard = self.lock.lock().await;
        self.run_blocking(key, move |dir, key| {
            let current = read_value(dir, key)?;
            match updater(current)? {
                Some(value) => {
                    write_value(dir, key, value.clone())?;
                    Ok(Some(value))
                }
                None => {
                    remove_value(dir, key)?;
                    Ok(None)
                }
            }
        })
        .await
    }
}
