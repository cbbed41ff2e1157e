//! On-disk storage for cached responses
//!
//! Each bucket is a directory under the cache root (`~/.cache/tablesync/` on
//! Linux). A cached response is two files named after the request
//! fingerprint: `<fingerprint>.json` with the metadata and `<fingerprint>.body`
//! with the raw body. The metadata file is written last, so an entry only
//! becomes visible once its body is complete.

use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::{Resource, ResourceRequest};

/// Errors that can occur when reading or writing cached responses
#[derive(Debug, Error)]
pub enum CacheError {
    /// Underlying file access failed
    #[error("Cache I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Entry metadata could not be (de)serialized
    #[error("Cache entry metadata is invalid: {0}")]
    Metadata(#[from] serde_json::Error),

    /// The bucket name cannot be used as a directory name
    #[error("Invalid cache bucket name: '{0}'")]
    InvalidBucketName(String),
}

/// Metadata stored alongside a cached body
#[derive(Debug, Serialize, Deserialize)]
struct EntryMeta {
    method: String,
    url: String,
    status: u16,
    headers: Vec<(String, String)>,
    cached_at: DateTime<Utc>,
}

/// Root of all cache buckets
#[derive(Debug, Clone)]
pub struct CacheStorage {
    /// Directory containing one subdirectory per bucket
    root: PathBuf,
}

impl CacheStorage {
    /// Creates a CacheStorage using the XDG-compliant cache directory
    ///
    /// Returns `None` if the cache directory cannot be determined (e.g., no home directory).
    pub fn new() -> Option<Self> {
        let project_dirs = ProjectDirs::from("", "", "tablesync")?;
        Some(Self::with_dir(project_dirs.cache_dir().to_path_buf()))
    }

    /// Creates a CacheStorage rooted at a custom directory
    pub fn with_dir(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Opens the named bucket. The directory is created on first write.
    pub fn open(&self, name: &str) -> Result<CacheBucket, CacheError> {
        let valid = !name.is_empty()
            && !name.starts_with('.')
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.');
        if !valid {
            return Err(CacheError::InvalidBucketName(name.to_string()));
        }
        Ok(CacheBucket {
            name: name.to_string(),
            dir: self.root.join(name),
        })
    }

    /// Looks `request` up in each of the named buckets, in order
    pub fn match_any(
        &self,
        buckets: &[&str],
        request: &ResourceRequest,
    ) -> Result<Option<Resource>, CacheError> {
        for name in buckets {
            if let Some(resource) = self.open(name)?.match_request(request)? {
                return Ok(Some(resource));
            }
        }
        Ok(None)
    }

    /// Names of all existing buckets, sorted
    pub fn bucket_names(&self) -> Result<Vec<String>, CacheError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Deletes a bucket and everything in it. Returns whether it existed.
    pub fn delete_bucket(&self, name: &str) -> Result<bool, CacheError> {
        let bucket = self.open(name)?;
        match fs::remove_dir_all(&bucket.dir) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// A named set of cached responses
#[derive(Debug, Clone)]
pub struct CacheBucket {
    name: String,
    dir: PathBuf,
}

impl CacheBucket {
    pub fn name(&self) -> &str {
        &self.name
    }

    fn meta_path(&self, fingerprint: &str) -> PathBuf {
        self.dir.join(format!("{}.json", fingerprint))
    }

    fn body_path(&self, fingerprint: &str) -> PathBuf {
        self.dir.join(format!("{}.body", fingerprint))
    }

    /// Returns the stored response for `request`, if any
    ///
    /// An entry whose body file has gone missing is treated as absent.
    pub fn match_request(&self, request: &ResourceRequest) -> Result<Option<Resource>, CacheError> {
        let fingerprint = request.fingerprint();

        let meta_json = match fs::read_to_string(self.meta_path(&fingerprint)) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let meta: EntryMeta = serde_json::from_str(&meta_json)?;

        let body = match fs::read(self.body_path(&fingerprint)) {
            Ok(body) => body,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        Ok(Some(Resource {
            status: meta.status,
            headers: meta.headers,
            body,
        }))
    }

    /// Stores `resource` as the response for `request`, replacing any
    /// previous entry for the same fingerprint
    pub fn put(&self, request: &ResourceRequest, resource: &Resource) -> Result<(), CacheError> {
        fs::create_dir_all(&self.dir)?;
        let fingerprint = request.fingerprint();

        let meta = EntryMeta {
            method: request.method.clone(),
            url: request.url.clone(),
            status: resource.status,
            headers: resource.headers.clone(),
            cached_at: Utc::now(),
        };
        let meta_json = serde_json::to_string_pretty(&meta)?;

        fs::write(self.body_path(&fingerprint), &resource.body)?;
        fs::write(self.meta_path(&fingerprint), meta_json)?;
        Ok(())
    }

    /// URLs of every cached entry, sorted
    pub fn urls(&self) -> Result<Vec<String>, CacheError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut urls = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().map_or(false, |ext| ext == "json") {
                let meta: EntryMeta = serde_json::from_str(&fs::read_to_string(&path)?)?;
                urls.push(meta.url);
            }
        }
        urls.sort();
        Ok(urls)
    }

    /// Number of cached entries
    pub fn len(&self) -> Result<usize, CacheError> {
        Ok(self.urls()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, CacheError> {
        Ok(self.len()? == 0)
    }
}
