//! Cache-first request resolution
//!
//! [`CachingProxy::resolve`] answers from the cache whenever it can and only
//! then goes to the network. Successful network responses are copied into
//! the dynamic bucket in the background; 404s and network failures degrade
//! to the static `404.html` and `offline.html` pages.

use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info, warn};

use super::{resolve_url, CacheError, CacheStorage, FetchError, Fetcher, Resource, ResourceRequest};

/// Errors that can occur while resolving a request
#[derive(Debug, Error)]
pub enum ProxyError {
    /// A fallback page was needed but has not been cached
    #[error("Fallback page '{0}' is not in the static cache")]
    FallbackMissing(String),

    /// Reading the cache failed
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// A blocking cache task panicked or was cancelled
    #[error("Cache task failed: {0}")]
    Task(#[from] JoinError),

    /// A request outside the application origin failed
    #[error("Network error: {0}")]
    Network(#[from] FetchError),
}

/// Bucket names, origin and app shell manifest used by the proxy
#[derive(Debug, Clone)]
pub struct ProxySettings {
    /// Requests under this origin are resolved through the cache
    pub origin: String,
    /// Common prefix of every bucket this application owns
    pub cache_prefix: String,
    pub static_bucket: String,
    pub dynamic_bucket: String,
    /// App shell URLs cached at install, relative to the origin
    pub manifest: Vec<String>,
    pub not_found_page: String,
    pub offline_page: String,
}

/// Outcome of populating the static bucket
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallReport {
    /// URLs stored in the static bucket
    pub cached: Vec<String>,
    /// URLs that could not be cached, with the reason
    pub failed: Vec<(String, String)>,
}

/// Resolves application requests against the resource cache
pub struct CachingProxy {
    storage: Arc<CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
    settings: ProxySettings,
    pending_writes: Mutex<Vec<JoinHandle<()>>>,
}

impl CachingProxy {
    pub fn new(storage: CacheStorage, fetcher: Arc<dyn Fetcher>, settings: ProxySettings) -> Self {
        Self {
            storage: Arc::new(storage),
            fetcher,
            settings,
            pending_writes: Mutex::new(Vec::new()),
        }
    }

    pub fn settings(&self) -> &ProxySettings {
        &self.settings
    }

    pub fn storage(&self) -> &CacheStorage {
        &self.storage
    }

    /// Whether `request` targets the application origin
    ///
    /// The origin must end where the URL's authority ends, so
    /// `http://localhost:80001/` is not under `http://localhost:8000`.
    pub fn intercepts(&self, request: &ResourceRequest) -> bool {
        let origin = self.settings.origin.trim_end_matches('/');
        match request.url.strip_prefix(origin) {
            Some(rest) => rest.is_empty() || rest.starts_with(|c| matches!(c, '/' | '?' | '#')),
            None => false,
        }
    }

    /// Runs a cache operation on the blocking thread pool
    async fn with_storage<T, F>(&self, op: F) -> Result<T, ProxyError>
    where
        T: Send + 'static,
        F: FnOnce(&CacheStorage) -> Result<T, CacheError> + Send + 'static,
    {
        let storage = Arc::clone(&self.storage);
        Ok(tokio::task::spawn_blocking(move || op(&storage)).await??)
    }

    /// Resolves same-origin requests through the cache and sends every other
    /// request straight to the network
    pub async fn handle(&self, request: &ResourceRequest) -> Result<Resource, ProxyError> {
        if self.intercepts(request) {
            self.resolve(request).await
        } else {
            Ok(self.fetcher.fetch(request).await?)
        }
    }

    /// Cache first, then network, then fallback pages
    pub async fn resolve(&self, request: &ResourceRequest) -> Result<Resource, ProxyError> {
        if request.is_cacheable() {
            match self.cached(request).await {
                Ok(Some(resource)) => {
                    debug!(url = %request.url, "Serving from cache");
                    return Ok(resource);
                }
                Ok(None) => {}
                Err(e) => warn!(url = %request.url, error = %e, "Cache lookup failed"),
            }
        }

        match self.fetcher.fetch(request).await {
            Ok(response) if response.status == 404 => {
                debug!(url = %request.url, "Network answered 404, serving fallback");
                self.fallback(&self.settings.not_found_page).await
            }
            Ok(response) => {
                if request.is_cacheable() {
                    self.store_dynamic(request.clone(), response.clone());
                }
                Ok(response)
            }
            Err(e) => {
                warn!(url = %request.url, error = %e, "Network fetch failed, serving offline page");
                self.fallback(&self.settings.offline_page).await
            }
        }
    }

    async fn cached(&self, request: &ResourceRequest) -> Result<Option<Resource>, ProxyError> {
        let buckets = [
            self.settings.static_bucket.clone(),
            self.settings.dynamic_bucket.clone(),
        ];
        let request = request.clone();
        self.with_storage(move |storage| {
            storage.match_any(&[buckets[0].as_str(), buckets[1].as_str()], &request)
        })
        .await
    }

    async fn fallback(&self, page: &str) -> Result<Resource, ProxyError> {
        let request = ResourceRequest::get(resolve_url(&self.settings.origin, page));
        let bucket = self.settings.static_bucket.clone();
        self.with_storage(move |storage| storage.open(&bucket)?.match_request(&request))
            .await?
            .ok_or_else(|| ProxyError::FallbackMissing(page.to_string()))
    }

    /// Copies a response into the dynamic bucket without making the caller wait
    fn store_dynamic(&self, request: ResourceRequest, response: Resource) {
        let storage = Arc::clone(&self.storage);
        let bucket = self.settings.dynamic_bucket.clone();

        let handle = tokio::task::spawn_blocking(move || {
            let result = storage
                .open(&bucket)
                .and_then(|bucket| bucket.put(&request, &response));
            match result {
                Ok(()) => debug!(url = %request.url, "Stored response in dynamic cache"),
                Err(e) => warn!(url = %request.url, error = %e, "Failed to store response in dynamic cache"),
            }
        });

        if let Ok(mut pending) = self.pending_writes.lock() {
            pending.retain(|h| !h.is_finished());
            pending.push(handle);
        }
    }

    /// Waits for every background cache write started so far
    pub async fn flush(&self) {
        let handles = match self.pending_writes.lock() {
            Ok(mut pending) => std::mem::take(&mut *pending),
            Err(_) => return,
        };
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Background cache write did not complete");
            }
        }
    }

    /// Fetches every manifest URL into the static bucket
    ///
    /// Each URL is cached independently: a failure is logged and reported but
    /// does not stop the remaining URLs. Running install again overwrites the
    /// same entries.
    pub async fn install(&self) -> Result<InstallReport, ProxyError> {
        let bucket_name = self.settings.static_bucket.clone();
        let bucket = self.with_storage(move |storage| storage.open(&bucket_name)).await?;
        let mut report = InstallReport::default();

        for path in &self.settings.manifest {
            let url = resolve_url(&self.settings.origin, path);
            let request = ResourceRequest::get(url.clone());

            let outcome = match self.fetcher.fetch(&request).await {
                Ok(response) if response.is_success() => {
                    let bucket = bucket.clone();
                    let request = request.clone();
                    tokio::task::spawn_blocking(move || bucket.put(&request, &response))
                        .await
                        .map_err(|e| e.to_string())
                        .and_then(|put| put.map_err(|e| e.to_string()))
                }
                Ok(response) => Err(format!("server answered {}", response.status)),
                Err(e) => Err(e.to_string()),
            };

            match outcome {
                Ok(()) => report.cached.push(url),
                Err(reason) => {
                    warn!(url = %url, reason = %reason, "Failed to cache static asset");
                    report.failed.push((url, reason));
                }
            }
        }

        info!(
            bucket = %self.settings.static_bucket,
            cached = report.cached.len(),
            failed = report.failed.len(),
            "Static resources cached"
        );
        Ok(report)
    }

    /// Deletes buckets owned by this application whose version is not current
    ///
    /// Returns the names of the deleted buckets.
    pub async fn activate(&self) -> Result<Vec<String>, ProxyError> {
        let owned_prefix = format!("{}-", self.settings.cache_prefix);
        let keep = [
            self.settings.static_bucket.clone(),
            self.settings.dynamic_bucket.clone(),
        ];

        let removed = self
            .with_storage(move |storage| {
                let mut removed = Vec::new();
                for name in storage.bucket_names()? {
                    if name.starts_with(&owned_prefix) && !keep.contains(&name) {
                        storage.delete_bucket(&name)?;
                        removed.push(name);
                    }
                }
                Ok(removed)
            })
            .await?;

        for name in &removed {
            info!(bucket = %name, "Deleted stale cache bucket");
        }
        Ok(removed)
    }
}
