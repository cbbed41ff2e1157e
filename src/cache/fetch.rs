//! Network access for the caching proxy

use async_trait::async_trait;
use reqwest::{Client, Method};
use thiserror::Error;

use super::{Resource, ResourceRequest};

/// Errors that can occur when fetching from the network
#[derive(Debug, Error)]
pub enum FetchError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// The host could not be reached or did not answer in time
    #[error("Network unreachable for {0}")]
    Unreachable(String),

    /// The request method is not a valid HTTP method
    #[error("Invalid HTTP method: '{0}'")]
    InvalidMethod(String),
}

/// Performs network requests on behalf of the proxy
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetches `request`. Any HTTP status is a successful fetch; only
    /// transport failures are errors.
    async fn fetch(&self, request: &ResourceRequest) -> Result<Resource, FetchError>;
}

/// Fetcher backed by `reqwest`
#[derive(Debug, Clone, Default)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

/// Separates "no route to the server" from other transport failures
fn classify(error: reqwest::Error, url: &str) -> FetchError {
    if error.is_connect() || error.is_timeout() {
        FetchError::Unreachable(url.to_string())
    } else {
        FetchError::RequestFailed(error)
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &ResourceRequest) -> Result<Resource, FetchError> {
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|_| FetchError::InvalidMethod(request.method.clone()))?;

        let response = self
            .client
            .request(method, &request.url)
            .send()
            .await
            .map_err(|e| classify(e, &request.url))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await?.to_vec();

        Ok(Resource {
            status,
            headers,
            body,
        })
    }
}
