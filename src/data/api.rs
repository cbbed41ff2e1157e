//! Restaurant reviews API client
//!
//! The API is an external JSON-over-HTTP service. [`RestaurantApi`] is the
//! seam the repository and the sync coordinator talk to; [`HttpRestaurantApi`]
//! is the `reqwest` implementation.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use super::{NewReview, Restaurant, Review};

/// Header carrying the client token of an uploaded review
pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

/// Errors that can occur when talking to the API
#[derive(Debug, Error)]
pub enum ApiError {
    /// HTTP request failed (no connectivity, DNS failure, timeout)
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// The server answered with a non-success status
    #[error("API returned {status} for {url}")]
    Status { status: StatusCode, url: String },

    /// Failed to parse JSON response
    #[error("Failed to parse JSON response: {0}")]
    ParseError(#[from] serde_json::Error),
}

/// Operations offered by the remote restaurant API
#[async_trait]
pub trait RestaurantApi: Send + Sync {
    /// `GET /restaurants`
    async fn fetch_restaurants(&self) -> Result<Vec<Restaurant>, ApiError>;

    /// `GET /reviews/`
    async fn fetch_reviews(&self) -> Result<Vec<Review>, ApiError>;

    /// `POST /restaurants/<id>/` with `{is_favorite}`
    async fn set_favorite(&self, restaurant_id: u32, is_favorite: bool) -> Result<(), ApiError>;

    /// `POST /reviews/` with `{restaurant_id, name, rating, comments}`
    ///
    /// Returns the stored review when the server echoes one back.
    async fn post_review(
        &self,
        review: &NewReview,
        idempotency_key: Uuid,
    ) -> Result<Option<Review>, ApiError>;
}

#[derive(Serialize)]
struct FavoriteBody {
    is_favorite: bool,
}

/// Client for the restaurant API over HTTP
#[derive(Debug, Clone)]
pub struct HttpRestaurantApi {
    client: Client,
    base_url: String,
}

impl HttpRestaurantApi {
    /// Create a new client for the API rooted at `base_url`
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    /// Create a new client with a custom HTTP client
    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Sends a request and returns the body text of a successful response
    async fn send(&self, request: reqwest::RequestBuilder, url: &str) -> Result<String, ApiError> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                status,
                url: url.to_string(),
            });
        }
        Ok(response.text().await?)
    }
}

#[async_trait]
impl RestaurantApi for HttpRestaurantApi {
    async fn fetch_restaurants(&self) -> Result<Vec<Restaurant>, ApiError> {
        let url = self.url("/restaurants");
        let text = self.send(self.client.get(&url), &url).await?;
        Ok(serde_json::from_str(&text)?)
    }

    async fn fetch_reviews(&self) -> Result<Vec<Review>, ApiError> {
        let url = self.url("/reviews/");
        let text = self.send(self.client.get(&url), &url).await?;
        Ok(serde_json::from_str(&text)?)
    }

    async fn set_favorite(&self, restaurant_id: u32, is_favorite: bool) -> Result<(), ApiError> {
        let url = self.url(&format!("/restaurants/{}/", restaurant_id));
        let request = self.client.post(&url).json(&FavoriteBody { is_favorite });
        self.send(request, &url).await?;
        Ok(())
    }

    async fn post_review(
        &self,
        review: &NewReview,
        idempotency_key: Uuid,
    ) -> Result<Option<Review>, ApiError> {
        let url = self.url("/reviews/");
        let request = self
            .client
            .post(&url)
            .header(IDEMPOTENCY_KEY_HEADER, idempotency_key.to_string())
            .json(review);
        let text = self.send(request, &url).await?;

        // The upload already succeeded at this point; an unexpected echo must
        // not put the review back in the outbox.
        match serde_json::from_str::<Review>(&text) {
            Ok(stored) => Ok(Some(stored)),
            Err(e) => {
                debug!(error = %e, "Review accepted but response body was not a review");
                Ok(None)
            }
        }
    }
}
