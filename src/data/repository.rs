//! Read-through access to restaurants and reviews
//!
//! The local store answers reads whenever it holds a snapshot; the API is
//! consulted only on a miss, and its answer is written back. Writes follow
//! two patterns: favorite toggles update the local snapshot first and then
//! the API, and reviews go into the durable outbox for the sync coordinator.

use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::{
    outbox, sort_reviews_for_display, unique_cuisines, unique_neighborhoods, ApiError, NewReview,
    PendingReview, Restaurant, RestaurantApi, RestaurantFilter, Review, ReviewError,
};
use crate::store::{self, KeyValueStore, StoreError, RESTAURANTS_KEY, REVIEWS_KEY};
use crate::sync::{SyncRegistrar, REVIEWS_SYNC_TAG};

/// Errors returned by the repository
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// No restaurant with this id exists in the snapshot
    #[error("Restaurant {0} does not exist")]
    RestaurantNotFound(u32),

    /// Neither the local store nor the API could provide the data
    #[error("Data is not available offline: {0}")]
    Unavailable(#[source] ApiError),

    /// The review was rejected before queuing
    #[error("Invalid review: {0}")]
    InvalidReview(#[from] ReviewError),

    /// The local store failed where it could not be bypassed
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

/// Result of a favorite toggle
#[derive(Debug, Clone, PartialEq)]
pub struct FavoriteUpdate {
    /// The restaurant with its flag updated
    pub restaurant: Restaurant,
    /// Whether the API acknowledged the change
    pub confirmed: bool,
}

/// Data access for restaurants and reviews
#[derive(Clone)]
pub struct ReviewRepository {
    store: Arc<dyn KeyValueStore>,
    api: Arc<dyn RestaurantApi>,
    sync: SyncRegistrar,
}

impl ReviewRepository {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        api: Arc<dyn RestaurantApi>,
        sync: SyncRegistrar,
    ) -> Self {
        Self { store, api, sync }
    }

    /// Reads a snapshot, treating storage failures as a miss
    async fn read_snapshot<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        match store::get_typed(self.store.as_ref(), key).await {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "Local snapshot unreadable, falling back to network");
                None
            }
        }
    }

    /// Writes a snapshot; failures are logged since the data is still usable
    async fn write_snapshot<T: serde::Serialize + Sync + ?Sized>(&self, key: &str, value: &T) {
        if let Err(e) = store::set_typed(self.store.as_ref(), key, value).await {
            warn!(key, error = %e, "Failed to save local snapshot");
        }
    }

    /// All restaurants, from the local snapshot when present
    pub async fn fetch_restaurants(&self) -> Result<Vec<Restaurant>, RepositoryError> {
        if let Some(restaurants) = self.read_snapshot(RESTAURANTS_KEY).await {
            debug!("Restaurants served from local snapshot");
            return Ok(restaurants);
        }
        self.refresh_restaurants().await
    }

    /// Fetches restaurants from the API and overwrites the local snapshot
    pub async fn refresh_restaurants(&self) -> Result<Vec<Restaurant>, RepositoryError> {
        let restaurants = self
            .api
            .fetch_restaurants()
            .await
            .map_err(RepositoryError::Unavailable)?;
        self.write_snapshot(RESTAURANTS_KEY, &restaurants).await;
        info!(count = restaurants.len(), "Restaurants fetched from API");
        Ok(restaurants)
    }

    pub async fn fetch_restaurant_by_id(&self, id: u32) -> Result<Restaurant, RepositoryError> {
        self.fetch_restaurants()
            .await?
            .into_iter()
            .find(|r| r.id == id)
            .ok_or(RepositoryError::RestaurantNotFound(id))
    }

    pub async fn fetch_restaurants_by_cuisine_and_neighborhood(
        &self,
        filter: &RestaurantFilter,
    ) -> Result<Vec<Restaurant>, RepositoryError> {
        let restaurants = self.fetch_restaurants().await?;
        Ok(restaurants.into_iter().filter(|r| filter.matches(r)).collect())
    }

    pub async fn fetch_neighborhoods(&self) -> Result<Vec<String>, RepositoryError> {
        Ok(unique_neighborhoods(&self.fetch_restaurants().await?))
    }

    pub async fn fetch_cuisines(&self) -> Result<Vec<String>, RepositoryError> {
        Ok(unique_cuisines(&self.fetch_restaurants().await?))
    }

    /// All reviews, from the local snapshot when present
    async fn fetch_all_reviews(&self) -> Result<Vec<Review>, RepositoryError> {
        if let Some(reviews) = self.read_snapshot(REVIEWS_KEY).await {
            return Ok(reviews);
        }
        self.refresh_reviews().await
    }

    /// Fetches every review from the API and overwrites the local snapshot
    pub async fn refresh_reviews(&self) -> Result<Vec<Review>, RepositoryError> {
        let reviews = self
            .api
            .fetch_reviews()
            .await
            .map_err(RepositoryError::Unavailable)?;
        self.write_snapshot(REVIEWS_KEY, &reviews).await;
        info!(count = reviews.len(), "Reviews fetched from API");
        Ok(reviews)
    }

    /// Reviews of one restaurant, including reviews still waiting for sync,
    /// newest first
    pub async fn fetch_reviews_by_id(&self, restaurant_id: u32) -> Result<Vec<Review>, RepositoryError> {
        let mut reviews: Vec<Review> = self
            .fetch_all_reviews()
            .await?
            .into_iter()
            .filter(|r| r.restaurant_id == restaurant_id)
            .collect();

        let pending = match self.pending_reviews_for(restaurant_id).await {
            Ok(pending) => pending,
            Err(e) => {
                warn!(restaurant_id, error = %e, "Outbox unreadable, showing server reviews only");
                Vec::new()
            }
        };
        reviews.extend(pending.into_iter().map(|p| p.review));
        sort_reviews_for_display(&mut reviews);
        Ok(reviews)
    }

    /// Everything in the outbox, oldest first
    pub async fn pending_reviews(&self) -> Result<Vec<PendingReview>, RepositoryError> {
        Ok(outbox::load(self.store.as_ref()).await?)
    }

    pub async fn pending_reviews_for(
        &self,
        restaurant_id: u32,
    ) -> Result<Vec<PendingReview>, RepositoryError> {
        Ok(self
            .pending_reviews()
            .await?
            .into_iter()
            .filter(|p| p.review.restaurant_id == restaurant_id)
            .collect())
    }

    /// Sets the favorite flag locally, then tells the API
    ///
    /// The local change is kept even when the API call fails; the result
    /// reports whether the server confirmed it.
    pub async fn mark_favorite(&self, id: u32, value: bool) -> Result<FavoriteUpdate, RepositoryError> {
        let mut restaurants = self.fetch_restaurants().await?;
        let restaurant = restaurants
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(RepositoryError::RestaurantNotFound(id))?;
        restaurant.is_favorite = value;
        let restaurant = restaurant.clone();

        self.write_snapshot(RESTAURANTS_KEY, &restaurants).await;

        let confirmed = match self.api.set_favorite(id, value).await {
            Ok(()) => true,
            Err(e) => {
                warn!(restaurant_id = id, is_favorite = value, error = %e, "Favorite update not confirmed by API");
                false
            }
        };

        Ok(FavoriteUpdate {
            restaurant,
            confirmed,
        })
    }

    pub async fn unmark_favorite(&self, id: u32) -> Result<FavoriteUpdate, RepositoryError> {
        self.mark_favorite(id, false).await
    }

    /// Appends a review to the outbox and asks for a background sync
    ///
    /// Never touches the network. The returned entry carries the placeholder
    /// id so callers can show the review immediately.
    pub async fn queue_review_for_sync(&self, review: NewReview) -> Result<PendingReview, RepositoryError> {
        let entry = PendingReview::new(review.validate()?);

        let queued = entry.clone();
        outbox::modify(self.store.as_ref(), move |entries| entries.push(queued)).await?;

        info!(
            token = %entry.token,
            restaurant_id = entry.review.restaurant_id,
            "Review queued for sync"
        );
        self.sync.register(REVIEWS_SYNC_TAG);
        Ok(entry)
    }
}
