//! Test doubles for the network, API and storage seams

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

use crate::cache::{FetchError, Fetcher, Resource, ResourceRequest};
use crate::data::{ApiError, NewReview, Restaurant, RestaurantApi, Review};
use crate::store::{KeyValueStore, StoreError, Updater};

/// How a [`StubFetcher`] answers requests it has no canned response for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    /// Unknown URLs answer 404
    Online,
    /// Every fetch fails as if the connection were down
    Offline,
    /// Any fetch panics; used to prove the network was never consulted
    Forbidden,
}

/// Network stub serving canned responses by URL
pub struct StubFetcher {
    network: Network,
    responses: Mutex<HashMap<String, Resource>>,
    calls: AtomicUsize,
}

impl StubFetcher {
    pub fn new(network: Network) -> Self {
        Self {
            network,
            responses: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with(self, url: &str, resource: Resource) -> Self {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), resource);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for StubFetcher {
    async fn fetch(&self, request: &ResourceRequest) -> Result<Resource, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.network {
            Network::Forbidden => panic!("network must not be used for {}", request.url),
            Network::Offline => Err(FetchError::Unreachable(request.url.clone())),
            Network::Online => Ok(self
                .responses
                .lock()
                .unwrap()
                .get(&request.url)
                .cloned()
                .unwrap_or_else(|| Resource::new(404, b"missing".to_vec()))),
        }
    }
}

/// A call received by [`StubApi`]
#[derive(Debug, Clone, PartialEq)]
pub enum ApiCall {
    FetchRestaurants,
    FetchReviews,
    SetFavorite(u32, bool),
    PostReview(NewReview, Uuid),
}

/// In-memory API that records every call
pub struct StubApi {
    restaurants: Vec<Restaurant>,
    reviews: Vec<Review>,
    online: AtomicBool,
    rejected_reviewers: HashSet<String>,
    echo_reviews: bool,
    next_review_id: AtomicUsize,
    calls: Mutex<Vec<ApiCall>>,
}

impl StubApi {
    pub fn new(restaurants: Vec<Restaurant>, reviews: Vec<Review>) -> Self {
        Self {
            restaurants,
            reviews,
            online: AtomicBool::new(true),
            rejected_reviewers: HashSet::new(),
            echo_reviews: true,
            next_review_id: AtomicUsize::new(100),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Review uploads by this reviewer fail with a server error
    pub fn rejecting(mut self, reviewer: &str) -> Self {
        self.rejected_reviewers.insert(reviewer.to_string());
        self
    }

    /// Accepted uploads answer without a review body
    pub fn without_echo(mut self) -> Self {
        self.echo_reviews = false;
        self
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn posted_reviews(&self) -> Vec<NewReview> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ApiCall::PostReview(review, _) => Some(review),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: ApiCall) -> Result<(), ApiError> {
        self.calls.lock().unwrap().push(call);
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ApiError::Status {
                status: StatusCode::SERVICE_UNAVAILABLE,
                url: "stub".to_string(),
            })
        }
    }
}

#[async_trait]
impl RestaurantApi for StubApi {
    async fn fetch_restaurants(&self) -> Result<Vec<Restaurant>, ApiError> {
        self.record(ApiCall::FetchRestaurants)?;
        Ok(self.restaurants.clone())
    }

    async fn fetch_reviews(&self) -> Result<Vec<Review>, ApiError> {
        self.record(ApiCall::FetchReviews)?;
        Ok(self.reviews.clone())
    }

    async fn set_favorite(&self, restaurant_id: u32, is_favorite: bool) -> Result<(), ApiError> {
        self.record(ApiCall::SetFavorite(restaurant_id, is_favorite))
    }

    async fn post_review(
        &self,
        review: &NewReview,
        idempotency_key: Uuid,
    ) -> Result<Option<Review>, ApiError> {
        self.record(ApiCall::PostReview(review.clone(), idempotency_key))?;
        if self.rejected_reviewers.contains(&review.name) {
            return Err(ApiError::Status {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                url: "stub".to_string(),
            });
        }
        if !self.echo_reviews {
            return Ok(None);
        }
        let id = self.next_review_id.fetch_add(1, Ordering::SeqCst) as u64;
        Ok(Some(Review {
            id,
            restaurant_id: review.restaurant_id,
            name: review.name.clone(),
            rating: review.rating,
            comments: review.comments.clone(),
            created_at: Some(chrono::Utc::now()),
            updated_at: Some(chrono::Utc::now()),
        }))
    }
}

/// Store whose every operation fails
pub struct BrokenStore;

fn unavailable() -> StoreError {
    StoreError::Io(std::io::Error::new(
        std::io::ErrorKind::PermissionDenied,
        "storage unavailable",
    ))
}

#[async_trait]
impl KeyValueStore for BrokenStore {
    async fn get(&self, _key: &str) -> Result<Option<Value>, StoreError> {
        Err(unavailable())
    }

    async fn set(&self, _key: &str, _value: Value) -> Result<(), StoreError> {
        Err(unavailable())
    }

    async fn delete(&self, _key: &str) -> Result<(), StoreError> {
        Err(unavailable())
    }

    async fn update(&self, _key: &str, _updater: Updater) -> Result<Option<Value>, StoreError> {
        Err(unavailable())
    }
}

/// Minimal restaurant record for tests
pub fn restaurant(id: u32, cuisine: &str, neighborhood: &str) -> Restaurant {
    Restaurant {
        id,
        name: format!("Restaurant {}", id),
        address: String::new(),
        neighborhood: neighborhood.to_string(),
        cuisine_type: cuisine.to_string(),
        latlng: None,
        operating_hours: Default::default(),
        photograph: Some(format!("{}.jpg", id)),
        img_alt: None,
        is_favorite: false,
        created_at: None,
        updated_at: None,
        reviews: Vec::new(),
    }
}

/// Server-side review created `millis` after the epoch
pub fn review(id: u64, restaurant_id: u32, millis: i64) -> Review {
    use chrono::TimeZone;
    Review {
        id,
        restaurant_id,
        name: format!("Reviewer {}", id),
        rating: 4,
        comments: "Solid".to_string(),
        created_at: chrono::Utc.timestamp_millis_opt(millis).single(),
        updated_at: None,
    }
}
