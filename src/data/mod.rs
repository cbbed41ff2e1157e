//! Core data models for the restaurant directory
//!
//! This module contains the canonical restaurant and review records, the
//! pending outbox entry, and the directory queries (filters, unique
//! neighborhoods and cuisines, rating averages) shared by the repository and
//! the application state.

pub mod api;
mod normalize;
pub(crate) mod outbox;
pub mod repository;

pub use api::{ApiError, HttpRestaurantApi, RestaurantApi};
pub use repository::{FavoriteUpdate, RepositoryError, ReviewRepository};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use uuid::Uuid;

/// Review id used for reviews the server has not assigned an id to yet
pub const UNASSIGNED_REVIEW_ID: u64 = 0;

/// Filter value meaning "do not filter on this field"
pub const ALL: &str = "all";

/// Geographic coordinate pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

/// A restaurant as served by the API and cached in the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Restaurant {
    /// Unique identifier
    #[serde(deserialize_with = "normalize::restaurant_id")]
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub neighborhood: String,
    #[serde(default)]
    pub cuisine_type: String,
    #[serde(default)]
    pub latlng: Option<LatLng>,
    /// Opening hours keyed by day name
    #[serde(default)]
    pub operating_hours: BTreeMap<String, String>,
    /// Photograph file name, relative to the image directory
    #[serde(default, deserialize_with = "normalize::optional_text")]
    pub photograph: Option<String>,
    #[serde(default, alias = "imgAlt", deserialize_with = "normalize::optional_text")]
    pub img_alt: Option<String>,
    #[serde(default, deserialize_with = "normalize::flag")]
    pub is_favorite: bool,
    #[serde(default, alias = "createdAt", deserialize_with = "normalize::timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, alias = "updatedAt", deserialize_with = "normalize::timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
    /// Reviews attached after loading; empty in API listings
    #[serde(default)]
    pub reviews: Vec<Review>,
}

impl Restaurant {
    /// Relative page URL for this restaurant
    pub fn url(&self) -> String {
        format!("./restaurant.html?id={}", self.id)
    }

    /// Relative image URL, if the restaurant has a photograph
    pub fn image_url(&self) -> Option<String> {
        self.photograph
            .as_deref()
            .map(|photograph| format!("./img/{}", photograph))
    }

    /// Alternative text for the restaurant image
    pub fn image_alt(&self) -> String {
        self.img_alt
            .clone()
            .unwrap_or_else(|| format!("Photograph of {}", self.name))
    }
}

/// A review of a restaurant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    /// Server-assigned id, or [`UNASSIGNED_REVIEW_ID`] while queued locally
    #[serde(default, deserialize_with = "normalize::review_id")]
    pub id: u64,
    #[serde(deserialize_with = "normalize::restaurant_id")]
    pub restaurant_id: u32,
    pub name: String,
    /// Rating from 1 to 5
    #[serde(deserialize_with = "normalize::rating")]
    pub rating: u8,
    #[serde(default)]
    pub comments: String,
    #[serde(default, alias = "createdAt", deserialize_with = "normalize::timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, alias = "updatedAt", deserialize_with = "normalize::timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Review {
    /// Whether the server has not confirmed this review yet
    pub fn is_pending(&self) -> bool {
        self.id == UNASSIGNED_REVIEW_ID
    }
}

/// Validation failures for user-authored reviews
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReviewError {
    #[error("Reviewer name must not be empty")]
    EmptyName,

    #[error("Review comments must not be empty")]
    EmptyComments,

    #[error("Rating must be between 1 and 5, got {0}")]
    RatingOutOfRange(u8),
}

/// A review as authored by the user, and the body of `POST /reviews/`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewReview {
    pub restaurant_id: u32,
    pub name: String,
    pub rating: u8,
    pub comments: String,
}

impl NewReview {
    pub fn new(
        restaurant_id: u32,
        name: impl Into<String>,
        rating: u8,
        comments: impl Into<String>,
    ) -> Self {
        Self {
            restaurant_id,
            name: name.into(),
            rating,
            comments: comments.into(),
        }
    }

    /// Checks the review and returns it with surrounding whitespace trimmed
    pub fn validate(self) -> Result<Self, ReviewError> {
        let name = self.name.trim().to_string();
        let comments = self.comments.trim().to_string();

        if name.is_empty() {
            return Err(ReviewError::EmptyName);
        }
        if comments.is_empty() {
            return Err(ReviewError::EmptyComments);
        }
        if !(1..=5).contains(&self.rating) {
            return Err(ReviewError::RatingOutOfRange(self.rating));
        }

        Ok(Self {
            name,
            comments,
            ..self
        })
    }
}

/// An entry in the pending review outbox
///
/// The token is generated on the client and identifies the entry until the
/// server assigns a review id. It doubles as the idempotency key of the
/// upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingReview {
    pub token: Uuid,
    pub review: Review,
}

impl PendingReview {
    /// Wraps a validated review for queuing, stamped with the current time
    pub fn new(review: NewReview) -> Self {
        let now = Utc::now();
        Self {
            token: Uuid::new_v4(),
            review: Review {
                id: UNASSIGNED_REVIEW_ID,
                restaurant_id: review.restaurant_id,
                name: review.name,
                rating: review.rating,
                comments: review.comments,
                created_at: Some(now),
                updated_at: Some(now),
            },
        }
    }

    /// Wraps a review queued by an earlier client that stored no token
    pub fn from_review(review: Review) -> Self {
        Self {
            token: Uuid::new_v4(),
            review: Review {
                id: UNASSIGNED_REVIEW_ID,
                ..review
            },
        }
    }

    /// Request body used when uploading this entry
    pub fn to_new_review(&self) -> NewReview {
        NewReview {
            restaurant_id: self.review.restaurant_id,
            name: self.review.name.clone(),
            rating: self.review.rating,
            comments: self.review.comments.clone(),
        }
    }
}

/// Cuisine and neighborhood filter; `None` matches everything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestaurantFilter {
    pub cuisine: Option<String>,
    pub neighborhood: Option<String>,
}

impl RestaurantFilter {
    /// Builds a filter from selector values where `"all"` disables a field
    pub fn new(cuisine: Option<&str>, neighborhood: Option<&str>) -> Self {
        let selected = |value: Option<&str>| {
            value
                .filter(|v| !v.eq_ignore_ascii_case(ALL))
                .map(str::to_string)
        };
        Self {
            cuisine: selected(cuisine),
            neighborhood: selected(neighborhood),
        }
    }

    pub fn matches(&self, restaurant: &Restaurant) -> bool {
        self.cuisine
            .as_deref()
            .map_or(true, |c| restaurant.cuisine_type == c)
            && self
                .neighborhood
                .as_deref()
                .map_or(true, |n| restaurant.neighborhood == n)
    }

    pub fn apply<'a>(&self, restaurants: &'a [Restaurant]) -> Vec<&'a Restaurant> {
        restaurants.iter().filter(|r| self.matches(r)).collect()
    }
}

/// Unique values of a field, in first-seen order
fn unique_by<'a>(
    restaurants: &'a [Restaurant],
    field: impl Fn(&'a Restaurant) -> &'a str,
) -> Vec<String> {
    let mut seen = Vec::new();
    for restaurant in restaurants {
        let value = field(restaurant);
        if !seen.iter().any(|s: &String| s == value) {
            seen.push(value.to_string());
        }
    }
    seen
}

/// Distinct neighborhoods in first-seen order
pub fn unique_neighborhoods(restaurants: &[Restaurant]) -> Vec<String> {
    unique_by(restaurants, |r| r.neighborhood.as_str())
}

/// Distinct cuisines in first-seen order
pub fn unique_cuisines(restaurants: &[Restaurant]) -> Vec<String> {
    unique_by(restaurants, |r| r.cuisine_type.as_str())
}

/// Sorts reviews for display: newest first, undated reviews last
pub fn sort_reviews_for_display(reviews: &mut [Review]) {
    reviews.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

/// Mean rating of the given reviews, `None` when there are none
pub fn average_rating(reviews: &[Review]) -> Option<f64> {
    if reviews.is_empty() {
        return None;
    }
    let total: u32 = reviews.iter().map(|r| u32::from(r.rating)).sum();
    Some(f64::from(total) / reviews.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn restaurant(id: u32, cuisine: &str, neighborhood: &str) -> Restaurant {
        serde_json::from_value(json!({
            "id": id,
            "name": format!("Restaurant {}", id),
            "cuisine_type": cuisine,
            "neighborhood": neighborhood,
        }))
        .unwrap()
    }

    fn review_at(id: u64, millis: i64) -> Review {
        Review {
            id,
            restaurant_id: 1,
            name: "Steve".to_string(),
            rating: 4,
            comments: "Good".to_string(),
            created_at: Utc.timestamp_millis_opt(millis).single(),
            updated_at: None,
        }
    }

    #[test]
    fn test_restaurant_parses_api_shape() {
        let restaurant: Restaurant = serde_json::from_value(json!({
            "name": "Mission Chinese Food",
            "neighborhood": "Manhattan",
            "photograph": "1.jpg",
            "address": "171 E Broadway, New York, NY 10002",
            "latlng": {"lat": 40.713829, "lng": -73.989667},
            "cuisine_type": "Asian",
            "operating_hours": {"Monday": "5:30 pm - 11:00 pm"},
            "createdAt": 1504095563444u64,
            "updatedAt": "2018-07-02T19:21:09.219Z",
            "id": 1,
            "is_favorite": "true"
        }))
        .unwrap();

        assert_eq!(restaurant.id, 1);
        assert!(restaurant.is_favorite);
        assert_eq!(restaurant.latlng.unwrap().lat, 40.713829);
        assert_eq!(
            restaurant.created_at,
            Utc.timestamp_millis_opt(1504095563444).single()
        );
        assert!(restaurant.updated_at.is_some());
        assert!(restaurant.reviews.is_empty());
    }

    #[test]
    fn test_restaurant_accepts_legacy_shapes() {
        let restaurant: Restaurant = serde_json::from_value(json!({
            "id": "7",
            "name": "Tuscany",
            "photograph": 7,
            "imgAlt": "A dining room",
            "is_favorite": false
        }))
        .unwrap();

        assert_eq!(restaurant.id, 7);
        assert_eq!(restaurant.photograph.as_deref(), Some("7"));
        assert_eq!(restaurant.img_alt.as_deref(), Some("A dining room"));
        assert!(!restaurant.is_favorite);
    }

    #[test]
    fn test_restaurant_rejects_garbage_flag() {
        let result: Result<Restaurant, _> = serde_json::from_value(json!({
            "id": 1,
            "name": "Bad",
            "is_favorite": "sometimes"
        }));

        assert!(result.is_err());
    }

    #[test]
    fn test_canonical_form_survives_reserialization() {
        let original = restaurant(3, "Pizza", "Brooklyn");
        let json = serde_json::to_value(&original).unwrap();
        let reparsed: Restaurant = serde_json::from_value(json).unwrap();

        assert_eq!(reparsed, original);
    }

    #[test]
    fn test_review_parses_string_fields() {
        let review: Review = serde_json::from_value(json!({
            "id": "12",
            "restaurant_id": "3",
            "name": "Ann",
            "rating": "5",
            "comments": "Great",
            "createdAt": 1504095567183u64
        }))
        .unwrap();

        assert_eq!(review.id, 12);
        assert_eq!(review.restaurant_id, 3);
        assert_eq!(review.rating, 5);
        assert!(!review.is_pending());
    }

    #[test]
    fn test_review_without_id_is_pending() {
        let review: Review = serde_json::from_value(json!({
            "restaurant_id": 3,
            "name": "Ann",
            "rating": 2
        }))
        .unwrap();

        assert!(review.is_pending());
        assert_eq!(review.comments, "");
    }

    #[test]
    fn test_restaurant_url_helpers() {
        let mut r = restaurant(4, "Pizza", "Queens");
        assert_eq!(r.url(), "./restaurant.html?id=4");
        assert!(r.image_url().is_none());
        assert_eq!(r.image_alt(), "Photograph of Restaurant 4");

        r.photograph = Some("4.jpg".to_string());
        r.img_alt = Some("Pizza oven".to_string());
        assert_eq!(r.image_url().as_deref(), Some("./img/4.jpg"));
        assert_eq!(r.image_alt(), "Pizza oven");
    }

    #[test]
    fn test_new_review_validation() {
        assert_eq!(
            NewReview::new(1, "  ", 3, "ok").validate(),
            Err(ReviewError::EmptyName)
        );
        assert_eq!(
            NewReview::new(1, "Ann", 3, "\n").validate(),
            Err(ReviewError::EmptyComments)
        );
        assert_eq!(
            NewReview::new(1, "Ann", 0, "ok").validate(),
            Err(ReviewError::RatingOutOfRange(0))
        );
        assert_eq!(
            NewReview::new(1, "Ann", 6, "ok").validate(),
            Err(ReviewError::RatingOutOfRange(6))
        );

        let valid = NewReview::new(1, " Ann ", 5, " Lovely ").validate().unwrap();
        assert_eq!(valid.name, "Ann");
        assert_eq!(valid.comments, "Lovely");
    }

    #[test]
    fn test_pending_review_gets_placeholder_id_and_unique_token() {
        let first = PendingReview::new(NewReview::new(2, "Ann", 4, "Nice"));
        let second = PendingReview::new(NewReview::new(2, "Ann", 4, "Nice"));

        assert_eq!(first.review.id, UNASSIGNED_REVIEW_ID);
        assert!(first.review.created_at.is_some());
        assert_ne!(first.token, second.token);
        assert_eq!(first.to_new_review(), NewReview::new(2, "Ann", 4, "Nice"));
    }

    #[test]
    fn test_filter_all_matches_everything() {
        let restaurants = vec![
            restaurant(1, "Asian", "Manhattan"),
            restaurant(2, "Pizza", "Brooklyn"),
        ];

        let filter = RestaurantFilter::new(Some("all"), Some("all"));

        assert_eq!(filter, RestaurantFilter::default());
        assert_eq!(filter.apply(&restaurants).len(), 2);
    }

    #[test]
    fn test_filter_by_cuisine_and_neighborhood() {
        let restaurants = vec![
            restaurant(1, "Asian", "Manhattan"),
            restaurant(2, "Pizza", "Brooklyn"),
            restaurant(3, "Pizza", "Manhattan"),
        ];

        let pizza = RestaurantFilter::new(Some("Pizza"), None).apply(&restaurants);
        assert_eq!(pizza.iter().map(|r| r.id).collect::<Vec<_>>(), vec![2, 3]);

        let both = RestaurantFilter::new(Some("Pizza"), Some("Manhattan")).apply(&restaurants);
        assert_eq!(both.iter().map(|r| r.id).collect::<Vec<_>>(), vec![3]);
    }

    #[test]
    fn test_unique_values_keep_first_seen_order() {
        let restaurants = vec![
            restaurant(1, "Asian", "Manhattan"),
            restaurant(2, "Pizza", "Brooklyn"),
            restaurant(3, "Asian", "Manhattan"),
            restaurant(4, "American", "Queens"),
        ];

        assert_eq!(
            unique_neighborhoods(&restaurants),
            vec!["Manhattan", "Brooklyn", "Queens"]
        );
        assert_eq!(unique_cuisines(&restaurants), vec!["Asian", "Pizza", "American"]);
    }

    #[test]
    fn test_reviews_sorted_newest_first() {
        let mut reviews = vec![review_at(1, 1_000), review_at(3, 3_000), review_at(2, 2_000)];

        sort_reviews_for_display(&mut reviews);

        assert_eq!(reviews.iter().map(|r| r.id).collect::<Vec<_>>(), vec![3, 2, 1]);
    }

    #[test]
    fn test_undated_reviews_sort_last() {
        let mut undated = review_at(9, 0);
        undated.created_at = None;
        let mut reviews = vec![undated, review_at(1, 1_000)];

        sort_reviews_for_display(&mut reviews);

        assert_eq!(reviews[0].id, 1);
        assert_eq!(reviews[1].id, 9);
    }

    #[test]
    fn test_average_rating() {
        assert!(average_rating(&[]).is_none());

        let mut low = review_at(1, 0);
        low.rating = 2;
        let mut high = review_at(2, 0);
        high.rating = 5;

        let average = average_rating(&[low, high]).unwrap();
        assert!((average - 3.5).abs() < f64::EPSILON);
    }
}
