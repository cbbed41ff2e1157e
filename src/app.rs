//! Application state for the restaurant directory
//!
//! [`DirectoryState`] holds what the list and detail views show: the loaded
//! restaurants, the active filter, the open restaurant and its reviews. It is
//! owned by whoever drives the views and passed to them explicitly.

use tracing::{info, warn};

use crate::data::{
    average_rating, sort_reviews_for_display, unique_cuisines, unique_neighborhoods,
    FavoriteUpdate, NewReview, PendingReview, RepositoryError, Restaurant, RestaurantFilter,
    Review, ReviewRepository,
};

/// Which view is showing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum View {
    /// Initial state before restaurants are loaded
    Loading,
    /// Filterable list of restaurants
    List,
    /// Detail view for a restaurant
    Detail(u32),
}

/// State shared by the list and detail views
pub struct DirectoryState {
    /// Current view
    pub view: View,
    /// Every restaurant loaded from the repository
    pub restaurants: Vec<Restaurant>,
    /// Active cuisine and neighborhood filter
    pub filter: RestaurantFilter,
    /// Restaurant open in the detail view
    pub current: Option<Restaurant>,
    /// Reviews for the open restaurant, newest first
    pub reviews: Vec<Review>,
    /// Whether `reviews` only contains locally queued reviews
    pub reviews_offline: bool,
    repository: ReviewRepository,
}

impl DirectoryState {
    pub fn new(repository: ReviewRepository) -> Self {
        Self {
            view: View::Loading,
            restaurants: Vec::new(),
            filter: RestaurantFilter::default(),
            current: None,
            reviews: Vec::new(),
            reviews_offline: false,
            repository,
        }
    }

    pub fn repository(&self) -> &ReviewRepository {
        &self.repository
    }

    /// Loads restaurants and switches to the list view
    pub async fn load(&mut self) -> Result<(), RepositoryError> {
        self.restaurants = self.repository.fetch_restaurants().await?;
        self.view = View::List;
        info!(count = self.restaurants.len(), "Directory loaded");
        Ok(())
    }

    /// Restaurants that match the active filter
    pub fn visible_restaurants(&self) -> Vec<&Restaurant> {
        self.filter.apply(&self.restaurants)
    }

    pub fn neighborhoods(&self) -> Vec<String> {
        unique_neighborhoods(&self.restaurants)
    }

    pub fn cuisines(&self) -> Vec<String> {
        unique_cuisines(&self.restaurants)
    }

    pub fn set_filter(&mut self, filter: RestaurantFilter) {
        self.filter = filter;
    }

    /// Opens the detail view for a restaurant
    ///
    /// When reviews cannot be loaded from the store or the network, the view
    /// still opens with whatever reviews are queued locally.
    pub async fn open_restaurant(&mut self, id: u32) -> Result<&Restaurant, RepositoryError> {
        let mut restaurant = match self.restaurants.iter().find(|r| r.id == id) {
            Some(restaurant) => restaurant.clone(),
            None => self.repository.fetch_restaurant_by_id(id).await?,
        };

        let (reviews, offline) = match self.repository.fetch_reviews_by_id(id).await {
            Ok(reviews) => (reviews, false),
            Err(RepositoryError::Unavailable(e)) => {
                warn!(restaurant_id = id, error = %e, "Reviews unavailable, showing queued reviews only");
                let mut pending: Vec<Review> = self
                    .repository
                    .pending_reviews_for(id)
                    .await?
                    .into_iter()
                    .map(|p| p.review)
                    .collect();
                sort_reviews_for_display(&mut pending);
                (pending, true)
            }
            Err(e) => return Err(e),
        };

        restaurant.reviews = reviews.clone();
        self.reviews = reviews;
        self.reviews_offline = offline;
        self.view = View::Detail(id);
        let current: &Restaurant = self.current.insert(restaurant);
        Ok(current)
    }

    /// Returns to the list view
    pub fn close_restaurant(&mut self) {
        self.current = None;
        self.reviews.clear();
        self.reviews_offline = false;
        self.view = View::List;
    }

    /// Flips the favorite flag of a restaurant and updates every copy held here
    pub async fn toggle_favorite(&mut self, id: u32) -> Result<FavoriteUpdate, RepositoryError> {
        let currently = match self.restaurants.iter().find(|r| r.id == id) {
            Some(restaurant) => restaurant.is_favorite,
            None => self.repository.fetch_restaurant_by_id(id).await?.is_favorite,
        };

        let update = self.repository.mark_favorite(id, !currently).await?;
        let value = update.restaurant.is_favorite;

        if let Some(restaurant) = self.restaurants.iter_mut().find(|r| r.id == id) {
            restaurant.is_favorite = value;
        }
        if let Some(current) = self.current.as_mut().filter(|c| c.id == id) {
            current.is_favorite = value;
        }
        Ok(update)
    }

    /// Queues a review and, when its restaurant is open, shows it first
    /// in the review list right away
    pub async fn submit_review(&mut self, review: NewReview) -> Result<PendingReview, RepositoryError> {
        let entry = self.repository.queue_review_for_sync(review).await?;

        if let Some(current) = self
            .current
            .as_mut()
            .filter(|c| c.id == entry.review.restaurant_id)
        {
            current.reviews.insert(0, entry.review.clone());
            self.reviews.insert(0, entry.review.clone());
        }
        Ok(entry)
    }

    /// Mean rating of the open restaurant's reviews
    pub fn average_rating(&self) -> Option<f64> {
        average_rating(&self.reviews)
    }
}
