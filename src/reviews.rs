//! Review aggregator: per-product reviews and the rating summary derived from them.
//!
//! Every change to a product's review set is followed by a full recomputation
//! of that product's summary. A failed recomputation is logged and leaves the
//! previous summary in place; [`ReviewAggregator::reconcile`] repairs it later.

use crate::catalog::CatalogLookup;
use crate::domain::aggregates::{RatingSummary, Review};
use crate::domain::events::{DomainEvent, ReviewEvent};
use crate::domain::value_objects::Rating;
use crate::identity::Identity;
use crate::publisher::EventPublisher;
use crate::storage::{Page, PageRequest, RatingCount, ReviewSort, ReviewStore};
use crate::{Error, Result};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

pub const REVIEW_PAGE_SIZE: u32 = 10;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ReviewInput {
    #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5"))]
    pub rating: u8,
    #[validate(length(min = 1, max = 1000, message = "Comment must be between 1 and 1000 characters"))]
    pub comment: String,
}

impl ReviewInput {
    fn checked(&self) -> Result<Rating> {
        self.validate()?;
        if self.comment.trim().is_empty() { return Err(Error::Validation("Rating and comment are required".into())); }
        Ok(Rating::new(self.rating)?)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReviewListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    #[serde(default)]
    pub sort: ReviewSort,
}

#[derive(Debug, Clone)]
pub struct ProductReviews {
    pub reviews: Page<Review>,
    pub rating_distribution: Vec<RatingCount>,
    pub summary: RatingSummary,
}

pub struct ReviewAggregator {
    reviews: Arc<dyn ReviewStore>,
    catalog: Arc<dyn CatalogLookup>,
    events: Arc<dyn EventPublisher>,
}

impl ReviewAggregator {
    pub fn new(reviews: Arc<dyn ReviewStore>, catalog: Arc<dyn CatalogLookup>, events: Arc<dyn EventPublisher>) -> Self {
        Self { reviews, catalog, events }
    }

    #[tracing::instrument(skip(self, identity, input), fields(reviewer_id = %identity.id))]
    pub async fn submit(&self, identity: &Identity, product_id: Uuid, input: ReviewInput) -> Result<Review> {
        let rating = input.checked()?;
        if self.catalog.resolve(product_id).await?.is_none() {
            return Err(Error::InvalidReference("Product not found".into()));
        }
        let mut review = Review::create(product_id, identity.id, identity.name.clone(), rating, &input.comment, Utc::now())?;
        let events = review.take_events();
        self.reviews.insert_review(&review).await?;
        tracing::info!(review_id = %review.id(), rating = rating.value(), "review submitted");
        self.events.publish_all(events).await;
        self.recompute(product_id).await;
        Ok(review)
    }

    #[tracing::instrument(skip(self, identity, input), fields(reviewer_id = %identity.id))]
    pub async fn edit(&self, identity: &Identity, review_id: Uuid, input: ReviewInput) -> Result<Review> {
        let rating = input.checked()?;
        let mut review = self.reviews.update_by_author(review_id, identity.id, rating, &input.comment, Utc::now()).await?;
        tracing::info!(product_id = %review.product_id(), rating = rating.value(), "review updated");
        self.events.publish_all(review.take_events()).await;
        self.recompute(review.product_id()).await;
        Ok(review)
    }

    #[tracing::instrument(skip(self, identity), fields(reviewer_id = %identity.id))]
    pub async fn delete(&self, identity: &Identity, review_id: Uuid) -> Result<()> {
        let mut review = self.reviews.delete_by_author(review_id, identity.id).await?;
        tracing::info!(product_id = %review.product_id(), "review deleted");
        self.events.publish_all(review.take_events()).await;
        self.recompute(review.product_id()).await;
        Ok(())
    }

    /// Any authenticated caller, the author included, may mark a review
    /// helpful as often as they like.
    pub async fn mark_helpful(&self, _identity: &Identity, review_id: Uuid) -> Result<u32> {
        let review = self.reviews.increment_helpful(review_id).await?;
        Ok(review.helpful())
    }

    pub async fn product_reviews(&self, product_id: Uuid, query: &ReviewListQuery) -> Result<ProductReviews> {
        let summary = self.reviews.rating_summary(product_id).await?.ok_or_else(|| Error::NotFound("Product".into()))?;
        let reviews = self.reviews.list_for_product(product_id, query.sort, PageRequest::new(query.page, query.limit, REVIEW_PAGE_SIZE)).await?;
        let rating_distribution = self.reviews.rating_distribution(product_id).await?;
        Ok(ProductReviews { reviews, rating_distribution, summary })
    }

    async fn recompute(&self, product_id: Uuid) {
        match self.reviews.refresh_rating_summary(product_id).await {
            Ok(summary) => {
                tracing::debug!(%product_id, average = summary.average_rating, total = summary.total_reviews, "rating summary recomputed");
                self.events.publish(DomainEvent::Review(ReviewEvent::RatingRecomputed { product_id, summary })).await;
            }
            Err(e) => tracing::error!(%product_id, error = %e, "rating summary recompute failed, summary left stale"),
        }
    }

    /// Recomputes every rated product's summary. Returns how many succeeded.
    pub async fn reconcile(&self) -> Result<usize> {
        let mut refreshed = 0;
        for product_id in self.reviews.rated_products().await? {
            match self.reviews.refresh_rating_summary(product_id).await {
                Ok(_) => refreshed += 1,
                Err(e) => tracing::warn!(%product_id, error = %e, "reconcile skipped product"),
            }
        }
        Ok(refreshed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogEntry;
    use crate::domain::value_objects::Money;
    use crate::identity::Role;
    use crate::publisher::RecordingPublisher;
    use crate::storage::MemoryStore;

    async fn fixture() -> (Arc<MemoryStore>, ReviewAggregator, Uuid) {
        let store = Arc::new(MemoryStore::new());
        let product_id = Uuid::new_v4();
        store.add_product(CatalogEntry { product_id, name: "Thakali Set".into(), price: Money::new(450), img: "set.jpg".into(), is_active: true }).await;
        let aggregator = ReviewAggregator::new(store.clone(), store.clone(), Arc::new(RecordingPublisher::new()));
        (store, aggregator, product_id)
    }

    fn reviewer() -> Identity { Identity { id: Uuid::new_v4(), role: Role::Customer, name: "Maya".into() } }

    fn input(rating: u8) -> ReviewInput { ReviewInput { rating, comment: "Delicious".into() } }

    async fn summary(store: &MemoryStore, product_id: Uuid) -> RatingSummary {
        store.rating_summary(product_id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_summary_tracks_reviews() {
        let (store, agg, product) = fixture().await;
        let mut ids = Vec::new();
        for r in [4, 5, 3] {
            ids.push(agg.submit(&reviewer(), product, input(r)).await.unwrap());
        }
        assert_eq!(summary(&store, product).await, RatingSummary { average_rating: 4.0, total_reviews: 3 });

        let three = ids.iter().find(|r| r.rating().value() == 3).unwrap();
        let author = Identity { id: three.reviewer_id(), role: Role::Customer, name: "Maya".into() };
        agg.delete(&author, three.id()).await.unwrap();
        assert_eq!(summary(&store, product).await, RatingSummary { average_rating: 4.5, total_reviews: 2 });
    }

    #[tokio::test]
    async fn test_edit_recomputes_from_source() {
        let (store, agg, product) = fixture().await;
        let author = reviewer();
        let review = agg.submit(&author, product, input(3)).await.unwrap();
        agg.edit(&author, review.id(), input(5)).await.unwrap();
        assert_eq!(summary(&store, product).await, RatingSummary { average_rating: 5.0, total_reviews: 1 });
    }

    #[tokio::test]
    async fn test_duplicate_review_rejected() {
        let (store, agg, product) = fixture().await;
        let author = reviewer();
        agg.submit(&author, product, input(4)).await.unwrap();
        let before = summary(&store, product).await;
        assert!(matches!(agg.submit(&author, product, input(1)).await, Err(Error::DuplicateReview)));
        assert_eq!(store.review_count().await, 1);
        assert_eq!(summary(&store, product).await, before);
    }

    #[tokio::test]
    async fn test_concurrent_duplicates_single_winner() {
        let (store, agg, product) = fixture().await;
        let agg = Arc::new(agg);
        let author = reviewer();
        let handles: Vec<_> = (0..8).map(|_| {
            let agg = agg.clone();
            let author = author.clone();
            tokio::spawn(async move { agg.submit(&author, product, input(5)).await })
        }).collect();
        let mut wins = 0;
        for h in handles {
            if h.await.unwrap().is_ok() { wins += 1; }
        }
        assert_eq!(wins, 1);
        assert_eq!(store.review_count().await, 1);
        assert_eq!(summary(&store, product).await.total_reviews, 1);
    }

    #[tokio::test]
    async fn test_foreign_and_missing_reviews_look_the_same() {
        let (_store, agg, product) = fixture().await;
        let review = agg.submit(&reviewer(), product, input(4)).await.unwrap();
        let stranger = reviewer();
        assert!(matches!(agg.edit(&stranger, review.id(), input(1)).await, Err(Error::NotFoundOrUnauthorized)));
        assert!(matches!(agg.delete(&stranger, review.id()).await, Err(Error::NotFoundOrUnauthorized)));
        assert!(matches!(agg.delete(&stranger, Uuid::new_v4()).await, Err(Error::NotFoundOrUnauthorized)));
    }

    #[tokio::test]
    async fn test_last_review_deleted_resets_summary() {
        let (store, agg, product) = fixture().await;
        let author = reviewer();
        let review = agg.submit(&author, product, input(2)).await.unwrap();
        agg.delete(&author, review.id()).await.unwrap();
        assert_eq!(summary(&store, product).await, RatingSummary { average_rating: 0.0, total_reviews: 0 });
    }

    #[tokio::test]
    async fn test_submit_validation() {
        let (_store, agg, product) = fixture().await;
        assert!(matches!(agg.submit(&reviewer(), Uuid::new_v4(), input(4)).await, Err(Error::InvalidReference(_))));
        assert!(matches!(agg.submit(&reviewer(), product, input(6)).await, Err(Error::Validation(_))));
        assert!(matches!(agg.submit(&reviewer(), product, input(0)).await, Err(Error::Validation(_))));
        let blank = ReviewInput { rating: 4, comment: "   ".into() };
        assert!(matches!(agg.submit(&reviewer(), product, blank).await, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn test_helpful_counts_every_call() {
        let (_store, agg, product) = fixture().await;
        let author = reviewer();
        let review = agg.submit(&author, product, input(5)).await.unwrap();
        let fan = reviewer();
        assert_eq!(agg.mark_helpful(&fan, review.id()).await.unwrap(), 1);
        assert_eq!(agg.mark_helpful(&fan, review.id()).await.unwrap(), 2);
        assert_eq!(agg.mark_helpful(&author, review.id()).await.unwrap(), 3);
        assert!(matches!(agg.mark_helpful(&fan, Uuid::new_v4()).await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_failed_recompute_keeps_review_and_reconcile_repairs() {
        let (store, agg, product) = fixture().await;
        agg.submit(&reviewer(), product, input(4)).await.unwrap();
        store.set_fail_rating_refresh(true).await;
        agg.submit(&reviewer(), product, input(2)).await.unwrap();
        assert_eq!(store.review_count().await, 2);
        assert_eq!(summary(&store, product).await, RatingSummary { average_rating: 4.0, total_reviews: 1 });

        store.set_fail_rating_refresh(false).await;
        assert_eq!(agg.reconcile().await.unwrap(), 1);
        assert_eq!(summary(&store, product).await, RatingSummary { average_rating: 3.0, total_reviews: 2 });
    }

    #[tokio::test]
    async fn test_product_reviews_listing() {
        let (_store, agg, product) = fixture().await;
        for r in [5, 5, 2] {
            agg.submit(&reviewer(), product, input(r)).await.unwrap();
        }
        let listing = agg.product_reviews(product, &ReviewListQuery { sort: ReviewSort::Lowest, ..Default::default() }).await.unwrap();
        assert_eq!(listing.reviews.total, 3);
        assert_eq!(listing.reviews.items[0].rating().value(), 2);
        assert_eq!(listing.rating_distribution, vec![RatingCount { rating: 5, count: 2 }, RatingCount { rating: 2, count: 1 }]);
        assert_eq!(listing.summary.total_reviews, 3);
        assert!(matches!(agg.product_reviews(Uuid::new_v4(), &ReviewListQuery::default()).await, Err(Error::NotFound(_))));
    }
}
