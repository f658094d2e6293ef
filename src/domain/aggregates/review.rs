//! Review Aggregate and the derived product rating summary

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::events::{DomainEvent, ReviewEvent};
use crate::domain::value_objects::Rating;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub(crate) id: Uuid,
    pub(crate) product_id: Uuid,
    #[serde(rename = "userId")]
    pub(crate) reviewer_id: Uuid,
    #[serde(rename = "userName")]
    pub(crate) reviewer_name: String,
    pub(crate) rating: Rating,
    pub(crate) comment: String,
    pub(crate) helpful: u32,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub(crate) events: Vec<DomainEvent>,
}

impl Review {
    pub fn create(product_id: Uuid, reviewer_id: Uuid, reviewer_name: impl Into<String>, rating: Rating, comment: &str, now: DateTime<Utc>) -> Result<Self, ReviewError> {
        let mut review = Self {
            id: Uuid::now_v7(), product_id, reviewer_id, reviewer_name: reviewer_name.into(),
            rating, comment: Self::clean_comment(comment)?, helpful: 0, created_at: now, updated_at: now, events: vec![],
        };
        review.raise_event(ReviewEvent::Submitted { review_id: review.id, product_id, rating });
        Ok(review)
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn product_id(&self) -> Uuid { self.product_id }
    pub fn reviewer_id(&self) -> Uuid { self.reviewer_id }
    pub fn reviewer_name(&self) -> &str { &self.reviewer_name }
    pub fn rating(&self) -> Rating { self.rating }
    pub fn comment(&self) -> &str { &self.comment }
    pub fn helpful(&self) -> u32 { self.helpful }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn is_authored_by(&self, reviewer_id: Uuid) -> bool { self.reviewer_id == reviewer_id }

    pub fn revise(&mut self, rating: Rating, comment: &str, now: DateTime<Utc>) -> Result<(), ReviewError> {
        self.comment = Self::clean_comment(comment)?;
        self.rating = rating;
        self.updated_at = now;
        self.raise_event(ReviewEvent::Updated { review_id: self.id, product_id: self.product_id, rating });
        Ok(())
    }

    /// Records removal of a review that has just been deleted from storage.
    pub fn retract(&mut self) {
        self.raise_event(ReviewEvent::Deleted { review_id: self.id, product_id: self.product_id });
    }

    pub fn mark_helpful(&mut self) { self.helpful = self.helpful.saturating_add(1); }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: ReviewEvent) { self.events.push(DomainEvent::Review(e)); }

    fn clean_comment(comment: &str) -> Result<String, ReviewError> {
        let trimmed = comment.trim();
        if trimmed.is_empty() { return Err(ReviewError::EmptyComment); }
        Ok(trimmed.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReviewError {
    #[error("comment must not be empty")]
    EmptyComment,
}

/// Materialized `(averageRating, totalReviews)` for a product.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingSummary {
    pub average_rating: f64,
    pub total_reviews: u32,
}

impl RatingSummary {
    /// Full recomputation over the current review set. The mean is rounded
    /// half-up to one decimal using integer arithmetic.
    pub fn from_ratings<I>(ratings: I) -> Self
    where
        I: IntoIterator<Item = Rating>,
    {
        let (sum, count) = ratings.into_iter().fold((0u64, 0u64), |(s, c), r| (s + u64::from(r.value()), c + 1));
        if count == 0 { return Self::default(); }
        let tenths = (sum * 20 + count) / (2 * count);
        Self { average_rating: tenths as f64 / 10.0, total_reviews: u32::try_from(count).unwrap_or(u32::MAX) }
    }
}
