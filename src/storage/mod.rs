//! Persistence ports for orders and reviews.
//!
//! Every atomicity requirement of the service lives behind these traits:
//! acceptance is a conditional write guarded on `is_accepted`, review
//! uniqueness on `(product_id, reviewer_id)` is a storage constraint, and a
//! rating refresh reads the review set and writes the summary as one unit.

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use crate::domain::aggregates::{Order, OrderStatus, RatingSummary, Review};
use crate::domain::value_objects::{OrderId, Rating};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    pub fn new(page: Option<u32>, limit: Option<u32>, default_limit: u32) -> Self {
        Self { page: page.unwrap_or(1).max(1), limit: limit.unwrap_or(default_limit).clamp(1, MAX_PAGE_SIZE) }
    }

    pub fn offset(&self) -> u64 { u64::from(self.page - 1) * u64::from(self.limit) }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}

impl<T> Page<T> {
    pub fn total_pages(&self) -> u64 { self.total.div_ceil(u64::from(self.limit)) }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OrderFilter {
    pub customer_id: Option<Uuid>,
    pub status: Option<OrderStatus>,
    pub is_accepted: Option<bool>,
}

impl OrderFilter {
    pub fn matches(&self, order: &Order) -> bool {
        self.customer_id.map_or(true, |c| order.customer_id() == c)
            && self.status.map_or(true, |s| order.status() == s)
            && self.is_accepted.map_or(true, |a| order.is_accepted() == a)
    }
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn insert_order(&self, order: &Order) -> Result<()>;
    async fn find_order(&self, order_id: &OrderId) -> Result<Option<Order>>;
    /// Fails with `NotFound` or `AlreadyAccepted`; two concurrent calls can never both succeed.
    async fn accept(&self, order_id: &OrderId, operator_id: Uuid, now: DateTime<Utc>) -> Result<Order>;
    /// Returns the updated order and the status it had before.
    async fn update_status(&self, order_id: &OrderId, status: OrderStatus, now: DateTime<Utc>) -> Result<(Order, OrderStatus)>;
    /// Newest first, ties broken by order id descending.
    async fn list_orders(&self, filter: &OrderFilter, page: PageRequest) -> Result<Page<Order>>;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewSort {
    #[default]
    Newest,
    Oldest,
    Highest,
    Lowest,
    Helpful,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct RatingCount {
    pub rating: u8,
    pub count: u64,
}

#[async_trait]
pub trait ReviewStore: Send + Sync {
    /// Fails with `DuplicateReview` when the reviewer already reviewed the product.
    async fn insert_review(&self, review: &Review) -> Result<()>;
    /// Fails with `NotFoundOrUnauthorized` unless `author_id` wrote the review.
    async fn update_by_author(&self, review_id: Uuid, author_id: Uuid, rating: Rating, comment: &str, now: DateTime<Utc>) -> Result<Review>;
    /// Fails with `NotFoundOrUnauthorized` unless `author_id` wrote the review.
    async fn delete_by_author(&self, review_id: Uuid, author_id: Uuid) -> Result<Review>;
    async fn increment_helpful(&self, review_id: Uuid) -> Result<Review>;
    async fn list_for_product(&self, product_id: Uuid, sort: ReviewSort, page: PageRequest) -> Result<Page<Review>>;
    /// Per-rating counts, highest rating first; ratings without reviews are omitted.
    async fn rating_distribution(&self, product_id: Uuid) -> Result<Vec<RatingCount>>;
    /// Recomputes the product summary from its full review set and stores it.
    async fn refresh_rating_summary(&self, product_id: Uuid) -> Result<RatingSummary>;
    async fn rating_summary(&self, product_id: Uuid) -> Result<Option<RatingSummary>>;
    /// Products with reviews or with a non-zero stored summary.
    async fn rated_products(&self) -> Result<Vec<Uuid>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_request_clamps() {
        assert_eq!(PageRequest::new(None, None, 10), PageRequest { page: 1, limit: 10 });
        assert_eq!(PageRequest::new(Some(0), Some(1000), 10), PageRequest { page: 1, limit: MAX_PAGE_SIZE });
        assert_eq!(PageRequest::new(Some(3), Some(20), 10).offset(), 40);
    }

    #[test]
    fn test_total_pages() {
        let page: Page<()> = Page { items: vec![], total: 21, page: 1, limit: 10 };
        assert_eq!(page.total_pages(), 3);
    }
}
