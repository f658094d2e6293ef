//! In-memory store for tests and local runs. Each operation holds the
//! relevant lock for its whole read-modify-write.

use super::{OrderFilter, OrderStore, Page, PageRequest, RatingCount, ReviewSort, ReviewStore};
use crate::catalog::{CatalogEntry, CatalogLookup};
use crate::domain::aggregates::{Order, OrderStatus, RatingSummary, Review};
use crate::domain::value_objects::{Money, OrderId, Rating};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use uuid::Uuid;

struct StoredProduct {
    entry: CatalogEntry,
    summary: RatingSummary,
}

#[derive(Default)]
pub struct MemoryStore {
    orders: RwLock<HashMap<OrderId, Order>>,
    reviews: RwLock<HashMap<Uuid, Review>>,
    products: RwLock<HashMap<Uuid, StoredProduct>>,
    fail_rating_refresh: RwLock<bool>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }

    pub async fn add_product(&self, entry: CatalogEntry) {
        let id = entry.product_id;
        self.products.write().await.insert(id, StoredProduct { entry, summary: RatingSummary::default() });
    }

    /// Catalog edit, as the product admin would make it.
    pub async fn set_price(&self, product_id: Uuid, price: Money) {
        if let Some(p) = self.products.write().await.get_mut(&product_id) { p.entry.price = price; }
    }

    pub async fn set_fail_rating_refresh(&self, fail: bool) {
        *self.fail_rating_refresh.write().await = fail;
    }

    pub async fn order_count(&self) -> usize { self.orders.read().await.len() }
    pub async fn review_count(&self) -> usize { self.reviews.read().await.len() }
}

/// Hands the raised events to the caller; the stored copy keeps none.
fn detach(order: &mut Order) -> Order {
    let detached = order.clone();
    order.take_events();
    detached
}

fn paginate<T: Clone>(sorted: Vec<T>, page: PageRequest) -> Page<T> {
    let total = sorted.len() as u64;
    let items = sorted.into_iter().skip(page.offset() as usize).take(page.limit as usize).collect();
    Page { items, total, page: page.page, limit: page.limit }
}

#[async_trait]
impl CatalogLookup for MemoryStore {
    async fn resolve(&self, product_id: Uuid) -> Result<Option<CatalogEntry>> {
        Ok(self.products.read().await.get(&product_id).map(|p| p.entry.clone()))
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn insert_order(&self, order: &Order) -> Result<()> {
        let mut orders = self.orders.write().await;
        if orders.contains_key(order.order_id()) {
            return Err(Error::Storage(format!("duplicate order id {}", order.order_id())));
        }
        let mut stored = order.clone();
        stored.take_events();
        orders.insert(order.order_id().clone(), stored);
        Ok(())
    }

    async fn find_order(&self, order_id: &OrderId) -> Result<Option<Order>> {
        Ok(self.orders.read().await.get(order_id).cloned())
    }

    async fn accept(&self, order_id: &OrderId, operator_id: Uuid, now: DateTime<Utc>) -> Result<Order> {
        let mut orders = self.orders.write().await;
        let order = orders.get_mut(order_id).ok_or_else(|| Error::NotFound("Order".into()))?;
        order.accept(operator_id, now)?;
        Ok(detach(order))
    }

    async fn update_status(&self, order_id: &OrderId, status: OrderStatus, now: DateTime<Utc>) -> Result<(Order, OrderStatus)> {
        let mut orders = self.orders.write().await;
        let order = orders.get_mut(order_id).ok_or_else(|| Error::NotFound("Order".into()))?;
        let previous = order.set_status(status, now)?;
        Ok((detach(order), previous))
    }

    async fn list_orders(&self, filter: &OrderFilter, page: PageRequest) -> Result<Page<Order>> {
        let mut matched: Vec<Order> = self.orders.read().await.values().filter(|o| filter.matches(o)).cloned().collect();
        matched.sort_by(|a, b| b.created_at().cmp(&a.created_at()).then_with(|| b.order_id().as_str().cmp(a.order_id().as_str())));
        Ok(paginate(matched, page))
    }
}

#[async_trait]
impl ReviewStore for MemoryStore {
    async fn insert_review(&self, review: &Review) -> Result<()> {
        let mut reviews = self.reviews.write().await;
        if reviews.values().any(|r| r.product_id() == review.product_id() && r.reviewer_id() == review.reviewer_id()) {
            return Err(Error::DuplicateReview);
        }
        let mut stored = review.clone();
        stored.take_events();
        reviews.insert(review.id(), stored);
        Ok(())
    }

    async fn update_by_author(&self, review_id: Uuid, author_id: Uuid, rating: Rating, comment: &str, now: DateTime<Utc>) -> Result<Review> {
        let mut reviews = self.reviews.write().await;
        let review = reviews.get_mut(&review_id).filter(|r| r.is_authored_by(author_id)).ok_or(Error::NotFoundOrUnauthorized)?;
        review.revise(rating, comment, now)?;
        let revised = review.clone();
        review.take_events();
        Ok(revised)
    }

    async fn delete_by_author(&self, review_id: Uuid, author_id: Uuid) -> Result<Review> {
        let mut reviews = self.reviews.write().await;
        if !reviews.get(&review_id).is_some_and(|r| r.is_authored_by(author_id)) {
            return Err(Error::NotFoundOrUnauthorized);
        }
        let mut removed = reviews.remove(&review_id).ok_or(Error::NotFoundOrUnauthorized)?;
        removed.retract();
        Ok(removed)
    }

    async fn increment_helpful(&self, review_id: Uuid) -> Result<Review> {
        let mut reviews = self.reviews.write().await;
        let review = reviews.get_mut(&review_id).ok_or_else(|| Error::NotFound("Review".into()))?;
        review.mark_helpful();
        Ok(review.clone())
    }

    async fn list_for_product(&self, product_id: Uuid, sort: ReviewSort, page: PageRequest) -> Result<Page<Review>> {
        let mut matched: Vec<Review> = self.reviews.read().await.values().filter(|r| r.product_id() == product_id).cloned().collect();
        match sort {
            ReviewSort::Newest => matched.sort_by_key(|r| (Reverse(r.created_at()), Reverse(r.id()))),
            ReviewSort::Oldest => matched.sort_by_key(|r| (r.created_at(), r.id())),
            ReviewSort::Highest => matched.sort_by_key(|r| (Reverse(r.rating()), Reverse(r.created_at()), Reverse(r.id()))),
            ReviewSort::Lowest => matched.sort_by_key(|r| (r.rating(), Reverse(r.created_at()), Reverse(r.id()))),
            ReviewSort::Helpful => matched.sort_by_key(|r| (Reverse(r.helpful()), Reverse(r.created_at()), Reverse(r.id()))),
        }
        Ok(paginate(matched, page))
    }

    async fn rating_distribution(&self, product_id: Uuid) -> Result<Vec<RatingCount>> {
        let mut counts: BTreeMap<u8, u64> = BTreeMap::new();
        for r in self.reviews.read().await.values().filter(|r| r.product_id() == product_id) {
            *counts.entry(r.rating().value()).or_default() += 1;
        }
        Ok(counts.into_iter().rev().map(|(rating, count)| RatingCount { rating, count }).collect())
    }

    async fn refresh_rating_summary(&self, product_id: Uuid) -> Result<RatingSummary> {
        if *self.fail_rating_refresh.read().await {
            return Err(Error::Storage("rating refresh unavailable".into()));
        }
        // Lock order is reviews, then products.
        let reviews = self.reviews.read().await;
        let summary = RatingSummary::from_ratings(reviews.values().filter(|r| r.product_id() == product_id).map(|r| r.rating()));
        let mut products = self.products.write().await;
        let product = products.get_mut(&product_id).ok_or_else(|| Error::NotFound("Product".into()))?;
        product.summary = summary;
        Ok(summary)
    }

    async fn rating_summary(&self, product_id: Uuid) -> Result<Option<RatingSummary>> {
        Ok(self.products.read().await.get(&product_id).map(|p| p.summary))
    }

    async fn rated_products(&self) -> Result<Vec<Uuid>> {
        let reviews = self.reviews.read().await;
        let products = self.products.read().await;
        let mut ids: Vec<Uuid> = reviews.values().map(|r| r.product_id())
            .chain(products.iter().filter(|(_, p)| p.summary.total_reviews > 0).map(|(id, _)| *id))
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }
}
