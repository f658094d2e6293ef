//! Postgres store. Snapshots (customer info, line items) live in JSONB columns.

use super::{OrderFilter, OrderStore, Page, PageRequest, RatingCount, ReviewSort, ReviewStore};
use crate::domain::aggregates::{LineItem, Order, OrderStatus, RatingSummary, Review};
use crate::domain::value_objects::{CustomerInfo, Money, OrderId, Rating};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Clone)]
pub struct PgStore { db: PgPool }

impl PgStore {
    pub fn new(db: PgPool) -> Self { Self { db } }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    order_id: String, customer_id: Uuid, customer_info: Json<CustomerInfo>, items: Json<Vec<LineItem>>,
    subtotal: i64, delivery_fee: i64, service_charge: i64, total: i64, status: String, is_accepted: bool,
    accepted_at: Option<DateTime<Utc>>, accepted_by: Option<Uuid>, estimated_delivery: Option<DateTime<Utc>>,
    actual_delivery: Option<DateTime<Utc>>, notes: Option<String>, created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = Error;
    fn try_from(r: OrderRow) -> Result<Self> {
        let status: OrderStatus = r.status.parse().map_err(|_| Error::Storage(format!("order {} has unknown status {:?}", r.order_id, r.status)))?;
        Ok(Order {
            order_id: OrderId::parse(r.order_id), customer_id: r.customer_id, customer_info: r.customer_info.0, items: r.items.0,
            subtotal: Money::new(r.subtotal), delivery_fee: Money::new(r.delivery_fee), service_charge: Money::new(r.service_charge),
            total: Money::new(r.total), status, is_accepted: r.is_accepted, accepted_at: r.accepted_at, accepted_by: r.accepted_by,
            estimated_delivery: r.estimated_delivery, actual_delivery: r.actual_delivery, notes: r.notes,
            created_at: r.created_at, updated_at: r.updated_at, events: Vec::new(),
        })
    }
}

#[derive(sqlx::FromRow)]
struct ReviewRow {
    id: Uuid, product_id: Uuid, reviewer_id: Uuid, reviewer_name: String, rating: i16, comment: String,
    helpful: i32, created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
}

fn stored_rating(value: i16) -> Result<Rating> {
    u8::try_from(value).ok().and_then(|v| Rating::new(v).ok()).ok_or_else(|| Error::Storage(format!("stored rating {value} out of range")))
}

impl TryFrom<ReviewRow> for Review {
    type Error = Error;
    fn try_from(r: ReviewRow) -> Result<Self> {
        Ok(Review {
            id: r.id, product_id: r.product_id, reviewer_id: r.reviewer_id, reviewer_name: r.reviewer_name,
            rating: stored_rating(r.rating)?, comment: r.comment, helpful: u32::try_from(r.helpful).unwrap_or(0),
            created_at: r.created_at, updated_at: r.updated_at, events: Vec::new(),
        })
    }
}

const ORDER_FILTER: &str = "($1::uuid IS NULL OR customer_id = $1) AND ($2::text IS NULL OR status = $2) AND ($3::boolean IS NULL OR is_accepted = $3)";

#[async_trait]
impl OrderStore for PgStore {
    async fn insert_order(&self, o: &Order) -> Result<()> {
        sqlx::query("INSERT INTO orders (order_id, customer_id, customer_info, items, subtotal, delivery_fee, service_charge, total, status, is_accepted, accepted_at, accepted_by, estimated_delivery, actual_delivery, notes, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)")
            .bind(o.order_id.as_str()).bind(o.customer_id).bind(Json(&o.customer_info)).bind(Json(&o.items))
            .bind(o.subtotal.amount()).bind(o.delivery_fee.amount()).bind(o.service_charge.amount()).bind(o.total.amount())
            .bind(o.status.as_str()).bind(o.is_accepted).bind(o.accepted_at).bind(o.accepted_by)
            .bind(o.estimated_delivery).bind(o.actual_delivery).bind(&o.notes).bind(o.created_at).bind(o.updated_at)
            .execute(&self.db).await?;
        Ok(())
    }

    async fn find_order(&self, order_id: &OrderId) -> Result<Option<Order>> {
        sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE order_id = $1")
            .bind(order_id.as_str()).fetch_optional(&self.db).await?.map(Order::try_from).transpose()
    }

    async fn accept(&self, order_id: &OrderId, operator_id: Uuid, now: DateTime<Utc>) -> Result<Order> {
        let mut tx = self.db.begin().await?;
        let row = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE order_id = $1 FOR UPDATE")
            .bind(order_id.as_str()).fetch_optional(&mut *tx).await?.ok_or_else(|| Error::NotFound("Order".into()))?;
        let mut order = Order::try_from(row)?;
        order.accept(operator_id, now)?;
        let updated = sqlx::query("UPDATE orders SET is_accepted = TRUE, accepted_at = $2, accepted_by = $3, status = $4, updated_at = $2 WHERE order_id = $1 AND is_accepted = FALSE")
            .bind(order_id.as_str()).bind(now).bind(operator_id).bind(order.status.as_str())
            .execute(&mut *tx).await?;
        if updated.rows_affected() == 0 { return Err(Error::AlreadyAccepted); }
        tx.commit().await?;
        Ok(order)
    }

    async fn update_status(&self, order_id: &OrderId, status: OrderStatus, now: DateTime<Utc>) -> Result<(Order, OrderStatus)> {
        let mut tx = self.db.begin().await?;
        let row = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE order_id = $1 FOR UPDATE")
            .bind(order_id.as_str()).fetch_optional(&mut *tx).await?.ok_or_else(|| Error::NotFound("Order".into()))?;
        let mut order = Order::try_from(row)?;
        let previous = order.set_status(status, now)?;
        sqlx::query("UPDATE orders SET status = $2, actual_delivery = $3, updated_at = $4 WHERE order_id = $1")
            .bind(order_id.as_str()).bind(order.status.as_str()).bind(order.actual_delivery).bind(order.updated_at)
            .execute(&mut *tx).await?;
        tx.commit().await?;
        Ok((order, previous))
    }

    async fn list_orders(&self, filter: &OrderFilter, page: PageRequest) -> Result<Page<Order>> {
        let status = filter.status.map(|s| s.as_str());
        let rows = sqlx::query_as::<_, OrderRow>(&format!("SELECT * FROM orders WHERE {ORDER_FILTER} ORDER BY created_at DESC, order_id DESC LIMIT $4 OFFSET $5"))
            .bind(filter.customer_id).bind(status).bind(filter.is_accepted)
            .bind(i64::from(page.limit)).bind(page.offset() as i64).fetch_all(&self.db).await?;
        let (total,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM orders WHERE {ORDER_FILTER}"))
            .bind(filter.customer_id).bind(status).bind(filter.is_accepted).fetch_one(&self.db).await?;
        let items = rows.into_iter().map(Order::try_from).collect::<Result<Vec<_>>>()?;
        Ok(Page { items, total: total.max(0) as u64, page: page.page, limit: page.limit })
    }
}

fn review_order_by(sort: ReviewSort) -> &'static str {
    match sort {
        ReviewSort::Newest => "created_at DESC, id DESC",
        ReviewSort::Oldest => "created_at ASC, id ASC",
        ReviewSort::Highest => "rating DESC, created_at DESC, id DESC",
        ReviewSort::Lowest => "rating ASC, created_at DESC, id DESC",
        ReviewSort::Helpful => "helpful DESC, created_at DESC, id DESC",
    }
}

#[async_trait]
impl ReviewStore for PgStore {
    async fn insert_review(&self, r: &Review) -> Result<()> {
        let inserted = sqlx::query("INSERT INTO reviews (id, product_id, reviewer_id, reviewer_name, rating, comment, helpful, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) ON CONFLICT (product_id, reviewer_id) DO NOTHING")
            .bind(r.id).bind(r.product_id).bind(r.reviewer_id).bind(&r.reviewer_name).bind(i16::from(r.rating.value()))
            .bind(&r.comment).bind(i32::try_from(r.helpful).unwrap_or(i32::MAX)).bind(r.created_at).bind(r.updated_at)
            .execute(&self.db).await?;
        if inserted.rows_affected() == 0 { return Err(Error::DuplicateReview); }
        Ok(())
    }

    async fn update_by_author(&self, review_id: Uuid, author_id: Uuid, rating: Rating, comment: &str, now: DateTime<Utc>) -> Result<Review> {
        let mut tx = self.db.begin().await?;
        let row = sqlx::query_as::<_, ReviewRow>("SELECT * FROM reviews WHERE id = $1 AND reviewer_id = $2 FOR UPDATE")
            .bind(review_id).bind(author_id).fetch_optional(&mut *tx).await?.ok_or(Error::NotFoundOrUnauthorized)?;
        let mut review = Review::try_from(row)?;
        review.revise(rating, comment, now)?;
        sqlx::query("UPDATE reviews SET rating = $2, comment = $3, updated_at = $4 WHERE id = $1")
            .bind(review_id).bind(i16::from(review.rating.value())).bind(&review.comment).bind(review.updated_at)
            .execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(review)
    }

    async fn delete_by_author(&self, review_id: Uuid, author_id: Uuid) -> Result<Review> {
        let row = sqlx::query_as::<_, ReviewRow>("DELETE FROM reviews WHERE id = $1 AND reviewer_id = $2 RETURNING *")
            .bind(review_id).bind(author_id).fetch_optional(&self.db).await?.ok_or(Error::NotFoundOrUnauthorized)?;
        let mut review = Review::try_from(row)?;
        review.retract();
        Ok(review)
    }

    async fn increment_helpful(&self, review_id: Uuid) -> Result<Review> {
        sqlx::query_as::<_, ReviewRow>("UPDATE reviews SET helpful = helpful + 1 WHERE id = $1 RETURNING *")
            .bind(review_id).fetch_optional(&self.db).await?.ok_or_else(|| Error::NotFound("Review".into()))?.try_into()
    }

    async fn list_for_product(&self, product_id: Uuid, sort: ReviewSort, page: PageRequest) -> Result<Page<Review>> {
        let rows = sqlx::query_as::<_, ReviewRow>(&format!("SELECT * FROM reviews WHERE product_id = $1 ORDER BY {} LIMIT $2 OFFSET $3", review_order_by(sort)))
            .bind(product_id).bind(i64::from(page.limit)).bind(page.offset() as i64).fetch_all(&self.db).await?;
        let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM reviews WHERE product_id = $1").bind(product_id).fetch_one(&self.db).await?;
        let items = rows.into_iter().map(Review::try_from).collect::<Result<Vec<_>>>()?;
        Ok(Page { items, total: total.max(0) as u64, page: page.page, limit: page.limit })
    }

    async fn rating_distribution(&self, product_id: Uuid) -> Result<Vec<RatingCount>> {
        let rows: Vec<(i16, i64)> = sqlx::query_as("SELECT rating, COUNT(*) FROM reviews WHERE product_id = $1 GROUP BY rating ORDER BY rating DESC")
            .bind(product_id).fetch_all(&self.db).await?;
        rows.into_iter().map(|(rating, count)| Ok(RatingCount { rating: stored_rating(rating)?.value(), count: count.max(0) as u64 })).collect()
    }

    async fn refresh_rating_summary(&self, product_id: Uuid) -> Result<RatingSummary> {
        let mut tx = self.db.begin().await?;
        // Row lock serializes refreshes of the same product.
        sqlx::query("SELECT id FROM products WHERE id = $1 FOR UPDATE")
            .bind(product_id).fetch_optional(&mut *tx).await?.ok_or_else(|| Error::NotFound("Product".into()))?;
        let ratings: Vec<(i16,)> = sqlx::query_as("SELECT rating FROM reviews WHERE product_id = $1")
            .bind(product_id).fetch_all(&mut *tx).await?;
        let ratings = ratings.into_iter().map(|(r,)| stored_rating(r)).collect::<Result<Vec<_>>>()?;
        let summary = RatingSummary::from_ratings(ratings);
        sqlx::query("UPDATE products SET average_rating = $2, total_reviews = $3, updated_at = NOW() WHERE id = $1")
            .bind(product_id).bind(summary.average_rating).bind(i32::try_from(summary.total_reviews).unwrap_or(i32::MAX))
            .execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(summary)
    }

    async fn rating_summary(&self, product_id: Uuid) -> Result<Option<RatingSummary>> {
        let row: Option<(f64, i32)> = sqlx::query_as("SELECT average_rating, total_reviews FROM products WHERE id = $1")
            .bind(product_id).fetch_optional(&self.db).await?;
        Ok(row.map(|(average_rating, total)| RatingSummary { average_rating, total_reviews: u32::try_from(total).unwrap_or(0) }))
    }

    async fn rated_products(&self) -> Result<Vec<Uuid>> {
        let rows: Vec<(Uuid,)> = sqlx::query_as("SELECT id FROM products WHERE total_reviews > 0 UNION SELECT DISTINCT product_id FROM reviews")
            .fetch_all(&self.db).await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::NewOrder;
    use crate::domain::value_objects::{PaymentMethod, Pricing, Quantity};
    use sqlx::postgres::PgPoolOptions;

    /// Connects to `DATABASE_URL` and migrates; `None` skips the test when no database is configured.
    async fn store() -> Option<(PgStore, PgPool)> {
        let url = std::env::var("DATABASE_URL").ok()?;
        let db = PgPoolOptions::new().max_connections(5).connect(&url).await.unwrap();
        sqlx::migrate!("./migrations").run(&db).await.unwrap();
        Some((PgStore::new(db.clone()), db))
    }

    async fn product(db: &PgPool) -> Uuid {
        let id = Uuid::new_v4();
        sqlx::query("INSERT INTO products (id, name, price, img) VALUES ($1, 'Dal Bhat', 100, 'dal.jpg')").bind(id).execute(db).await.unwrap();
        id
    }

    fn order(product_id: Uuid) -> Order {
        let info = CustomerInfo { name: "Sita".into(), email: "sita@example.com".into(), phone: "9800000000".into(), address: "Lalitpur".into(), payment_method: PaymentMethod::Cod };
        let item = LineItem { product_id, name: "Dal Bhat".into(), price: Money::new(100), quantity: Quantity::new(2).unwrap(), img: "dal.jpg".into() };
        let new = NewOrder { customer_id: Uuid::new_v4(), customer_info: info, items: vec![item], notes: None };
        Order::place(new, &Pricing::default(), chrono::Duration::minutes(30), Utc::now()).unwrap()
    }

    #[tokio::test]
    async fn test_concurrent_accepts_single_winner() {
        let Some((store, db)) = store().await else { return };
        let placed = order(product(&db).await);
        store.insert_order(&placed).await.unwrap();

        let (a, b) = tokio::join!(
            store.accept(placed.order_id(), Uuid::new_v4(), Utc::now()),
            store.accept(placed.order_id(), Uuid::new_v4(), Utc::now()),
        );
        let winners: Vec<_> = [a, b].into_iter().filter_map(|r| match r {
            Ok(order) => Some(order),
            Err(e) => { assert!(matches!(e, Error::AlreadyAccepted), "unexpected {e:?}"); None }
        }).collect();
        assert_eq!(winners.len(), 1);

        let stored = store.find_order(placed.order_id()).await.unwrap().unwrap();
        assert!(stored.is_accepted());
        assert_eq!(stored.status(), OrderStatus::Confirmed);
        assert_eq!(stored.accepted_by(), winners[0].accepted_by());
        assert!(matches!(store.accept(&OrderId::parse("ORD-missing"), Uuid::new_v4(), Utc::now()).await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_concurrent_duplicate_reviews_single_winner() {
        let Some((store, db)) = store().await else { return };
        let product_id = product(&db).await;
        let reviewer = Uuid::new_v4();
        let first = Review::create(product_id, reviewer, "Sita", Rating::new(4).unwrap(), "Great", Utc::now()).unwrap();
        let second = Review::create(product_id, reviewer, "Sita", Rating::new(2).unwrap(), "Changed my mind", Utc::now()).unwrap();

        let (a, b) = tokio::join!(store.insert_review(&first), store.insert_review(&second));
        assert_eq!([&a, &b].iter().filter(|r| r.is_ok()).count(), 1);
        assert!([a, b].into_iter().any(|r| matches!(r, Err(Error::DuplicateReview))));

        let summary = store.refresh_rating_summary(product_id).await.unwrap();
        assert_eq!(summary.total_reviews, 1);
        assert_eq!(store.rating_summary(product_id).await.unwrap(), Some(summary));
    }
}
