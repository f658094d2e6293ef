//! Domain events
use crate::domain::aggregates::OrderStatus;
use crate::domain::aggregates::RatingSummary;
use crate::domain::value_objects::{Money, OrderId, Rating};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "domain", content = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    Order(OrderEvent),
    Review(ReviewEvent),
}

impl DomainEvent {
    /// Subject suffix, e.g. `order.accepted`.
    pub fn subject(&self) -> String {
        match self {
            Self::Order(e) => format!("order.{}", e.name()),
            Self::Review(e) => format!("review.{}", e.name()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    Placed { order_id: OrderId, customer_id: Uuid, total: Money },
    Accepted { order_id: OrderId, operator_id: Uuid },
    StatusChanged { order_id: OrderId, from: OrderStatus, to: OrderStatus },
}

impl OrderEvent {
    fn name(&self) -> &'static str {
        match self {
            Self::Placed { .. } => "placed",
            Self::Accepted { .. } => "accepted",
            Self::StatusChanged { .. } => "status_changed",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReviewEvent {
    Submitted { review_id: Uuid, product_id: Uuid, rating: Rating },
    Updated { review_id: Uuid, product_id: Uuid, rating: Rating },
    Deleted { review_id: Uuid, product_id: Uuid },
    RatingRecomputed { product_id: Uuid, summary: RatingSummary },
}

impl ReviewEvent {
    fn name(&self) -> &'static str {
        match self {
            Self::Submitted { .. } => "submitted",
            Self::Updated { .. } => "updated",
            Self::Deleted { .. } => "deleted",
            Self::RatingRecomputed { .. } => "rating_recomputed",
        }
    }
}
