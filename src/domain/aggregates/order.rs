//! Order Aggregate

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use crate::domain::events::{DomainEvent, OrderEvent};
use crate::domain::value_objects::{CustomerInfo, Money, OrderId, Pricing, Quantity};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub(crate) order_id: OrderId,
    #[serde(rename = "userId")]
    pub(crate) customer_id: Uuid,
    pub(crate) customer_info: CustomerInfo,
    pub(crate) items: Vec<LineItem>,
    pub(crate) subtotal: Money,
    pub(crate) delivery_fee: Money,
    pub(crate) service_charge: Money,
    pub(crate) total: Money,
    pub(crate) status: OrderStatus,
    pub(crate) is_accepted: bool,
    pub(crate) accepted_at: Option<DateTime<Utc>>,
    pub(crate) accepted_by: Option<Uuid>,
    pub(crate) estimated_delivery: Option<DateTime<Utc>>,
    pub(crate) actual_delivery: Option<DateTime<Utc>>,
    pub(crate) notes: Option<String>,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub(crate) events: Vec<DomainEvent>,
}

/// Catalog snapshot of one ordered product.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub product_id: Uuid,
    pub name: String,
    pub price: Money,
    pub quantity: Quantity,
    pub img: String,
}

impl LineItem {
    pub fn line_total(&self) -> Money { self.price.multiply(self.quantity) }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Confirmed,
    Preparing,
    OnTheWay,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [
        Self::Pending, Self::Confirmed, Self::Preparing, Self::OnTheWay, Self::Delivered, Self::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Preparing => "preparing",
            Self::OnTheWay => "on_the_way",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }

    /// Operators may move an order between any two statuses, including
    /// backwards, so they can correct mistakes.
    pub fn can_transition_to(&self, _next: OrderStatus) -> bool { true }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for OrderStatus {
    type Err = OrderError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|st| st.as_str() == s).ok_or_else(|| OrderError::InvalidStatus(s.to_string()))
    }
}

/// Everything needed to open a new order; line items are already snapshotted.
#[derive(Clone, Debug)]
pub struct NewOrder {
    pub customer_id: Uuid,
    pub customer_info: CustomerInfo,
    pub items: Vec<LineItem>,
    pub notes: Option<String>,
}

impl Order {
    pub fn place(new: NewOrder, pricing: &Pricing, lead_time: Duration, now: DateTime<Utc>) -> Result<Self, OrderError> {
        if new.items.is_empty() { return Err(OrderError::NoItems); }
        let subtotal = new.items.iter().fold(Money::ZERO, |acc, i| acc.add(i.line_total()));
        let delivery_fee = pricing.delivery_fee;
        let service_charge = pricing.service_charge(subtotal);
        let mut order = Self {
            order_id: OrderId::generate(now), customer_id: new.customer_id, customer_info: new.customer_info,
            items: new.items, subtotal, delivery_fee, service_charge,
            total: subtotal.add(delivery_fee).add(service_charge),
            status: OrderStatus::Pending, is_accepted: false, accepted_at: None, accepted_by: None,
            estimated_delivery: Some(now + lead_time), actual_delivery: None,
            notes: new.notes, created_at: now, updated_at: now, events: vec![],
        };
        order.raise_event(OrderEvent::Placed { order_id: order.order_id.clone(), customer_id: order.customer_id, total: order.total });
        Ok(order)
    }

    pub fn order_id(&self) -> &OrderId { &self.order_id }
    pub fn customer_id(&self) -> Uuid { self.customer_id }
    pub fn customer_info(&self) -> &CustomerInfo { &self.customer_info }
    pub fn items(&self) -> &[LineItem] { &self.items }
    pub fn subtotal(&self) -> Money { self.subtotal }
    pub fn delivery_fee(&self) -> Money { self.delivery_fee }
    pub fn service_charge(&self) -> Money { self.service_charge }
    pub fn total(&self) -> Money { self.total }
    pub fn status(&self) -> OrderStatus { self.status }
    pub fn is_accepted(&self) -> bool { self.is_accepted }
    pub fn accepted_at(&self) -> Option<DateTime<Utc>> { self.accepted_at }
    pub fn accepted_by(&self) -> Option<Uuid> { self.accepted_by }
    pub fn estimated_delivery(&self) -> Option<DateTime<Utc>> { self.estimated_delivery }
    pub fn actual_delivery(&self) -> Option<DateTime<Utc>> { self.actual_delivery }
    pub fn notes(&self) -> Option<&str> { self.notes.as_deref() }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }

    /// Acceptance always lands the order in `confirmed`, whatever status it had.
    pub fn accept(&mut self, operator_id: Uuid, now: DateTime<Utc>) -> Result<(), OrderError> {
        if self.is_accepted { return Err(OrderError::AlreadyAccepted); }
        self.is_accepted = true;
        self.accepted_at = Some(now);
        self.accepted_by = Some(operator_id);
        self.status = OrderStatus::Confirmed;
        self.updated_at = now;
        self.raise_event(OrderEvent::Accepted { order_id: self.order_id.clone(), operator_id });
        Ok(())
    }

    /// Returns the previous status. Repeating `delivered` restamps `actual_delivery`.
    pub fn set_status(&mut self, status: OrderStatus, now: DateTime<Utc>) -> Result<OrderStatus, OrderError> {
        let previous = self.status;
        if !previous.can_transition_to(status) {
            return Err(OrderError::TransitionNotAllowed { from: previous, to: status });
        }
        self.status = status;
        if status == OrderStatus::Delivered { self.actual_delivery = Some(now); }
        self.updated_at = now;
        self.raise_event(OrderEvent::StatusChanged { order_id: self.order_id.clone(), from: previous, to: status });
        Ok(previous)
    }

    /// Drains the events raised since the last call.
    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: OrderEvent) { self.events.push(DomainEvent::Order(e)); }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrderError {
    #[error("order must contain at least one item")]
    NoItems,
    #[error("invalid status: {0}")]
    InvalidStatus(String),
    #[error("order already accepted")]
    AlreadyAccepted,
    #[error("cannot move order from {from} to {to}")]
    TransitionNotAllowed { from: OrderStatus, to: OrderStatus },
}
