//! Order ledger: placement, operator acceptance and status tracking.

use crate::catalog::CatalogLookup;
use crate::domain::aggregates::{LineItem, NewOrder, Order, OrderStatus};
use crate::domain::value_objects::{CustomerInfo, OrderId, PaymentMethod, Pricing, Quantity};
use crate::identity::Identity;
use crate::publisher::EventPublisher;
use crate::storage::{OrderFilter, OrderStore, Page, PageRequest};
use crate::{Error, Result};
use chrono::{Duration, Utc};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

pub const CUSTOMER_PAGE_SIZE: u32 = 10;
pub const OPERATOR_PAGE_SIZE: u32 = 20;

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CustomerInfoInput {
    #[validate(length(min = 1, message = "name is required"))]
    pub name: String,
    #[validate(email(message = "a valid email is required"))]
    pub email: String,
    #[validate(length(min = 1, message = "phone is required"))]
    pub phone: String,
    #[validate(length(min = 1, message = "address is required"))]
    pub address: String,
    #[serde(default)]
    pub payment_method: PaymentMethod,
}

impl CustomerInfoInput {
    fn into_snapshot(self) -> Result<CustomerInfo> {
        let trimmed = Self {
            name: self.name.trim().to_string(), email: self.email.trim().to_string(),
            phone: self.phone.trim().to_string(), address: self.address.trim().to_string(),
            payment_method: self.payment_method,
        };
        trimmed.validate()?;
        Ok(CustomerInfo { name: trimmed.name, email: trimmed.email, phone: trimmed.phone, address: trimmed.address, payment_method: trimmed.payment_method })
    }
}

/// Cart line as sent by the client. `name` and `price` are echoed back from
/// the client's view of the catalog and never priced from.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemInput {
    pub product_id: String,
    pub quantity: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub price: Option<i64>,
}

impl OrderItemInput {
    fn label(&self) -> &str { self.name.as_deref().unwrap_or(&self.product_id) }
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderRequest {
    #[serde(default)]
    pub customer_info: Option<CustomerInfoInput>,
    #[serde(default)]
    pub items: Vec<OrderItemInput>,
    #[validate(length(max = 500, message = "notes must be at most 500 characters"))]
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub total: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub status: Option<String>,
    pub is_accepted: Option<bool>,
}

pub struct OrderLedger {
    orders: Arc<dyn OrderStore>,
    catalog: Arc<dyn CatalogLookup>,
    events: Arc<dyn EventPublisher>,
    pricing: Pricing,
    lead_time: Duration,
}

impl OrderLedger {
    pub fn new(orders: Arc<dyn OrderStore>, catalog: Arc<dyn CatalogLookup>, events: Arc<dyn EventPublisher>, pricing: Pricing, lead_time: Duration) -> Self {
        Self { orders, catalog, events, pricing, lead_time }
    }

    #[tracing::instrument(skip_all, fields(customer_id = %identity.id))]
    pub async fn place_order(&self, identity: &Identity, req: PlaceOrderRequest) -> Result<Order> {
        req.validate()?;
        let customer_info = req.customer_info.ok_or_else(|| Error::Validation("Missing required order information".into()))?.into_snapshot()?;
        if req.items.is_empty() { return Err(Error::Validation("Missing required order information".into())); }

        let mut items = Vec::with_capacity(req.items.len());
        for input in &req.items {
            items.push(self.snapshot_item(input).await?);
        }

        let new = NewOrder { customer_id: identity.id, customer_info, items, notes: req.notes.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()) };
        let mut order = Order::place(new, &self.pricing, self.lead_time, Utc::now())?;
        if let Some(claimed) = req.total.filter(|t| *t != order.total().amount()) {
            tracing::warn!(claimed, computed = order.total().amount(), "client total differs from server pricing");
        }
        let events = order.take_events();
        self.orders.insert_order(&order).await?;
        tracing::info!(order_id = %order.order_id(), total = %order.total(), "order placed");
        self.events.publish_all(events).await;
        Ok(order)
    }

    async fn snapshot_item(&self, input: &OrderItemInput) -> Result<LineItem> {
        let product_id = Uuid::parse_str(input.product_id.trim()).map_err(|_| Error::InvalidReference(format!("Invalid product ID for {}", input.label())))?;
        let quantity = u32::try_from(input.quantity).ok().map(Quantity::new).transpose()?
            .ok_or_else(|| Error::Validation(format!("Invalid quantity for {}", input.label())))?;
        let entry = self.catalog.resolve(product_id).await?
            .filter(|e| e.is_active)
            .ok_or_else(|| Error::InvalidReference(format!("Product {} not found", input.label())))?;
        if let Some(claimed) = input.price.filter(|p| *p != entry.price.amount()) {
            tracing::debug!(%product_id, claimed, catalog = entry.price.amount(), "ignoring client price");
        }
        Ok(LineItem { product_id, name: entry.name, price: entry.price, quantity, img: entry.img })
    }

    #[tracing::instrument(skip(self, identity))]
    pub async fn accept_order(&self, identity: &Identity, order_id: &str) -> Result<Order> {
        let operator_id = identity.require_operator()?;
        let mut order = self.orders.accept(&OrderId::parse(order_id), operator_id, Utc::now()).await?;
        tracing::info!(%operator_id, "order accepted");
        self.events.publish_all(order.take_events()).await;
        Ok(order)
    }

    #[tracing::instrument(skip(self, identity))]
    pub async fn update_status(&self, identity: &Identity, order_id: &str, status: &str) -> Result<Order> {
        identity.require_operator()?;
        let status: OrderStatus = status.parse()?;
        let (mut order, previous) = self.orders.update_status(&OrderId::parse(order_id), status, Utc::now()).await?;
        tracing::info!(from = %previous, to = %status, "order status updated");
        self.events.publish_all(order.take_events()).await;
        Ok(order)
    }

    pub async fn customer_orders(&self, identity: &Identity, query: &OrderListQuery) -> Result<Page<Order>> {
        let filter = OrderFilter { customer_id: Some(identity.id), ..OrderFilter::default() };
        self.orders.list_orders(&filter, PageRequest::new(query.page, query.limit, CUSTOMER_PAGE_SIZE)).await
    }

    /// Another customer's order reports `NotFound`.
    pub async fn customer_order(&self, identity: &Identity, order_id: &str) -> Result<Order> {
        self.orders.find_order(&OrderId::parse(order_id)).await?
            .filter(|o| o.customer_id() == identity.id)
            .ok_or_else(|| Error::NotFound("Order".into()))
    }

    pub async fn all_orders(&self, identity: &Identity, query: &OrderListQuery) -> Result<Page<Order>> {
        identity.require_operator()?;
        let status = query.status.as_deref().filter(|s| !s.is_empty()).map(str::parse::<OrderStatus>).transpose()?;
        let filter = OrderFilter { customer_id: None, status, is_accepted: query.is_accepted };
        self.orders.list_orders(&filter, PageRequest::new(query.page, query.limit, OPERATOR_PAGE_SIZE)).await
    }
}
