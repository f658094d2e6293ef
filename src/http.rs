//! HTTP surface: axum router, bearer authentication and error mapping.

use crate::domain::aggregates::{Order, Review};
use crate::identity::{bearer_credential, Identity, IdentityGate};
use crate::ledger::{OrderLedger, OrderListQuery, PlaceOrderRequest};
use crate::reviews::{ReviewAggregator, ReviewInput, ReviewListQuery};
use crate::storage::Page;
use crate::Error;
use axum::{
    async_trait,
    extract::{
        rejection::{JsonRejection, QueryRejection},
        FromRequest, FromRequestParts, Path, Query, State,
    },
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<OrderLedger>,
    pub reviews: Arc<ReviewAggregator>,
    pub identity: Arc<dyn IdentityGate>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(json!({"status": "healthy", "service": "thali-orders"})) }))
        .route("/api/orders", post(place_order))
        .route("/api/orders/user", get(customer_orders))
        .route("/api/orders/admin/all", get(all_orders))
        .route("/api/orders/admin/:order_id/accept", put(accept_order))
        .route("/api/orders/admin/:order_id/status", put(update_status))
        .route("/api/orders/:order_id", get(customer_order))
        .route("/api/reviews/product/:product_id", get(product_reviews).post(submit_review))
        .route("/api/reviews/:review_id", put(edit_review).delete(delete_review))
        .route("/api/reviews/:review_id/helpful", post(mark_helpful))
        .layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive()).with_state(state)
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::Validation(_) | Error::InvalidReference(_) | Error::AlreadyAccepted | Error::DuplicateReview | Error::InvalidStatus(_) => StatusCode::BAD_REQUEST,
            Error::Unauthenticated => StatusCode::UNAUTHORIZED,
            Error::Forbidden => StatusCode::FORBIDDEN,
            Error::NotFound(_) | Error::NotFoundOrUnauthorized => StatusCode::NOT_FOUND,
            Error::Storage(detail) => {
                tracing::error!(%detail, "request failed on storage");
                return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": "Server error"}))).into_response();
            }
        };
        (status, Json(json!({"error": self.to_string()}))).into_response()
    }
}

/// JSON request body; malformed or incomplete bodies surface as `Error::Validation`.
#[derive(FromRequest)]
#[from_request(via(Json), rejection(Error))]
pub struct ApiJson<T>(pub T);

/// Query string; unparseable parameters surface as `Error::Validation`.
#[derive(FromRequestParts)]
#[from_request(via(Query), rejection(Error))]
pub struct ApiQuery<T>(pub T);

impl From<JsonRejection> for Error {
    fn from(rejection: JsonRejection) -> Self {
        Error::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for Error {
    fn from(rejection: QueryRejection) -> Self {
        Error::Validation(rejection.body_text())
    }
}

/// Identity of the authenticated caller.
pub struct Caller(pub Identity);

#[async_trait]
impl FromRequestParts<AppState> for Caller {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts.headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
        let credential = bearer_credential(header)?;
        Ok(Caller(state.identity.authenticate(credential).await?))
    }
}

type ApiResult<T> = Result<T, Error>;

fn parse_id(raw: &str, what: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| Error::Validation(format!("Invalid {what} ID")))
}

fn order_page(page: Page<Order>) -> Value {
    json!({"orders": page.items, "totalPages": page.total_pages(), "currentPage": page.page, "total": page.total})
}

fn order_done(message: &str, order: Order) -> Json<Value> {
    Json(json!({"success": true, "message": message, "order": order}))
}

fn review_done(message: &str, review: Review) -> Json<Value> {
    Json(json!({"success": true, "message": message, "review": review}))
}

async fn place_order(State(s): State<AppState>, Caller(who): Caller, ApiJson(r): ApiJson<PlaceOrderRequest>) -> ApiResult<(StatusCode, Json<Value>)> {
    let order = s.ledger.place_order(&who, r).await?;
    Ok((StatusCode::CREATED, order_done("Order placed successfully", order)))
}

async fn customer_orders(State(s): State<AppState>, Caller(who): Caller, ApiQuery(q): ApiQuery<OrderListQuery>) -> ApiResult<Json<Value>> {
    Ok(Json(order_page(s.ledger.customer_orders(&who, &q).await?)))
}

async fn customer_order(State(s): State<AppState>, Caller(who): Caller, Path(order_id): Path<String>) -> ApiResult<Json<Value>> {
    let order = s.ledger.customer_order(&who, &order_id).await?;
    Ok(Json(json!({"order": order})))
}

async fn all_orders(State(s): State<AppState>, Caller(who): Caller, ApiQuery(q): ApiQuery<OrderListQuery>) -> ApiResult<Json<Value>> {
    Ok(Json(order_page(s.ledger.all_orders(&who, &q).await?)))
}

async fn accept_order(State(s): State<AppState>, Caller(who): Caller, Path(order_id): Path<String>) -> ApiResult<Json<Value>> {
    Ok(order_done("Order accepted successfully", s.ledger.accept_order(&who, &order_id).await?))
}

#[derive(Debug, Deserialize)]
struct StatusBody {
    #[serde(default)]
    status: String,
}

async fn update_status(State(s): State<AppState>, Caller(who): Caller, Path(order_id): Path<String>, ApiJson(b): ApiJson<StatusBody>) -> ApiResult<Json<Value>> {
    Ok(order_done("Order status updated successfully", s.ledger.update_status(&who, &order_id, &b.status).await?))
}

async fn product_reviews(State(s): State<AppState>, Path(product_id): Path<String>, ApiQuery(q): ApiQuery<ReviewListQuery>) -> ApiResult<Json<Value>> {
    let listing = s.reviews.product_reviews(parse_id(&product_id, "product")?, &q).await?;
    Ok(Json(json!({
        "reviews": listing.reviews.items,
        "totalPages": listing.reviews.total_pages(),
        "currentPage": listing.reviews.page,
        "total": listing.reviews.total,
        "ratingDistribution": listing.rating_distribution,
        "averageRating": listing.summary.average_rating,
        "totalReviews": listing.summary.total_reviews,
    })))
}

async fn submit_review(State(s): State<AppState>, Caller(who): Caller, Path(product_id): Path<String>, ApiJson(r): ApiJson<ReviewInput>) -> ApiResult<(StatusCode, Json<Value>)> {
    let review = s.reviews.submit(&who, parse_id(&product_id, "product")?, r).await?;
    Ok((StatusCode::CREATED, review_done("Review added successfully", review)))
}

async fn edit_review(State(s): State<AppState>, Caller(who): Caller, Path(review_id): Path<String>, ApiJson(r): ApiJson<ReviewInput>) -> ApiResult<Json<Value>> {
    Ok(review_done("Review updated successfully", s.reviews.edit(&who, parse_id(&review_id, "review")?, r).await?))
}

async fn delete_review(State(s): State<AppState>, Caller(who): Caller, Path(review_id): Path<String>) -> ApiResult<Json<Value>> {
    s.reviews.delete(&who, parse_id(&review_id, "review")?).await?;
    Ok(Json(json!({"success": true, "message": "Review deleted successfully"})))
}

async fn mark_helpful(State(s): State<AppState>, Caller(who): Caller, Path(review_id): Path<String>) -> ApiResult<Json<Value>> {
    let helpful = s.reviews.mark_helpful(&who, parse_id(&review_id, "review")?).await?;
    Ok(Json(json!({"success": true, "message": "Review marked as helpful", "helpful": helpful})))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogEntry;
    use crate::domain::value_objects::{Money, Pricing};
    use crate::identity::{Role, StaticIdentityGate};
    use crate::publisher::NoopPublisher;
    use crate::storage::MemoryStore;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use chrono::Duration;
    use tower::ServiceExt;

    struct Harness { app: Router, dal: Uuid, operator: Identity }

    async fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let dal = Uuid::new_v4();
        store.add_product(CatalogEntry { product_id: dal, name: "Dal Bhat".into(), price: Money::new(100), img: "dal.jpg".into(), is_active: true }).await;
        let events = Arc::new(NoopPublisher);
        let operator = Identity { id: Uuid::new_v4(), role: Role::Operator, name: "Admin".into() };
        let gate = StaticIdentityGate::new()
            .with("cust", Identity { id: Uuid::new_v4(), role: Role::Customer, name: "Sita".into() })
            .with("op", operator.clone());
        let state = AppState {
            ledger: Arc::new(OrderLedger::new(store.clone(), store.clone(), events.clone(), Pricing::default(), Duration::minutes(30))),
            reviews: Arc::new(ReviewAggregator::new(store.clone(), store.clone(), events)),
            identity: Arc::new(gate),
        };
        Harness { app: router(state), dal, operator }
    }

    async fn call(app: &Router, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(t) = token { req = req.header(AUTHORIZATION, format!("Bearer {t}")); }
        let req = match body {
            Some(b) => req.header("content-type", "application/json").body(Body::from(b.to_string())).unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };
        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn order_body(product_id: Uuid) -> Value {
        json!({
            "customerInfo": {"name": "Sita", "email": "sita@example.com", "phone": "9800000000", "address": "Lalitpur"},
            "items": [{"productId": product_id, "name": "Dal Bhat", "quantity": 2, "price": 1}],
            "subtotal": 2, "deliveryFee": 0, "serviceCharge": 0, "total": 2
        })
    }

    #[tokio::test]
    async fn test_order_lifecycle_over_http() {
        let h = harness().await;
        let (status, body) = call(&h.app, "POST", "/api/orders", Some("cust"), Some(order_body(h.dal))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["order"]["subtotal"], 200);
        assert_eq!(body["order"]["total"], 270);
        assert_eq!(body["order"]["status"], "pending");
        let order_id = body["order"]["orderId"].as_str().unwrap().to_string();

        let (status, body) = call(&h.app, "GET", "/api/orders/user", Some("cust"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 1);

        let (status, _) = call(&h.app, "PUT", &format!("/api/orders/admin/{order_id}/accept"), Some("cust"), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = call(&h.app, "PUT", &format!("/api/orders/admin/{order_id}/accept"), Some("op"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["order"]["status"], "confirmed");
        assert_eq!(body["order"]["acceptedBy"], h.operator.id.to_string());

        let (status, body) = call(&h.app, "PUT", &format!("/api/orders/admin/{order_id}/accept"), Some("op"), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Order already accepted");

        let (status, _) = call(&h.app, "PUT", &format!("/api/orders/admin/{order_id}/status"), Some("op"), Some(json!({"status": "teleported"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(&h.app, "PUT", &format!("/api/orders/admin/{order_id}/status"), Some("op"), Some(json!({"status": "on_the_way"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["order"]["status"], "on_the_way");

        let (status, body) = call(&h.app, "GET", "/api/orders/admin/all?isAccepted=true", Some("op"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["orders"][0]["orderId"], order_id);
    }

    #[tokio::test]
    async fn test_authentication_required() {
        let h = harness().await;
        let (status, body) = call(&h.app, "POST", "/api/orders", None, Some(order_body(h.dal))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body["error"].is_string());
        let (status, _) = call(&h.app, "GET", "/api/orders/user", Some("forged"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_unknown_product_is_bad_request() {
        let h = harness().await;
        let (status, _) = call(&h.app, "POST", "/api/orders", Some("cust"), Some(order_body(Uuid::new_v4()))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_malformed_input_is_validation_error() {
        let h = harness().await;
        let uri = format!("/api/reviews/product/{}", h.dal);
        for body in [json!({"rating": 4}), json!({"rating": 4.5, "comment": "Tasty"}), json!({"rating": "five", "comment": "Tasty"})] {
            let (status, res) = call(&h.app, "POST", &uri, Some("cust"), Some(body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert!(res["error"].is_string());
        }

        let mut no_quantity = order_body(h.dal);
        no_quantity["items"][0].as_object_mut().unwrap().remove("quantity");
        let mut no_address = order_body(h.dal);
        no_address["customerInfo"].as_object_mut().unwrap().remove("address");
        for body in [no_quantity, no_address] {
            let (status, res) = call(&h.app, "POST", "/api/orders", Some("cust"), Some(body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert!(res["error"].is_string());
        }

        let (status, res) = call(&h.app, "GET", "/api/orders/user?page=first", Some("cust"), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(res["error"].is_string());
        let (status, _) = call(&h.app, "GET", &format!("{uri}?sort=random"), None, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_review_flow_over_http() {
        let h = harness().await;
        let uri = format!("/api/reviews/product/{}", h.dal);
        let (status, body) = call(&h.app, "POST", &uri, Some("cust"), Some(json!({"rating": 4, "comment": "Great"}))).await;
        assert_eq!(status, StatusCode::CREATED);
        let review_id = body["review"]["id"].as_str().unwrap().to_string();

        let (status, _) = call(&h.app, "POST", &uri, Some("cust"), Some(json!({"rating": 5, "comment": "Again"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(&h.app, "PUT", &format!("/api/reviews/{review_id}"), Some("op"), Some(json!({"rating": 1, "comment": "Hijack"}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = call(&h.app, "POST", &format!("/api/reviews/{review_id}/helpful"), Some("op"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["helpful"], 1);

        let (status, body) = call(&h.app, "GET", &uri, None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["averageRating"], 4.0);
        assert_eq!(body["totalReviews"], 1);
        assert_eq!(body["ratingDistribution"][0]["rating"], 4);

        let (status, _) = call(&h.app, "DELETE", &format!("/api/reviews/{review_id}"), Some("cust"), None).await;
        assert_eq!(status, StatusCode::OK);
        let (_, body) = call(&h.app, "GET", &uri, None, None).await;
        assert_eq!(body["totalReviews"], 0);

        let (status, _) = call(&h.app, "GET", "/api/reviews/product/not-a-uuid", None, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
