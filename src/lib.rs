//! Thali Orders
//!
//! Order lifecycle and rating aggregation for a food-ordering backend.
//!
//! ## Features
//! - Order placement from catalog snapshots with server-side pricing
//! - Operator acceptance and delivery status tracking
//! - Per-product reviews with an always-recomputed rating summary
//! - Domain events over NATS

pub mod catalog;
pub mod config;
pub mod domain;
pub mod http;
pub mod identity;
pub mod ledger;
pub mod publisher;
pub mod reviews;
pub mod storage;

use domain::aggregates::{OrderError, ReviewError};
use domain::value_objects::{QuantityError, RatingError};
use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    InvalidReference(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Review not found or unauthorized")]
    NotFoundOrUnauthorized,

    #[error("Order already accepted")]
    AlreadyAccepted,

    #[error("You have already reviewed this product")]
    DuplicateReview,

    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    #[error("Authentication required")]
    Unauthenticated,

    #[error("Operator access required")]
    Forbidden,

    #[error("Storage error: {0}")]
    Storage(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<OrderError> for Error {
    fn from(e: OrderError) -> Self {
        match e {
            OrderError::AlreadyAccepted => Error::AlreadyAccepted,
            OrderError::InvalidStatus(s) => Error::InvalidStatus(s),
            OrderError::NoItems | OrderError::TransitionNotAllowed { .. } => Error::Validation(e.to_string()),
        }
    }
}

impl From<ReviewError> for Error {
    fn from(e: ReviewError) -> Self { Error::Validation(e.to_string()) }
}

impl From<RatingError> for Error {
    fn from(e: RatingError) -> Self { Error::Validation(e.to_string()) }
}

impl From<QuantityError> for Error {
    fn from(e: QuantityError) -> Self { Error::Validation(e.to_string()) }
}

impl From<validator::ValidationErrors> for Error {
    fn from(e: validator::ValidationErrors) -> Self { Error::Validation(e.to_string()) }
}

impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self { Error::Storage(e.to_string()) }
}
