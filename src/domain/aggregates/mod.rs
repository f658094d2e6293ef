//! Aggregates module
pub mod order;
pub mod review;

pub use order::{LineItem, NewOrder, Order, OrderError, OrderStatus};
pub use review::{RatingSummary, Review, ReviewError};
