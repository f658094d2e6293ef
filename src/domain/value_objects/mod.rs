//! Value Objects for orders and reviews

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Externally visible order identifier, `ORD-<millis>-<base36 suffix>`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(String);

impl OrderId {
    const SUFFIX_LEN: usize = 9;

    pub fn generate(now: DateTime<Utc>) -> Self {
        const ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
        let mut entropy = Uuid::new_v4().as_u128();
        let mut suffix = String::with_capacity(Self::SUFFIX_LEN);
        for _ in 0..Self::SUFFIX_LEN {
            suffix.push(ALPHABET[(entropy % 36) as usize] as char);
            entropy /= 36;
        }
        Self(format!("ORD-{}-{}", now.timestamp_millis(), suffix))
    }

    /// Wraps an identifier received from a caller or read back from storage.
    pub fn parse(value: impl Into<String>) -> Self { Self(value.into()) }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

/// Money in the smallest currency unit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub fn new(minor_units: i64) -> Self { Self(minor_units) }
    pub fn amount(&self) -> i64 { self.0 }
    pub fn add(&self, other: Money) -> Money { Money(self.0.saturating_add(other.0)) }
    pub fn multiply(&self, qty: Quantity) -> Money { Money(self.0.saturating_mul(i64::from(qty.value()))) }

    /// `percent` of this amount, rounded half-up to the nearest unit.
    pub fn percentage(&self, percent: u32) -> Money {
        let scaled = self.0.saturating_mul(i64::from(percent));
        Money((scaled + 50).div_euclid(100))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

/// Ordered quantity of one line item, never zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Quantity(u32);

impl Quantity {
    pub fn new(value: u32) -> Result<Self, QuantityError> {
        if value == 0 { return Err(QuantityError::Zero); }
        Ok(Self(value))
    }
    pub fn value(&self) -> u32 { self.0 }
}

impl TryFrom<u32> for Quantity {
    type Error = QuantityError;
    fn try_from(value: u32) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<Quantity> for u32 {
    fn from(q: Quantity) -> u32 { q.0 }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QuantityError {
    #[error("quantity must be at least 1")]
    Zero,
}

/// Star rating between 1 and 5 inclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Rating(u8);

impl Rating {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub fn new(value: u8) -> Result<Self, RatingError> {
        if !(Self::MIN..=Self::MAX).contains(&value) { return Err(RatingError::OutOfRange(value)); }
        Ok(Self(value))
    }
    pub fn value(&self) -> u8 { self.0 }
}

impl TryFrom<u8> for Rating {
    type Error = RatingError;
    fn try_from(value: u8) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<Rating> for u8 {
    fn from(r: Rating) -> u8 { r.0 }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RatingError {
    #[error("rating must be between 1 and 5, got {0}")]
    OutOfRange(u8),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    #[default]
    Cod,
    Online,
}

/// Delivery details captured when the order is placed. Later profile edits
/// never reach an existing order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerInfo {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    #[serde(default)]
    pub payment_method: PaymentMethod,
}

/// Fee policy applied server-side to every placed order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pricing {
    pub delivery_fee: Money,
    pub service_charge_percent: u32,
}

impl Pricing {
    pub fn service_charge(&self, subtotal: Money) -> Money { subtotal.percentage(self.service_charge_percent) }
}

impl Default for Pricing {
    fn default() -> Self { Self { delivery_fee: Money::new(50), service_charge_percent: 10 } }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_id_format() {
        let now = Utc::now();
        let id = OrderId::generate(now);
        let expected_prefix = format!("ORD-{}-", now.timestamp_millis());
        assert!(id.as_str().starts_with(&expected_prefix));
        assert_eq!(id.as_str().len(), expected_prefix.len() + 9);
        assert_ne!(id, OrderId::generate(now));
    }

    #[test]
    fn test_service_charge_rounds_half_up() {
        let pricing = Pricing::default();
        assert_eq!(pricing.service_charge(Money::new(250)), Money::new(25));
        assert_eq!(pricing.service_charge(Money::new(255)), Money::new(26));
        assert_eq!(pricing.service_charge(Money::new(254)), Money::new(25));
    }

    #[test]
    fn test_quantity_rejects_zero() {
        assert_eq!(Quantity::new(0), Err(QuantityError::Zero));
        assert!(serde_json::from_str::<Quantity>("0").is_err());
        assert_eq!(serde_json::from_str::<Quantity>("3").unwrap().value(), 3);
    }

    #[test]
    fn test_rating_bounds() {
        assert!(Rating::new(0).is_err());
        assert!(Rating::new(6).is_err());
        assert_eq!(Rating::new(5).unwrap().value(), 5);
    }

    #[test]
    fn test_payment_method_defaults_to_cod() {
        let info: CustomerInfo = serde_json::from_str(
            r#"{"name":"Sita","email":"sita@example.com","phone":"98000","address":"Patan"}"#,
        ).unwrap();
        assert_eq!(info.payment_method, PaymentMethod::Cod);
    }
}
