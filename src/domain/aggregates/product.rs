//! Product Aggregate

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A catalog product as seen by checkout.
///
/// `discount_percent` comes from the product's standing markdown, if any.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub price: Decimal,
    pub stock: i32,
    pub discount_percent: Option<Decimal>,
}

impl Product {
    pub fn new(id: i64, name: impl Into<String>, price: Decimal, stock: i32) -> Self {
        Self { id, name: name.into(), price, stock, discount_percent: None }
    }

    pub fn with_discount(mut self, percent: Decimal) -> Self {
        self.discount_percent = Some(percent);
        self
    }

    pub fn has_stock_for(&self, quantity: i32) -> bool { quantity <= self.stock }

    pub fn remove_stock(&mut self, quantity: i32) -> Result<(), ProductError> {
        if !self.has_stock_for(quantity) {
            return Err(ProductError::InsufficientStock { available: self.stock });
        }
        self.stock -= quantity;
        Ok(())
    }
}

/// Standing per-product markdown.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ProductDiscount {
    pub product_id: i64,
    pub name: String,
    pub price: Decimal,
    pub percentage: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum ProductError { InsufficientStock { available: i32 } }
impl std::error::Error for ProductError {}
impl std::fmt::Display for ProductError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self { Self::InsufficientStock { available } => write!(f, "Insufficient stock (available: {available})") }
    }
}
