//! Cart Aggregate
//!
//! What the client sends is only product ids and quantities. Prices enter the
//! cart exclusively through [`PricedLine`], built from rows read by the store.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::product::Product;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub product_id: i64,
    pub quantity: i32,
}

/// Requested lines, merged per product and ordered by product id.
///
/// The ordering is the lock order used by checkout.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cart {
    lines: Vec<CartLine>,
}

impl Cart {
    pub fn from_lines(lines: &[CartLine]) -> Result<Self, CartError> {
        if lines.is_empty() { return Err(CartError::Empty); }
        let mut merged: BTreeMap<i64, i32> = BTreeMap::new();
        for line in lines {
            if line.quantity <= 0 { return Err(CartError::InvalidQuantity { product_id: line.product_id }); }
            let qty = merged.entry(line.product_id).or_insert(0);
            *qty = qty.checked_add(line.quantity).ok_or(CartError::InvalidQuantity { product_id: line.product_id })?;
        }
        Ok(Self { lines: merged.into_iter().map(|(product_id, quantity)| CartLine { product_id, quantity }).collect() })
    }

    pub fn lines(&self) -> &[CartLine] { &self.lines }
    pub fn product_ids(&self) -> impl Iterator<Item = i64> + '_ { self.lines.iter().map(|l| l.product_id) }
}

/// A cart line priced from the stored product row.
#[derive(Clone, Debug, PartialEq)]
pub struct PricedLine {
    pub product_id: i64,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub discount_percent: Decimal,
}

impl PricedLine {
    pub fn from_product(product: &Product, quantity: i32) -> Self {
        Self {
            product_id: product.id,
            quantity,
            unit_price: product.price,
            discount_percent: product.discount_percent.unwrap_or(Decimal::ZERO),
        }
    }

    pub fn subtotal(&self) -> Decimal { self.unit_price * Decimal::from(self.quantity) }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum CartError { Empty, InvalidQuantity { product_id: i64 } }
impl std::error::Error for CartError {}
impl std::fmt::Display for CartError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "order has no items"),
            Self::InvalidQuantity { product_id } => write!(f, "invalid quantity for product {product_id}"),
        }
    }
}
