//! Discount catalog: read-through cache of the amount and quantity tables,
//! plus the admin writes that invalidate it.
//!
//! Per-product markdowns are not cached; checkout reads them together with
//! the locked product row.

use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::domain::aggregates::ProductDiscount;
use crate::domain::discount::{DiscountKind, DiscountRule, DiscountTables};
use crate::domain::value_objects::Percentage;
use crate::error::{ShopError, ShopResult};
use crate::store::{Store, StoreError};

struct Cached {
    tables: Arc<DiscountTables>,
    loaded_at: Instant,
}

pub struct DiscountCatalog {
    store: Arc<dyn Store>,
    ttl: Duration,
    cached: RwLock<Option<Cached>>,
}

impl DiscountCatalog {
    pub fn new(store: Arc<dyn Store>, ttl: Duration) -> Self {
        Self { store, ttl, cached: RwLock::new(None) }
    }

    pub async fn tables(&self) -> ShopResult<Arc<DiscountTables>> {
        if let Some(c) = self.cached.read().await.as_ref().filter(|c| c.loaded_at.elapsed() < self.ttl) {
            return Ok(Arc::clone(&c.tables));
        }
        let mut slot = self.cached.write().await;
        if let Some(c) = slot.as_ref().filter(|c| c.loaded_at.elapsed() < self.ttl) {
            return Ok(Arc::clone(&c.tables));
        }
        let rules = self.store.discount_rules().await?;
        let tables = Arc::new(DiscountTables::from_rules(&rules));
        tracing::debug!(rules = rules.len(), "loaded discount tables");
        *slot = Some(Cached { tables: Arc::clone(&tables), loaded_at: Instant::now() });
        Ok(tables)
    }

    pub async fn invalidate(&self) { *self.cached.write().await = None; }

    pub async fn rules(&self) -> ShopResult<Vec<DiscountRule>> { Ok(self.store.discount_rules().await?) }

    pub async fn create_rule(&self, kind: DiscountKind, threshold: Decimal, percentage: Decimal) -> ShopResult<DiscountRule> {
        let (threshold, percentage) = check_rule(kind, threshold, percentage)?;
        let rule = self.store.create_discount_rule(kind, threshold, percentage).await.map_err(conflict)?;
        self.invalidate().await;
        tracing::info!(rule_id = rule.id, kind = kind.as_str(), %threshold, %percentage, "discount rule created");
        Ok(rule)
    }

    pub async fn update_rule(&self, id: i64, threshold: Decimal, percentage: Decimal) -> ShopResult<DiscountRule> {
        let kind = self
            .store
            .discount_rules()
            .await?
            .into_iter()
            .find(|r| r.id == id)
            .map(|r| r.kind)
            .ok_or_else(|| ShopError::NotFound(format!("discount rule {id}")))?;
        let (threshold, percentage) = check_rule(kind, threshold, percentage)?;
        let rule = self
            .store
            .update_discount_rule(id, threshold, percentage)
            .await
            .map_err(conflict)?
            .ok_or_else(|| ShopError::NotFound(format!("discount rule {id}")))?;
        self.invalidate().await;
        tracing::info!(rule_id = id, %threshold, %percentage, "discount rule updated");
        Ok(rule)
    }

    pub async fn delete_rule(&self, id: i64) -> ShopResult<()> {
        if !self.store.delete_discount_rule(id).await? {
            return Err(ShopError::NotFound(format!("discount rule {id}")));
        }
        self.invalidate().await;
        tracing::info!(rule_id = id, "discount rule deleted");
        Ok(())
    }

    pub async fn product_discounts(&self) -> ShopResult<Vec<ProductDiscount>> { Ok(self.store.product_discounts().await?) }

    /// `None` or zero removes the product's markdown.
    pub async fn set_product_discount(&self, product_id: i64, percentage: Option<Decimal>) -> ShopResult<()> {
        let percentage = match percentage {
            Some(p) => Some(Percentage::new(p).map_err(|e| ShopError::validation(e.to_string()))?),
            None => None,
        };
        let value = percentage.filter(|p| !p.is_zero()).map(Decimal::from);
        if !self.store.set_product_discount(product_id, value).await? {
            return Err(ShopError::NotFound(format!("product {product_id}")));
        }
        self.invalidate().await;
        tracing::info!(product_id, percentage = ?value, "product discount set");
        Ok(())
    }
}

fn conflict(e: StoreError) -> ShopError {
    match e {
        StoreError::DuplicateDiscountRule => ShopError::Conflict(e.to_string()),
        other => other.into(),
    }
}

/// Percentages must lie in 0..=100; quantity thresholds count whole items.
fn check_rule(kind: DiscountKind, threshold: Decimal, percentage: Decimal) -> ShopResult<(Decimal, Decimal)> {
    let percentage = Percentage::new(percentage).map_err(|e| ShopError::validation(e.to_string()))?;
    if threshold.is_sign_negative() {
        return Err(ShopError::validation("threshold must not be negative"));
    }
    if kind == DiscountKind::Quantity && !threshold.fract().is_zero() {
        return Err(ShopError::validation("quantity threshold must be a whole number"));
    }
    Ok((threshold, percentage.into()))
}
