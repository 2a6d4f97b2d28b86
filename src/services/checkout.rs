//! Order placement.
//!
//! One database transaction per order: lock every requested product row in
//! product-id order, check stock against the locked value, price the lines
//! from the stored prices, pick the discount, then write the order, its line
//! snapshots and the stock decrements. Any failure rolls the whole thing back.

use chrono::Utc;
use std::sync::Arc;

use super::catalog::DiscountCatalog;
use crate::domain::aggregates::{Cart, CartLine, Order, OrderLine, PaymentMethod, PricedLine};
use crate::domain::discount::{resolve, DiscountTables, PriceQuote};
use crate::domain::events::OrderEvent;
use crate::error::{ShopError, ShopResult};
use crate::publisher::EventPublisher;
use crate::store::{Store, StoreError, StoreTx};

/// A placed order. `replayed` is set when a PayPal retry matched an existing order.
#[derive(Clone, Debug, PartialEq)]
pub struct PlacedOrder {
    pub order: Order,
    pub replayed: bool,
}

enum Written {
    Created(Order),
    Existing(Order),
}

#[derive(Clone)]
pub struct Checkout {
    store: Arc<dyn Store>,
    catalog: Arc<DiscountCatalog>,
    publisher: EventPublisher,
}

impl Checkout {
    pub fn new(store: Arc<dyn Store>, catalog: Arc<DiscountCatalog>, publisher: EventPublisher) -> Self {
        Self { store, catalog, publisher }
    }

    /// Cash or transfer checkout.
    #[tracing::instrument(name = "checkout.place_order", skip_all, fields(customer_id = %customer_id, method = %method))]
    pub async fn place_order(&self, customer_id: &str, lines: &[CartLine], method: PaymentMethod) -> ShopResult<PlacedOrder> {
        if method == PaymentMethod::Paypal {
            return Err(ShopError::validation("paypal orders must be placed with a provider transaction id"));
        }
        self.checkout(customer_id, lines, method, None).await
    }

    /// Checkout after the provider captured the payment. Retrying with the
    /// same provider transaction id returns the order created the first time.
    #[tracing::instrument(name = "checkout.place_paypal_order", skip_all, fields(customer_id = %customer_id, provider_transaction_id = %provider_transaction_id))]
    pub async fn place_paypal_order(&self, customer_id: &str, lines: &[CartLine], provider_transaction_id: &str) -> ShopResult<PlacedOrder> {
        let provider_transaction_id = provider_transaction_id.trim();
        if provider_transaction_id.is_empty() {
            return Err(ShopError::validation("provider transaction id is required"));
        }
        self.checkout(customer_id, lines, PaymentMethod::Paypal, Some(provider_transaction_id)).await
    }

    /// Price a cart against current rows without locking or writing.
    pub async fn quote(&self, lines: &[CartLine]) -> ShopResult<PriceQuote> {
        let cart = Cart::from_lines(lines)?;
        let ids: Vec<i64> = cart.product_ids().collect();
        let products = self.store.products(&ids).await?;
        let tables = self.catalog.tables().await?;

        let mut priced = Vec::with_capacity(cart.lines().len());
        for line in cart.lines() {
            let product = products.iter().find(|p| p.id == line.product_id).ok_or(ShopError::ProductNotFound(line.product_id))?;
            if !product.has_stock_for(line.quantity) {
                return Err(ShopError::InsufficientStock { product_id: product.id, available: product.stock });
            }
            priced.push(PricedLine::from_product(product, line.quantity));
        }
        Ok(resolve(&priced, &tables))
    }

    async fn checkout(
        &self,
        customer_id: &str,
        lines: &[CartLine],
        method: PaymentMethod,
        provider_transaction_id: Option<&str>,
    ) -> ShopResult<PlacedOrder> {
        let customer_id = customer_id.trim();
        if customer_id.is_empty() {
            return Err(ShopError::validation("customer id is required"));
        }
        let cart = Cart::from_lines(lines)?;
        let tables = self.catalog.tables().await?;

        let mut tx = self.store.begin().await?;
        let order = match write_order(&mut *tx, customer_id, &cart, method, provider_transaction_id, &tables).await {
            Ok(Written::Created(order)) => order,
            Ok(Written::Existing(order)) => {
                abort(&mut *tx).await;
                tracing::info!(order_id = %order.id, "provider transaction already recorded, returning existing order");
                return Ok(PlacedOrder { order, replayed: true });
            }
            Err(e) => {
                abort(&mut *tx).await;
                return self.recover_duplicate(e, provider_transaction_id).await;
            }
        };
        if let Err(e) = tx.commit().await {
            return self.recover_duplicate(e.into(), provider_transaction_id).await;
        }

        tracing::info!(
            order_id = %order.id,
            status = %order.status,
            total = %order.total,
            discount = %order.discount,
            discount_type = order.discount_type.as_str(),
            "order placed"
        );
        self.publisher
            .publish(OrderEvent::Created {
                order_id: order.id,
                customer_id: order.customer_id.clone(),
                method: order.payment_method,
                status: order.status,
                total: order.total,
            })
            .await;
        Ok(PlacedOrder { order, replayed: false })
    }

    /// A concurrent retry can win the provider-transaction race after our
    /// pre-check. Its order is then the answer to this request too.
    async fn recover_duplicate(&self, err: ShopError, provider_transaction_id: Option<&str>) -> ShopResult<PlacedOrder> {
        if let (ShopError::Store(StoreError::DuplicateProviderTransaction(_)), Some(txn)) = (&err, provider_transaction_id) {
            if let Some(order) = self.store.order_by_provider_transaction(txn).await? {
                tracing::info!(order_id = %order.id, "lost provider transaction race, returning existing order");
                return Ok(PlacedOrder { order, replayed: true });
            }
        }
        Err(err)
    }
}

async fn write_order(
    tx: &mut dyn StoreTx,
    customer_id: &str,
    cart: &Cart,
    method: PaymentMethod,
    provider_transaction_id: Option<&str>,
    tables: &DiscountTables,
) -> ShopResult<Written> {
    if let Some(txn) = provider_transaction_id {
        if let Some(existing) = tx.order_by_provider_transaction(txn).await? {
            return Ok(Written::Existing(existing));
        }
    }

    let mut priced = Vec::with_capacity(cart.lines().len());
    for line in cart.lines() {
        let product = tx.lock_product_for_update(line.product_id).await?.ok_or(ShopError::ProductNotFound(line.product_id))?;
        if !product.has_stock_for(line.quantity) {
            tracing::warn!(product_id = product.id, requested = line.quantity, available = product.stock, "insufficient stock");
            return Err(ShopError::InsufficientStock { product_id: product.id, available: product.stock });
        }
        priced.push(PricedLine::from_product(&product, line.quantity));
    }

    let quote = resolve(&priced, tables);
    let mut order = Order::place(customer_id, method, quote.total, quote.discount, quote.discount_type, Utc::now());
    if let Some(txn) = provider_transaction_id {
        order = order.with_provider_transaction(txn);
    }

    tx.insert_order(&order).await?;
    for line in &priced {
        tx.insert_order_line(&OrderLine {
            order_id: order.id,
            product_id: line.product_id,
            quantity: line.quantity,
            unit_price: line.unit_price,
            subtotal: line.subtotal(),
        })
        .await?;
        tx.decrement_stock(line.product_id, line.quantity).await?;
    }
    Ok(Written::Created(order))
}

async fn abort(tx: &mut dyn StoreTx) {
    if let Err(e) = tx.rollback().await {
        tracing::error!(error = %e, "rollback failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{OrderStatus, Product};
    use crate::domain::discount::{DiscountKind, DiscountType};
    use crate::store::MemoryStore;
    use rust_decimal::Decimal;
    use std::time::Duration;

    fn setup() -> (MemoryStore, Checkout) {
        let store = MemoryStore::new();
        let shared: Arc<dyn Store> = Arc::new(store.clone());
        let catalog = Arc::new(DiscountCatalog::new(Arc::clone(&shared), Duration::from_secs(60)));
        (store, Checkout::new(shared, catalog, EventPublisher::disabled()))
    }

    fn line(product_id: i64, quantity: i32) -> CartLine { CartLine { product_id, quantity } }

    #[tokio::test]
    async fn test_cash_order_without_rules() {
        let (store, checkout) = setup();
        store.insert_product(Product::new(7, "Roses", Decimal::from(20), 10));

        let placed = checkout.place_order("1710034065", &[line(7, 3)], PaymentMethod::Cash).await.unwrap();
        assert_eq!(placed.order.total, Decimal::from(60));
        assert_eq!(placed.order.discount, Decimal::ZERO);
        assert_eq!(placed.order.discount_type, DiscountType::None);
        assert_eq!(placed.order.status, OrderStatus::Paid);
        assert!(placed.order.paid_at.is_some());
        assert_eq!(store.product(7).unwrap().stock, 7);
    }

    #[tokio::test]
    async fn test_transfer_order_pending_validation() {
        let (store, checkout) = setup();
        store.insert_product(Product::new(7, "Roses", Decimal::from(20), 10));

        let placed = checkout.place_order("1710034065", &[line(7, 1)], PaymentMethod::Transfer).await.unwrap();
        assert_eq!(placed.order.status, OrderStatus::PendingValidation);
        assert_eq!(placed.order.paid_at, None);
    }

    #[tokio::test]
    async fn test_amount_rule_applies() {
        let (store, checkout) = setup();
        store.insert_product(Product::new(7, "Roses", Decimal::from(20), 10));
        store.create_discount_rule(DiscountKind::Amount, Decimal::from(50), Decimal::from(5)).await.unwrap();

        let placed = checkout.place_order("1710034065", &[line(7, 3)], PaymentMethod::Cash).await.unwrap();
        assert_eq!(placed.order.discount, Decimal::new(300, 2));
        assert_eq!(placed.order.total, Decimal::new(5700, 2));
        assert_eq!(placed.order.discount_type, DiscountType::Amount);
    }

    #[tokio::test]
    async fn test_insufficient_stock_writes_nothing() {
        let (store, checkout) = setup();
        store.insert_product(Product::new(7, "Roses", Decimal::from(20), 2));

        let err = checkout.place_order("1710034065", &[line(7, 5)], PaymentMethod::Cash).await.unwrap_err();
        assert!(matches!(err, ShopError::InsufficientStock { product_id: 7, available: 2 }));
        assert!(store.orders().is_empty());
        assert_eq!(store.product(7).unwrap().stock, 2);
    }

    #[tokio::test]
    async fn test_second_line_failure_rolls_back_first() {
        let (store, checkout) = setup();
        store.insert_product(Product::new(1, "Tulips", Decimal::from(5), 10));
        store.insert_product(Product::new(2, "Lilies", Decimal::from(8), 1));

        let err = checkout.place_order("1710034065", &[line(1, 4), line(2, 3)], PaymentMethod::Cash).await.unwrap_err();
        assert!(matches!(err, ShopError::InsufficientStock { product_id: 2, .. }));
        assert!(store.orders().is_empty() && store.lines().is_empty());
        assert_eq!(store.product(1).unwrap().stock, 10);
    }

    #[tokio::test]
    async fn test_unknown_product_rejected() {
        let (store, checkout) = setup();
        store.insert_product(Product::new(1, "Tulips", Decimal::from(5), 10));

        let err = checkout.place_order("1710034065", &[line(1, 1), line(42, 1)], PaymentMethod::Cash).await.unwrap_err();
        assert!(matches!(err, ShopError::ProductNotFound(42)));
        assert_eq!(store.product(1).unwrap().stock, 10);
    }

    #[tokio::test]
    async fn test_duplicate_lines_are_merged_against_stock() {
        let (store, checkout) = setup();
        store.insert_product(Product::new(7, "Roses", Decimal::from(20), 5));

        let err = checkout.place_order("1710034065", &[line(7, 3), line(7, 3)], PaymentMethod::Cash).await.unwrap_err();
        assert!(matches!(err, ShopError::InsufficientStock { available: 5, .. }));
        assert_eq!(store.product(7).unwrap().stock, 5);
    }

    #[tokio::test]
    async fn test_input_validation() {
        let (_, checkout) = setup();
        assert!(matches!(checkout.place_order("  ", &[line(1, 1)], PaymentMethod::Cash).await, Err(ShopError::Validation(_))));
        assert!(matches!(checkout.place_order("1710034065", &[], PaymentMethod::Cash).await, Err(ShopError::Validation(_))));
        assert!(matches!(checkout.place_order("1710034065", &[line(1, 0)], PaymentMethod::Cash).await, Err(ShopError::Validation(_))));
        assert!(matches!(checkout.place_order("1710034065", &[line(1, 1)], PaymentMethod::Paypal).await, Err(ShopError::Validation(_))));
        assert!(matches!(checkout.place_paypal_order("1710034065", &[line(1, 1)], " ").await, Err(ShopError::Validation(_))));
    }

    #[tokio::test]
    async fn test_paypal_retry_returns_first_order() {
        let (store, checkout) = setup();
        store.insert_product(Product::new(7, "Roses", Decimal::from(20), 10));

        let first = checkout.place_paypal_order("1710034065", &[line(7, 2)], "PAY-123").await.unwrap();
        assert!(!first.replayed);
        assert_eq!(first.order.status, OrderStatus::Paid);
        assert_eq!(first.order.provider_transaction_id.as_deref(), Some("PAY-123"));

        let again = checkout.place_paypal_order("1710034065", &[line(7, 2)], "PAY-123").await.unwrap();
        assert!(again.replayed);
        assert_eq!(again.order.id, first.order.id);
        assert_eq!(store.orders().len(), 1);
        assert_eq!(store.product(7).unwrap().stock, 8);
    }

    #[tokio::test]
    async fn test_failed_commit_leaves_no_trace() {
        let (store, checkout) = setup();
        store.insert_product(Product::new(7, "Roses", Decimal::from(20), 10));
        store.fail_next_commit();

        let err = checkout.place_order("1710034065", &[line(7, 3)], PaymentMethod::Cash).await.unwrap_err();
        assert!(matches!(err, ShopError::Store(_)));
        assert!(store.orders().is_empty() && store.lines().is_empty());
        assert_eq!(store.product(7).unwrap().stock, 10);
    }

    #[tokio::test]
    async fn test_line_snapshots_use_stored_price() {
        let (store, checkout) = setup();
        store.insert_product(Product::new(7, "Roses", Decimal::new(1999, 2), 10));

        let placed = checkout.place_order("1710034065", &[line(7, 2)], PaymentMethod::Cash).await.unwrap();
        store.set_price(7, Decimal::from(99));
        let lines = store.lines();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].order_id, placed.order.id);
        assert_eq!(lines[0].unit_price, Decimal::new(1999, 2));
        assert_eq!(lines[0].subtotal, Decimal::new(3998, 2));
    }

    #[tokio::test]
    async fn test_quote_does_not_write() {
        let (store, checkout) = setup();
        store.insert_product(Product::new(7, "Roses", Decimal::from(20), 10).with_discount(Decimal::from(10)));

        let quote = checkout.quote(&[line(7, 3)]).await.unwrap();
        assert_eq!(quote.discount_type, DiscountType::Product);
        assert_eq!(quote.total, Decimal::from(54));
        assert!(store.orders().is_empty());
        assert_eq!(store.product(7).unwrap().stock, 10);
    }
}
