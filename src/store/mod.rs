//! Persistence layer.
//!
//! [`Store`] covers single-statement reads and writes. Checkout runs inside a
//! [`StoreTx`], whose [`StoreTx::lock_product_for_update`] holds an exclusive
//! lock on the product row until the transaction commits or rolls back. A
//! transaction dropped without commit is rolled back.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::aggregates::{Customer, Order, OrderDetail, OrderLine, OrderStatus, OrderSummary, Product, ProductDiscount, Transition};
use crate::domain::discount::{DiscountKind, DiscountRule};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("an order already exists for provider transaction {0}")]
    DuplicateProviderTransaction(String),

    #[error("a discount rule of that kind already exists at that threshold")]
    DuplicateDiscountRule,

    #[error("customer national id or email already registered")]
    DuplicateCustomer,

    #[error("customer {0} is referenced by orders")]
    CustomerHasOrders(String),

    #[error("stock of product {0} cannot go below zero")]
    StockUnderflow(i64),

    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error("transaction already finished")]
    TransactionClosed,

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Admin order listing filter. Dates are inclusive calendar days in UTC.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OrderFilter {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub status: Option<OrderStatus>,
}

impl OrderFilter {
    pub fn created_after(&self) -> Option<DateTime<Utc>> {
        self.from.and_then(|d| d.and_hms_opt(0, 0, 0)).map(|dt| dt.and_utc())
    }

    /// Exclusive upper bound: midnight after `to`.
    pub fn created_before(&self) -> Option<DateTime<Utc>> {
        self.to.and_then(|d| d.succ_opt()).and_then(|d| d.and_hms_opt(0, 0, 0)).map(|dt| dt.and_utc())
    }

    pub fn matches(&self, order: &Order) -> bool {
        self.created_after().map_or(true, |t| order.created_at >= t)
            && self.created_before().map_or(true, |t| order.created_at < t)
            && self.status.map_or(true, |s| order.status == s)
    }
}

#[async_trait]
pub trait Store: Send + Sync + 'static {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>>;
    async fn ping(&self) -> StoreResult<()>;

    /// Current rows for `ids`, without locking. Missing ids are skipped.
    async fn products(&self, ids: &[i64]) -> StoreResult<Vec<Product>>;

    async fn discount_rules(&self) -> StoreResult<Vec<DiscountRule>>;
    async fn create_discount_rule(&self, kind: DiscountKind, threshold: Decimal, percentage: Decimal) -> StoreResult<DiscountRule>;
    async fn update_discount_rule(&self, id: i64, threshold: Decimal, percentage: Decimal) -> StoreResult<Option<DiscountRule>>;
    async fn delete_discount_rule(&self, id: i64) -> StoreResult<bool>;
    async fn product_discounts(&self) -> StoreResult<Vec<ProductDiscount>>;
    /// `None` clears the markdown. Returns false when the product does not exist.
    async fn set_product_discount(&self, product_id: i64, percentage: Option<Decimal>) -> StoreResult<bool>;

    /// Apply `transition` iff the order's current status is in its allowed set,
    /// as one atomic statement. Returns false when nothing matched.
    async fn apply_transition(&self, order_id: Uuid, transition: &Transition, now: DateTime<Utc>) -> StoreResult<bool>;
    async fn order(&self, order_id: Uuid) -> StoreResult<Option<OrderDetail>>;
    async fn list_orders(&self, filter: &OrderFilter) -> StoreResult<Vec<OrderSummary>>;
    async fn order_by_provider_transaction(&self, provider_transaction_id: &str) -> StoreResult<Option<Order>>;

    async fn create_customer(&self, customer: &Customer) -> StoreResult<()>;
    async fn customer(&self, national_id: &str) -> StoreResult<Option<Customer>>;
    async fn update_customer(&self, customer: &Customer) -> StoreResult<bool>;
    /// All customers ordered by name.
    async fn customers(&self) -> StoreResult<Vec<Customer>>;
    /// Customers whose name or national id contains `term`, ordered by name.
    async fn search_customers(&self, term: &str, limit: usize) -> StoreResult<Vec<Customer>>;
    /// Returns false when no such customer exists. Fails with
    /// [`StoreError::CustomerHasOrders`] while any order references the id.
    async fn delete_customer(&self, national_id: &str) -> StoreResult<bool>;
}

#[async_trait]
pub trait StoreTx: Send {
    /// Exclusive row lock, then a fresh read of price, stock and markdown.
    async fn lock_product_for_update(&mut self, product_id: i64) -> StoreResult<Option<Product>>;
    async fn order_by_provider_transaction(&mut self, provider_transaction_id: &str) -> StoreResult<Option<Order>>;
    async fn insert_order(&mut self, order: &Order) -> StoreResult<()>;
    async fn insert_order_line(&mut self, line: &OrderLine) -> StoreResult<()>;
    async fn decrement_stock(&mut self, product_id: i64, quantity: i32) -> StoreResult<()>;
    async fn commit(&mut self) -> StoreResult<()>;
    async fn rollback(&mut self) -> StoreResult<()>;
}
