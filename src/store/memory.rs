//! In-process store.
//!
//! Row locks are one `tokio::sync::Mutex` per product, held by the
//! transaction until commit or rollback, so concurrent checkouts of the same
//! product queue up exactly as they do on `SELECT … FOR UPDATE`. Writes made
//! inside a transaction are buffered and become visible only at commit.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

use super::{OrderFilter, Store, StoreError, StoreResult, StoreTx};
use crate::domain::aggregates::{Customer, Order, OrderDetail, OrderLine, OrderLineDetail, OrderSummary, Product, ProductDiscount, Transition};
use crate::domain::discount::{DiscountKind, DiscountRule};

#[derive(Default)]
struct MemoryState {
    products: BTreeMap<i64, Product>,
    product_discounts: BTreeMap<i64, Decimal>,
    discount_rules: BTreeMap<i64, DiscountRule>,
    next_rule_id: i64,
    orders: Vec<Order>,
    lines: Vec<OrderLine>,
    customers: BTreeMap<String, Customer>,
}

impl MemoryState {
    fn product(&self, id: i64) -> Option<Product> {
        self.products.get(&id).map(|p| Product { discount_percent: self.product_discounts.get(&id).copied(), ..p.clone() })
    }

    fn order_by_provider_transaction(&self, provider_transaction_id: &str) -> Option<&Order> {
        self.orders.iter().find(|o| o.provider_transaction_id.as_deref() == Some(provider_transaction_id))
    }

    fn customer_name(&self, national_id: &str) -> Option<String> {
        self.customers.get(national_id).map(|c| c.name.clone())
    }
}

#[derive(Default)]
struct Shared {
    state: Mutex<MemoryState>,
    row_locks: Mutex<HashMap<i64, Arc<tokio::sync::Mutex<()>>>>,
    fail_next_commit: AtomicBool,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn row_lock(&self, product_id: i64) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.row_locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(product_id).or_default().clone()
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }

    /// Insert or replace a product. Its `discount_percent`, if any, becomes the product's markdown.
    pub fn insert_product(&self, product: Product) {
        let mut state = self.shared.state();
        match product.discount_percent {
            Some(pct) if !pct.is_zero() => state.product_discounts.insert(product.id, pct),
            _ => state.product_discounts.remove(&product.id),
        };
        state.products.insert(product.id, Product { discount_percent: None, ..product });
    }

    pub fn set_price(&self, product_id: i64, price: Decimal) {
        if let Some(p) = self.shared.state().products.get_mut(&product_id) {
            p.price = price;
        }
    }

    pub fn product(&self, product_id: i64) -> Option<Product> { self.shared.state().product(product_id) }
    pub fn orders(&self) -> Vec<Order> { self.shared.state().orders.clone() }
    pub fn lines(&self) -> Vec<OrderLine> { self.shared.state().lines.clone() }

    /// Make the next commit fail after all statements succeeded.
    pub fn fail_next_commit(&self) { self.shared.fail_next_commit.store(true, Ordering::SeqCst); }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>> {
        Ok(Box::new(MemoryTx {
            shared: Arc::clone(&self.shared),
            locks: HashMap::new(),
            orders: Vec::new(),
            lines: Vec::new(),
            decrements: BTreeMap::new(),
            open: true,
        }))
    }

    async fn ping(&self) -> StoreResult<()> { Ok(()) }

    async fn products(&self, ids: &[i64]) -> StoreResult<Vec<Product>> {
        let state = self.shared.state();
        let mut found: Vec<Product> = ids.iter().filter_map(|id| state.product(*id)).collect();
        found.sort_by_key(|p| p.id);
        found.dedup_by_key(|p| p.id);
        Ok(found)
    }

    async fn discount_rules(&self) -> StoreResult<Vec<DiscountRule>> {
        let mut rules: Vec<DiscountRule> = self.shared.state().discount_rules.values().cloned().collect();
        rules.sort_by(|a, b| a.kind.as_str().cmp(b.kind.as_str()).then(a.threshold.cmp(&b.threshold)));
        Ok(rules)
    }

    async fn create_discount_rule(&self, kind: DiscountKind, threshold: Decimal, percentage: Decimal) -> StoreResult<DiscountRule> {
        let mut state = self.shared.state();
        if state.discount_rules.values().any(|r| r.kind == kind && r.threshold == threshold) {
            return Err(StoreError::DuplicateDiscountRule);
        }
        state.next_rule_id += 1;
        let rule = DiscountRule { id: state.next_rule_id, kind, threshold, percentage };
        state.discount_rules.insert(rule.id, rule.clone());
        Ok(rule)
    }

    async fn update_discount_rule(&self, id: i64, threshold: Decimal, percentage: Decimal) -> StoreResult<Option<DiscountRule>> {
        let mut state = self.shared.state();
        let Some(kind) = state.discount_rules.get(&id).map(|r| r.kind) else { return Ok(None) };
        if state.discount_rules.values().any(|r| r.id != id && r.kind == kind && r.threshold == threshold) {
            return Err(StoreError::DuplicateDiscountRule);
        }
        Ok(state.discount_rules.get_mut(&id).map(|rule| {
            rule.threshold = threshold;
            rule.percentage = percentage;
            rule.clone()
        }))
    }

    async fn delete_discount_rule(&self, id: i64) -> StoreResult<bool> {
        Ok(self.shared.state().discount_rules.remove(&id).is_some())
    }

    async fn product_discounts(&self) -> StoreResult<Vec<ProductDiscount>> {
        let state = self.shared.state();
        Ok(state
            .product_discounts
            .iter()
            .filter_map(|(id, pct)| {
                state.products.get(id).map(|p| ProductDiscount { product_id: p.id, name: p.name.clone(), price: p.price, percentage: *pct })
            })
            .collect())
    }

    async fn set_product_discount(&self, product_id: i64, percentage: Option<Decimal>) -> StoreResult<bool> {
        let mut state = self.shared.state();
        if !state.products.contains_key(&product_id) {
            return Ok(false);
        }
        match percentage.filter(|p| !p.is_zero()) {
            Some(pct) => state.product_discounts.insert(product_id, pct),
            None => state.product_discounts.remove(&product_id),
        };
        Ok(true)
    }

    async fn apply_transition(&self, order_id: Uuid, transition: &Transition, now: DateTime<Utc>) -> StoreResult<bool> {
        let mut state = self.shared.state();
        Ok(match state.orders.iter_mut().find(|o| o.id == order_id) {
            Some(order) => transition.apply(order, now).is_ok(),
            None => false,
        })
    }

    async fn order(&self, order_id: Uuid) -> StoreResult<Option<OrderDetail>> {
        let state = self.shared.state();
        let Some(order) = state.orders.iter().find(|o| o.id == order_id) else {
            return Ok(None);
        };
        let lines = state
            .lines
            .iter()
            .filter(|l| l.order_id == order_id)
            .map(|l| OrderLineDetail {
                product_id: l.product_id,
                product_name: state.products.get(&l.product_id).map(|p| p.name.clone()).unwrap_or_default(),
                quantity: l.quantity,
                unit_price: l.unit_price,
                subtotal: l.subtotal,
            })
            .collect();
        Ok(Some(OrderDetail { order: order.clone(), customer_name: state.customer_name(&order.customer_id), lines }))
    }

    async fn list_orders(&self, filter: &OrderFilter) -> StoreResult<Vec<OrderSummary>> {
        let state = self.shared.state();
        let mut found: Vec<OrderSummary> = state
            .orders
            .iter()
            .filter(|o| filter.matches(o))
            .map(|o| OrderSummary { order: o.clone(), customer_name: state.customer_name(&o.customer_id) })
            .collect();
        found.sort_by(|a, b| b.order.created_at.cmp(&a.order.created_at));
        Ok(found)
    }

    async fn order_by_provider_transaction(&self, provider_transaction_id: &str) -> StoreResult<Option<Order>> {
        Ok(self.shared.state().order_by_provider_transaction(provider_transaction_id).cloned())
    }

    async fn create_customer(&self, customer: &Customer) -> StoreResult<()> {
        let mut state = self.shared.state();
        let key = customer.national_id.as_str();
        if state.customers.contains_key(key) || state.customers.values().any(|c| c.email == customer.email) {
            return Err(StoreError::DuplicateCustomer);
        }
        state.customers.insert(key.to_string(), customer.clone());
        Ok(())
    }

    async fn customer(&self, national_id: &str) -> StoreResult<Option<Customer>> {
        Ok(self.shared.state().customers.get(national_id).cloned())
    }

    async fn update_customer(&self, customer: &Customer) -> StoreResult<bool> {
        let mut state = self.shared.state();
        let key = customer.national_id.as_str();
        if state.customers.iter().any(|(id, c)| id != key && c.email == customer.email) {
            return Err(StoreError::DuplicateCustomer);
        }
        Ok(match state.customers.get_mut(key) {
            Some(existing) => {
                *existing = customer.clone();
                true
            }
            None => false,
        })
    }

    async fn customers(&self) -> StoreResult<Vec<Customer>> {
        let mut all: Vec<Customer> = self.shared.state().customers.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }

    async fn search_customers(&self, term: &str, limit: usize) -> StoreResult<Vec<Customer>> {
        let term = term.to_uppercase();
        let mut found: Vec<Customer> = self
            .shared
            .state()
            .customers
            .values()
            .filter(|c| c.name.to_uppercase().contains(&term) || c.national_id.as_str().contains(&term))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        found.truncate(limit);
        Ok(found)
    }

    async fn delete_customer(&self, national_id: &str) -> StoreResult<bool> {
        let mut state = self.shared.state();
        if !state.customers.contains_key(national_id) {
            return Ok(false);
        }
        if state.orders.iter().any(|o| o.customer_id == national_id) {
            return Err(StoreError::CustomerHasOrders(national_id.to_string()));
        }
        state.customers.remove(national_id);
        Ok(true)
    }
}

pub struct MemoryTx {
    shared: Arc<Shared>,
    locks: HashMap<i64, OwnedMutexGuard<()>>,
    orders: Vec<Order>,
    lines: Vec<OrderLine>,
    decrements: BTreeMap<i64, i32>,
    open: bool,
}

impl MemoryTx {
    fn ensure_open(&self) -> StoreResult<()> {
        if self.open { Ok(()) } else { Err(StoreError::TransactionClosed) }
    }

    fn pending(&self, product_id: i64) -> i32 { self.decrements.get(&product_id).copied().unwrap_or(0) }

    fn close(&mut self) {
        self.open = false;
        self.orders.clear();
        self.lines.clear();
        self.decrements.clear();
        self.locks.clear();
    }
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn lock_product_for_update(&mut self, product_id: i64) -> StoreResult<Option<Product>> {
        self.ensure_open()?;
        if !self.locks.contains_key(&product_id) {
            let row = self.shared.row_lock(product_id);
            let guard = row.lock_owned().await;
            self.locks.insert(product_id, guard);
        }
        let pending = self.pending(product_id);
        Ok(self.shared.state().product(product_id).map(|p| Product { stock: p.stock - pending, ..p }))
    }

    async fn order_by_provider_transaction(&mut self, provider_transaction_id: &str) -> StoreResult<Option<Order>> {
        self.ensure_open()?;
        if let Some(o) = self.orders.iter().find(|o| o.provider_transaction_id.as_deref() == Some(provider_transaction_id)) {
            return Ok(Some(o.clone()));
        }
        Ok(self.shared.state().order_by_provider_transaction(provider_transaction_id).cloned())
    }

    async fn insert_order(&mut self, order: &Order) -> StoreResult<()> {
        self.ensure_open()?;
        if let Some(txn) = &order.provider_transaction_id {
            if self.shared.state().order_by_provider_transaction(txn).is_some() {
                return Err(StoreError::DuplicateProviderTransaction(txn.clone()));
            }
        }
        self.orders.push(order.clone());
        Ok(())
    }

    async fn insert_order_line(&mut self, line: &OrderLine) -> StoreResult<()> {
        self.ensure_open()?;
        self.lines.push(line.clone());
        Ok(())
    }

    async fn decrement_stock(&mut self, product_id: i64, quantity: i32) -> StoreResult<()> {
        self.ensure_open()?;
        let mut row = self.shared.state().product(product_id).ok_or(StoreError::StockUnderflow(product_id))?;
        row.stock -= self.pending(product_id);
        row.remove_stock(quantity).map_err(|_| StoreError::StockUnderflow(product_id))?;
        *self.decrements.entry(product_id).or_insert(0) += quantity;
        Ok(())
    }

    async fn commit(&mut self) -> StoreResult<()> {
        self.ensure_open()?;
        if self.shared.fail_next_commit.swap(false, Ordering::SeqCst) {
            self.close();
            return Err(StoreError::Unavailable("commit failed".into()));
        }
        let outcome = {
            let mut state = self.shared.state();
            let underflow = self
                .decrements
                .iter()
                .find(|&(&id, &qty)| state.products.get(&id).map_or(true, |p| p.stock < qty))
                .map(|(&id, _)| id);
            let duplicate = self
                .orders
                .iter()
                .filter_map(|o| o.provider_transaction_id.as_deref())
                .find(|txn| state.order_by_provider_transaction(txn).is_some())
                .map(str::to_string);
            match (underflow, duplicate) {
                (Some(id), _) => Err(StoreError::StockUnderflow(id)),
                (None, Some(txn)) => Err(StoreError::DuplicateProviderTransaction(txn)),
                (None, None) => {
                    for (id, qty) in &self.decrements {
                        if let Some(p) = state.products.get_mut(id) {
                            p.stock -= qty;
                        }
                    }
                    state.orders.append(&mut self.orders);
                    state.lines.append(&mut self.lines);
                    Ok(())
                }
            }
        };
        self.close();
        outcome
    }

    async fn rollback(&mut self) -> StoreResult<()> {
        self.close();
        Ok(())
    }
}
