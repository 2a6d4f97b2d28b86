//! PostgreSQL store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions};
use sqlx::{Postgres, QueryBuilder, Transaction};
use uuid::Uuid;

use super::{OrderFilter, Store, StoreError, StoreResult, StoreTx};
use crate::domain::aggregates::{Customer, Order, OrderDetail, OrderLine, OrderLineDetail, OrderSummary, Product, ProductDiscount, Transition};
use crate::domain::discount::{DiscountKind, DiscountRule};
use crate::domain::value_objects::NationalId;

const UNIQUE_VIOLATION: &str = "23505";
const PROVIDER_TXN_INDEX: &str = "orders_provider_transaction_id_key";
const RULE_THRESHOLD_KEY: &str = "discount_rules_kind_threshold_key";

const PRODUCT_COLUMNS: &str = "SELECT p.id, p.name, p.price, p.stock, d.percentage AS discount_percent \
     FROM products p LEFT JOIN product_discounts d ON d.product_id = p.id";

const ORDER_COLUMNS: &str = "o.id, o.customer_id, o.created_at, o.paid_at, o.total, o.discount, o.discount_type, \
     o.status, o.payment_method, o.proof_ref, o.provider_transaction_id";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new().max_connections(max_connections).connect(database_url).await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    customer_id: String,
    created_at: DateTime<Utc>,
    paid_at: Option<DateTime<Utc>>,
    total: Decimal,
    discount: Decimal,
    discount_type: String,
    status: String,
    payment_method: String,
    proof_ref: Option<String>,
    provider_transaction_id: Option<String>,
}

impl TryFrom<OrderRow> for Order {
    type Error = StoreError;
    fn try_from(r: OrderRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            customer_id: r.customer_id,
            created_at: r.created_at,
            paid_at: r.paid_at,
            total: r.total,
            discount: r.discount,
            discount_type: r.discount_type.parse().map_err(|e| StoreError::Corrupt(format!("{e}")))?,
            status: r.status.parse().map_err(|e| StoreError::Corrupt(format!("{e}")))?,
            payment_method: r.payment_method.parse().map_err(|e| StoreError::Corrupt(format!("{e}")))?,
            proof_ref: r.proof_ref,
            provider_transaction_id: r.provider_transaction_id,
        })
    }
}

#[derive(sqlx::FromRow)]
struct OrderSummaryRow {
    #[sqlx(flatten)]
    order: OrderRow,
    customer_name: Option<String>,
}

#[derive(sqlx::FromRow)]
struct DiscountRuleRow {
    id: i64,
    kind: String,
    threshold: Decimal,
    percentage: Decimal,
}

impl TryFrom<DiscountRuleRow> for DiscountRule {
    type Error = StoreError;
    fn try_from(r: DiscountRuleRow) -> Result<Self, Self::Error> {
        let kind = r.kind.parse().map_err(|e| StoreError::Corrupt(format!("{e}")))?;
        Ok(Self { id: r.id, kind, threshold: r.threshold, percentage: r.percentage })
    }
}

#[derive(sqlx::FromRow)]
struct CustomerRow {
    national_id: String,
    name: String,
    email: String,
    phone: String,
    address: String,
}

impl TryFrom<CustomerRow> for Customer {
    type Error = StoreError;
    fn try_from(r: CustomerRow) -> Result<Self, Self::Error> {
        let national_id = NationalId::new(r.national_id).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        Ok(Self { national_id, name: r.name, email: r.email, phone: r.phone, address: r.address })
    }
}

fn is_unique_violation(e: &sqlx::Error, constraint: Option<&str>) -> bool {
    match e {
        sqlx::Error::Database(db) => {
            db.code().as_deref() == Some(UNIQUE_VIOLATION) && constraint.map_or(true, |c| db.constraint() == Some(c))
        }
        _ => false,
    }
}

fn duplicate_rule(e: sqlx::Error) -> StoreError {
    if is_unique_violation(&e, Some(RULE_THRESHOLD_KEY)) { StoreError::DuplicateDiscountRule } else { e.into() }
}

async fn fetch_order_by_provider_transaction(conn: &mut PgConnection, provider_transaction_id: &str) -> StoreResult<Option<Order>> {
    let sql = format!("SELECT {ORDER_COLUMNS} FROM orders o WHERE o.provider_transaction_id = $1");
    sqlx::query_as::<_, OrderRow>(&sql)
        .bind(provider_transaction_id)
        .fetch_optional(conn)
        .await?
        .map(Order::try_from)
        .transpose()
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTx { tx: Some(tx) }))
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn products(&self, ids: &[i64]) -> StoreResult<Vec<Product>> {
        let sql = format!("{PRODUCT_COLUMNS} WHERE p.id = ANY($1) ORDER BY p.id");
        Ok(sqlx::query_as::<_, Product>(&sql).bind(ids).fetch_all(&self.pool).await?)
    }

    async fn discount_rules(&self) -> StoreResult<Vec<DiscountRule>> {
        sqlx::query_as::<_, DiscountRuleRow>("SELECT id, kind, threshold, percentage FROM discount_rules ORDER BY kind, threshold")
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(DiscountRule::try_from)
            .collect()
    }

    async fn create_discount_rule(&self, kind: DiscountKind, threshold: Decimal, percentage: Decimal) -> StoreResult<DiscountRule> {
        sqlx::query_as::<_, DiscountRuleRow>(
            "INSERT INTO discount_rules (kind, threshold, percentage) VALUES ($1, $2, $3) RETURNING id, kind, threshold, percentage",
        )
        .bind(kind.as_str())
        .bind(threshold)
        .bind(percentage)
        .fetch_one(&self.pool)
        .await
        .map_err(duplicate_rule)?
        .try_into()
    }

    async fn update_discount_rule(&self, id: i64, threshold: Decimal, percentage: Decimal) -> StoreResult<Option<DiscountRule>> {
        sqlx::query_as::<_, DiscountRuleRow>(
            "UPDATE discount_rules SET threshold = $2, percentage = $3 WHERE id = $1 RETURNING id, kind, threshold, percentage",
        )
        .bind(id)
        .bind(threshold)
        .bind(percentage)
        .fetch_optional(&self.pool)
        .await
        .map_err(duplicate_rule)?
        .map(DiscountRule::try_from)
        .transpose()
    }

    async fn delete_discount_rule(&self, id: i64) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM discount_rules WHERE id = $1").bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn product_discounts(&self) -> StoreResult<Vec<ProductDiscount>> {
        Ok(sqlx::query_as::<_, ProductDiscount>(
            "SELECT p.id AS product_id, p.name, p.price, d.percentage \
             FROM product_discounts d JOIN products p ON p.id = d.product_id ORDER BY p.id",
        )
        .fetch_all(&self.pool)
        .await?)
    }

    async fn set_product_discount(&self, product_id: i64, percentage: Option<Decimal>) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;
        let exists: Option<(i64,)> = sqlx::query_as("SELECT id FROM products WHERE id = $1 FOR SHARE")
            .bind(product_id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Ok(false);
        }
        match percentage.filter(|p| !p.is_zero()) {
            Some(pct) => {
                sqlx::query(
                    "INSERT INTO product_discounts (product_id, percentage) VALUES ($1, $2) \
                     ON CONFLICT (product_id) DO UPDATE SET percentage = EXCLUDED.percentage",
                )
                .bind(product_id)
                .bind(pct)
                .execute(&mut *tx)
                .await?;
            }
            None => {
                sqlx::query("DELETE FROM product_discounts WHERE product_id = $1").bind(product_id).execute(&mut *tx).await?;
            }
        }
        tx.commit().await?;
        Ok(true)
    }

    async fn apply_transition(&self, order_id: Uuid, transition: &Transition, now: DateTime<Utc>) -> StoreResult<bool> {
        let allowed: Vec<String> = transition.allowed_from().iter().map(|s| s.as_str().to_string()).collect();
        let target = transition.target().as_str();
        let query = match transition {
            Transition::SubmitProof { reference } => sqlx::query(
                "UPDATE orders SET status = $3, proof_ref = $4, payment_method = 'transfer', paid_at = $5 \
                 WHERE id = $1 AND status = ANY($2)",
            )
            .bind(order_id)
            .bind(allowed)
            .bind(target)
            .bind(reference.as_str())
            .bind(now),
            Transition::Validate => sqlx::query("UPDATE orders SET status = $3, paid_at = $4 WHERE id = $1 AND status = ANY($2)")
                .bind(order_id)
                .bind(allowed)
                .bind(target)
                .bind(now),
            Transition::Cancel => sqlx::query("UPDATE orders SET status = $3 WHERE id = $1 AND status = ANY($2)")
                .bind(order_id)
                .bind(allowed)
                .bind(target),
            Transition::CashSettle => sqlx::query(
                "UPDATE orders SET status = $3, payment_method = 'cash', paid_at = COALESCE(paid_at, $4) \
                 WHERE id = $1 AND status = ANY($2)",
            )
            .bind(order_id)
            .bind(allowed)
            .bind(target)
            .bind(now),
        };
        Ok(query.execute(&self.pool).await?.rows_affected() == 1)
    }

    async fn order(&self, order_id: Uuid) -> StoreResult<Option<OrderDetail>> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS}, c.name AS customer_name \
             FROM orders o LEFT JOIN customers c ON c.national_id = o.customer_id WHERE o.id = $1"
        );
        let Some(row) = sqlx::query_as::<_, OrderSummaryRow>(&sql).bind(order_id).fetch_optional(&self.pool).await? else {
            return Ok(None);
        };
        let lines = sqlx::query_as::<_, OrderLineDetail>(
            "SELECT l.product_id, p.name AS product_name, l.quantity, l.unit_price, l.subtotal \
             FROM order_lines l JOIN products p ON p.id = l.product_id WHERE l.order_id = $1 ORDER BY l.id",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(Some(OrderDetail { order: row.order.try_into()?, customer_name: row.customer_name, lines }))
    }

    async fn list_orders(&self, filter: &OrderFilter) -> StoreResult<Vec<OrderSummary>> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {ORDER_COLUMNS}, c.name AS customer_name \
             FROM orders o LEFT JOIN customers c ON c.national_id = o.customer_id WHERE TRUE"
        ));
        if let Some(after) = filter.created_after() {
            qb.push(" AND o.created_at >= ").push_bind(after);
        }
        if let Some(before) = filter.created_before() {
            qb.push(" AND o.created_at < ").push_bind(before);
        }
        if let Some(status) = filter.status {
            qb.push(" AND o.status = ").push_bind(status.as_str());
        }
        qb.push(" ORDER BY o.created_at DESC");

        qb.build_query_as::<OrderSummaryRow>()
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(|r| Ok(OrderSummary { order: r.order.try_into()?, customer_name: r.customer_name }))
            .collect()
    }

    async fn order_by_provider_transaction(&self, provider_transaction_id: &str) -> StoreResult<Option<Order>> {
        let mut conn = self.pool.acquire().await?;
        fetch_order_by_provider_transaction(&mut *conn, provider_transaction_id).await
    }

    async fn create_customer(&self, customer: &Customer) -> StoreResult<()> {
        sqlx::query("INSERT INTO customers (national_id, name, email, phone, address) VALUES ($1, $2, $3, $4, $5)")
            .bind(customer.national_id.as_str())
            .bind(&customer.name)
            .bind(&customer.email)
            .bind(&customer.phone)
            .bind(&customer.address)
            .execute(&self.pool)
            .await
            .map_err(|e| if is_unique_violation(&e, None) { StoreError::DuplicateCustomer } else { e.into() })?;
        Ok(())
    }

    async fn customer(&self, national_id: &str) -> StoreResult<Option<Customer>> {
        sqlx::query_as::<_, CustomerRow>("SELECT national_id, name, email, phone, address FROM customers WHERE national_id = $1")
            .bind(national_id)
            .fetch_optional(&self.pool)
            .await?
            .map(Customer::try_from)
            .transpose()
    }

    async fn update_customer(&self, customer: &Customer) -> StoreResult<bool> {
        let result = sqlx::query("UPDATE customers SET name = $2, email = $3, phone = $4, address = $5 WHERE national_id = $1")
            .bind(customer.national_id.as_str())
            .bind(&customer.name)
            .bind(&customer.email)
            .bind(&customer.phone)
            .bind(&customer.address)
            .execute(&self.pool)
            .await
            .map_err(|e| if is_unique_violation(&e, None) { StoreError::DuplicateCustomer } else { e.into() })?;
        Ok(result.rows_affected() > 0)
    }

    async fn customers(&self) -> StoreResult<Vec<Customer>> {
        sqlx::query_as::<_, CustomerRow>("SELECT national_id, name, email, phone, address FROM customers ORDER BY name")
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Customer::try_from)
            .collect()
    }

    async fn search_customers(&self, term: &str, limit: usize) -> StoreResult<Vec<Customer>> {
        sqlx::query_as::<_, CustomerRow>(
            "SELECT national_id, name, email, phone, address FROM customers \
             WHERE name ILIKE $1 OR national_id LIKE $1 ORDER BY name LIMIT $2",
        )
        .bind(contains_pattern(term))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Customer::try_from)
        .collect()
    }

    async fn delete_customer(&self, national_id: &str) -> StoreResult<bool> {
        let deleted = sqlx::query(
            "DELETE FROM customers c WHERE c.national_id = $1 \
             AND NOT EXISTS (SELECT 1 FROM orders o WHERE o.customer_id = c.national_id)",
        )
        .bind(national_id)
        .execute(&self.pool)
        .await?
        .rows_affected();
        if deleted > 0 {
            return Ok(true);
        }
        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM customers WHERE national_id = $1)")
            .bind(national_id)
            .fetch_one(&self.pool)
            .await?;
        if exists {
            return Err(StoreError::CustomerHasOrders(national_id.to_string()));
        }
        Ok(false)
    }
}

/// `%term%` with LIKE wildcards in `term` escaped.
fn contains_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

pub struct PgTx {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgTx {
    fn conn(&mut self) -> StoreResult<&mut PgConnection> {
        self.tx.as_deref_mut().ok_or(StoreError::TransactionClosed)
    }
}

#[async_trait]
impl StoreTx for PgTx {
    async fn lock_product_for_update(&mut self, product_id: i64) -> StoreResult<Option<Product>> {
        let sql = format!("{PRODUCT_COLUMNS} WHERE p.id = $1 FOR UPDATE OF p");
        Ok(sqlx::query_as::<_, Product>(&sql).bind(product_id).fetch_optional(self.conn()?).await?)
    }

    async fn order_by_provider_transaction(&mut self, provider_transaction_id: &str) -> StoreResult<Option<Order>> {
        fetch_order_by_provider_transaction(self.conn()?, provider_transaction_id).await
    }

    async fn insert_order(&mut self, order: &Order) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO orders (id, customer_id, created_at, paid_at, total, discount, discount_type, status, \
             payment_method, proof_ref, provider_transaction_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(order.id)
        .bind(&order.customer_id)
        .bind(order.created_at)
        .bind(order.paid_at)
        .bind(order.total)
        .bind(order.discount)
        .bind(order.discount_type.as_str())
        .bind(order.status.as_str())
        .bind(order.payment_method.as_str())
        .bind(&order.proof_ref)
        .bind(&order.provider_transaction_id)
        .execute(self.conn()?)
        .await
        .map_err(|e| match &order.provider_transaction_id {
            Some(txn) if is_unique_violation(&e, Some(PROVIDER_TXN_INDEX)) => StoreError::DuplicateProviderTransaction(txn.clone()),
            _ => e.into(),
        })?;
        Ok(())
    }

    async fn insert_order_line(&mut self, line: &OrderLine) -> StoreResult<()> {
        sqlx::query("INSERT INTO order_lines (order_id, product_id, quantity, unit_price, subtotal) VALUES ($1, $2, $3, $4, $5)")
            .bind(line.order_id)
            .bind(line.product_id)
            .bind(line.quantity)
            .bind(line.unit_price)
            .bind(line.subtotal)
            .execute(self.conn()?)
            .await?;
        Ok(())
    }

    async fn decrement_stock(&mut self, product_id: i64, quantity: i32) -> StoreResult<()> {
        let result = sqlx::query("UPDATE products SET stock = stock - $2 WHERE id = $1 AND stock >= $2")
            .bind(product_id)
            .bind(quantity)
            .execute(self.conn()?)
            .await?;
        if result.rows_affected() != 1 {
            return Err(StoreError::StockUnderflow(product_id));
        }
        Ok(())
    }

    async fn commit(&mut self) -> StoreResult<()> {
        let tx = self.tx.take().ok_or(StoreError::TransactionClosed)?;
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(&mut self) -> StoreResult<()> {
        match self.tx.take() {
            Some(tx) => Ok(tx.rollback().await?),
            None => Ok(()),
        }
    }
}
