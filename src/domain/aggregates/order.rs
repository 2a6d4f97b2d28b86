//! Order Aggregate
//!
//! An order is written once by checkout. Afterwards only its payment state
//! moves, and only through a [`Transition`] whose guard matches the current
//! status.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::discount::DiscountType;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub customer_id: String,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub total: Decimal,
    pub discount: Decimal,
    pub discount_type: DiscountType,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    pub proof_ref: Option<String>,
    pub provider_transaction_id: Option<String>,
}

/// Line snapshot. `unit_price` is the stored price at checkout time and never changes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    pub order_id: Uuid,
    pub product_id: i64,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub subtotal: Decimal,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct OrderLineDetail {
    pub product_id: i64,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub subtotal: Decimal,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSummary {
    #[serde(flatten)]
    pub order: Order,
    pub customer_name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: Order,
    pub customer_name: Option<String>,
    pub lines: Vec<OrderLineDetail>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus { PendingPayment, PendingValidation, Paid, Cancelled }

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod { Cash, Transfer, Paypal }

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingPayment => "pending_payment",
            Self::PendingValidation => "pending_validation",
            Self::Paid => "paid",
            Self::Cancelled => "cancelled",
        }
    }
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Cash => "cash", Self::Transfer => "transfer", Self::Paypal => "paypal" }
    }

    /// Status an order starts in when created with this method.
    pub fn initial_status(&self) -> OrderStatus {
        match self {
            Self::Transfer => OrderStatus::PendingValidation,
            Self::Cash | Self::Paypal => OrderStatus::Paid,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for OrderStatus {
    type Err = OrderError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending_payment" => Ok(Self::PendingPayment),
            "pending_validation" => Ok(Self::PendingValidation),
            "paid" => Ok(Self::Paid),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(OrderError::UnknownStatus(other.to_string())),
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = OrderError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cash" => Ok(Self::Cash),
            "transfer" => Ok(Self::Transfer),
            "paypal" => Ok(Self::Paypal),
            other => Err(OrderError::UnknownPaymentMethod(other.to_string())),
        }
    }
}

impl Order {
    /// A freshly priced order in the initial state for its payment method.
    pub fn place(
        customer_id: impl Into<String>,
        method: PaymentMethod,
        total: Decimal,
        discount: Decimal,
        discount_type: DiscountType,
        now: DateTime<Utc>,
    ) -> Self {
        let status = method.initial_status();
        Self {
            id: Uuid::now_v7(),
            customer_id: customer_id.into(),
            created_at: now,
            paid_at: (status == OrderStatus::Paid).then_some(now),
            total,
            discount,
            discount_type,
            status,
            payment_method: method,
            proof_ref: None,
            provider_transaction_id: None,
        }
    }

    pub fn with_provider_transaction(mut self, id: impl Into<String>) -> Self {
        self.provider_transaction_id = Some(id.into());
        self
    }
}

/// Post-creation state changes. Each one is guarded by the set of statuses it may start from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Transition {
    SubmitProof { reference: String },
    Validate,
    Cancel,
    CashSettle,
}

impl Transition {
    pub fn allowed_from(&self) -> &'static [OrderStatus] {
        use OrderStatus::*;
        match self {
            Self::SubmitProof { .. } | Self::Validate | Self::Cancel => &[PendingPayment, PendingValidation],
            Self::CashSettle => &[PendingPayment, PendingValidation, Paid],
        }
    }

    pub fn target(&self) -> OrderStatus {
        match self {
            Self::SubmitProof { .. } => OrderStatus::PendingValidation,
            Self::Validate | Self::CashSettle => OrderStatus::Paid,
            Self::Cancel => OrderStatus::Cancelled,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::SubmitProof { .. } => "submit_proof",
            Self::Validate => "validate",
            Self::Cancel => "cancel",
            Self::CashSettle => "cash_settle",
        }
    }

    pub fn permits(&self, status: OrderStatus) -> bool { self.allowed_from().contains(&status) }

    /// Apply to an in-memory order. Mirrors the guarded UPDATE the database store issues.
    pub fn apply(&self, order: &mut Order, now: DateTime<Utc>) -> Result<(), OrderError> {
        if !self.permits(order.status) {
            return Err(OrderError::InvalidState { from: order.status, action: self.name() });
        }
        match self {
            Self::SubmitProof { reference } => {
                order.proof_ref = Some(reference.clone());
                order.payment_method = PaymentMethod::Transfer;
                order.paid_at = Some(now);
            }
            Self::Validate => order.paid_at = Some(now),
            Self::Cancel => {}
            Self::CashSettle => {
                order.payment_method = PaymentMethod::Cash;
                order.paid_at = order.paid_at.or(Some(now));
            }
        }
        order.status = self.target();
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderError {
    InvalidState { from: OrderStatus, action: &'static str },
    UnknownStatus(String),
    UnknownPaymentMethod(String),
}
impl std::error::Error for OrderError {}
impl fmt::Display for OrderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidState { from, action } => write!(f, "cannot {action} an order that is {from}"),
            Self::UnknownStatus(s) => write!(f, "unknown order status '{s}'"),
            Self::UnknownPaymentMethod(s) => write!(f, "unknown payment method '{s}'"),
        }
    }
}
