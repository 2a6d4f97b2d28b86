//! Domain events
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::aggregates::{OrderStatus, PaymentMethod, Transition};

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OrderEvent {
    Created { order_id: Uuid, customer_id: String, method: PaymentMethod, status: OrderStatus, total: Decimal },
    ProofSubmitted { order_id: Uuid },
    Paid { order_id: Uuid },
    Cancelled { order_id: Uuid },
}

impl OrderEvent {
    pub fn order_id(&self) -> Uuid {
        match self {
            Self::Created { order_id, .. }
            | Self::ProofSubmitted { order_id }
            | Self::Paid { order_id }
            | Self::Cancelled { order_id } => *order_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Created { .. } => "created",
            Self::ProofSubmitted { .. } => "proof_submitted",
            Self::Paid { .. } => "paid",
            Self::Cancelled { .. } => "cancelled",
        }
    }

    /// Event raised by a successful transition.
    pub fn for_transition(order_id: Uuid, transition: &Transition) -> Self {
        match transition {
            Transition::SubmitProof { .. } => Self::ProofSubmitted { order_id },
            Transition::Validate | Transition::CashSettle => Self::Paid { order_id },
            Transition::Cancel => Self::Cancelled { order_id },
        }
    }
}
