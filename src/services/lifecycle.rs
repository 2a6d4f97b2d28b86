//! Post-checkout payment state changes and order reads.
//!
//! Each transition is a single guarded update in the store. When the guard
//! matches nothing the caller gets [`ShopError::InvalidState`]; missing and
//! wrong-state orders get the same error.

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::aggregates::{OrderDetail, OrderSummary, Transition};
use crate::domain::events::OrderEvent;
use crate::error::{ShopError, ShopResult};
use crate::proof::ProofStore;
use crate::publisher::EventPublisher;
use crate::store::{OrderFilter, Store};

#[derive(Clone)]
pub struct Lifecycle {
    store: Arc<dyn Store>,
    proofs: Arc<dyn ProofStore>,
    publisher: EventPublisher,
}

impl Lifecycle {
    pub fn new(store: Arc<dyn Store>, proofs: Arc<dyn ProofStore>, publisher: EventPublisher) -> Self {
        Self { store, proofs, publisher }
    }

    pub async fn order(&self, order_id: Uuid) -> ShopResult<OrderDetail> {
        self.store.order(order_id).await?.ok_or_else(|| ShopError::NotFound(format!("order {order_id}")))
    }

    pub async fn list(&self, filter: &OrderFilter) -> ShopResult<Vec<OrderSummary>> { Ok(self.store.list_orders(filter).await?) }

    /// Store the proof, then move the order to pending validation. The stored
    /// file is removed again if the order refuses the transition.
    #[tracing::instrument(name = "lifecycle.submit_proof", skip(self, bytes), fields(size = bytes.len()))]
    pub async fn submit_proof(&self, order_id: Uuid, file_name: Option<&str>, bytes: &[u8]) -> ShopResult<OrderDetail> {
        let reference = self.proofs.store(order_id, file_name, bytes).await?;
        let result = self.transition(order_id, Transition::SubmitProof { reference: reference.clone() }).await;
        if result.is_err() {
            if let Err(e) = self.proofs.discard(&reference).await {
                tracing::warn!(error = %e, %reference, "could not discard orphaned proof");
            }
        }
        result
    }

    pub async fn validate(&self, order_id: Uuid) -> ShopResult<OrderDetail> { self.transition(order_id, Transition::Validate).await }
    pub async fn cancel(&self, order_id: Uuid) -> ShopResult<OrderDetail> { self.transition(order_id, Transition::Cancel).await }
    pub async fn cash_settle(&self, order_id: Uuid) -> ShopResult<OrderDetail> { self.transition(order_id, Transition::CashSettle).await }

    async fn transition(&self, order_id: Uuid, transition: Transition) -> ShopResult<OrderDetail> {
        if !self.store.apply_transition(order_id, &transition, Utc::now()).await? {
            tracing::warn!(%order_id, action = transition.name(), "transition refused");
            return Err(ShopError::InvalidState { action: transition.name() });
        }
        tracing::info!(%order_id, action = transition.name(), status = %transition.target(), "order transitioned");
        self.publisher.publish(OrderEvent::for_transition(order_id, &transition)).await;
        self.order(order_id).await
    }
}
