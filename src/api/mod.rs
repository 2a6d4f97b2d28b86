//! HTTP surface.
//!
//! Admin routes live in their own router so an authentication layer can be
//! attached to them without touching the storefront routes.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::proof::ProofStore;
use crate::publisher::EventPublisher;
use crate::services::{Checkout, Customers, DiscountCatalog, Lifecycle};
use crate::store::Store;

pub mod customers;
pub mod discounts;
pub mod extract;
pub mod orders;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub catalog: Arc<DiscountCatalog>,
    pub checkout: Checkout,
    pub lifecycle: Lifecycle,
    pub customers: Customers,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, proofs: Arc<dyn ProofStore>, publisher: EventPublisher, discount_ttl: Duration) -> Self {
        let catalog = Arc::new(DiscountCatalog::new(Arc::clone(&store), discount_ttl));
        Self {
            checkout: Checkout::new(Arc::clone(&store), Arc::clone(&catalog), publisher.clone()),
            lifecycle: Lifecycle::new(Arc::clone(&store), proofs, publisher),
            customers: Customers::new(Arc::clone(&store)),
            catalog,
            store,
        }
    }
}

pub fn admin_routes() -> Router<AppState> {
    Router::new().merge(orders::admin_routes()).merge(discounts::admin_routes()).merge(customers::admin_routes())
}

pub fn router(state: AppState) -> Router {
    let api = Router::new().merge(orders::routes()).merge(customers::routes()).merge(admin_routes());
    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive()))
        .with_state(state)
}

async fn health(State(s): State<AppState>) -> (StatusCode, Json<Value>) {
    match s.store.ping().await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "healthy", "service": "flowershop-orders" }))),
        Err(e) => {
            tracing::error!(error = %e, "health check failed");
            (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "status": "unhealthy", "service": "flowershop-orders" })))
        }
    }
}
