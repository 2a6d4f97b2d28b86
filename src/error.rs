//! Service-layer error type.
//!
//! Business failures carry a message meant for the client. Store failures are
//! logged here and answered with a generic 500.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::domain::aggregates::{CartError, OrderError};
use crate::proof::ProofStoreError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum ShopError {
    #[error("{0}")]
    Validation(String),

    #[error("insufficient stock for product {product_id}: {available} available")]
    InsufficientStock { product_id: i64, available: i32 },

    #[error("product {0} does not exist")]
    ProductNotFound(i64),

    #[error("order not found or not in a valid state to {action}")]
    InvalidState { action: &'static str },

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("payment proof storage failed")]
    ProofStorage(#[source] std::io::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type ShopResult<T> = std::result::Result<T, ShopError>;

impl ShopError {
    pub fn validation(msg: impl Into<String>) -> Self { Self::Validation(msg.into()) }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::InsufficientStock { .. } | Self::ProductNotFound(_) | Self::InvalidState { .. } => {
                StatusCode::BAD_REQUEST
            }
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Store(_) | Self::ProofStorage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<CartError> for ShopError {
    fn from(e: CartError) -> Self { Self::Validation(e.to_string()) }
}

impl From<OrderError> for ShopError {
    fn from(e: OrderError) -> Self {
        match e {
            OrderError::InvalidState { action, .. } => Self::InvalidState { action },
            other => Self::Validation(other.to_string()),
        }
    }
}

impl From<ProofStoreError> for ShopError {
    fn from(e: ProofStoreError) -> Self {
        match e {
            ProofStoreError::Io(io) => Self::ProofStorage(io),
            other => Self::Validation(other.to_string()),
        }
    }
}

impl IntoResponse for ShopError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::Store(e) => {
                tracing::error!(error = %e, "store failure");
                "internal server error".to_string()
            }
            Self::ProofStorage(e) => {
                tracing::error!(error = %e, "proof storage failure");
                "internal server error".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
