//! Order endpoints.

use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::extract::{ApiMultipart, ApiPath, ApiQuery, FileUpload, ValidatedJson};
use super::AppState;
use crate::domain::aggregates::{CartLine, Order, OrderDetail, OrderStatus, OrderSummary, PaymentMethod};
use crate::domain::discount::{Candidate, DiscountType, PriceQuote};
use crate::domain::value_objects::round_money;
use crate::error::ShopResult;
use crate::store::OrderFilter;

pub const PROOF_FIELD: &str = "proof";
const MAX_PROOF_BYTES: usize = 5 * 1024 * 1024;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    #[validate(length(min = 1, max = 20, message = "customer id is required"))]
    pub customer_id: String,
    #[validate(length(min = 1, message = "at least one item is required"))]
    pub items: Vec<CartLine>,
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PaypalOrderRequest {
    #[validate(length(min = 1, max = 20, message = "customer id is required"))]
    pub customer_id: String,
    #[validate(length(min = 1, message = "at least one item is required"))]
    pub items: Vec<CartLine>,
    #[validate(length(min = 1, max = 128, message = "provider transaction id is required"))]
    pub provider_transaction_id: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct QuoteRequest {
    #[validate(length(min = 1, message = "at least one item is required"))]
    pub items: Vec<CartLine>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreated {
    pub order_id: Uuid,
    pub total_final: Decimal,
    pub discount_applied: Decimal,
    pub discount_type: DiscountType,
    pub status: OrderStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_transaction_id: Option<String>,
}

impl From<Order> for OrderCreated {
    fn from(o: Order) -> Self {
        Self {
            order_id: o.id,
            total_final: o.total,
            discount_applied: o.discount,
            discount_type: o.discount_type,
            status: o.status,
            provider_transaction_id: o.provider_transaction_id,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteResponse {
    pub subtotal: Decimal,
    pub total_items: i64,
    /// Every discount family with its rounded value, in tie-break order.
    pub candidates: Vec<Candidate>,
    pub discount_applied: Decimal,
    pub discount_type: DiscountType,
    pub total_final: Decimal,
}

impl From<PriceQuote> for QuoteResponse {
    fn from(q: PriceQuote) -> Self {
        Self {
            subtotal: q.subtotal,
            total_items: q.total_items,
            candidates: q.candidates.iter().map(|c| Candidate { value: round_money(c.value), ..*c }).collect(),
            discount_applied: q.discount,
            discount_type: q.discount_type,
            total_final: q.total,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub status: Option<String>,
}

impl ListParams {
    fn into_filter(self) -> ShopResult<OrderFilter> {
        let status = match self.status.as_deref().map(str::trim) {
            None | Some("") | Some("all") => None,
            Some(s) => Some(s.parse::<OrderStatus>()?),
        };
        Ok(OrderFilter { from: self.from, to: self.to, status })
    }
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/orders", post(create_order))
        .route("/orders/paypal", post(create_paypal_order))
        .route("/orders/quote", post(quote))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/proof", put(submit_proof).layer(DefaultBodyLimit::max(MAX_PROOF_BYTES + 64 * 1024)))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/orders", get(list_orders))
        .route("/orders/:id/validate", put(validate))
        .route("/orders/:id/cancel", put(cancel))
        .route("/orders/:id/cash-settle", put(cash_settle))
}

async fn create_order(State(s): State<AppState>, ValidatedJson(req): ValidatedJson<CreateOrderRequest>) -> ShopResult<(StatusCode, Json<OrderCreated>)> {
    let placed = s.checkout.place_order(&req.customer_id, &req.items, req.payment_method).await?;
    Ok((StatusCode::CREATED, Json(placed.order.into())))
}

async fn create_paypal_order(State(s): State<AppState>, ValidatedJson(req): ValidatedJson<PaypalOrderRequest>) -> ShopResult<(StatusCode, Json<OrderCreated>)> {
    let placed = s.checkout.place_paypal_order(&req.customer_id, &req.items, &req.provider_transaction_id).await?;
    let status = if placed.replayed { StatusCode::OK } else { StatusCode::CREATED };
    Ok((status, Json(placed.order.into())))
}

async fn quote(State(s): State<AppState>, ValidatedJson(req): ValidatedJson<QuoteRequest>) -> ShopResult<Json<QuoteResponse>> {
    Ok(Json(s.checkout.quote(&req.items).await?.into()))
}

async fn get_order(State(s): State<AppState>, ApiPath(id): ApiPath<Uuid>) -> ShopResult<Json<OrderDetail>> {
    Ok(Json(s.lifecycle.order(id).await?))
}

async fn list_orders(State(s): State<AppState>, ApiQuery(p): ApiQuery<ListParams>) -> ShopResult<Json<Vec<OrderSummary>>> {
    Ok(Json(s.lifecycle.list(&p.into_filter()?).await?))
}

async fn submit_proof(State(s): State<AppState>, ApiPath(id): ApiPath<Uuid>, ApiMultipart(multipart): ApiMultipart) -> ShopResult<Json<OrderDetail>> {
    let upload = FileUpload::read(multipart, PROOF_FIELD, MAX_PROOF_BYTES).await?;
    Ok(Json(s.lifecycle.submit_proof(id, upload.file_name.as_deref(), &upload.bytes).await?))
}

async fn validate(State(s): State<AppState>, ApiPath(id): ApiPath<Uuid>) -> ShopResult<Json<OrderDetail>> {
    Ok(Json(s.lifecycle.validate(id).await?))
}

async fn cancel(State(s): State<AppState>, ApiPath(id): ApiPath<Uuid>) -> ShopResult<Json<OrderDetail>> {
    Ok(Json(s.lifecycle.cancel(id).await?))
}

async fn cash_settle(State(s): State<AppState>, ApiPath(id): ApiPath<Uuid>) -> ShopResult<Json<OrderDetail>> {
    Ok(Json(s.lifecycle.cash_settle(id).await?))
}
