//! Discount catalog administration.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, put};
use axum::{Json, Router};
use rust_decimal::Decimal;
use serde::Deserialize;
use validator::Validate;

use super::extract::{ApiPath, ValidatedJson};
use super::AppState;
use crate::domain::aggregates::ProductDiscount;
use crate::domain::discount::{DiscountKind, DiscountRule};
use crate::error::ShopResult;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateRuleRequest {
    pub kind: DiscountKind,
    pub threshold: Decimal,
    pub percentage: Decimal,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateRuleRequest {
    pub threshold: Decimal,
    pub percentage: Decimal,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ProductDiscountRequest {
    pub percentage: Option<Decimal>,
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/discounts", get(list_rules).post(create_rule))
        .route("/discounts/:id", put(update_rule).delete(delete_rule))
        .route("/discounts/products", get(list_product_discounts))
        .route("/discounts/products/:product_id", put(set_product_discount))
}

async fn list_rules(State(s): State<AppState>) -> ShopResult<Json<Vec<DiscountRule>>> {
    Ok(Json(s.catalog.rules().await?))
}

async fn create_rule(State(s): State<AppState>, ValidatedJson(req): ValidatedJson<CreateRuleRequest>) -> ShopResult<(StatusCode, Json<DiscountRule>)> {
    let rule = s.catalog.create_rule(req.kind, req.threshold, req.percentage).await?;
    Ok((StatusCode::CREATED, Json(rule)))
}

async fn update_rule(State(s): State<AppState>, ApiPath(id): ApiPath<i64>, ValidatedJson(req): ValidatedJson<UpdateRuleRequest>) -> ShopResult<Json<DiscountRule>> {
    Ok(Json(s.catalog.update_rule(id, req.threshold, req.percentage).await?))
}

async fn delete_rule(State(s): State<AppState>, ApiPath(id): ApiPath<i64>) -> ShopResult<StatusCode> {
    s.catalog.delete_rule(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_product_discounts(State(s): State<AppState>) -> ShopResult<Json<Vec<ProductDiscount>>> {
    Ok(Json(s.catalog.product_discounts().await?))
}

async fn set_product_discount(
    State(s): State<AppState>,
    ApiPath(product_id): ApiPath<i64>,
    ValidatedJson(req): ValidatedJson<ProductDiscountRequest>,
) -> ShopResult<StatusCode> {
    s.catalog.set_product_discount(product_id, req.percentage).await?;
    Ok(StatusCode::NO_CONTENT)
}
