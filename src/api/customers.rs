//! Customer endpoints.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use validator::Validate;

use super::extract::{ApiPath, ValidatedJson};
use super::AppState;
use crate::domain::aggregates::{ContactDetails, Customer};
use crate::error::ShopResult;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ContactRequest {
    #[validate(length(min = 1, max = 100, message = "name is required"))]
    pub name: String,
    #[validate(email(message = "email is not valid"))]
    pub email: String,
    #[validate(length(min = 7, max = 20, message = "phone must have 7 to 20 characters"))]
    pub phone: String,
    #[validate(length(min = 1, max = 200, message = "address is required"))]
    pub address: String,
}

impl From<ContactRequest> for ContactDetails {
    fn from(r: ContactRequest) -> Self { Self { name: r.name, email: r.email, phone: r.phone, address: r.address } }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterCustomerRequest {
    #[validate(length(equal = 10, message = "national id must have 10 digits"))]
    pub national_id: String,
    #[serde(flatten)]
    #[validate]
    pub contact: ContactRequest,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/customers", post(register))
        .route("/customers/search/:term", get(search))
        .route("/customers/:national_id", get(get_customer).put(update_customer))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/customers", get(list_customers))
        .route("/customers/:national_id", delete(delete_customer))
}

async fn register(State(s): State<AppState>, ValidatedJson(req): ValidatedJson<RegisterCustomerRequest>) -> ShopResult<(StatusCode, Json<Customer>)> {
    let customer = s.customers.register(&req.national_id, req.contact.into()).await?;
    Ok((StatusCode::CREATED, Json(customer)))
}

async fn get_customer(State(s): State<AppState>, ApiPath(national_id): ApiPath<String>) -> ShopResult<Json<Customer>> {
    Ok(Json(s.customers.get(&national_id).await?))
}

async fn update_customer(
    State(s): State<AppState>,
    ApiPath(national_id): ApiPath<String>,
    ValidatedJson(req): ValidatedJson<ContactRequest>,
) -> ShopResult<Json<Customer>> {
    Ok(Json(s.customers.update(&national_id, req.into()).await?))
}

async fn list_customers(State(s): State<AppState>) -> ShopResult<Json<Vec<Customer>>> {
    Ok(Json(s.customers.list().await?))
}

async fn search(State(s): State<AppState>, ApiPath(term): ApiPath<String>) -> ShopResult<Json<Vec<Customer>>> {
    Ok(Json(s.customers.search(&term).await?))
}

async fn delete_customer(State(s): State<AppState>, ApiPath(national_id): ApiPath<String>) -> ShopResult<StatusCode> {
    s.customers.delete(&national_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
