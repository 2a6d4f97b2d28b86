#![allow(dead_code)]

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use rust_decimal::Decimal;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

use flowershop_orders::api::{self, AppState};
use flowershop_orders::domain::aggregates::Product;
use flowershop_orders::proof::LocalProofStore;
use flowershop_orders::publisher::EventPublisher;
use flowershop_orders::services::{Checkout, DiscountCatalog};
use flowershop_orders::store::{MemoryStore, Store};

pub const CUSTOMER: &str = "1710034065";

pub struct TestApp {
    pub store: MemoryStore,
    pub router: Router,
    proof_dir: TempDir,
}

impl TestApp {
    pub fn new() -> Self {
        let store = MemoryStore::new();
        let proof_dir = TempDir::new().unwrap();
        let state = AppState::new(
            Arc::new(store.clone()),
            Arc::new(LocalProofStore::new(proof_dir.path())),
            EventPublisher::disabled(),
            Duration::from_secs(60),
        );
        Self { store, router: api::router(state), proof_dir }
    }

    pub fn proof_dir(&self) -> &Path { self.proof_dir.path() }

    pub fn with_product(self, id: i64, name: &str, price: Decimal, stock: i32) -> Self {
        self.store.insert_product(Product::new(id, name, price, stock));
        self
    }

    pub async fn send(&self, req: Request<Body>) -> (StatusCode, Value) {
        let resp = self.router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
        (status, body)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Request::builder().uri(uri).body(Body::empty()).unwrap()).await
    }

    pub async fn json(&self, method: Method, uri: &str, body: Value) -> (StatusCode, Value) {
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(req).await
    }

    pub async fn put(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Request::builder().method(Method::PUT).uri(uri).body(Body::empty()).unwrap()).await
    }

    pub async fn upload_proof(&self, order_id: &str, file_name: &str, bytes: &[u8]) -> (StatusCode, Value) {
        let boundary = "flowershop-test-boundary";
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"proof\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
        let req = Request::builder()
            .method(Method::PUT)
            .uri(format!("/api/v1/orders/{order_id}/proof"))
            .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={boundary}"))
            .body(Body::from(body))
            .unwrap();
        self.send(req).await
    }
}


/// Checkout service wired to `store`, for tests that bypass HTTP.
pub fn checkout(store: &MemoryStore) -> Checkout {
    let shared: Arc<dyn Store> = Arc::new(store.clone());
    let catalog = Arc::new(DiscountCatalog::new(Arc::clone(&shared), Duration::from_secs(60)));
    Checkout::new(shared, catalog, EventPublisher::disabled())
}

pub fn money(units: i64, scale: u32) -> Decimal { Decimal::new(units, scale) }
