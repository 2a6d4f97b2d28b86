mod common;

use axum::http::{Method, StatusCode};
use rust_decimal::Decimal;
use serde_json::json;

use common::{money, TestApp, CUSTOMER};

fn cash_order(product_id: i64, quantity: i32) -> serde_json::Value {
    json!({ "customerId": CUSTOMER, "items": [{ "productId": product_id, "quantity": quantity }], "paymentMethod": "cash" })
}

fn transfer_order(product_id: i64, quantity: i32) -> serde_json::Value {
    json!({ "customerId": CUSTOMER, "items": [{ "productId": product_id, "quantity": quantity }], "paymentMethod": "transfer" })
}

#[tokio::test]
async fn test_health() {
    let app = TestApp::new();
    let (status, body) = app.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_cash_order_and_detail() {
    let app = TestApp::new().with_product(7, "Red roses", Decimal::from(20), 10);

    let (status, body) = app.json(Method::POST, "/api/v1/orders", cash_order(7, 3)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["totalFinal"].as_f64(), Some(60.0));
    assert_eq!(body["discountApplied"].as_f64(), Some(0.0));
    assert_eq!(body["discountType"], "none");
    assert_eq!(body["status"], "paid");
    assert_eq!(app.store.product(7).unwrap().stock, 7);

    let id = body["orderId"].as_str().unwrap().to_string();
    let (status, detail) = app.get(&format!("/api/v1/orders/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["paymentMethod"], "cash");
    let lines = detail["lines"].as_array().unwrap();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["productName"], "Red roses");
    assert_eq!(lines[0]["quantity"], 3);
    assert_eq!(lines[0]["unitPrice"].as_f64(), Some(20.0));
    assert_eq!(lines[0]["subtotal"].as_f64(), Some(60.0));
}

#[tokio::test]
async fn test_amount_rule_through_admin_api() {
    let app = TestApp::new().with_product(7, "Red roses", Decimal::from(20), 10);

    // warm the discount cache before the rule exists
    let (status, _) = app.json(Method::POST, "/api/v1/orders/quote", json!({ "items": [{ "productId": 7, "quantity": 3 }] })).await;
    assert_eq!(status, StatusCode::OK);

    let (status, rule) = app.json(Method::POST, "/api/v1/discounts", json!({ "kind": "amount", "threshold": 50, "percentage": 5 })).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(rule["kind"], "amount");

    let (status, quote) = app.json(Method::POST, "/api/v1/orders/quote", json!({ "items": [{ "productId": 7, "quantity": 3 }] })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(quote["subtotal"].as_f64(), Some(60.0));
    let candidates = quote["candidates"].as_array().unwrap();
    assert_eq!(candidates.len(), 3);
    assert_eq!(candidates[1]["discountType"], "amount");
    assert_eq!(candidates[1]["value"].as_f64(), Some(3.0));
    assert_eq!(candidates[2]["value"].as_f64(), Some(0.0));

    let (status, body) = app.json(Method::POST, "/api/v1/orders", cash_order(7, 3)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["discountApplied"].as_f64(), Some(3.0));
    assert_eq!(body["totalFinal"].as_f64(), Some(57.0));
    assert_eq!(body["discountType"], "amount");
}

#[tokio::test]
async fn test_insufficient_stock_is_rejected_without_writes() {
    let app = TestApp::new().with_product(7, "Red roses", Decimal::from(20), 2);

    let (status, body) = app.json(Method::POST, "/api/v1/orders", cash_order(7, 5)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("2 available"));
    assert!(app.store.orders().is_empty());
    assert_eq!(app.store.product(7).unwrap().stock, 2);
}

#[tokio::test]
async fn test_injected_commit_failure_returns_generic_500() {
    let app = TestApp::new().with_product(7, "Red roses", Decimal::from(20), 10);
    app.store.fail_next_commit();

    let (status, body) = app.json(Method::POST, "/api/v1/orders", cash_order(7, 3)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "internal server error");
    assert!(app.store.orders().is_empty() && app.store.lines().is_empty());
    assert_eq!(app.store.product(7).unwrap().stock, 10);
}

#[tokio::test]
async fn test_client_price_fields_are_ignored() {
    let app = TestApp::new().with_product(7, "Red roses", money(1250, 2), 10);
    let body = json!({
        "customerId": CUSTOMER,
        "items": [{ "productId": 7, "quantity": 2, "unitPrice": 0.01, "price": 0.01 }],
        "paymentMethod": "cash",
        "total": 0.02
    });

    let (status, created) = app.json(Method::POST, "/api/v1/orders", body).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["totalFinal"].as_f64(), Some(25.0));

    app.store.set_price(7, Decimal::from(99));
    assert_eq!(app.store.lines()[0].unit_price, money(1250, 2));
}

#[tokio::test]
async fn test_request_validation() {
    let app = TestApp::new().with_product(7, "Red roses", Decimal::from(20), 10);

    let (status, body) = app.json(Method::POST, "/api/v1/orders", json!({ "customerId": CUSTOMER, "items": [], "paymentMethod": "cash" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, _) = app.json(Method::POST, "/api/v1/orders", json!({ "customerId": CUSTOMER, "items": [{ "productId": 7, "quantity": 1 }], "paymentMethod": "bitcoin" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.json(Method::POST, "/api/v1/orders", cash_order(7, -1)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.json(Method::POST, "/api/v1/orders", cash_order(404, 1)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_paypal_replay_returns_same_order() {
    let app = TestApp::new().with_product(7, "Red roses", Decimal::from(20), 10);
    let req = json!({ "customerId": CUSTOMER, "items": [{ "productId": 7, "quantity": 2 }], "providerTransactionId": "5O190127TN364715T" });

    let (status, first) = app.json(Method::POST, "/api/v1/orders/paypal", req.clone()).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(first["status"], "paid");
    assert_eq!(first["providerTransactionId"], "5O190127TN364715T");

    let (status, again) = app.json(Method::POST, "/api/v1/orders/paypal", req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again["orderId"], first["orderId"]);
    assert_eq!(app.store.product(7).unwrap().stock, 8);
}

#[tokio::test]
async fn test_transfer_flow_with_proof_and_validation() {
    let app = TestApp::new().with_product(7, "Red roses", Decimal::from(20), 10);

    let (_, created) = app.json(Method::POST, "/api/v1/orders", transfer_order(7, 1)).await;
    assert_eq!(created["status"], "pending_validation");
    let id = created["orderId"].as_str().unwrap().to_string();

    let (status, detail) = app.upload_proof(&id, "transfer.png", b"\x89PNG fake").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["status"], "pending_validation");
    let reference = detail["proofRef"].as_str().unwrap();
    assert!(app.proof_dir().join(reference).exists());

    let (status, detail) = app.put(&format!("/api/v1/orders/{id}/validate")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["status"], "paid");
    assert!(detail["paidAt"].is_string());

    let (status, body) = app.put(&format!("/api/v1/orders/{id}/validate")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("not in a valid state"));

    // paid is terminal for proof uploads
    let (status, _) = app.upload_proof(&id, "again.png", b"\x89PNG again").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (_, detail) = app.get(&format!("/api/v1/orders/{id}")).await;
    assert_eq!(detail["status"], "paid");
    assert_eq!(detail["proofRef"].as_str(), Some(reference));
}

#[tokio::test]
async fn test_proof_upload_requires_file() {
    let app = TestApp::new().with_product(7, "Red roses", Decimal::from(20), 10);
    let (_, created) = app.json(Method::POST, "/api/v1/orders", transfer_order(7, 1)).await;
    let id = created["orderId"].as_str().unwrap().to_string();

    let (status, _) = app.upload_proof(&id, "notes.txt", b"hello").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = app.upload_proof(&id, "empty.png", b"").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_cash_settle_twice_keeps_payment_time() {
    let app = TestApp::new().with_product(7, "Red roses", Decimal::from(20), 10);
    let (_, created) = app.json(Method::POST, "/api/v1/orders", transfer_order(7, 1)).await;
    let id = created["orderId"].as_str().unwrap().to_string();

    let (status, first) = app.put(&format!("/api/v1/orders/{id}/cash-settle")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["status"], "paid");
    assert_eq!(first["paymentMethod"], "cash");

    let (status, second) = app.put(&format!("/api/v1/orders/{id}/cash-settle")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["status"], "paid");
    assert_eq!(second["paidAt"], first["paidAt"]);
}

#[tokio::test]
async fn test_cancel_rules() {
    let app = TestApp::new().with_product(7, "Red roses", Decimal::from(20), 10);
    let (_, pending) = app.json(Method::POST, "/api/v1/orders", transfer_order(7, 1)).await;
    let (_, paid) = app.json(Method::POST, "/api/v1/orders", cash_order(7, 1)).await;

    let (status, detail) = app.put(&format!("/api/v1/orders/{}/cancel", pending["orderId"].as_str().unwrap())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["status"], "cancelled");

    let (status, _) = app.put(&format!("/api/v1/orders/{}/cancel", paid["orderId"].as_str().unwrap())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_order() {
    let app = TestApp::new();
    let id = uuid::Uuid::now_v7();
    let (status, _) = app.get(&format!("/api/v1/orders/{id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app.put(&format!("/api/v1/orders/{id}/validate")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_malformed_request_parts_get_json_errors() {
    let app = TestApp::new();

    let (status, body) = app.get("/api/v1/orders/not-a-uuid").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().is_some());

    let (status, body) = app.get("/api/v1/orders?from=yesterday").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().is_some());

    let (status, body) = app.json(Method::PUT, &format!("/api/v1/orders/{}/proof", uuid::Uuid::now_v7()), json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().is_some());

    let (status, body) = app.put("/api/v1/discounts/abc").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().is_some());
}

#[tokio::test]
async fn test_list_orders_filters_by_status() {
    let app = TestApp::new().with_product(7, "Red roses", Decimal::from(20), 10);
    app.json(Method::POST, "/api/v1/orders", cash_order(7, 1)).await;
    app.json(Method::POST, "/api/v1/orders", transfer_order(7, 1)).await;

    let (status, all) = app.get("/api/v1/orders").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(all.as_array().unwrap().len(), 2);

    let (_, pending) = app.get("/api/v1/orders?status=pending_validation").await;
    let pending = pending.as_array().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0]["paymentMethod"], "transfer");

    let (_, none) = app.get("/api/v1/orders?from=2000-01-01&to=2000-01-31").await;
    assert!(none.as_array().unwrap().is_empty());

    let (status, _) = app.get("/api/v1/orders?status=shipped").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_product_discount_admin() {
    let app = TestApp::new().with_product(7, "Red roses", Decimal::from(20), 10);

    let (status, _) = app.json(Method::PUT, "/api/v1/discounts/products/7", json!({ "percentage": 10 })).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, listed) = app.get("/api/v1/discounts/products").await;
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let (_, created) = app.json(Method::POST, "/api/v1/orders", cash_order(7, 3)).await;
    assert_eq!(created["discountType"], "product");
    assert_eq!(created["totalFinal"].as_f64(), Some(54.0));

    let (status, _) = app.json(Method::PUT, "/api/v1/discounts/products/99", json!({ "percentage": 10 })).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app.json(Method::PUT, "/api/v1/discounts/products/7", json!({ "percentage": 150 })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_discount_rule_crud() {
    let app = TestApp::new();

    let (_, rule) = app.json(Method::POST, "/api/v1/discounts", json!({ "kind": "quantity", "threshold": 5, "percentage": 5 })).await;
    let id = rule["id"].as_i64().unwrap();

    let (status, updated) = app.json(Method::PUT, &format!("/api/v1/discounts/{id}"), json!({ "threshold": 6, "percentage": 7 })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["percentage"].as_f64(), Some(7.0));

    let (_, rules) = app.get("/api/v1/discounts").await;
    assert_eq!(rules.as_array().unwrap().len(), 1);

    let (status, body) = app.json(Method::POST, "/api/v1/discounts", json!({ "kind": "quantity", "threshold": 6, "percentage": 10 })).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().is_some());

    let req = axum::http::Request::builder().method(Method::DELETE).uri(format!("/api/v1/discounts/{id}")).body(axum::body::Body::empty()).unwrap();
    let (status, _) = app.send(req).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, rules) = app.get("/api/v1/discounts").await;
    assert!(rules.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_customer_registration() {
    let app = TestApp::new();
    let customer = json!({
        "nationalId": CUSTOMER,
        "name": "María López",
        "email": "maria@example.com",
        "phone": "0991234567",
        "address": "Calle 10 de Agosto"
    });

    let (status, body) = app.json(Method::POST, "/api/v1/customers", customer.clone()).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["name"], "MARÍA LÓPEZ");
    assert_eq!(body["email"], "MARIA@EXAMPLE.COM");

    let (status, _) = app.json(Method::POST, "/api/v1/customers", customer).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = app.get(&format!("/api/v1/customers/{CUSTOMER}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["nationalId"], CUSTOMER);

    let (status, _) = app.get("/api/v1/customers/0926687856").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let bad = json!({ "nationalId": "1234567890", "name": "X", "email": "x@example.com", "phone": "0991234567", "address": "Y" });
    let (status, _) = app.json(Method::POST, "/api/v1/customers", bad).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_order_shows_customer_name() {
    let app = TestApp::new().with_product(7, "Red roses", Decimal::from(20), 10);
    let customer = json!({ "nationalId": CUSTOMER, "name": "Ana", "email": "ana@example.com", "phone": "0991234567", "address": "Quito" });
    app.json(Method::POST, "/api/v1/customers", customer).await;

    let (_, created) = app.json(Method::POST, "/api/v1/orders", cash_order(7, 1)).await;
    let (_, detail) = app.get(&format!("/api/v1/orders/{}", created["orderId"].as_str().unwrap())).await;
    assert_eq!(detail["customerName"], "ANA");
}

#[tokio::test]
async fn test_customer_admin_list_search_and_delete() {
    let app = TestApp::new().with_product(7, "Red roses", Decimal::from(20), 10);
    let ana = json!({ "nationalId": CUSTOMER, "name": "Ana Vera", "email": "ana@example.com", "phone": "0991234567", "address": "Quito" });
    let luis = json!({ "nationalId": "0926687856", "name": "Luis Andrade", "email": "luis@example.com", "phone": "0987654321", "address": "Guayaquil" });
    app.json(Method::POST, "/api/v1/customers", ana).await;
    app.json(Method::POST, "/api/v1/customers", luis).await;
    app.json(Method::POST, "/api/v1/orders", cash_order(7, 1)).await;

    let (status, all) = app.get("/api/v1/customers").await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = all.as_array().unwrap().iter().map(|c| c["name"].as_str().unwrap()).collect();
    assert_eq!(names, ["ANA VERA", "LUIS ANDRADE"]);

    let (status, found) = app.get("/api/v1/customers/search/andr").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(found.as_array().unwrap().len(), 1);
    assert_eq!(found[0]["nationalId"], "0926687856");
    let (status, _) = app.get("/api/v1/customers/search/an").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let delete = |id: &str| {
        axum::http::Request::builder().method(Method::DELETE).uri(format!("/api/v1/customers/{id}")).body(axum::body::Body::empty()).unwrap()
    };
    let (status, body) = app.send(delete(CUSTOMER)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().is_some());

    let (status, _) = app.send(delete("0926687856")).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app.send(delete("0926687856")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (_, all) = app.get("/api/v1/customers").await;
    assert_eq!(all.as_array().unwrap().len(), 1);
}
