// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// End-to-end trade flow over the HTTP surface and in-memory
// infrastructure: idempotent trade requests, duplicate settlement
// delivery, and permission boundaries.

use agora_core::application::bootstrap::{initialize_agent_system, AppContext};
use agora_core::config::Settings;
use agora_core::domain::market::TradeStatus;
use agora_core::domain::repository::SettlementOutcome;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::util::ServiceExt;
use uuid::Uuid;

fn test_settings() -> Settings {
    let mut settings = Settings::default();
    settings.auth.jwt_secret = "integration-test-secret".to_string();
    settings.auth.service_token = Some("internal-service-token".to_string());
    settings.auth.service_scopes = vec!["marketplace:admin".to_string()];
    settings.enable_dev_login = true;
    settings
}

async fn response_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1 << 20).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn login(app: &Router, email: &str, role: &str) -> String {
    let response = app
        .clone()
        .oneshot(
            Request::post("/auth/dev/login")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({ "email": email, "role": role }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    body["accessToken"].as_str().unwrap().to_string()
}

async fn post_json(app: &Router, token: &str, path: &str, body: Value) -> axum::response::Response {
    app.clone()
        .oneshot(
            Request::post(path)
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap()
}

/// Create an asset and a listing, returning the listing id.
async fn seed_listing(app: &Router, token: &str) -> (Uuid, Uuid) {
    let owner = Uuid::new_v4();
    let response = post_json(
        app,
        token,
        "/marketplace/asset",
        json!({ "type": "artwork", "ownerId": owner, "totalShares": 4 }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let asset = response_json(response).await;
    let asset_id: Uuid = serde_json::from_value(asset["asset"]["id"].clone()).unwrap();

    let response = post_json(
        app,
        token,
        "/marketplace/list",
        json!({ "assetId": asset_id, "sellerId": owner, "priceCents": 2500, "shares": 4 }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let listing = response_json(response).await;
    let listing_id: Uuid = serde_json::from_value(listing["id"].clone()).unwrap();

    (listing_id, owner)
}

#[tokio::test]
async fn test_duplicate_trade_request_creates_one_trade_with_identical_responses() {
    let ctx = Arc::new(AppContext::in_memory(test_settings()));
    let app = agora_core::presentation::api::app(ctx.clone());

    let token = login(&app, "buyer@example.test", "USER").await;
    let (listing_id, _) = seed_listing(&app, &token).await;
    let buyer = Uuid::new_v4();

    let body = json!({ "listingId": listing_id, "buyerId": buyer });
    let send = |body: Value| {
        let app = app.clone();
        let token = token.clone();
        async move {
            app.oneshot(
                Request::post("/marketplace/trade/request")
                    .header(header::CONTENT_TYPE, "application/json")
                    .header(header::AUTHORIZATION, format!("Bearer {}", token))
                    .header("idempotency-key", "trade-key-1")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap()
        }
    };

    let first = send(body.clone()).await;
    assert_eq!(first.status(), StatusCode::OK);
    let first_bytes = axum::body::to_bytes(first.into_body(), 1 << 20).await.unwrap();

    let second = send(body.clone()).await;
    assert_eq!(second.status(), StatusCode::OK);
    let second_bytes = axum::body::to_bytes(second.into_body(), 1 << 20).await.unwrap();

    // Byte-identical replay of the stored response.
    assert_eq!(first_bytes, second_bytes);

    let trade: Value = serde_json::from_slice(&first_bytes).unwrap();
    let trade_id: Uuid = serde_json::from_value(trade["id"].clone()).unwrap();
    let stored = ctx.market.find_trade(trade_id).await.unwrap().unwrap();
    assert_eq!(stored.buyer_id, buyer);
}

#[tokio::test]
async fn test_trade_request_without_idempotency_key_is_400() {
    let ctx = Arc::new(AppContext::in_memory(test_settings()));
    let app = agora_core::presentation::api::app(ctx.clone());

    let token = login(&app, "buyer@example.test", "USER").await;
    let (listing_id, _) = seed_listing(&app, &token).await;

    let response = post_json(
        &app,
        &token,
        "/marketplace/trade/request",
        json!({ "listingId": listing_id, "buyerId": Uuid::new_v4() }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_key_reuse_with_different_body_conflicts() {
    let ctx = Arc::new(AppContext::in_memory(test_settings()));
    let app = agora_core::presentation::api::app(ctx.clone());

    let token = login(&app, "buyer@example.test", "USER").await;
    let (listing_id, _) = seed_listing(&app, &token).await;

    let send = |body: Value| {
        let app = app.clone();
        let token = token.clone();
        async move {
            app.oneshot(
                Request::post("/marketplace/trade/request")
                    .header(header::CONTENT_TYPE, "application/json")
                    .header(header::AUTHORIZATION, format!("Bearer {}", token))
                    .header("idempotency-key", "trade-key-1")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap()
        }
    };

    let first = send(json!({ "listingId": listing_id, "buyerId": Uuid::new_v4() })).await;
    assert_eq!(first.status(), StatusCode::OK);

    let second = send(json!({ "listingId": listing_id, "buyerId": Uuid::new_v4() })).await;
    assert_eq!(second.status(), StatusCode::CONFLICT);
    let body = response_json(second).await;
    assert!(body["error"].as_str().unwrap().contains("different payload"));
}

#[tokio::test]
async fn test_settlement_handles_duplicate_delivery() {
    let ctx = Arc::new(AppContext::in_memory(test_settings()));
    let handles = initialize_agent_system(&ctx).await.unwrap();
    let app = agora_core::presentation::api::app(ctx.clone());

    let token = login(&app, "buyer@example.test", "USER").await;
    let (listing_id, _) = seed_listing(&app, &token).await;
    let buyer = Uuid::new_v4();

    let trade = ctx
        .trades
        .request_trade(listing_id, buyer, "settle-key-1")
        .await
        .unwrap();

    // The durable subscriber settles off the escrow event.
    let settled = wait_for(|| async {
        matches!(
            ctx.market.find_trade(trade.id).await.unwrap().unwrap().status,
            TradeStatus::Settled
        )
    })
    .await;
    assert!(settled, "settlement subscriber never settled the trade");

    // Simulate at-least-once redelivery: a second settlement call is a
    // verified no-op.
    let outcome = ctx.trades.settle_trade(trade.id).await.unwrap();
    assert!(matches!(outcome, SettlementOutcome::AlreadySettled(_)));

    let ledger = ctx.market.ledger_for_user(buyer).await.unwrap();
    assert_eq!(ledger.len(), 1, "duplicate settlement wrote extra ledger rows");

    handles.worker.abort();
    handles.settlement.abort();
}

#[tokio::test]
async fn test_admin_perm_rejects_user_and_accepts_service_scope() {
    let ctx = Arc::new(AppContext::in_memory(test_settings()));
    let app = agora_core::presentation::api::app(ctx.clone());

    let token = login(&app, "buyer@example.test", "USER").await;
    let trade_id = Uuid::new_v4();

    // USER-role token: 403 on the admin route.
    let response = app
        .clone()
        .oneshot(
            Request::get(format!("/marketplace/trade/{}", trade_id))
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // SERVICE token whose configured scopes include the permission: passes
    // the perm gate (404 because the trade does not exist).
    let response = app
        .clone()
        .oneshot(
            Request::get(format!("/marketplace/trade/{}", trade_id))
                .header("x-service-token", "internal-service-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

async fn wait_for<F, Fut>(mut probe: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..100 {
        if probe().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
