// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Auth over the HTTP surface: refresh rotation (single-use secrets),
// logout revocation of the access token's jti, and middleware failure
// modes.

use agora_core::application::bootstrap::AppContext;
use agora_core::config::Settings;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::util::ServiceExt;

fn test_settings() -> Settings {
    let mut settings = Settings::default();
    settings.auth.jwt_secret = "auth-test-secret".to_string();
    settings.enable_dev_login = true;
    settings
}

async fn response_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1 << 20).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Extract the refresh cookie value from a Set-Cookie header.
fn refresh_cookie(response: &axum::response::Response, cookie_name: &str) -> Option<String> {
    let raw = response.headers().get(header::SET_COOKIE)?.to_str().ok()?;
    let (name, rest) = raw.split_once('=')?;
    if name != cookie_name {
        return None;
    }
    Some(rest.split(';').next().unwrap_or(rest).to_string())
}

async fn dev_login(app: &Router) -> (String, String) {
    let response = app
        .clone()
        .oneshot(
            Request::post("/auth/dev/login")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({ "email": "user@example.test", "role": "USER" }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let cookie = refresh_cookie(&response, "agora_refresh").unwrap();
    let body = response_json(response).await;
    (body["accessToken"].as_str().unwrap().to_string(), cookie)
}

async fn post_refresh(app: &Router, cookie_name: &str, secret: &str) -> axum::response::Response {
    app.clone()
        .oneshot(
            Request::post("/auth/refresh")
                .header(header::COOKIE, format!("{}={}", cookie_name, secret))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn test_refresh_rotates_and_old_secret_is_single_use() {
    let ctx = Arc::new(AppContext::in_memory(test_settings()));
    let app = agora_core::presentation::api::app(ctx.clone());

    let (_, first_secret) = dev_login(&app).await;

    let rotated = post_refresh(&app, "agora_refresh", &first_secret).await;
    assert_eq!(rotated.status(), StatusCode::OK);
    let new_secret = refresh_cookie(&rotated, "agora_refresh").unwrap();
    assert_ne!(new_secret, first_secret);
    let body = response_json(rotated).await;
    assert!(body["accessToken"].is_string());
    assert_eq!(body["ttlSeconds"], 900);

    // Replay of the rotated secret is rejected.
    let replayed = post_refresh(&app, "agora_refresh", &first_secret).await;
    assert_eq!(replayed.status(), StatusCode::UNAUTHORIZED);

    // The rotated secret still exchanges.
    let again = post_refresh(&app, "agora_refresh", &new_secret).await;
    assert_eq!(again.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_refresh_without_cookie_is_401() {
    let ctx = Arc::new(AppContext::in_memory(test_settings()));
    let app = agora_core::presentation::api::app(ctx);

    let response = app
        .oneshot(Request::post("/auth/refresh").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_denylists_jti_until_expiry() {
    let ctx = Arc::new(AppContext::in_memory(test_settings()));
    let app = agora_core::presentation::api::app(ctx.clone());

    let (access_token, cookie) = dev_login(&app).await;

    // The token works before logout.
    let response = app
        .clone()
        .oneshot(
            Request::get("/agents")
                .header(header::AUTHORIZATION, format!("Bearer {}", access_token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(
            Request::post("/auth/logout")
                .header(header::AUTHORIZATION, format!("Bearer {}", access_token))
                .header(header::COOKIE, format!("agora_refresh={}", cookie))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["ok"], true);

    // Same token, still unexpired, now rejected via the jti denylist.
    let response = app
        .clone()
        .oneshot(
            Request::get("/agents")
                .header(header::AUTHORIZATION, format!("Bearer {}", access_token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // The session's refresh secret is dead too.
    let refresh = post_refresh(&app, "agora_refresh", &cookie).await;
    assert_eq!(refresh.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_missing_and_garbage_bearer_tokens_are_401() {
    let ctx = Arc::new(AppContext::in_memory(test_settings()));
    let app = agora_core::presentation::api::app(ctx);

    let response = app
        .clone()
        .oneshot(Request::get("/agents").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .clone()
        .oneshot(
            Request::get("/agents")
                .header(header::AUTHORIZATION, "Bearer not-a-jwt")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_dev_login_disabled_returns_404() {
    let mut settings = test_settings();
    settings.enable_dev_login = false;
    let ctx = Arc::new(AppContext::in_memory(settings));
    let app = agora_core::presentation::api::app(ctx);

    let response = app
        .oneshot(
            Request::post("/auth/dev/login")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({ "email": "user@example.test" }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
