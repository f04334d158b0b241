// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// HTTP Surface
//
// Auth (refresh rotation, logout, dev login), the marketplace trade flow
// with its Idempotency-Key guard, and the agent enqueue/list endpoints.
// Validation and auth failures map to 4xx with a machine-readable `error`
// field; unexpected errors surface as 500 without internals.

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

use crate::application::bootstrap::AppContext;
use crate::application::idempotency::BeginOutcome;
use crate::application::trade::{trade_response, CreateAssetParams, CreateListingParams};
use crate::config::AuthSettings;
use crate::domain::auth::{AuthContext, Role};
use crate::domain::idempotency::{hash_request, IdempotencyError, IdempotencyStatus};
use crate::domain::market::TradeError;
use crate::presentation::auth::{read_cookie, require_auth, require_perm};

pub struct ApiError(StatusCode, String);

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self(StatusCode::BAD_REQUEST, message.into())
    }

    fn internal() -> Self {
        Self(StatusCode::INTERNAL_SERVER_ERROR, "Internal error".to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(json!({ "error": self.1 }))).into_response()
    }
}

impl From<TradeError> for ApiError {
    fn from(e: TradeError) -> Self {
        match e {
            TradeError::ListingNotFound | TradeError::TradeNotFound => {
                ApiError(StatusCode::NOT_FOUND, e.to_string())
            }
            TradeError::ListingNotActive
            | TradeError::AssetNotTradable
            | TradeError::NoSharesAvailable => ApiError(StatusCode::CONFLICT, e.to_string()),
            TradeError::Storage(detail) => {
                error!(error = %detail, "trade storage failure");
                ApiError::internal()
            }
        }
    }
}

impl From<IdempotencyError> for ApiError {
    fn from(e: IdempotencyError) -> Self {
        match e {
            IdempotencyError::KeyReusedWithDifferentPayload => {
                ApiError(StatusCode::CONFLICT, e.to_string())
            }
            IdempotencyError::NotFound(_) => ApiError(StatusCode::NOT_FOUND, e.to_string()),
            IdempotencyError::Storage(detail) => {
                error!(error = %detail, "idempotency storage failure");
                ApiError::internal()
            }
        }
    }
}

pub fn app(ctx: Arc<AppContext>) -> Router {
    let marketplace = Router::new()
        .route(
            "/marketplace/asset",
            post(create_asset).layer(middleware::from_fn(require_perm("marketplace:asset:create"))),
        )
        .route(
            "/marketplace/list",
            post(create_listing).layer(middleware::from_fn(require_perm("marketplace:asset:list"))),
        )
        .route(
            "/marketplace/trade/request",
            post(request_trade).layer(middleware::from_fn(require_perm("marketplace:trade:request"))),
        )
        .route(
            "/marketplace/trade/{id}",
            get(get_trade).layer(middleware::from_fn(require_perm("marketplace:admin"))),
        );

    let agents = Router::new()
        .route("/agents", get(list_agents))
        .route(
            "/agents/execute",
            post(execute_agent).layer(middleware::from_fn(require_perm("agents:execute"))),
        );

    let authed = Router::new()
        .route("/auth/logout", post(logout))
        .merge(marketplace)
        .merge(agents)
        .layer(middleware::from_fn_with_state(ctx.clone(), require_auth));

    Router::new()
        .route("/auth/refresh", post(refresh))
        .route("/auth/dev/login", post(dev_login))
        .merge(authed)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(ctx)
}

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

fn cookie_attributes(settings: &AuthSettings) -> String {
    let mut attributes = format!("; Path=/; HttpOnly; SameSite={}", settings.cookie_same_site);
    if settings.cookie_secure {
        attributes.push_str("; Secure");
    }
    if let Some(domain) = &settings.cookie_domain {
        attributes.push_str("; Domain=");
        attributes.push_str(domain);
    }
    attributes
}

fn set_refresh_cookie(settings: &AuthSettings, value: &str, expires: DateTime<Utc>) -> (header::HeaderName, String) {
    (
        header::SET_COOKIE,
        format!(
            "{}={}{}; Expires={}",
            settings.cookie_name,
            value,
            cookie_attributes(settings),
            expires.format("%a, %d %b %Y %H:%M:%S GMT"),
        ),
    )
}

fn clear_refresh_cookie(settings: &AuthSettings) -> (header::HeaderName, String) {
    (
        header::SET_COOKIE,
        format!(
            "{}={}; Expires=Thu, 01 Jan 1970 00:00:00 GMT",
            settings.cookie_name,
            cookie_attributes(settings),
        ),
    )
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DevLoginRequest {
    email: String,
    role: Option<Role>,
    device_name: Option<String>,
}

async fn dev_login(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
    Json(body): Json<DevLoginRequest>,
) -> Response {
    if !ctx.settings.enable_dev_login {
        return (StatusCode::NOT_FOUND, Json(json!({ "error": "Not available" }))).into_response();
    }
    if !body.email.contains('@') {
        return ApiError::bad_request("Invalid email").into_response();
    }
    let role = match body.role {
        Some(Role::Service) => {
            return ApiError::bad_request("SERVICE role cannot log in").into_response()
        }
        Some(role) => role,
        None => Role::User,
    };

    let ip = client_ip(&headers);
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    match ctx
        .tokens
        .dev_login(&body.email, role, body.device_name, ip, user_agent)
        .await
    {
        Ok(login) => {
            let cookie = set_refresh_cookie(
                ctx.tokens.settings(),
                &login.refresh_secret,
                login.refresh_expires_at,
            );
            (
                [cookie],
                Json(json!({
                    "accessToken": login.access.token,
                    "ttlSeconds": login.access.ttl_seconds,
                    "user": {
                        "id": login.user.id,
                        "email": login.user.email,
                        "role": login.user.role,
                    },
                })),
            )
                .into_response()
        }
        Err(e) => {
            error!(error = %e, "dev login failed");
            ApiError::internal().into_response()
        }
    }
}

async fn refresh(State(ctx): State<Arc<AppContext>>, headers: HeaderMap) -> Response {
    let Some(secret) = read_cookie(&headers, ctx.tokens.cookie_name()) else {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "Missing refresh cookie" })),
        )
            .into_response();
    };

    match ctx.tokens.refresh(&secret).await {
        Ok(rotated) => {
            let cookie = set_refresh_cookie(
                ctx.tokens.settings(),
                &rotated.refresh_secret,
                rotated.refresh_expires_at,
            );
            (
                [cookie],
                Json(json!({
                    "accessToken": rotated.access.token,
                    "ttlSeconds": rotated.access.ttl_seconds,
                })),
            )
                .into_response()
        }
        Err(e) => (StatusCode::UNAUTHORIZED, Json(json!({ "error": e.to_string() }))).into_response(),
    }
}

async fn logout(
    State(ctx): State<Arc<AppContext>>,
    Extension(auth): Extension<AuthContext>,
    headers: HeaderMap,
) -> Response {
    let secret = read_cookie(&headers, ctx.tokens.cookie_name());
    if let Err(e) = ctx.tokens.logout(&auth, secret.as_deref()).await {
        error!(error = %e, "logout failed");
        return ApiError::internal().into_response();
    }

    let cookie = clear_refresh_cookie(ctx.tokens.settings());
    ([cookie], Json(json!({ "ok": true }))).into_response()
}

fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(',').next().unwrap_or(v).trim().to_string())
}

// ---------------------------------------------------------------------------
// Marketplace
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateAssetRequest {
    #[serde(rename = "type")]
    asset_type: String,
    owner_id: Uuid,
    tradable: Option<bool>,
    metadata: Option<Value>,
    total_shares: Option<u32>,
}

async fn create_asset(
    State(ctx): State<Arc<AppContext>>,
    Json(body): Json<CreateAssetRequest>,
) -> Result<Json<Value>, ApiError> {
    let total_shares = body.total_shares.unwrap_or(1);
    if total_shares == 0 {
        return Err(ApiError::bad_request("totalShares must be at least 1"));
    }

    let (asset, shares) = ctx
        .trades
        .create_asset(CreateAssetParams {
            asset_type: body.asset_type,
            owner_id: body.owner_id,
            tradable: body.tradable.unwrap_or(true),
            metadata: body.metadata.unwrap_or_else(|| json!({})),
            total_shares,
        })
        .await?;

    Ok(Json(json!({ "asset": asset, "shares": shares })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateListingRequest {
    asset_id: Uuid,
    seller_id: Uuid,
    price_cents: u64,
    shares: Option<u32>,
}

async fn create_listing(
    State(ctx): State<Arc<AppContext>>,
    Json(body): Json<CreateListingRequest>,
) -> Result<Json<Value>, ApiError> {
    if body.price_cents == 0 {
        return Err(ApiError::bad_request("priceCents must be at least 1"));
    }

    let listing = ctx
        .trades
        .create_listing(CreateListingParams {
            asset_id: body.asset_id,
            seller_id: body.seller_id,
            price_cents: body.price_cents,
            shares: body.shares.unwrap_or(1),
        })
        .await?;

    Ok(Json(serde_json::to_value(listing).map_err(|_| ApiError::internal())?))
}

#[derive(Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct TradeRequestBody {
    listing_id: Uuid,
    buyer_id: Uuid,
}

const TRADE_REQUEST_SCOPE: &str = "trade.request";

async fn request_trade(
    State(ctx): State<Arc<AppContext>>,
    Extension(auth): Extension<AuthContext>,
    headers: HeaderMap,
    Json(body): Json<TradeRequestBody>,
) -> Result<Json<Value>, ApiError> {
    let Some(idempotency_key) = headers
        .get("idempotency-key")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(String::from)
    else {
        return Err(ApiError::bad_request("Missing idempotency-key header"));
    };

    let request_hash = hash_request(&json!({ "body": body, "userId": auth.user_id }));

    match ctx
        .idempotency
        .begin(&idempotency_key, TRADE_REQUEST_SCOPE, auth.user_id, &request_hash)
        .await?
    {
        BeginOutcome::Existing(record) if record.status == IdempotencyStatus::Completed => {
            // Replay: the stored response, verbatim, without re-running
            // side effects.
            return Ok(Json(record.response.unwrap_or(Value::Null)));
        }
        BeginOutcome::Existing(record) if record.status == IdempotencyStatus::Started => {
            return Err(ApiError(
                StatusCode::CONFLICT,
                "Request already in flight".to_string(),
            ));
        }
        // Fresh record, or a Failed one being retried under the same key.
        BeginOutcome::Created(_) | BeginOutcome::Existing(_) => {}
    }

    match ctx
        .trades
        .request_trade(body.listing_id, body.buyer_id, &idempotency_key)
        .await
    {
        Ok(trade) => {
            let response = trade_response(&trade);
            ctx.idempotency.complete(&idempotency_key, response.clone()).await?;
            Ok(Json(response))
        }
        Err(e) => {
            ctx.idempotency
                .fail(&idempotency_key, json!({ "error": e.to_string() }))
                .await?;
            Err(e.into())
        }
    }
}

/// Admin inspection of any trade, regardless of participant.
async fn get_trade(
    State(ctx): State<Arc<AppContext>>,
    axum::extract::Path(id): axum::extract::Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let trade = ctx
        .market
        .find_trade(id)
        .await?
        .ok_or(ApiError(StatusCode::NOT_FOUND, "Trade not found".to_string()))?;
    Ok(Json(trade_response(&trade)))
}

// ---------------------------------------------------------------------------
// Agents
// ---------------------------------------------------------------------------

async fn list_agents(State(ctx): State<Arc<AppContext>>) -> Result<Json<Value>, ApiError> {
    let agents = ctx.agents.list_all().await.map_err(|e| {
        error!(error = %e, "failed to list agents");
        ApiError::internal()
    })?;

    let view: Vec<Value> = agents
        .iter()
        .map(|a| {
            json!({
                "id": a.id,
                "name": a.name,
                "type": a.agent_type,
                "status": a.status,
                "totalExecutions": a.total_executions,
                "successCount": a.success_count,
                "failureCount": a.failure_count,
                "averageLatencyMs": a.average_latency_ms,
            })
        })
        .collect();

    Ok(Json(json!({ "agents": view })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExecuteAgentRequest {
    #[serde(rename = "type")]
    agent_type: String,
    action: String,
    input: Option<Value>,
}

async fn execute_agent(
    State(ctx): State<Arc<AppContext>>,
    Json(body): Json<ExecuteAgentRequest>,
) -> Result<Json<Value>, ApiError> {
    let agent_type = body
        .agent_type
        .parse()
        .map_err(|e: String| ApiError::bad_request(e))?;
    if body.action.is_empty() {
        return Err(ApiError::bad_request("type and action required"));
    }

    let mut input = body.input.unwrap_or_else(|| json!({}));
    if let Some(object) = input.as_object_mut() {
        object.insert("action".to_string(), json!(body.action));
    }

    let message = ctx
        .dispatcher
        .dispatch(agent_type, &body.action, input)
        .await
        .map_err(|e| {
            error!(error = %e, "task dispatch failed");
            ApiError(StatusCode::NOT_FOUND, e)
        })?;

    Ok(Json(json!({
        "executionId": message.execution_id,
        "taskId": message.task_id,
        "status": "queued",
    })))
}
