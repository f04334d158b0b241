// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// HTTP Auth Middleware
//
// `require_auth` accepts either the internal service token header or a
// Bearer JWT, attaching the authenticated principal to request extensions.
// `require_perm` layers an exact-match permission check on top; there is
// no hierarchy or wildcard matching.

use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;

use crate::application::bootstrap::AppContext;
use crate::domain::auth::AuthContext;

pub const SERVICE_TOKEN_HEADER: &str = "x-service-token";

pub fn unauthorized(message: &str) -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({ "error": message }))).into_response()
}

pub fn forbidden(perm: &str) -> Response {
    (
        StatusCode::FORBIDDEN,
        Json(json!({ "error": "Forbidden", "perm": perm })),
    )
        .into_response()
}

/// Authenticate the request and stash the `AuthContext` in extensions.
pub async fn require_auth(
    State(ctx): State<Arc<AppContext>>,
    mut request: Request,
    next: Next,
) -> Response {
    let auth = match authenticate(&ctx, request.headers()).await {
        Ok(auth) => auth,
        Err(response) => return response,
    };
    request.extensions_mut().insert(auth);
    next.run(request).await
}

async fn authenticate(ctx: &AppContext, headers: &HeaderMap) -> Result<AuthContext, Response> {
    if let Some(presented) = headers
        .get(SERVICE_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
    {
        if let Some(auth) = ctx.tokens.verify_service_token(presented) {
            return Ok(auth);
        }
    }

    let bearer = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer ").or_else(|| v.strip_prefix("bearer ")));

    let Some(token) = bearer else {
        return Err(unauthorized("Missing Authorization Bearer token"));
    };

    ctx.tokens
        .verify_access_token(token)
        .await
        .map_err(|e| unauthorized(&e.to_string()))
}

/// Layer factory: exact string match on the decoded permission set.
pub fn require_perm(
    perm: &'static str,
) -> impl Fn(Request, Next) -> std::pin::Pin<Box<dyn std::future::Future<Output = Response> + Send>>
       + Clone
       + Send
       + 'static {
    move |request: Request, next: Next| {
        Box::pin(async move {
            let Some(auth) = request.extensions().get::<AuthContext>() else {
                return unauthorized("Not authenticated");
            };
            if !auth.has_perm(perm) {
                return forbidden(perm);
            }
            next.run(request).await
        })
    }
}

/// Read one cookie value out of the Cookie header.
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let raw = headers
        .get(axum::http::header::COOKIE)
        .and_then(|v| v.to_str().ok())?;
    raw.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name).then(|| value.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_cookie_parses_multiple_pairs() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::COOKIE,
            "theme=dark; agora_refresh=abc123; other=1".parse().unwrap(),
        );
        assert_eq!(read_cookie(&headers, "agora_refresh").as_deref(), Some("abc123"));
        assert_eq!(read_cookie(&headers, "missing"), None);
    }
}
