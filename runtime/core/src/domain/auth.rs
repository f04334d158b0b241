// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    User,
    Admin,
    Mod,
    Service,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserStatus {
    Active,
    Suspended,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
    pub status: UserStatus,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(email: impl Into<String>, role: Role) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: email.into(),
            role,
            status: UserStatus::Active,
            created_at: Utc::now(),
        }
    }
}

/// Claims carried by a signed access token. A fresh `jti` is minted per
/// token; it is the unit of revocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: String,
    pub role: Role,
    pub perms: Vec<String>,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenType {
    Jwt,
    Service,
}

/// Authenticated principal attached to a request after `require_auth`.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub role: Role,
    pub perms: HashSet<String>,
    pub token_type: TokenType,
    pub jti: Option<String>,
}

impl AuthContext {
    pub fn has_perm(&self, perm: &str) -> bool {
        self.perms.contains(perm)
    }
}

/// A login session. Refresh tokens belong to exactly one session; revoking
/// the session invalidates the whole chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub device_name: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(user_id: Uuid, device_name: Option<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            device_name,
            expires_at,
            revoked_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && self.expires_at > now
    }
}

/// One refresh credential, stored only as a SHA-256 hash of the opaque
/// secret. Rotation revokes the row instead of deleting it so a replay of
/// the old secret is detectable (`revoked_at` is set).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshToken {
    pub id: Uuid,
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl RefreshToken {
    pub fn new(session_id: Uuid, user_id: Uuid, token_hash: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            user_id,
            token_hash: token_hash.into(),
            revoked_at: None,
            created_at: Utc::now(),
        }
    }
}

/// Denylist entry for a revoked access-token `jti`, kept until the token's
/// natural expiry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRevocation {
    pub jti: String,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub action: String,
    pub resource: Option<String>,
    pub resource_id: Option<String>,
    pub ip: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AuditLogEntry {
    pub fn new(user_id: Option<Uuid>, action: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            action: action.into(),
            resource: None,
            resource_id: None,
            ip: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_resource(mut self, resource: impl Into<String>, id: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self.resource_id = Some(id.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginAttempt {
    pub id: Uuid,
    pub user_id: Uuid,
    pub success: bool,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing Authorization Bearer token")]
    MissingToken,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token revoked")]
    TokenRevoked,

    #[error("Invalid refresh token")]
    InvalidRefreshToken,

    #[error("Session invalid")]
    SessionInvalid,

    #[error("User inactive")]
    UserInactive,

    #[error("Missing permission: {0}")]
    MissingPermission(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

/// Permission grants by role. Exact string matching only; no hierarchy or
/// wildcard expansion.
pub fn perms_for_role(role: Role) -> Vec<String> {
    let mut perms = vec![
        "marketplace:asset:create".to_string(),
        "marketplace:asset:list".to_string(),
        "marketplace:trade:request".to_string(),
        "agents:execute".to_string(),
    ];
    if matches!(role, Role::Admin | Role::Mod) {
        perms.push("marketplace:admin".to_string());
    }
    perms
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perms_for_role() {
        assert!(!perms_for_role(Role::User).contains(&"marketplace:admin".to_string()));
        assert!(perms_for_role(Role::Admin).contains(&"marketplace:admin".to_string()));
        assert!(perms_for_role(Role::Mod).contains(&"marketplace:admin".to_string()));
    }

    #[test]
    fn test_session_validity() {
        let mut session = Session::new(Uuid::new_v4(), None, Utc::now() + chrono::Duration::hours(1));
        assert!(session.is_valid_at(Utc::now()));

        session.revoked_at = Some(Utc::now());
        assert!(!session.is_valid_at(Utc::now()));
    }
}
