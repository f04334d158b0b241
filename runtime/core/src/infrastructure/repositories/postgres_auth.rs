// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use sqlx::Row;
use uuid::Uuid;

use crate::domain::auth::{
    AuditLogEntry, AuthError, LoginAttempt, RefreshToken, Role, Session, TokenRevocation, User,
    UserStatus,
};
use crate::domain::repository::{
    AuditLogRepository, RevocationRepository, SessionRepository, UserRepository,
};

fn storage_err(e: sqlx::Error) -> AuthError {
    AuthError::Storage(e.to_string())
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::User => "USER",
        Role::Admin => "ADMIN",
        Role::Mod => "MOD",
        Role::Service => "SERVICE",
    }
}

fn parse_role(s: &str) -> Role {
    match s {
        "ADMIN" => Role::Admin,
        "MOD" => Role::Mod,
        "SERVICE" => Role::Service,
        _ => Role::User,
    }
}

pub struct PostgresUserRepository {
    pool: PgPool,
}

impl PostgresUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_user(row: &sqlx::postgres::PgRow) -> User {
    let role: String = row.get("role");
    let status: String = row.get("status");
    User {
        id: row.get("id"),
        email: row.get("email"),
        role: parse_role(&role),
        status: if status == "SUSPENDED" {
            UserStatus::Suspended
        } else {
            UserStatus::Active
        },
        created_at: row.get("created_at"),
    }
}

#[async_trait]
impl UserRepository for PostgresUserRepository {
    async fn upsert_by_email(&self, user: &User) -> Result<User, AuthError> {
        let row = sqlx::query(
            r#"
            INSERT INTO users (id, email, role, status, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (email) DO UPDATE SET role = EXCLUDED.role
            RETURNING *
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(role_str(user.role))
        .bind(match user.status {
            UserStatus::Active => "ACTIVE",
            UserStatus::Suspended => "SUSPENDED",
        })
        .bind(user.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(row_to_user(&row))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AuthError> {
        let row = sqlx::query("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;

        Ok(row.as_ref().map(row_to_user))
    }
}

pub struct PostgresSessionRepository {
    pool: PgPool,
}

impl PostgresSessionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_session(row: &sqlx::postgres::PgRow) -> Session {
    Session {
        id: row.get("id"),
        user_id: row.get("user_id"),
        device_name: row.get("device_name"),
        expires_at: row.get("expires_at"),
        revoked_at: row.get("revoked_at"),
        created_at: row.get("created_at"),
    }
}

fn row_to_refresh_token(row: &sqlx::postgres::PgRow) -> RefreshToken {
    RefreshToken {
        id: row.get("id"),
        session_id: row.get("session_id"),
        user_id: row.get("user_id"),
        token_hash: row.get("token_hash"),
        revoked_at: row.get("revoked_at"),
        created_at: row.get("created_at"),
    }
}

#[async_trait]
impl SessionRepository for PostgresSessionRepository {
    async fn insert_session(&self, session: &Session) -> Result<(), AuthError> {
        sqlx::query(
            r#"
            INSERT INTO sessions (id, user_id, device_name, expires_at, revoked_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(session.id)
        .bind(session.user_id)
        .bind(&session.device_name)
        .bind(session.expires_at)
        .bind(session.revoked_at)
        .bind(session.created_at)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    async fn find_session(&self, id: Uuid) -> Result<Option<Session>, AuthError> {
        let row = sqlx::query("SELECT * FROM sessions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;

        Ok(row.as_ref().map(row_to_session))
    }

    async fn revoke_session(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), AuthError> {
        sqlx::query("UPDATE sessions SET revoked_at = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    async fn insert_refresh_token(&self, token: &RefreshToken) -> Result<(), AuthError> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (id, session_id, user_id, token_hash, revoked_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(token.id)
        .bind(token.session_id)
        .bind(token.user_id)
        .bind(&token.token_hash)
        .bind(token.revoked_at)
        .bind(token.created_at)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    async fn find_refresh_token(&self, token_hash: &str) -> Result<Option<RefreshToken>, AuthError> {
        let row = sqlx::query("SELECT * FROM refresh_tokens WHERE token_hash = $1")
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;

        Ok(row.as_ref().map(row_to_refresh_token))
    }

    async fn rotate_refresh_token(
        &self,
        old_token_hash: &str,
        replacement: &RefreshToken,
        new_session_expiry: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        // Single transaction: revoke-old, insert-new, extend-session. The
        // conditional UPDATE makes a concurrent double-rotation lose.
        let mut tx = self.pool.begin().await.map_err(storage_err)?;

        let revoked = sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = now() WHERE token_hash = $1 AND revoked_at IS NULL",
        )
        .bind(old_token_hash)
        .execute(&mut *tx)
        .await
        .map_err(storage_err)?;

        if revoked.rows_affected() == 0 {
            tx.rollback().await.map_err(storage_err)?;
            return Err(AuthError::InvalidRefreshToken);
        }

        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (id, session_id, user_id, token_hash, revoked_at, created_at)
            VALUES ($1, $2, $3, $4, NULL, $5)
            "#,
        )
        .bind(replacement.id)
        .bind(replacement.session_id)
        .bind(replacement.user_id)
        .bind(&replacement.token_hash)
        .bind(replacement.created_at)
        .execute(&mut *tx)
        .await
        .map_err(storage_err)?;

        sqlx::query("UPDATE sessions SET expires_at = $2 WHERE id = $1")
            .bind(replacement.session_id)
            .bind(new_session_expiry)
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;

        tx.commit().await.map_err(storage_err)?;
        Ok(())
    }

    async fn revoke_refresh_token(&self, token_hash: &str, at: DateTime<Utc>) -> Result<(), AuthError> {
        sqlx::query("UPDATE refresh_tokens SET revoked_at = $2 WHERE token_hash = $1")
            .bind(token_hash)
            .bind(at)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(())
    }
}

pub struct PostgresRevocationRepository {
    pool: PgPool,
}

impl PostgresRevocationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RevocationRepository for PostgresRevocationRepository {
    async fn revoke_jti(&self, revocation: &TokenRevocation) -> Result<(), AuthError> {
        sqlx::query(
            r#"
            INSERT INTO token_revocations (jti, expires_at, revoked_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (jti) DO UPDATE SET expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(&revocation.jti)
        .bind(revocation.expires_at)
        .bind(revocation.revoked_at)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    async fn is_jti_revoked(&self, jti: &str) -> Result<bool, AuthError> {
        let row = sqlx::query("SELECT 1 AS hit FROM token_revocations WHERE jti = $1")
            .bind(jti)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(row.is_some())
    }
}

pub struct PostgresAuditLogRepository {
    pool: PgPool,
}

impl PostgresAuditLogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditLogRepository for PostgresAuditLogRepository {
    async fn record(&self, entry: &AuditLogEntry) -> Result<(), AuthError> {
        sqlx::query(
            r#"
            INSERT INTO audit_logs (id, user_id, action, resource, resource_id, ip, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(entry.id)
        .bind(entry.user_id)
        .bind(&entry.action)
        .bind(&entry.resource)
        .bind(&entry.resource_id)
        .bind(&entry.ip)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    async fn record_login_attempt(&self, attempt: &LoginAttempt) -> Result<(), AuthError> {
        sqlx::query(
            r#"
            INSERT INTO login_attempts (id, user_id, success, ip, user_agent, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(attempt.id)
        .bind(attempt.user_id)
        .bind(attempt.success)
        .bind(&attempt.ip)
        .bind(&attempt.user_agent)
        .bind(attempt.created_at)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }
}
