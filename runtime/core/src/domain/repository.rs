// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Repository Interfaces
//!
//! Persistence contracts for each aggregate root, following the DDD
//! Repository pattern: one repository per aggregate, interface defined in
//! the domain layer, implemented in `crate::infrastructure::repositories`.
//!
//! The relational store is the cross-process synchronization point, so the
//! operations that must be atomic under horizontal scaling are expressed as
//! single repository methods rather than call sequences:
//! `IdempotencyRepository::try_insert` (unique-constraint try-insert),
//! `SessionRepository::rotate_refresh_token` (transactional rotation), and
//! `MarketRepository::execute_trade_request` / `execute_settlement`
//! (guarded trade state transitions). In-memory implementations are used
//! for development and testing; PostgreSQL implementations for production.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::agent::{Agent, AgentId, AgentType};
use crate::domain::auth::{
    AuditLogEntry, AuthError, LoginAttempt, RefreshToken, Session, TokenRevocation, User,
};
use crate::domain::execution::{AgentExecution, ExecutionId};
use crate::domain::idempotency::{IdempotencyError, IdempotencyRecord};
use crate::domain::market::{Asset, Listing, Share, Trade, TradeError};
use crate::domain::task::{AgentTask, TaskId};
use crate::domain::tool::{ToolCall, ToolCallId};

/// Repository errors
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Unique constraint violated: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound("Row not found".to_string()),
            _ => RepositoryError::Database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}

/// Repository interface for Agent aggregates
#[async_trait]
pub trait AgentRepository: Send + Sync {
    /// Save agent (create or update)
    async fn save(&self, agent: &Agent) -> Result<(), RepositoryError>;

    /// Find agent by ID
    async fn find_by_id(&self, id: AgentId) -> Result<Option<Agent>, RepositoryError>;

    /// Find the active agent of a type (boot-time seeding keeps one per type)
    async fn find_active_by_type(&self, agent_type: AgentType) -> Result<Option<Agent>, RepositoryError>;

    /// List all agents
    async fn list_all(&self) -> Result<Vec<Agent>, RepositoryError>;
}

/// Repository interface for AgentTask aggregates
#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn save(&self, task: &AgentTask) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: TaskId) -> Result<Option<AgentTask>, RepositoryError>;
}

/// Repository interface for AgentExecution aggregates
#[async_trait]
pub trait ExecutionRepository: Send + Sync {
    async fn save(&self, execution: &AgentExecution) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: ExecutionId) -> Result<Option<AgentExecution>, RepositoryError>;

    async fn find_by_agent(&self, agent_id: AgentId) -> Result<Vec<AgentExecution>, RepositoryError>;
}

/// Repository interface for ToolCall audit rows
#[async_trait]
pub trait ToolCallRepository: Send + Sync {
    async fn save(&self, call: &ToolCall) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: ToolCallId) -> Result<Option<ToolCall>, RepositoryError>;

    async fn find_by_execution(&self, execution_id: ExecutionId) -> Result<Vec<ToolCall>, RepositoryError>;
}

/// Repository interface for idempotency guard records.
#[async_trait]
pub trait IdempotencyRepository: Send + Sync {
    /// Unique-constraint try-insert. Returns `true` when this call created
    /// the record, `false` when one with the same key already exists (the
    /// caller then fetches and inspects it).
    async fn try_insert(&self, record: &IdempotencyRecord) -> Result<bool, IdempotencyError>;

    async fn find_by_key(&self, key: &str) -> Result<Option<IdempotencyRecord>, IdempotencyError>;

    async fn update(&self, record: &IdempotencyRecord) -> Result<(), IdempotencyError>;
}

/// Repository interface for User aggregates
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn upsert_by_email(&self, user: &User) -> Result<User, AuthError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AuthError>;
}

/// Repository interface for Session aggregates (sessions own their refresh
/// tokens; rotation is one atomic operation against this store).
#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn insert_session(&self, session: &Session) -> Result<(), AuthError>;

    async fn find_session(&self, id: Uuid) -> Result<Option<Session>, AuthError>;

    async fn revoke_session(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), AuthError>;

    async fn insert_refresh_token(&self, token: &RefreshToken) -> Result<(), AuthError>;

    async fn find_refresh_token(&self, token_hash: &str) -> Result<Option<RefreshToken>, AuthError>;

    /// Atomic rotation: revoke the presented token, insert its replacement,
    /// and extend the owning session's expiry, all or nothing.
    async fn rotate_refresh_token(
        &self,
        old_token_hash: &str,
        replacement: &RefreshToken,
        new_session_expiry: DateTime<Utc>,
    ) -> Result<(), AuthError>;

    async fn revoke_refresh_token(&self, token_hash: &str, at: DateTime<Utc>) -> Result<(), AuthError>;
}

/// Repository interface for the access-token jti denylist.
#[async_trait]
pub trait RevocationRepository: Send + Sync {
    async fn revoke_jti(&self, revocation: &TokenRevocation) -> Result<(), AuthError>;

    async fn is_jti_revoked(&self, jti: &str) -> Result<bool, AuthError>;
}

/// Repository interface for the audit trail.
#[async_trait]
pub trait AuditLogRepository: Send + Sync {
    async fn record(&self, entry: &AuditLogEntry) -> Result<(), AuthError>;

    async fn record_login_attempt(&self, attempt: &LoginAttempt) -> Result<(), AuthError>;
}

/// Outcome of a settlement attempt: either this call performed the
/// settlement, or an earlier delivery already had.
#[derive(Debug, Clone)]
pub enum SettlementOutcome {
    Settled(Trade),
    AlreadySettled(Trade),
}

/// Repository interface for marketplace aggregates.
///
/// The trade state transitions are transactional inside the store so a
/// concurrent or redelivered request cannot observe (or create) a partial
/// transition.
#[async_trait]
pub trait MarketRepository: Send + Sync {
    async fn insert_asset_with_shares(&self, asset: &Asset, initial: &Share) -> Result<(), TradeError>;

    async fn find_asset(&self, id: Uuid) -> Result<Option<Asset>, TradeError>;

    async fn shares_for_asset(&self, asset_id: Uuid) -> Result<Vec<Share>, TradeError>;

    async fn insert_listing(&self, listing: &Listing) -> Result<(), TradeError>;

    async fn find_listing(&self, id: Uuid) -> Result<Option<Listing>, TradeError>;

    /// Transactionally validate the listing (active, tradable asset, shares
    /// available), create the escrowed trade, and mark the listing sold.
    async fn execute_trade_request(
        &self,
        listing_id: Uuid,
        buyer_id: Uuid,
        idempotency_key: &str,
    ) -> Result<Trade, TradeError>;

    /// Transactionally settle: no-op if already settled, otherwise write the
    /// debit/credit ledger pair, move shares seller → buyer, and mark the
    /// trade settled.
    async fn execute_settlement(&self, trade_id: Uuid) -> Result<SettlementOutcome, TradeError>;

    async fn find_trade(&self, id: Uuid) -> Result<Option<Trade>, TradeError>;

    async fn ledger_for_user(&self, user_id: Uuid) -> Result<Vec<crate::domain::market::LedgerEntry>, TradeError>;
}
