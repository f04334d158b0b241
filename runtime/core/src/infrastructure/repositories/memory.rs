// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// In-Memory Repository Implementations
//
// Development and test backends for every domain repository trait. Each
// repository keeps its aggregate behind a single mutex so the operations
// the Postgres implementations run transactionally (idempotency try-insert,
// refresh rotation, trade transitions) stay atomic here too.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

use crate::domain::agent::{Agent, AgentId, AgentStatus, AgentType};
use crate::domain::auth::{
    AuditLogEntry, AuthError, LoginAttempt, RefreshToken, Session, TokenRevocation, User,
};
use crate::domain::execution::{AgentExecution, ExecutionId};
use crate::domain::idempotency::{IdempotencyError, IdempotencyRecord};
use crate::domain::market::{
    Asset, LedgerEntry, LedgerKind, Listing, ListingStatus, Share, Trade, TradeError, TradeStatus,
};
use crate::domain::repository::{
    AgentRepository, AuditLogRepository, ExecutionRepository, IdempotencyRepository,
    MarketRepository, RepositoryError, RevocationRepository, SessionRepository,
    SettlementOutcome, TaskRepository, ToolCallRepository, UserRepository,
};
use crate::domain::task::{AgentTask, TaskId};
use crate::domain::tool::{ToolCall, ToolCallId};

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, RepositoryError> {
    mutex
        .lock()
        .map_err(|_| RepositoryError::Database("Mutex poisoned".to_string()))
}

// ---------------------------------------------------------------------------
// Agents / tasks / executions / tool calls
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct InMemoryAgentRepository {
    agents: Arc<Mutex<HashMap<AgentId, Agent>>>,
}

impl InMemoryAgentRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AgentRepository for InMemoryAgentRepository {
    async fn save(&self, agent: &Agent) -> Result<(), RepositoryError> {
        lock(&self.agents)?.insert(agent.id, agent.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: AgentId) -> Result<Option<Agent>, RepositoryError> {
        Ok(lock(&self.agents)?.get(&id).cloned())
    }

    async fn find_active_by_type(
        &self,
        agent_type: AgentType,
    ) -> Result<Option<Agent>, RepositoryError> {
        Ok(lock(&self.agents)?
            .values()
            .find(|a| a.agent_type == agent_type && a.status == AgentStatus::Active)
            .cloned())
    }

    async fn list_all(&self) -> Result<Vec<Agent>, RepositoryError> {
        Ok(lock(&self.agents)?.values().cloned().collect())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryTaskRepository {
    tasks: Arc<Mutex<HashMap<TaskId, AgentTask>>>,
}

impl InMemoryTaskRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskRepository for InMemoryTaskRepository {
    async fn save(&self, task: &AgentTask) -> Result<(), RepositoryError> {
        lock(&self.tasks)?.insert(task.id, task.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: TaskId) -> Result<Option<AgentTask>, RepositoryError> {
        Ok(lock(&self.tasks)?.get(&id).cloned())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryExecutionRepository {
    executions: Arc<Mutex<HashMap<ExecutionId, AgentExecution>>>,
}

impl InMemoryExecutionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExecutionRepository for InMemoryExecutionRepository {
    async fn save(&self, execution: &AgentExecution) -> Result<(), RepositoryError> {
        lock(&self.executions)?.insert(execution.id, execution.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: ExecutionId) -> Result<Option<AgentExecution>, RepositoryError> {
        Ok(lock(&self.executions)?.get(&id).cloned())
    }

    async fn find_by_agent(&self, agent_id: AgentId) -> Result<Vec<AgentExecution>, RepositoryError> {
        let mut executions: Vec<AgentExecution> = lock(&self.executions)?
            .values()
            .filter(|e| e.agent_id == agent_id)
            .cloned()
            .collect();
        executions.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(executions)
    }
}

#[derive(Clone, Default)]
pub struct InMemoryToolCallRepository {
    calls: Arc<Mutex<HashMap<ToolCallId, ToolCall>>>,
}

impl InMemoryToolCallRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ToolCallRepository for InMemoryToolCallRepository {
    async fn save(&self, call: &ToolCall) -> Result<(), RepositoryError> {
        lock(&self.calls)?.insert(call.id, call.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: ToolCallId) -> Result<Option<ToolCall>, RepositoryError> {
        Ok(lock(&self.calls)?.get(&id).cloned())
    }

    async fn find_by_execution(
        &self,
        execution_id: ExecutionId,
    ) -> Result<Vec<ToolCall>, RepositoryError> {
        let mut calls: Vec<ToolCall> = lock(&self.calls)?
            .values()
            .filter(|c| c.execution_id == execution_id)
            .cloned()
            .collect();
        calls.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(calls)
    }
}

// ---------------------------------------------------------------------------
// Idempotency
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct InMemoryIdempotencyRepository {
    records: Arc<Mutex<HashMap<String, IdempotencyRecord>>>,
}

impl InMemoryIdempotencyRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdempotencyRepository for InMemoryIdempotencyRepository {
    async fn try_insert(&self, record: &IdempotencyRecord) -> Result<bool, IdempotencyError> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| IdempotencyError::Storage("Mutex poisoned".to_string()))?;
        if records.contains_key(&record.key) {
            return Ok(false);
        }
        records.insert(record.key.clone(), record.clone());
        Ok(true)
    }

    async fn find_by_key(&self, key: &str) -> Result<Option<IdempotencyRecord>, IdempotencyError> {
        let records = self
            .records
            .lock()
            .map_err(|_| IdempotencyError::Storage("Mutex poisoned".to_string()))?;
        Ok(records.get(key).cloned())
    }

    async fn update(&self, record: &IdempotencyRecord) -> Result<(), IdempotencyError> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| IdempotencyError::Storage("Mutex poisoned".to_string()))?;
        if !records.contains_key(&record.key) {
            return Err(IdempotencyError::NotFound(record.key.clone()));
        }
        records.insert(record.key.clone(), record.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

fn auth_lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, AuthError> {
    mutex
        .lock()
        .map_err(|_| AuthError::Storage("Mutex poisoned".to_string()))
}

#[derive(Clone, Default)]
pub struct InMemoryUserRepository {
    users: Arc<Mutex<HashMap<Uuid, User>>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn upsert_by_email(&self, user: &User) -> Result<User, AuthError> {
        let mut users = auth_lock(&self.users)?;
        if let Some(existing) = users.values_mut().find(|u| u.email == user.email) {
            existing.role = user.role;
            return Ok(existing.clone());
        }
        users.insert(user.id, user.clone());
        Ok(user.clone())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AuthError> {
        Ok(auth_lock(&self.users)?.get(&id).cloned())
    }
}

#[derive(Default)]
struct SessionState {
    sessions: HashMap<Uuid, Session>,
    refresh_tokens: HashMap<String, RefreshToken>,
}

#[derive(Clone, Default)]
pub struct InMemorySessionRepository {
    state: Arc<Mutex<SessionState>>,
}

impl InMemorySessionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn insert_session(&self, session: &Session) -> Result<(), AuthError> {
        auth_lock(&self.state)?.sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn find_session(&self, id: Uuid) -> Result<Option<Session>, AuthError> {
        Ok(auth_lock(&self.state)?.sessions.get(&id).cloned())
    }

    async fn revoke_session(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), AuthError> {
        let mut state = auth_lock(&self.state)?;
        let session = state
            .sessions
            .get_mut(&id)
            .ok_or(AuthError::SessionInvalid)?;
        session.revoked_at = Some(at);
        Ok(())
    }

    async fn insert_refresh_token(&self, token: &RefreshToken) -> Result<(), AuthError> {
        auth_lock(&self.state)?
            .refresh_tokens
            .insert(token.token_hash.clone(), token.clone());
        Ok(())
    }

    async fn find_refresh_token(&self, token_hash: &str) -> Result<Option<RefreshToken>, AuthError> {
        Ok(auth_lock(&self.state)?.refresh_tokens.get(token_hash).cloned())
    }

    async fn rotate_refresh_token(
        &self,
        old_token_hash: &str,
        replacement: &RefreshToken,
        new_session_expiry: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        let mut state = auth_lock(&self.state)?;

        let old = state
            .refresh_tokens
            .get_mut(old_token_hash)
            .ok_or(AuthError::InvalidRefreshToken)?;
        if old.revoked_at.is_some() {
            return Err(AuthError::InvalidRefreshToken);
        }
        old.revoked_at = Some(Utc::now());

        state
            .refresh_tokens
            .insert(replacement.token_hash.clone(), replacement.clone());

        let session = state
            .sessions
            .get_mut(&replacement.session_id)
            .ok_or(AuthError::SessionInvalid)?;
        session.expires_at = new_session_expiry;

        Ok(())
    }

    async fn revoke_refresh_token(&self, token_hash: &str, at: DateTime<Utc>) -> Result<(), AuthError> {
        let mut state = auth_lock(&self.state)?;
        if let Some(token) = state.refresh_tokens.get_mut(token_hash) {
            token.revoked_at = Some(at);
        }
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryRevocationRepository {
    revocations: Arc<Mutex<HashMap<String, TokenRevocation>>>,
}

impl InMemoryRevocationRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RevocationRepository for InMemoryRevocationRepository {
    async fn revoke_jti(&self, revocation: &TokenRevocation) -> Result<(), AuthError> {
        auth_lock(&self.revocations)?.insert(revocation.jti.clone(), revocation.clone());
        Ok(())
    }

    async fn is_jti_revoked(&self, jti: &str) -> Result<bool, AuthError> {
        Ok(auth_lock(&self.revocations)?.contains_key(jti))
    }
}

#[derive(Default)]
struct AuditState {
    entries: Vec<AuditLogEntry>,
    login_attempts: Vec<LoginAttempt>,
}

#[derive(Clone, Default)]
pub struct InMemoryAuditLogRepository {
    state: Arc<Mutex<AuditState>>,
}

impl InMemoryAuditLogRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditLogEntry> {
        self.state
            .lock()
            .map(|s| s.entries.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl AuditLogRepository for InMemoryAuditLogRepository {
    async fn record(&self, entry: &AuditLogEntry) -> Result<(), AuthError> {
        auth_lock(&self.state)?.entries.push(entry.clone());
        Ok(())
    }

    async fn record_login_attempt(&self, attempt: &LoginAttempt) -> Result<(), AuthError> {
        auth_lock(&self.state)?.login_attempts.push(attempt.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Market
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MarketState {
    assets: HashMap<Uuid, Asset>,
    shares: Vec<Share>,
    listings: HashMap<Uuid, Listing>,
    trades: HashMap<Uuid, Trade>,
    ledger: Vec<LedgerEntry>,
}

/// Whole market state behind one mutex: the guarded transitions the
/// Postgres implementation runs inside a transaction are a single critical
/// section here.
#[derive(Clone, Default)]
pub struct InMemoryMarketRepository {
    state: Arc<Mutex<MarketState>>,
}

impl InMemoryMarketRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn market_lock(state: &Mutex<MarketState>) -> Result<MutexGuard<'_, MarketState>, TradeError> {
    state
        .lock()
        .map_err(|_| TradeError::Storage("Mutex poisoned".to_string()))
}

#[async_trait]
impl MarketRepository for InMemoryMarketRepository {
    async fn insert_asset_with_shares(&self, asset: &Asset, initial: &Share) -> Result<(), TradeError> {
        let mut state = market_lock(&self.state)?;
        state.assets.insert(asset.id, asset.clone());
        state.shares.push(initial.clone());
        Ok(())
    }

    async fn find_asset(&self, id: Uuid) -> Result<Option<Asset>, TradeError> {
        Ok(market_lock(&self.state)?.assets.get(&id).cloned())
    }

    async fn shares_for_asset(&self, asset_id: Uuid) -> Result<Vec<Share>, TradeError> {
        Ok(market_lock(&self.state)?
            .shares
            .iter()
            .filter(|s| s.asset_id == asset_id)
            .cloned()
            .collect())
    }

    async fn insert_listing(&self, listing: &Listing) -> Result<(), TradeError> {
        market_lock(&self.state)?.listings.insert(listing.id, listing.clone());
        Ok(())
    }

    async fn find_listing(&self, id: Uuid) -> Result<Option<Listing>, TradeError> {
        Ok(market_lock(&self.state)?.listings.get(&id).cloned())
    }

    async fn execute_trade_request(
        &self,
        listing_id: Uuid,
        buyer_id: Uuid,
        idempotency_key: &str,
    ) -> Result<Trade, TradeError> {
        let mut state = market_lock(&self.state)?;

        let listing = state
            .listings
            .get(&listing_id)
            .cloned()
            .ok_or(TradeError::ListingNotFound)?;
        if listing.status != ListingStatus::Active {
            return Err(TradeError::ListingNotActive);
        }
        let asset = state
            .assets
            .get(&listing.asset_id)
            .ok_or(TradeError::ListingNotFound)?;
        if !asset.tradable {
            return Err(TradeError::AssetNotTradable);
        }
        if listing.shares == 0 {
            return Err(TradeError::NoSharesAvailable);
        }

        let trade = Trade::escrowed(&listing, buyer_id, idempotency_key);
        state.trades.insert(trade.id, trade.clone());

        let listing = state
            .listings
            .get_mut(&listing_id)
            .ok_or(TradeError::ListingNotFound)?;
        listing.status = ListingStatus::Sold;
        listing.shares = 0;

        Ok(trade)
    }

    async fn execute_settlement(&self, trade_id: Uuid) -> Result<SettlementOutcome, TradeError> {
        let mut state = market_lock(&self.state)?;

        let trade = state
            .trades
            .get(&trade_id)
            .cloned()
            .ok_or(TradeError::TradeNotFound)?;
        if trade.status == TradeStatus::Settled {
            return Ok(SettlementOutcome::AlreadySettled(trade));
        }

        state.ledger.push(LedgerEntry::for_trade(
            trade.buyer_id,
            LedgerKind::Debit,
            trade.price_cents,
            trade.id,
        ));
        state.ledger.push(LedgerEntry::for_trade(
            trade.seller_id,
            LedgerKind::Credit,
            trade.price_cents,
            trade.id,
        ));

        // Move shares seller -> buyer.
        if let Some(seller_share) = state
            .shares
            .iter_mut()
            .find(|s| s.asset_id == trade.asset_id && s.owner_id == trade.seller_id)
        {
            seller_share.shares = seller_share.shares.saturating_sub(trade.shares);
        }
        match state
            .shares
            .iter_mut()
            .find(|s| s.asset_id == trade.asset_id && s.owner_id == trade.buyer_id)
        {
            Some(buyer_share) => buyer_share.shares += trade.shares,
            None => state
                .shares
                .push(Share::new(trade.asset_id, trade.buyer_id, trade.shares)),
        }

        let stored = state
            .trades
            .get_mut(&trade_id)
            .ok_or(TradeError::TradeNotFound)?;
        stored.settle();
        Ok(SettlementOutcome::Settled(stored.clone()))
    }

    async fn find_trade(&self, id: Uuid) -> Result<Option<Trade>, TradeError> {
        Ok(market_lock(&self.state)?.trades.get(&id).cloned())
    }

    async fn ledger_for_user(&self, user_id: Uuid) -> Result<Vec<LedgerEntry>, TradeError> {
        Ok(market_lock(&self.state)?
            .ledger
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect())
    }
}
