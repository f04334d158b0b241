// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// A tradable asset whose ownership is split into shares. Share rows for an
/// asset always sum to `total_shares`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    pub id: Uuid,
    pub asset_type: String,
    pub tradable: bool,
    pub metadata: serde_json::Value,
    pub total_shares: u32,
    pub created_at: DateTime<Utc>,
}

impl Asset {
    pub fn new(asset_type: impl Into<String>, tradable: bool, metadata: serde_json::Value, total_shares: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            asset_type: asset_type.into(),
            tradable,
            metadata,
            total_shares,
            created_at: Utc::now(),
        }
    }
}

/// One owner's slice of an asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Share {
    pub id: Uuid,
    pub asset_id: Uuid,
    pub owner_id: Uuid,
    pub shares: u32,
}

impl Share {
    pub fn new(asset_id: Uuid, owner_id: Uuid, shares: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            asset_id,
            owner_id,
            shares,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ListingStatus {
    Active,
    Sold,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing {
    pub id: Uuid,
    pub asset_id: Uuid,
    pub seller_id: Uuid,
    pub price_cents: u64,
    pub shares: u32,
    pub status: ListingStatus,
    pub created_at: DateTime<Utc>,
}

impl Listing {
    pub fn new(asset_id: Uuid, seller_id: Uuid, price_cents: u64, shares: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            asset_id,
            seller_id,
            price_cents,
            shares,
            status: ListingStatus::Active,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeStatus {
    Requested,
    Escrowed,
    Settled,
    Failed,
}

/// A purchase moving through REQUESTED → ESCROWED → SETTLED | FAILED.
///
/// Settlement is guarded at the state machine: `begin_settlement` on an
/// already-settled trade reports `AlreadySettled` so a redelivered
/// settlement event is a no-op rather than a double spend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: Uuid,
    pub listing_id: Uuid,
    pub asset_id: Uuid,
    pub buyer_id: Uuid,
    pub seller_id: Uuid,
    pub shares: u32,
    pub price_cents: u64,
    pub status: TradeStatus,
    pub idempotency_key: String,
    pub created_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
}

impl Trade {
    pub fn escrowed(listing: &Listing, buyer_id: Uuid, idempotency_key: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            listing_id: listing.id,
            asset_id: listing.asset_id,
            buyer_id,
            seller_id: listing.seller_id,
            shares: listing.shares,
            price_cents: listing.price_cents,
            status: TradeStatus::Escrowed,
            idempotency_key: idempotency_key.into(),
            created_at: Utc::now(),
            settled_at: None,
        }
    }

    pub fn settle(&mut self) {
        self.status = TradeStatus::Settled;
        self.settled_at = Some(Utc::now());
    }

    pub fn fail(&mut self) {
        self.status = TradeStatus::Failed;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerKind {
    Debit,
    Credit,
}

/// Double-entry row written at settlement: a debit against the buyer and a
/// matching credit to the seller, both referencing the trade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: LedgerKind,
    pub amount_cents: u64,
    pub ref_type: String,
    pub ref_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn for_trade(user_id: Uuid, kind: LedgerKind, amount_cents: u64, trade_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            kind,
            amount_cents,
            ref_type: "TRADE".to_string(),
            ref_id: trade_id,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Error)]
pub enum TradeError {
    #[error("Listing not found")]
    ListingNotFound,

    #[error("Listing not active")]
    ListingNotActive,

    #[error("Asset not tradable")]
    AssetNotTradable,

    #[error("No shares available")]
    NoSharesAvailable,

    #[error("Trade not found")]
    TradeNotFound,

    #[error("Storage error: {0}")]
    Storage(String),
}
