// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use sqlx::Row;
use uuid::Uuid;

use crate::domain::market::{
    Asset, LedgerEntry, LedgerKind, Listing, ListingStatus, Share, Trade, TradeError, TradeStatus,
};
use crate::domain::repository::{MarketRepository, SettlementOutcome};

pub struct PostgresMarketRepository {
    pool: PgPool,
}

impl PostgresMarketRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn storage_err(e: sqlx::Error) -> TradeError {
    TradeError::Storage(e.to_string())
}

fn listing_status_str(status: ListingStatus) -> &'static str {
    match status {
        ListingStatus::Active => "active",
        ListingStatus::Sold => "sold",
        ListingStatus::Cancelled => "cancelled",
    }
}

fn parse_listing_status(s: &str) -> ListingStatus {
    match s {
        "sold" => ListingStatus::Sold,
        "cancelled" => ListingStatus::Cancelled,
        _ => ListingStatus::Active,
    }
}

fn trade_status_str(status: TradeStatus) -> &'static str {
    match status {
        TradeStatus::Requested => "requested",
        TradeStatus::Escrowed => "escrowed",
        TradeStatus::Settled => "settled",
        TradeStatus::Failed => "failed",
    }
}

fn parse_trade_status(s: &str) -> TradeStatus {
    match s {
        "requested" => TradeStatus::Requested,
        "settled" => TradeStatus::Settled,
        "failed" => TradeStatus::Failed,
        _ => TradeStatus::Escrowed,
    }
}

fn row_to_listing(row: &sqlx::postgres::PgRow) -> Listing {
    let status: String = row.get("status");
    Listing {
        id: row.get("id"),
        asset_id: row.get("asset_id"),
        seller_id: row.get("seller_id"),
        price_cents: row.get::<i64, _>("price_cents") as u64,
        shares: row.get::<i32, _>("shares") as u32,
        status: parse_listing_status(&status),
        created_at: row.get("created_at"),
    }
}

fn row_to_trade(row: &sqlx::postgres::PgRow) -> Trade {
    let status: String = row.get("status");
    Trade {
        id: row.get("id"),
        listing_id: row.get("listing_id"),
        asset_id: row.get("asset_id"),
        buyer_id: row.get("buyer_id"),
        seller_id: row.get("seller_id"),
        shares: row.get::<i32, _>("shares") as u32,
        price_cents: row.get::<i64, _>("price_cents") as u64,
        status: parse_trade_status(&status),
        idempotency_key: row.get("idempotency_key"),
        created_at: row.get("created_at"),
        settled_at: row.get("settled_at"),
    }
}

#[async_trait]
impl MarketRepository for PostgresMarketRepository {
    async fn insert_asset_with_shares(&self, asset: &Asset, initial: &Share) -> Result<(), TradeError> {
        let mut tx = self.pool.begin().await.map_err(storage_err)?;

        sqlx::query(
            r#"
            INSERT INTO assets (id, asset_type, tradable, metadata, total_shares, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(asset.id)
        .bind(&asset.asset_type)
        .bind(asset.tradable)
        .bind(&asset.metadata)
        .bind(asset.total_shares as i32)
        .bind(asset.created_at)
        .execute(&mut *tx)
        .await
        .map_err(storage_err)?;

        sqlx::query(
            r#"
            INSERT INTO asset_shares (id, asset_id, owner_id, shares)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(initial.id)
        .bind(initial.asset_id)
        .bind(initial.owner_id)
        .bind(initial.shares as i32)
        .execute(&mut *tx)
        .await
        .map_err(storage_err)?;

        tx.commit().await.map_err(storage_err)?;
        Ok(())
    }

    async fn find_asset(&self, id: Uuid) -> Result<Option<Asset>, TradeError> {
        let row = sqlx::query("SELECT * FROM assets WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;

        Ok(row.map(|row| Asset {
            id: row.get("id"),
            asset_type: row.get("asset_type"),
            tradable: row.get("tradable"),
            metadata: row.get("metadata"),
            total_shares: row.get::<i32, _>("total_shares") as u32,
            created_at: row.get("created_at"),
        }))
    }

    async fn shares_for_asset(&self, asset_id: Uuid) -> Result<Vec<Share>, TradeError> {
        let rows = sqlx::query("SELECT * FROM asset_shares WHERE asset_id = $1")
            .bind(asset_id)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;

        Ok(rows
            .iter()
            .map(|row| Share {
                id: row.get("id"),
                asset_id: row.get("asset_id"),
                owner_id: row.get("owner_id"),
                shares: row.get::<i32, _>("shares") as u32,
            })
            .collect())
    }

    async fn insert_listing(&self, listing: &Listing) -> Result<(), TradeError> {
        sqlx::query(
            r#"
            INSERT INTO listings (id, asset_id, seller_id, price_cents, shares, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(listing.id)
        .bind(listing.asset_id)
        .bind(listing.seller_id)
        .bind(listing.price_cents as i64)
        .bind(listing.shares as i32)
        .bind(listing_status_str(listing.status))
        .bind(listing.created_at)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    async fn find_listing(&self, id: Uuid) -> Result<Option<Listing>, TradeError> {
        let row = sqlx::query("SELECT * FROM listings WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;

        Ok(row.as_ref().map(row_to_listing))
    }

    async fn execute_trade_request(
        &self,
        listing_id: Uuid,
        buyer_id: Uuid,
        idempotency_key: &str,
    ) -> Result<Trade, TradeError> {
        let mut tx = self.pool.begin().await.map_err(storage_err)?;

        // Row lock so two concurrent buyers cannot both see the listing as
        // active.
        let row = sqlx::query("SELECT * FROM listings WHERE id = $1 FOR UPDATE")
            .bind(listing_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(storage_err)?;

        let listing = match row.as_ref() {
            Some(row) => row_to_listing(row),
            None => return Err(TradeError::ListingNotFound),
        };
        if listing.status != ListingStatus::Active {
            return Err(TradeError::ListingNotActive);
        }
        if listing.shares == 0 {
            return Err(TradeError::NoSharesAvailable);
        }

        let tradable: Option<bool> = sqlx::query("SELECT tradable FROM assets WHERE id = $1")
            .bind(listing.asset_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(storage_err)?
            .map(|row| row.get("tradable"));
        if tradable != Some(true) {
            return Err(TradeError::AssetNotTradable);
        }

        let trade = Trade::escrowed(&listing, buyer_id, idempotency_key);
        sqlx::query(
            r#"
            INSERT INTO trades (
                id, listing_id, asset_id, buyer_id, seller_id, shares,
                price_cents, status, idempotency_key, created_at, settled_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(trade.id)
        .bind(trade.listing_id)
        .bind(trade.asset_id)
        .bind(trade.buyer_id)
        .bind(trade.seller_id)
        .bind(trade.shares as i32)
        .bind(trade.price_cents as i64)
        .bind(trade_status_str(trade.status))
        .bind(&trade.idempotency_key)
        .bind(trade.created_at)
        .bind(trade.settled_at)
        .execute(&mut *tx)
        .await
        .map_err(storage_err)?;

        sqlx::query("UPDATE listings SET status = 'sold', shares = 0 WHERE id = $1")
            .bind(listing_id)
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;

        tx.commit().await.map_err(storage_err)?;
        Ok(trade)
    }

    async fn execute_settlement(&self, trade_id: Uuid) -> Result<SettlementOutcome, TradeError> {
        let mut tx = self.pool.begin().await.map_err(storage_err)?;

        let row = sqlx::query("SELECT * FROM trades WHERE id = $1 FOR UPDATE")
            .bind(trade_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(storage_err)?;

        let trade = match row.as_ref() {
            Some(row) => row_to_trade(row),
            None => return Err(TradeError::TradeNotFound),
        };
        if trade.status == TradeStatus::Settled {
            return Ok(SettlementOutcome::AlreadySettled(trade));
        }

        for entry in [
            LedgerEntry::for_trade(trade.buyer_id, LedgerKind::Debit, trade.price_cents, trade.id),
            LedgerEntry::for_trade(trade.seller_id, LedgerKind::Credit, trade.price_cents, trade.id),
        ] {
            sqlx::query(
                r#"
                INSERT INTO ledger_entries (id, user_id, kind, amount_cents, ref_type, ref_id, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(entry.id)
            .bind(entry.user_id)
            .bind(match entry.kind {
                LedgerKind::Debit => "DEBIT",
                LedgerKind::Credit => "CREDIT",
            })
            .bind(entry.amount_cents as i64)
            .bind(&entry.ref_type)
            .bind(entry.ref_id)
            .bind(entry.created_at)
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;
        }

        sqlx::query(
            "UPDATE asset_shares SET shares = shares - $3 WHERE asset_id = $1 AND owner_id = $2",
        )
        .bind(trade.asset_id)
        .bind(trade.seller_id)
        .bind(trade.shares as i32)
        .execute(&mut *tx)
        .await
        .map_err(storage_err)?;

        sqlx::query(
            r#"
            INSERT INTO asset_shares (id, asset_id, owner_id, shares)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (asset_id, owner_id) DO UPDATE SET
                shares = asset_shares.shares + EXCLUDED.shares
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(trade.asset_id)
        .bind(trade.buyer_id)
        .bind(trade.shares as i32)
        .execute(&mut *tx)
        .await
        .map_err(storage_err)?;

        let settled = sqlx::query(
            "UPDATE trades SET status = 'settled', settled_at = now() WHERE id = $1 RETURNING *",
        )
        .bind(trade_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(storage_err)?;

        tx.commit().await.map_err(storage_err)?;
        Ok(SettlementOutcome::Settled(row_to_trade(&settled)))
    }

    async fn find_trade(&self, id: Uuid) -> Result<Option<Trade>, TradeError> {
        let row = sqlx::query("SELECT * FROM trades WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;

        Ok(row.as_ref().map(row_to_trade))
    }

    async fn ledger_for_user(&self, user_id: Uuid) -> Result<Vec<LedgerEntry>, TradeError> {
        let rows = sqlx::query(
            "SELECT * FROM ledger_entries WHERE user_id = $1 ORDER BY created_at",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(rows
            .iter()
            .map(|row| {
                let kind: String = row.get("kind");
                LedgerEntry {
                    id: row.get("id"),
                    user_id: row.get("user_id"),
                    kind: if kind == "DEBIT" {
                        LedgerKind::Debit
                    } else {
                        LedgerKind::Credit
                    },
                    amount_cents: row.get::<i64, _>("amount_cents") as u64,
                    ref_type: row.get("ref_type"),
                    ref_id: row.get("ref_id"),
                    created_at: row.get("created_at"),
                }
            })
            .collect())
    }
}
