// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Trade Flow - Escrow and Settlement
//
// `request_trade` creates the escrowed trade in one guarded store
// transaction and announces it on the bus; a dedicated durable subscriber
// settles when the escrow event arrives. Settlement is safe under
// duplicate delivery: the state machine makes the second call a no-op.

use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::domain::events::{subjects, MarketEvent};
use crate::domain::market::{Asset, Listing, Share, Trade, TradeError};
use crate::domain::repository::{MarketRepository, SettlementOutcome};
use crate::infrastructure::bus::{BusError, ConsumerOptions, MessageBus};

pub const SETTLEMENT_CONSUMER_GROUP: &str = "market-settlement";

#[derive(Debug, Clone)]
pub struct CreateAssetParams {
    pub asset_type: String,
    pub owner_id: Uuid,
    pub tradable: bool,
    pub metadata: serde_json::Value,
    pub total_shares: u32,
}

#[derive(Debug, Clone)]
pub struct CreateListingParams {
    pub asset_id: Uuid,
    pub seller_id: Uuid,
    pub price_cents: u64,
    pub shares: u32,
}

pub struct TradeService {
    market: Arc<dyn MarketRepository>,
    bus: Arc<dyn MessageBus>,
}

impl TradeService {
    pub fn new(market: Arc<dyn MarketRepository>, bus: Arc<dyn MessageBus>) -> Self {
        Self { market, bus }
    }

    pub async fn create_asset(
        &self,
        params: CreateAssetParams,
    ) -> Result<(Asset, Vec<Share>), TradeError> {
        let asset = Asset::new(
            params.asset_type,
            params.tradable,
            params.metadata,
            params.total_shares,
        );
        let initial = Share::new(asset.id, params.owner_id, params.total_shares);
        self.market.insert_asset_with_shares(&asset, &initial).await?;
        let shares = self.market.shares_for_asset(asset.id).await?;
        Ok((asset, shares))
    }

    pub async fn create_listing(&self, params: CreateListingParams) -> Result<Listing, TradeError> {
        if self.market.find_asset(params.asset_id).await?.is_none() {
            return Err(TradeError::ListingNotFound);
        }
        let listing = Listing::new(
            params.asset_id,
            params.seller_id,
            params.price_cents,
            params.shares,
        );
        self.market.insert_listing(&listing).await?;
        Ok(listing)
    }

    /// Escrow a trade for the listing. The store transaction guards the
    /// listing state; the escrow event drives settlement asynchronously.
    pub async fn request_trade(
        &self,
        listing_id: Uuid,
        buyer_id: Uuid,
        idempotency_key: &str,
    ) -> Result<Trade, TradeError> {
        let trade = self
            .market
            .execute_trade_request(listing_id, buyer_id, idempotency_key)
            .await?;

        info!(trade_id = %trade.id, listing_id = %listing_id, "trade escrowed");

        self.publish(MarketEvent::TradeRequested {
            trade_id: trade.id,
            at: Utc::now(),
        })
        .await?;
        self.publish(MarketEvent::TradeEscrowed {
            trade_id: trade.id,
            at: Utc::now(),
        })
        .await?;

        Ok(trade)
    }

    /// Settle a trade. Guarded at the state machine: calling this twice
    /// settles once, and the second call reports `AlreadySettled`.
    pub async fn settle_trade(&self, trade_id: Uuid) -> Result<SettlementOutcome, TradeError> {
        let outcome = self.market.execute_settlement(trade_id).await?;

        match &outcome {
            SettlementOutcome::Settled(trade) => {
                info!(trade_id = %trade.id, "trade settled");
                self.publish(MarketEvent::TradeSettled {
                    trade_id: trade.id,
                    at: Utc::now(),
                })
                .await?;
            }
            SettlementOutcome::AlreadySettled(trade) => {
                info!(trade_id = %trade.id, "settlement skipped, already settled");
            }
        }

        Ok(outcome)
    }

    async fn publish(&self, event: MarketEvent) -> Result<(), TradeError> {
        let payload =
            serde_json::to_vec(&event).map_err(|e| TradeError::Storage(e.to_string()))?;
        self.bus
            .publish(event.subject(), payload.into())
            .await
            .map_err(|e| TradeError::Storage(format!("event publish failed: {}", e)))?;
        Ok(())
    }
}

/// Durable subscriber on `market.trade.escrowed`: settles each escrowed
/// trade, acking on success and nacking for redelivery on failure. Relies
/// on `settle_trade` being idempotent, since delivery is at-least-once.
pub struct TradeSettlementSubscriber {
    trades: Arc<TradeService>,
    bus: Arc<dyn MessageBus>,
    options: ConsumerOptions,
}

impl TradeSettlementSubscriber {
    pub fn new(
        trades: Arc<TradeService>,
        bus: Arc<dyn MessageBus>,
        options: ConsumerOptions,
    ) -> Self {
        Self {
            trades,
            bus,
            options,
        }
    }

    pub async fn run(&self) -> Result<(), BusError> {
        let mut subscription = self
            .bus
            .subscribe(
                subjects::TRADE_ESCROWED,
                SETTLEMENT_CONSUMER_GROUP,
                self.options.clone(),
            )
            .await?;

        info!(group = SETTLEMENT_CONSUMER_GROUP, "settlement subscriber listening");

        loop {
            let delivery = match subscription.next().await {
                Ok(delivery) => delivery,
                Err(e) => {
                    error!(error = %e, "settlement subscription failed");
                    return Err(e);
                }
            };

            let event: MarketEvent = match serde_json::from_slice(&delivery.payload) {
                Ok(event) => event,
                Err(e) => {
                    error!(error = %e, "undecodable market event, dropping");
                    if let Err(ack_err) = delivery.ack().await {
                        warn!(error = %ack_err, "failed to ack poison event");
                    }
                    continue;
                }
            };

            let trade_id = event.trade_id();
            match self.trades.settle_trade(trade_id).await {
                Ok(_) => {
                    if let Err(e) = delivery.ack().await {
                        warn!(trade_id = %trade_id, error = %e, "ack failed after settlement");
                    }
                }
                Err(e) => {
                    error!(trade_id = %trade_id, attempt = delivery.attempt, error = %e, "settlement failed");
                    if let Err(nack_err) = delivery.nack().await {
                        warn!(trade_id = %trade_id, error = %nack_err, "nack failed");
                    }
                }
            }
        }
    }
}

/// Serialized response shape for a trade, shared by the HTTP handler and
/// the idempotency store so replays are byte-identical.
pub fn trade_response(trade: &Trade) -> serde_json::Value {
    json!({
        "id": trade.id,
        "listing_id": trade.listing_id,
        "asset_id": trade.asset_id,
        "buyer_id": trade.buyer_id,
        "seller_id": trade.seller_id,
        "shares": trade.shares,
        "price_cents": trade.price_cents,
        "status": trade.status,
        "created_at": trade.created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::TradeStatus;
    use crate::infrastructure::bus::InMemoryBus;
    use crate::infrastructure::repositories::memory::InMemoryMarketRepository;

    async fn seeded_service() -> (TradeService, Uuid, Uuid) {
        let market = Arc::new(InMemoryMarketRepository::new());
        let service = TradeService::new(market, Arc::new(InMemoryBus::new()));

        let seller = Uuid::new_v4();
        let (asset, _) = service
            .create_asset(CreateAssetParams {
                asset_type: "artwork".to_string(),
                owner_id: seller,
                tradable: true,
                metadata: json!({}),
                total_shares: 10,
            })
            .await
            .unwrap();

        let listing = service
            .create_listing(CreateListingParams {
                asset_id: asset.id,
                seller_id: seller,
                price_cents: 5_000,
                shares: 10,
            })
            .await
            .unwrap();

        (service, listing.id, seller)
    }

    #[tokio::test]
    async fn test_request_trade_escrows_and_sells_listing() {
        let (service, listing_id, _) = seeded_service().await;
        let buyer = Uuid::new_v4();

        let trade = service.request_trade(listing_id, buyer, "idem-1").await.unwrap();
        assert_eq!(trade.status, TradeStatus::Escrowed);

        // The listing is spent; a second buyer loses.
        let err = service
            .request_trade(listing_id, Uuid::new_v4(), "idem-2")
            .await
            .unwrap_err();
        assert!(matches!(err, TradeError::ListingNotActive));
    }

    #[tokio::test]
    async fn test_settlement_is_idempotent() {
        let (service, listing_id, seller) = seeded_service().await;
        let buyer = Uuid::new_v4();
        let trade = service.request_trade(listing_id, buyer, "idem-1").await.unwrap();

        let first = service.settle_trade(trade.id).await.unwrap();
        assert!(matches!(first, SettlementOutcome::Settled(_)));

        let second = service.settle_trade(trade.id).await.unwrap();
        assert!(matches!(second, SettlementOutcome::AlreadySettled(_)));

        // One debit for the buyer, one credit for the seller.
        let market = &service.market;
        assert_eq!(market.ledger_for_user(buyer).await.unwrap().len(), 1);
        assert_eq!(market.ledger_for_user(seller).await.unwrap().len(), 1);

        // Shares moved exactly once.
        let shares = market.shares_for_asset(trade.asset_id).await.unwrap();
        let buyer_shares: u32 = shares
            .iter()
            .filter(|s| s.owner_id == buyer)
            .map(|s| s.shares)
            .sum();
        assert_eq!(buyer_shares, 10);
    }
}
