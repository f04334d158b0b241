// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Idempotency Service - Exactly-Once Guard for Side-Effecting Operations
//
// Callers wrap exactly one side-effecting operation between `begin` and
// `complete`/`fail`, keyed by a caller-supplied idempotency key plus a hash
// of the request body. The unique-constraint try-insert in the store is the
// cross-process arbiter; this service never rolls back partial side effects.

use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::idempotency::{IdempotencyError, IdempotencyRecord, IdempotencyStatus};
use crate::domain::repository::IdempotencyRepository;

/// What `begin` observed: a fresh record this caller owns, or an existing
/// record whose `status` the caller must inspect (Completed ⇒ replay the
/// stored response, Started ⇒ concurrent duplicate in flight, Failed ⇒ the
/// caller may retry the operation body under the same key).
#[derive(Debug, Clone)]
pub enum BeginOutcome {
    Created(IdempotencyRecord),
    Existing(IdempotencyRecord),
}

pub struct IdempotencyService {
    repository: Arc<dyn IdempotencyRepository>,
}

impl IdempotencyService {
    pub fn new(repository: Arc<dyn IdempotencyRepository>) -> Self {
        Self { repository }
    }

    pub async fn begin(
        &self,
        key: &str,
        scope: &str,
        user_id: Uuid,
        request_hash: &str,
    ) -> Result<BeginOutcome, IdempotencyError> {
        let record = IdempotencyRecord::started(key, scope, user_id, request_hash);
        if self.repository.try_insert(&record).await? {
            return Ok(BeginOutcome::Created(record));
        }

        let existing = self
            .repository
            .find_by_key(key)
            .await?
            .ok_or_else(|| IdempotencyError::Storage("record vanished after conflict".to_string()))?;

        // Same key, different payload: a caller bug or a key collision
        // across distinct logical requests. Hard error, original record
        // untouched.
        if existing.request_hash != request_hash {
            return Err(IdempotencyError::KeyReusedWithDifferentPayload);
        }

        Ok(BeginOutcome::Existing(existing))
    }

    pub async fn complete(&self, key: &str, response: Value) -> Result<(), IdempotencyError> {
        self.finish(key, IdempotencyStatus::Completed, response).await
    }

    pub async fn fail(&self, key: &str, error: Value) -> Result<(), IdempotencyError> {
        self.finish(key, IdempotencyStatus::Failed, error).await
    }

    async fn finish(
        &self,
        key: &str,
        status: IdempotencyStatus,
        response: Value,
    ) -> Result<(), IdempotencyError> {
        let mut record = self
            .repository
            .find_by_key(key)
            .await?
            .ok_or_else(|| IdempotencyError::NotFound(key.to_string()))?;
        record.status = status;
        record.response = Some(response);
        record.updated_at = Utc::now();
        self.repository.update(&record).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::repositories::memory::InMemoryIdempotencyRepository;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn service() -> IdempotencyService {
        IdempotencyService::new(Arc::new(InMemoryIdempotencyRepository::new()))
    }

    #[tokio::test]
    async fn test_same_key_and_hash_runs_side_effect_once() {
        let service = service();
        let user = Uuid::new_v4();
        let side_effects = AtomicU32::new(0);

        for _ in 0..2 {
            match service.begin("key-1", "trade.request", user, "hash-a").await.unwrap() {
                BeginOutcome::Created(_) => {
                    side_effects.fetch_add(1, Ordering::SeqCst);
                    service.complete("key-1", json!({"trade": "t1"})).await.unwrap();
                }
                BeginOutcome::Existing(record) => {
                    assert_eq!(record.status, IdempotencyStatus::Completed);
                    assert_eq!(record.response, Some(json!({"trade": "t1"})));
                }
            }
        }

        assert_eq!(side_effects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_key_reuse_with_different_hash_is_hard_error() {
        let service = service();
        let user = Uuid::new_v4();

        let first = service.begin("key-1", "trade.request", user, "hash-a").await.unwrap();
        assert!(matches!(first, BeginOutcome::Created(_)));
        service.complete("key-1", json!({"trade": "t1"})).await.unwrap();

        let err = service
            .begin("key-1", "trade.request", user, "hash-b")
            .await
            .unwrap_err();
        assert!(matches!(err, IdempotencyError::KeyReusedWithDifferentPayload));

        // Original record untouched.
        match service.begin("key-1", "trade.request", user, "hash-a").await.unwrap() {
            BeginOutcome::Existing(record) => {
                assert_eq!(record.request_hash, "hash-a");
                assert_eq!(record.status, IdempotencyStatus::Completed);
            }
            BeginOutcome::Created(_) => panic!("record was replaced"),
        }
    }

    #[tokio::test]
    async fn test_concurrent_in_flight_duplicate_surfaces_started() {
        let service = service();
        let user = Uuid::new_v4();

        let _ = service.begin("key-1", "trade.request", user, "hash-a").await.unwrap();
        match service.begin("key-1", "trade.request", user, "hash-a").await.unwrap() {
            BeginOutcome::Existing(record) => assert_eq!(record.status, IdempotencyStatus::Started),
            BeginOutcome::Created(_) => panic!("duplicate begin created a second record"),
        }
    }

    #[tokio::test]
    async fn test_failed_record_allows_retry_with_same_key() {
        let service = service();
        let user = Uuid::new_v4();

        let _ = service.begin("key-1", "trade.request", user, "hash-a").await.unwrap();
        service.fail("key-1", json!({"error": "boom"})).await.unwrap();

        match service.begin("key-1", "trade.request", user, "hash-a").await.unwrap() {
            BeginOutcome::Existing(record) => assert_eq!(record.status, IdempotencyStatus::Failed),
            BeginOutcome::Created(_) => panic!("unexpected fresh record"),
        }
    }
}
