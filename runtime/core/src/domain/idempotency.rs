// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdempotencyStatus {
    Started,
    Completed,
    Failed,
}

/// Guard record for one logical side-effecting operation.
///
/// The `key` is caller-supplied and unique; `request_hash` binds it to one
/// request body so an accidental key collision across distinct requests is
/// a hard error rather than a silent replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub key: String,
    pub scope: String,
    pub user_id: Uuid,
    pub request_hash: String,
    pub status: IdempotencyStatus,
    pub response: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl IdempotencyRecord {
    pub fn started(
        key: impl Into<String>,
        scope: impl Into<String>,
        user_id: Uuid,
        request_hash: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            key: key.into(),
            scope: scope.into(),
            user_id,
            request_hash: request_hash.into(),
            status: IdempotencyStatus::Started,
            response: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Error)]
pub enum IdempotencyError {
    #[error("Idempotency key reused with different payload")]
    KeyReusedWithDifferentPayload,

    #[error("Idempotency key not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

/// SHA-256 over the serialized request value, hex-encoded. Callers hash
/// `{body, user_id}` so the same body from two users never collides.
pub fn hash_request(value: &serde_json::Value) -> String {
    let bytes = serde_json::to_vec(value).unwrap_or_default();
    let digest = Sha256::digest(&bytes);
    hex::encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_hash_request_is_stable_and_payload_sensitive() {
        let a = hash_request(&json!({"listing_id": "l1", "buyer_id": "b1"}));
        let b = hash_request(&json!({"listing_id": "l1", "buyer_id": "b1"}));
        let c = hash_request(&json!({"listing_id": "l1", "buyer_id": "b2"}));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }
}
