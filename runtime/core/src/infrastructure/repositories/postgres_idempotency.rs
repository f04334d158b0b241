// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use sqlx::Row;

use crate::domain::idempotency::{IdempotencyError, IdempotencyRecord, IdempotencyStatus};
use crate::domain::repository::IdempotencyRepository;

pub struct PostgresIdempotencyRepository {
    pool: PgPool,
}

impl PostgresIdempotencyRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn status_str(status: IdempotencyStatus) -> &'static str {
    match status {
        IdempotencyStatus::Started => "started",
        IdempotencyStatus::Completed => "completed",
        IdempotencyStatus::Failed => "failed",
    }
}

fn parse_status(s: &str) -> IdempotencyStatus {
    match s {
        "completed" => IdempotencyStatus::Completed,
        "failed" => IdempotencyStatus::Failed,
        _ => IdempotencyStatus::Started,
    }
}

#[async_trait]
impl IdempotencyRepository for PostgresIdempotencyRepository {
    async fn try_insert(&self, record: &IdempotencyRecord) -> Result<bool, IdempotencyError> {
        // Unique-constraint try-insert: the primary key on `key` is the
        // cross-process arbiter of who created the record first.
        let result = sqlx::query(
            r#"
            INSERT INTO idempotency_keys (
                key, scope, user_id, request_hash, status, response,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (key) DO NOTHING
            "#,
        )
        .bind(&record.key)
        .bind(&record.scope)
        .bind(record.user_id)
        .bind(&record.request_hash)
        .bind(status_str(record.status))
        .bind(&record.response)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| IdempotencyError::Storage(e.to_string()))?;

        Ok(result.rows_affected() == 1)
    }

    async fn find_by_key(&self, key: &str) -> Result<Option<IdempotencyRecord>, IdempotencyError> {
        let row = sqlx::query("SELECT * FROM idempotency_keys WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| IdempotencyError::Storage(e.to_string()))?;

        Ok(row.map(|row| {
            let status: String = row.get("status");
            IdempotencyRecord {
                key: row.get("key"),
                scope: row.get("scope"),
                user_id: row.get("user_id"),
                request_hash: row.get("request_hash"),
                status: parse_status(&status),
                response: row.get("response"),
                created_at: row.get("created_at"),
                updated_at: row.get("updated_at"),
            }
        }))
    }

    async fn update(&self, record: &IdempotencyRecord) -> Result<(), IdempotencyError> {
        let result = sqlx::query(
            r#"
            UPDATE idempotency_keys
            SET status = $2, response = $3, updated_at = $4
            WHERE key = $1
            "#,
        )
        .bind(&record.key)
        .bind(status_str(record.status))
        .bind(&record.response)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| IdempotencyError::Storage(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(IdempotencyError::NotFound(record.key.clone()));
        }
        Ok(())
    }
}
