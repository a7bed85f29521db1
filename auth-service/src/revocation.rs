use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::error::StoreError;

/// Append-only: entries are never removed.
#[derive(Debug, Clone)]
pub struct RevocationRecord {
    pub token_hash: Vec<u8>,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait RevocationLedger: Send + Sync {
    /// Idempotent; revoking an already revoked digest succeeds.
    async fn revoke(&self, record: &RevocationRecord) -> Result<(), StoreError>;

    async fn is_revoked(&self, token_hash: &[u8]) -> Result<bool, StoreError>;
}

#[derive(Clone)]
pub struct PgRevocationLedger {
    pool: PgPool,
}

impl PgRevocationLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RevocationLedger for PgRevocationLedger {
    async fn revoke(&self, record: &RevocationRecord) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO token_blacklist (token_hash, user_id, created_at) VALUES ($1, $2, $3) ON CONFLICT (token_hash) DO NOTHING",
        )
        .bind(&record.token_hash)
        .bind(&record.user_id)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn is_revoked(&self, token_hash: &[u8]) -> Result<bool, StoreError> {
        let found: Option<i32> =
            sqlx::query_scalar("SELECT 1 FROM token_blacklist WHERE token_hash = $1")
                .bind(token_hash)
                .fetch_optional(&self.pool)
                .await?;
        Ok(found.is_some())
    }
}
