use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::StoreError;

/// Refresh credentials are only ever persisted as their SHA-256 digest.
pub fn credential_digest(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionMetadata {
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

impl SessionMetadata {
    pub fn empty() -> Self {
        Self {
            user_agent: None,
            ip_address: None,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct SessionRecord {
    /// Equal to the refresh credential's `jti`.
    pub id: Uuid,
    pub user_id: String,
    pub token_hash: Vec<u8>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

impl SessionRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id,
            issued_at: self.issued_at,
            expires_at: self.expires_at,
            user_agent: self.user_agent.clone(),
            ip_address: self.ip_address.clone(),
        }
    }
}

/// Session view returned to clients; carries no credential material.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub id: Uuid,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Fails with `StoreError::Conflict` if the digest is already present.
    async fn create(&self, record: &SessionRecord) -> Result<(), StoreError>;

    async fn find_by_digest(&self, token_hash: &[u8]) -> Result<Option<SessionRecord>, StoreError>;

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError>;

    /// Deletes only if the session belongs to `user_id`.
    async fn delete_owned(&self, user_id: &str, id: Uuid) -> Result<bool, StoreError>;

    async fn delete_by_digest(&self, user_id: &str, token_hash: &[u8]) -> Result<bool, StoreError>;

    async fn delete_all_for_user(&self, user_id: &str) -> Result<u64, StoreError>;

    /// Newest first, expired rows excluded.
    async fn list_active(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<SessionRecord>, StoreError>;

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;
}

#[derive(Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const SESSION_COLUMNS: &str =
    "id, user_id, token_hash, issued_at, expires_at, user_agent, ip_address";

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn create(&self, record: &SessionRecord) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO session_tokens (id, user_id, token_hash, issued_at, expires_at, user_agent, ip_address) VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(record.id)
        .bind(&record.user_id)
        .bind(&record.token_hash)
        .bind(record.issued_at)
        .bind(record.expires_at)
        .bind(&record.user_agent)
        .bind(&record.ip_address)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_digest(&self, token_hash: &[u8]) -> Result<Option<SessionRecord>, StoreError> {
        let record = sqlx::query_as::<_, SessionRecord>(&format!(
            "SELECT {SESSION_COLUMNS} FROM session_tokens WHERE token_hash = $1"
        ))
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM session_tokens WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_owned(&self, user_id: &str, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM session_tokens WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_by_digest(&self, user_id: &str, token_hash: &[u8]) -> Result<bool, StoreError> {
        let result =
            sqlx::query("DELETE FROM session_tokens WHERE token_hash = $1 AND user_id = $2")
                .bind(token_hash)
                .bind(user_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_all_for_user(&self, user_id: &str) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM session_tokens WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn list_active(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<SessionRecord>, StoreError> {
        let records = sqlx::query_as::<_, SessionRecord>(&format!(
            "SELECT {SESSION_COLUMNS} FROM session_tokens WHERE user_id = $1 AND expires_at > $2 ORDER BY issued_at DESC"
        ))
        .bind(user_id)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM session_tokens WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
