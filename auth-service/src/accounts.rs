use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common_auth::Role;
use serde::Serialize;
use sqlx::{FromRow, PgPool};

use crate::error::StoreError;

/// Public profile of an identity. Never carries the password hash.
#[derive(Debug, Clone, Serialize)]
pub struct Account {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub display_name: Option<String>,
    pub role: Role,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct StoredAccount {
    pub account: Account,
    pub password_hash: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewAccount {
    pub id: String,
    pub email: String,
    pub password_hash: Option<String>,
    pub name: Option<String>,
    pub display_name: Option<String>,
    pub role: Role,
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Fails with `StoreError::Conflict("email")` when the email is taken.
    async fn create(&self, account: NewAccount) -> Result<Account, StoreError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<StoredAccount>, StoreError>;

    /// `email` is compared case-insensitively.
    async fn find_by_email(&self, email: &str) -> Result<Option<StoredAccount>, StoreError>;

    async fn update_password(&self, id: &str, password_hash: &str) -> Result<bool, StoreError>;

    async fn set_active(&self, id: &str, active: bool) -> Result<Option<Account>, StoreError>;

    async fn record_login(&self, id: &str, at: DateTime<Utc>) -> Result<(), StoreError>;
}

#[derive(FromRow)]
struct AccountRow {
    id: String,
    email: String,
    password_hash: Option<String>,
    name: Option<String>,
    display_name: Option<String>,
    role: String,
    is_active: bool,
    created_at: DateTime<Utc>,
    last_login_at: Option<DateTime<Utc>>,
}

impl TryFrom<AccountRow> for StoredAccount {
    type Error = StoreError;

    fn try_from(row: AccountRow) -> Result<Self, Self::Error> {
        let role = row
            .role
            .parse::<Role>()
            .map_err(|_| StoreError::Backend(format!("unknown role '{}' for user {}", row.role, row.id)))?;
        Ok(StoredAccount {
            account: Account {
                id: row.id,
                email: row.email,
                name: row.name,
                display_name: row.display_name,
                role,
                is_active: row.is_active,
                created_at: row.created_at,
                last_login_at: row.last_login_at,
            },
            password_hash: row.password_hash,
        })
    }
}

const ACCOUNT_COLUMNS: &str =
    "id, email, password_hash, name, display_name, role, is_active, created_at, last_login_at";

#[derive(Clone)]
pub struct PgAccountStore {
    pool: PgPool,
}

impl PgAccountStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountStore for PgAccountStore {
    async fn create(&self, account: NewAccount) -> Result<Account, StoreError> {
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            "INSERT INTO users (id, email, password_hash, name, display_name, role) VALUES ($1, $2, $3, $4, $5, $6) RETURNING {ACCOUNT_COLUMNS}"
        ))
        .bind(&account.id)
        .bind(account.email.to_ascii_lowercase())
        .bind(&account.password_hash)
        .bind(&account.name)
        .bind(&account.display_name)
        .bind(account.role.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(StoredAccount::try_from(row)?.account)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<StoredAccount>, StoreError> {
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(StoredAccount::try_from).transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<StoredAccount>, StoreError> {
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email.trim().to_ascii_lowercase())
        .fetch_optional(&self.pool)
        .await?;
        row.map(StoredAccount::try_from).transpose()
    }

    async fn update_password(&self, id: &str, password_hash: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE users SET password_hash = $1 WHERE id = $2")
            .bind(password_hash)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_active(&self, id: &str, active: bool) -> Result<Option<Account>, StoreError> {
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            "UPDATE users SET is_active = $1 WHERE id = $2 RETURNING {ACCOUNT_COLUMNS}"
        ))
        .bind(active)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row
            .map(StoredAccount::try_from)
            .transpose()?
            .map(|stored| stored.account))
    }

    async fn record_login(&self, id: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET last_login_at = $1 WHERE id = $2")
            .bind(at)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
