//! Process-local backends for development (`AUTH_STORAGE=memory`) and tests.
//! Every trait call takes the lock for exactly one operation.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::accounts::{Account, AccountStore, NewAccount, StoredAccount};
use crate::error::StoreError;
use crate::revocation::{RevocationLedger, RevocationRecord};
use crate::sessions::{SessionRecord, SessionStore};

#[derive(Default)]
struct SessionMaps {
    by_id: HashMap<Uuid, SessionRecord>,
    by_digest: HashMap<Vec<u8>, Uuid>,
}

impl SessionMaps {
    fn remove(&mut self, id: Uuid) -> Option<SessionRecord> {
        let record = self.by_id.remove(&id)?;
        self.by_digest.remove(&record.token_hash);
        Some(record)
    }

    fn remove_where(&mut self, predicate: impl Fn(&SessionRecord) -> bool) -> u64 {
        let ids = self
            .by_id
            .values()
            .filter(|record| predicate(record))
            .map(|record| record.id)
            .collect::<Vec<_>>();
        for id in &ids {
            self.remove(*id);
        }
        ids.len() as u64
    }
}

#[derive(Default)]
pub struct InMemorySessionStore {
    inner: RwLock<SessionMaps>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.by_id.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(&self, record: &SessionRecord) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        if guard.by_digest.contains_key(&record.token_hash) || guard.by_id.contains_key(&record.id)
        {
            return Err(StoreError::Conflict("token_hash"));
        }
        guard.by_digest.insert(record.token_hash.clone(), record.id);
        guard.by_id.insert(record.id, record.clone());
        Ok(())
    }

    async fn find_by_digest(&self, token_hash: &[u8]) -> Result<Option<SessionRecord>, StoreError> {
        let guard = self.inner.read().await;
        Ok(guard
            .by_digest
            .get(token_hash)
            .and_then(|id| guard.by_id.get(id))
            .cloned())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.inner.write().await.remove(id).is_some())
    }

    async fn delete_owned(&self, user_id: &str, id: Uuid) -> Result<bool, StoreError> {
        let mut guard = self.inner.write().await;
        match guard.by_id.get(&id) {
            Some(record) if record.user_id == user_id => Ok(guard.remove(id).is_some()),
            _ => Ok(false),
        }
    }

    async fn delete_by_digest(&self, user_id: &str, token_hash: &[u8]) -> Result<bool, StoreError> {
        let mut guard = self.inner.write().await;
        let owned = guard
            .by_digest
            .get(token_hash)
            .and_then(|id| guard.by_id.get(id))
            .filter(|record| record.user_id == user_id)
            .map(|record| record.id);
        Ok(match owned {
            Some(id) => guard.remove(id).is_some(),
            None => false,
        })
    }

    async fn delete_all_for_user(&self, user_id: &str) -> Result<u64, StoreError> {
        Ok(self
            .inner
            .write()
            .await
            .remove_where(|record| record.user_id == user_id))
    }

    async fn list_active(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<SessionRecord>, StoreError> {
        let guard = self.inner.read().await;
        let mut records = guard
            .by_id
            .values()
            .filter(|record| record.user_id == user_id && !record.is_expired(now))
            .cloned()
            .collect::<Vec<_>>();
        records.sort_by(|a, b| b.issued_at.cmp(&a.issued_at));
        Ok(records)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        Ok(self
            .inner
            .write()
            .await
            .remove_where(|record| record.is_expired(now)))
    }
}

#[derive(Default)]
pub struct InMemoryRevocationLedger {
    revoked: RwLock<HashSet<Vec<u8>>>,
}

impl InMemoryRevocationLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RevocationLedger for InMemoryRevocationLedger {
    async fn revoke(&self, record: &RevocationRecord) -> Result<(), StoreError> {
        self.revoked.write().await.insert(record.token_hash.clone());
        Ok(())
    }

    async fn is_revoked(&self, token_hash: &[u8]) -> Result<bool, StoreError> {
        Ok(self.revoked.read().await.contains(token_hash))
    }
}

#[derive(Default)]
pub struct InMemoryAccountStore {
    accounts: RwLock<HashMap<String, StoredAccount>>,
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn create(&self, account: NewAccount) -> Result<Account, StoreError> {
        let email = account.email.trim().to_ascii_lowercase();
        let mut guard = self.accounts.write().await;
        if guard.values().any(|stored| stored.account.email == email) {
            return Err(StoreError::Conflict("email"));
        }
        if guard.contains_key(&account.id) {
            return Err(StoreError::Conflict("id"));
        }

        let created = Account {
            id: account.id.clone(),
            email,
            name: account.name,
            display_name: account.display_name,
            role: account.role,
            is_active: true,
            created_at: Utc::now(),
            last_login_at: None,
        };
        guard.insert(
            account.id,
            StoredAccount {
                account: created.clone(),
                password_hash: account.password_hash,
            },
        );
        Ok(created)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<StoredAccount>, StoreError> {
        Ok(self.accounts.read().await.get(id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<StoredAccount>, StoreError> {
        let email = email.trim().to_ascii_lowercase();
        Ok(self
            .accounts
            .read()
            .await
            .values()
            .find(|stored| stored.account.email == email)
            .cloned())
    }

    async fn update_password(&self, id: &str, password_hash: &str) -> Result<bool, StoreError> {
        let mut guard = self.accounts.write().await;
        Ok(match guard.get_mut(id) {
            Some(stored) => {
                stored.password_hash = Some(password_hash.to_string());
                true
            }
            None => false,
        })
    }

    async fn set_active(&self, id: &str, active: bool) -> Result<Option<Account>, StoreError> {
        let mut guard = self.accounts.write().await;
        Ok(guard.get_mut(id).map(|stored| {
            stored.account.is_active = active;
            stored.account.clone()
        }))
    }

    async fn record_login(&self, id: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        if let Some(stored) = self.accounts.write().await.get_mut(id) {
            stored.account.last_login_at = Some(at);
        }
        Ok(())
    }
}
