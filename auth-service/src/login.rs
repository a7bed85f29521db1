use std::sync::Arc;

use chrono::Utc;
use common_auth::Role;
use tracing::{info, warn};
use uuid::Uuid;

use crate::accounts::{Account, AccountStore, NewAccount};
use crate::error::{SessionError, SessionResult};
use crate::password::CredentialVerifier;
use crate::refresh::SessionGrant;
use crate::sessions::{SessionMetadata, SessionStore};
use crate::tokens::{TokenIssuer, TokenSubject};

const MIN_REGISTER_PASSWORD: usize = 6;
const MIN_CHANGED_PASSWORD: usize = 8;

#[derive(Debug, Clone)]
pub struct Registration {
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    pub name: String,
    pub display_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PasswordChange {
    pub current_password: String,
    pub new_password: String,
    pub confirm_password: String,
}

/// Account-facing flows: registration, login, password change, activation.
pub struct Authenticator {
    accounts: Arc<dyn AccountStore>,
    sessions: Arc<dyn SessionStore>,
    credentials: Arc<CredentialVerifier>,
    issuer: Arc<TokenIssuer>,
}

impl Authenticator {
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        sessions: Arc<dyn SessionStore>,
        credentials: Arc<CredentialVerifier>,
        issuer: Arc<TokenIssuer>,
    ) -> Self {
        Self {
            accounts,
            sessions,
            credentials,
            issuer,
        }
    }

    pub async fn register(
        &self,
        registration: Registration,
        metadata: SessionMetadata,
    ) -> SessionResult<SessionGrant> {
        let Registration {
            email,
            password,
            confirm_password,
            name,
            display_name,
        } = registration;

        let email = normalize_email(&email)?;
        let name = name.trim();
        if name.is_empty() {
            return Err(SessionError::Validation("Name is required.".to_string()));
        }
        validate_new_password(&password, &confirm_password, MIN_REGISTER_PASSWORD)?;

        let password_hash = self.credentials.hash(&password)?;
        let account = self
            .accounts
            .create(NewAccount {
                id: Uuid::new_v4().to_string(),
                email,
                password_hash: Some(password_hash),
                name: Some(name.to_string()),
                display_name: display_name
                    .map(|value| value.trim().to_string())
                    .filter(|value| !value.is_empty()),
                role: Role::User,
            })
            .await?;

        info!(user_id = %account.id, "account registered");
        self.grant(account, metadata).await
    }

    /// Unknown email, password-less account and wrong password are
    /// indistinguishable to the caller.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        metadata: SessionMetadata,
    ) -> SessionResult<SessionGrant> {
        let stored = self.accounts.find_by_email(email).await?;
        let hash = stored
            .as_ref()
            .and_then(|stored| stored.password_hash.as_deref());

        if !self.credentials.verify_or_dummy(password, hash) {
            warn!(
                user_id = stored.as_ref().map(|s| s.account.id.as_str()).unwrap_or("-"),
                outcome = "invalid_credentials",
                "login rejected"
            );
            return Err(SessionError::InvalidCredentials);
        }

        // verify_or_dummy never succeeds without a stored hash.
        let Some(stored) = stored else {
            return Err(SessionError::InvalidCredentials);
        };
        if !stored.account.is_active {
            warn!(user_id = %stored.account.id, outcome = "inactive", "login rejected");
            return Err(SessionError::AccountInactive);
        }

        let now = Utc::now();
        self.accounts.record_login(&stored.account.id, now).await?;
        let mut account = stored.account;
        account.last_login_at = Some(now);

        info!(user_id = %account.id, "login succeeded");
        self.grant(account, metadata).await
    }

    /// Replaces the password hash and signs the subject out everywhere.
    pub async fn change_password(
        &self,
        user_id: &str,
        change: PasswordChange,
    ) -> SessionResult<u64> {
        validate_new_password(
            &change.new_password,
            &change.confirm_password,
            MIN_CHANGED_PASSWORD,
        )?;
        if change.new_password == change.current_password {
            return Err(SessionError::Validation(
                "New password must differ from the current password.".to_string(),
            ));
        }

        let stored = self
            .accounts
            .find_by_id(user_id)
            .await?
            .ok_or(SessionError::NotFound("User"))?;
        let current_matches = self
            .credentials
            .verify_or_dummy(&change.current_password, stored.password_hash.as_deref());
        if !current_matches {
            warn!(user_id, outcome = "invalid_credentials", "password change rejected");
            return Err(SessionError::InvalidCredentials);
        }

        let new_hash = self.credentials.hash(&change.new_password)?;
        if !self.accounts.update_password(user_id, &new_hash).await? {
            return Err(SessionError::NotFound("User"));
        }
        let removed = self.sessions.delete_all_for_user(user_id).await?;

        info!(user_id, sessions_removed = removed, "password changed");
        Ok(removed)
    }

    pub async fn profile(&self, user_id: &str) -> SessionResult<Account> {
        self.accounts
            .find_by_id(user_id)
            .await?
            .map(|stored| stored.account)
            .ok_or(SessionError::NotFound("User"))
    }

    /// Sessions are left untouched; refresh enforces the new status.
    pub async fn set_active(&self, user_id: &str, active: bool) -> SessionResult<Account> {
        let account = self
            .accounts
            .set_active(user_id, active)
            .await?
            .ok_or(SessionError::NotFound("User"))?;
        info!(user_id, active, "account status changed");
        Ok(account)
    }

    async fn grant(&self, account: Account, metadata: SessionMetadata) -> SessionResult<SessionGrant> {
        let tokens = self
            .issuer
            .issue_tokens(
                TokenSubject {
                    user_id: account.id.clone(),
                    role: account.role,
                },
                metadata,
            )
            .await?;
        Ok(SessionGrant { tokens, account })
    }
}

fn normalize_email(email: &str) -> SessionResult<String> {
    let email = email.trim().to_ascii_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if valid {
        Ok(email)
    } else {
        Err(SessionError::Validation("Invalid email address.".to_string()))
    }
}

fn validate_new_password(password: &str, confirm: &str, min_len: usize) -> SessionResult<()> {
    if password.chars().count() < min_len {
        return Err(SessionError::Validation(format!(
            "Password must be at least {min_len} characters."
        )));
    }
    if password != confirm {
        return Err(SessionError::Validation("Passwords do not match.".to_string()));
    }
    Ok(())
}
