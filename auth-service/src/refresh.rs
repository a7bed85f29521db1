use std::sync::Arc;

use chrono::{DateTime, Utc};
use common_auth::JwtVerifier;
use tracing::{info, warn};
use uuid::Uuid;

use crate::accounts::{Account, AccountStore};
use crate::config::{InactiveSessionPolicy, SessionPolicy};
use crate::error::{SessionError, SessionResult};
use crate::revocation::{RevocationLedger, RevocationRecord};
use crate::sessions::{credential_digest, SessionMetadata, SessionStore, SessionSummary};
use crate::tokens::{IssuedTokens, TokenIssuer, TokenSubject};

/// Fresh credential pair plus the profile it was issued for.
#[derive(Debug, Clone)]
pub struct SessionGrant {
    pub tokens: IssuedTokens,
    pub account: Account,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogoutOutcome {
    pub session_removed: bool,
    pub revoked: bool,
}

/// Owns the refresh state machine and the session-level operations around it.
pub struct RefreshCoordinator {
    issuer: Arc<TokenIssuer>,
    verifier: Arc<JwtVerifier>,
    sessions: Arc<dyn SessionStore>,
    ledger: Arc<dyn RevocationLedger>,
    accounts: Arc<dyn AccountStore>,
    policy: SessionPolicy,
}

impl RefreshCoordinator {
    pub fn new(
        issuer: Arc<TokenIssuer>,
        verifier: Arc<JwtVerifier>,
        sessions: Arc<dyn SessionStore>,
        ledger: Arc<dyn RevocationLedger>,
        accounts: Arc<dyn AccountStore>,
        policy: SessionPolicy,
    ) -> Self {
        Self {
            issuer,
            verifier,
            sessions,
            ledger,
            accounts,
            policy,
        }
    }

    /// Exchanges a refresh credential for a new pair. Checks run in a fixed
    /// order and stop at the first failure: ledger, signature, session,
    /// expiry, owner status. The old session is deleted before the new one
    /// is issued, so a failure in between leaves the subject signed out.
    pub async fn refresh(
        &self,
        refresh_token: &str,
        metadata: SessionMetadata,
    ) -> SessionResult<SessionGrant> {
        let digest = credential_digest(refresh_token);

        if self.ledger.is_revoked(&digest).await? {
            warn!(outcome = "revoked", "refresh rejected");
            return Err(SessionError::RevokedToken);
        }

        let claims = self.verifier.verify_refresh(refresh_token).map_err(|err| {
            warn!(outcome = "malformed", error = %err, "refresh rejected");
            SessionError::MalformedToken
        })?;

        let record = match self.sessions.find_by_digest(&digest).await? {
            Some(record) if record.user_id == claims.subject => record,
            _ => {
                warn!(user_id = %claims.subject, outcome = "unknown_session", "refresh rejected");
                return Err(SessionError::UnknownSession);
            }
        };

        if record.is_expired(Utc::now()) {
            self.sessions.delete(record.id).await?;
            warn!(
                user_id = %record.user_id,
                session_id = %record.id,
                outcome = "expired",
                "refresh rejected"
            );
            return Err(SessionError::SessionExpired);
        }

        let account = match self.accounts.find_by_id(&record.user_id).await? {
            Some(stored) if stored.account.is_active => stored.account,
            _ => {
                if self.policy.inactive_sessions == InactiveSessionPolicy::Delete {
                    self.sessions.delete(record.id).await?;
                }
                warn!(
                    user_id = %record.user_id,
                    session_id = %record.id,
                    outcome = "inactive",
                    "refresh rejected"
                );
                return Err(SessionError::AccountInactive);
            }
        };

        // A concurrent refresh with the same credential already consumed it.
        if !self.sessions.delete(record.id).await? {
            warn!(user_id = %record.user_id, session_id = %record.id, outcome = "raced", "refresh rejected");
            return Err(SessionError::UnknownSession);
        }

        let metadata = if metadata.user_agent.is_none() && metadata.ip_address.is_none() {
            SessionMetadata {
                user_agent: record.user_agent.clone(),
                ip_address: record.ip_address.clone(),
            }
        } else {
            metadata
        };

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

        info!(
            user_id = %account.id,
            previous_session = %record.id,
            session_id = %tokens.session_id,
            "refresh credential rotated"
        );
        Ok(SessionGrant { tokens, account })
    }

    /// Removes the caller's session for `refresh_token` and, when enabled,
    /// records the credential in the ledger. A credential that does not
    /// verify as the caller's own is never ledgered.
    pub async fn logout(&self, user_id: &str, refresh_token: &str) -> SessionResult<LogoutOutcome> {
        let digest = credential_digest(refresh_token);
        let session_removed = self.sessions.delete_by_digest(user_id, &digest).await?;

        let owned = self
            .verifier
            .verify_refresh(refresh_token)
            .map(|claims| claims.subject == user_id)
            .unwrap_or(false);

        let revoked = self.policy.revoke_on_logout && owned;
        if revoked {
            self.ledger
                .revoke(&RevocationRecord {
                    token_hash: digest,
                    user_id: user_id.to_string(),
                    created_at: Utc::now(),
                })
                .await?;
        }

        info!(user_id, session_removed, revoked, "logout");
        Ok(LogoutOutcome {
            session_removed,
            revoked,
        })
    }

    pub async fn logout_all(&self, user_id: &str) -> SessionResult<u64> {
        let removed = self.sessions.delete_all_for_user(user_id).await?;
        info!(user_id, removed, "logout from all sessions");
        Ok(removed)
    }

    /// Blacklists a refresh credential and drops its session. The credential
    /// does not need to verify; an expired or foreign-signed value is still
    /// ledgered.
    pub async fn revoke(&self, refresh_token: &str, revoked_by: &str) -> SessionResult<bool> {
        let digest = credential_digest(refresh_token);
        let record = self.sessions.find_by_digest(&digest).await?;

        let owner = match &record {
            Some(record) => record.user_id.clone(),
            None => self
                .verifier
                .verify_refresh(refresh_token)
                .map(|claims| claims.subject)
                .unwrap_or_default(),
        };

        self.ledger
            .revoke(&RevocationRecord {
                token_hash: digest,
                user_id: owner.clone(),
                created_at: Utc::now(),
            })
            .await?;

        let session_removed = match record {
            Some(record) => self.sessions.delete(record.id).await?,
            None => false,
        };

        info!(user_id = %owner, revoked_by, session_removed, "refresh credential revoked");
        Ok(session_removed)
    }

    pub async fn list_sessions(&self, user_id: &str) -> SessionResult<Vec<SessionSummary>> {
        let records = self.sessions.list_active(user_id, Utc::now()).await?;
        Ok(records.iter().map(|record| record.summary()).collect())
    }

    pub async fn revoke_session(&self, user_id: &str, session_id: Uuid) -> SessionResult<()> {
        if self.sessions.delete_owned(user_id, session_id).await? {
            info!(user_id, session_id = %session_id, "session revoked");
            Ok(())
        } else {
            Err(SessionError::NotFound("Session"))
        }
    }

    pub async fn purge_expired(&self, now: DateTime<Utc>) -> SessionResult<u64> {
        Ok(self.sessions.purge_expired(now).await?)
    }
}
