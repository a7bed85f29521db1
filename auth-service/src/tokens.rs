use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use common_auth::{JwtConfig, Role, SignedClaims, TokenKind};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::Serialize;
use uuid::Uuid;

use crate::config::{ConfigError, TokenConfig};
use crate::error::{SessionError, SessionResult};
use crate::sessions::{credential_digest, SessionMetadata, SessionRecord, SessionStore};

pub struct TokenIssuer {
    encoding_key: EncodingKey,
    jwt: JwtConfig,
    config: TokenConfig,
    sessions: Arc<dyn SessionStore>,
}

#[derive(Debug, Clone)]
pub struct TokenSubject {
    pub user_id: String,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize)]
pub struct IssuedTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
    pub access_expires_in: i64,
    pub refresh_expires_in: i64,
    pub token_type: &'static str,
    #[serde(skip)]
    pub session_id: Uuid,
}

impl TokenIssuer {
    pub fn new(
        jwt: &JwtConfig,
        config: TokenConfig,
        sessions: Arc<dyn SessionStore>,
    ) -> SessionResult<Self> {
        if !jwt.has_secret() {
            return Err(SessionError::Configuration(ConfigError::MissingSecret));
        }

        Ok(Self {
            encoding_key: EncodingKey::from_secret(jwt.secret_bytes()),
            jwt: jwt.clone(),
            config,
            sessions,
        })
    }

    /// Mints an access/refresh pair and persists the refresh credential's session.
    pub async fn issue_tokens(
        &self,
        subject: TokenSubject,
        metadata: SessionMetadata,
    ) -> SessionResult<IssuedTokens> {
        let now = Utc::now();
        let access_exp = expiry(now, self.config.access_ttl_seconds)?;
        let refresh_exp = expiry(now, self.config.refresh_ttl_seconds)?;

        let access_token = self.sign(&subject, TokenKind::Access, Uuid::new_v4(), now, access_exp)?;

        let session_id = Uuid::new_v4();
        let refresh_token =
            self.sign(&subject, TokenKind::Refresh, session_id, now, refresh_exp)?;

        let record = SessionRecord {
            id: session_id,
            user_id: subject.user_id.clone(),
            token_hash: credential_digest(&refresh_token),
            issued_at: now,
            expires_at: refresh_exp,
            user_agent: metadata.user_agent,
            ip_address: metadata.ip_address,
        };
        self.sessions.create(&record).await?;

        Ok(IssuedTokens {
            access_token,
            refresh_token,
            access_expires_at: access_exp,
            refresh_expires_at: refresh_exp,
            access_expires_in: self.config.access_ttl_seconds,
            refresh_expires_in: self.config.refresh_ttl_seconds,
            token_type: "Bearer",
            session_id,
        })
    }

    fn sign(
        &self,
        subject: &TokenSubject,
        kind: TokenKind,
        jti: Uuid,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> SessionResult<String> {
        let claims = SignedClaims {
            sub: &subject.user_id,
            role: subject.role,
            typ: kind,
            jti: jti.to_string(),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
            iss: &self.jwt.issuer,
            aud: &self.jwt.audience,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key).map_err(|err| {
            SessionError::Internal(format!("Failed to sign {} token: {err}", kind.as_str()))
        })
    }
}

fn expiry(now: DateTime<Utc>, ttl_seconds: i64) -> SessionResult<DateTime<Utc>> {
    Duration::try_seconds(ttl_seconds)
        .and_then(|ttl| now.checked_add_signed(ttl))
        .ok_or_else(|| {
            SessionError::Internal(format!("token window of {ttl_seconds}s is out of range"))
        })
}
