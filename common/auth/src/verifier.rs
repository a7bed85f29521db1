use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde_json::Value;
use tracing::debug;

use crate::claims::{Claims, TokenKind};
use crate::config::JwtConfig;
use crate::error::{AuthError, AuthResult};

/// Stateless HS256 verifier. Performs no store lookups, so a leaked access
/// credential stays valid until its own expiry.
#[derive(Clone)]
pub struct JwtVerifier {
    config: JwtConfig,
    key: DecodingKey,
    access_cookie: Option<String>,
}

impl JwtVerifier {
    pub fn new(config: JwtConfig) -> Self {
        let key = DecodingKey::from_secret(config.secret_bytes());
        Self {
            config,
            key,
            access_cookie: None,
        }
    }

    /// Also accept the access credential from the named cookie when no
    /// Authorization header is sent.
    pub fn with_access_cookie(mut self, name: impl Into<String>) -> Self {
        self.access_cookie = Some(name.into());
        self
    }

    pub fn access_cookie(&self) -> Option<&str> {
        self.access_cookie.as_deref()
    }

    pub fn verify_access(&self, token: &str) -> AuthResult<Claims> {
        self.verify(token, TokenKind::Access)
    }

    pub fn verify_refresh(&self, token: &str) -> AuthResult<Claims> {
        self.verify(token, TokenKind::Refresh)
    }

    pub fn verify(&self, token: &str, expected: TokenKind) -> AuthResult<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[self.config.issuer.as_str()]);
        validation.set_audience(&[self.config.audience.as_str()]);
        validation.set_required_spec_claims(&["exp", "sub", "iss", "aud"]);
        validation.leeway = self.config.leeway_seconds.into();

        let token_data = decode::<Value>(token, &self.key, &validation)?;
        let claims = Claims::try_from(token_data.claims)?;
        if claims.kind != expected {
            return Err(AuthError::WrongTokenKind {
                expected,
                found: claims.kind,
            });
        }

        debug!(kind = expected.as_str(), jti = %claims.token_id, "verified JWT successfully");
        Ok(claims)
    }
}
