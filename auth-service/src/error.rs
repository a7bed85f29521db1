use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use common_auth::AuthError;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::config::ConfigError;

pub type SessionResult<T> = Result<T, SessionError>;

/// Failures of the persistence collaborator.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unique constraint violated on {0}")]
    Conflict(&'static str),
    #[error("storage backend failure: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(value: sqlx::Error) -> Self {
        match &value {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::Conflict(unique_target(db.constraint()))
            }
            _ => StoreError::Backend(value.to_string()),
        }
    }
}

fn unique_target(constraint: Option<&str>) -> &'static str {
    match constraint {
        Some(name) if name.contains("email") => "email",
        Some(name) if name.contains("token_hash") => "token_hash",
        _ => "unknown",
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),
    #[error("credential not presented")]
    MissingCredential,
    #[error("malformed token")]
    MalformedToken,
    #[error("token revoked")]
    RevokedToken,
    #[error("unknown session")]
    UnknownSession,
    #[error("session expired")]
    SessionExpired,
    #[error("account inactive")]
    AccountInactive,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("email already registered")]
    EmailTaken,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("internal error: {0}")]
    Internal(String),
}

impl SessionError {
    pub fn internal(err: impl std::fmt::Display) -> Self {
        SessionError::Internal(err.to_string())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            SessionError::Configuration(_) | SessionError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            SessionError::MissingCredential
            | SessionError::MalformedToken
            | SessionError::RevokedToken
            | SessionError::UnknownSession
            | SessionError::SessionExpired
            | SessionError::AccountInactive
            | SessionError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            SessionError::Validation(_) => StatusCode::BAD_REQUEST,
            SessionError::EmailTaken => StatusCode::CONFLICT,
            SessionError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            SessionError::Configuration(_) => "CONFIGURATION_ERROR",
            SessionError::MissingCredential => "MISSING_CREDENTIAL",
            SessionError::MalformedToken => "MALFORMED_TOKEN",
            SessionError::RevokedToken => "REVOKED_TOKEN",
            SessionError::UnknownSession => "UNKNOWN_SESSION",
            SessionError::SessionExpired => "SESSION_EXPIRED",
            SessionError::AccountInactive => "ACCOUNT_INACTIVE",
            SessionError::InvalidCredentials => "INVALID_CREDENTIALS",
            SessionError::Validation(_) => "VALIDATION_ERROR",
            SessionError::EmailTaken => "EMAIL_TAKEN",
            SessionError::NotFound(_) => "NOT_FOUND",
            SessionError::Internal(_) => "SERVER_ERROR",
        }
    }

    /// Category message only; no token, hash or backend detail leaves the service.
    fn public_message(&self) -> String {
        match self {
            SessionError::Configuration(_) | SessionError::Internal(_) => {
                "Internal server error.".to_string()
            }
            SessionError::MissingCredential => "Refresh token not provided.".to_string(),
            SessionError::MalformedToken => "Refresh token is invalid.".to_string(),
            SessionError::RevokedToken => "Refresh token has been revoked.".to_string(),
            SessionError::UnknownSession => "Session not found. Please sign in again.".to_string(),
            SessionError::SessionExpired => "Session expired. Please sign in again.".to_string(),
            SessionError::AccountInactive => "User account is inactive.".to_string(),
            SessionError::InvalidCredentials => "Invalid email or password.".to_string(),
            SessionError::Validation(message) => message.clone(),
            SessionError::EmailTaken => "Email is already registered.".to_string(),
            SessionError::NotFound(what) => format!("{what} not found."),
        }
    }
}

impl From<StoreError> for SessionError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Conflict("email") => SessionError::EmailTaken,
            other => SessionError::Internal(other.to_string()),
        }
    }
}

impl From<AuthError> for SessionError {
    fn from(_: AuthError) -> Self {
        SessionError::MalformedToken
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    code: &'static str,
    message: String,
}

impl IntoResponse for SessionError {
    fn into_response(self) -> Response {
        if matches!(
            self,
            SessionError::Internal(_) | SessionError::Configuration(_)
        ) {
            error!(error = %self, "request failed");
        }

        let status = self.status();
        let code = self.code();
        let body = ErrorResponse {
            code,
            message: self.public_message(),
        };
        let mut response = (status, Json(body)).into_response();
        response
            .headers_mut()
            .insert("X-Error-Code", HeaderValue::from_static(code));
        response
    }
}
