use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::claims::TokenKind;

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("no credential presented")]
    MissingCredential,
    #[error("authorization header malformed")]
    InvalidAuthorization,
    #[error("token expired")]
    Expired,
    #[error("token verification failed: {0}")]
    Verification(String),
    #[error("expected {expected:?} token, found {found:?}")]
    WrongTokenKind {
        expected: TokenKind,
        found: TokenKind,
    },
    #[error("invalid claim '{0}' with value '{1}'")]
    InvalidClaim(&'static str, String),
    #[error("malformed claim payload: {0}")]
    InvalidJson(String),
}

impl AuthError {
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::MissingCredential => "AUTH_MISSING",
            AuthError::InvalidAuthorization => "AUTH_HEADER",
            AuthError::Expired => "AUTH_EXPIRED",
            AuthError::Verification(_) | AuthError::WrongTokenKind { .. } => "AUTH_TOKEN",
            AuthError::InvalidClaim(_, _) | AuthError::InvalidJson(_) => "AUTH_CLAIMS",
        }
    }

    /// Client-facing message; verification detail stays in logs.
    pub fn public_message(&self) -> &'static str {
        match self {
            AuthError::MissingCredential => "Authentication required.",
            AuthError::InvalidAuthorization => "Authorization header is malformed.",
            AuthError::Expired => "Access token expired.",
            _ => "Invalid access token.",
        }
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(value: jsonwebtoken::errors::Error) -> Self {
        match value.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => Self::Expired,
            _ => Self::Verification(value.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ErrorBody {
    pub(crate) code: &'static str,
    pub(crate) message: String,
}

pub(crate) fn error_response(status: StatusCode, code: &'static str, message: String) -> Response {
    let mut response = (status, Json(ErrorBody { code, message })).into_response();
    response
        .headers_mut()
        .insert("X-Error-Code", HeaderValue::from_static(code));
    response
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        tracing::debug!(error = %self, "access credential rejected");
        error_response(
            StatusCode::UNAUTHORIZED,
            self.code(),
            self.public_message().to_string(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_hides_verification_detail() {
        let response = AuthError::Verification("InvalidSignature".into()).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers().get("X-Error-Code").unwrap(), "AUTH_TOKEN");
    }
}
