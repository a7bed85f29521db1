use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::SecondsFormat;
use common_auth::AuthContext;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::accounts::Account;
use crate::cookies::{clear_token_cookies, set_token_cookies};
use crate::error::{SessionError, SessionResult};
use crate::login::{PasswordChange, Registration};
use crate::refresh::SessionGrant;
use crate::session_handlers::session_metadata;
use crate::AppState;

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
    pub confirm_password: String,
}

#[derive(Deserialize)]
pub struct SetActiveRequest {
    pub active: bool,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub refresh_expires_in: i64,
    pub access_token_expires_at: String,
    pub refresh_token_expires_at: String,
    pub user: Account,
}

impl From<SessionGrant> for TokenResponse {
    fn from(grant: SessionGrant) -> Self {
        let SessionGrant { tokens, account } = grant;
        Self {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            token_type: tokens.token_type,
            expires_in: tokens.access_expires_in,
            refresh_expires_in: tokens.refresh_expires_in,
            access_token_expires_at: tokens
                .access_expires_at
                .to_rfc3339_opts(SecondsFormat::Secs, true),
            refresh_token_expires_at: tokens
                .refresh_expires_at
                .to_rfc3339_opts(SecondsFormat::Secs, true),
            user: account,
        }
    }
}

/// JSON body plus both credential cookies.
pub(crate) fn grant_response(
    state: &AppState,
    status: StatusCode,
    grant: SessionGrant,
) -> SessionResult<Response> {
    let mut headers = HeaderMap::new();
    set_token_cookies(&mut headers, &state.config.cookies, &grant.tokens)?;
    Ok((status, headers, Json(TokenResponse::from(grant))).into_response())
}

pub async fn register_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<RegisterRequest>,
) -> Result<Response, SessionError> {
    let registration = Registration {
        email: request.email,
        password: request.password,
        confirm_password: request.confirm_password,
        name: request.name,
        display_name: request.display_name,
    };

    let grant = state
        .authenticator
        .register(registration, session_metadata(&headers))
        .await?;
    grant_response(&state, StatusCode::CREATED, grant)
}

pub async fn login_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(login): Json<LoginRequest>,
) -> Result<Response, SessionError> {
    let LoginRequest { email, password } = login;

    let result = state
        .authenticator
        .login(&email, &password, session_metadata(&headers))
        .await;
    match &result {
        Ok(_) => state.metrics.login_attempt("success"),
        Err(err) => state.metrics.login_attempt(err.code()),
    }

    grant_response(&state, StatusCode::OK, result?)
}

pub async fn me(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<Account>, SessionError> {
    let account = state.authenticator.profile(auth.subject()).await?;
    Ok(Json(account))
}

/// Every session of the caller is dropped, so the cookies are cleared too.
pub async fn change_password(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(request): Json<ChangePasswordRequest>,
) -> Result<Response, SessionError> {
    let removed = state
        .authenticator
        .change_password(
            auth.subject(),
            PasswordChange {
                current_password: request.current_password,
                new_password: request.new_password,
                confirm_password: request.confirm_password,
            },
        )
        .await?;

    let mut headers = HeaderMap::new();
    clear_token_cookies(&mut headers, &state.config.cookies)?;
    let body = json!({
        "message": "Password changed. Please sign in again.",
        "sessions_removed": removed,
    });
    Ok((StatusCode::OK, headers, Json(body)).into_response())
}

pub async fn set_user_active(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(user_id): Path<String>,
    Json(request): Json<SetActiveRequest>,
) -> Result<Json<Account>, SessionError> {
    let account = state
        .authenticator
        .set_active(&user_id, request.active)
        .await?;
    info!(
        actor = auth.subject(),
        user_id = %account.id,
        active = account.is_active,
        "account activation updated by admin"
    );
    Ok(Json(account))
}
