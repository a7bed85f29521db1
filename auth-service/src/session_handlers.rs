use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header::USER_AGENT, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use common_auth::{ensure_can_manage, read_cookie, AuthContext, GuardError, ResourceOwnership};
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::cookies::clear_token_cookies;
use crate::error::SessionError;
use crate::sessions::{SessionMetadata, SessionSummary};
use crate::user_handlers::grant_response;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct RefreshRequest {
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[derive(Deserialize)]
pub struct RevokeRequest {
    pub refresh_token: String,
}

/// Admins may act on another subject's sessions via `?user_id=`.
#[derive(Debug, Default, Deserialize)]
pub struct SessionScope {
    #[serde(default)]
    pub user_id: Option<String>,
}

fn header_text<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

pub(crate) fn session_metadata(headers: &HeaderMap) -> SessionMetadata {
    let ip_address = header_text(headers, "x-forwarded-for")
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .or_else(|| header_text(headers, "x-real-ip"))
        .map(str::to_string);

    SessionMetadata {
        user_agent: headers
            .get(USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.chars().take(512).collect()),
        ip_address,
    }
}

/// Refresh cookie first, then a JSON body `{"refresh_token": ...}`.
fn presented_refresh_token(state: &AppState, headers: &HeaderMap, body: &Bytes) -> Option<String> {
    read_cookie(headers, &state.config.cookies.refresh_name).or_else(|| {
        if body.is_empty() {
            return None;
        }
        serde_json::from_slice::<RefreshRequest>(body)
            .ok()
            .and_then(|request| request.refresh_token)
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty())
    })
}

fn resolve_scope(auth: &AuthContext, scope: SessionScope) -> Result<String, GuardError> {
    match scope.user_id {
        Some(user_id) if user_id != auth.subject() => {
            ensure_can_manage(auth, &ResourceOwnership::owned_by(user_id.clone()))?;
            Ok(user_id)
        }
        _ => Ok(auth.subject().to_string()),
    }
}

fn with_cleared_cookies(state: &AppState, mut response: Response) -> Response {
    if let Err(err) = clear_token_cookies(response.headers_mut(), &state.config.cookies) {
        return err.into_response();
    }
    response
}

/// Any rejection also clears the credential cookies so the client falls
/// back to a fresh login.
pub async fn refresh_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(token) = presented_refresh_token(&state, &headers, &body) else {
        state.metrics.refresh_attempt(SessionError::MissingCredential.code());
        return with_cleared_cookies(&state, SessionError::MissingCredential.into_response());
    };

    let result = state
        .coordinator
        .refresh(&token, session_metadata(&headers))
        .await;

    match result {
        Ok(grant) => {
            state.metrics.refresh_attempt("success");
            grant_response(&state, StatusCode::OK, grant)
                .unwrap_or_else(|err| err.into_response())
        }
        Err(err) => {
            state.metrics.refresh_attempt(err.code());
            with_cleared_cookies(&state, err.into_response())
        }
    }
}

/// Requires the refresh credential being signed out.
pub async fn logout(
    State(state): State<AppState>,
    auth: AuthContext,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, SessionError> {
    let Some(token) = presented_refresh_token(&state, &headers, &body) else {
        return Ok(with_cleared_cookies(
            &state,
            SessionError::MissingCredential.into_response(),
        ));
    };
    let session_removed = state
        .coordinator
        .logout(auth.subject(), &token)
        .await?
        .session_removed;
    state.metrics.logout("current");

    let response = Json(json!({
        "message": "Logged out.",
        "session_removed": session_removed,
    }))
    .into_response();
    Ok(with_cleared_cookies(&state, response))
}

pub async fn logout_all(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Response, SessionError> {
    let removed = state.coordinator.logout_all(auth.subject()).await?;
    state.metrics.logout("all");

    let response = Json(json!({
        "message": "Logged out from all sessions.",
        "sessions_removed": removed,
    }))
    .into_response();
    Ok(with_cleared_cookies(&state, response))
}

pub async fn list_sessions(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(scope): Query<SessionScope>,
) -> Result<Json<Vec<SessionSummary>>, Response> {
    let user_id = resolve_scope(&auth, scope).map_err(IntoResponse::into_response)?;
    let sessions = state
        .coordinator
        .list_sessions(&user_id)
        .await
        .map_err(IntoResponse::into_response)?;
    Ok(Json(sessions))
}

pub async fn revoke_session(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(session_id): Path<Uuid>,
    Query(scope): Query<SessionScope>,
) -> Result<StatusCode, Response> {
    let user_id = resolve_scope(&auth, scope).map_err(IntoResponse::into_response)?;
    state
        .coordinator
        .revoke_session(&user_id, session_id)
        .await
        .map_err(IntoResponse::into_response)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn revoke_token(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(request): Json<RevokeRequest>,
) -> Result<Json<serde_json::Value>, SessionError> {
    let token = request.refresh_token.trim();
    if token.is_empty() {
        return Err(SessionError::Validation(
            "refresh_token is required.".to_string(),
        ));
    }

    let session_removed = state.coordinator.revoke(token, auth.subject()).await?;
    info!(actor = auth.subject(), session_removed, "admin revoked refresh credential");
    Ok(Json(json!({
        "revoked": true,
        "session_removed": session_removed,
    })))
}
