use std::sync::Arc;

use axum::extract::{FromRef, Request, State};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::Router;
use chrono::Utc;
use common_auth::{require_roles, JwtVerifier, Role, RoleRequirement};
use sqlx::PgPool;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::accounts::{AccountStore, PgAccountStore};
use crate::config::AuthConfig;
use crate::error::{SessionError, SessionResult};
use crate::login::Authenticator;
use crate::memory::{InMemoryAccountStore, InMemoryRevocationLedger, InMemorySessionStore};
use crate::metrics::AuthMetrics;
use crate::password::CredentialVerifier;
use crate::refresh::RefreshCoordinator;
use crate::revocation::{PgRevocationLedger, RevocationLedger};
use crate::session_handlers::{
    list_sessions, logout, logout_all, refresh_session, revoke_session, revoke_token,
};
use crate::sessions::{PgSessionStore, SessionStore};
use crate::tokens::TokenIssuer;
use crate::user_handlers::{change_password, login_user, me, register_user, set_user_active};

/// Persistence collaborators shared by every component.
#[derive(Clone)]
pub struct Stores {
    pub sessions: Arc<dyn SessionStore>,
    pub ledger: Arc<dyn RevocationLedger>,
    pub accounts: Arc<dyn AccountStore>,
}

impl Stores {
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            sessions: Arc::new(PgSessionStore::new(pool.clone())),
            ledger: Arc::new(PgRevocationLedger::new(pool.clone())),
            accounts: Arc::new(PgAccountStore::new(pool)),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            sessions: Arc::new(InMemorySessionStore::new()),
            ledger: Arc::new(InMemoryRevocationLedger::new()),
            accounts: Arc::new(InMemoryAccountStore::new()),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub jwt_verifier: Arc<JwtVerifier>,
    pub coordinator: Arc<RefreshCoordinator>,
    pub authenticator: Arc<Authenticator>,
    pub config: Arc<AuthConfig>,
    pub metrics: Arc<AuthMetrics>,
}

impl FromRef<AppState> for Arc<JwtVerifier> {
    fn from_ref(state: &AppState) -> Self {
        state.jwt_verifier.clone()
    }
}

impl FromRef<AppState> for Arc<AuthConfig> {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

impl FromRef<AppState> for Arc<AuthMetrics> {
    fn from_ref(state: &AppState) -> Self {
        state.metrics.clone()
    }
}

impl AppState {
    /// Wires the issuer, coordinator, guard and account flows from one
    /// configuration value.
    pub fn new(config: AuthConfig, stores: Stores, metrics: AuthMetrics) -> SessionResult<Self> {
        let verifier = Arc::new(
            JwtVerifier::new(config.jwt.clone()).with_access_cookie(config.cookies.access_name.clone()),
        );
        let issuer = Arc::new(TokenIssuer::new(
            &config.jwt,
            config.tokens.clone(),
            stores.sessions.clone(),
        )?);
        let credentials = Arc::new(CredentialVerifier::new(&config.password)?);

        let coordinator = Arc::new(RefreshCoordinator::new(
            issuer.clone(),
            verifier.clone(),
            stores.sessions.clone(),
            stores.ledger.clone(),
            stores.accounts.clone(),
            config.sessions.clone(),
        ));
        let authenticator = Arc::new(Authenticator::new(
            stores.accounts,
            stores.sessions,
            credentials,
            issuer,
        ));

        Ok(Self {
            jwt_verifier: verifier,
            coordinator,
            authenticator,
            config: Arc::new(config),
            metrics: Arc::new(metrics),
        })
    }
}

async fn health() -> &'static str {
    "ok"
}

async fn metrics_endpoint(State(metrics): State<Arc<AuthMetrics>>) -> Response {
    match metrics.render() {
        Ok(response) => response,
        Err(err) => SessionError::internal(err).into_response(),
    }
}

async fn error_metrics_mw(
    State(metrics): State<Arc<AuthMetrics>>,
    req: Request,
    next: Next,
) -> Response {
    let resp = next.run(req).await;
    let status = resp.status();
    if status.as_u16() >= 400 {
        let code = resp
            .headers()
            .get("x-error-code")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown");
        metrics.http_error(code, status);
    }
    resp
}

/// All routes except CORS, which the binary layers on from its own settings.
pub fn router(state: AppState) -> Router {
    let admin = RoleRequirement::new(state.jwt_verifier.clone(), &[Role::Admin]);

    let admin_routes = Router::new()
        .route("/admin/users/:user_id/active", put(set_user_active))
        .route("/admin/tokens/revoke", post(revoke_token))
        .route_layer(middleware::from_fn_with_state(admin, require_roles));

    Router::new()
        .route("/healthz", get(health))
        .route("/metrics", get(metrics_endpoint))
        .route("/auth/register", post(register_user))
        .route("/auth/login", post(login_user))
        .route("/auth/refresh", post(refresh_session))
        .route("/auth/logout", post(logout))
        .route("/auth/logout/all", post(logout_all))
        .route("/auth/password/change", post(change_password))
        .route("/auth/me", get(me))
        .route("/auth/sessions", get(list_sessions))
        .route("/auth/sessions/:session_id", delete(revoke_session))
        .merge(admin_routes)
        .layer(middleware::from_fn_with_state(
            state.metrics.clone(),
            error_metrics_mw,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Periodically deletes expired session records.
pub fn spawn_session_sweeper(state: AppState) -> JoinHandle<()> {
    tokio::spawn(async move {
        let sweep_interval = state.config.sessions.sweep_interval;
        loop {
            tokio::time::sleep(sweep_interval).await;
            let start = std::time::Instant::now();
            match state.coordinator.purge_expired(Utc::now()).await {
                Ok(0) => {}
                Ok(removed) => {
                    state.metrics.sessions_swept(removed);
                    info!(
                        removed,
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "expired sessions swept"
                    );
                }
                Err(err) => error!(error = %err, "Session sweeper error"),
            }
        }
    })
}
