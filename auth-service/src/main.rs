use std::env;
use std::net::SocketAddr;

use anyhow::Context;
use axum::http::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    HeaderValue, Method,
};
use marketplace_auth::config::load_auth_config;
use marketplace_auth::metrics::AuthMetrics;
use marketplace_auth::{router, spawn_session_sweeper, AppState, Stores};
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_ORIGINS: &[&str] = &["http://localhost:3000", "http://localhost:5173"];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = load_auth_config().context("invalid auth configuration")?;

    let stores = match env::var("AUTH_STORAGE").ok().as_deref() {
        Some("memory") => {
            warn!("AUTH_STORAGE=memory: sessions and accounts are lost on restart");
            Stores::in_memory()
        }
        _ => {
            let database_url = env::var("DATABASE_URL")
                .context("DATABASE_URL must be set unless AUTH_STORAGE=memory")?;
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(&database_url)
                .await
                .context("failed to connect to Postgres")?;
            Stores::postgres(pool)
        }
    };

    let state = AppState::new(config, stores, AuthMetrics::new()?)?;
    spawn_session_sweeper(state.clone());

    let app = router(state).layer(cors_layer()?);

    let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8085);
    let ip: std::net::IpAddr = host.parse()?;
    let addr = SocketAddr::from((ip, port));

    info!(%addr, "starting marketplace-auth");
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn cors_layer() -> anyhow::Result<CorsLayer> {
    let origins = match env::var("AUTH_ALLOWED_ORIGINS") {
        Ok(raw) if !raw.trim().is_empty() => raw
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(HeaderValue::from_str)
            .collect::<Result<Vec<_>, _>>()
            .context("AUTH_ALLOWED_ORIGINS contains an invalid origin")?,
        _ => DEFAULT_ORIGINS
            .iter()
            .copied()
            .map(HeaderValue::from_static)
            .collect(),
    };

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([ACCEPT, CONTENT_TYPE, AUTHORIZATION])
        .allow_credentials(true))
}
