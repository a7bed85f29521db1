#![allow(dead_code)]

use std::{env, path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use common_auth::{JwtConfig, Role};
use dirs::cache_dir;
use marketplace_auth::accounts::{Account, AccountStore, NewAccount};
use marketplace_auth::config::{AuthConfig, PasswordConfig};
use marketplace_auth::metrics::AuthMetrics;
use marketplace_auth::password::CredentialVerifier;
use marketplace_auth::{AppState, Stores};
use pg_embed::pg_enums::PgAuthMethod;
use pg_embed::pg_fetch::{PgFetchSettings, PG_V13};
use pg_embed::postgres::{PgEmbed, PgSettings};
use portpicker::pick_unused_port;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tempfile::{tempdir, TempDir};

pub const TEST_SECRET: &str = "integration-test-secret-0123456789abcdef";
pub const TEST_PASSWORD: &str = "CorrectHorseBatteryStaple!";

/// Defaults plus a test secret and cheap Argon2 parameters.
pub fn test_config() -> AuthConfig {
    let mut config = AuthConfig::with_jwt(JwtConfig::new(
        "marketplace-api",
        "marketplace-clients",
        TEST_SECRET,
    ));
    config.password = PasswordConfig {
        memory_kib: 1024,
        iterations: 1,
        parallelism: 1,
    };
    config
}

/// Fully wired service state over the in-memory backend.
pub struct Harness {
    pub state: AppState,
    pub stores: Stores,
    credentials: CredentialVerifier,
}

impl Harness {
    pub fn new() -> Result<Self> {
        Self::with_config(test_config())
    }

    pub fn with_config(config: AuthConfig) -> Result<Self> {
        Self::with_stores(config, Stores::in_memory())
    }

    pub fn with_stores(config: AuthConfig, stores: Stores) -> Result<Self> {
        let credentials = CredentialVerifier::new(&config.password)?;
        let state = AppState::new(config, stores.clone(), AuthMetrics::new()?)?;
        Ok(Self {
            state,
            stores,
            credentials,
        })
    }

    pub async fn seed_account(&self, id: &str, email: &str, role: Role) -> Result<Account> {
        let password_hash = self.credentials.hash(TEST_PASSWORD)?;
        let account = self
            .stores
            .accounts
            .create(NewAccount {
                id: id.to_string(),
                email: email.to_string(),
                password_hash: Some(password_hash),
                name: Some("Test User".to_string()),
                display_name: None,
                role,
            })
            .await?;
        Ok(account)
    }
}

pub struct TestDatabase {
    pool: PgPool,
    embedded: Option<EmbeddedPg>,
}

impl TestDatabase {
    pub async fn setup() -> Result<Option<Self>> {
        if env::var("AUTH_TEST_DATABASE_URL").is_err() && !env_flag_enabled("AUTH_TEST_USE_EMBED") {
            eprintln!(
                "Skipping Postgres store tests: set AUTH_TEST_DATABASE_URL or AUTH_TEST_USE_EMBED=1 to run them.",
            );
            return Ok(None);
        }

        let mut embedded = None;
        let database_url = if let Ok(url) = env::var("AUTH_TEST_DATABASE_URL") {
            url
        } else {
            if env_flag_enabled("AUTH_TEST_EMBED_CLEAR_CACHE") {
                if let Some(cache_dir) = cache_dir() {
                    let _ = std::fs::remove_dir_all(cache_dir.join("pg-embed"));
                }
            }

            let temp = tempdir()?;
            let port = pick_unused_port()
                .context("failed to find available port for embedded Postgres")?;

            let mut fetch_settings = PgFetchSettings::default();
            fetch_settings.version = PG_V13;

            let mut pg = PgEmbed::new(
                PgSettings {
                    database_dir: temp.path().to_path_buf(),
                    port,
                    user: "postgres".to_string(),
                    password: "postgres".to_string(),
                    auth_method: PgAuthMethod::Plain,
                    persistent: false,
                    timeout: Some(Duration::from_secs(30)),
                    migration_dir: None,
                },
                fetch_settings,
            )
            .await?;

            pg.setup().await?;
            pg.start_db().await?;

            let uri = format!("{}/postgres", pg.db_uri);
            embedded = Some(EmbeddedPg {
                pg,
                _temp_dir: temp,
            });
            uri
        };

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(&database_url)
            .await?;

        if embedded.is_some() || env_flag_enabled("AUTH_TEST_APPLY_MIGRATIONS") {
            run_migrations(&pool).await?;
        }

        Ok(Some(Self { pool, embedded }))
    }

    pub fn pool_clone(&self) -> PgPool {
        self.pool.clone()
    }

    pub async fn teardown(self) -> Result<()> {
        if let Some(embedded) = self.embedded {
            embedded.shutdown().await;
        }
        Ok(())
    }
}

struct EmbeddedPg {
    pg: PgEmbed,
    _temp_dir: TempDir,
}

impl EmbeddedPg {
    async fn shutdown(mut self) {
        let _ = self.pg.stop_db().await;
    }
}

pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    let migrations_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("migrations");
    let mut entries = std::fs::read_dir(&migrations_dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()?;
    entries.sort();

    for path in entries {
        let sql = std::fs::read_to_string(&path)?;
        for statement in sql.split(';') {
            let trimmed = statement.trim();
            if trimmed.is_empty() {
                continue;
            }
            sqlx::query(trimmed).execute(pool).await?;
        }
    }

    Ok(())
}

/// Unique per run so repeated runs against a shared database do not collide.
pub fn unique_email(prefix: &str) -> String {
    format!("{prefix}+{}@shop.example", uuid::Uuid::new_v4().simple())
}

fn env_flag_enabled(key: &str) -> bool {
    matches!(env::var(key), Ok(value) if is_truthy(value.as_str()))
}

fn is_truthy(value: &str) -> bool {
    matches!(value, "1" | "true" | "TRUE" | "yes" | "YES" | "on" | "ON")
}
