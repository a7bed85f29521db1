use std::env;
use std::time::Duration;

use common_auth::JwtConfig;
use thiserror::Error;

pub const MIN_SECRET_LENGTH: usize = 32;

const DEFAULT_ACCESS_TTL_SECONDS: i64 = 15 * 60;
const DEFAULT_REFRESH_TTL_SECONDS: i64 = 7 * 24 * 60 * 60;
const MAX_ACCESS_TTL_SECONDS: i64 = 24 * 60 * 60;
const MAX_REFRESH_TTL_SECONDS: i64 = 365 * 24 * 60 * 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("JWT_SECRET must be set")]
    MissingSecret,
    #[error("JWT_SECRET must be at least {min} bytes (got {actual})")]
    WeakSecret { min: usize, actual: usize },
    #[error("invalid value '{value}' for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CookieSameSite {
    Lax,
    Strict,
    None,
}

impl CookieSameSite {
    pub fn as_str(&self) -> &'static str {
        match self {
            CookieSameSite::Lax => "Lax",
            CookieSameSite::Strict => "Strict",
            CookieSameSite::None => "None",
        }
    }
}

#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub access_ttl_seconds: i64,
    pub refresh_ttl_seconds: i64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            access_ttl_seconds: DEFAULT_ACCESS_TTL_SECONDS,
            refresh_ttl_seconds: DEFAULT_REFRESH_TTL_SECONDS,
        }
    }
}

/// Argon2id cost parameters; fixed for the life of the process.
#[derive(Debug, Clone, Copy)]
pub struct PasswordConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            memory_kib: 65_536,
            iterations: 4,
            parallelism: 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CookieConfig {
    pub access_name: String,
    pub refresh_name: String,
    pub domain: Option<String>,
    pub secure: bool,
    pub same_site: CookieSameSite,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            access_name: "access_token".to_string(),
            refresh_name: "refresh_token".to_string(),
            domain: None,
            secure: false,
            same_site: CookieSameSite::Lax,
        }
    }
}

/// What the coordinator does with a session whose owner has been deactivated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InactiveSessionPolicy {
    /// Keep the record; it expires naturally or resumes after reactivation.
    Retain,
    Delete,
}

#[derive(Debug, Clone)]
pub struct SessionPolicy {
    pub revoke_on_logout: bool,
    pub inactive_sessions: InactiveSessionPolicy,
    pub sweep_interval: Duration,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            revoke_on_logout: true,
            inactive_sessions: InactiveSessionPolicy::Retain,
            sweep_interval: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt: JwtConfig,
    pub tokens: TokenConfig,
    pub password: PasswordConfig,
    pub cookies: CookieConfig,
    pub sessions: SessionPolicy,
}

impl AuthConfig {
    /// Defaults for everything except the signing material.
    pub fn with_jwt(jwt: JwtConfig) -> Self {
        Self {
            jwt,
            tokens: TokenConfig::default(),
            password: PasswordConfig::default(),
            cookies: CookieConfig::default(),
            sessions: SessionPolicy::default(),
        }
    }
}

pub fn validate_secret(jwt: &JwtConfig) -> Result<(), ConfigError> {
    if !jwt.has_secret() {
        return Err(ConfigError::MissingSecret);
    }
    if jwt.secret_len() < MIN_SECRET_LENGTH {
        return Err(ConfigError::WeakSecret {
            min: MIN_SECRET_LENGTH,
            actual: jwt.secret_len(),
        });
    }
    Ok(())
}

/// Access window at most a day, refresh window at most a year and longer than access.
pub fn validate_token_windows(tokens: &TokenConfig) -> Result<(), ConfigError> {
    if tokens.access_ttl_seconds > MAX_ACCESS_TTL_SECONDS {
        return Err(ConfigError::Invalid {
            key: "AUTH_ACCESS_TTL_SECONDS",
            value: tokens.access_ttl_seconds.to_string(),
            reason: format!("must not exceed {MAX_ACCESS_TTL_SECONDS} seconds"),
        });
    }
    if tokens.refresh_ttl_seconds > MAX_REFRESH_TTL_SECONDS {
        return Err(ConfigError::Invalid {
            key: "AUTH_REFRESH_TTL_SECONDS",
            value: tokens.refresh_ttl_seconds.to_string(),
            reason: format!("must not exceed {MAX_REFRESH_TTL_SECONDS} seconds"),
        });
    }
    if tokens.refresh_ttl_seconds <= tokens.access_ttl_seconds {
        return Err(ConfigError::Invalid {
            key: "AUTH_REFRESH_TTL_SECONDS",
            value: tokens.refresh_ttl_seconds.to_string(),
            reason: "refresh window must be longer than the access window".to_string(),
        });
    }
    Ok(())
}

pub fn load_auth_config() -> Result<AuthConfig, ConfigError> {
    let secret = env::var("JWT_SECRET").unwrap_or_default();
    let issuer = env::var("JWT_ISSUER").unwrap_or_else(|_| "marketplace-api".to_string());
    let audience = env::var("JWT_AUDIENCE").unwrap_or_else(|_| "marketplace-clients".to_string());
    let leeway = parse_from_env::<u32>("JWT_LEEWAY_SECONDS")?.unwrap_or(30);

    let jwt = JwtConfig::new(issuer, audience, secret).with_leeway(leeway);
    validate_secret(&jwt)?;

    let tokens = TokenConfig {
        access_ttl_seconds: positive_from_env("AUTH_ACCESS_TTL_SECONDS")?
            .unwrap_or(DEFAULT_ACCESS_TTL_SECONDS),
        refresh_ttl_seconds: positive_from_env("AUTH_REFRESH_TTL_SECONDS")?
            .unwrap_or(DEFAULT_REFRESH_TTL_SECONDS),
    };
    validate_token_windows(&tokens)?;

    let defaults = PasswordConfig::default();
    let password = PasswordConfig {
        memory_kib: parse_from_env("AUTH_ARGON2_MEMORY_KIB")?.unwrap_or(defaults.memory_kib),
        iterations: parse_from_env("AUTH_ARGON2_ITERATIONS")?.unwrap_or(defaults.iterations),
        parallelism: parse_from_env("AUTH_ARGON2_PARALLELISM")?.unwrap_or(defaults.parallelism),
    };

    let cookie_defaults = CookieConfig::default();
    let cookies = CookieConfig {
        access_name: env::var("AUTH_ACCESS_COOKIE_NAME")
            .ok()
            .and_then(|value| normalize_optional(&value))
            .unwrap_or(cookie_defaults.access_name),
        refresh_name: env::var("AUTH_REFRESH_COOKIE_NAME")
            .ok()
            .and_then(|value| normalize_optional(&value))
            .unwrap_or(cookie_defaults.refresh_name),
        domain: env::var("AUTH_COOKIE_DOMAIN")
            .ok()
            .and_then(|value| normalize_optional(&value)),
        secure: bool_from_env("AUTH_COOKIE_SECURE").unwrap_or(false),
        same_site: env::var("AUTH_COOKIE_SAMESITE")
            .ok()
            .map(|value| parse_same_site(&value))
            .transpose()?
            .unwrap_or(CookieSameSite::Lax),
    };
    if cookies.same_site == CookieSameSite::None && !cookies.secure {
        return Err(ConfigError::Invalid {
            key: "AUTH_COOKIE_SAMESITE",
            value: "None".to_string(),
            reason: "SameSite=None requires AUTH_COOKIE_SECURE=true".to_string(),
        });
    }

    let sessions = SessionPolicy {
        revoke_on_logout: bool_from_env("AUTH_REVOKE_ON_LOGOUT").unwrap_or(true),
        inactive_sessions: if bool_from_env("AUTH_DROP_SESSION_ON_INACTIVE").unwrap_or(false) {
            InactiveSessionPolicy::Delete
        } else {
            InactiveSessionPolicy::Retain
        },
        sweep_interval: Duration::from_secs(
            parse_from_env::<u64>("AUTH_SESSION_SWEEP_SECONDS")?
                .unwrap_or(300)
                .max(10),
        ),
    };

    Ok(AuthConfig {
        jwt,
        tokens,
        password,
        cookies,
        sessions,
    })
}

fn bool_from_env(key: &str) -> Option<bool> {
    env::var(key).ok().map(|value| {
        matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

fn parse_from_env<T>(key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => {
            raw.trim()
                .parse::<T>()
                .map(Some)
                .map_err(|err| ConfigError::Invalid {
                    key,
                    value: raw.clone(),
                    reason: err.to_string(),
                })
        }
        _ => Ok(None),
    }
}

fn positive_from_env(key: &'static str) -> Result<Option<i64>, ConfigError> {
    match parse_from_env::<i64>(key)? {
        Some(value) if value <= 0 => Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
            reason: "must be positive".to_string(),
        }),
        other => Ok(other),
    }
}

fn normalize_optional(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn parse_same_site(value: &str) -> Result<CookieSameSite, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "lax" => Ok(CookieSameSite::Lax),
        "strict" => Ok(CookieSameSite::Strict),
        "none" => Ok(CookieSameSite::None),
        _ => Err(ConfigError::Invalid {
            key: "AUTH_COOKIE_SAMESITE",
            value: value.to_string(),
            reason: "use Lax, Strict, or None".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_from_env_parses() {
        std::env::set_var("TEST_AUTH_BOOL_TRUE", "true");
        std::env::set_var("TEST_AUTH_BOOL_ONE", "1");
        std::env::set_var("TEST_AUTH_BOOL_FALSE", "no");
        assert_eq!(bool_from_env("TEST_AUTH_BOOL_TRUE"), Some(true));
        assert_eq!(bool_from_env("TEST_AUTH_BOOL_ONE"), Some(true));
        assert_eq!(bool_from_env("TEST_AUTH_BOOL_FALSE"), Some(false));
        assert_eq!(bool_from_env("TEST_AUTH_BOOL_UNSET"), None);
    }

    #[test]
    fn parse_from_env_reports_key() {
        std::env::set_var("TEST_AUTH_NUMBER", "fifteen");
        let err = parse_from_env::<i64>("TEST_AUTH_NUMBER").expect_err("not a number");
        assert!(err.to_string().contains("TEST_AUTH_NUMBER"));
    }

    #[test]
    fn missing_secret_is_fatal() {
        let err = validate_secret(&JwtConfig::new("i", "a", "")).expect_err("missing");
        assert!(matches!(err, ConfigError::MissingSecret));
    }

    #[test]
    fn short_secret_is_rejected() {
        let err = validate_secret(&JwtConfig::new("i", "a", "short")).expect_err("weak");
        assert!(matches!(err, ConfigError::WeakSecret { actual: 5, .. }));
        assert!(validate_secret(&JwtConfig::new("i", "a", "x".repeat(32))).is_ok());
    }

    #[test]
    fn oversized_token_windows_are_rejected() {
        let huge = TokenConfig {
            access_ttl_seconds: 100_000_000_000_000,
            refresh_ttl_seconds: 200_000_000_000_000,
        };
        let err = validate_token_windows(&huge).expect_err("access window too large");
        assert!(matches!(err, ConfigError::Invalid { key: "AUTH_ACCESS_TTL_SECONDS", .. }));

        let long_refresh = TokenConfig {
            access_ttl_seconds: 900,
            refresh_ttl_seconds: MAX_REFRESH_TTL_SECONDS + 1,
        };
        let err = validate_token_windows(&long_refresh).expect_err("refresh window too large");
        assert!(matches!(err, ConfigError::Invalid { key: "AUTH_REFRESH_TTL_SECONDS", .. }));

        let inverted = TokenConfig {
            access_ttl_seconds: 3600,
            refresh_ttl_seconds: 600,
        };
        assert!(validate_token_windows(&inverted).is_err());
        assert!(validate_token_windows(&TokenConfig::default()).is_ok());
    }

    #[test]
    fn same_site_parsing() {
        assert_eq!(parse_same_site("strict").unwrap(), CookieSameSite::Strict);
        assert!(parse_same_site("sometimes").is_err());
    }
}
