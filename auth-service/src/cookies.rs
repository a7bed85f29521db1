use axum::http::header::SET_COOKIE;
use axum::http::{HeaderMap, HeaderValue};

use crate::config::CookieConfig;
use crate::error::{SessionError, SessionResult};
use crate::tokens::IssuedTokens;

/// `Set-Cookie` value for one credential. Always HttpOnly on path `/`.
pub fn credential_cookie(
    config: &CookieConfig,
    name: &str,
    value: &str,
    max_age_seconds: i64,
) -> String {
    let mut cookie = format!(
        "{name}={value}; HttpOnly; Path=/; SameSite={}; Max-Age={max_age_seconds}",
        config.same_site.as_str()
    );
    if config.secure {
        cookie.push_str("; Secure");
    }
    if let Some(domain) = &config.domain {
        cookie.push_str("; Domain=");
        cookie.push_str(domain);
    }
    cookie
}

pub fn expired_cookie(config: &CookieConfig, name: &str) -> String {
    credential_cookie(config, name, "", 0)
}

pub fn set_token_cookies(
    headers: &mut HeaderMap,
    config: &CookieConfig,
    tokens: &IssuedTokens,
) -> SessionResult<()> {
    append(
        headers,
        credential_cookie(
            config,
            &config.access_name,
            &tokens.access_token,
            tokens.access_expires_in,
        ),
    )?;
    append(
        headers,
        credential_cookie(
            config,
            &config.refresh_name,
            &tokens.refresh_token,
            tokens.refresh_expires_in,
        ),
    )
}

pub fn clear_token_cookies(headers: &mut HeaderMap, config: &CookieConfig) -> SessionResult<()> {
    append(headers, expired_cookie(config, &config.access_name))?;
    append(headers, expired_cookie(config, &config.refresh_name))
}

fn append(headers: &mut HeaderMap, cookie: String) -> SessionResult<()> {
    let value = HeaderValue::from_str(&cookie)
        .map_err(|err| SessionError::internal(format!("invalid cookie header: {err}")))?;
    headers.append(SET_COOKIE, value);
    Ok(())
}
