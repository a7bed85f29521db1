use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand_core::OsRng;

use crate::config::{ConfigError, PasswordConfig};
use crate::error::{SessionError, SessionResult};

/// Argon2id hashing and verification with process-wide cost parameters.
#[derive(Clone)]
pub struct CredentialVerifier {
    argon2: Argon2<'static>,
    dummy_hash: String,
}

impl CredentialVerifier {
    pub fn new(config: &PasswordConfig) -> Result<Self, ConfigError> {
        let params = Params::new(
            config.memory_kib,
            config.iterations,
            config.parallelism,
            None,
        )
        .map_err(|err| ConfigError::Invalid {
            key: "AUTH_ARGON2_MEMORY_KIB",
            value: format!(
                "m={} t={} p={}",
                config.memory_kib, config.iterations, config.parallelism
            ),
            reason: err.to_string(),
        })?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        // Compared against when the account is unknown so both paths cost one hash.
        let salt = SaltString::generate(&mut OsRng);
        let dummy_hash = argon2
            .hash_password(b"placeholder-credential", &salt)
            .map_err(|err| ConfigError::Invalid {
                key: "AUTH_ARGON2_MEMORY_KIB",
                value: config.memory_kib.to_string(),
                reason: err.to_string(),
            })?
            .to_string();

        Ok(Self { argon2, dummy_hash })
    }

    pub fn hash(&self, password: &str) -> SessionResult<String> {
        if password.trim().is_empty() {
            return Err(SessionError::Validation(
                "Password must not be empty".to_string(),
            ));
        }

        let salt = SaltString::generate(&mut OsRng);
        self.argon2
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|err| SessionError::Internal(format!("Failed to hash password: {err}")))
    }

    pub fn verify(&self, password: &str, stored_hash: &str) -> bool {
        match PasswordHash::new(stored_hash) {
            Ok(parsed) => self
                .argon2
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => false,
        }
    }

    /// `stored_hash` is `None` for unknown accounts and password-less (OAuth) accounts.
    pub fn verify_or_dummy(&self, password: &str, stored_hash: Option<&str>) -> bool {
        match stored_hash {
            Some(hash) => self.verify(password, hash),
            None => {
                let _ = self.verify(password, &self.dummy_hash);
                false
            }
        }
    }
}
