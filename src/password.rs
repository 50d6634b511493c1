//! Password hashing and strength policy.
//!
//! Uses Argon2id for hashing. The policy here is the one enforced when a
//! password is chosen through the reset flow.

use crate::error::{AccountError, Result};
use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, PasswordHasher as _, Version};

/// Argon2id cost configuration.
#[derive(Debug, Clone)]
pub struct PasswordConfig {
    /// Memory cost in KiB.
    pub memory_cost: u32,
    /// Number of iterations.
    pub time_cost: u32,
    /// Degree of parallelism.
    pub parallelism: u32,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        // OWASP recommended minimums for Argon2id
        Self {
            memory_cost: 19 * 1024,
            time_cost: 2,
            parallelism: 1,
        }
    }
}

impl PasswordConfig {
    /// Low-cost profile for tests. Not available in release builds.
    #[cfg(any(test, debug_assertions))]
    pub fn fast() -> Self {
        Self {
            memory_cost: 8,
            time_cost: 1,
            parallelism: 1,
        }
    }
}

/// Hashes and verifies passwords with Argon2id.
///
/// Every hash gets a fresh random salt, so hashing the same password twice
/// yields different strings.
#[derive(Clone)]
pub struct CredentialHasher {
    config: PasswordConfig,
}

impl CredentialHasher {
    pub fn new(config: PasswordConfig) -> Self {
        Self { config }
    }

    fn argon2(&self) -> Result<Argon2<'static>> {
        let params = Params::new(
            self.config.memory_cost,
            self.config.time_cost,
            self.config.parallelism,
            None,
        )
        .map_err(|e| AccountError::internal(format!("invalid argon2 params: {}", e)))?;

        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }

    /// Hash a plaintext password into a PHC string.
    pub fn hash(&self, password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()?
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AccountError::internal(format!("password hashing failed: {}", e)))?;
        Ok(hash.to_string())
    }

    /// Check a plaintext password against a stored PHC string.
    ///
    /// A stored hash that does not parse counts as a mismatch, not an error.
    /// Callers only need yes/no and a corrupt hash must read as a wrong
    /// password rather than a server failure.
    pub fn verify(&self, password: &str, stored_hash: &str) -> Result<bool> {
        let parsed = match PasswordHash::new(stored_hash) {
            Ok(p) => p,
            Err(_) => {
                tracing::warn!(target: "accounts.password", "stored hash failed to parse");
                return Ok(false);
            }
        };

        Ok(self
            .argon2()?
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    }
}

impl Default for CredentialHasher {
    fn default() -> Self {
        Self::new(PasswordConfig::default())
    }
}

/// Minimum length for a password chosen through the reset flow.
pub const MIN_PASSWORD_LEN: usize = 6;

/// Strength rule applied to reset passwords: at least [`MIN_PASSWORD_LEN`]
/// characters, at least one letter and at least one digit.
pub fn check_password_strength(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AccountError::weak_password(format!(
            "must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    if !password.chars().any(|c| c.is_alphabetic()) {
        return Err(AccountError::weak_password("must contain a letter"));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(AccountError::weak_password("must contain a digit"));
    }
    Ok(())
}
