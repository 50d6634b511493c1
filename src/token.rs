//! Session token issuance and verification.
//!
//! Tokens are HS256 JWTs carrying the account id and email. They carry no
//! expiry claim; a session stays valid until the signing secret rotates.

use crate::error::{AccountError, Result};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Claims carried by a session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Account id, stringified.
    pub sub: String,
    /// Account email at issuance time.
    pub email: String,
    /// Intended audience, when the issuer is configured with one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
}

impl SessionClaims {
    /// Parse the subject back into an account id.
    pub fn account_id(&self) -> Result<i32> {
        self.sub
            .parse()
            .map_err(|_| AccountError::InvalidToken)
    }
}

/// Issues and verifies HS256 session tokens with a shared secret.
#[derive(Clone)]
pub struct SessionTokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    audience: Option<String>,
}

impl SessionTokenIssuer {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Tokens are issued without exp and stay valid indefinitely.
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            audience: None,
        }
    }

    /// Set the audience claim stamped on issued tokens and required on
    /// verification.
    #[must_use]
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        let audience = audience.into();
        self.validation.set_audience(&[audience.clone()]);
        self.validation.validate_aud = true;
        self.audience = Some(audience);
        self
    }

    /// Sign a token for an account.
    pub fn issue(&self, account_id: i32, email: &str) -> Result<String> {
        let claims = SessionClaims {
            sub: account_id.to_string(),
            email: email.to_string(),
            aud: self.audience.clone(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AccountError::internal(format!("token signing failed: {}", e)))
    }

    /// Verify a token and return its claims.
    ///
    /// Fails with `InvalidToken` on a bad signature, malformed structure,
    /// wrong algorithm or audience mismatch.
    pub fn verify(&self, token: &str) -> Result<SessionClaims> {
        decode::<SessionClaims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(target: "accounts.token.rejected", error = %e, "token rejected");
                AccountError::InvalidToken
            })
    }
}
