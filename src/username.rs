//! Username allocation.
//!
//! Registration derives a default handle from the e-mail local part and
//! resolves collisions with numeric suffixes.

use crate::error::{AccountError, Result};
use crate::store::AccountStore;

/// Maximum username length, matching the column width.
pub const MAX_USERNAME_LEN: usize = 12;

/// Whether `username` is a caller-acceptable handle: 1 to 12 ASCII
/// alphanumeric characters.
pub fn is_valid_username(username: &str) -> bool {
    !username.is_empty()
        && username.len() <= MAX_USERNAME_LEN
        && username.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Derive a base handle from an e-mail local part: keep ASCII alphanumerics,
/// fall back to "user" when nothing survives, cap at [`MAX_USERNAME_LEN`].
pub fn sanitize_handle(local_part: &str) -> String {
    let mut base: String = local_part
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();
    if base.is_empty() {
        base = "user".to_string();
    }
    base.truncate(MAX_USERNAME_LEN);
    base
}

/// Allocates a free handle by probing the store.
#[derive(Debug, Clone)]
pub struct UsernameAllocator {
    /// Candidates tried before giving up.
    max_candidates: usize,
}

impl Default for UsernameAllocator {
    fn default() -> Self {
        Self { max_candidates: 100 }
    }
}

impl UsernameAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn max_candidates(mut self, max: usize) -> Self {
        self.max_candidates = max;
        self
    }

    /// Allocate a free handle for `email`. The base comes from the local
    /// part; collisions get suffixes 1, 2, 3, … with the base re-truncated
    /// so the whole handle stays within [`MAX_USERNAME_LEN`]. Fails
    /// `Internal` once the candidate budget is spent.
    pub async fn allocate<S: AccountStore + ?Sized>(&self, store: &S, email: &str) -> Result<String> {
        let local_part = email.split('@').next().unwrap_or("");
        let base = sanitize_handle(local_part);

        if !store.is_username_taken(&base, None).await? {
            return Ok(base);
        }

        for n in 1..self.max_candidates {
            let suffix = n.to_string();
            let keep = MAX_USERNAME_LEN.saturating_sub(suffix.len());
            let candidate = format!("{}{}", &base[..base.len().min(keep)], suffix);

            if !store.is_username_taken(&candidate, None).await? {
                return Ok(candidate);
            }
        }

        tracing::error!(
            target: "accounts.username.exhausted",
            base = %base,
            tried = self.max_candidates,
            "username candidate budget exhausted"
        );
        Err(AccountError::internal("could not allocate a free username"))
    }
}
