//! Account storage.
//!
//! The traits here define the storage interface for the account lifecycle.
//! Two adapters ship with the crate: [`PgAccountStore`] for Postgres and
//! [`InMemoryAccountStore`] for tests and local development.

pub mod memory;
pub mod postgres;

pub use memory::InMemoryAccountStore;
pub use postgres::PgAccountStore;

use crate::error::{AccountError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The fixed set of profile avatars. One is picked at random on
/// registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Avatar {
    Bee,
    Beer,
    Deer,
    Fox,
    Monkey,
    Owl,
    Panda,
    Penguin,
    RoeDeer,
}

impl Avatar {
    pub const ALL: [Avatar; 9] = [
        Avatar::Bee,
        Avatar::Beer,
        Avatar::Deer,
        Avatar::Fox,
        Avatar::Monkey,
        Avatar::Owl,
        Avatar::Panda,
        Avatar::Penguin,
        Avatar::RoeDeer,
    ];

    /// Pick a random avatar.
    pub fn random() -> Self {
        Self::ALL[fastrand::usize(..Self::ALL.len())]
    }

    /// Storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Avatar::Bee => "bee",
            Avatar::Beer => "beer",
            Avatar::Deer => "deer",
            Avatar::Fox => "fox",
            Avatar::Monkey => "monkey",
            Avatar::Owl => "owl",
            Avatar::Panda => "panda",
            Avatar::Penguin => "penguin",
            Avatar::RoeDeer => "roe_deer",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| AccountError::internal(format!("unknown avatar '{}'", s)))
    }
}

/// A stored account row.
#[derive(Debug, Clone)]
pub struct Account {
    pub id: i32,
    /// Stored lowercase; globally unique.
    pub email: String,
    /// Argon2id PHC string.
    pub password_hash: String,
    /// Allocated at registration; unique while non-empty.
    pub username: String,
    pub avatar: Avatar,
    pub is_verified: bool,
    /// Present only while the account is unverified.
    pub verification_code: Option<String>,
    /// Present only while a reset flow is open.
    pub reset_token: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Public projection of an account. Never carries the password hash or any
/// open code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountProfile {
    pub id: i32,
    pub email: String,
    pub username: String,
    pub avatar: Avatar,
    pub is_verified: bool,
}

impl From<&Account> for AccountProfile {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id,
            email: account.email.clone(),
            username: account.username.clone(),
            avatar: account.avatar,
            is_verified: account.is_verified,
        }
    }
}

/// The row inserted inside a registration transaction.
#[derive(Debug, Clone, Copy)]
pub struct PendingAccount<'a> {
    pub email: &'a str,
    pub password_hash: &'a str,
    pub username: &'a str,
    pub verification_code: &'a str,
    pub avatar: Avatar,
}

/// An open registration transaction.
///
/// The inserted row is invisible to other callers until `commit`. Dropping
/// the transaction without committing rolls it back.
#[async_trait]
pub trait RegistrationTx: Send {
    /// Insert the pending account and return it with its assigned id.
    async fn insert_pending_account(&mut self, pending: PendingAccount<'_>) -> Result<Account>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Storage capabilities needed by the account lifecycle.
///
/// Mutating single-statement operations return the number of affected rows
/// so callers can detect lost races on one-shot codes.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>>;

    async fn find_by_id(&self, id: i32) -> Result<Option<Account>>;

    async fn find_by_verification_code(&self, code: &str) -> Result<Option<Account>>;

    async fn find_by_reset_token(&self, token: &str) -> Result<Option<Account>>;

    /// Whether `username` is held by an account other than `excluding_id`.
    async fn is_username_taken(&self, username: &str, excluding_id: Option<i32>) -> Result<bool>;

    /// Open a transaction for the insert-then-mail registration sequence.
    async fn begin_registration(&self) -> Result<Box<dyn RegistrationTx + '_>>;

    /// Atomically clear the verification code and mark the holder verified.
    async fn mark_verified(&self, code: &str) -> Result<u64>;

    async fn set_reset_token(&self, account_id: i32, token: &str) -> Result<u64>;

    /// Atomically set the new password hash and clear the reset token on the
    /// row holding `token`.
    async fn reset_password(&self, token: &str, password_hash: &str) -> Result<u64>;

    /// Update the username and return the fresh profile, or `None` when the
    /// account no longer exists.
    async fn update_username(&self, account_id: i32, username: &str)
        -> Result<Option<AccountProfile>>;
}
