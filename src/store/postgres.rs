//! Postgres account store on sqlx.
//!
//! Expected schema:
//!
//! ```sql
//! CREATE TABLE accounts (
//!     id                SERIAL PRIMARY KEY,
//!     email             VARCHAR(255) NOT NULL UNIQUE,
//!     password_hash     VARCHAR(255) NOT NULL,
//!     username          VARCHAR(12) NOT NULL DEFAULT '',
//!     avatar            VARCHAR(50) NOT NULL,
//!     is_verified       BOOLEAN NOT NULL DEFAULT FALSE,
//!     verification_code VARCHAR(64),
//!     reset_token       VARCHAR(64),
//!     created_at        TIMESTAMPTZ NOT NULL DEFAULT now()
//! );
//! CREATE UNIQUE INDEX accounts_username_key ON accounts (username) WHERE username <> '';
//! ```

use super::{Account, AccountProfile, AccountStore, Avatar, PendingAccount, RegistrationTx};
use crate::error::{AccountError, Result};
use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};

const ACCOUNT_COLUMNS: &str =
    "id, email, password_hash, username, avatar, is_verified, verification_code, reset_token, created_at";

/// [`AccountStore`] backed by a Postgres pool.
#[derive(Clone)]
pub struct PgAccountStore {
    pool: PgPool,
}

impl PgAccountStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn account_from_row(row: &PgRow) -> Result<Account> {
    let avatar: String = row.try_get("avatar")?;
    Ok(Account {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        username: row.try_get("username")?,
        avatar: Avatar::parse(&avatar)?,
        is_verified: row.try_get("is_verified")?,
        verification_code: row.try_get("verification_code")?,
        reset_token: row.try_get("reset_token")?,
        created_at: row.try_get("created_at")?,
    })
}

fn profile_from_row(row: &PgRow) -> Result<AccountProfile> {
    let avatar: String = row.try_get("avatar")?;
    Ok(AccountProfile {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        username: row.try_get("username")?,
        avatar: Avatar::parse(&avatar)?,
        is_verified: row.try_get("is_verified")?,
    })
}

async fn fetch_account_where(pool: &PgPool, clause: &str, value: &str) -> Result<Option<Account>> {
    let query = format!("SELECT {} FROM accounts WHERE {}", ACCOUNT_COLUMNS, clause);
    let row = sqlx::query(&query).bind(value).fetch_optional(pool).await?;
    row.as_ref().map(account_from_row).transpose()
}

struct PgRegistrationTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl RegistrationTx for PgRegistrationTx {
    async fn insert_pending_account(&mut self, pending: PendingAccount<'_>) -> Result<Account> {
        let query = format!(
            "INSERT INTO accounts (email, password_hash, username, avatar, verification_code) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {}",
            ACCOUNT_COLUMNS
        );

        let row = sqlx::query(&query)
            .bind(pending.email)
            .bind(pending.password_hash)
            .bind(pending.username)
            .bind(pending.avatar.as_str())
            .bind(pending.verification_code)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| match e.as_database_error() {
                // Only the email constraint means EmailTaken. A race on the
                // username index is an allocator failure, not the caller's.
                Some(db) if db.is_unique_violation() => {
                    if db.constraint() == Some("accounts_email_key") {
                        AccountError::EmailTaken
                    } else {
                        AccountError::internal(format!(
                            "unique constraint violated: {}",
                            db.message()
                        ))
                    }
                }
                _ => AccountError::from(e),
            })?;

        account_from_row(&row)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

#[async_trait]
impl AccountStore for PgAccountStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>> {
        fetch_account_where(&self.pool, "email = $1", email).await
    }

    async fn find_by_id(&self, id: i32) -> Result<Option<Account>> {
        let query = format!("SELECT {} FROM accounts WHERE id = $1", ACCOUNT_COLUMNS);
        let row = sqlx::query(&query).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(account_from_row).transpose()
    }

    async fn find_by_verification_code(&self, code: &str) -> Result<Option<Account>> {
        fetch_account_where(&self.pool, "verification_code = $1", code).await
    }

    async fn find_by_reset_token(&self, token: &str) -> Result<Option<Account>> {
        fetch_account_where(&self.pool, "reset_token = $1", token).await
    }

    async fn is_username_taken(&self, username: &str, excluding_id: Option<i32>) -> Result<bool> {
        if username.is_empty() {
            return Ok(false);
        }
        let taken: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM accounts WHERE username = $1 AND ($2::INT4 IS NULL OR id <> $2))",
        )
        .bind(username)
        .bind(excluding_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(taken)
    }

    async fn begin_registration(&self) -> Result<Box<dyn RegistrationTx + '_>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgRegistrationTx { tx }))
    }

    async fn mark_verified(&self, code: &str) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE accounts SET is_verified = TRUE, verification_code = NULL \
             WHERE verification_code = $1",
        )
        .bind(code)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn set_reset_token(&self, account_id: i32, token: &str) -> Result<u64> {
        let result = sqlx::query("UPDATE accounts SET reset_token = $2 WHERE id = $1")
            .bind(account_id)
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn reset_password(&self, token: &str, password_hash: &str) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE accounts SET password_hash = $2, reset_token = NULL WHERE reset_token = $1",
        )
        .bind(token)
        .bind(password_hash)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn update_username(
        &self,
        account_id: i32,
        username: &str,
    ) -> Result<Option<AccountProfile>> {
        let row = sqlx::query(
            "UPDATE accounts SET username = $2 WHERE id = $1 \
             RETURNING id, email, username, avatar, is_verified",
        )
        .bind(account_id)
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(profile_from_row).transpose()
    }
}
