//! In-memory account store for tests and local development.
//!
//! Mirrors the Postgres adapter's semantics: serial ids are burned even when
//! a registration rolls back, and a pending row is invisible to readers
//! until its transaction commits.

use super::{Account, AccountProfile, AccountStore, PendingAccount, RegistrationTx};
use crate::error::{AccountError, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Default)]
struct Inner {
    accounts: HashMap<i32, Account>,
    next_id: i32,
}

/// Thread-safe in-memory [`AccountStore`].
#[derive(Clone, Default)]
pub struct InMemoryAccountStore {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Number of committed accounts.
    pub fn account_count(&self) -> usize {
        self.lock().accounts.len()
    }
}

struct MemRegistrationTx {
    inner: Arc<Mutex<Inner>>,
    staged: Option<Account>,
}

#[async_trait]
impl RegistrationTx for MemRegistrationTx {
    async fn insert_pending_account(&mut self, pending: PendingAccount<'_>) -> Result<Account> {
        let mut inner = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        // Unique-constraint stand-ins. A username collision here means the
        // allocator lost a race, which is not the caller's EmailTaken.
        if inner.accounts.values().any(|a| a.email == pending.email) {
            return Err(AccountError::EmailTaken);
        }
        if inner.accounts.values().any(|a| a.username == pending.username) {
            return Err(AccountError::internal("username unique constraint violated"));
        }

        // Serial ids advance even when the transaction later rolls back.
        inner.next_id += 1;
        let account = Account {
            id: inner.next_id,
            email: pending.email.to_string(),
            password_hash: pending.password_hash.to_string(),
            username: pending.username.to_string(),
            avatar: pending.avatar,
            is_verified: false,
            verification_code: Some(pending.verification_code.to_string()),
            reset_token: None,
            created_at: Utc::now(),
        };

        self.staged = Some(account.clone());
        Ok(account)
    }

    async fn commit(mut self: Box<Self>) -> Result<()> {
        if let Some(account) = self.staged.take() {
            let mut inner = self
                .inner
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if inner.accounts.values().any(|a| a.email == account.email) {
                return Err(AccountError::EmailTaken);
            }
            inner.accounts.insert(account.id, account);
        }
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> Result<()> {
        self.staged = None;
        Ok(())
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>> {
        Ok(self.lock().accounts.values().find(|a| a.email == email).cloned())
    }

    async fn find_by_id(&self, id: i32) -> Result<Option<Account>> {
        Ok(self.lock().accounts.get(&id).cloned())
    }

    async fn find_by_verification_code(&self, code: &str) -> Result<Option<Account>> {
        Ok(self
            .lock()
            .accounts
            .values()
            .find(|a| a.verification_code.as_deref() == Some(code))
            .cloned())
    }

    async fn find_by_reset_token(&self, token: &str) -> Result<Option<Account>> {
        Ok(self
            .lock()
            .accounts
            .values()
            .find(|a| a.reset_token.as_deref() == Some(token))
            .cloned())
    }

    async fn is_username_taken(&self, username: &str, excluding_id: Option<i32>) -> Result<bool> {
        if username.is_empty() {
            return Ok(false);
        }
        Ok(self
            .lock()
            .accounts
            .values()
            .any(|a| a.username == username && Some(a.id) != excluding_id))
    }

    async fn begin_registration(&self) -> Result<Box<dyn RegistrationTx + '_>> {
        Ok(Box::new(MemRegistrationTx {
            inner: Arc::clone(&self.inner),
            staged: None,
        }))
    }

    async fn mark_verified(&self, code: &str) -> Result<u64> {
        let mut inner = self.lock();
        for account in inner.accounts.values_mut() {
            if account.verification_code.as_deref() == Some(code) {
                account.verification_code = None;
                account.is_verified = true;
                return Ok(1);
            }
        }
        Ok(0)
    }

    async fn set_reset_token(&self, account_id: i32, token: &str) -> Result<u64> {
        let mut inner = self.lock();
        match inner.accounts.get_mut(&account_id) {
            Some(account) => {
                account.reset_token = Some(token.to_string());
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn reset_password(&self, token: &str, password_hash: &str) -> Result<u64> {
        let mut inner = self.lock();
        for account in inner.accounts.values_mut() {
            if account.reset_token.as_deref() == Some(token) {
                account.password_hash = password_hash.to_string();
                account.reset_token = None;
                return Ok(1);
            }
        }
        Ok(0)
    }

    async fn update_username(
        &self,
        account_id: i32,
        username: &str,
    ) -> Result<Option<AccountProfile>> {
        let mut inner = self.lock();

        // Unique-constraint stand-in.
        if inner
            .accounts
            .values()
            .any(|a| a.username == username && a.id != account_id)
        {
            return Err(AccountError::internal("username unique constraint violated"));
        }

        match inner.accounts.get_mut(&account_id) {
            Some(account) => {
                account.username = username.to_string();
                Ok(Some(AccountProfile::from(&*account)))
            }
            None => Ok(None),
        }
    }
}
