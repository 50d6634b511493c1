//! Integration tests for the account lifecycle.
//!
//! These drive the full register -> verify -> login -> reset cycle through
//! the public API, reading codes and tokens out of the captured emails the
//! way a real user would follow the links.

use async_trait::async_trait;
use handbook_accounts::{
    AccountError, AccountService, AccountsConfig, Email, InMemoryAccountStore, MailResult, Mailer,
    MailerError, PasswordConfig,
};
use std::sync::{Arc, Mutex};

// =============================================================================
// Capturing mailer
// =============================================================================

#[derive(Clone, Default)]
struct CapturingMailer {
    sent: Arc<Mutex<Vec<Email>>>,
    failing: Arc<Mutex<bool>>,
}

impl CapturingMailer {
    fn new() -> Self {
        Self::default()
    }

    fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }

    fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    /// Pull the query-string value out of the last email's link, e.g. the
    /// `code` in `http://host/verify?code=...`.
    fn last_link_param(&self, param: &str) -> Option<String> {
        let sent = self.sent.lock().unwrap();
        let html = sent.last()?.html.clone()?;
        let needle = format!("{}=", param);
        let start = html.find(&needle)? + needle.len();
        let rest = &html[start..];
        let end = rest.find('"').unwrap_or(rest.len());
        Some(rest[..end].to_string())
    }
}

#[async_trait]
impl Mailer for CapturingMailer {
    async fn send(&self, email: &Email) -> MailResult<()> {
        if *self.failing.lock().unwrap() {
            return Err(MailerError::Transport("wire is down".into()));
        }
        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }

    fn is_healthy(&self) -> bool {
        true
    }
}

// =============================================================================
// Setup
// =============================================================================

struct Harness {
    store: InMemoryAccountStore,
    mailer: CapturingMailer,
    service: AccountService<InMemoryAccountStore, CapturingMailer>,
}

fn harness() -> Harness {
    let store = InMemoryAccountStore::new();
    let mailer = CapturingMailer::new();

    let mut config = AccountsConfig::default();
    config.token.secret = "integration-test-secret".to_string();
    config.mail.link_base_url = "http://app.test".to_string();
    // No real DNS lookups in tests.
    config.mail.probe_mx = false;

    let service = AccountService::new(store.clone(), mailer.clone(), &config)
        .with_password_config(PasswordConfig::fast());

    Harness {
        store,
        mailer,
        service,
    }
}

// =============================================================================
// Lifecycle
// =============================================================================

#[tokio::test]
async fn test_full_registration_verification_login_cycle() {
    let h = harness();

    let session = h
        .service
        .register("Jane.Doe@Example.COM", "hunter42")
        .await
        .unwrap();
    assert_eq!(session.profile.email, "jane.doe@example.com");
    assert_eq!(session.profile.username, "janedoe");
    assert!(!session.profile.is_verified);

    // The registration token already resolves to the account.
    let profile = h.service.profile(&session.token).await.unwrap();
    assert_eq!(profile.id, session.profile.id);

    // Follow the emailed verification link.
    let code = h.mailer.last_link_param("code").unwrap();
    let verified = h.service.verify_email(&code).await.unwrap();
    assert!(verified.is_verified);

    // The code is one-shot.
    let err = h.service.verify_email(&code).await.unwrap_err();
    assert!(matches!(err, AccountError::NotFound(_)));

    // Login reflects the verified state.
    let session = h
        .service
        .login("jane.doe@example.com", "hunter42", "ip-1")
        .await
        .unwrap();
    assert!(session.profile.is_verified);
}

#[tokio::test]
async fn test_password_reset_end_to_end() {
    let h = harness();
    h.service.register("jane@example.com", "hunter42").await.unwrap();

    h.service.forgot_password("jane@example.com").await.unwrap();
    let token = h.mailer.last_link_param("token").unwrap();

    let err = h
        .service
        .reset_password(&token, "short")
        .await
        .unwrap_err();
    assert!(matches!(err, AccountError::WeakPassword(_)));

    h.service.reset_password(&token, "newpass7").await.unwrap();

    // Old password is dead, new one works, token is consumed.
    let err = h
        .service
        .login("jane@example.com", "hunter42", "ip-1")
        .await
        .unwrap_err();
    assert!(matches!(err, AccountError::InvalidCredentials));
    assert!(h
        .service
        .login("jane@example.com", "newpass7", "ip-1")
        .await
        .is_ok());
    let err = h
        .service
        .reset_password(&token, "another8")
        .await
        .unwrap_err();
    assert!(matches!(err, AccountError::InvalidToken));
}

#[tokio::test]
async fn test_forgot_password_acknowledges_unknown_email() {
    let h = harness();
    assert!(h.service.forgot_password("nobody@example.com").await.is_ok());
    assert_eq!(h.mailer.sent_count(), 0);
}

// =============================================================================
// Registration atomicity
// =============================================================================

#[tokio::test]
async fn test_failed_registration_leaves_no_account() {
    let h = harness();
    h.mailer.set_failing(true);

    let err = h
        .service
        .register("jane@example.com", "hunter42")
        .await
        .unwrap_err();
    assert!(matches!(err, AccountError::Mail(_)));
    assert_eq!(h.store.account_count(), 0);

    // The login path agrees nothing was created.
    let err = h
        .service
        .login("jane@example.com", "hunter42", "ip-1")
        .await
        .unwrap_err();
    assert!(matches!(err, AccountError::InvalidCredentials));

    // Once mail recovers, the same address registers cleanly.
    h.mailer.set_failing(false);
    let session = h
        .service
        .register("jane@example.com", "hunter42")
        .await
        .unwrap();
    assert_eq!(h.store.account_count(), 1);
    assert_eq!(session.profile.username, "jane");
}

#[tokio::test]
async fn test_rolled_back_registration_burns_an_id() {
    let h = harness();

    h.mailer.set_failing(true);
    let _ = h.service.register("first@example.com", "hunter42").await;
    h.mailer.set_failing(false);

    let session = h
        .service
        .register("second@example.com", "hunter42")
        .await
        .unwrap();
    // The rolled-back insert consumed id 1.
    assert_eq!(session.profile.id, 2);
}

// =============================================================================
// Throttling
// =============================================================================

#[tokio::test]
async fn test_throttle_blocks_even_valid_credentials() {
    let h = harness();
    h.service.register("jane@example.com", "hunter42").await.unwrap();

    for _ in 0..3 {
        let err = h
            .service
            .login("ghost@example.com", "x", "ip-1")
            .await
            .unwrap_err();
        assert!(matches!(err, AccountError::InvalidCredentials));
    }

    // The gate comes before credential checking.
    let err = h
        .service
        .login("jane@example.com", "hunter42", "ip-1")
        .await
        .unwrap_err();
    assert!(matches!(err, AccountError::RateLimited));

    // A different client key is untouched.
    assert!(h
        .service
        .login("jane@example.com", "hunter42", "ip-2")
        .await
        .is_ok());
}

// =============================================================================
// Usernames
// =============================================================================

#[tokio::test]
async fn test_username_collisions_and_updates() {
    let h = harness();

    let a = h.service.register("sam@one.com", "hunter42").await.unwrap();
    let b = h.service.register("sam@two.com", "hunter42").await.unwrap();
    assert_eq!(a.profile.username, "sam");
    assert_eq!(b.profile.username, "sam1");

    let err = h
        .service
        .update_username(b.profile.id, "sam")
        .await
        .unwrap_err();
    assert!(matches!(err, AccountError::UsernameTaken));

    let profile = h
        .service
        .update_username(b.profile.id, "samantha")
        .await
        .unwrap();
    assert_eq!(profile.username, "samantha");

    // The freed handle remains taken by account a only.
    let err = h
        .service
        .update_username(b.profile.id, "sam")
        .await
        .unwrap_err();
    assert!(matches!(err, AccountError::UsernameTaken));
}

#[tokio::test]
async fn test_symbolic_local_part_falls_back_to_user() {
    let h = harness();
    let session = h.service.register("+.-@example.com", "hunter42").await.unwrap();
    assert_eq!(session.profile.username, "user");
}
