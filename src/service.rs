//! Account lifecycle orchestration.
//!
//! [`AccountService`] ties the hasher, token issuer, throttle, allocator,
//! store and mailer together into the login, registration, verification and
//! password reset flows.

use crate::config::AccountsConfig;
use crate::error::{AccountError, Result};
use crate::mailer::{Email, Mailer, MailerError};
use crate::mx::{DnsMxProbe, MxProbe};
use crate::password::{check_password_strength, CredentialHasher, PasswordConfig};
use crate::store::{AccountProfile, AccountStore, Avatar, PendingAccount, RegistrationTx};
use crate::throttle::LoginThrottle;
use crate::token::{SessionClaims, SessionTokenIssuer};
use crate::username::{is_valid_username, UsernameAllocator};
use std::time::Duration;
use uuid::Uuid;

/// A signed session token plus the profile it belongs to.
#[derive(Debug, Clone)]
pub struct AuthenticatedSession {
    pub token: String,
    pub profile: AccountProfile,
}

/// Syntax check for an e-mail address: a non-empty local part of
/// `[A-Za-z0-9+_.-]`, one `@`, and a non-empty domain of `[A-Za-z0-9.-]`.
pub fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.is_empty()
        && local
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '_' | '.' | '-'))
        && domain
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-'))
}

/// The account lifecycle orchestrator.
pub struct AccountService<S, M> {
    store: S,
    mailer: M,
    hasher: CredentialHasher,
    tokens: SessionTokenIssuer,
    throttle: LoginThrottle,
    allocator: UsernameAllocator,
    mx_probe: Option<Box<dyn MxProbe>>,
    mail_from: String,
    link_base_url: String,
    send_timeout: Duration,
}

impl<S, M> AccountService<S, M>
where
    S: AccountStore,
    M: Mailer,
{
    pub fn new(store: S, mailer: M, config: &AccountsConfig) -> Self {
        let mut tokens = SessionTokenIssuer::new(config.token.secret.as_bytes());
        if let Some(ref audience) = config.token.audience {
            tokens = tokens.with_audience(audience.clone());
        }

        let mx_probe: Option<Box<dyn MxProbe>> = if config.mail.probe_mx {
            Some(Box::new(DnsMxProbe::new()))
        } else {
            None
        };

        Self {
            store,
            mailer,
            hasher: CredentialHasher::new(PasswordConfig::default()),
            tokens,
            throttle: LoginThrottle::new(config.throttle.policy()),
            allocator: UsernameAllocator::new(),
            mx_probe,
            mail_from: config.mail.from.clone(),
            link_base_url: config.mail.link_base_url.clone(),
            send_timeout: config.mail.send_timeout(),
        }
    }

    /// Replace the MX deliverability probe checked during registration.
    ///
    /// The constructor attaches a DNS probe when `mail.probe_mx` is set;
    /// this swaps in a custom implementation.
    #[must_use]
    pub fn with_mx_probe(mut self, probe: impl MxProbe + 'static) -> Self {
        self.mx_probe = Some(Box::new(probe));
        self
    }

    /// Override the Argon2 cost profile.
    #[must_use]
    pub fn with_password_config(mut self, config: PasswordConfig) -> Self {
        self.hasher = CredentialHasher::new(config);
        self
    }

    /// Authenticate with email and password.
    ///
    /// `client_key` identifies the caller for throttling, typically the
    /// client IP. Only failures for unknown addresses feed the throttle;
    /// a wrong password on a known account does not.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        client_key: &str,
    ) -> Result<AuthenticatedSession> {
        if self.throttle.is_blocked(client_key) {
            tracing::warn!(
                target: "accounts.login.rate_limited",
                client = %client_key,
                "login blocked by throttle"
            );
            return Err(AccountError::RateLimited);
        }

        let email = normalize_email(email);

        let account = match self.store.find_by_email(&email).await? {
            Some(account) => account,
            None => {
                self.throttle.record_failure(client_key);
                // Hash anyway so unknown addresses take as long as known ones.
                let _ = self.hasher.hash(password);
                tracing::info!(
                    target: "accounts.login.unknown_email",
                    client = %client_key,
                    "login failed: unknown email"
                );
                return Err(AccountError::InvalidCredentials);
            }
        };

        if !self.hasher.verify(password, &account.password_hash)? {
            tracing::info!(
                target: "accounts.login.bad_password",
                account_id = account.id,
                "login failed: wrong password"
            );
            return Err(AccountError::InvalidCredentials);
        }

        let token = self.tokens.issue(account.id, &account.email)?;
        tracing::info!(target: "accounts.login.ok", account_id = account.id, "login succeeded");

        Ok(AuthenticatedSession {
            token,
            profile: AccountProfile::from(&account),
        })
    }

    /// Register a new account.
    ///
    /// The row insert and the verification email form one unit: if the email
    /// cannot be sent, the insert is rolled back and no account exists.
    pub async fn register(&self, email: &str, password: &str) -> Result<AuthenticatedSession> {
        let email = normalize_email(email);

        if !is_valid_email(&email) {
            return Err(AccountError::invalid_email("malformed address"));
        }

        if let Some(ref probe) = self.mx_probe {
            let domain = email.split('@').nth(1).unwrap_or("");
            if !probe.is_deliverable(domain).await {
                return Err(AccountError::invalid_email("mail domain not found"));
            }
        }

        if self.store.find_by_email(&email).await?.is_some() {
            return Err(AccountError::EmailTaken);
        }

        let password_hash = self.hasher.hash(password)?;
        let username = self.allocator.allocate(&self.store, &email).await?;
        let verification_code = Uuid::new_v4().to_string();
        let avatar = Avatar::random();

        let mut tx = self.store.begin_registration().await?;
        let account = match tx
            .insert_pending_account(PendingAccount {
                email: &email,
                password_hash: &password_hash,
                username: &username,
                verification_code: &verification_code,
                avatar,
            })
            .await
        {
            Ok(account) => account,
            Err(err) => {
                rollback_quietly(tx).await;
                return Err(err);
            }
        };

        let message = self.verification_email(&email, &verification_code);
        match tokio::time::timeout(self.send_timeout, self.mailer.send(&message)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                rollback_quietly(tx).await;
                tracing::warn!(
                    target: "accounts.register.rolled_back",
                    error = %err,
                    "registration rolled back: verification email failed"
                );
                return Err(match err {
                    MailerError::MailboxRejected(_) => AccountError::InvalidMailbox,
                    MailerError::Transport(e) => AccountError::mail(e),
                    MailerError::InvalidMessage(e) => AccountError::internal(e),
                });
            }
            Err(_) => {
                rollback_quietly(tx).await;
                tracing::warn!(
                    target: "accounts.register.rolled_back",
                    timeout_secs = self.send_timeout.as_secs(),
                    "registration rolled back: verification email timed out"
                );
                return Err(AccountError::mail("verification email timed out"));
            }
        }

        tx.commit().await?;
        tracing::info!(
            target: "accounts.register.ok",
            account_id = account.id,
            username = %account.username,
            "account registered, awaiting verification"
        );

        let token = self.tokens.issue(account.id, &account.email)?;
        Ok(AuthenticatedSession {
            token,
            profile: AccountProfile::from(&account),
        })
    }

    /// Consume a verification code, marking its holder verified.
    pub async fn verify_email(&self, code: &str) -> Result<AccountProfile> {
        let account = self
            .store
            .find_by_verification_code(code)
            .await?
            .ok_or_else(|| AccountError::not_found("verification code"))?;

        // Zero rows means another caller consumed the code between the
        // lookup and the update.
        if self.store.mark_verified(code).await? == 0 {
            return Err(AccountError::internal("verification lost a race"));
        }

        tracing::info!(target: "accounts.verify.ok", account_id = account.id, "email verified");

        let mut profile = AccountProfile::from(&account);
        profile.is_verified = true;
        Ok(profile)
    }

    /// Open a password reset flow.
    ///
    /// Always acknowledges identically whether or not the address is
    /// registered, so callers cannot enumerate accounts. Mail failures are
    /// logged and swallowed for the same reason.
    pub async fn forgot_password(&self, email: &str) -> Result<()> {
        let email = normalize_email(email);

        let Some(account) = self.store.find_by_email(&email).await? else {
            tracing::debug!(
                target: "accounts.password.reset_requested",
                "reset requested for unknown email"
            );
            return Ok(());
        };

        let reset_token = Uuid::new_v4().to_string();
        if self.store.set_reset_token(account.id, &reset_token).await? == 0 {
            // Account vanished between lookup and update. Same outward ack.
            return Ok(());
        }

        let message = self.reset_email(&email, &reset_token);
        if let Err(err) = self.mailer.send(&message).await {
            tracing::warn!(
                target: "accounts.password.reset_mail_failed",
                account_id = account.id,
                error = %err,
                "reset email failed, acknowledging anyway"
            );
        } else {
            tracing::info!(
                target: "accounts.password.reset_requested",
                account_id = account.id,
                "reset email sent"
            );
        }

        Ok(())
    }

    /// Consume a reset token and set a new password.
    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<()> {
        let account = self
            .store
            .find_by_reset_token(token)
            .await?
            .ok_or(AccountError::InvalidToken)?;

        check_password_strength(new_password)?;

        let password_hash = self.hasher.hash(new_password)?;
        if self.store.reset_password(token, &password_hash).await? == 0 {
            return Err(AccountError::internal("password reset lost a race"));
        }

        tracing::info!(
            target: "accounts.password.reset_ok",
            account_id = account.id,
            "password reset"
        );
        Ok(())
    }

    /// Change an account's username.
    pub async fn update_username(
        &self,
        account_id: i32,
        new_username: &str,
    ) -> Result<AccountProfile> {
        if !is_valid_username(new_username) {
            return Err(AccountError::invalid_format(
                "username must be 1-12 alphanumeric characters",
            ));
        }

        if self
            .store
            .is_username_taken(new_username, Some(account_id))
            .await?
        {
            return Err(AccountError::UsernameTaken);
        }

        let profile = self
            .store
            .update_username(account_id, new_username)
            .await?
            .ok_or_else(|| AccountError::internal("username update affected no rows"))?;

        tracing::info!(
            target: "accounts.username.updated",
            account_id,
            username = %profile.username,
            "username updated"
        );
        Ok(profile)
    }

    /// Resolve a session token to the profile it references.
    pub async fn profile(&self, token: &str) -> Result<AccountProfile> {
        let claims: SessionClaims = self.tokens.verify(token)?;
        let account_id = claims.account_id()?;

        let account = self
            .store
            .find_by_id(account_id)
            .await?
            .ok_or_else(|| AccountError::not_found("account"))?;

        Ok(AccountProfile::from(&account))
    }

    /// Drop expired throttle entries. Run periodically.
    pub fn purge_throttle(&self) {
        self.throttle.purge_expired();
    }

    fn verification_email(&self, to: &str, code: &str) -> Email {
        let link = format!("{}/verify?code={}", self.link_base_url, code);
        let html = format!(
            r#"<html>
  <body style="font-family: Arial, sans-serif; background-color: #f4f4f4; padding: 20px;">
    <div style="background-color: #fff; padding: 20px; border-radius: 8px; text-align: center; box-shadow: 0 2px 8px rgba(0,0,0,0.1);">
      <h2 style="color: #333;">Welcome!</h2>
      <p style="color: #555;">Press the button below to confirm your email address:</p>
      <a href="{link}" style="display: inline-block; padding: 10px 20px; color: #fff; background-color: #007BFF; text-decoration: none; border-radius: 5px; margin-top: 20px;">Confirm email</a>
    </div>
  </body>
</html>"#
        );

        Email::new(&self.mail_from, to, "Confirm your registration")
            .text(format!("Confirm your email address: {}", link))
            .html(html)
    }

    fn reset_email(&self, to: &str, token: &str) -> Email {
        let link = format!("{}/reset-password?token={}", self.link_base_url, token);
        let html = format!(
            r#"<html>
  <body style="font-family: Arial, sans-serif; background-color: #f4f4f4; padding: 20px;">
    <div style="background-color: #fff; padding: 20px; border-radius: 8px; text-align: center; box-shadow: 0 2px 8px rgba(0,0,0,0.1);">
      <h2 style="color: #333;">Password reset</h2>
      <p style="color: #555;">Press the button below to choose a new password:</p>
      <a href="{link}" style="display: inline-block; padding: 10px 20px; margin-top: 20px; color: #fff; background-color: #007BFF; text-decoration: none; border-radius: 5px;">Reset password</a>
    </div>
  </body>
</html>"#
        );

        Email::new(&self.mail_from, to, "Password reset request")
            .text(format!("Reset your password: {}", link))
            .html(html)
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

async fn rollback_quietly(tx: Box<dyn RegistrationTx + '_>) {
    if let Err(err) = tx.rollback().await {
        tracing::error!(
            target: "accounts.register.rollback_failed",
            error = %err,
            "registration rollback failed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryAccountStore;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Mailer that records sends and fails on demand.
    #[derive(Default)]
    struct RecordingMailer {
        mode: Mutex<MailMode>,
        sent: Mutex<Vec<Email>>,
    }

    #[derive(Default, Clone, Copy)]
    enum MailMode {
        #[default]
        Ok,
        RejectMailbox,
        TransportError,
        Hang,
    }

    impl RecordingMailer {
        fn set_mode(&self, mode: MailMode) {
            *self.mode.lock().unwrap() = mode;
        }

        fn sent_count(&self) -> usize {
            self.sent.lock().unwrap().len()
        }

        fn last_sent(&self) -> Option<Email> {
            self.sent.lock().unwrap().last().cloned()
        }
    }

    #[async_trait]
    impl Mailer for &RecordingMailer {
        async fn send(&self, email: &Email) -> crate::mailer::MailResult<()> {
            let mode = *self.mode.lock().unwrap();
            match mode {
                MailMode::Ok => {
                    self.sent.lock().unwrap().push(email.clone());
                    Ok(())
                }
                MailMode::RejectMailbox => Err(MailerError::MailboxRejected("550".into())),
                MailMode::TransportError => Err(MailerError::Transport("connection lost".into())),
                MailMode::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(())
                }
            }
        }

        fn is_healthy(&self) -> bool {
            true
        }
    }

    /// Probe that rejects a fixed set of domains.
    struct DenyListProbe(&'static [&'static str]);

    #[async_trait]
    impl MxProbe for DenyListProbe {
        async fn is_deliverable(&self, domain: &str) -> bool {
            !self.0.contains(&domain)
        }
    }

    fn test_config() -> AccountsConfig {
        let mut config = AccountsConfig::default();
        config.token.secret = "test-secret".to_string();
        config.mail.send_timeout_secs = 1;
        // No real DNS lookups in tests.
        config.mail.probe_mx = false;
        config
    }

    fn service<'a>(
        store: InMemoryAccountStore,
        mailer: &'a RecordingMailer,
    ) -> AccountService<InMemoryAccountStore, &'a RecordingMailer> {
        AccountService::new(store, mailer, &test_config())
            .with_password_config(PasswordConfig::fast())
    }

    #[test]
    fn test_email_syntax() {
        assert!(is_valid_email("jane.doe+tag@example.com"));
        assert!(is_valid_email("a@b"));
        assert!(!is_valid_email("no-at-sign"));
        assert!(!is_valid_email("@nodomain"));
        assert!(!is_valid_email("nolocal@"));
        assert!(!is_valid_email("two@@ats"));
        assert!(!is_valid_email("spaced name@example.com"));
    }

    #[tokio::test]
    async fn test_register_creates_verified_pending_account() {
        let store = InMemoryAccountStore::new();
        let mailer = RecordingMailer::default();
        let svc = service(store.clone(), &mailer);

        let session = svc.register("Jane@Example.com", "pass1234").await.unwrap();

        assert_eq!(session.profile.email, "jane@example.com");
        assert_eq!(session.profile.username, "jane");
        assert!(!session.profile.is_verified);
        assert_eq!(store.account_count(), 1);
        assert_eq!(mailer.sent_count(), 1);

        let email = mailer.last_sent().unwrap();
        assert_eq!(email.to, "jane@example.com");
        assert!(email.html.unwrap().contains("/verify?code="));

        // The returned token resolves back to the new account.
        let profile = svc.profile(&session.token).await.unwrap();
        assert_eq!(profile.id, session.profile.id);
    }

    #[tokio::test]
    async fn test_register_rejects_bad_syntax() {
        let store = InMemoryAccountStore::new();
        let mailer = RecordingMailer::default();
        let svc = service(store, &mailer);

        let err = svc.register("not-an-email", "pass1234").await.unwrap_err();
        assert!(matches!(err, AccountError::InvalidEmail(_)));
        assert_eq!(mailer.sent_count(), 0);
    }

    #[tokio::test]
    async fn test_probe_mx_flag_controls_probe_attachment() {
        let mailer = RecordingMailer::default();

        let mut config = test_config();
        config.mail.probe_mx = true;
        let svc = AccountService::new(InMemoryAccountStore::new(), &mailer, &config);
        assert!(svc.mx_probe.is_some());

        config.mail.probe_mx = false;
        let svc = AccountService::new(InMemoryAccountStore::new(), &mailer, &config);
        assert!(svc.mx_probe.is_none());
    }

    #[tokio::test]
    async fn test_register_skips_probe_when_disabled() {
        let store = InMemoryAccountStore::new();
        let mailer = RecordingMailer::default();
        // probe_mx is off in the test config, so a domain without MX
        // records registers fine.
        let svc = service(store.clone(), &mailer);

        assert!(svc.register("a@no-mx.invalid", "pass1234").await.is_ok());
        assert_eq!(store.account_count(), 1);
    }

    #[tokio::test]
    async fn test_register_rejects_undeliverable_domain() {
        let store = InMemoryAccountStore::new();
        let mailer = RecordingMailer::default();
        let svc = service(store.clone(), &mailer)
            .with_mx_probe(DenyListProbe(&["nomx.example"]));

        let err = svc.register("a@nomx.example", "pass1234").await.unwrap_err();
        assert!(matches!(err, AccountError::InvalidEmail(_)));
        assert_eq!(store.account_count(), 0);

        // Other domains pass the probe.
        assert!(svc.register("a@ok.example", "pass1234").await.is_ok());
    }

    #[tokio::test]
    async fn test_register_rejects_duplicate_email() {
        let store = InMemoryAccountStore::new();
        let mailer = RecordingMailer::default();
        let svc = service(store, &mailer);

        svc.register("a@b.c", "pass1234").await.unwrap();
        let err = svc.register("a@b.c", "other999").await.unwrap_err();
        assert!(matches!(err, AccountError::EmailTaken));
    }

    #[tokio::test]
    async fn test_register_rolls_back_on_mailbox_rejection() {
        let store = InMemoryAccountStore::new();
        let mailer = RecordingMailer::default();
        mailer.set_mode(MailMode::RejectMailbox);
        let svc = service(store.clone(), &mailer);

        let err = svc.register("a@b.c", "pass1234").await.unwrap_err();
        assert!(matches!(err, AccountError::InvalidMailbox));
        assert_eq!(store.account_count(), 0);

        // The address is free to register again once mail works.
        mailer.set_mode(MailMode::Ok);
        assert!(svc.register("a@b.c", "pass1234").await.is_ok());
    }

    #[tokio::test]
    async fn test_register_rolls_back_on_transport_error() {
        let store = InMemoryAccountStore::new();
        let mailer = RecordingMailer::default();
        mailer.set_mode(MailMode::TransportError);
        let svc = service(store.clone(), &mailer);

        let err = svc.register("a@b.c", "pass1234").await.unwrap_err();
        assert!(matches!(err, AccountError::Mail(_)));
        assert_eq!(store.account_count(), 0);
    }

    #[tokio::test]
    async fn test_register_rolls_back_on_mail_timeout() {
        let store = InMemoryAccountStore::new();
        let mailer = RecordingMailer::default();
        mailer.set_mode(MailMode::Hang);
        let svc = service(store.clone(), &mailer);

        // Under the paused clock the 1s send timeout fires before the
        // mailer's long sleep.
        tokio::time::pause();
        let err = svc.register("a@b.c", "pass1234").await.unwrap_err();
        assert!(matches!(err, AccountError::Mail(_)));
        assert_eq!(store.account_count(), 0);
    }

    #[tokio::test]
    async fn test_register_allocates_suffixed_username() {
        let store = InMemoryAccountStore::new();
        let mailer = RecordingMailer::default();
        let svc = service(store, &mailer);

        let first = svc.register("jane@a.com", "pass1234").await.unwrap();
        let second = svc.register("jane@b.com", "pass1234").await.unwrap();

        assert_eq!(first.profile.username, "jane");
        assert_eq!(second.profile.username, "jane1");
    }

    #[tokio::test]
    async fn test_login_success_and_wrong_password() {
        let store = InMemoryAccountStore::new();
        let mailer = RecordingMailer::default();
        let svc = service(store, &mailer);

        svc.register("a@b.c", "pass1234").await.unwrap();

        let session = svc.login("a@b.c", "pass1234", "ip-1").await.unwrap();
        assert_eq!(session.profile.email, "a@b.c");

        let err = svc.login("a@b.c", "wrong", "ip-1").await.unwrap_err();
        assert!(matches!(err, AccountError::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_login_throttles_unknown_email_failures() {
        let store = InMemoryAccountStore::new();
        let mailer = RecordingMailer::default();
        let svc = service(store, &mailer);

        for _ in 0..3 {
            let err = svc.login("ghost@b.c", "x", "ip-1").await.unwrap_err();
            assert!(matches!(err, AccountError::InvalidCredentials));
        }

        let err = svc.login("ghost@b.c", "x", "ip-1").await.unwrap_err();
        assert!(matches!(err, AccountError::RateLimited));

        // Another client key is unaffected.
        let err = svc.login("ghost@b.c", "x", "ip-2").await.unwrap_err();
        assert!(matches!(err, AccountError::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_wrong_password_does_not_feed_throttle() {
        let store = InMemoryAccountStore::new();
        let mailer = RecordingMailer::default();
        let svc = service(store, &mailer);

        svc.register("a@b.c", "pass1234").await.unwrap();

        for _ in 0..5 {
            let err = svc.login("a@b.c", "wrong", "ip-1").await.unwrap_err();
            assert!(matches!(err, AccountError::InvalidCredentials));
        }

        // Still not rate limited, and the right password works.
        assert!(svc.login("a@b.c", "pass1234", "ip-1").await.is_ok());
    }

    #[tokio::test]
    async fn test_verify_email_consumes_code_once() {
        let store = InMemoryAccountStore::new();
        let mailer = RecordingMailer::default();
        let svc = service(store.clone(), &mailer);

        let session = svc.register("a@b.c", "pass1234").await.unwrap();
        let code = store
            .find_by_id(session.profile.id)
            .await
            .unwrap()
            .unwrap()
            .verification_code
            .unwrap();

        let profile = svc.verify_email(&code).await.unwrap();
        assert!(profile.is_verified);

        let err = svc.verify_email(&code).await.unwrap_err();
        assert!(matches!(err, AccountError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_forgot_password_constant_ack() {
        let store = InMemoryAccountStore::new();
        let mailer = RecordingMailer::default();
        let svc = service(store.clone(), &mailer);

        svc.register("a@b.c", "pass1234").await.unwrap();
        mailer.set_mode(MailMode::TransportError);

        // Unknown address, known address, and a mail failure all ack Ok.
        assert!(svc.forgot_password("ghost@b.c").await.is_ok());
        assert!(svc.forgot_password("a@b.c").await.is_ok());

        // The reset token was still persisted despite the failed send.
        let account = svc_store_account(&store, "a@b.c").await;
        assert!(account.reset_token.is_some());
    }

    #[tokio::test]
    async fn test_reset_password_flow() {
        let store = InMemoryAccountStore::new();
        let mailer = RecordingMailer::default();
        let svc = service(store.clone(), &mailer);

        svc.register("a@b.c", "pass1234").await.unwrap();
        svc.forgot_password("a@b.c").await.unwrap();
        let token = svc_store_account(&store, "a@b.c").await.reset_token.unwrap();

        let err = svc.reset_password("wrong-token", "newpass1").await.unwrap_err();
        assert!(matches!(err, AccountError::InvalidToken));

        let err = svc.reset_password(&token, "weak").await.unwrap_err();
        assert!(matches!(err, AccountError::WeakPassword(_)));

        svc.reset_password(&token, "newpass1").await.unwrap();

        // Token is consumed, old password dead, new one works.
        let err = svc.reset_password(&token, "newpass1").await.unwrap_err();
        assert!(matches!(err, AccountError::InvalidToken));
        let err = svc.login("a@b.c", "pass1234", "ip").await.unwrap_err();
        assert!(matches!(err, AccountError::InvalidCredentials));
        assert!(svc.login("a@b.c", "newpass1", "ip").await.is_ok());
    }

    #[tokio::test]
    async fn test_update_username_rules() {
        let store = InMemoryAccountStore::new();
        let mailer = RecordingMailer::default();
        let svc = service(store, &mailer);

        let a = svc.register("a@b.c", "pass1234").await.unwrap();
        let b = svc.register("b@b.c", "pass1234").await.unwrap();

        let err = svc.update_username(a.profile.id, "bad name!").await.unwrap_err();
        assert!(matches!(err, AccountError::InvalidFormat(_)));

        let err = svc
            .update_username(a.profile.id, &b.profile.username)
            .await
            .unwrap_err();
        assert!(matches!(err, AccountError::UsernameTaken));

        // Setting your own current name is allowed.
        let profile = svc
            .update_username(a.profile.id, &a.profile.username)
            .await
            .unwrap();
        assert_eq!(profile.username, a.profile.username);

        let profile = svc.update_username(a.profile.id, "fresh").await.unwrap();
        assert_eq!(profile.username, "fresh");
    }

    #[tokio::test]
    async fn test_profile_rejects_bad_token() {
        let store = InMemoryAccountStore::new();
        let mailer = RecordingMailer::default();
        let svc = service(store, &mailer);

        let err = svc.profile("garbage").await.unwrap_err();
        assert!(matches!(err, AccountError::InvalidToken));
    }

    async fn svc_store_account(store: &InMemoryAccountStore, email: &str) -> crate::store::Account {
        store.find_by_email(email).await.unwrap().unwrap()
    }
}
