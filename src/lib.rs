//! handbook-accounts - account lifecycle core for the handbook places app
//!
//! Provides registration with verified email, login with attempt throttling,
//! password reset and session token issuance, behind trait seams for storage
//! and mail delivery. HTTP routing is left to the embedding application.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use handbook_accounts::{
//!     AccountService, AccountsConfig, ConsoleMailer, InMemoryAccountStore,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     handbook_accounts::init_tracing();
//!
//!     let config = AccountsConfig::from_env();
//!     let service = AccountService::new(InMemoryAccountStore::new(), ConsoleMailer::new(), &config);
//!
//!     let session = service.register("jane@example.com", "hunter42").await.unwrap();
//!     println!("registered account {}", session.profile.id);
//! }
//! ```

mod config;
mod error;
pub mod mailer;
pub mod mx;
pub mod password;
pub mod service;
pub mod store;
pub mod throttle;
pub mod token;
pub mod username;

// Re-exports for public API
pub use config::{AccountsConfig, MailConfig, ThrottleConfig, TokenConfig};
pub use error::{AccountError, Result};
pub use mailer::{ConsoleMailer, Email, MailResult, Mailer, MailerError, SmtpConfig, SmtpMailer};
pub use mx::{DnsMxProbe, MxProbe};
pub use password::{CredentialHasher, PasswordConfig};
pub use service::{AccountService, AuthenticatedSession};
pub use store::{
    Account, AccountProfile, AccountStore, Avatar, InMemoryAccountStore, PendingAccount,
    PgAccountStore, RegistrationTx,
};
pub use throttle::{LoginThrottle, ThrottlePolicy};
pub use token::{SessionClaims, SessionTokenIssuer};
pub use username::UsernameAllocator;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing/logging with sensible defaults
///
/// This should be called early in your application, before constructing the
/// service.
///
/// # Environment Variables
///
/// - `RUST_LOG`: Set log level (e.g., "info", "debug", "handbook_accounts=debug")
/// - `ACCOUNTS_LOG_JSON`: Set to "true" for JSON formatted logs
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let json_logs = std::env::var("ACCOUNTS_LOG_JSON")
        .map(|v| v.parse::<bool>().unwrap_or(false))
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}
