//! Configuration for the account lifecycle service.

use crate::throttle::ThrottlePolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountsConfig {
    #[serde(default)]
    pub token: TokenConfig,
    #[serde(default)]
    pub throttle: ThrottleConfig,
    #[serde(default)]
    pub mail: MailConfig,
}

impl AccountsConfig {
    /// Load configuration from environment variables, falling back to the
    /// defaults for anything unset.
    ///
    /// - `ACCOUNTS_TOKEN_SECRET`
    /// - `ACCOUNTS_TOKEN_AUDIENCE`
    /// - `ACCOUNTS_THROTTLE_MAX_FAILURES`
    /// - `ACCOUNTS_THROTTLE_WINDOW_SECS`
    /// - `ACCOUNTS_MAIL_FROM`
    /// - `ACCOUNTS_LINK_BASE_URL`
    /// - `ACCOUNTS_MAIL_TIMEOUT_SECS`
    /// - `ACCOUNTS_MX_PROBE` ("false"/"0" to disable)
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(secret) = std::env::var("ACCOUNTS_TOKEN_SECRET") {
            config.token.secret = secret;
        }
        if let Ok(audience) = std::env::var("ACCOUNTS_TOKEN_AUDIENCE") {
            config.token.audience = Some(audience);
        }
        if let Ok(max) = std::env::var("ACCOUNTS_THROTTLE_MAX_FAILURES") {
            if let Ok(max) = max.parse() {
                config.throttle.max_failures = max;
            }
        }
        if let Ok(secs) = std::env::var("ACCOUNTS_THROTTLE_WINDOW_SECS") {
            if let Ok(secs) = secs.parse() {
                config.throttle.window_secs = secs;
            }
        }
        if let Ok(from) = std::env::var("ACCOUNTS_MAIL_FROM") {
            config.mail.from = from;
        }
        if let Ok(base) = std::env::var("ACCOUNTS_LINK_BASE_URL") {
            config.mail.link_base_url = base;
        }
        if let Ok(secs) = std::env::var("ACCOUNTS_MAIL_TIMEOUT_SECS") {
            if let Ok(secs) = secs.parse() {
                config.mail.send_timeout_secs = secs;
            }
        }
        if let Ok(probe) = std::env::var("ACCOUNTS_MX_PROBE") {
            config.mail.probe_mx = probe != "false" && probe != "0";
        }

        config
    }
}

/// Session token settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    /// HS256 signing secret.
    pub secret: String,
    /// Audience claim stamped on tokens and required on verification.
    #[serde(default)]
    pub audience: Option<String>,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            secret: "change-me".to_string(),
            audience: Some("handbook-app".to_string()),
        }
    }
}

/// Login throttle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThrottleConfig {
    #[serde(default = "default_max_failures")]
    pub max_failures: u32,
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

fn default_max_failures() -> u32 {
    3
}

fn default_window_secs() -> u64 {
    60
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            max_failures: default_max_failures(),
            window_secs: default_window_secs(),
        }
    }
}

impl ThrottleConfig {
    pub fn policy(&self) -> ThrottlePolicy {
        ThrottlePolicy::new()
            .max_failures(self.max_failures)
            .window(Duration::from_secs(self.window_secs))
    }
}

/// Outbound mail settings for the lifecycle emails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    /// Sender address on verification and reset emails.
    pub from: String,
    /// Base URL the verification and reset links point at.
    pub link_base_url: String,
    /// Hard cap on the registration email send.
    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,
    /// Whether registration probes the domain's MX records.
    #[serde(default = "default_probe_mx")]
    pub probe_mx: bool,
}

fn default_send_timeout_secs() -> u64 {
    10
}

fn default_probe_mx() -> bool {
    true
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            from: "noreply@localhost".to_string(),
            link_base_url: "http://localhost:8080".to_string(),
            send_timeout_secs: default_send_timeout_secs(),
            probe_mx: default_probe_mx(),
        }
    }
}

impl MailConfig {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }
}
