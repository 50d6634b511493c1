//! Email sending.
//!
//! The [`Mailer`] trait abstracts the delivery backend. Its error type keeps
//! permanent mailbox rejections distinct from transient transport failures,
//! because registration treats the two differently.

pub mod console;
pub mod smtp;

pub use console::ConsoleMailer;
pub use smtp::{SmtpConfig, SmtpMailer};

use async_trait::async_trait;

/// Failure modes of a mail send.
#[derive(Debug, thiserror::Error)]
pub enum MailerError {
    /// The receiving server permanently rejected the recipient address.
    #[error("mailbox rejected: {0}")]
    MailboxRejected(String),

    /// Connection, timeout or any other transient delivery failure.
    #[error("mail transport failed: {0}")]
    Transport(String),

    /// The message itself could not be constructed.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}

pub type MailResult<T> = std::result::Result<T, MailerError>;

/// An email message to be sent.
#[derive(Debug, Clone)]
pub struct Email {
    pub from: String,
    pub to: String,
    pub subject: String,
    /// Plain text body (optional if html is provided)
    pub text: Option<String>,
    /// HTML body (optional if text is provided)
    pub html: Option<String>,
}

impl Email {
    pub fn new(from: impl Into<String>, to: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            subject: subject.into(),
            text: None,
            html: None,
        }
    }

    /// Set the plain text body
    #[must_use]
    pub fn text(mut self, body: impl Into<String>) -> Self {
        self.text = Some(body.into());
        self
    }

    /// Set the HTML body
    #[must_use]
    pub fn html(mut self, body: impl Into<String>) -> Self {
        self.html = Some(body.into());
        self
    }

    /// Validate the email has required fields
    pub fn validate(&self) -> MailResult<()> {
        if self.from.is_empty() {
            return Err(MailerError::InvalidMessage("'from' is required".into()));
        }
        if self.to.is_empty() {
            return Err(MailerError::InvalidMessage("'to' is required".into()));
        }
        if self.subject.is_empty() {
            return Err(MailerError::InvalidMessage("'subject' is required".into()));
        }
        if self.text.is_none() && self.html.is_none() {
            return Err(MailerError::InvalidMessage(
                "either 'text' or 'html' body is required".into(),
            ));
        }
        Ok(())
    }
}

/// Mailer trait for sending emails
///
/// Implement this trait to plug in a custom delivery backend.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Send an email.
    async fn send(&self, email: &Email) -> MailResult<()>;

    /// Check if the mailer backend is healthy/connected
    fn is_healthy(&self) -> bool;
}
