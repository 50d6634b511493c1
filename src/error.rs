/// The main error type for account operations
#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error("Too many login attempts, try again later")]
    RateLimited,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid email address: {0}")]
    InvalidEmail(String),

    #[error("Email already registered")]
    EmailTaken,

    #[error("Mailbox rejected the verification email")]
    InvalidMailbox,

    #[error("Failed to send email: {0}")]
    Mail(String),

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Password too weak: {0}")]
    WeakPassword(String),

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Username already taken")]
    UsernameTaken,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AccountError {
    pub fn invalid_email(msg: impl Into<String>) -> Self {
        Self::InvalidEmail(msg.into())
    }

    pub fn mail(msg: impl Into<String>) -> Self {
        Self::Mail(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn weak_password(msg: impl Into<String>) -> Self {
        Self::WeakPassword(msg.into())
    }

    pub fn invalid_format(msg: impl Into<String>) -> Self {
        Self::InvalidFormat(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns a safe error message suitable for client responses in production.
    ///
    /// Client-caused failures return the actual message since the caller needs
    /// to know what went wrong. Server-side failures return a generic message
    /// to prevent information disclosure (CWE-209); the full error is logged
    /// server-side instead.
    pub fn safe_message(&self) -> String {
        match self {
            Self::Mail(_) => "Failed to send email".to_string(),
            Self::Internal(_) => "Internal error".to_string(),
            _ => self.to_string(),
        }
    }

    /// Whether this error is caused by the caller's input rather than the
    /// server. Useful for HTTP boundaries deciding between 4xx and 5xx.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::Mail(_) | Self::Internal(_))
    }
}

/// Result type alias for account operations
pub type Result<T> = std::result::Result<T, AccountError>;

impl From<sqlx::Error> for AccountError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => AccountError::NotFound("record not found".to_string()),
            _ => AccountError::Internal(format!("database error: {}", err)),
        }
    }
}
