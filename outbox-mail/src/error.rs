//! Error types for mail transport.

use thiserror::Error;

/// Result type for mail operations.
pub type MailResult<T> = Result<T, MailError>;

/// Mail transport errors. The scheduler treats every variant as a
/// transport failure eligible for queue-level retry.
#[derive(Debug, Error)]
pub enum MailError {
    /// Invalid mailbox address
    #[error("Invalid address: {0}")]
    Address(String),

    /// Message could not be built
    #[error("Message build error: {0}")]
    Build(String),

    /// SMTP protocol or connection error
    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    /// Transport-level failure (mock or custom transports)
    #[error("Transport error: {0}")]
    Transport(String),
}
