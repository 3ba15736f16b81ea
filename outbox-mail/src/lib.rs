//! SMTP transport boundary for OutBox.
//!
//! The dispatcher only ever talks to the [`Transport`] trait: give it
//! an [`OutboundEmail`], get back a [`SendOutcome`] or an error. Any
//! error is a transport failure from the scheduler's point of view and
//! feeds the queue's retry machinery.
//!
//! [`SmtpTransport`] is the production implementation over lettre's
//! async SMTP client; [`MockTransport`] records sends and scripts
//! failures for tests.
//!
//! ## Quick Start
//!
//! ```no_run
//! use outbox_mail::{OutboundEmail, SmtpConfig, SmtpTransport, Transport};
//!
//! # async fn example() -> outbox_mail::MailResult<()> {
//! let config = SmtpConfig::new("smtp.example.com")
//!     .credentials("user", "pass")
//!     .default_from("no-reply@example.com");
//! let transport = SmtpTransport::new(config).await?;
//!
//! let outcome = transport
//!     .send(&OutboundEmail::new("someone@example.com", "Hello", "<p>Hi</p>"))
//!     .await?;
//! println!("delivered as {}", outcome.message_id);
//! # Ok(())
//! # }
//! ```

pub mod email;
pub mod error;
pub mod mock;
pub mod transport;

pub use email::{OutboundEmail, SendOutcome, validate_mailbox};
pub use error::{MailError, MailResult};
pub use mock::MockTransport;
pub use transport::{SmtpConfig, SmtpSecurity, SmtpTransport, Transport};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::email::{OutboundEmail, SendOutcome};
    pub use crate::error::{MailError, MailResult};
    pub use crate::mock::MockTransport;
    pub use crate::transport::{SmtpConfig, SmtpSecurity, SmtpTransport, Transport};
}
