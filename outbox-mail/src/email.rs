//! Outbound email and send outcome types.

use lettre::message::Mailbox;

use crate::error::{MailError, MailResult};

/// One message handed to a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEmail {
    /// Recipient mailbox.
    pub to: String,
    /// Subject line.
    pub subject: String,
    /// HTML body.
    pub html: String,
    /// Sender mailbox; falls back to the transport's default.
    pub from: Option<String>,
}

impl OutboundEmail {
    /// Create a message.
    pub fn new(
        to: impl Into<String>,
        subject: impl Into<String>,
        html: impl Into<String>,
    ) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            html: html.into(),
            from: None,
        }
    }

    /// Set an explicit sender.
    pub fn with_from(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }
}

/// What a successful send returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendOutcome {
    /// Message id the send went out under.
    pub message_id: String,
    /// Where to inspect the message, for transports that offer one
    /// (e.g. capture sandboxes).
    pub preview_url: Option<String>,
}

/// Check that a string parses as an RFC 5322 mailbox
/// (`Name <user@host>` or bare `user@host`).
pub fn validate_mailbox(address: &str) -> MailResult<()> {
    address
        .parse::<Mailbox>()
        .map(|_| ())
        .map_err(|e| MailError::Address(format!("{address}: {e}")))
}
