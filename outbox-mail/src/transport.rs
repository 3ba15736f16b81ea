//! Email transport implementations.

use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Tokio1Executor,
    message::{Message, header::ContentType},
    transport::smtp::{PoolConfig, authentication::Credentials},
};
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use crate::email::{OutboundEmail, SendOutcome};
use crate::error::{MailError, MailResult};

/// Email transport trait.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send an email.
    async fn send(&self, email: &OutboundEmail) -> MailResult<SendOutcome>;

    /// Check if the transport is healthy.
    async fn is_healthy(&self) -> bool {
        true
    }
}

/// SMTP security mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SmtpSecurity {
    /// No encryption (port 25, not recommended).
    None,
    /// STARTTLS upgrade (port 587).
    #[default]
    StartTls,
    /// Implicit TLS (port 465).
    Tls,
}

/// SMTP configuration.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    /// SMTP server host.
    pub host: String,
    /// SMTP server port.
    pub port: u16,
    /// Security mode.
    pub security: SmtpSecurity,
    /// Username for authentication.
    pub username: Option<String>,
    /// Password for authentication.
    pub password: Option<String>,
    /// Sender used when a message does not carry one.
    pub default_from: Option<String>,
    /// Connection timeout.
    pub timeout: Duration,
    /// Maximum connections in pool.
    pub pool_size: u32,
}

impl SmtpConfig {
    /// Create a new SMTP configuration.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 587,
            security: SmtpSecurity::StartTls,
            username: None,
            password: None,
            default_from: None,
            timeout: Duration::from_secs(30),
            pool_size: 4,
        }
    }

    /// Load configuration from `OUTBOX_SMTP_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::new(
            std::env::var("OUTBOX_SMTP_HOST").unwrap_or_else(|_| "localhost".to_string()),
        );

        if let Ok(port) = std::env::var("OUTBOX_SMTP_PORT")
            && let Ok(port) = port.parse()
        {
            config.port = port;
        }

        if let Ok(mode) = std::env::var("OUTBOX_SMTP_SECURITY") {
            config.security = match mode.as_str() {
                "none" => SmtpSecurity::None,
                "tls" => SmtpSecurity::Tls,
                _ => SmtpSecurity::StartTls,
            };
        }

        if let (Ok(username), Ok(password)) = (
            std::env::var("OUTBOX_SMTP_USERNAME"),
            std::env::var("OUTBOX_SMTP_PASSWORD"),
        ) {
            config.username = Some(username);
            config.password = Some(password);
        }

        if let Ok(from) = std::env::var("OUTBOX_SMTP_FROM") {
            config.default_from = Some(from);
        }

        config
    }

    /// Set credentials.
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Set the port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Use STARTTLS security (port 587).
    pub fn starttls(mut self) -> Self {
        self.security = SmtpSecurity::StartTls;
        self.port = 587;
        self
    }

    /// Use implicit TLS security (port 465).
    pub fn tls(mut self) -> Self {
        self.security = SmtpSecurity::Tls;
        self.port = 465;
        self
    }

    /// Use no encryption (not recommended).
    pub fn insecure(mut self) -> Self {
        self.security = SmtpSecurity::None;
        self.port = 25;
        self
    }

    /// Set the default sender.
    pub fn default_from(mut self, from: impl Into<String>) -> Self {
        self.default_from = Some(from.into());
        self
    }

    /// Set the connection timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the connection pool size.
    pub fn pool_size(mut self, size: u32) -> Self {
        self.pool_size = size;
        self
    }
}

/// SMTP transport over lettre's pooled async client.
///
/// The pool means workers share cached connections: create one
/// transport at startup and hand every worker the same
/// `Arc<dyn Transport>`.
pub struct SmtpTransport {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    config: SmtpConfig,
}

impl SmtpTransport {
    /// Create a new SMTP transport.
    pub async fn new(config: SmtpConfig) -> MailResult<Self> {
        let mut builder = match config.security {
            SmtpSecurity::None => {
                AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
            }
            SmtpSecurity::StartTls => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?
            }
            SmtpSecurity::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)?,
        };

        builder = builder
            .port(config.port)
            .timeout(Some(config.timeout))
            .pool_config(PoolConfig::new().max_size(config.pool_size));

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        let transport = builder.build();

        info!(
            host = %config.host,
            port = config.port,
            security = ?config.security,
            "SMTP transport initialized"
        );

        Ok(Self { transport, config })
    }

    /// Get the configuration.
    pub fn config(&self) -> &SmtpConfig {
        &self.config
    }

    /// Test the SMTP connection.
    pub async fn test_connection(&self) -> MailResult<bool> {
        self.transport
            .test_connection()
            .await
            .map_err(MailError::from)
    }

    fn build_message(&self, email: &OutboundEmail, message_id: &str) -> MailResult<Message> {
        let from = email
            .from
            .as_deref()
            .or(self.config.default_from.as_deref())
            .ok_or_else(|| MailError::Address("no sender address configured".to_string()))?;

        Message::builder()
            .from(from
                .parse()
                .map_err(|e| MailError::Address(format!("{from}: {e}")))?)
            .to(email
                .to
                .parse()
                .map_err(|e| MailError::Address(format!("{}: {e}", email.to)))?)
            .subject(email.subject.clone())
            .message_id(Some(message_id.to_string()))
            .header(ContentType::TEXT_HTML)
            .body(email.html.clone())
            .map_err(|e| MailError::Build(e.to_string()))
    }
}

#[async_trait]
impl Transport for SmtpTransport {
    async fn send(&self, email: &OutboundEmail) -> MailResult<SendOutcome> {
        let message_id = format!("<{}@outbox>", Uuid::new_v4());
        let message = self.build_message(email, &message_id)?;

        debug!(to = %email.to, subject = %email.subject, "Sending email via SMTP");

        self.transport.send(message).await?;

        debug!(message_id = %message_id, "Email sent");
        Ok(SendOutcome {
            message_id,
            preview_url: None,
        })
    }

    async fn is_healthy(&self) -> bool {
        self.test_connection().await.unwrap_or(false)
    }
}
