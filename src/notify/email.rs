use super::{Notification, Notifier};
use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

/// SMTP connection details. All five values must be configured for email
/// notifications to be active; an empty password selects a plain,
/// unauthenticated session.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub host: String,
    pub port: u16,
    pub sender: String,
    pub recipient: String,
    pub password: String,
}

impl EmailConfig {
    pub fn from_env() -> Option<Self> {
        let host = std::env::var("EMAIL_HOST").ok()?;
        let port = std::env::var("EMAIL_PORT").ok()?.parse().ok()?;
        let sender = std::env::var("EMAIL_SENDER").ok()?;
        let recipient = std::env::var("EMAIL_RECIPIENT").ok()?;
        let password = std::env::var("EMAIL_PASSWORD").ok()?;
        Some(Self {
            host,
            port,
            sender,
            recipient,
            password,
        })
    }
}

pub struct EmailNotifier {
    config: EmailConfig,
}

impl EmailNotifier {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    fn transport(&self, use_tls: bool) -> Result<AsyncSmtpTransport<Tokio1Executor>> {
        // Empty password: plain SMTP. Otherwise implicit TLS, or STARTTLS
        // when the caller asked for it.
        let transport = if self.config.password.is_empty() {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&self.config.host)
                .port(self.config.port)
                .build()
        } else {
            let credentials = Credentials::new(
                self.config.sender.clone(),
                self.config.password.clone(),
            );
            let builder = if use_tls {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.host)
                    .context("failed to configure STARTTLS session")?
            } else {
                AsyncSmtpTransport::<Tokio1Executor>::relay(&self.config.host)
                    .context("failed to configure SMTPS session")?
            };
            builder
                .port(self.config.port)
                .credentials(credentials)
                .build()
        };
        Ok(transport)
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn send(&self, notification: &Notification) -> Result<()> {
        let message = Message::builder()
            .from(
                self.config
                    .sender
                    .parse()
                    .context("EMAIL_SENDER is not a valid mailbox")?,
            )
            .to(self
                .config
                .recipient
                .parse()
                .context("EMAIL_RECIPIENT is not a valid mailbox")?)
            .subject(notification.subject.clone())
            .body(notification.message.clone())
            .context("failed to build email message")?;

        self.transport(notification.use_tls)?
            .send(message)
            .await
            .context("SMTP delivery failed")?;

        Ok(())
    }

    fn name(&self) -> &'static str {
        "email"
    }
}
