pub mod dedupe;
pub mod email;
pub mod telegram;

use crate::config::OperatorConfig;
use crate::metrics;
use crate::net::ConnectivityProbe;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub use dedupe::LogRegistry;
pub use email::{EmailConfig, EmailNotifier};
pub use telegram::{TelegramConfig, TelegramNotifier};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

/// One operator-facing message. The subject is short; the message carries
/// the details.
#[derive(Debug, Clone)]
pub struct Notification {
    pub subject: String,
    pub message: String,
    pub severity: Severity,
    /// Ask the email transport for a STARTTLS session.
    pub use_tls: bool,
}

impl Notification {
    pub fn new(subject: impl Into<String>, message: impl Into<String>, severity: Severity) -> Self {
        Self {
            subject: subject.into(),
            message: message.into(),
            severity,
            use_tls: false,
        }
    }
}

/// A delivery channel for notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<()>;
    fn name(&self) -> &'static str;
}

/// The deduplicated notification sink.
///
/// Every message passes the log registry first; repeats are dropped until
/// the log id for that `(handler, image)` changes. Distinct messages always
/// reach stdout. The email and Telegram transports run fire-and-forget and
/// only when the internet probe answers positively; a transport failure is
/// logged and never fails the caller.
pub struct NotificationSink {
    registry: LogRegistry,
    transports: Vec<Arc<dyn Notifier>>,
    probe: Arc<ConnectivityProbe>,
}

impl NotificationSink {
    pub fn new(config: &OperatorConfig, probe: Arc<ConnectivityProbe>) -> Self {
        let mut transports: Vec<Arc<dyn Notifier>> = Vec::new();

        if let Some(email) = &config.email {
            transports.push(Arc::new(EmailNotifier::new(email.clone())));
        }
        if let Some(telegram) = &config.telegram {
            match TelegramNotifier::new(telegram.clone()) {
                Ok(notifier) => transports.push(Arc::new(notifier)),
                Err(e) => error!("failed to create Telegram notifier: {}", e),
            }
        }

        info!(
            "notification sink initialized with {} transport(s)",
            transports.len()
        );

        Self {
            registry: LogRegistry::new("json"),
            transports,
            probe,
        }
    }

    /// Emit unless the `(handler, image, log)` triple repeats the previous
    /// emission for that image.
    pub async fn emit(
        &self,
        handler_id: &str,
        image_id: &str,
        log_id: &str,
        notification: Notification,
    ) {
        if !self.registry.is_distinct(handler_id, image_id, log_id) {
            debug!(
                handler = handler_id,
                image = image_id,
                log = log_id,
                "suppressed repeated notification"
            );
            return;
        }

        log_stdout(&notification);
        metrics::NOTIFICATIONS_EMITTED.inc();

        if self.transports.is_empty() || !self.probe.is_online().await {
            return;
        }

        for transport in &self.transports {
            let transport = transport.clone();
            let notification = notification.clone();
            tokio::spawn(async move {
                if let Err(e) = transport.send(&notification).await {
                    // Transport trouble goes to stdout only.
                    error!(
                        "notification transport {} failed: {:#}",
                        transport.name(),
                        e
                    );
                    metrics::NOTIFICATION_TRANSPORT_FAILURES.inc();
                }
            });
        }
    }
}

fn log_stdout(notification: &Notification) {
    match notification.severity {
        Severity::Info => info!("{}: {}", notification.subject, notification.message),
        Severity::Warning => warn!("{}: {}", notification.subject, notification.message),
        Severity::Error | Severity::Critical => {
            error!("{}: {}", notification.subject, notification.message)
        },
    }
}
