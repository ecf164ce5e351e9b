//! Outbound messaging gateway.
//!
//! The survey core only sees [`NotificationGateway::send`]. Failures are
//! reported per recipient and never retried here; the scheduler's cadence is
//! the retry.

pub mod twilio;

use crate::config::GatewayConfig;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub use twilio::TwilioGateway;

/// Provider-assigned identifier of an accepted message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageId(pub String);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Why a single send failed.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("gateway credentials are not configured")]
    NotConfigured,

    #[error("gateway transport failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("gateway rejected message ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("gateway response malformed: {0}")]
    Malformed(String),
}

/// Send capability used by the survey core.
#[async_trait]
pub trait NotificationGateway: Send + Sync {
    /// Stable identifier for logs (e.g. `twilio`).
    fn id(&self) -> &'static str;

    /// Deliver `text` to `recipient`.
    async fn send(&self, recipient: &str, text: &str) -> Result<MessageId, GatewayError>;
}

/// Outcome of sending one text to several recipients.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: Vec<(String, MessageId)>,
    pub failed: Vec<String>,
}

impl DispatchReport {
    /// True when nothing failed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn attempted(&self) -> usize {
        self.delivered.len() + self.failed.len()
    }
}

/// Send `text` to each recipient in order, logging and collecting failures.
pub async fn dispatch(
    gateway: &dyn NotificationGateway,
    recipients: &[String],
    text: &str,
) -> DispatchReport {
    let mut report = DispatchReport::default();
    for recipient in recipients {
        match gateway.send(recipient, text).await {
            Ok(id) => {
                info!(gateway = gateway.id(), recipient = %recipient, sid = %id, "message sent");
                report.delivered.push((recipient.clone(), id));
            }
            Err(e) => {
                warn!(gateway = gateway.id(), recipient = %recipient, "send failed: {e}");
                report.failed.push(recipient.clone());
            }
        }
    }
    report
}

/// Run [`dispatch`] on its own task.
///
/// The broadcast completes even if the caller is dropped or aborted, which
/// matters once the closing claim has been persisted.
pub fn spawn_dispatch(
    gateway: Arc<dyn NotificationGateway>,
    recipients: Vec<String>,
    text: String,
) -> JoinHandle<DispatchReport> {
    tokio::spawn(async move { dispatch(gateway.as_ref(), &recipients, &text).await })
}

/// Gateway that only logs; used when no credentials are configured.
#[derive(Debug, Default)]
pub struct LogOnlyGateway {
    sent: AtomicU64,
}

impl LogOnlyGateway {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NotificationGateway for LogOnlyGateway {
    fn id(&self) -> &'static str {
        "log-only"
    }

    async fn send(&self, recipient: &str, text: &str) -> Result<MessageId, GatewayError> {
        let n = self.sent.fetch_add(1, Ordering::Relaxed).saturating_add(1);
        info!(recipient = %recipient, "gateway not configured; would send: {text}");
        Ok(MessageId(format!("log-only-{n}")))
    }
}

/// Gateway for the configured credentials.
///
/// Falls back to [`LogOnlyGateway`] when credentials are missing so the
/// service can still be exercised locally.
pub fn from_config(config: &GatewayConfig) -> Arc<dyn NotificationGateway> {
    if config.has_credentials() {
        Arc::new(TwilioGateway::new(config))
    } else {
        warn!("gateway credentials missing; outbound messages will only be logged");
        Arc::new(LogOnlyGateway::new())
    }
}
