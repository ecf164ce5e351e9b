//! Shared test doubles used across unit test modules.

use crate::gateway::{GatewayError, MessageId, NotificationGateway};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

/// Gateway that records every send and fails for selected recipients.
#[derive(Debug, Default)]
pub struct RecordingGateway {
    sent: Mutex<Vec<(String, String)>>,
    failing: Mutex<HashSet<String>>,
    delay: Option<Duration>,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold every send for `delay` before recording it.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn fail_for(&self, recipient: &str) {
        self.failing
            .lock()
            .expect("failing lock")
            .insert(recipient.to_owned());
    }

    pub fn recover(&self, recipient: &str) {
        self.failing.lock().expect("failing lock").remove(recipient);
    }

    /// Every successful `(recipient, text)` pair in send order.
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().expect("sent lock").clone()
    }

    /// Recipients that successfully received exactly `text`.
    pub fn recipients_of(&self, text: &str) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|(_, body)| body == text)
            .map(|(recipient, _)| recipient)
            .collect()
    }
}

#[async_trait]
impl NotificationGateway for RecordingGateway {
    fn id(&self) -> &'static str {
        "recording"
    }

    async fn send(&self, recipient: &str, text: &str) -> Result<MessageId, GatewayError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self
            .failing
            .lock()
            .expect("failing lock")
            .contains(recipient)
        {
            return Err(GatewayError::Rejected {
                status: 503,
                body: format!("simulated failure for {recipient}"),
            });
        }
        let mut sent = self.sent.lock().expect("sent lock");
        sent.push((recipient.to_owned(), text.to_owned()));
        Ok(MessageId(format!("SM{:04}", sent.len())))
    }
}
