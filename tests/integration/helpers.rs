//! Shared helpers for integration tests.

use async_trait::async_trait;
use pingback::config::PingbackConfig;
use pingback::gateway::{GatewayError, MessageId, NotificationGateway};
use pingback::survey::{Reconciler, StatusStore};
use pingback::SurveyService;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Gateway that records sends and fails for chosen recipients.
#[derive(Default)]
pub(crate) struct RecordingGateway {
    sent: Mutex<Vec<(String, String)>>,
    failing: Mutex<HashSet<String>>,
}

impl RecordingGateway {
    pub(crate) fn fail_for(&self, recipient: &str) {
        self.failing.lock().unwrap().insert(recipient.to_owned());
    }

    pub(crate) fn recover(&self, recipient: &str) {
        self.failing.lock().unwrap().remove(recipient);
    }

    pub(crate) fn recipients_of(&self, text: &str) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, body)| body == text)
            .map(|(recipient, _)| recipient.clone())
            .collect()
    }

    pub(crate) fn total_sent(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl NotificationGateway for RecordingGateway {
    fn id(&self) -> &'static str {
        "recording"
    }

    async fn send(&self, recipient: &str, text: &str) -> Result<MessageId, GatewayError> {
        if self.failing.lock().unwrap().contains(recipient) {
            return Err(GatewayError::Rejected {
                status: 503,
                body: "unavailable".to_owned(),
            });
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push((recipient.to_owned(), text.to_owned()));
        Ok(MessageId(format!("SM{}", sent.len())))
    }
}

/// Config with recipients `A` and `B` and a long interval so only explicit
/// ticks run.
pub(crate) fn two_recipient_config() -> PingbackConfig {
    let mut config = PingbackConfig::default();
    config.survey.recipients = vec!["A".to_owned(), "B".to_owned()];
    config.survey.reminder_interval_secs = 3600;
    config
}

/// Service backed by a JSON file in a fresh temp dir.
pub(crate) fn file_backed_service(
    config: &PingbackConfig,
) -> (Arc<SurveyService>, Arc<RecordingGateway>, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let store = StatusStore::json_file(dir.path().join("survey_status.json"));
    let gateway = Arc::new(RecordingGateway::default());
    let service = SurveyService::with_components(
        Arc::new(store),
        Arc::new(Reconciler::from_config(&config.survey)),
        Arc::clone(&gateway) as Arc<dyn NotificationGateway>,
        config,
    );
    (Arc::new(service), gateway, dir)
}
