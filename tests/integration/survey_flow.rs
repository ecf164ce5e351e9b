//! End-to-end survey behaviour over a file-backed store.

use crate::helpers::{file_backed_service, two_recipient_config};
use pingback::config::{MessagesConfig, PolicyKind};
use pingback::scheduler::{SchedulerPhase, TickOutcome};
use pingback::survey::AckOutcome;
use pingback::SurveyState;

#[tokio::test]
async fn test_answered_by_one_recipient_closes_once() {
    let (service, gateway, dir) = file_backed_service(&two_recipient_config());
    let messages = MessagesConfig::default();

    let first = service.scheduler().run_tick().await.unwrap();
    assert!(matches!(first, TickOutcome::InitialPromptSent(_)));
    assert_eq!(gateway.recipients_of(&messages.initial_prompt), vec!["A", "B"]);

    service.acknowledge("A", "no").await.unwrap();
    let outcome = service.acknowledge("B", "  Yes! ").await.unwrap();
    assert!(matches!(outcome, AckOutcome::Closed { .. }));

    // The next tick sees the claim and stays quiet.
    let tick = service.scheduler().run_tick().await.unwrap();
    assert_eq!(tick, TickOutcome::Closed { broadcast: None });
    assert_eq!(gateway.recipients_of(&messages.closing), vec!["A", "B"]);

    let on_disk: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(dir.path().join("survey_status.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(
        on_disk,
        serde_json::json!({
            "responses": {"A": "no", "B": "yes"},
            "firstSent": true,
            "answered": true,
            "closingSent": true
        })
    );
}

#[tokio::test]
async fn test_failed_recipient_gets_reminder_next_tick() {
    let (service, gateway, _dir) = file_backed_service(&two_recipient_config());
    let messages = MessagesConfig::default();
    gateway.fail_for("A");

    let first = service.scheduler().run_tick().await.unwrap();
    let TickOutcome::InitialPromptSent(report) = first else {
        panic!("expected initial prompt, got {first:?}");
    };
    assert_eq!(report.failed, vec!["A".to_owned()]);
    assert!(service.status().first_sent);

    gateway.recover("A");
    service.scheduler().run_tick().await.unwrap();
    assert_eq!(gateway.recipients_of(&messages.reminder), vec!["A", "B"]);
}

#[tokio::test]
async fn test_all_policy_reminds_only_outstanding() {
    let mut config = two_recipient_config();
    config.survey.policy = PolicyKind::All;
    let (service, gateway, _dir) = file_backed_service(&config);
    let messages = MessagesConfig::default();

    service.scheduler().run_tick().await.unwrap();
    let ack = service.acknowledge("A", "done").await.unwrap();
    assert_eq!(ack, AckOutcome::Recorded { answered: false });

    service.scheduler().run_tick().await.unwrap();
    assert_eq!(gateway.recipients_of(&messages.reminder), vec!["B"]);

    let closing = service.acknowledge("B", "כן").await.unwrap();
    assert!(matches!(closing, AckOutcome::Closed { .. }));
}

#[tokio::test]
async fn test_reset_law_over_file_store() {
    let (service, gateway, dir) = file_backed_service(&two_recipient_config());
    service.scheduler().run_tick().await.unwrap();
    service.acknowledge("B", "y").await.unwrap();
    let sent_before = gateway.total_sent();

    service.reset().await.unwrap();
    assert_eq!(service.store().load(), SurveyState::default());
    assert_eq!(
        std::fs::read_to_string(dir.path().join("survey_status.json"))
            .unwrap()
            .parse::<serde_json::Value>()
            .unwrap(),
        serde_json::json!({"responses": {}, "firstSent": false, "answered": false})
    );

    // Re-armed: the loop sends the initial prompt again.
    let mut phases = service.scheduler().subscribe();
    tokio::time::timeout(
        std::time::Duration::from_secs(5),
        phases.wait_for(|phase| *phase == SchedulerPhase::Polling),
    )
    .await
    .expect("scheduler should reach polling")
    .unwrap();
    assert!(gateway.total_sent() >= sent_before + 2);
    service.shutdown().await;
}

#[tokio::test]
async fn test_corrupt_file_reads_as_empty_record() {
    let (service, _gateway, dir) = file_backed_service(&two_recipient_config());
    std::fs::write(dir.path().join("survey_status.json"), "{ not json").unwrap();

    assert_eq!(service.status(), SurveyState::default());
    service.acknowledge("A", "no").await.unwrap();
    assert_eq!(service.status().response_of("A"), Some("no"));
}
