//! Building the service from configuration.

use pingback::config::PingbackConfig;
use pingback::scheduler::TickOutcome;
use pingback::{PingbackError, SurveyService};

#[test]
fn test_from_config_rejects_missing_recipients() {
    let result = SurveyService::from_config(&PingbackConfig::default());
    assert!(matches!(result, Err(PingbackError::Config(_))));
}

#[tokio::test]
async fn test_toml_file_drives_service_without_credentials() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("config.toml");
    let status_path = dir.path().join("state").join("status.json");
    std::fs::write(
        &config_path,
        format!(
            r#"
            [survey]
            recipients = ["whatsapp:+15550001", "whatsapp:+15550002"]
            reminder_interval_secs = 60

            [store]
            path = "{}"
            "#,
            status_path.display()
        ),
    )
    .unwrap();

    let mut config = PingbackConfig::from_file(&config_path).unwrap();
    config
        .apply_env_with(|key| (key == "PINGBACK_POLICY").then(|| "all".to_owned()))
        .unwrap();
    let service = SurveyService::from_config(&config).unwrap();
    assert_eq!(service.scheduler().interval().as_secs(), 60);

    // No credentials: the log-only gateway accepts every send.
    let outcome = service.scheduler().run_tick().await.unwrap();
    let TickOutcome::InitialPromptSent(report) = outcome else {
        panic!("expected initial prompt, got {outcome:?}");
    };
    assert!(report.is_complete());
    assert_eq!(report.delivered.len(), 2);
    assert!(status_path.exists());

    service.acknowledge("whatsapp:+15550001", "yes").await.unwrap();
    assert!(!service.status().answered, "all policy needs both recipients");
}
