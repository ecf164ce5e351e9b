//! HTTP surface exercised over a real listener.

use crate::helpers::{file_backed_service, two_recipient_config};
use pingback::SurveyService;
use pingback::config::MessagesConfig;
use serde_json::{Value, json};
use std::sync::Arc;

async fn spawn(service: Arc<SurveyService>) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        pingback::server::serve(listener, service, std::future::pending())
            .await
            .unwrap();
    });
    base
}

async fn get_json(url: String) -> Value {
    reqwest::get(url).await.unwrap().json().await.unwrap()
}

async fn post_incoming(base: &str, form: &[(&str, &str)]) -> (reqwest::StatusCode, String) {
    let response = reqwest::Client::new()
        .post(format!("{base}/incoming"))
        .form(form)
        .send()
        .await
        .unwrap();
    (response.status(), response.text().await.unwrap())
}

#[tokio::test]
async fn test_webhook_flow_updates_status() {
    let (service, gateway, _dir) = file_backed_service(&two_recipient_config());
    let base = spawn(Arc::clone(&service)).await;

    assert_eq!(get_json(format!("{base}/health")).await, json!({"status": "ok"}));

    let (status, body) = post_incoming(&base, &[("From", "A"), ("Body", "No")]).await;
    assert_eq!(status, reqwest::StatusCode::OK);
    assert_eq!(body, "OK");

    let state = get_json(format!("{base}/status")).await;
    assert_eq!(state["responses"]["A"], "no");
    assert_eq!(state["answered"], false);

    post_incoming(&base, &[("From", "B"), ("Body", "Yes!"), ("MessageSid", "SMx")]).await;
    let state = get_json(format!("{base}/status")).await;
    assert_eq!(state["answered"], true);
    assert_eq!(
        gateway.recipients_of(&MessagesConfig::default().closing),
        vec!["A", "B"]
    );
}

#[tokio::test]
async fn test_send_test_reports_answered_state() {
    let (service, gateway, _dir) = file_backed_service(&two_recipient_config());
    let base = spawn(Arc::clone(&service)).await;
    let manual = MessagesConfig::default().manual_reminder;

    assert_eq!(
        get_json(format!("{base}/send-test")).await,
        json!({"status": "sent_manual"})
    );
    assert_eq!(gateway.recipients_of(&manual), vec!["A", "B"]);

    service.acknowledge("A", "done").await.unwrap();
    assert_eq!(
        get_json(format!("{base}/send-test")).await,
        json!({"status": "already_answered"})
    );
    assert_eq!(gateway.recipients_of(&manual).len(), 2);
}

#[tokio::test]
async fn test_reset_status_clears_record() {
    let (service, _gateway, _dir) = file_backed_service(&two_recipient_config());
    let base = spawn(Arc::clone(&service)).await;
    service.acknowledge("A", "yes").await.unwrap();

    assert_eq!(
        get_json(format!("{base}/reset-status")).await,
        json!({"status": "reset"})
    );
    // The re-armed loop may already have sent the initial prompt.
    let state = get_json(format!("{base}/status")).await;
    assert_eq!(state["responses"], json!({}));
    assert_eq!(state["answered"], false);
    assert!(state.get("closingSent").is_none());
    service.shutdown().await;
}

#[tokio::test]
async fn test_incoming_is_ok_even_when_gateway_fails() {
    let (service, gateway, _dir) = file_backed_service(&two_recipient_config());
    gateway.fail_for("A");
    gateway.fail_for("B");
    let base = spawn(Arc::clone(&service)).await;

    let (status, body) = post_incoming(&base, &[("From", "A"), ("Body", "yes")]).await;
    assert_eq!((status, body.as_str()), (reqwest::StatusCode::OK, "OK"));
    assert!(service.status().answered);
}
