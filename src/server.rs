//! HTTP surface: health, status, admin triggers and the inbound webhook.

use crate::survey::{ManualSend, SurveyService};
use axum::extract::{Form, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use std::future::Future;
use std::sync::Arc;

/// Form fields posted by the messaging provider. Anything else is ignored.
#[derive(Debug, Default, serde::Deserialize)]
struct IncomingForm {
    #[serde(rename = "From", default)]
    from: Option<String>,
    #[serde(rename = "Body", default)]
    body: Option<String>,
}

/// Routes backed by `service`.
pub fn router(service: Arc<SurveyService>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/reset-status", get(reset_status))
        .route("/send-test", get(send_test))
        .route("/incoming", post(incoming))
        .with_state(service)
}

/// Serve `service` on `listener` until `shutdown` resolves.
///
/// # Errors
///
/// Returns the listener's I/O error if serving fails.
pub async fn serve<F>(
    listener: tokio::net::TcpListener,
    service: Arc<SurveyService>,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        tracing::info!("pingback listening on http://{addr}");
    }
    axum::serve(listener, router(service))
        .with_graceful_shutdown(shutdown)
        .await
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok"
    }))
}

async fn status(State(service): State<Arc<SurveyService>>) -> impl IntoResponse {
    Json(service.status())
}

async fn reset_status(State(service): State<Arc<SurveyService>>) -> impl IntoResponse {
    match service.reset().await {
        Ok(()) => (StatusCode::OK, Json(serde_json::json!({"status": "reset"}))),
        Err(e) => {
            tracing::error!("reset failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": e.to_string()})),
            )
        }
    }
}

async fn send_test(State(service): State<Arc<SurveyService>>) -> impl IntoResponse {
    let status = match service.send_manual().await {
        ManualSend::AlreadyAnswered => "already_answered",
        ManualSend::Sent(_) => "sent_manual",
    };
    Json(serde_json::json!({ "status": status }))
}

// Always 200 so the provider does not redeliver.
async fn incoming(
    State(service): State<Arc<SurveyService>>,
    Form(form): Form<IncomingForm>,
) -> impl IntoResponse {
    let from = form.from.unwrap_or_default();
    let body = form.body.unwrap_or_default();
    if let Err(e) = service.acknowledge(&from, &body).await {
        tracing::error!(sender = %from.trim(), "failed to record inbound message: {e}");
    }
    (StatusCode::OK, "OK")
}
