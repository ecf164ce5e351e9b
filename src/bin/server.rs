//! `pingback-server`: reminder loop plus webhook listener.

use pingback::{PingbackConfig, SurveyService};
use std::sync::Arc;

fn load_config() -> anyhow::Result<PingbackConfig> {
    let explicit = std::env::var_os("PINGBACK_CONFIG").map(std::path::PathBuf::from);
    let path = explicit
        .clone()
        .unwrap_or_else(PingbackConfig::default_config_path);

    let mut config = if path.exists() {
        tracing::info!("loading config from {}", path.display());
        PingbackConfig::from_file(&path)
            .map_err(|e| anyhow::anyhow!("failed to load {}: {e}", path.display()))?
    } else if explicit.is_some() {
        anyhow::bail!("config file {} does not exist", path.display());
    } else {
        PingbackConfig::default()
    };
    config.apply_env()?;
    config.validate()?;
    Ok(config)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = load_config()?;
    let service = Arc::new(SurveyService::from_config(&config)?);
    tracing::info!(
        recipients = config.survey.recipient_set().len(),
        interval_secs = config.survey.reminder_interval_secs,
        policy = ?config.survey.policy,
        store = %config.store.path.display(),
        "pingback starting"
    );
    service.start()?;

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| anyhow::anyhow!("failed to bind {addr}: {e}"))?;
    pingback::server::serve(listener, Arc::clone(&service), shutdown_signal()).await?;

    service.shutdown().await;
    tracing::info!("pingback shut down cleanly");
    Ok(())
}
