//! Configuration types for the pingback service.
//!
//! Settings come from a TOML file (every field optional, missing ones fall
//! back to defaults) and are then overlaid with environment variables, which
//! is how gateway credentials normally reach the process.

use crate::error::{PingbackError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PingbackConfig {
    /// HTTP listener settings.
    pub server: ServerConfig,
    /// Recipients, cadence and answer policy.
    pub survey: SurveyConfig,
    /// Outbound message texts.
    pub messages: MessagesConfig,
    /// Messaging gateway credentials and sender identity.
    pub gateway: GatewayConfig,
    /// Status record persistence.
    pub store: StoreConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_owned(),
            port: 10_000,
        }
    }
}

/// Which rule decides that the survey is answered.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyKind {
    /// A single affirmative response from any recipient answers the survey.
    #[default]
    #[serde(alias = "any-affirms")]
    Any,
    /// Every configured recipient must currently hold an affirmative response.
    #[serde(alias = "all-affirm")]
    All,
}

impl std::str::FromStr for PolicyKind {
    type Err = PingbackError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "any" | "any-affirms" => Ok(Self::Any),
            "all" | "all-affirm" => Ok(Self::All),
            other => Err(PingbackError::Config(format!(
                "unknown answer policy `{other}`; expected `any` or `all`"
            ))),
        }
    }
}

/// Survey behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SurveyConfig {
    /// Recipient identifiers in gateway format (e.g. `whatsapp:+15550001111`).
    pub recipients: Vec<String>,
    /// Seconds between scheduler ticks.
    pub reminder_interval_secs: u64,
    /// Answer policy.
    pub policy: PolicyKind,
    /// Tokens classified as an affirmative acknowledgement.
    ///
    /// Matched after normalization, so `"Yes!"` in config and `" yes "` on the
    /// wire are equivalent.
    pub affirmative_tokens: Vec<String>,
    /// How long shutdown waits for the scheduler task to exit (milliseconds).
    pub stop_grace_ms: u64,
}

impl Default for SurveyConfig {
    fn default() -> Self {
        Self {
            recipients: Vec::new(),
            reminder_interval_secs: 300,
            policy: PolicyKind::Any,
            affirmative_tokens: vec![
                "yes".to_owned(),
                "y".to_owned(),
                "done".to_owned(),
                "כן".to_owned(),
            ],
            stop_grace_ms: 2_000,
        }
    }
}

impl SurveyConfig {
    /// Trimmed, de-duplicated recipient list in configuration order.
    #[must_use]
    pub fn recipient_set(&self) -> Vec<String> {
        let mut set: Vec<String> = Vec::with_capacity(self.recipients.len());
        for recipient in &self.recipients {
            let recipient = recipient.trim();
            if recipient.is_empty() || set.iter().any(|known| known == recipient) {
                continue;
            }
            set.push(recipient.to_owned());
        }
        set
    }

    pub fn reminder_interval(&self) -> Duration {
        Duration::from_secs(self.reminder_interval_secs)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }
}

/// Outbound message texts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessagesConfig {
    /// First message of a survey round.
    pub initial_prompt: String,
    /// Sent on every later tick to outstanding recipients.
    pub reminder: String,
    /// Sent by the manual `/send-test` trigger.
    pub manual_reminder: String,
    /// Broadcast once the survey is answered.
    pub closing: String,
}

impl Default for MessagesConfig {
    fn default() -> Self {
        Self {
            initial_prompt: "Has the machine finished its run? Reply 'yes' or 'no'.".to_owned(),
            reminder: "⏰ Reminder: has the machine finished its run? Reply 'yes' or 'no'."
                .to_owned(),
            manual_reminder:
                "📢 Manual reminder: has the machine finished its run? Reply 'yes' or 'no'."
                    .to_owned(),
            closing: "✅ Thanks! Have a great day 🌞".to_owned(),
        }
    }
}

/// Twilio-compatible messaging gateway settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub account_sid: String,
    pub auth_token: String,
    /// Sender identity (e.g. the WhatsApp sandbox number).
    pub from: String,
    /// API root; overridden in tests.
    pub base_url: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            account_sid: String::new(),
            auth_token: String::new(),
            from: "whatsapp:+14155238886".to_owned(),
            base_url: "https://api.twilio.com".to_owned(),
        }
    }
}

impl GatewayConfig {
    /// True when both credentials are present.
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        !self.account_sid.trim().is_empty() && !self.auth_token.trim().is_empty()
    }
}

/// Status record persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path of the JSON status file.
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("survey_status.json"),
        }
    }
}

impl PingbackConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| PingbackError::Config(e.to_string()))
    }

    /// Returns the default config file path: `~/.config/pingback/config.toml`.
    pub fn default_config_path() -> PathBuf {
        if let Some(config) = std::env::var_os("XDG_CONFIG_HOME") {
            PathBuf::from(config).join("pingback").join("config.toml")
        } else if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("pingback")
                .join("config.toml")
        } else {
            PathBuf::from("/tmp/pingback-config/config.toml")
        }
    }

    /// Overlay values from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Overlay values from an arbitrary variable lookup.
    ///
    /// Blank values are ignored so an exported-but-empty variable does not
    /// wipe a value from the file.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(sid) = get("TWILIO_ACCOUNT_SID") {
            self.gateway.account_sid = sid.trim().to_owned();
        }
        if let Some(token) = get("TWILIO_AUTH_TOKEN") {
            self.gateway.auth_token = token.trim().to_owned();
        }
        if let Some(from) = get("PINGBACK_FROM") {
            self.gateway.from = from.trim().to_owned();
        }
        if let Some(recipients) = get("PINGBACK_RECIPIENTS") {
            self.survey.recipients = recipients
                .split(',')
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(str::to_owned)
                .collect();
        }
        if let Some(secs) = get("PINGBACK_INTERVAL_SECS") {
            self.survey.reminder_interval_secs = secs.trim().parse().map_err(|e| {
                PingbackError::Config(format!("PINGBACK_INTERVAL_SECS `{secs}`: {e}"))
            })?;
        }
        if let Some(policy) = get("PINGBACK_POLICY") {
            self.survey.policy = policy.parse()?;
        }
        if let Some(path) = get("PINGBACK_STATUS_FILE") {
            self.store.path = PathBuf::from(path.trim());
        }
        if let Some(port) = get("PORT") {
            self.server.port = port
                .trim()
                .parse()
                .map_err(|e| PingbackError::Config(format!("PORT `{port}`: {e}")))?;
        }
        Ok(())
    }

    /// Reject configurations the scheduler cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.survey.recipient_set().is_empty() {
            return Err(PingbackError::Config(
                "survey.recipients must list at least one recipient".to_owned(),
            ));
        }
        if self.survey.reminder_interval_secs == 0 {
            return Err(PingbackError::Config(
                "survey.reminder_interval_secs must be greater than zero".to_owned(),
            ));
        }
        let has_token = self
            .survey
            .affirmative_tokens
            .iter()
            .any(|token| !crate::survey::normalize(token).is_empty());
        if !has_token {
            return Err(PingbackError::Config(
                "survey.affirmative_tokens must contain at least one token".to_owned(),
            ));
        }
        Ok(())
    }
}
