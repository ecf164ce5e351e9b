//! Twilio Programmable Messaging adapter.
//!
//! One REST call per message: form-encoded `From`/`To`/`Body` posted with
//! HTTP basic auth; the created message's `sid` becomes the [`MessageId`].

use crate::config::GatewayConfig;
use crate::gateway::{GatewayError, MessageId, NotificationGateway};
use async_trait::async_trait;

/// Sender for SMS and WhatsApp numbers on one Twilio account.
#[derive(Clone)]
pub struct TwilioGateway {
    account_sid: String,
    auth_token: String,
    from: String,
    base_url: String,
    client: reqwest::Client,
}

#[derive(serde::Deserialize)]
struct CreatedMessage {
    sid: String,
}

impl TwilioGateway {
    pub fn new(config: &GatewayConfig) -> Self {
        Self {
            account_sid: config.account_sid.trim().to_owned(),
            auth_token: config.auth_token.trim().to_owned(),
            from: config.from.trim().to_owned(),
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            client: reqwest::Client::new(),
        }
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.base_url, self.account_sid
        )
    }
}

impl std::fmt::Debug for TwilioGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwilioGateway")
            .field("account_sid", &self.account_sid)
            .field("from", &self.from)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl NotificationGateway for TwilioGateway {
    fn id(&self) -> &'static str {
        "twilio"
    }

    async fn send(&self, recipient: &str, text: &str) -> Result<MessageId, GatewayError> {
        if self.account_sid.is_empty() || self.auth_token.is_empty() {
            return Err(GatewayError::NotConfigured);
        }

        let response = self
            .client
            .post(self.messages_url())
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[
                ("From", self.from.as_str()),
                ("To", recipient),
                ("Body", text),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Rejected { status, body });
        }

        let created: CreatedMessage = response
            .json()
            .await
            .map_err(|e| GatewayError::Malformed(e.to_string()))?;
        Ok(MessageId(created.sid))
    }
}
