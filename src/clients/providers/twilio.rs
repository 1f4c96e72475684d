use std::time::Duration;

use anyhow::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info};
use uuid::Uuid;

use super::{
    ChannelProvider, SendOutcome,
    http::{base_url, execute, fetch_json, http_client, required, str_at},
};
use crate::models::{
    provider::{BackendKind, Channel, ProviderConfig},
    status::DeliveryStatus,
};

const DEFAULT_BASE_URL: &str = "https://api.twilio.com";

/// Twilio Programmable Messaging. Serves SMS and, with the `whatsapp:`
/// address prefix, WhatsApp. Authenticates with the account SID and auth
/// token as a basic-auth pair.
pub struct TwilioProvider {
    provider_id: Uuid,
    kind: BackendKind,
    http_client: Client,
    base_url: String,
    account_sid: String,
    auth_token: String,
    from_address: String,
}

impl TwilioProvider {
    pub fn from_config(config: &ProviderConfig, timeout: Duration) -> Result<Self, Error> {
        let account_sid = required(config, "account_sid")?.to_string();
        let auth_token = required(config, "auth_token")?.to_string();

        info!(
            provider_id = %config.id,
            tenant_id = %config.tenant_id,
            kind = %config.backend_kind,
            "Twilio provider initialized"
        );

        Ok(Self {
            provider_id: config.id,
            kind: config.backend_kind,
            http_client: http_client(timeout)?,
            base_url: base_url(config, DEFAULT_BASE_URL),
            account_sid,
            auth_token,
            from_address: config.from_address.clone(),
        })
    }

    fn address(&self, number: &str) -> String {
        match self.kind.channel() {
            Channel::WhatsApp if !number.starts_with("whatsapp:") => format!("whatsapp:{}", number),
            _ => number.to_string(),
        }
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.base_url, self.account_sid
        )
    }
}

#[async_trait]
impl ChannelProvider for TwilioProvider {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn provider_id(&self) -> Uuid {
        self.provider_id
    }

    async fn send(&self, recipient: &str, text: &str) -> SendOutcome {
        debug!(provider_id = %self.provider_id, kind = %self.kind, "Sending Twilio message");

        let to = self.address(recipient);
        let from = self.address(&self.from_address);
        let form = [("To", to.as_str()), ("From", from.as_str()), ("Body", text)];

        let request = self
            .http_client
            .post(self.messages_url())
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&form);

        let body = match execute(request, "twilio").await {
            Ok(body) => body,
            Err(outcome) => return outcome,
        };

        let sid = str_at(&body, "/sid").map(str::to_string);

        match str_at(&body, "/status") {
            Some("failed") | Some("undelivered") => SendOutcome::permanent(format!(
                "twilio rejected message: {}",
                str_at(&body, "/error_message").unwrap_or("unknown error")
            )),
            Some("sent") | Some("delivered") => SendOutcome::sent(sid),
            _ => SendOutcome::accepted(sid),
        }
    }

    async fn get_status(&self, provider_message_id: &str) -> DeliveryStatus {
        let url = format!(
            "{}/2010-04-01/Accounts/{}/Messages/{}.json",
            self.base_url, self.account_sid, provider_message_id
        );

        let request = self
            .http_client
            .get(url)
            .basic_auth(&self.account_sid, Some(&self.auth_token));

        match fetch_json(request, "twilio").await {
            Some(body) => match str_at(&body, "/status") {
                Some("delivered") | Some("read") => DeliveryStatus::Delivered,
                Some("failed") | Some("undelivered") => DeliveryStatus::Failed,
                _ => DeliveryStatus::Sent,
            },
            None => DeliveryStatus::Sent,
        }
    }
}
