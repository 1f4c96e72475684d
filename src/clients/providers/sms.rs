use std::time::Duration;

use anyhow::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use super::{
    ChannelProvider, SendOutcome,
    http::{base_url, digits, execute, fetch_json, http_client, required, str_at},
};
use crate::models::{
    provider::{BackendKind, ProviderConfig},
    status::DeliveryStatus,
};

const VONAGE_BASE_URL: &str = "https://rest.nexmo.com";
const MESSAGEBIRD_BASE_URL: &str = "https://rest.messagebird.com";
const PLIVO_BASE_URL: &str = "https://api.plivo.com";
const INFOBIP_BASE_URL: &str = "https://api.infobip.com";

/// Vonage (Nexmo) SMS API. The key pair travels in the form body, and a
/// 200 response can still carry a per-message error status.
pub struct VonageProvider {
    provider_id: Uuid,
    http_client: Client,
    base_url: String,
    api_key: String,
    api_secret: String,
    from_address: String,
}

impl VonageProvider {
    pub fn from_config(config: &ProviderConfig, timeout: Duration) -> Result<Self, Error> {
        let api_key = required(config, "api_key")?.to_string();
        let api_secret = required(config, "api_secret")?.to_string();

        info!(provider_id = %config.id, tenant_id = %config.tenant_id, "Vonage provider initialized");

        Ok(Self {
            provider_id: config.id,
            http_client: http_client(timeout)?,
            base_url: base_url(config, VONAGE_BASE_URL),
            api_key,
            api_secret,
            from_address: config.from_address.clone(),
        })
    }
}

#[async_trait]
impl ChannelProvider for VonageProvider {
    fn kind(&self) -> BackendKind {
        BackendKind::Vonage
    }

    fn provider_id(&self) -> Uuid {
        self.provider_id
    }

    async fn send(&self, recipient: &str, text: &str) -> SendOutcome {
        debug!(provider_id = %self.provider_id, "Sending Vonage SMS");

        let to = digits(recipient);
        let form = [
            ("api_key", self.api_key.as_str()),
            ("api_secret", self.api_secret.as_str()),
            ("from", self.from_address.as_str()),
            ("to", to.as_str()),
            ("text", text),
        ];

        let request = self
            .http_client
            .post(format!("{}/sms/json", self.base_url))
            .form(&form);

        let body = match execute(request, "vonage").await {
            Ok(body) => body,
            Err(outcome) => return outcome,
        };

        let error_text = str_at(&body, "/messages/0/error-text").unwrap_or("unknown error");

        // "0" is success, "1" is throttling; everything else is a rejection.
        match str_at(&body, "/messages/0/status") {
            Some("0") => SendOutcome::sent(str_at(&body, "/messages/0/message-id").map(str::to_string)),
            Some("1") => SendOutcome::transient(format!("vonage throttled: {}", error_text)),
            Some(code) => {
                SendOutcome::permanent(format!("vonage rejected message ({}): {}", code, error_text))
            }
            None => SendOutcome::permanent("vonage returned no message status"),
        }
    }

    async fn get_status(&self, _provider_message_id: &str) -> DeliveryStatus {
        DeliveryStatus::Sent
    }
}

/// MessageBird REST API, authenticated with an `AccessKey` authorization header.
pub struct MessageBirdProvider {
    provider_id: Uuid,
    http_client: Client,
    base_url: String,
    access_key: String,
    from_address: String,
}

impl MessageBirdProvider {
    pub fn from_config(config: &ProviderConfig, timeout: Duration) -> Result<Self, Error> {
        let access_key = required(config, "access_key")?.to_string();

        info!(provider_id = %config.id, tenant_id = %config.tenant_id, "MessageBird provider initialized");

        Ok(Self {
            provider_id: config.id,
            http_client: http_client(timeout)?,
            base_url: base_url(config, MESSAGEBIRD_BASE_URL),
            access_key,
            from_address: config.from_address.clone(),
        })
    }

    fn authorization(&self) -> String {
        format!("AccessKey {}", self.access_key)
    }
}

#[async_trait]
impl ChannelProvider for MessageBirdProvider {
    fn kind(&self) -> BackendKind {
        BackendKind::MessageBird
    }

    fn provider_id(&self) -> Uuid {
        self.provider_id
    }

    async fn send(&self, recipient: &str, text: &str) -> SendOutcome {
        debug!(provider_id = %self.provider_id, "Sending MessageBird SMS");

        let request = self
            .http_client
            .post(format!("{}/messages", self.base_url))
            .header(reqwest::header::AUTHORIZATION, self.authorization())
            .json(&json!({
                "originator": self.from_address,
                "recipients": [digits(recipient)],
                "body": text
            }));

        match execute(request, "messagebird").await {
            Ok(body) => SendOutcome::sent(str_at(&body, "/id").map(str::to_string)),
            Err(outcome) => outcome,
        }
    }

    async fn get_status(&self, provider_message_id: &str) -> DeliveryStatus {
        let request = self
            .http_client
            .get(format!("{}/messages/{}", self.base_url, provider_message_id))
            .header(reqwest::header::AUTHORIZATION, self.authorization());

        match fetch_json(request, "messagebird").await {
            Some(body) => match str_at(&body, "/recipients/items/0/status") {
                Some("delivered") => DeliveryStatus::Delivered,
                Some("delivery_failed") | Some("expired") => DeliveryStatus::Failed,
                _ => DeliveryStatus::Sent,
            },
            None => DeliveryStatus::Sent,
        }
    }
}

/// Plivo Message API, authenticated with the auth id and token as basic auth.
pub struct PlivoProvider {
    provider_id: Uuid,
    http_client: Client,
    base_url: String,
    auth_id: String,
    auth_token: String,
    from_address: String,
}

impl PlivoProvider {
    pub fn from_config(config: &ProviderConfig, timeout: Duration) -> Result<Self, Error> {
        let auth_id = required(config, "auth_id")?.to_string();
        let auth_token = required(config, "auth_token")?.to_string();

        info!(provider_id = %config.id, tenant_id = %config.tenant_id, "Plivo provider initialized");

        Ok(Self {
            provider_id: config.id,
            http_client: http_client(timeout)?,
            base_url: base_url(config, PLIVO_BASE_URL),
            auth_id,
            auth_token,
            from_address: config.from_address.clone(),
        })
    }
}

#[async_trait]
impl ChannelProvider for PlivoProvider {
    fn kind(&self) -> BackendKind {
        BackendKind::Plivo
    }

    fn provider_id(&self) -> Uuid {
        self.provider_id
    }

    async fn send(&self, recipient: &str, text: &str) -> SendOutcome {
        debug!(provider_id = %self.provider_id, "Sending Plivo SMS");

        let url = format!("{}/v1/Account/{}/Message/", self.base_url, self.auth_id);
        let request = self
            .http_client
            .post(url)
            .basic_auth(&self.auth_id, Some(&self.auth_token))
            .json(&json!({
                "src": self.from_address,
                "dst": digits(recipient),
                "text": text
            }));

        match execute(request, "plivo").await {
            Ok(body) => SendOutcome::accepted(str_at(&body, "/message_uuid/0").map(str::to_string)),
            Err(outcome) => outcome,
        }
    }

    async fn get_status(&self, provider_message_id: &str) -> DeliveryStatus {
        let url = format!(
            "{}/v1/Account/{}/Message/{}/",
            self.base_url, self.auth_id, provider_message_id
        );
        let request = self
            .http_client
            .get(url)
            .basic_auth(&self.auth_id, Some(&self.auth_token));

        match fetch_json(request, "plivo").await {
            Some(body) => match str_at(&body, "/message_state") {
                Some("delivered") => DeliveryStatus::Delivered,
                Some("failed") | Some("undelivered") | Some("rejected") => DeliveryStatus::Failed,
                _ => DeliveryStatus::Sent,
            },
            None => DeliveryStatus::Sent,
        }
    }
}

/// Infobip SMS API, authenticated with an `App` API key header.
pub struct InfobipProvider {
    provider_id: Uuid,
    http_client: Client,
    base_url: String,
    api_key: String,
    from_address: String,
}

impl InfobipProvider {
    pub fn from_config(config: &ProviderConfig, timeout: Duration) -> Result<Self, Error> {
        let api_key = required(config, "api_key")?.to_string();

        info!(provider_id = %config.id, tenant_id = %config.tenant_id, "Infobip provider initialized");

        Ok(Self {
            provider_id: config.id,
            http_client: http_client(timeout)?,
            base_url: base_url(config, INFOBIP_BASE_URL),
            api_key,
            from_address: config.from_address.clone(),
        })
    }
}

#[async_trait]
impl ChannelProvider for InfobipProvider {
    fn kind(&self) -> BackendKind {
        BackendKind::Infobip
    }

    fn provider_id(&self) -> Uuid {
        self.provider_id
    }

    async fn send(&self, recipient: &str, text: &str) -> SendOutcome {
        debug!(provider_id = %self.provider_id, "Sending Infobip SMS");

        let request = self
            .http_client
            .post(format!("{}/sms/2/text/advanced", self.base_url))
            .header(reqwest::header::AUTHORIZATION, format!("App {}", self.api_key))
            .json(&json!({
                "messages": [{
                    "from": self.from_address,
                    "destinations": [{ "to": digits(recipient) }],
                    "text": text
                }]
            }));

        let body = match execute(request, "infobip").await {
            Ok(body) => body,
            Err(outcome) => return outcome,
        };

        let message_id = str_at(&body, "/messages/0/messageId").map(str::to_string);

        match str_at(&body, "/messages/0/status/groupName") {
            Some("REJECTED") => SendOutcome::permanent(format!(
                "infobip rejected message: {}",
                str_at(&body, "/messages/0/status/description").unwrap_or("unknown reason")
            )),
            _ => SendOutcome::accepted(message_id),
        }
    }

    // Delivery reports are pushed, not polled.
    async fn get_status(&self, _provider_message_id: &str) -> DeliveryStatus {
        DeliveryStatus::Sent
    }
}
