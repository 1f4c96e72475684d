use std::time::Duration;

use anyhow::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::{debug, info};
use uuid::Uuid;

use super::{
    ChannelProvider, SendOutcome,
    http::{base_url, digits, execute, http_client, required, str_at},
};
use crate::models::{
    provider::{BackendKind, ProviderConfig},
    status::DeliveryStatus,
};

const META_BASE_URL: &str = "https://graph.facebook.com/v21.0";
const DIALOG360_BASE_URL: &str = "https://waba-v2.360dialog.io";

/// Cloud API text message body, shared by Meta and 360dialog.
fn text_message(recipient: &str, text: &str) -> Value {
    json!({
        "messaging_product": "whatsapp",
        "recipient_type": "individual",
        "to": digits(recipient),
        "type": "text",
        "text": {
            "preview_url": false,
            "body": text
        }
    })
}

fn message_id(body: &Value) -> Option<String> {
    str_at(body, "/messages/0/id").map(str::to_string)
}

/// WhatsApp Business Cloud API, authenticated with a bearer access token.
pub struct MetaCloudProvider {
    provider_id: Uuid,
    http_client: Client,
    base_url: String,
    access_token: String,
    phone_number_id: String,
}

impl MetaCloudProvider {
    pub fn from_config(config: &ProviderConfig, timeout: Duration) -> Result<Self, Error> {
        let access_token = required(config, "access_token")?.to_string();
        let phone_number_id = config
            .credential("phone_number_id")
            .unwrap_or(config.from_address.as_str())
            .to_string();

        info!(provider_id = %config.id, tenant_id = %config.tenant_id, "Meta Cloud provider initialized");

        Ok(Self {
            provider_id: config.id,
            http_client: http_client(timeout)?,
            base_url: base_url(config, META_BASE_URL),
            access_token,
            phone_number_id,
        })
    }
}

#[async_trait]
impl ChannelProvider for MetaCloudProvider {
    fn kind(&self) -> BackendKind {
        BackendKind::MetaCloud
    }

    fn provider_id(&self) -> Uuid {
        self.provider_id
    }

    async fn send(&self, recipient: &str, text: &str) -> SendOutcome {
        debug!(provider_id = %self.provider_id, "Sending WhatsApp Cloud API message");

        let url = format!("{}/{}/messages", self.base_url, self.phone_number_id);
        let request = self
            .http_client
            .post(url)
            .bearer_auth(&self.access_token)
            .json(&text_message(recipient, text));

        match execute(request, "meta_cloud").await {
            Ok(body) => SendOutcome::sent(message_id(&body)),
            Err(outcome) => outcome,
        }
    }

    // Delivery receipts only arrive by webhook.
    async fn get_status(&self, _provider_message_id: &str) -> DeliveryStatus {
        DeliveryStatus::Sent
    }
}

/// 360dialog WhatsApp API, authenticated with the `D360-API-KEY` header.
pub struct Dialog360Provider {
    provider_id: Uuid,
    http_client: Client,
    base_url: String,
    api_key: String,
}

impl Dialog360Provider {
    pub fn from_config(config: &ProviderConfig, timeout: Duration) -> Result<Self, Error> {
        let api_key = required(config, "api_key")?.to_string();

        info!(provider_id = %config.id, tenant_id = %config.tenant_id, "360dialog provider initialized");

        Ok(Self {
            provider_id: config.id,
            http_client: http_client(timeout)?,
            base_url: base_url(config, DIALOG360_BASE_URL),
            api_key,
        })
    }
}

#[async_trait]
impl ChannelProvider for Dialog360Provider {
    fn kind(&self) -> BackendKind {
        BackendKind::Dialog360
    }

    fn provider_id(&self) -> Uuid {
        self.provider_id
    }

    async fn send(&self, recipient: &str, text: &str) -> SendOutcome {
        debug!(provider_id = %self.provider_id, "Sending 360dialog message");

        let request = self
            .http_client
            .post(format!("{}/messages", self.base_url))
            .header("D360-API-KEY", &self.api_key)
            .json(&text_message(recipient, text));

        match execute(request, "dialog360").await {
            Ok(body) => SendOutcome::sent(message_id(&body)),
            Err(outcome) => outcome,
        }
    }

    async fn get_status(&self, _provider_message_id: &str) -> DeliveryStatus {
        DeliveryStatus::Sent
    }
}
