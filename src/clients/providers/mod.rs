//! Messaging gateway backends.
//!
//! Every backend hides its own auth scheme and payload shape behind
//! [`ChannelProvider`]. Callers only ever see a [`SendOutcome`].
//!
//! - WhatsApp: Twilio, Meta Cloud API, 360dialog
//! - SMS: Twilio, Vonage, MessageBird, Plivo, Infobip

mod http;
mod sms;
mod twilio;
mod whatsapp;

pub use sms::{InfobipProvider, MessageBirdProvider, PlivoProvider, VonageProvider};
pub use twilio::TwilioProvider;
pub use whatsapp::{Dialog360Provider, MetaCloudProvider};

use std::{sync::Arc, time::Duration};

use anyhow::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{
    provider::{BackendKind, ProviderConfig},
    status::{DeliveryStatus, FailureKind, SendStatus},
};

/// Normalized answer of a single send call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendOutcome {
    pub success: bool,
    pub provider_message_id: Option<String>,
    pub status: SendStatus,
    pub error: Option<String>,
    pub failure_kind: Option<FailureKind>,
}

impl SendOutcome {
    pub fn sent(provider_message_id: Option<String>) -> Self {
        Self {
            success: true,
            provider_message_id,
            status: SendStatus::Sent,
            error: None,
            failure_kind: None,
        }
    }

    /// Accepted by the gateway but still queued on its side.
    pub fn accepted(provider_message_id: Option<String>) -> Self {
        Self {
            status: SendStatus::Pending,
            ..Self::sent(provider_message_id)
        }
    }

    pub fn transient(error: impl Into<String>) -> Self {
        Self::failed(error.into(), FailureKind::Transient)
    }

    pub fn permanent(error: impl Into<String>) -> Self {
        Self::failed(error.into(), FailureKind::Permanent)
    }

    fn failed(error: String, kind: FailureKind) -> Self {
        Self {
            success: false,
            provider_message_id: None,
            status: SendStatus::Failed,
            error: Some(error),
            failure_kind: Some(kind),
        }
    }

    pub fn is_retryable(&self) -> bool {
        !self.success && self.failure_kind == Some(FailureKind::Transient)
    }
}

/// One configured gateway for one tenant.
#[async_trait]
pub trait ChannelProvider: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Id of the `ProviderConfig` this instance was built from.
    fn provider_id(&self) -> Uuid;

    /// Never fails: every transport, auth or gateway error is folded into the outcome.
    async fn send(&self, recipient: &str, text: &str) -> SendOutcome;

    /// Best-effort delivery state. Gateways without a status endpoint answer `Sent`.
    async fn get_status(&self, provider_message_id: &str) -> DeliveryStatus;
}

/// Builds the backend described by `config`, each with its own HTTP client.
pub fn build_provider(
    config: &ProviderConfig,
    timeout: Duration,
) -> Result<Arc<dyn ChannelProvider>, Error> {
    let provider: Arc<dyn ChannelProvider> = match config.backend_kind {
        BackendKind::TwilioWhatsapp | BackendKind::TwilioSms => {
            Arc::new(TwilioProvider::from_config(config, timeout)?)
        }
        BackendKind::MetaCloud => Arc::new(MetaCloudProvider::from_config(config, timeout)?),
        BackendKind::Dialog360 => Arc::new(Dialog360Provider::from_config(config, timeout)?),
        BackendKind::Vonage => Arc::new(VonageProvider::from_config(config, timeout)?),
        BackendKind::MessageBird => Arc::new(MessageBirdProvider::from_config(config, timeout)?),
        BackendKind::Plivo => Arc::new(PlivoProvider::from_config(config, timeout)?),
        BackendKind::Infobip => Arc::new(InfobipProvider::from_config(config, timeout)?),
    };

    Ok(provider)
}
