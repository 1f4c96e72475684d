use std::{
    collections::HashMap,
    fmt::{Display, Formatter, Result},
};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Delivery mechanism, independent of the gateway that implements it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    WhatsApp,
    Sms,
}

impl Channel {
    pub fn from_string(s: &str) -> Option<Self> {
        match s {
            "whatsapp" => Some(Channel::WhatsApp),
            "sms" => Some(Channel::Sms),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::WhatsApp => "whatsapp",
            Channel::Sms => "sms",
        }
    }

    pub fn other(&self) -> Self {
        match self {
            Channel::WhatsApp => Channel::Sms,
            Channel::Sms => Channel::WhatsApp,
        }
    }
}

impl Display for Channel {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "{}", self.as_str())
    }
}

/// Concrete gateway integration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    TwilioWhatsapp,
    MetaCloud,
    Dialog360,
    TwilioSms,
    Vonage,
    MessageBird,
    Plivo,
    Infobip,
}

impl BackendKind {
    pub fn from_string(s: &str) -> Option<Self> {
        match s {
            "twilio_whatsapp" => Some(BackendKind::TwilioWhatsapp),
            "meta_cloud" => Some(BackendKind::MetaCloud),
            "dialog360" => Some(BackendKind::Dialog360),
            "twilio_sms" => Some(BackendKind::TwilioSms),
            "vonage" => Some(BackendKind::Vonage),
            "message_bird" => Some(BackendKind::MessageBird),
            "plivo" => Some(BackendKind::Plivo),
            "infobip" => Some(BackendKind::Infobip),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::TwilioWhatsapp => "twilio_whatsapp",
            BackendKind::MetaCloud => "meta_cloud",
            BackendKind::Dialog360 => "dialog360",
            BackendKind::TwilioSms => "twilio_sms",
            BackendKind::Vonage => "vonage",
            BackendKind::MessageBird => "message_bird",
            BackendKind::Plivo => "plivo",
            BackendKind::Infobip => "infobip",
        }
    }

    pub fn channel(&self) -> Channel {
        match self {
            BackendKind::TwilioWhatsapp | BackendKind::MetaCloud | BackendKind::Dialog360 => {
                Channel::WhatsApp
            }
            BackendKind::TwilioSms
            | BackendKind::Vonage
            | BackendKind::MessageBird
            | BackendKind::Plivo
            | BackendKind::Infobip => Channel::Sms,
        }
    }
}

impl Display for BackendKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "{}", self.as_str())
    }
}

/// Gateway configuration for one tenant and channel.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: Uuid,
    pub tenant_id: String,
    pub channel: Channel,
    pub backend_kind: BackendKind,
    pub credentials: HashMap<String, String>,
    pub from_address: String,

    /// Overrides the gateway's public API endpoint.
    #[serde(default)]
    pub base_url: Option<String>,

    pub is_active: bool,
}

impl ProviderConfig {
    pub fn new(
        tenant_id: impl Into<String>,
        backend_kind: BackendKind,
        from_address: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.into(),
            channel: backend_kind.channel(),
            backend_kind,
            credentials: HashMap::new(),
            from_address: from_address.into(),
            base_url: None,
            is_active: true,
        }
    }

    pub fn with_credential(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.credentials.insert(key.into(), value.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn credential(&self, key: &str) -> Option<&str> {
        self.credentials
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

// Credentials stay out of logs.
impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        f.debug_struct("ProviderConfig")
            .field("id", &self.id)
            .field("tenant_id", &self.tenant_id)
            .field("channel", &self.channel)
            .field("backend_kind", &self.backend_kind)
            .field("credentials", &self.credentials.keys().collect::<Vec<_>>())
            .field("from_address", &self.from_address)
            .field("base_url", &self.base_url)
            .field("is_active", &self.is_active)
            .finish()
    }
}
