use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{event::TriggerType, provider::Channel};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageTemplate {
    pub id: Uuid,
    pub tenant_id: String,
    pub trigger_type: TriggerType,
    pub language: String,
    pub channel: Option<Channel>,
    pub body_text: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl MessageTemplate {
    pub fn new(
        tenant_id: impl Into<String>,
        trigger_type: TriggerType,
        language: impl Into<String>,
        body_text: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.into(),
            trigger_type,
            language: language.into(),
            channel: None,
            body_text: body_text.into(),
            is_active: true,
            created_at: Utc::now(),
        }
    }

    /// Restricts the template to one channel.
    pub fn for_channel(mut self, channel: Channel) -> Self {
        self.channel = Some(channel);
        self
    }

    /// Channel-less templates serve both channels.
    pub fn serves(&self, channel: Channel) -> bool {
        self.channel.is_none_or(|c| c == channel)
    }
}
