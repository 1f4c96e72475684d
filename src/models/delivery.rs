use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{event::TriggerType, provider::Channel, status::DeliveryStatus};

/// Durable record of one notification's lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryAttempt {
    pub id: Uuid,
    pub tenant_id: String,
    pub template_id: Uuid,
    pub provider_id: Uuid,
    pub recipient_id: String,
    pub recipient_phone: String,
    pub rendered_text: String,
    pub trigger_type: TriggerType,
    pub channel: Channel,
    pub correlation_key: String,
    pub status: DeliveryStatus,
    pub attempt_count: u32,
    pub provider_message_id: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DeliveryAttempt {
    pub fn apply(&mut self, update: &AttemptUpdate, now: DateTime<Utc>) {
        self.status = update.status;
        self.attempt_count = update.attempt_count;
        if update.provider_message_id.is_some() {
            self.provider_message_id = update.provider_message_id.clone();
        }
        if update.sent_at.is_some() {
            self.sent_at = update.sent_at;
        }
        self.error_message = update.error_message.clone();
        self.next_attempt_at = update.next_attempt_at;
        self.updated_at = now;
    }
}

#[derive(Debug, Clone)]
pub struct CreateDeliveryAttempt {
    pub tenant_id: String,
    pub template_id: Uuid,
    pub provider_id: Uuid,
    pub recipient_id: String,
    pub recipient_phone: String,
    pub rendered_text: String,
    pub trigger_type: TriggerType,
    pub channel: Channel,
    pub correlation_key: String,
    pub status: DeliveryStatus,
    pub error_message: Option<String>,
}

impl CreateDeliveryAttempt {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tenant_id: String,
        template_id: Uuid,
        provider_id: Uuid,
        recipient_id: String,
        recipient_phone: String,
        rendered_text: String,
        trigger_type: TriggerType,
        channel: Channel,
        correlation_key: String,
    ) -> Self {
        Self {
            tenant_id,
            template_id,
            provider_id,
            recipient_id,
            recipient_phone,
            rendered_text,
            trigger_type,
            channel,
            correlation_key,
            status: DeliveryStatus::InProgress,
            error_message: None,
        }
    }

    /// Records a delivery that failed before any send was made.
    pub fn failed_with(mut self, error: String) -> Self {
        self.status = DeliveryStatus::Failed;
        self.error_message = Some(error);
        self
    }

    pub fn into_attempt(self, now: DateTime<Utc>) -> DeliveryAttempt {
        DeliveryAttempt {
            id: Uuid::new_v4(),
            tenant_id: self.tenant_id,
            template_id: self.template_id,
            provider_id: self.provider_id,
            recipient_id: self.recipient_id,
            recipient_phone: self.recipient_phone,
            rendered_text: self.rendered_text,
            trigger_type: self.trigger_type,
            channel: self.channel,
            correlation_key: self.correlation_key,
            status: self.status,
            attempt_count: 0,
            provider_message_id: None,
            sent_at: None,
            error_message: self.error_message,
            next_attempt_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Result of inserting a record keyed by correlation key.
#[derive(Debug, Clone)]
pub enum CreateResult {
    Created(DeliveryAttempt),
    Existing(DeliveryAttempt),
}

/// Mutable fields written after a send.
#[derive(Debug, Clone)]
pub struct AttemptUpdate {
    pub status: DeliveryStatus,
    pub attempt_count: u32,
    pub provider_message_id: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub next_attempt_at: Option<DateTime<Utc>>,
}

impl AttemptUpdate {
    pub fn sent(attempt_count: u32, provider_message_id: Option<String>, at: DateTime<Utc>) -> Self {
        Self {
            status: DeliveryStatus::Sent,
            attempt_count,
            provider_message_id,
            sent_at: Some(at),
            error_message: None,
            next_attempt_at: None,
        }
    }

    pub fn retry_at(attempt_count: u32, error: String, next_attempt_at: DateTime<Utc>) -> Self {
        Self {
            status: DeliveryStatus::Pending,
            attempt_count,
            provider_message_id: None,
            sent_at: None,
            error_message: Some(error),
            next_attempt_at: Some(next_attempt_at),
        }
    }

    pub fn failed(attempt_count: u32, error: String) -> Self {
        Self {
            status: DeliveryStatus::Failed,
            attempt_count,
            provider_message_id: None,
            sent_at: None,
            error_message: Some(error),
            next_attempt_at: None,
        }
    }
}
