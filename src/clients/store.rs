//! Repository seams for everything the engine reads or writes durably.
//!
//! Templates, provider configs and tenant settings are owned by the
//! configuration side and only read here. Delivery attempts are written by
//! the dispatcher and the retry sweep.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{
    delivery::{AttemptUpdate, CreateDeliveryAttempt, CreateResult, DeliveryAttempt},
    event::TriggerType,
    provider::ProviderConfig,
    settings::NotificationSettings,
    status::DeliveryStatus,
    template::MessageTemplate,
};

#[async_trait]
pub trait TemplateRepository: Send + Sync {
    /// Active templates for a tenant and trigger, any language.
    async fn active_templates(
        &self,
        tenant_id: &str,
        trigger_type: TriggerType,
    ) -> Result<Vec<MessageTemplate>>;
}

#[async_trait]
pub trait ProviderConfigRepository: Send + Sync {
    async fn active_provider_configs(&self) -> Result<Vec<ProviderConfig>>;
}

#[async_trait]
pub trait SettingsRepository: Send + Sync {
    async fn settings(&self, tenant_id: &str) -> Result<Option<NotificationSettings>>;
}

#[async_trait]
pub trait DeliveryStore: Send + Sync {
    /// Inserts a record unless one already exists for its correlation key.
    async fn create_if_absent(
        &self,
        attempt: CreateDeliveryAttempt,
        now: DateTime<Utc>,
    ) -> Result<CreateResult>;

    async fn get(&self, id: Uuid) -> Result<Option<DeliveryAttempt>>;

    /// Moves a record from `expected` to `InProgress`. Returns `None` when the
    /// record is missing or its status no longer matches.
    async fn claim(
        &self,
        id: Uuid,
        expected: DeliveryStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<DeliveryAttempt>>;

    async fn record_outcome(
        &self,
        id: Uuid,
        update: AttemptUpdate,
        now: DateTime<Utc>,
    ) -> Result<DeliveryAttempt>;

    /// Pending records whose next attempt is due, oldest first.
    async fn due_for_retry(&self, now: DateTime<Utc>, limit: usize)
    -> Result<Vec<DeliveryAttempt>>;

    /// Applies a gateway status report to the most recent `Sent` record the
    /// provider reported this message id for.
    async fn update_delivery_status(
        &self,
        provider_id: Uuid,
        provider_message_id: &str,
        status: DeliveryStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<DeliveryAttempt>>;

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}
