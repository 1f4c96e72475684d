use std::collections::HashMap;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::{
    clients::store::{
        DeliveryStore, ProviderConfigRepository, SettingsRepository, TemplateRepository,
    },
    models::{
        delivery::{AttemptUpdate, CreateDeliveryAttempt, CreateResult, DeliveryAttempt},
        event::TriggerType,
        provider::ProviderConfig,
        settings::NotificationSettings,
        status::DeliveryStatus,
        template::MessageTemplate,
    },
};

#[derive(Default)]
struct State {
    templates: Vec<MessageTemplate>,
    providers: Vec<ProviderConfig>,
    settings: HashMap<String, NotificationSettings>,
    attempts: HashMap<Uuid, DeliveryAttempt>,
    by_correlation_key: HashMap<String, Uuid>,
}

/// Process-local implementation of every repository trait.
///
/// All checks and writes happen under one lock, so `create_if_absent` and
/// `claim` are atomic with respect to each other.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_template(&self, template: MessageTemplate) {
        self.state.lock().templates.push(template);
    }

    pub fn add_provider_config(&self, config: ProviderConfig) {
        self.state.lock().providers.push(config);
    }

    /// Replaces any existing config for the same tenant and channel.
    pub fn replace_provider_config(&self, config: ProviderConfig) {
        let mut state = self.state.lock();
        state
            .providers
            .retain(|p| !(p.tenant_id == config.tenant_id && p.channel == config.channel));
        state.providers.push(config);
    }

    pub fn put_settings(&self, settings: NotificationSettings) {
        self.state
            .lock()
            .settings
            .insert(settings.tenant_id.clone(), settings);
    }

    pub fn attempts(&self) -> Vec<DeliveryAttempt> {
        let mut attempts: Vec<_> = self.state.lock().attempts.values().cloned().collect();
        attempts.sort_by_key(|a| a.created_at);
        attempts
    }
}

#[async_trait]
impl TemplateRepository for InMemoryStore {
    async fn active_templates(
        &self,
        tenant_id: &str,
        trigger_type: TriggerType,
    ) -> Result<Vec<MessageTemplate>> {
        Ok(self
            .state
            .lock()
            .templates
            .iter()
            .filter(|t| t.tenant_id == tenant_id && t.trigger_type == trigger_type && t.is_active)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ProviderConfigRepository for InMemoryStore {
    async fn active_provider_configs(&self) -> Result<Vec<ProviderConfig>> {
        Ok(self
            .state
            .lock()
            .providers
            .iter()
            .filter(|p| p.is_active)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl SettingsRepository for InMemoryStore {
    async fn settings(&self, tenant_id: &str) -> Result<Option<NotificationSettings>> {
        Ok(self.state.lock().settings.get(tenant_id).cloned())
    }
}

#[async_trait]
impl DeliveryStore for InMemoryStore {
    async fn create_if_absent(
        &self,
        attempt: CreateDeliveryAttempt,
        now: DateTime<Utc>,
    ) -> Result<CreateResult> {
        let mut state = self.state.lock();

        if let Some(id) = state.by_correlation_key.get(&attempt.correlation_key) {
            let existing = state
                .attempts
                .get(id)
                .cloned()
                .ok_or_else(|| anyhow!("Correlation index points at missing record {}", id))?;
            return Ok(CreateResult::Existing(existing));
        }

        let record = attempt.into_attempt(now);
        state
            .by_correlation_key
            .insert(record.correlation_key.clone(), record.id);
        state.attempts.insert(record.id, record.clone());

        Ok(CreateResult::Created(record))
    }

    async fn get(&self, id: Uuid) -> Result<Option<DeliveryAttempt>> {
        Ok(self.state.lock().attempts.get(&id).cloned())
    }

    async fn claim(
        &self,
        id: Uuid,
        expected: DeliveryStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<DeliveryAttempt>> {
        let mut state = self.state.lock();

        match state.attempts.get_mut(&id) {
            Some(record) if record.status == expected => {
                record.status = DeliveryStatus::InProgress;
                record.updated_at = now;
                Ok(Some(record.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn record_outcome(
        &self,
        id: Uuid,
        update: AttemptUpdate,
        now: DateTime<Utc>,
    ) -> Result<DeliveryAttempt> {
        let mut state = self.state.lock();
        let record = state
            .attempts
            .get_mut(&id)
            .ok_or_else(|| anyhow!("Delivery attempt {} not found", id))?;

        record.apply(&update, now);
        Ok(record.clone())
    }

    async fn due_for_retry(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<DeliveryAttempt>> {
        let mut due: Vec<DeliveryAttempt> = self
            .state
            .lock()
            .attempts
            .values()
            .filter(|a| {
                a.status == DeliveryStatus::Pending
                    && a.next_attempt_at.is_some_and(|at| at <= now)
            })
            .cloned()
            .collect();

        due.sort_by_key(|a| a.next_attempt_at);
        due.truncate(limit);
        Ok(due)
    }

    async fn update_delivery_status(
        &self,
        provider_id: Uuid,
        provider_message_id: &str,
        status: DeliveryStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<DeliveryAttempt>> {
        let mut state = self.state.lock();

        let record = state
            .attempts
            .values_mut()
            .filter(|a| {
                a.status == DeliveryStatus::Sent
                    && a.provider_id == provider_id
                    && a.provider_message_id.as_deref() == Some(provider_message_id)
            })
            .max_by_key(|a| a.sent_at);

        Ok(record.map(|r| {
            r.status = status;
            r.updated_at = now;
            r.clone()
        }))
    }
}
