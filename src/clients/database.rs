use std::collections::HashMap;

use anyhow::{Context, Error, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_postgres::{Client, NoTls, Row};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::{
    clients::store::{DeliveryStore, ProviderConfigRepository, SettingsRepository, TemplateRepository},
    models::{
        delivery::{AttemptUpdate, CreateDeliveryAttempt, CreateResult, DeliveryAttempt},
        event::TriggerType,
        provider::{BackendKind, Channel, ProviderConfig},
        settings::NotificationSettings,
        status::DeliveryStatus,
        template::MessageTemplate,
    },
};

const ATTEMPT_COLUMNS: &str = "id, tenant_id, template_id, provider_id, recipient_id, \
    recipient_phone, rendered_text, trigger_type, channel, correlation_key, status, \
    attempt_count, provider_message_id, sent_at, error_message, next_attempt_at, \
    created_at, updated_at";

const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

/// PostgreSQL-backed implementation of every repository seam.
pub struct PgStore {
    client: Client,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> Result<Self, Error> {
        info!("Connecting to PostgreSQL database");

        let (client, connection) = tokio_postgres::connect(database_url, NoTls)
            .await
            .map_err(|e| anyhow!("Failed to connect to database: {}", e))?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!(error = %e, "PostgreSQL connection closed with error");
            }
        });

        info!("PostgreSQL connection established");

        Ok(Self { client })
    }

    /// Creates missing tables and indexes.
    pub async fn migrate(&self) -> Result<(), Error> {
        self.client
            .batch_execute(SCHEMA)
            .await
            .map_err(|e| anyhow!("Failed to apply schema: {}", e))?;

        debug!("Database schema up to date");
        Ok(())
    }

    async fn attempt_by_correlation_key(&self, correlation_key: &str) -> Result<Option<DeliveryAttempt>> {
        let sql = format!(
            "SELECT {} FROM delivery_attempts WHERE correlation_key = $1",
            ATTEMPT_COLUMNS
        );

        self.client
            .query_opt(&sql, &[&correlation_key])
            .await
            .context("Failed to load delivery attempt by correlation key")?
            .map(|row| attempt_from_row(&row))
            .transpose()
    }
}

fn parse<T>(value: &str, what: &str, parser: impl Fn(&str) -> Option<T>) -> Result<T> {
    parser(value).ok_or_else(|| anyhow!("Unknown {} in database: {}", what, value))
}

fn attempt_from_row(row: &Row) -> Result<DeliveryAttempt> {
    let trigger_type: String = row.try_get("trigger_type")?;
    let channel: String = row.try_get("channel")?;
    let status: String = row.try_get("status")?;
    let attempt_count: i32 = row.try_get("attempt_count")?;

    Ok(DeliveryAttempt {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        template_id: row.try_get("template_id")?,
        provider_id: row.try_get("provider_id")?,
        recipient_id: row.try_get("recipient_id")?,
        recipient_phone: row.try_get("recipient_phone")?,
        rendered_text: row.try_get("rendered_text")?,
        trigger_type: parse(&trigger_type, "trigger type", TriggerType::from_string)?,
        channel: parse(&channel, "channel", Channel::from_string)?,
        correlation_key: row.try_get("correlation_key")?,
        status: parse(&status, "delivery status", DeliveryStatus::from_string)?,
        attempt_count: u32::try_from(attempt_count)
            .map_err(|_| anyhow!("Negative attempt_count in database: {}", attempt_count))?,
        provider_message_id: row.try_get("provider_message_id")?,
        sent_at: row.try_get("sent_at")?,
        error_message: row.try_get("error_message")?,
        next_attempt_at: row.try_get("next_attempt_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn template_from_row(row: &Row) -> Result<MessageTemplate> {
    let trigger_type: String = row.try_get("trigger_type")?;
    let channel: Option<String> = row.try_get("channel")?;

    Ok(MessageTemplate {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        trigger_type: parse(&trigger_type, "trigger type", TriggerType::from_string)?,
        language: row.try_get("language")?,
        channel: channel.as_deref().and_then(Channel::from_string),
        body_text: row.try_get("body_text")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
    })
}

fn provider_config_from_row(row: &Row) -> Result<ProviderConfig> {
    let channel: String = row.try_get("channel")?;
    let backend_kind: String = row.try_get("backend_kind")?;
    let credentials: serde_json::Value = row.try_get("credentials")?;

    let credentials: HashMap<String, String> = serde_json::from_value(credentials)
        .context("Provider credentials must be a flat string map")?;

    Ok(ProviderConfig {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        channel: parse(&channel, "channel", Channel::from_string)?,
        backend_kind: parse(&backend_kind, "backend kind", BackendKind::from_string)?,
        credentials,
        from_address: row.try_get("from_address")?,
        base_url: row.try_get("base_url")?,
        is_active: row.try_get("is_active")?,
    })
}

fn settings_from_row(row: &Row) -> Result<NotificationSettings> {
    let primary_channel: String = row.try_get("primary_channel")?;

    Ok(NotificationSettings {
        tenant_id: row.try_get("tenant_id")?,
        whatsapp_enabled: row.try_get("whatsapp_enabled")?,
        sms_enabled: row.try_get("sms_enabled")?,
        primary_channel: parse(&primary_channel, "channel", Channel::from_string)?,
        quiet_hours_start: row.try_get("quiet_hours_start")?,
        quiet_hours_end: row.try_get("quiet_hours_end")?,
        timezone: row.try_get("timezone")?,
        materiality_threshold: row.try_get("materiality_threshold")?,
    })
}

#[async_trait]
impl TemplateRepository for PgStore {
    async fn active_templates(
        &self,
        tenant_id: &str,
        trigger_type: TriggerType,
    ) -> Result<Vec<MessageTemplate>> {
        let rows = self
            .client
            .query(
                "SELECT id, tenant_id, trigger_type, language, channel, body_text, is_active, created_at \
                 FROM message_templates \
                 WHERE tenant_id = $1 AND trigger_type = $2 AND is_active \
                 ORDER BY created_at DESC",
                &[&tenant_id, &trigger_type.as_str()],
            )
            .await
            .context("Failed to load message templates")?;

        rows.iter().map(template_from_row).collect()
    }
}

#[async_trait]
impl ProviderConfigRepository for PgStore {
    async fn active_provider_configs(&self) -> Result<Vec<ProviderConfig>> {
        let rows = self
            .client
            .query(
                "SELECT id, tenant_id, channel, backend_kind, credentials, from_address, base_url, is_active \
                 FROM provider_configs WHERE is_active",
                &[],
            )
            .await
            .context("Failed to load provider configs")?;

        rows.iter().map(provider_config_from_row).collect()
    }
}

#[async_trait]
impl SettingsRepository for PgStore {
    async fn settings(&self, tenant_id: &str) -> Result<Option<NotificationSettings>> {
        self.client
            .query_opt(
                "SELECT tenant_id, whatsapp_enabled, sms_enabled, primary_channel, quiet_hours_start, \
                 quiet_hours_end, timezone, materiality_threshold \
                 FROM notification_settings WHERE tenant_id = $1",
                &[&tenant_id],
            )
            .await
            .context("Failed to load notification settings")?
            .map(|row| settings_from_row(&row))
            .transpose()
    }
}

#[async_trait]
impl DeliveryStore for PgStore {
    async fn create_if_absent(
        &self,
        attempt: CreateDeliveryAttempt,
        now: DateTime<Utc>,
    ) -> Result<CreateResult> {
        let record = attempt.into_attempt(now);
        let attempt_count = i32::try_from(record.attempt_count)?;

        let sql = format!(
            "INSERT INTO delivery_attempts ({cols}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18) \
             ON CONFLICT (correlation_key) DO NOTHING \
             RETURNING {cols}",
            cols = ATTEMPT_COLUMNS
        );

        let inserted = self
            .client
            .query_opt(
                &sql,
                &[
                    &record.id,
                    &record.tenant_id,
                    &record.template_id,
                    &record.provider_id,
                    &record.recipient_id,
                    &record.recipient_phone,
                    &record.rendered_text,
                    &record.trigger_type.as_str(),
                    &record.channel.as_str(),
                    &record.correlation_key,
                    &record.status.as_str(),
                    &attempt_count,
                    &record.provider_message_id,
                    &record.sent_at,
                    &record.error_message,
                    &record.next_attempt_at,
                    &record.created_at,
                    &record.updated_at,
                ],
            )
            .await
            .map_err(|e| {
                error!(
                    error = %e,
                    correlation_key = %record.correlation_key,
                    "Failed to write delivery attempt to database"
                );
                anyhow!("Database write failed: {}", e)
            })?;

        if let Some(row) = inserted {
            let created = attempt_from_row(&row)?;
            debug!(attempt_id = %created.id, status = %created.status, "Delivery attempt created");
            return Ok(CreateResult::Created(created));
        }

        let existing = self
            .attempt_by_correlation_key(&record.correlation_key)
            .await?
            .ok_or_else(|| {
                anyhow!(
                    "Delivery attempt {} conflicted but could not be read back",
                    record.correlation_key
                )
            })?;

        Ok(CreateResult::Existing(existing))
    }

    async fn get(&self, id: Uuid) -> Result<Option<DeliveryAttempt>> {
        let sql = format!("SELECT {} FROM delivery_attempts WHERE id = $1", ATTEMPT_COLUMNS);

        self.client
            .query_opt(&sql, &[&id])
            .await
            .context("Failed to load delivery attempt")?
            .map(|row| attempt_from_row(&row))
            .transpose()
    }

    async fn claim(
        &self,
        id: Uuid,
        expected: DeliveryStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<DeliveryAttempt>> {
        let sql = format!(
            "UPDATE delivery_attempts SET status = $3, updated_at = $4 \
             WHERE id = $1 AND status = $2 RETURNING {}",
            ATTEMPT_COLUMNS
        );

        self.client
            .query_opt(
                &sql,
                &[
                    &id,
                    &expected.as_str(),
                    &DeliveryStatus::InProgress.as_str(),
                    &now,
                ],
            )
            .await
            .context("Failed to claim delivery attempt")?
            .map(|row| attempt_from_row(&row))
            .transpose()
    }

    async fn record_outcome(
        &self,
        id: Uuid,
        update: AttemptUpdate,
        now: DateTime<Utc>,
    ) -> Result<DeliveryAttempt> {
        let attempt_count = i32::try_from(update.attempt_count)?;

        let sql = format!(
            "UPDATE delivery_attempts SET \
                status = $2, \
                attempt_count = $3, \
                provider_message_id = COALESCE($4, provider_message_id), \
                sent_at = COALESCE($5, sent_at), \
                error_message = $6, \
                next_attempt_at = $7, \
                updated_at = $8 \
             WHERE id = $1 RETURNING {}",
            ATTEMPT_COLUMNS
        );

        let row = self
            .client
            .query_opt(
                &sql,
                &[
                    &id,
                    &update.status.as_str(),
                    &attempt_count,
                    &update.provider_message_id,
                    &update.sent_at,
                    &update.error_message,
                    &update.next_attempt_at,
                    &now,
                ],
            )
            .await
            .map_err(|e| {
                error!(error = %e, attempt_id = %id, "Failed to record delivery outcome");
                anyhow!("Database write failed: {}", e)
            })?
            .ok_or_else(|| anyhow!("Delivery attempt {} not found", id))?;

        attempt_from_row(&row)
    }

    async fn due_for_retry(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<DeliveryAttempt>> {
        let sql = format!(
            "SELECT {} FROM delivery_attempts \
             WHERE status = $1 AND next_attempt_at <= $2 \
             ORDER BY next_attempt_at ASC LIMIT $3",
            ATTEMPT_COLUMNS
        );
        let limit = i64::try_from(limit)?;

        let rows = self
            .client
            .query(&sql, &[&DeliveryStatus::Pending.as_str(), &now, &limit])
            .await
            .context("Failed to load due delivery attempts")?;

        rows.iter().map(attempt_from_row).collect()
    }

    async fn update_delivery_status(
        &self,
        provider_id: Uuid,
        provider_message_id: &str,
        status: DeliveryStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<DeliveryAttempt>> {
        // Message ids are only unique per gateway: scope by provider and touch one row.
        let sql = format!(
            "UPDATE delivery_attempts SET status = $3, updated_at = $4 \
             WHERE id = ( \
                SELECT id FROM delivery_attempts \
                WHERE provider_id = $1 AND provider_message_id = $2 AND status = $5 \
                ORDER BY sent_at DESC NULLS LAST LIMIT 1 \
                FOR UPDATE \
             ) AND status = $5 RETURNING {}",
            ATTEMPT_COLUMNS
        );

        self.client
            .query_opt(
                &sql,
                &[
                    &provider_id,
                    &provider_message_id,
                    &status.as_str(),
                    &now,
                    &DeliveryStatus::Sent.as_str(),
                ],
            )
            .await
            .context("Failed to apply delivery status")?
            .map(|row| attempt_from_row(&row))
            .transpose()
    }

    async fn health_check(&self) -> Result<()> {
        self.client
            .query_one("SELECT 1", &[])
            .await
            .map_err(|e| anyhow!("Database health check failed: {}", e))?;

        Ok(())
    }
}
