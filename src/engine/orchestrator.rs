//! Delivery orchestration.
//!
//! One dispatch walks `resolve templates → materiality → quiet hours → select
//! channel and template → render → send → persist`, ending either done or with a retry
//! scheduled on the delivery record. Retries are picked up by
//! [`RetrySweep`](super::sweep::RetrySweep) and go through [`Dispatcher::retry_attempt`].

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::{sync::mpsc, time::timeout};
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::{
    clients::{
        memory::InMemoryStore,
        providers::{ChannelProvider, SendOutcome},
        registry::ProviderRegistry,
        store::{DeliveryStore, SettingsRepository, TemplateRepository},
        template::{TemplateResolver, placeholders, render, select_template},
    },
    config::DispatcherConfig,
    engine::{
        deferred::DeferredQueue,
        pool::{DispatchFailure, DispatchPool},
    },
    error::{DispatchError, DispatchResult},
    models::{
        delivery::{AttemptUpdate, CreateDeliveryAttempt, CreateResult, DeliveryAttempt},
        event::TriggerEvent,
        provider::Channel,
        settings::NotificationSettings,
        status::{DeliveryStatus, FailureKind},
        template::MessageTemplate,
        validation::{normalize_phone_number, validate_phone_number},
    },
    policy::{below_materiality, quiet_until},
    utils::{Clock, SystemClock},
};

/// Why an event was dropped without creating a delivery record.
#[derive(Debug, Clone, PartialEq)]
pub enum SuppressReason {
    RecipientTypeDisabled,
    BelowMateriality { delta: f64, threshold: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    Sent {
        attempt_id: Uuid,
        channel: Channel,
    },
    RetryScheduled {
        attempt_id: Uuid,
        next_attempt_at: DateTime<Utc>,
    },
    Failed {
        attempt_id: Uuid,
        kind: FailureKind,
    },
    Deferred {
        until: DateTime<Utc>,
    },
    Suppressed(SuppressReason),
    /// A record already exists for the event's correlation key.
    Duplicate {
        attempt_id: Uuid,
        status: DeliveryStatus,
    },
    /// The record was claimed by another worker first.
    Skipped {
        attempt_id: Uuid,
    },
}

/// Collaborators the dispatcher reads from and writes to.
pub struct DispatcherDeps {
    pub templates: Arc<dyn TemplateRepository>,
    pub settings: Arc<dyn SettingsRepository>,
    pub store: Arc<dyn DeliveryStore>,
    pub registry: Arc<ProviderRegistry>,
    pub clock: Arc<dyn Clock>,
}

impl DispatcherDeps {
    /// Every repository backed by the same in-memory store.
    pub fn in_memory(store: Arc<InMemoryStore>, registry: Arc<ProviderRegistry>) -> Self {
        Self {
            templates: store.clone(),
            settings: store.clone(),
            store,
            registry,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

pub(crate) struct Inner {
    pub(crate) templates: TemplateResolver,
    pub(crate) settings: Arc<dyn SettingsRepository>,
    pub(crate) store: Arc<dyn DeliveryStore>,
    pub(crate) registry: Arc<ProviderRegistry>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) deferred: DeferredQueue,
    pub(crate) pool: DispatchPool,
    pub(crate) config: DispatcherConfig,
}

/// Entry point for business code. Cheap to clone.
#[derive(Clone)]
pub struct Dispatcher {
    pub(crate) inner: Arc<Inner>,
}

impl Dispatcher {
    /// Returns the dispatcher and the receiving end of its failure channel.
    pub fn new(
        deps: DispatcherDeps,
        config: DispatcherConfig,
    ) -> (Self, mpsc::UnboundedReceiver<DispatchFailure>) {
        let (pool, failures) = DispatchPool::new(config.worker_concurrency);

        let inner = Inner {
            templates: TemplateResolver::new(deps.templates),
            settings: deps.settings,
            store: deps.store,
            registry: deps.registry,
            clock: deps.clock,
            deferred: DeferredQueue::new(),
            pool,
            config,
        };

        (
            Self {
                inner: Arc::new(inner),
            },
            failures,
        )
    }

    /// Fire-and-forget. The caller never waits on, or fails because of, delivery.
    pub fn dispatch(&self, event: TriggerEvent) {
        let this = self.clone();
        let label = event.correlation_key();

        self.inner
            .pool
            .submit(label, async move { this.process(event).await.map(|_| ()) });
    }

    /// Runs the whole pipeline for one event and reports how it ended.
    pub async fn process(&self, event: TriggerEvent) -> DispatchResult<DispatchOutcome> {
        let span = info_span!(
            "dispatch",
            tenant_id = %event.tenant_id,
            trigger = event.trigger_type.as_str(),
            correlation_key = %event.correlation_key(),
        );

        self.process_inner(event).instrument(span).await
    }

    async fn process_inner(&self, event: TriggerEvent) -> DispatchResult<DispatchOutcome> {
        let inner = &self.inner;

        if !event.recipient_type.is_enabled() {
            info!(recipient_type = ?event.recipient_type, "Recipient type disabled, not notifying");
            return Ok(DispatchOutcome::Suppressed(
                SuppressReason::RecipientTypeDisabled,
            ));
        }

        let templates = inner
            .templates
            .candidates(&event.tenant_id, event.trigger_type)
            .await
            .map_err(DispatchError::persistence)?;

        if templates.is_empty() {
            return Err(DispatchError::config(format!(
                "No active template for tenant {} and trigger {}",
                event.tenant_id,
                event.trigger_type.as_str()
            )));
        }

        let settings = inner
            .settings
            .settings(&event.tenant_id)
            .await
            .map_err(DispatchError::persistence)?
            .unwrap_or_else(|| NotificationSettings::defaults_for(event.tenant_id.clone()));

        let threshold = settings
            .materiality_threshold
            .unwrap_or(inner.config.materiality_threshold);

        if below_materiality(&event, threshold) {
            let delta = event.change_amount.unwrap_or_default();
            debug!(delta, threshold, "Change below materiality threshold, suppressed");
            return Ok(DispatchOutcome::Suppressed(
                SuppressReason::BelowMateriality { delta, threshold },
            ));
        }

        let now = inner.clock.now();

        if let Some((start, end)) = settings.quiet_window()
            && let Some(until) = quiet_until(now, start, end, settings.tz())
        {
            info!(release_at = %until, "Inside quiet hours, deferring");
            inner.deferred.push(event, until, now);
            return Ok(DispatchOutcome::Deferred { until });
        }

        let (channel, provider, template) =
            self.select_channel(&settings, &templates, &event.language)?;

        let rendered = render(&template.body_text, &event.variables);

        let unresolved: Vec<String> = placeholders(&template.body_text)
            .into_iter()
            .filter(|key| !event.variables.contains_key(key))
            .collect();
        if !unresolved.is_empty() {
            warn!(template_id = %template.id, ?unresolved, "Template placeholders left unresolved");
        }

        let mut create = CreateDeliveryAttempt::new(
            event.tenant_id.clone(),
            template.id,
            provider.provider_id(),
            event.recipient_id.clone(),
            event.recipient_phone.clone(),
            rendered,
            event.trigger_type,
            channel,
            event.correlation_key(),
        );

        let invalid_recipient = validate_phone_number(&event.recipient_phone).err();
        if let Some(e) = &invalid_recipient {
            create = create.failed_with(format!("Invalid recipient: {}", e));
        }

        let record = match inner
            .store
            .create_if_absent(create, now)
            .await
            .map_err(DispatchError::persistence)?
        {
            CreateResult::Created(record) => record,
            CreateResult::Existing(existing) => {
                info!(attempt_id = %existing.id, status = %existing.status, "Event already has a delivery record");
                return Ok(DispatchOutcome::Duplicate {
                    attempt_id: existing.id,
                    status: existing.status,
                });
            }
        };

        if let Some(e) = invalid_recipient {
            warn!(attempt_id = %record.id, error = %e, "Invalid recipient, not sending");
            return Ok(DispatchOutcome::Failed {
                attempt_id: record.id,
                kind: FailureKind::Permanent,
            });
        }

        self.attempt(record, provider).await
    }

    /// Primary channel when usable, otherwise the other one. A usable channel
    /// is enabled and has both a provider and a template that serves it.
    fn select_channel<'a>(
        &self,
        settings: &NotificationSettings,
        templates: &'a [MessageTemplate],
        language: &str,
    ) -> DispatchResult<(Channel, Arc<dyn ChannelProvider>, &'a MessageTemplate)> {
        let preference = settings.channel_preference();

        for (idx, channel) in preference.into_iter().enumerate() {
            if !settings.channel_enabled(channel) {
                debug!(channel = %channel, "Channel disabled for tenant");
                continue;
            }

            let Some(template) = select_template(templates, language, Some(channel)) else {
                debug!(channel = %channel, "No template for channel");
                continue;
            };

            match self.inner.registry.resolve(&settings.tenant_id, channel) {
                Some(provider) => {
                    if idx > 0 {
                        info!(
                            primary = %preference[0],
                            fallback = %channel,
                            "Primary channel unavailable, falling back"
                        );
                    }
                    debug!(
                        template_id = %template.id,
                        template_language = %template.language,
                        "Template resolved"
                    );
                    return Ok((channel, provider, template));
                }
                None => debug!(channel = %channel, "No provider configured for channel"),
            }
        }

        Err(DispatchError::config(format!(
            "No enabled channel with a configured provider and template for tenant {}",
            settings.tenant_id
        )))
    }

    /// Sends a claimed (`InProgress`) record once and persists the result.
    async fn attempt(
        &self,
        record: DeliveryAttempt,
        provider: Arc<dyn ChannelProvider>,
    ) -> DispatchResult<DispatchOutcome> {
        let inner = &self.inner;
        let send_timeout = inner.config.send_timeout;
        let recipient = normalize_phone_number(&record.recipient_phone);
        let text = record.rendered_text.clone();
        let kind = provider.kind();

        // The send runs on its own task: on timeout we stop waiting, the call itself is left alone.
        let send = tokio::spawn(async move { provider.send(&recipient, &text).await });

        let outcome = match timeout(send_timeout, send).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(join_error)) => {
                SendOutcome::transient(format!("{} send task failed: {}", kind, join_error))
            }
            Err(_) => SendOutcome::transient(format!(
                "{} send timed out after {}ms",
                kind,
                send_timeout.as_millis()
            )),
        };

        let attempts = record.attempt_count + 1;
        let now = inner.clock.now();
        let retry = &inner.config.retry;

        let (update, result) = if outcome.success {
            (
                AttemptUpdate::sent(attempts, outcome.provider_message_id.clone(), now),
                DispatchOutcome::Sent {
                    attempt_id: record.id,
                    channel: record.channel,
                },
            )
        } else {
            let error = outcome
                .error
                .clone()
                .unwrap_or_else(|| "unknown gateway error".to_string());

            if outcome.is_retryable() && retry.has_attempts_left(attempts) {
                let delay = TimeDelta::from_std(retry.jittered_delay(attempts))
                    .unwrap_or(TimeDelta::zero());
                let next_attempt_at = now + delay;
                (
                    AttemptUpdate::retry_at(attempts, error, next_attempt_at),
                    DispatchOutcome::RetryScheduled {
                        attempt_id: record.id,
                        next_attempt_at,
                    },
                )
            } else {
                let kind = outcome.failure_kind.unwrap_or(FailureKind::Permanent);
                (
                    AttemptUpdate::failed(attempts, error),
                    DispatchOutcome::Failed {
                        attempt_id: record.id,
                        kind,
                    },
                )
            }
        };

        inner
            .store
            .record_outcome(record.id, update, now)
            .await
            .map_err(DispatchError::persistence)?;

        match &result {
            DispatchOutcome::Sent { .. } => info!(
                attempt_id = %record.id,
                backend = %kind,
                attempt = attempts,
                provider_message_id = ?outcome.provider_message_id,
                "Notification sent"
            ),
            DispatchOutcome::RetryScheduled { next_attempt_at, .. } => warn!(
                attempt_id = %record.id,
                backend = %kind,
                attempt = attempts,
                max_attempts = retry.max_attempts,
                next_attempt_at = %next_attempt_at,
                error = ?outcome.error,
                "Send failed, retry scheduled"
            ),
            _ => warn!(
                attempt_id = %record.id,
                backend = %kind,
                attempt = attempts,
                failure = ?outcome.failure_kind,
                error = ?outcome.error,
                "Send failed permanently"
            ),
        }

        Ok(result)
    }

    /// Re-sends a pending record whose retry is due. Claims it first so
    /// concurrent workers never send the same record twice.
    pub async fn retry_attempt(&self, record: DeliveryAttempt) -> DispatchResult<DispatchOutcome> {
        let inner = &self.inner;
        let now = inner.clock.now();

        let Some(claimed) = inner
            .store
            .claim(record.id, DeliveryStatus::Pending, now)
            .await
            .map_err(DispatchError::persistence)?
        else {
            debug!(attempt_id = %record.id, "Record already claimed, skipping");
            return Ok(DispatchOutcome::Skipped {
                attempt_id: record.id,
            });
        };

        // Settings may have changed since the first send.
        let settings = inner
            .settings
            .settings(&claimed.tenant_id)
            .await
            .map_err(DispatchError::persistence)?
            .unwrap_or_else(|| NotificationSettings::defaults_for(claimed.tenant_id.clone()));

        if !settings.channel_enabled(claimed.channel) {
            let error = format!(
                "Channel {} disabled for tenant {}",
                claimed.channel, claimed.tenant_id
            );
            return self.abandon_retry(claimed, error, now).await;
        }

        if let Some((start, end)) = settings.quiet_window()
            && let Some(until) = quiet_until(now, start, end, settings.tz())
        {
            info!(attempt_id = %claimed.id, release_at = %until, "Retry falls in quiet hours, rescheduling");

            let error = claimed
                .error_message
                .clone()
                .unwrap_or_else(|| "Deferred by quiet hours".to_string());

            inner
                .store
                .record_outcome(
                    claimed.id,
                    AttemptUpdate::retry_at(claimed.attempt_count, error, until),
                    now,
                )
                .await
                .map_err(DispatchError::persistence)?;

            return Ok(DispatchOutcome::Deferred { until });
        }

        let Some(provider) = inner.registry.resolve(&claimed.tenant_id, claimed.channel) else {
            let error = format!(
                "No provider configured for tenant {} on {}",
                claimed.tenant_id, claimed.channel
            );
            return self.abandon_retry(claimed, error, now).await;
        };

        self.attempt(claimed, provider).await
    }

    /// Fails a claimed record without sending.
    async fn abandon_retry(
        &self,
        claimed: DeliveryAttempt,
        error: String,
        now: DateTime<Utc>,
    ) -> DispatchResult<DispatchOutcome> {
        warn!(attempt_id = %claimed.id, error = %error, "Retry abandoned");

        self.inner
            .store
            .record_outcome(
                claimed.id,
                AttemptUpdate::failed(claimed.attempt_count, error),
                now,
            )
            .await
            .map_err(DispatchError::persistence)?;

        Ok(DispatchOutcome::Failed {
            attempt_id: claimed.id,
            kind: FailureKind::Permanent,
        })
    }

    /// Dispatches every deferred event whose quiet window has closed.
    pub fn replay_deferred(&self) -> usize {
        let due = self.inner.deferred.release_due(self.inner.clock.now());
        let count = due.len();

        for event in due {
            self.dispatch(event);
        }

        if count > 0 {
            info!(count, "Replaying deferred events");
        }
        count
    }

    /// Applies a delivery report from the provider that sent the message.
    /// Only `Delivered` and `Failed` are accepted, and only for records
    /// currently `Sent`.
    pub async fn apply_status_update(
        &self,
        provider_id: Uuid,
        provider_message_id: &str,
        status: DeliveryStatus,
    ) -> DispatchResult<Option<DeliveryAttempt>> {
        if !status.is_terminal() {
            debug!(provider_message_id, status = %status, "Ignoring non-terminal status report");
            return Ok(None);
        }

        let updated = self
            .inner
            .store
            .update_delivery_status(provider_id, provider_message_id, status, self.inner.clock.now())
            .await
            .map_err(DispatchError::persistence)?;

        match &updated {
            Some(record) => info!(attempt_id = %record.id, status = %status, "Delivery status updated"),
            None => debug!(%provider_id, provider_message_id, "No sent record for status report"),
        }

        Ok(updated)
    }

    /// Asks the gateway for the delivery state of a `Sent` record.
    pub async fn reconcile_status(&self, attempt_id: Uuid) -> DispatchResult<Option<DeliveryAttempt>> {
        let inner = &self.inner;

        let Some(record) = inner
            .store
            .get(attempt_id)
            .await
            .map_err(DispatchError::persistence)?
        else {
            return Ok(None);
        };

        let (DeliveryStatus::Sent, Some(message_id)) = (record.status, &record.provider_message_id)
        else {
            return Ok(None);
        };

        let provider = inner
            .registry
            .resolve(&record.tenant_id, record.channel)
            .filter(|p| p.provider_id() == record.provider_id);

        let Some(provider) = provider else {
            debug!(attempt_id = %record.id, "Original provider no longer registered");
            return Ok(None);
        };

        let status = provider.get_status(message_id).await;
        self.apply_status_update(record.provider_id, message_id, status).await
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.inner.registry
    }

    pub fn store(&self) -> &Arc<dyn DeliveryStore> {
        &self.inner.store
    }

    pub fn deferred(&self) -> &DeferredQueue {
        &self.inner.deferred
    }

    pub fn pool(&self) -> &DispatchPool {
        &self.inner.pool
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.inner.config
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.inner.clock.now()
    }

    /// Waits for all dispatches submitted so far.
    pub async fn drain(&self) {
        self.inner.pool.drain().await;
    }

    pub async fn shutdown(&self) {
        self.inner.pool.shutdown().await;
    }
}
