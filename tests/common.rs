use std::{
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use notification_dispatch::{
    clients::{
        memory::InMemoryStore,
        providers::{ChannelProvider, SendOutcome},
        registry::ProviderRegistry,
        store::DeliveryStore,
    },
    config::DispatcherConfig,
    engine::{Dispatcher, DispatcherDeps, pool::DispatchFailure},
    models::{
        delivery::{AttemptUpdate, CreateDeliveryAttempt, CreateResult, DeliveryAttempt},
        event::{TriggerEvent, TriggerType},
        provider::{BackendKind, Channel},
        retry::RetryConfig,
        status::DeliveryStatus,
        template::MessageTemplate,
    },
    utils::ManualClock,
};
use parking_lot::Mutex;
use tokio::sync::mpsc::UnboundedReceiver;
use uuid::Uuid;

pub const TENANT: &str = "tenant-acme";
pub const PHONE: &str = "+212600000001";

/// Gateway double that replays scripted outcomes and records every call.
pub struct StubProvider {
    kind: BackendKind,
    id: Uuid,
    script: Mutex<VecDeque<SendOutcome>>,
    fallback: SendOutcome,
    delay: Option<Duration>,
    calls: Mutex<Vec<(String, String)>>,
    status_calls: AtomicUsize,
    status: DeliveryStatus,
}

impl StubProvider {
    pub fn new(kind: BackendKind) -> Self {
        Self {
            kind,
            id: Uuid::new_v4(),
            script: Mutex::new(VecDeque::new()),
            fallback: SendOutcome::sent(Some(format!("msg-{}", kind))),
            delay: None,
            calls: Mutex::new(Vec::new()),
            status_calls: AtomicUsize::new(0),
            status: DeliveryStatus::Delivered,
        }
    }

    pub fn always(mut self, outcome: SendOutcome) -> Self {
        self.fallback = outcome;
        self
    }

    pub fn then(self, outcome: SendOutcome) -> Self {
        self.script.lock().push_back(outcome);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn reporting(mut self, status: DeliveryStatus) -> Self {
        self.status = status;
        self
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChannelProvider for StubProvider {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn provider_id(&self) -> Uuid {
        self.id
    }

    async fn send(&self, recipient: &str, text: &str) -> SendOutcome {
        self.calls
            .lock()
            .push((recipient.to_string(), text.to_string()));

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self.script.lock().pop_front();
        scripted.unwrap_or_else(|| self.fallback.clone())
    }

    async fn get_status(&self, _provider_message_id: &str) -> DeliveryStatus {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        self.status
    }
}

/// Store whose writes after creation always fail.
pub struct FailingStore {
    pub inner: Arc<InMemoryStore>,
}

#[async_trait]
impl DeliveryStore for FailingStore {
    async fn create_if_absent(
        &self,
        attempt: CreateDeliveryAttempt,
        now: DateTime<Utc>,
    ) -> Result<CreateResult> {
        self.inner.create_if_absent(attempt, now).await
    }

    async fn get(&self, id: Uuid) -> Result<Option<DeliveryAttempt>> {
        self.inner.get(id).await
    }

    async fn claim(
        &self,
        id: Uuid,
        expected: DeliveryStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<DeliveryAttempt>> {
        self.inner.claim(id, expected, now).await
    }

    async fn record_outcome(
        &self,
        _id: Uuid,
        _update: AttemptUpdate,
        _now: DateTime<Utc>,
    ) -> Result<DeliveryAttempt> {
        Err(anyhow!("connection reset by peer"))
    }

    async fn due_for_retry(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<DeliveryAttempt>> {
        self.inner.due_for_retry(now, limit).await
    }

    async fn update_delivery_status(
        &self,
        provider_id: Uuid,
        provider_message_id: &str,
        status: DeliveryStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<DeliveryAttempt>> {
        self.inner
            .update_delivery_status(provider_id, provider_message_id, status, now)
            .await
    }

    async fn health_check(&self) -> Result<()> {
        Err(anyhow!("database unreachable"))
    }
}

/// Tuesday noon, outside any quiet window used in tests.
pub fn noon() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0)
        .single()
        .expect("valid fixture time")
}

pub fn test_config() -> DispatcherConfig {
    DispatcherConfig {
        retry: RetryConfig {
            max_attempts: 3,
            initial_delay_ms: 1_000,
            max_delay_ms: 10_000,
            backoff_multiplier: 2,
        },
        worker_concurrency: 4,
        send_timeout: Duration::from_millis(200),
        ..DispatcherConfig::default()
    }
}

pub fn balance_template() -> MessageTemplate {
    MessageTemplate::new(
        TENANT,
        TriggerType::PaymentReceived,
        "en",
        "Hello {{customer_name}}, balance {{balance}}",
    )
}

pub fn payment_event(event_id: &str) -> TriggerEvent {
    TriggerEvent::new(
        event_id,
        TENANT,
        "customer-42",
        PHONE,
        "Karim",
        TriggerType::PaymentReceived,
    )
    .with_variable("customer_name", "Karim")
    .with_variable("balance", "500")
}

pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub clock: Arc<ManualClock>,
    pub dispatcher: Dispatcher,
    pub failures: UnboundedReceiver<DispatchFailure>,
    pub whatsapp: Arc<StubProvider>,
    pub sms: Arc<StubProvider>,
}

impl Harness {
    /// Tenant with a payment template and both channels configured.
    pub fn new(whatsapp: StubProvider, sms: StubProvider) -> Self {
        let store = Arc::new(InMemoryStore::new());
        store.add_template(balance_template());
        Self::with_store(store, whatsapp, sms)
    }

    pub fn with_store(store: Arc<InMemoryStore>, whatsapp: StubProvider, sms: StubProvider) -> Self {
        let whatsapp = Arc::new(whatsapp);
        let sms = Arc::new(sms);

        let registry = Arc::new(ProviderRegistry::with_providers(
            Duration::from_secs(1),
            [
                (
                    TENANT.to_string(),
                    Channel::WhatsApp,
                    whatsapp.clone() as Arc<dyn ChannelProvider>,
                ),
                (
                    TENANT.to_string(),
                    Channel::Sms,
                    sms.clone() as Arc<dyn ChannelProvider>,
                ),
            ],
        ));

        let clock = Arc::new(ManualClock::new(noon()));
        let deps = DispatcherDeps::in_memory(store.clone(), registry).with_clock(clock.clone());
        let (dispatcher, failures) = Dispatcher::new(deps, test_config());

        Self {
            store,
            clock,
            dispatcher,
            failures,
            whatsapp,
            sms,
        }
    }

    pub fn default_providers() -> Self {
        Self::new(
            StubProvider::new(BackendKind::MetaCloud),
            StubProvider::new(BackendKind::Vonage),
        )
    }

    pub fn only_attempt(&self) -> DeliveryAttempt {
        let attempts = self.store.attempts();
        assert_eq!(attempts.len(), 1, "Expected exactly one delivery record");
        attempts.into_iter().next().expect("one record")
    }
}
