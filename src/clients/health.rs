use std::{collections::HashMap, sync::Arc, time::Instant};

use chrono::Utc;
use tracing::{debug, warn};

use crate::{
    clients::{registry::ProviderRegistry, store::DeliveryStore},
    engine::deferred::DeferredQueue,
    models::health::{HealthCheckResponse, HealthStatus, ServiceHealth},
};

pub struct HealthChecker {
    store: Arc<dyn DeliveryStore>,
    registry: Arc<ProviderRegistry>,
}

impl HealthChecker {
    pub fn new(store: Arc<dyn DeliveryStore>, registry: Arc<ProviderRegistry>) -> Self {
        Self { store, registry }
    }

    pub async fn check_all(&self, deferred: &DeferredQueue) -> HealthCheckResponse {
        let mut checks = HashMap::new();

        checks.insert("database".to_string(), self.check_database().await);
        checks.insert("providers".to_string(), self.check_providers());

        let queued = deferred.len();
        checks.insert(
            "deferred_queue".to_string(),
            ServiceHealth::healthy(0).with_detail(format!("{} events waiting", queued)),
        );

        let status = Self::determine_overall_status(&checks);

        HealthCheckResponse {
            status,
            timestamp: Utc::now(),
            checks,
        }
    }

    async fn check_database(&self) -> ServiceHealth {
        let start = Instant::now();

        match self.store.health_check().await {
            Ok(_) => {
                let elapsed = start.elapsed().as_millis() as u64;
                debug!(response_time_ms = elapsed, "Database health check passed");
                ServiceHealth::healthy(elapsed)
            }
            Err(e) => {
                warn!(error = %e, "Database health check failed");
                ServiceHealth::unhealthy(format!("Health check query failed: {}", e))
            }
        }
    }

    fn check_providers(&self) -> ServiceHealth {
        let count = self.registry.len();
        let tenants = self.registry.tenants().len();

        if count == 0 {
            return ServiceHealth::degraded("No active gateway providers loaded".to_string());
        }

        ServiceHealth::healthy(0).with_detail(format!(
            "{} providers across {} tenants",
            count, tenants
        ))
    }

    fn determine_overall_status(checks: &HashMap<String, ServiceHealth>) -> HealthStatus {
        let has_unhealthy = checks
            .values()
            .any(|health| health.status == HealthStatus::Unhealthy);

        let has_degraded = checks
            .values()
            .any(|health| health.status == HealthStatus::Degraded);

        if has_unhealthy {
            HealthStatus::Unhealthy
        } else if has_degraded {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }
}
