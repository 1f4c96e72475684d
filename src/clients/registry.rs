use std::{
    collections::{BTreeSet, HashMap, hash_map::Entry},
    sync::Arc,
    time::Duration,
};

use anyhow::{Error, Result};
use parking_lot::RwLock;
use tracing::{info, warn};

use crate::{
    clients::{
        providers::{ChannelProvider, build_provider},
        store::ProviderConfigRepository,
    },
    models::provider::{Channel, ProviderConfig},
};

type ProviderKey = (String, Channel);
type ProviderMap = HashMap<ProviderKey, Arc<dyn ChannelProvider>>;

/// Live gateway instances keyed by tenant and channel.
///
/// Readers take a cheap `Arc` snapshot of the whole map. `refresh` builds a
/// new map off to the side and swaps it in, so a reader sees either the old
/// map or the new one and an in-flight send keeps the instance it resolved.
pub struct ProviderRegistry {
    providers: RwLock<Arc<ProviderMap>>,
    timeout: Duration,
}

impl ProviderRegistry {
    pub fn new(timeout: Duration) -> Self {
        Self {
            providers: RwLock::new(Arc::new(HashMap::new())),
            timeout,
        }
    }

    pub fn from_configs(configs: &[ProviderConfig], timeout: Duration) -> Self {
        let registry = Self::new(timeout);
        registry.refresh(configs);
        registry
    }

    /// Registry over prebuilt instances.
    pub fn with_providers(
        timeout: Duration,
        providers: impl IntoIterator<Item = (String, Channel, Arc<dyn ChannelProvider>)>,
    ) -> Self {
        let registry = Self::new(timeout);
        registry.swap(providers);
        registry
    }

    pub fn resolve(&self, tenant_id: &str, channel: Channel) -> Option<Arc<dyn ChannelProvider>> {
        self.snapshot()
            .get(&(tenant_id.to_string(), channel))
            .cloned()
    }

    pub fn snapshot(&self) -> Arc<ProviderMap> {
        self.providers.read().clone()
    }

    /// Rebuilds every backend from `configs` and swaps the map in one step.
    /// Returns the number of live instances.
    pub fn refresh(&self, configs: &[ProviderConfig]) -> usize {
        let map = build_map(configs, self.timeout);
        let count = map.len();
        *self.providers.write() = Arc::new(map);

        info!(providers = count, "Provider registry refreshed");
        count
    }

    pub fn swap(
        &self,
        providers: impl IntoIterator<Item = (String, Channel, Arc<dyn ChannelProvider>)>,
    ) {
        let map: ProviderMap = providers
            .into_iter()
            .map(|(tenant_id, channel, provider)| ((tenant_id, channel), provider))
            .collect();
        *self.providers.write() = Arc::new(map);
    }

    pub async fn reload(&self, repository: &dyn ProviderConfigRepository) -> Result<usize, Error> {
        let configs = repository.active_provider_configs().await?;
        Ok(self.refresh(&configs))
    }

    pub fn len(&self) -> usize {
        self.providers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn tenants(&self) -> BTreeSet<String> {
        self.snapshot().keys().map(|(tenant, _)| tenant.clone()).collect()
    }
}

fn build_map(configs: &[ProviderConfig], timeout: Duration) -> ProviderMap {
    let mut map = ProviderMap::new();

    for config in configs.iter().filter(|c| c.is_active) {
        if config.channel != config.backend_kind.channel() {
            warn!(
                provider_id = %config.id,
                channel = %config.channel,
                kind = %config.backend_kind,
                "Provider channel does not match backend kind, skipping"
            );
            continue;
        }

        let provider = match build_provider(config, timeout) {
            Ok(provider) => provider,
            Err(e) => {
                warn!(provider_id = %config.id, tenant_id = %config.tenant_id, error = %e, "Skipping provider");
                continue;
            }
        };

        match map.entry((config.tenant_id.clone(), config.channel)) {
            Entry::Vacant(slot) => {
                slot.insert(provider);
            }
            Entry::Occupied(_) => {
                warn!(
                    provider_id = %config.id,
                    tenant_id = %config.tenant_id,
                    channel = %config.channel,
                    "Duplicate active provider for tenant channel, keeping the first"
                );
            }
        }
    }

    map
}
