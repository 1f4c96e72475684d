use std::{sync::Arc, time::Duration};

use anyhow::{Error, Result};
use notification_dispatch::{
    api::{AppState, run_api_server},
    clients::{database::PgStore, registry::ProviderRegistry},
    config::Config,
    engine::{Dispatcher, DispatcherDeps, RetrySweep},
    utils::{SystemClock, init_tracing, retry_with_backoff},
};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<(), Error> {
    let config = Config::load()?;
    init_tracing(&config.log_format);

    info!(
        worker_concurrency = config.worker_concurrency,
        max_retry_attempts = config.max_retry_attempts,
        "Starting notification dispatch service"
    );

    let store = Arc::new(
        retry_with_backoff(&config.retry_config(), || PgStore::connect(&config.database_url))
            .await?,
    );
    store.migrate().await?;

    let registry = Arc::new(ProviderRegistry::new(config.send_timeout()));
    let loaded = registry.reload(store.as_ref()).await?;
    info!(providers = loaded, tenants = registry.tenants().len(), "Provider registry loaded");

    let deps = DispatcherDeps {
        templates: store.clone(),
        settings: store.clone(),
        store: store.clone(),
        registry: registry.clone(),
        clock: Arc::new(SystemClock),
    };
    let (dispatcher, mut failures) = Dispatcher::new(deps, config.dispatcher_config());

    let shutdown = CancellationToken::new();

    tokio::spawn(async move {
        while let Some(failure) = failures.recv().await {
            error!(
                label = %failure.label,
                error = %failure.error,
                at = %failure.at,
                "Dispatch failure"
            );
        }
    });

    tokio::spawn(RetrySweep::new(dispatcher.clone()).run(
        Duration::from_secs(config.retry_sweep_interval_secs),
        shutdown.clone(),
    ));

    {
        let dispatcher = dispatcher.clone();
        let cancel = shutdown.clone();
        let interval = Duration::from_secs(config.deferred_poll_interval_secs);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = ticker.tick() => {
                        dispatcher.replay_deferred();
                    }
                }
            }
        });
    }

    {
        let store = store.clone();
        let registry = registry.clone();
        let cancel = shutdown.clone();
        let interval = Duration::from_secs(config.registry_refresh_interval_secs);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = ticker.tick() => {
                        if let Err(e) = registry.reload(store.as_ref()).await {
                            warn!(error = %e, "Provider registry refresh failed, keeping previous map");
                        }
                    }
                }
            }
        });
    }

    {
        let cancel = shutdown.clone();
        tokio::spawn(async move {
            if signal::ctrl_c().await.is_ok() {
                info!("Shutdown signal received");
            }
            cancel.cancel();
        });
    }

    let state = Arc::new(AppState::new(dispatcher.clone()));
    run_api_server(state, config.server_port, shutdown.clone()).await?;

    info!(
        in_flight = dispatcher.pool().in_flight(),
        deferred = dispatcher.deferred().len(),
        "Waiting for in-flight dispatches"
    );
    dispatcher.shutdown().await;

    Ok(())
}
