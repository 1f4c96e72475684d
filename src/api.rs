use std::sync::Arc;

use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    clients::health::HealthChecker,
    engine::Dispatcher,
    models::{
        delivery::DeliveryAttempt, health::HealthStatus, response::ApiResponse,
        status::DeliveryStatus,
    },
};

pub struct AppState {
    pub dispatcher: Dispatcher,
    pub health_checker: HealthChecker,
}

impl AppState {
    pub fn new(dispatcher: Dispatcher) -> Self {
        let health_checker =
            HealthChecker::new(dispatcher.store().clone(), dispatcher.registry().clone());

        Self {
            dispatcher,
            health_checker,
        }
    }
}

/// Delivery report pushed by a gateway (or a relay in front of it). Each
/// provider config gets its own callback URL, keyed by the config id.
#[derive(Debug, Deserialize)]
pub struct StatusReport {
    pub provider_message_id: String,
    pub status: String,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route(
            "/webhooks/{provider_id}/delivery-status",
            post(delivery_status),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_api_server(
    state: Arc<AppState>,
    port: u16,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let app = router(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;

    info!(address = %addr, "HTTP server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    Ok(())
}

async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state
        .health_checker
        .check_all(state.dispatcher.deferred())
        .await;

    let status_code = match health.status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

async fn delivery_status(
    State(state): State<Arc<AppState>>,
    Path(provider_id): Path<Uuid>,
    Json(report): Json<StatusReport>,
) -> (StatusCode, Json<ApiResponse<DeliveryAttempt>>) {
    let status = match DeliveryStatus::from_string(&report.status.to_lowercase()) {
        Some(status) if status.is_terminal() => status,
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ApiResponse::error(
                    format!("Unsupported status: {}", report.status),
                    "Only delivered and failed reports are accepted".to_string(),
                )),
            );
        }
    };

    match state
        .dispatcher
        .apply_status_update(provider_id, &report.provider_message_id, status)
        .await
    {
        Ok(Some(record)) => (
            StatusCode::OK,
            Json(ApiResponse::success(
                record,
                "Delivery status updated".to_string(),
            )),
        ),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::error(
                format!("No sent message with id {}", report.provider_message_id),
                "Status report not applied".to_string(),
            )),
        ),
        Err(e) => {
            error!(error = %e, "Failed to apply delivery status");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error(
                    e.to_string(),
                    "Status report not applied".to_string(),
                )),
            )
        }
    }
}
