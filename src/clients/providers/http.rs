use std::time::Duration;

use anyhow::{Result, anyhow};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;
use tracing::{debug, warn};

use super::SendOutcome;
use crate::models::provider::ProviderConfig;

const MAX_ERROR_BODY_CHARS: usize = 200;

pub(super) fn http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| anyhow!("Failed to build HTTP client: {}", e))
}

pub(super) fn required<'a>(config: &'a ProviderConfig, key: &str) -> Result<&'a str> {
    config.credential(key).ok_or_else(|| {
        anyhow!(
            "{} provider {} is missing credential '{}'",
            config.backend_kind,
            config.id,
            key
        )
    })
}

pub(super) fn base_url(config: &ProviderConfig, default: &str) -> String {
    config
        .base_url
        .as_deref()
        .unwrap_or(default)
        .trim_end_matches('/')
        .to_string()
}

/// Digits only, as most JSON gateways want them.
pub(super) fn digits(phone: &str) -> String {
    phone.chars().filter(|c| c.is_ascii_digit()).collect()
}

pub(super) fn str_at<'a>(value: &'a Value, pointer: &str) -> Option<&'a str> {
    value.pointer(pointer).and_then(Value::as_str)
}

/// Sends a request and returns the parsed 2xx body, or the failure outcome.
///
/// Transport errors, 5xx, 408 and 429 are transient. Every other non-2xx is permanent.
pub(super) async fn execute(request: RequestBuilder, gateway: &str) -> Result<Value, SendOutcome> {
    let response = match request.send().await {
        Ok(response) => response,
        Err(e) => {
            warn!(gateway, error = %e, timeout = e.is_timeout(), "Gateway request failed");
            return Err(SendOutcome::transient(format!(
                "{} request failed: {}",
                gateway, e
            )));
        }
    };

    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    if status.is_success() {
        debug!(gateway, %status, "Gateway accepted request");
        return Ok(serde_json::from_str(&body).unwrap_or(Value::Null));
    }

    let message = format!("{} returned {}: {}", gateway, status, error_detail(&body));
    warn!(gateway, %status, "Gateway rejected request");

    if is_transient_status(status) {
        Err(SendOutcome::transient(message))
    } else {
        Err(SendOutcome::permanent(message))
    }
}

/// GET helper for status polling. Any failure yields `None`.
pub(super) async fn fetch_json(request: RequestBuilder, gateway: &str) -> Option<Value> {
    match request.send().await {
        Ok(response) if response.status().is_success() => response.json().await.ok(),
        Ok(response) => {
            debug!(gateway, status = %response.status(), "Status lookup rejected");
            None
        }
        Err(e) => {
            debug!(gateway, error = %e, "Status lookup failed");
            None
        }
    }
}

pub(super) fn is_transient_status(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
}

fn error_detail(body: &str) -> String {
    if let Ok(json) = serde_json::from_str::<Value>(body) {
        let candidates = [
            "/error/message",
            "/message",
            "/error_message",
            "/error",
            "/errors/0/description",
            "/requestError/serviceException/text",
        ];

        if let Some(detail) = candidates.iter().find_map(|p| str_at(&json, p)) {
            return detail.to_string();
        }
    }

    body.chars().take(MAX_ERROR_BODY_CHARS).collect()
}
