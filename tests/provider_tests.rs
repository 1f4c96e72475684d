use std::time::Duration;

use anyhow::Result;
use notification_dispatch::{
    clients::providers::{SendOutcome, build_provider},
    models::{
        provider::{BackendKind, ProviderConfig},
        status::{DeliveryStatus, FailureKind, SendStatus},
    },
};
use serde_json::json;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{basic_auth, bearer_token, body_partial_json, body_string_contains, header, method, path},
};

const TIMEOUT: Duration = Duration::from_secs(2);

fn config(kind: BackendKind, server: &MockServer) -> ProviderConfig {
    ProviderConfig::new("tenant-acme", kind, "+15550001111").with_base_url(server.uri())
}

fn assert_failure(outcome: &SendOutcome, kind: FailureKind) {
    assert!(!outcome.success, "Expected a failed outcome: {:?}", outcome);
    assert_eq!(outcome.status, SendStatus::Failed);
    assert_eq!(outcome.failure_kind, Some(kind));
    assert!(outcome.error.is_some());
}

/// Test: Twilio WhatsApp prefixes both addresses and authenticates with basic auth
#[tokio::test]
async fn test_twilio_whatsapp_send() -> Result<()> {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/2010-04-01/Accounts/AC123/Messages.json"))
        .and(basic_auth("AC123", "secret"))
        .and(body_string_contains("To=whatsapp%3A%2B212600000001"))
        .and(body_string_contains("From=whatsapp%3A%2B15550001111"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "sid": "SM0001",
            "status": "queued"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = build_provider(
        &config(BackendKind::TwilioWhatsapp, &server)
            .with_credential("account_sid", "AC123")
            .with_credential("auth_token", "secret"),
        TIMEOUT,
    )?;

    let outcome = provider.send("+212600000001", "Hello Karim").await;

    assert!(outcome.success);
    assert_eq!(outcome.status, SendStatus::Pending);
    assert_eq!(outcome.provider_message_id.as_deref(), Some("SM0001"));

    Ok(())
}

/// Test: Twilio SMS keeps plain numbers and maps delivery state on lookup
#[tokio::test]
async fn test_twilio_sms_send_and_status() -> Result<()> {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/2010-04-01/Accounts/AC9/Messages.json"))
        .and(body_string_contains("To=%2B212600000001"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "sid": "SM42",
            "status": "sent"
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/2010-04-01/Accounts/AC9/Messages/SM42.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "delivered" })))
        .mount(&server)
        .await;

    let provider = build_provider(
        &config(BackendKind::TwilioSms, &server)
            .with_credential("account_sid", "AC9")
            .with_credential("auth_token", "token"),
        TIMEOUT,
    )?;

    let outcome = provider.send("+212600000001", "Your balance is 500").await;
    assert_eq!(outcome, SendOutcome::sent(Some("SM42".to_string())));

    assert_eq!(provider.get_status("SM42").await, DeliveryStatus::Delivered);

    Ok(())
}

/// Test: Meta Cloud API uses bearer auth and returns the wamid
#[tokio::test]
async fn test_meta_cloud_send() -> Result<()> {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/1234567890/messages"))
        .and(bearer_token("meta-token"))
        .and(body_partial_json(json!({
            "messaging_product": "whatsapp",
            "to": "212600000001",
            "type": "text",
            "text": { "body": "Hello Karim" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "messages": [{ "id": "wamid.ABC" }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = build_provider(
        &config(BackendKind::MetaCloud, &server)
            .with_credential("access_token", "meta-token")
            .with_credential("phone_number_id", "1234567890"),
        TIMEOUT,
    )?;

    let outcome = provider.send("+212 600-000-001", "Hello Karim").await;

    assert!(outcome.success);
    assert_eq!(outcome.provider_message_id.as_deref(), Some("wamid.ABC"));

    Ok(())
}

/// Test: 360dialog authenticates with its API key header
#[tokio::test]
async fn test_dialog360_send() -> Result<()> {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/messages"))
        .and(header("D360-API-KEY", "d360-key"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "messages": [{ "id": "wamid.360" }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = build_provider(
        &config(BackendKind::Dialog360, &server).with_credential("api_key", "d360-key"),
        TIMEOUT,
    )?;

    let outcome = provider.send("+212600000001", "Hi").await;

    assert!(outcome.success);
    assert_eq!(outcome.provider_message_id.as_deref(), Some("wamid.360"));
    assert_eq!(provider.get_status("wamid.360").await, DeliveryStatus::Sent);

    Ok(())
}

/// Test: Vonage per-message status codes map to outcomes
#[tokio::test]
async fn test_vonage_status_codes() -> Result<()> {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/sms/json"))
        .and(body_string_contains("api_key=vkey"))
        .and(body_string_contains("text=ok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "messages": [{ "status": "0", "message-id": "V1" }]
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/sms/json"))
        .and(body_string_contains("text=throttle"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "messages": [{ "status": "1", "error-text": "Throttled" }]
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/sms/json"))
        .and(body_string_contains("text=bad"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "messages": [{ "status": "6", "error-text": "Unroutable message" }]
        })))
        .mount(&server)
        .await;

    let provider = build_provider(
        &config(BackendKind::Vonage, &server)
            .with_credential("api_key", "vkey")
            .with_credential("api_secret", "vsecret"),
        TIMEOUT,
    )?;

    let ok = provider.send("+212600000001", "ok").await;
    assert_eq!(ok, SendOutcome::sent(Some("V1".to_string())));

    let throttled = provider.send("+212600000001", "throttle").await;
    assert_failure(&throttled, FailureKind::Transient);

    let rejected = provider.send("+212600000001", "bad").await;
    assert_failure(&rejected, FailureKind::Permanent);
    assert!(rejected.error.unwrap_or_default().contains("Unroutable"));

    Ok(())
}

/// Test: MessageBird uses the AccessKey scheme and reads recipient status
#[tokio::test]
async fn test_messagebird_send_and_status() -> Result<()> {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/messages"))
        .and(header("authorization", "AccessKey live_key"))
        .and(body_partial_json(json!({ "recipients": ["212600000001"] })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "mb-1" })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/messages/mb-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "recipients": { "items": [{ "status": "delivery_failed" }] }
        })))
        .mount(&server)
        .await;

    let provider = build_provider(
        &config(BackendKind::MessageBird, &server).with_credential("access_key", "live_key"),
        TIMEOUT,
    )?;

    let outcome = provider.send("+212600000001", "Hi").await;
    assert_eq!(outcome.provider_message_id.as_deref(), Some("mb-1"));
    assert_eq!(provider.get_status("mb-1").await, DeliveryStatus::Failed);

    Ok(())
}

/// Test: Plivo answers with a queued message uuid
#[tokio::test]
async fn test_plivo_send() -> Result<()> {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/Account/MA123/Message/"))
        .and(basic_auth("MA123", "plivo-token"))
        .respond_with(ResponseTemplate::new(202).set_body_json(json!({
            "message": "message(s) queued",
            "message_uuid": ["uuid-1"]
        })))
        .mount(&server)
        .await;

    let provider = build_provider(
        &config(BackendKind::Plivo, &server)
            .with_credential("auth_id", "MA123")
            .with_credential("auth_token", "plivo-token"),
        TIMEOUT,
    )?;

    let outcome = provider.send("+212600000001", "Hi").await;

    assert!(outcome.success);
    assert_eq!(outcome.status, SendStatus::Pending);
    assert_eq!(outcome.provider_message_id.as_deref(), Some("uuid-1"));

    Ok(())
}

/// Test: Infobip rejected group is a permanent failure despite HTTP 200
#[tokio::test]
async fn test_infobip_rejected_group() -> Result<()> {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/sms/2/text/advanced"))
        .and(header("authorization", "App ib-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "messages": [{
                "messageId": "ib-1",
                "status": { "groupName": "REJECTED", "description": "Destination not registered" }
            }]
        })))
        .mount(&server)
        .await;

    let provider = build_provider(
        &config(BackendKind::Infobip, &server).with_credential("api_key", "ib-key"),
        TIMEOUT,
    )?;

    let outcome = provider.send("+212600000001", "Hi").await;
    assert_failure(&outcome, FailureKind::Permanent);

    Ok(())
}

/// Test: 5xx and 429 are transient, other 4xx are permanent
#[tokio::test]
async fn test_http_status_classification() -> Result<()> {
    let cases = [
        (500, FailureKind::Transient),
        (503, FailureKind::Transient),
        (429, FailureKind::Transient),
        (408, FailureKind::Transient),
        (400, FailureKind::Permanent),
        (401, FailureKind::Permanent),
        (404, FailureKind::Permanent),
    ];

    for (status, expected) in cases {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/messages"))
            .respond_with(
                ResponseTemplate::new(status)
                    .set_body_json(json!({ "error": { "message": "gateway says no" } })),
            )
            .mount(&server)
            .await;

        let provider = build_provider(
            &config(BackendKind::Dialog360, &server).with_credential("api_key", "k"),
            TIMEOUT,
        )?;

        let outcome = provider.send("+212600000001", "Hi").await;
        assert_failure(&outcome, expected);
        assert!(
            outcome.error.unwrap_or_default().contains("gateway says no"),
            "Error detail should come from the body for status {}",
            status
        );
    }

    Ok(())
}

/// Test: Every backend's client honours the configured timeout
#[tokio::test]
async fn test_slow_gateway_is_transient() -> Result<()> {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "id": "late" }))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let configs = [
        config(BackendKind::TwilioWhatsapp, &server)
            .with_credential("account_sid", "AC1")
            .with_credential("auth_token", "t"),
        config(BackendKind::MetaCloud, &server).with_credential("access_token", "t"),
        config(BackendKind::Dialog360, &server).with_credential("api_key", "k"),
        config(BackendKind::TwilioSms, &server)
            .with_credential("account_sid", "AC1")
            .with_credential("auth_token", "t"),
        config(BackendKind::Vonage, &server)
            .with_credential("api_key", "k")
            .with_credential("api_secret", "s"),
        config(BackendKind::MessageBird, &server).with_credential("access_key", "k"),
        config(BackendKind::Plivo, &server)
            .with_credential("auth_id", "MA1")
            .with_credential("auth_token", "t"),
        config(BackendKind::Infobip, &server).with_credential("api_key", "k"),
    ];

    for config in configs {
        let provider = build_provider(&config, Duration::from_millis(100))?;

        let outcome = provider.send("+212600000001", "Hi").await;
        assert_failure(&outcome, FailureKind::Transient);
        assert!(
            outcome.error.unwrap_or_default().contains("request failed"),
            "{} should time out on the client",
            config.backend_kind
        );
    }

    Ok(())
}

/// Test: Missing credentials fail at build time, not at send time
#[test]
fn test_missing_credentials_rejected() {
    let twilio = ProviderConfig::new("t1", BackendKind::TwilioSms, "+15550001111")
        .with_credential("account_sid", "AC1");
    assert!(build_provider(&twilio, TIMEOUT).is_err());

    let blank = ProviderConfig::new("t1", BackendKind::Infobip, "Acme").with_credential("api_key", "");
    assert!(build_provider(&blank, TIMEOUT).is_err());
}
