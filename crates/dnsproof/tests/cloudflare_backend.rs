//! Integration tests for the Cloudflare backend
//!
//! Drives the provisioning engine against a wiremock stand-in for API v4.

use std::sync::Arc;

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use dnsproof::challenge::challenge_value;
use dnsproof::{
    ChallengeError, CleanupOutcome, CloudflareAuth, CloudflareBackend, CloudflareSettings,
    PropagationSettings, ProvisioningEngine, ZoneApex,
};

const KEY_AUTH: &str = "token.thumbprint";

fn token_settings(server: &MockServer) -> CloudflareSettings {
    let mut settings = CloudflareSettings::new(CloudflareAuth::Token {
        dns_token: "dns-token".to_string(),
        zone_token: Some("zone-token".to_string()),
    });
    settings.base_url = server.uri();
    settings
}

fn engine(settings: CloudflareSettings) -> ProvisioningEngine {
    let backend = Arc::new(CloudflareBackend::new(settings).unwrap());
    ProvisioningEngine::new(backend, 120, PropagationSettings::default()).unwrap()
}

fn zone_page(zones: &[(&str, &str)], page: u32, total_pages: u32) -> serde_json::Value {
    let result: Vec<_> = zones
        .iter()
        .map(|(id, name)| json!({ "id": id, "name": name }))
        .collect();
    json!({
        "success": true,
        "errors": [],
        "messages": [],
        "result": result,
        "result_info": { "page": page, "per_page": 50, "total_pages": total_pages }
    })
}

fn record_response(id: &str) -> serde_json::Value {
    json!({
        "success": true,
        "errors": [],
        "messages": [],
        "result": { "id": id, "type": "TXT" }
    })
}

fn failure(code: i64, message: &str) -> serde_json::Value {
    json!({
        "success": false,
        "errors": [{ "code": code, "message": message }],
        "messages": [],
        "result": null
    })
}

#[tokio::test]
async fn test_present_and_cleanup_prefers_most_specific_zone() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/zones"))
        .and(query_param("page", "1"))
        .and(header("authorization", "Bearer zone-token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(zone_page(&[("zone-apex", "example.com")], 1, 2)),
        )
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/zones"))
        .and(query_param("page", "2"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(zone_page(&[("zone-sub", "sub.example.com")], 2, 2)),
        )
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/zones/zone-sub/dns_records"))
        .and(header("authorization", "Bearer dns-token"))
        .and(body_partial_json(json!({
            "type": "TXT",
            "name": "_acme-challenge.www.sub.example.com",
            "content": format!("\"{}\"", challenge_value(KEY_AUTH)),
            "ttl": 120
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(record_response("rec-1")))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/zones/zone-sub/dns_records/rec-1"))
        .and(header("authorization", "Bearer dns-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(record_response("rec-1")))
        .expect(1)
        .mount(&server)
        .await;

    let engine = engine(token_settings(&server));

    engine
        .present("www.sub.example.com", "token", KEY_AUTH)
        .await
        .unwrap();
    assert_eq!(engine.outstanding(), 1);

    let outcome = engine
        .cleanup("www.sub.example.com", "token", KEY_AUTH)
        .await
        .unwrap();
    assert_eq!(outcome, CleanupOutcome::Deleted);
    assert_eq!(engine.outstanding(), 0);
}

#[tokio::test]
async fn test_global_api_key_headers() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/zones"))
        .and(header("x-auth-email", "ops@example.com"))
        .and(header("x-auth-key", "global-key"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(zone_page(&[("zone-apex", "example.com")], 1, 1)),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/zones/zone-apex/dns_records"))
        .and(header("x-auth-key", "global-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(record_response("rec-9")))
        .expect(1)
        .mount(&server)
        .await;

    let mut settings = CloudflareSettings::new(CloudflareAuth::ApiKey {
        email: "ops@example.com".to_string(),
        key: "global-key".to_string(),
    });
    settings.base_url = server.uri();

    let engine = engine(settings);
    engine.present("*.example.com", "token", KEY_AUTH).await.unwrap();
    assert_eq!(engine.outstanding(), 1);
}

#[tokio::test]
async fn test_pinned_zone_skips_enumeration() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/zones"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/zones/pinned-id/dns_records"))
        .respond_with(ResponseTemplate::new(200).set_body_json(record_response("rec-2")))
        .expect(1)
        .mount(&server)
        .await;

    let mut settings = token_settings(&server);
    settings.zone = Some(ZoneApex::new("example.com", Some("pinned-id".to_string())));

    let engine = engine(settings);
    engine.present("example.com", "token", KEY_AUTH).await.unwrap();
}

#[tokio::test]
async fn test_pinned_zone_rejects_foreign_domain() {
    let server = MockServer::start().await;

    let mut settings = token_settings(&server);
    settings.zone = Some(ZoneApex::new("example.com", Some("pinned-id".to_string())));

    let engine = engine(settings);
    let err = engine
        .present("example.org", "token", KEY_AUTH)
        .await
        .unwrap_err();
    assert!(matches!(err, ChallengeError::ZoneNotFound { .. }));
    assert_eq!(engine.outstanding(), 0);
}

#[tokio::test]
async fn test_zone_not_found() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/zones"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(zone_page(&[("zone-org", "example.org")], 1, 1)),
        )
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(record_response("never")))
        .expect(0)
        .mount(&server)
        .await;

    let engine = engine(token_settings(&server));
    let err = engine
        .present("example.com", "token", KEY_AUTH)
        .await
        .unwrap_err();

    match err {
        ChallengeError::ZoneNotFound { backend, name, .. } => {
            assert_eq!(backend, "cloudflare");
            assert_eq!(name, "_acme-challenge.example.com.");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_authentication_failure() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/zones"))
        .respond_with(
            ResponseTemplate::new(403).set_body_json(failure(9109, "Invalid access token")),
        )
        .mount(&server)
        .await;

    let engine = engine(token_settings(&server));
    let err = engine
        .present("example.com", "token", KEY_AUTH)
        .await
        .unwrap_err();

    assert!(matches!(err, ChallengeError::Authentication { .. }));
    assert!(!err.is_retryable());
    assert_eq!(engine.outstanding(), 0);
}

#[tokio::test]
async fn test_create_rejected_keeps_nothing() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/zones"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(zone_page(&[("zone-apex", "example.com")], 1, 1)),
        )
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/zones/zone-apex/dns_records"))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_json(failure(81058, "An identical record already exists.")),
        )
        .mount(&server)
        .await;

    let engine = engine(token_settings(&server));
    let err = engine
        .present("example.com", "token", KEY_AUTH)
        .await
        .unwrap_err();

    match &err {
        ChallengeError::RecordCreate { name, .. } => {
            assert_eq!(name, "_acme-challenge.example.com");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains("81058"));
    assert_eq!(engine.outstanding(), 0);
}

#[tokio::test]
async fn test_cleanup_of_vanished_record_is_already_absent() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/zones/pinned-id/dns_records"))
        .respond_with(ResponseTemplate::new(200).set_body_json(record_response("rec-3")))
        .mount(&server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/zones/pinned-id/dns_records/rec-3"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(failure(81044, "Record does not exist.")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let mut settings = token_settings(&server);
    settings.zone = Some(ZoneApex::new("example.com", Some("pinned-id".to_string())));

    let engine = engine(settings);
    engine.present("example.com", "token", KEY_AUTH).await.unwrap();

    let outcome = engine.cleanup("example.com", "token", KEY_AUTH).await.unwrap();
    assert_eq!(outcome, CleanupOutcome::AlreadyAbsent);
    assert_eq!(engine.outstanding(), 0);

    // The reference is gone, so a second cleanup never reaches the API
    let err = engine
        .cleanup("example.com", "token", KEY_AUTH)
        .await
        .unwrap_err();
    assert!(matches!(err, ChallengeError::UnknownChallenge { .. }));
}

#[tokio::test]
async fn test_failed_delete_keeps_reference_for_retry() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/zones/pinned-id/dns_records"))
        .respond_with(ResponseTemplate::new(200).set_body_json(record_response("rec-4")))
        .mount(&server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/zones/pinned-id/dns_records/rec-4"))
        .respond_with(ResponseTemplate::new(500).set_body_json(failure(1000, "Internal error")))
        .mount(&server)
        .await;

    let mut settings = token_settings(&server);
    settings.zone = Some(ZoneApex::new("example.com", Some("pinned-id".to_string())));

    let engine = engine(settings);
    engine.present("example.com", "token", KEY_AUTH).await.unwrap();

    let err = engine
        .cleanup("example.com", "token", KEY_AUTH)
        .await
        .unwrap_err();
    assert!(matches!(err, ChallengeError::RecordDelete { .. }));
    assert_eq!(engine.outstanding(), 1);
}

#[tokio::test]
async fn test_ttl_below_minimum_rejected() {
    let server = MockServer::start().await;
    let backend = Arc::new(CloudflareBackend::new(token_settings(&server)).unwrap());

    let err = ProvisioningEngine::new(backend, 60, PropagationSettings::default()).unwrap_err();
    assert!(matches!(err, ChallengeError::Configuration { .. }));
    assert!(err.to_string().contains("120"));
}
