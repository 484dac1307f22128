//! Integration tests for the Infoblox backend
//!
//! Drives the provisioning engine against a wiremock stand-in for the WAPI.

use std::sync::Arc;

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use dnsproof::challenge::challenge_value;
use dnsproof::{
    ChallengeError, CleanupOutcome, InfobloxBackend, InfobloxSettings, PropagationSettings,
    ProvisioningEngine,
};

const KEY_AUTH: &str = "token.thumbprint";
const RECORD_REF: &str = "record:txt/ZG5zLmJpbmRfdHh0:_acme-challenge.example.com/External";

/// base64("admin:secret")
const BASIC_AUTH: &str = "Basic YWRtaW46c2VjcmV0";

fn engine(server: &MockServer) -> ProvisioningEngine {
    let settings = InfobloxSettings::new(&server.uri(), "admin", "secret");
    let backend = Arc::new(InfobloxBackend::new(settings).unwrap());
    ProvisioningEngine::new(backend, 120, PropagationSettings::default()).unwrap()
}

async fn mount_grid(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/wapi/v2.11/grid"))
        .and(header("authorization", BASIC_AUTH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([{ "_ref": "grid/b25lLmNsdXN0ZXIkMA:Infoblox" }])),
        )
        .mount(server)
        .await;
}

async fn mount_logout(server: &MockServer, times: u64) {
    Mock::given(method("POST"))
        .and(path("/wapi/v2.11/logout"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(times)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_present_and_cleanup_round_trip() {
    let server = MockServer::start().await;
    mount_grid(&server).await;
    mount_logout(&server, 2).await;

    Mock::given(method("POST"))
        .and(path("/wapi/v2.11/record:txt"))
        .and(header("authorization", BASIC_AUTH))
        .and(body_partial_json(json!({
            "name": "_acme-challenge.example.com",
            "text": challenge_value(KEY_AUTH),
            "ttl": 120,
            "use_ttl": true,
            "view": "External"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!(RECORD_REF)))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("DELETE"))
        .and(path(format!("/wapi/v2.11/{}", RECORD_REF)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(RECORD_REF)))
        .expect(1)
        .mount(&server)
        .await;

    let engine = engine(&server);

    // Wildcard and apex share the same record name
    engine.present("*.example.com", "token", KEY_AUTH).await.unwrap();
    assert_eq!(engine.outstanding(), 1);

    let outcome = engine
        .cleanup("*.example.com", "token", KEY_AUTH)
        .await
        .unwrap();
    assert_eq!(outcome, CleanupOutcome::Deleted);
    assert_eq!(engine.outstanding(), 0);
}

#[tokio::test]
async fn test_login_rejected() {
    let server = MockServer::start().await;
    mount_logout(&server, 0).await;

    Mock::given(method("GET"))
        .and(path("/wapi/v2.11/grid"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Authorization Required"))
        .mount(&server)
        .await;

    let engine = engine(&server);
    let err = engine
        .present("example.com", "token", KEY_AUTH)
        .await
        .unwrap_err();

    match &err {
        ChallengeError::Authentication { backend, domain, .. } => {
            assert_eq!(*backend, "infoblox");
            assert_eq!(domain, "example.com");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(engine.outstanding(), 0);
}

#[tokio::test]
async fn test_create_failure_still_logs_out() {
    let server = MockServer::start().await;
    mount_grid(&server).await;
    mount_logout(&server, 1).await;

    Mock::given(method("POST"))
        .and(path("/wapi/v2.11/record:txt"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "Error": "AdmConDataError: None (IBDataConflictError: IB.Data.Conflict:The view does not exist.)",
            "code": "Client.Ibap.Data.Conflict",
            "text": "The view does not exist."
        })))
        .mount(&server)
        .await;

    let engine = engine(&server);
    let err = engine
        .present("example.com", "token", KEY_AUTH)
        .await
        .unwrap_err();

    match &err {
        ChallengeError::RecordCreate { zone, .. } => {
            assert_eq!(zone, "(backend-managed)");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains("The view does not exist."));
    assert_eq!(engine.outstanding(), 0);
}

#[tokio::test]
async fn test_cleanup_of_vanished_record_is_already_absent() {
    let server = MockServer::start().await;
    mount_grid(&server).await;
    mount_logout(&server, 2).await;

    Mock::given(method("POST"))
        .and(path("/wapi/v2.11/record:txt"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!(RECORD_REF)))
        .mount(&server)
        .await;

    Mock::given(method("DELETE"))
        .and(path(format!("/wapi/v2.11/{}", RECORD_REF)))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "Error": "AdmConProtoError: Reference not found",
            "code": "Client.Ibap.Proto.NotFound",
            "text": "Reference not found"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let engine = engine(&server);
    engine.present("example.com", "token", KEY_AUTH).await.unwrap();

    let outcome = engine.cleanup("example.com", "token", KEY_AUTH).await.unwrap();
    assert_eq!(outcome, CleanupOutcome::AlreadyAbsent);
    assert_eq!(engine.outstanding(), 0);
}

#[tokio::test]
async fn test_unknown_cleanup_never_opens_a_session() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/wapi/v2.11/grid"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    let engine = engine(&server);
    let err = engine
        .cleanup("example.com", "never-presented", KEY_AUTH)
        .await
        .unwrap_err();

    match err {
        ChallengeError::UnknownChallenge { token, name, .. } => {
            assert_eq!(token, "never-presented");
            assert_eq!(name, "_acme-challenge.example.com.");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_unreachable_grid_is_transport_error() {
    // Bind then drop a listener so its port refuses connections
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let uri = format!("http://127.0.0.1:{}", port);

    let settings = InfobloxSettings::new(&uri, "admin", "secret");
    let backend = Arc::new(InfobloxBackend::new(settings).unwrap());
    let engine = ProvisioningEngine::new(backend, 120, PropagationSettings::default()).unwrap();

    let err = engine
        .present("example.com", "token", KEY_AUTH)
        .await
        .unwrap_err();
    assert!(matches!(err, ChallengeError::Transport { .. }));
    assert!(err.is_retryable());
}
