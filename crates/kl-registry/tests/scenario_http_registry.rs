//! LoRa App Server client against a mock HTTP server (no network).

use httpmock::prelude::*;
use kl_config::registry::RegistrySettings;
use kl_config::secrets::RegistryCredentials;
use kl_reconcile::{
    build_device_map, reconcile, Classification, KeyRow, ReconcileError, ReconcileOptions,
    Registry, RegistryOp,
};
use kl_registry::{LoraServerRegistry, AUTH_HEADER};
use serde_json::json;

const JWT: &str = "test-session-jwt";

fn settings(server: &MockServer) -> RegistrySettings {
    RegistrySettings {
        base_url: server.base_url(),
        application_id: 34,
        device_profile_id: "d0468204-0436-4275-b2a1-7967a41f5fa8".to_string(),
        description: "Agricultural sensor".to_string(),
        timeout_secs: 5,
        accept_invalid_certs: false,
    }
}

fn creds() -> RegistryCredentials {
    RegistryCredentials {
        username: "admin".to_string(),
        password: "pw".to_string(),
    }
}

async fn logged_in(server: &MockServer) -> LoraServerRegistry {
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/internal/login")
                .json_body(json!({"username": "admin", "password": "pw"}));
            then.status(200).json_body(json!({ "jwt": JWT }));
        })
        .await;
    LoraServerRegistry::login(&settings(server), &creds())
        .await
        .expect("login must succeed")
}

#[tokio::test]
async fn login_failure_is_a_remote_failure() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/api/internal/login");
            then.status(401)
                .json_body(json!({"error": "authentication failed", "code": 16}));
        })
        .await;

    let err = LoraServerRegistry::login(&settings(&server), &creds())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ReconcileError::RemoteFailure {
            op: RegistryOp::Login,
            ..
        }
    ));
    assert!(err.to_string().contains("authentication failed"));
}

#[tokio::test]
async fn object_does_not_exist_is_absent_not_an_error() {
    let server = MockServer::start_async().await;
    let reg = logged_in(&server).await;

    let get = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/api/devices/AABB")
                .header(AUTH_HEADER, JWT);
            then.status(404)
                .json_body(json!({"error": "object does not exist", "code": 5}));
        })
        .await;

    assert_eq!(reg.fetch_device("AABB").await.unwrap(), None);
    get.assert_async().await;
}

#[tokio::test]
async fn fetches_device_and_key() {
    let server = MockServer::start_async().await;
    let reg = logged_in(&server).await;

    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/devices/CCDD");
            then.status(200).json_body(json!({
                "device": {"devEUI": "CCDD", "name": "CCDD", "applicationID": "34"}
            }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/devices/CCDD/keys");
            then.status(200)
                .json_body(json!({"deviceKeys": {"devEUI": "CCDD", "nwkKey": "K0"}}));
        })
        .await;

    let dev = reg.fetch_device("CCDD").await.unwrap().expect("present");
    assert_eq!(dev.application_id.as_deref(), Some("34"));
    assert_eq!(reg.fetch_key("CCDD").await.unwrap().as_deref(), Some("K0"));
}

#[tokio::test]
async fn other_error_payloads_are_remote_failures() {
    let server = MockServer::start_async().await;
    let reg = logged_in(&server).await;

    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/devices/EEFF/keys");
            then.status(401)
                .json_body(json!({"error": "authentication failed", "code": 16}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/devices/EEFF");
            then.status(500).body("upstream exploded");
        })
        .await;

    let err = reg.fetch_key("EEFF").await.unwrap_err();
    assert!(matches!(
        err,
        ReconcileError::RemoteFailure {
            op: RegistryOp::FetchKey,
            ..
        }
    ));

    let err = reg.fetch_device("EEFF").await.unwrap_err();
    assert!(err.to_string().contains("http 500"), "got: {err}");
}

#[tokio::test]
async fn writes_use_expected_verbs_and_bodies() {
    let server = MockServer::start_async().await;
    let reg = logged_in(&server).await;

    let create = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/devices")
                .header(AUTH_HEADER, JWT)
                .json_body(json!({
                    "device": {
                        "applicationID": 34,
                        "description": "Agricultural sensor",
                        "devEUI": "70B3D5E75E00A1B2",
                        "deviceProfileID": "d0468204-0436-4275-b2a1-7967a41f5fa8",
                        "name": "E00A1B2"
                    }
                }));
            then.status(200).json_body(json!({}));
        })
        .await;
    let provision = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/devices/70B3D5E75E00A1B2/keys")
                .json_body(json!({"deviceKeys": {"devEUI": "70B3D5E75E00A1B2", "nwkKey": "K1"}}));
            then.status(200).json_body(json!({}));
        })
        .await;
    let overwrite = server
        .mock_async(|when, then| {
            when.method(PUT)
                .path("/api/devices/70B3D5E75E00A1B2/keys")
                .json_body(json!({"deviceKeys": {"devEUI": "70B3D5E75E00A1B2", "nwkKey": "K2"}}));
            then.status(200).body("");
        })
        .await;

    reg.create_device("70B3D5E75E00A1B2").await.unwrap();
    reg.provision_key("70B3D5E75E00A1B2", "K1").await.unwrap();
    reg.overwrite_key("70B3D5E75E00A1B2", "K2").await.unwrap();

    create.assert_async().await;
    provision.assert_async().await;
    overwrite.assert_async().await;
}

#[tokio::test]
async fn dry_run_against_http_registry_never_writes() {
    let server = MockServer::start_async().await;
    let reg = logged_in(&server).await;

    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/devices/AABB");
            then.status(404)
                .json_body(json!({"error": "object does not exist", "code": 5}));
        })
        .await;
    let any_write = server
        .mock_async(|when, then| {
            when.method(POST).path_contains("/api/devices");
            then.status(200).json_body(json!({}));
        })
        .await;

    let devices = build_device_map(vec![KeyRow::new("AABB", "K1")]);
    let report = reconcile(&reg, &devices, &ReconcileOptions::default())
        .await
        .unwrap();

    assert_eq!(
        report.classification_of("AABB"),
        Some(Classification::DeviceMissing)
    );
    any_write.assert_hits_async(0).await;
}

#[tokio::test]
async fn dev_eui_with_url_syntax_never_reaches_another_device() {
    let server = MockServer::start_async().await;
    let reg = logged_in(&server).await;

    let aabb = server
        .mock_async(|when, then| {
            when.method(GET).path("/api/devices/AABB");
            then.status(200)
                .json_body(json!({"device": {"devEUI": "AABB", "applicationID": "34"}}));
        })
        .await;
    let aabb_keys = server
        .mock_async(|when, then| {
            when.path("/api/devices/AABB/keys");
            then.status(200).json_body(json!({}));
        })
        .await;

    let r = reg.fetch_device("AABB?x=1").await;
    assert!(!matches!(r, Ok(Some(_))), "got: {r:?}");
    let r = reg.fetch_device("AABB#frag").await;
    assert!(!matches!(r, Ok(Some(_))), "got: {r:?}");

    let err = reg.overwrite_key("..", "K1").await.unwrap_err();
    assert!(matches!(
        err,
        ReconcileError::RemoteFailure {
            op: RegistryOp::OverwriteKey,
            ..
        }
    ));
    let _ = reg.provision_key("AABB/keys", "K1").await;

    aabb.assert_hits_async(0).await;
    aabb_keys.assert_hits_async(0).await;
}
