//! HttpRemote against a mock worker.
use httpmock::prelude::*;
use histo_common::model::{JobCommand, RemoteState, VersionKey};
use histo_common::{Config, HistoError, RemoteStatusClient};
use histo_net::HttpRemote;
use serde_json::json;

fn remote_for(server: &MockServer) -> HttpRemote {
    let config = Config::for_api_url(format!("{}/api", server.base_url()));
    HttpRemote::new(&config).unwrap()
}

fn key() -> VersionKey {
    VersionKey::new("release", "1.2.5").unwrap()
}

#[tokio::test]
async fn start_falls_back_until_an_encoding_is_accepted() {
    let server = MockServer::start_async().await;
    let first = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/install")
                .json_body(json!({"version": "1.2.5", "category": "Release", "full_assets": true}));
            then.status(200).json_body(json!({"error": "unknown field: version"}));
        })
        .await;
    let second = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/install")
                .json_body(json!({"folder": "1.2.5", "category": "Release", "full_assets": true}));
            then.status(400).json_body(json!({"error": "unknown field: folder"}));
        })
        .await;
    let third = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/install")
                .json_body(json!({"version_key": "Release/1.2.5", "full_assets": true}));
            then.status(200)
                .json_body(json!({"started": true, "version": "Release/1.2.5"}));
        })
        .await;

    let confirmed = remote_for(&server).start(&key(), true).await.unwrap();

    assert_eq!(confirmed, key());
    first.assert_async().await;
    second.assert_async().await;
    third.assert_async().await;
}

#[tokio::test]
async fn start_exhaustion_reports_every_attempt() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/api/install");
            then.status(200).json_body(json!({"error": "worker busy"}));
        })
        .await;

    let err = remote_for(&server).start(&key(), false).await.unwrap_err();

    match err {
        HistoError::StartRejected {
            key,
            attempts,
            last_error,
        } => {
            assert_eq!(key, "Release/1.2.5");
            assert_eq!(attempts, 5);
            assert!(last_error.contains("worker busy"));
        }
        other => panic!("expected StartRejected, got {other:?}"),
    }
}

#[tokio::test]
async fn non_json_start_response_counts_as_rejection() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/api/install");
            then.status(200).body("<html>started</html>");
        })
        .await;

    let err = remote_for(&server).start(&key(), true).await.unwrap_err();
    assert!(matches!(err, HistoError::StartRejected { .. }));
}

#[tokio::test]
async fn poll_normalizes_the_status_body() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET);
            then.status(200).json_body(json!({
                "status": "downloading",
                "stage": "libraries",
                "stage_percent": 50,
                "overall_percent": 37.5,
                "bytes_done": 1200,
                "bytes_total": 4000,
                "message": "Downloading libraries"
            }));
        })
        .await;

    let status = remote_for(&server).poll(&key()).await.unwrap();

    assert_eq!(status.state, RemoteState::Downloading);
    assert_eq!(status.percent, 37);
    assert_eq!(status.bytes_done, 1200);
    assert_eq!(status.bytes_total, 4000);
    assert_eq!(status.stage.as_deref(), Some("libraries"));
    assert_eq!(status.message.as_deref(), Some("Downloading libraries"));
}

#[tokio::test]
async fn poll_failures_are_transient() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET);
            then.status(503).body("unavailable");
        })
        .await;

    let err = remote_for(&server).poll(&key()).await.unwrap_err();
    assert!(matches!(err, HistoError::TransientPoll(_)));
    assert!(err.is_transient());
}

#[tokio::test]
async fn malformed_status_is_transient() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET);
            then.status(200).body("{\"overall_percent\": ");
        })
        .await;

    let err = remote_for(&server).poll(&key()).await.unwrap_err();
    assert!(matches!(err, HistoError::TransientPoll(_)));
}

#[tokio::test]
async fn command_error_body_is_a_failure() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST);
            then.status(200).json_body(json!({"error": "no such job"}));
        })
        .await;

    let err = remote_for(&server)
        .send_command(&key(), JobCommand::Pause)
        .await
        .unwrap_err();
    assert!(matches!(err, HistoError::Api(_)));
}

#[tokio::test]
async fn command_success_ignores_body_shape() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST);
            then.status(200).body("ok");
        })
        .await;

    remote_for(&server).cancel(&key()).await.unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn snapshot_reads_initial_endpoint() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/initial");
            then.status(200).json_body(json!({
                "categories": ["Release"],
                "default_category": "Release",
                "installing": [
                    {"version_key": "Release/1.2.5", "overall_percent": 12, "bytes_done": 10, "bytes_total": 100}
                ],
                "installed": [
                    {"category": "release", "folder": "1.0", "display": "Minecraft 1.0"}
                ]
            }));
        })
        .await;

    let snapshot = remote_for(&server).snapshot().await.unwrap();

    assert_eq!(snapshot.installing.len(), 1);
    assert_eq!(snapshot.installing[0].key, key());
    assert_eq!(snapshot.installing[0].percent, 12);
    let installed = snapshot
        .installed_entry(&VersionKey::new("Release", "1.0").unwrap())
        .unwrap();
    assert_eq!(installed.display, "Minecraft 1.0");
}
