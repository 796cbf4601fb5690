//! Failure classification: what the engine retries and what it drops

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use planwise_core::domain::{DataType, Operation, Payload, UserId};
use planwise_core::ports::{IRemoteStore, RemoteError};
use planwise_remote::{HttpRemoteStore, RemoteClient};

use crate::common::{self, course_payload};

async fn put_with_status(status: u16) -> RemoteError {
    let (server, store) = common::setup_remote_mock().await;
    common::mount(
        &server,
        "PUT",
        "/v1/users/u-1/courses/42",
        ResponseTemplate::new(status).set_body_string("nope"),
    )
    .await;

    store
        .apply(
            DataType::Course,
            "42",
            Operation::Update,
            &course_payload("x"),
        )
        .await
        .unwrap_err()
}

#[tokio::test]
async fn test_server_errors_are_transient() {
    for status in [500, 502, 503, 504, 429, 408] {
        let err = put_with_status(status).await;
        assert!(
            matches!(err, RemoteError::Transient(_)),
            "{} gave {:?}",
            status,
            err
        );
    }
}

#[tokio::test]
async fn test_validation_errors_are_permanent() {
    for status in [400, 409, 422] {
        let err = put_with_status(status).await;
        assert!(
            matches!(err, RemoteError::Permanent(_)),
            "{} gave {:?}",
            status,
            err
        );
    }
}

#[tokio::test]
async fn test_put_to_missing_collection_is_permanent() {
    let err = put_with_status(404).await;
    assert!(matches!(err, RemoteError::Permanent(_)));
}

#[tokio::test]
async fn test_auth_failures() {
    for status in [401, 403] {
        let err = put_with_status(status).await;
        assert!(matches!(err, RemoteError::Unauthorized(_)));
        assert!(err.is_transient());
    }
}

#[tokio::test]
async fn test_error_carries_body_excerpt() {
    let err = put_with_status(400).await;
    assert_eq!(err, RemoteError::Permanent("400 Bad Request: nope".into()));
}

#[tokio::test]
async fn test_missing_token_is_rejected_by_server() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/users/u-1/courses/42"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    let client = RemoteClient::new(&format!("{}/v1", server.uri()), Duration::from_secs(5)).unwrap();
    let store = HttpRemoteStore::new(client, UserId::new("u-1").unwrap());

    let err = store.fetch(DataType::Course, "42").await.unwrap_err();
    assert!(matches!(err, RemoteError::Unauthorized(_)));
}

#[tokio::test]
async fn test_timeout_is_transient() {
    let server = MockServer::start().await;
    common::mount(
        &server,
        "GET",
        "/v1/users/u-1/courses/42",
        ResponseTemplate::new(200)
            .set_delay(Duration::from_millis(500))
            .set_body_json(json!({ "version": "1", "data": {} })),
    )
    .await;
    let store = common::store_for(&server, Duration::from_millis(50));

    let err = store.fetch(DataType::Course, "42").await.unwrap_err();
    assert!(matches!(err, RemoteError::Transient(_)));
}

#[tokio::test]
async fn test_unreachable_server_is_transient() {
    let server = MockServer::start().await;
    let store = common::store_for(&server, Duration::from_secs(1));
    drop(server);

    let err = store.list(DataType::Course).await.unwrap_err();
    assert!(matches!(err, RemoteError::Transient(_)));
}

#[tokio::test]
async fn test_malformed_document_is_permanent() {
    let (server, store) = common::setup_remote_mock().await;
    common::mount(
        &server,
        "GET",
        "/v1/users/u-1/courses/42",
        ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"),
    )
    .await;

    let err = store.fetch(DataType::Course, "42").await.unwrap_err();
    assert!(matches!(err, RemoteError::Permanent(_)));
}

#[tokio::test]
async fn test_document_without_any_version_is_rejected() {
    let (server, store) = common::setup_remote_mock().await;
    common::mount(
        &server,
        "GET",
        "/v1/users/u-1/courses/42",
        ResponseTemplate::new(200).set_body_json(json!({ "data": { "title": "x" } })),
    )
    .await;

    let err = store.fetch(DataType::Course, "42").await.unwrap_err();
    assert!(matches!(err, RemoteError::Permanent(_)));
}

#[tokio::test]
async fn test_empty_put_response_has_no_version() {
    let (server, store) = common::setup_remote_mock().await;
    common::mount(
        &server,
        "PUT",
        "/v1/users/u-1/courses/42",
        ResponseTemplate::new(200),
    )
    .await;

    let outcome = store
        .apply(DataType::Course, "42", Operation::Create, &Payload::new())
        .await
        .unwrap();
    assert!(outcome.server_version.is_none());
}
