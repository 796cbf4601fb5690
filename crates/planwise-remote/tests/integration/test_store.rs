//! Document reads and writes against the mock API

use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, ResponseTemplate};

use planwise_core::domain::{DataType, Operation, Payload};
use planwise_core::ports::IRemoteStore;

use crate::common::{self, course_payload};

#[tokio::test]
async fn test_put_sends_payload_and_reads_body_version() {
    let (server, store) = common::setup_remote_mock().await;
    Mock::given(method("PUT"))
        .and(path("/v1/users/u-1/courses/42"))
        .and(body_json(json!({ "title": "Linear Algebra", "credits": 6 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "version": "v2" })))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = store
        .apply(
            DataType::Course,
            "42",
            Operation::Update,
            &course_payload("Linear Algebra"),
        )
        .await
        .expect("apply failed");

    assert_eq!(outcome.server_version.as_deref(), Some("v2"));
}

#[tokio::test]
async fn test_create_falls_back_to_etag() {
    let (server, store) = common::setup_remote_mock().await;
    common::mount(
        &server,
        "PUT",
        "/v1/users/u-1/semesters/2024-fall",
        ResponseTemplate::new(201).insert_header("ETag", "W/\"17\""),
    )
    .await;

    let outcome = store
        .apply(
            DataType::Semester,
            "2024-fall",
            Operation::Create,
            &Payload::new(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.server_version.as_deref(), Some("17"));
}

#[tokio::test]
async fn test_numeric_version_in_body() {
    let (server, store) = common::setup_remote_mock().await;
    common::mount(
        &server,
        "PUT",
        "/v1/users/u-1/profile/me",
        ResponseTemplate::new(200).set_body_json(json!({ "version": 31 })),
    )
    .await;

    let outcome = store
        .apply(DataType::Profile, "me", Operation::Update, &Payload::new())
        .await
        .unwrap();
    assert_eq!(outcome.server_version.as_deref(), Some("31"));
}

#[tokio::test]
async fn test_delete_without_version() {
    let (server, store) = common::setup_remote_mock().await;
    common::mount(
        &server,
        "DELETE",
        "/v1/users/u-1/notifications/n-1",
        ResponseTemplate::new(204),
    )
    .await;

    let outcome = store
        .apply(
            DataType::Notification,
            "n-1",
            Operation::Delete,
            &Payload::new(),
        )
        .await
        .unwrap();
    assert!(outcome.server_version.is_none());
}

#[tokio::test]
async fn test_delete_of_missing_document_succeeds() {
    let (server, store) = common::setup_remote_mock().await;
    common::mount(
        &server,
        "DELETE",
        "/v1/users/u-1/courses/gone",
        ResponseTemplate::new(404),
    )
    .await;

    let result = store
        .apply(DataType::Course, "gone", Operation::Delete, &Payload::new())
        .await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_fetch_returns_record() {
    let (server, store) = common::setup_remote_mock().await;
    common::mount(
        &server,
        "GET",
        "/v1/users/u-1/courses/42",
        ResponseTemplate::new(200).set_body_json(json!({
            "version": "v9",
            "data": { "title": "Linear Algebra", "credits": 6 }
        })),
    )
    .await;

    let record = store
        .fetch(DataType::Course, "42")
        .await
        .unwrap()
        .expect("document should exist");

    assert_eq!(record.server_version, "v9");
    assert_eq!(record.payload, course_payload("Linear Algebra"));
}

#[tokio::test]
async fn test_fetch_uses_etag_when_body_has_no_version() {
    let (server, store) = common::setup_remote_mock().await;
    common::mount(
        &server,
        "GET",
        "/v1/users/u-1/courses/42",
        ResponseTemplate::new(200)
            .insert_header("ETag", "\"abc\"")
            .set_body_json(json!({ "data": {} })),
    )
    .await;

    let record = store.fetch(DataType::Course, "42").await.unwrap().unwrap();
    assert_eq!(record.server_version, "abc");
    assert!(record.payload.is_empty());
}

#[tokio::test]
async fn test_fetch_missing_document_is_none() {
    let (server, store) = common::setup_remote_mock().await;
    common::mount(
        &server,
        "GET",
        "/v1/users/u-1/courses/404",
        ResponseTemplate::new(404),
    )
    .await;

    assert!(store.fetch(DataType::Course, "404").await.unwrap().is_none());
}

#[tokio::test]
async fn test_ids_are_path_escaped() {
    let (server, store) = common::setup_remote_mock().await;
    common::mount(
        &server,
        "GET",
        "/v1/users/u-1/courses/MATH%20101",
        ResponseTemplate::new(200).set_body_json(json!({ "version": "1", "data": {} })),
    )
    .await;

    let record = store.fetch(DataType::Course, "MATH 101").await.unwrap();
    assert!(record.is_some());
}

#[tokio::test]
async fn test_list_collection() {
    let (server, store) = common::setup_remote_mock().await;
    common::mount(
        &server,
        "GET",
        "/v1/users/u-1/courses",
        ResponseTemplate::new(200).set_body_json(json!([
            { "id": "42", "version": "v9" },
            { "id": "7", "version": 3 }
        ])),
    )
    .await;

    let entries = store.list(DataType::Course).await.unwrap();

    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].id, "42");
    assert_eq!(entries[0].server_version, "v9");
    assert_eq!(entries[1].server_version, "3");
}

#[tokio::test]
async fn test_list_missing_collection_is_empty() {
    let (server, store) = common::setup_remote_mock().await;
    common::mount(
        &server,
        "GET",
        "/v1/users/u-1/notifications",
        ResponseTemplate::new(404),
    )
    .await;

    assert!(store.list(DataType::Notification).await.unwrap().is_empty());
}
