//! Shared helpers for remote store integration tests
//!
//! Each test starts its own wiremock server and gets an `HttpRemoteStore`
//! pointing at it, scoped to user `u-1` with a fixed bearer token.

use std::time::Duration;

use serde_json::{json, Value};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use planwise_core::domain::{Payload, UserId};
use planwise_remote::{HttpRemoteStore, RemoteClient};

pub const TOKEN: &str = "test-access-token";

/// Starts a mock server and returns a store pointing at it
pub async fn setup_remote_mock() -> (MockServer, HttpRemoteStore) {
    let server = MockServer::start().await;
    let store = store_for(&server, Duration::from_secs(5));
    (server, store)
}

/// Store with a custom request timeout
pub fn store_for(server: &MockServer, timeout: Duration) -> HttpRemoteStore {
    let client = RemoteClient::new(&format!("{}/v1", server.uri()), timeout)
        .expect("mock server URI parses")
        .with_token(TOKEN);
    HttpRemoteStore::new(client, UserId::new("u-1").unwrap())
}

/// Mounts a response for `verb` on `route`, requiring the bearer token
#[allow(dead_code)]
pub async fn mount(server: &MockServer, verb: &str, route: &str, response: ResponseTemplate) {
    Mock::given(method(verb))
        .and(path(route))
        .and(header("authorization", format!("Bearer {}", TOKEN).as_str()))
        .respond_with(response)
        .mount(server)
        .await;
}

#[allow(dead_code)]
pub fn course_payload(title: &str) -> Payload {
    match json!({ "title": title, "credits": 6 }) {
        Value::Object(map) => map,
        _ => unreachable!(),
    }
}
