//! HTTP implementation of [`IRemoteStore`]
//!
//! Documents live under `/users/{user_id}/{collection}/{id}`:
//!
//! | Call | Request | Success |
//! |------|---------|---------|
//! | `apply(create / update)` | `PUT` document, JSON body | `{"version"}` body or `ETag` |
//! | `apply(delete)` | `DELETE` document | 2xx or 404 |
//! | `fetch` | `GET` document | `{"version", "data"}`, 404 is `None` |
//! | `list` | `GET` collection | `[{"id", "version"}]` |
//!
//! Versions are opaque; numeric versions are carried as their decimal text.

use async_trait::async_trait;
use planwise_core::domain::{DataType, Operation, Payload, UserId};
use planwise_core::ports::{ApplyOutcome, IRemoteStore, RemoteEntry, RemoteError, RemoteRecord};
use reqwest::header::{HeaderMap, ETAG};
use reqwest::{Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::client::{classify_transport, RemoteClient};

// ============================================================================
// Wire types
// ============================================================================

/// Version token as sent by the server: either a string or a number
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireVersion {
    Text(String),
    Number(u64),
}

impl WireVersion {
    fn into_string(self) -> String {
        match self {
            WireVersion::Text(s) => s,
            WireVersion::Number(n) => n.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WriteResponse {
    version: Option<WireVersion>,
}

#[derive(Debug, Deserialize)]
struct DocumentResponse {
    version: Option<WireVersion>,
    #[serde(default)]
    data: Payload,
}

#[derive(Debug, Deserialize)]
struct ListEntry {
    id: String,
    version: WireVersion,
}

/// Path segment of a data type's collection
pub fn collection(data_type: DataType) -> &'static str {
    match data_type {
        DataType::Course => "courses",
        DataType::Semester => "semesters",
        DataType::Profile => "profile",
        DataType::Notification => "notifications",
    }
}

/// Reads a version from an `ETag` header, dropping quotes and the weak prefix
fn etag_version(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(ETAG)?.to_str().ok()?.trim();
    let raw = raw.strip_prefix("W/").unwrap_or(raw);
    let tag = raw.trim_matches('"');
    (!tag.is_empty()).then(|| tag.to_string())
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, RemoteError> {
    let body = response.bytes().await.map_err(classify_transport)?;
    serde_json::from_slice(&body)
        .map_err(|e| RemoteError::Permanent(format!("Invalid response: {}", e)))
}

// ============================================================================
// HttpRemoteStore
// ============================================================================

/// Remote store scoped to one user's documents
#[derive(Debug, Clone)]
pub struct HttpRemoteStore {
    client: RemoteClient,
    user_id: UserId,
}

impl HttpRemoteStore {
    pub fn new(client: RemoteClient, user_id: UserId) -> Self {
        Self { client, user_id }
    }

    pub fn client(&self) -> &RemoteClient {
        &self.client
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    async fn write(
        &self,
        method: Method,
        data_type: DataType,
        id: &str,
        payload: Option<&Payload>,
    ) -> Result<ApplyOutcome, RemoteError> {
        let mut request = self.client.request(
            method.clone(),
            &["users", self.user_id.as_str(), collection(data_type), id],
        )?;
        if let Some(payload) = payload {
            request = request.json(payload);
        }

        let response = self.client.send(request).await?;
        if response.status() == StatusCode::NOT_FOUND {
            if method == Method::DELETE {
                debug!(%data_type, id, "Delete of missing document treated as done");
                return Ok(ApplyOutcome::default());
            }
            return Err(RemoteError::Permanent(format!(
                "{} {}/{} returned 404",
                method, data_type, id
            )));
        }

        let header_version = etag_version(response.headers());
        let body = response.bytes().await.map_err(classify_transport)?;
        let body_version = if body.iter().all(u8::is_ascii_whitespace) {
            None
        } else {
            serde_json::from_slice::<WriteResponse>(&body)
                .ok()
                .and_then(|w| w.version)
                .map(WireVersion::into_string)
        };

        Ok(ApplyOutcome {
            server_version: body_version.or(header_version),
        })
    }
}

#[async_trait]
impl IRemoteStore for HttpRemoteStore {
    async fn apply(
        &self,
        data_type: DataType,
        id: &str,
        operation: Operation,
        payload: &Payload,
    ) -> Result<ApplyOutcome, RemoteError> {
        debug!(%data_type, id, %operation, "Applying mutation remotely");
        match operation {
            Operation::Create | Operation::Update => {
                self.write(Method::PUT, data_type, id, Some(payload)).await
            }
            Operation::Delete => self.write(Method::DELETE, data_type, id, None).await,
        }
    }

    async fn fetch(&self, data_type: DataType, id: &str) -> Result<Option<RemoteRecord>, RemoteError> {
        let request = self.client.request(
            Method::GET,
            &["users", self.user_id.as_str(), collection(data_type), id],
        )?;
        let response = self.client.send(request).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let header_version = etag_version(response.headers());
        let document: DocumentResponse = read_json(response).await?;
        let server_version = document
            .version
            .map(WireVersion::into_string)
            .or(header_version)
            .ok_or_else(|| {
                RemoteError::Permanent(format!("{}/{} has no version", data_type, id))
            })?;

        Ok(Some(RemoteRecord {
            server_version,
            payload: document.data,
        }))
    }

    async fn list(&self, data_type: DataType) -> Result<Vec<RemoteEntry>, RemoteError> {
        let request = self.client.request(
            Method::GET,
            &["users", self.user_id.as_str(), collection(data_type)],
        )?;
        let response = self.client.send(request).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }

        let entries: Vec<ListEntry> = read_json(response).await?;
        debug!(%data_type, count = entries.len(), "Listed remote collection");
        Ok(entries
            .into_iter()
            .map(|e| RemoteEntry {
                id: e.id,
                server_version: e.version.into_string(),
            })
            .collect())
    }
}
