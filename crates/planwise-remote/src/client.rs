//! HTTP client for the Planwise document API
//!
//! Thin wrapper around `reqwest` that owns the base URL and bearer token,
//! builds escaped endpoint URLs and classifies every failure into a
//! [`RemoteError`] so the sync engine can decide whether to retry.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use planwise_remote::client::RemoteClient;
//! use reqwest::Method;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let client = RemoteClient::new("https://api.example.com/v1", Duration::from_secs(30))?
//!     .with_token("access-token-here");
//! let response = client
//!     .send(client.request(Method::GET, &["users", "u-1", "courses"])?)
//!     .await?;
//! println!("{}", response.status());
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use anyhow::{bail, Context, Result};
use planwise_core::ports::RemoteError;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use tracing::{debug, warn};
use url::Url;

/// Longest response body excerpt carried in an error message
const MAX_ERROR_DETAIL: usize = 200;

// ============================================================================
// RemoteClient
// ============================================================================

/// HTTP client bound to one API base URL
#[derive(Debug, Clone)]
pub struct RemoteClient {
    client: Client,
    base_url: Url,
    access_token: Option<String>,
}

impl RemoteClient {
    /// Creates a client for `base_url` with a per-request timeout
    ///
    /// # Errors
    /// Fails if the URL does not parse or cannot carry a path
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .with_context(|| format!("Invalid remote base URL: {}", base_url))?;
        if base_url.cannot_be_a_base() {
            bail!("Remote base URL cannot carry a path: {}", base_url);
        }

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("planwise/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url,
            access_token: None,
        })
    }

    /// Attaches a bearer token to every request
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// Replaces the bearer token (e.g., after the embedding app refreshed it)
    pub fn set_access_token(&mut self, token: impl Into<String>) {
        self.access_token = Some(token.into());
    }

    /// Returns the base URL for API requests
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Builds the URL for a path below the base URL; segments are percent-encoded
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url, RemoteError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| RemoteError::Permanent(format!("Unusable base URL: {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Creates a request builder with the bearer token attached
    pub fn request(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder, RemoteError> {
        let url = self.endpoint(segments)?;
        let builder = self.client.request(method, url);
        Ok(match &self.access_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        })
    }

    /// Sends a request and classifies the outcome
    ///
    /// Successful (2xx) responses are returned untouched. A 404 is also
    /// returned so callers can decide what "not found" means for them;
    /// every other status becomes a [`RemoteError`].
    pub async fn send(&self, request: RequestBuilder) -> Result<Response, RemoteError> {
        let response = request.send().await.map_err(classify_transport)?;
        let status = response.status();

        if status.is_success() || status == StatusCode::NOT_FOUND {
            debug!(url = %response.url(), status = status.as_u16(), "Remote request finished");
            return Ok(response);
        }

        let url = response.url().clone();
        let detail = response
            .text()
            .await
            .map(|body| excerpt(&body))
            .unwrap_or_default();
        let error = classify_status(status, &detail);

        match &error {
            RemoteError::Unauthorized(_) => {
                warn!(%url, status = status.as_u16(), "Remote rejected credentials")
            }
            RemoteError::Transient(_) => {
                debug!(%url, status = status.as_u16(), "Transient remote failure")
            }
            RemoteError::Permanent(_) => {
                warn!(%url, status = status.as_u16(), "Remote rejected request")
            }
        }
        Err(error)
    }
}

// ============================================================================
// Error classification
// ============================================================================

/// Maps a non-success HTTP status to the retry taxonomy
///
/// - 401 / 403: `Unauthorized`
/// - 408, 429 and every 5xx: `Transient`
/// - any other status: `Permanent`
pub fn classify_status(status: StatusCode, detail: &str) -> RemoteError {
    let message = if detail.is_empty() {
        status.to_string()
    } else {
        format!("{}: {}", status, detail)
    };

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => RemoteError::Unauthorized(message),
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => RemoteError::Transient(message),
        s if s.is_server_error() => RemoteError::Transient(message),
        _ => RemoteError::Permanent(message),
    }
}

/// Maps a transport-level `reqwest` error
///
/// Connection, timeout and body errors are transient. Errors building the
/// request itself will never succeed on retry.
pub fn classify_transport(err: reqwest::Error) -> RemoteError {
    if err.is_builder() {
        RemoteError::Permanent(format!("Invalid request: {}", err))
    } else if err.is_decode() {
        RemoteError::Permanent(format!("Invalid response: {}", err))
    } else {
        RemoteError::Transient(format!("Network error: {}", err))
    }
}

fn excerpt(body: &str) -> String {
    let body = body.trim();
    match body.char_indices().nth(MAX_ERROR_DETAIL) {
        Some((cut, _)) => format!("{}...", &body[..cut]),
        None => body.to_string(),
    }
}
