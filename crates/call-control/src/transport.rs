//! Request-issuing collaborator
//!
//! The registry never talks HTTP itself. Everything goes through a
//! [`PlatformTransport`], which the application supplies (usually an
//! [`HttpTransport`], a mock in tests). Paths are relative to the platform's
//! REST prefix, e.g. `/account/~/extension/~`.

use std::fmt;

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::{header, Client, Method, RequestBuilder};
use serde_json::Value;
use tracing::{debug, trace};

use crate::config::HttpTransportConfig;
use crate::error::{CallControlError, CallControlResult};

/// Asynchronous, fallible JSON request interface to the platform
#[async_trait]
pub trait PlatformTransport: Send + Sync {
    /// Issue a GET and return the decoded JSON body
    async fn get(&self, path: &str) -> CallControlResult<Value>;

    /// Issue a POST with a JSON body
    async fn post(&self, path: &str, body: Value) -> CallControlResult<Value>;

    /// Issue a PATCH with a JSON body
    async fn patch(&self, path: &str, body: Value) -> CallControlResult<Value>;

    /// Issue a DELETE; empty bodies come back as `Value::Null`
    async fn delete(&self, path: &str) -> CallControlResult<Value>;
}

/// reqwest-backed transport with bearer authentication
///
/// The token can be swapped through a shared handle, so an application that
/// keeps an `Arc<HttpTransport>` next to the registry can refresh it in place.
pub struct HttpTransport {
    client: Client,
    base: String,
    access_token: RwLock<Option<String>>,
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport")
            .field("base", &self.base)
            .field("authenticated", &self.access_token.read().is_some())
            .finish()
    }
}

impl HttpTransport {
    pub fn new(config: HttpTransportConfig) -> CallControlResult<Self> {
        let base_url = config.base_url()?;
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| CallControlError::config(format!("failed to build HTTP client: {}", e)))?;

        let base = format!(
            "{}{}",
            base_url.as_str().trim_end_matches('/'),
            config.api_prefix.trim_end_matches('/')
        );

        Ok(Self {
            client,
            base,
            access_token: RwLock::new(config.access_token),
        })
    }

    /// Replace the bearer token (after an OAuth refresh)
    ///
    /// Requests already in flight keep the token they were built with.
    pub fn set_access_token(&self, token: impl Into<String>) {
        *self.access_token.write() = Some(token.into());
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base, path)
        } else {
            format!("{}/{}", self.base, path)
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let mut builder = self
            .client
            .request(method, self.url(path))
            .header(header::ACCEPT, "application/json");
        if let Some(token) = self.access_token.read().as_deref() {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    async fn send(&self, method: Method, path: &str, body: Option<Value>) -> CallControlResult<Value> {
        debug!("{} {}", method, path);
        let mut builder = self.request(method, path);
        if let Some(body) = body {
            builder = builder.json(&body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(CallControlError::HttpStatus {
                status: status.as_u16(),
                body: text,
            });
        }

        trace!("response {} ({} bytes)", status, text.len());
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }
}

#[async_trait]
impl PlatformTransport for HttpTransport {
    async fn get(&self, path: &str) -> CallControlResult<Value> {
        self.send(Method::GET, path, None).await
    }

    async fn post(&self, path: &str, body: Value) -> CallControlResult<Value> {
        self.send(Method::POST, path, Some(body)).await
    }

    async fn patch(&self, path: &str, body: Value) -> CallControlResult<Value> {
        self.send(Method::PATCH, path, Some(body)).await
    }

    async fn delete(&self, path: &str) -> CallControlResult<Value> {
        self.send(Method::DELETE, path, None).await
    }
}
