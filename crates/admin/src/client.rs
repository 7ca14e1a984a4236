//! Remote call gateway for the Caddy admin API
//!
//! Every remote interaction goes through [`AdminTransport::call`] or
//! [`AdminTransport::fetch_text`]. Transport, status and parse failures are
//! folded into an [`AdminCallResult`] instead of being returned as `Err`, so
//! callers always get a value they can render. Calls are attempted exactly
//! once; retrying is the caller's business.

use crate::error::{AdminError, Result};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// Full running configuration
pub const CONFIG_PATH: &str = "/config/";
/// HTTP app server set
pub const SERVERS_PATH: &str = "/config/apps/http/servers";
/// Live upstream health
pub const UPSTREAMS_PATH: &str = "/reverse_proxy/upstreams";
/// Replace the entire configuration
pub const LOAD_PATH: &str = "/load";
/// Prometheus exposition text
pub const METRICS_PATH: &str = "/metrics";

/// Path of one server's route sequence
pub fn server_routes_path(server_name: &str) -> String {
    format!("{}/{}/routes", SERVERS_PATH, server_name)
}

/// Outcome of a single admin API call.
///
/// `error` is the success discriminant: when it is set, `data` is always
/// `None`. The constructors are the only way to build one, which keeps that
/// invariant intact.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdminCallResult<T = Value> {
    data: Option<T>,
    error: Option<String>,
}

impl<T> AdminCallResult<T> {
    /// Successful call carrying a payload
    pub fn ok(data: T) -> Self {
        Self {
            data: Some(data),
            error: None,
        }
    }

    /// Successful call with an empty body
    pub fn empty() -> Self {
        Self {
            data: None,
            error: None,
        }
    }

    /// Failed call
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            data: None,
            error: Some(error.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    pub fn data(&self) -> Option<&T> {
        self.data.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn into_data(self) -> Option<T> {
        self.data
    }

    /// Convert into a `Result` so callers can use `?`
    pub fn into_result(self) -> std::result::Result<Option<T>, String> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.data),
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> AdminCallResult<U> {
        AdminCallResult {
            data: self.data.map(f),
            error: self.error,
        }
    }
}

impl<T> From<AdminError> for AdminCallResult<T> {
    fn from(err: AdminError) -> Self {
        Self::failure(err.to_string())
    }
}

/// Seam between the gateway and everything that consumes it.
///
/// The provided methods name the admin endpoints this adapter uses.
#[async_trait]
pub trait AdminTransport: Send + Sync {
    /// Issue a JSON request against `path`, relative to the admin base URL
    async fn call(&self, method: Method, path: &str, body: Option<&Value>) -> AdminCallResult;

    /// Issue a GET whose successful payload is raw text rather than JSON
    async fn fetch_text(&self, path: &str) -> AdminCallResult<String>;

    async fn full_config(&self) -> AdminCallResult {
        self.call(Method::GET, CONFIG_PATH, None).await
    }

    async fn servers(&self) -> AdminCallResult {
        self.call(Method::GET, SERVERS_PATH, None).await
    }

    async fn server_routes(&self, server_name: &str) -> AdminCallResult {
        self.call(Method::GET, &server_routes_path(server_name), None)
            .await
    }

    async fn upstreams(&self) -> AdminCallResult {
        self.call(Method::GET, UPSTREAMS_PATH, None).await
    }

    async fn reload_config(&self, config: &Value) -> AdminCallResult {
        self.call(Method::POST, LOAD_PATH, Some(config)).await
    }

    async fn metrics_text(&self) -> AdminCallResult<String> {
        self.fetch_text(METRICS_PATH).await
    }
}

/// reqwest-backed admin API client
#[derive(Debug, Clone)]
pub struct AdminClient {
    client: reqwest::Client,
    base_url: String,
}

impl AdminClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .no_proxy()
            .build()
            .map_err(|e| AdminError::Client(e.to_string()))?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        debug!(base_url = %base_url, timeout = ?timeout, "Admin client created");

        Ok(Self { client, base_url })
    }

    pub fn from_config(config: &config::AdminConfig) -> Result<Self> {
        Self::new(config.url.clone(), config.timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send a request and return the body text of a 2xx response
    async fn send(&self, method: Method, path: &str, body: Option<&Value>) -> Result<String> {
        let mut request = self
            .client
            .request(method, self.url(path))
            .header(CONTENT_TYPE, "application/json");

        if let Some(body) = body {
            request = request.body(serde_json::to_vec(body)?);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        debug!(path = %path, status = status.as_u16(), bytes = text.len(), "Admin API response");

        if !status.is_success() {
            return Err(AdminError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        Ok(text)
    }
}

#[async_trait]
impl AdminTransport for AdminClient {
    async fn call(&self, method: Method, path: &str, body: Option<&Value>) -> AdminCallResult {
        debug!(method = %method, path = %path, "Admin API call");

        let result = self.send(method.clone(), path, body).await.and_then(|text| {
            if text.is_empty() {
                Ok(None)
            } else {
                serde_json::from_str::<Value>(&text).map(Some).map_err(AdminError::from)
            }
        });

        match result {
            Ok(Some(data)) => AdminCallResult::ok(data),
            Ok(None) => AdminCallResult::empty(),
            Err(e) => {
                warn!(method = %method, path = %path, error = %e, "Admin API call failed");
                e.into()
            }
        }
    }

    async fn fetch_text(&self, path: &str) -> AdminCallResult<String> {
        debug!(path = %path, "Admin API text fetch");

        match self.send(Method::GET, path, None).await {
            Ok(text) => AdminCallResult::ok(text),
            Err(e) => {
                warn!(path = %path, error = %e, "Admin API text fetch failed");
                e.into()
            }
        }
    }
}
