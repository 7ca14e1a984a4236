//! Reachability probes for arbitrary upstream addresses
//!
//! These bypass the admin API entirely and talk to the upstream directly.
//! Every outcome is folded into the return value; nothing here errors.

use serde::Serialize;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

/// Default connect timeout for [`tcp_check`]
pub const DEFAULT_TCP_TIMEOUT: Duration = Duration::from_millis(3000);

/// Open and immediately close a TCP connection to `host:port`.
///
/// Returns `false` on connect error or when the handshake does not complete
/// within `connect_timeout`. On timeout the pending connect future is dropped,
/// which tears the socket down before this returns.
pub async fn tcp_check(host: &str, port: u16, connect_timeout: Duration) -> bool {
    match timeout(connect_timeout, TcpStream::connect((host, port))).await {
        Ok(Ok(stream)) => {
            drop(stream);
            debug!(host = %host, port, "TCP connection OK");
            true
        }
        Ok(Err(e)) => {
            debug!(host = %host, port, error = %e, "TCP connect failed");
            false
        }
        Err(_) => {
            debug!(host = %host, port, timeout = ?connect_timeout, "TCP connect timed out");
            false
        }
    }
}

/// Outcome of an HTTP reachability check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpstreamCheck {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UpstreamCheck {
    fn status(status: u16) -> Self {
        Self {
            status: Some(status),
            error: None,
        }
    }

    fn error(error: impl Into<String>) -> Self {
        Self {
            status: None,
            error: Some(error.into()),
        }
    }

    /// Severity class for display: `success`, `info`, `warning` or `danger`
    pub fn badge(&self) -> &'static str {
        match self.status {
            Some(200..=299) => "success",
            Some(300..=399) => "info",
            Some(400..=499) => "warning",
            _ => "danger",
        }
    }
}

/// Scheme used for an HTTP check; anything unrecognised falls back to http
pub fn normalize_proto(proto: Option<&str>) -> &'static str {
    match proto.map(|p| p.trim().to_ascii_lowercase()) {
        Some(p) if p == "https" => "https",
        _ => "http",
    }
}

/// Issue `GET proto://addr/` and report the status code, without following
/// redirects
pub async fn http_check(addr: &str, proto: Option<&str>, check_timeout: Duration) -> UpstreamCheck {
    let url = format!("{}://{}/", normalize_proto(proto), addr.trim());

    let client = match reqwest::Client::builder()
        .timeout(check_timeout)
        .redirect(reqwest::redirect::Policy::none())
        .no_proxy()
        .build()
    {
        Ok(client) => client,
        Err(e) => return UpstreamCheck::error(e.to_string()),
    };

    match client.get(&url).send().await {
        Ok(response) => {
            let status = response.status().as_u16();
            debug!(url = %url, status, "HTTP check");
            UpstreamCheck::status(status)
        }
        Err(e) => {
            debug!(url = %url, error = %e, "HTTP check failed");
            UpstreamCheck::error(e.to_string())
        }
    }
}
