//! Proxy tuning and the forwarding target.

use std::fmt;
use std::time::Duration;

use hyper::Uri;
use metro_proxy_transport::MAX_HEAD_BYTES;

use crate::ProxyError;

// ---------------------------------------------------------------------------
// ProxyConfig
// ---------------------------------------------------------------------------

/// Timeouts and limits for a proxy instance.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// How long to wait for the backend to accept a TCP connection.
    pub connect_timeout: Duration,

    /// How long a client may take to send its request head.
    pub head_timeout: Duration,

    /// How long in-flight connections may keep running after shutdown
    /// begins. Anything still open afterwards is aborted.
    pub shutdown_grace: Duration,

    /// Largest request head accepted before answering 400.
    pub max_head_bytes: usize,
}

impl ProxyConfig {
    /// Default for [`connect_timeout`](Self::connect_timeout).
    pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Self::DEFAULT_CONNECT_TIMEOUT,
            head_timeout: Duration::from_secs(30),
            shutdown_grace: Duration::from_secs(2),
            max_head_bytes: MAX_HEAD_BYTES,
        }
    }
}

// ---------------------------------------------------------------------------
// Target
// ---------------------------------------------------------------------------

/// The backend every request is forwarded to.
///
/// Normalized to `http://host:port` with an explicit port, so the same
/// string works as a URL prefix, a `Host` header, and a connect address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    url: String,
    authority: String,
}

impl Target {
    /// Parses an `http://host[:port]` URL. Any path is ignored.
    pub fn parse(url: &str) -> Result<Self, ProxyError> {
        let invalid = || ProxyError::InvalidTarget(url.to_string());
        let uri: Uri = url.parse().map_err(|_| invalid())?;
        if uri.scheme_str() != Some("http") {
            return Err(invalid());
        }
        let authority = uri.authority().ok_or_else(invalid)?;
        let authority = format!("{}:{}", authority.host(), authority.port_u16().unwrap_or(80));
        Ok(Self {
            url: format!("http://{authority}"),
            authority,
        })
    }

    /// The normalized URL, without a trailing slash.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// `host:port`, used for `Host` rewriting and connecting.
    pub fn authority(&self) -> &str {
        &self.authority
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}
