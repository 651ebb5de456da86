//! Unified error type for metro-proxy.

use metro_proxy_ports::ConfigError;
use metro_proxy_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each wrapping variant auto-generates `From`
/// impls, so the `?` operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// Port configuration is missing or invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A transport-level error (bind, accept, malformed request).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The forwarding target is not a usable `http://host:port` URL.
    #[error("invalid proxy target `{0}`")]
    InvalidTarget(String),

    /// A tunnel to the backend broke after the upgrade was answered.
    #[error("relay with {target} failed: {source}")]
    Relay {
        /// Target URL.
        target: String,
        /// Underlying socket error.
        #[source]
        source: std::io::Error,
    },

    /// The HTTP/1 connection with the client failed.
    #[error("http connection error: {0}")]
    Http(#[from] hyper::Error),

    /// Printing the port assignment failed.
    #[error("failed to encode port assignment: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Renders `err` followed by each of its sources, separated by `: `.
///
/// Client errors from the HTTP stack put the useful part (e.g. "Connection
/// refused") several sources deep.
pub(crate) fn error_chain(err: &dyn std::error::Error) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}
