//! # metro-proxy
//!
//! Dev-time reverse proxy in front of the Metro bundler.
//!
//! Developers (and devices on the LAN) connect to one public port; every
//! HTTP request and WebSocket upgrade is relayed to Metro on loopback. When
//! Metro is not running the client gets a `502` explaining which address
//! the proxy tried, instead of a bare connection reset.
//!
//! ```text
//! client ──▶ 0.0.0.0:{RCT_METRO_PORT} ──▶ 127.0.0.1:{metro port}
//!                 │
//!                 ├─ plain request  → hyper, Host rewritten, 502 response on failure
//!                 ├─ upgrade        → raw byte tunnel, raw 502 on failure
//!                 └─ garbage        → "HTTP/1.1 400 Bad Request"
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::path::Path;
//! use metro_proxy::prelude::*;
//!
//! # async fn run() -> Result<(), ProxyError> {
//! let ports = resolve_ports(Path::new("."), PortResolver::default())?;
//! let server = ProxyServerBuilder::from_ports(&ports).build().await?;
//! server.run().await
//! # }
//! ```

mod config;
mod error;
mod forward;
mod handler;
mod server;
mod shutdown;
mod telemetry;
mod tunnel;

pub use config::{ProxyConfig, Target};
pub use error::ProxyError;
pub use server::{ProxyServer, ProxyServerBuilder};
pub use shutdown::shutdown_signal;
pub use telemetry::{RegistrationState, TracingRegistration};

/// Re-exports the commonly used types, including the port resolver.
pub mod prelude {
    pub use crate::{
        ProxyConfig, ProxyError, ProxyServer, ProxyServerBuilder, Target, TracingRegistration,
    };
    pub use metro_proxy_ports::{
        ConfigError, PortAssignment, PortDerivation, PortResolver, resolve_ports,
    };
}
