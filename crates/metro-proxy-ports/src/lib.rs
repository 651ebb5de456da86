//! Port resolution for metro-proxy.
//!
//! Reads `RCT_METRO_PORT` (and optionally `WEB_PORT`) from a layered
//! environment and derives the ports the proxy and Metro listen on:
//!
//! ```text
//! default.env  <  .env  <  process environment
//!                     │
//!                     ▼
//!              RCT_METRO_PORT = p      (proxy, 2..=65535)
//!              metro port     = p - 1  (or p, see PortDerivation)
//! ```
//!
//! ```rust,no_run
//! use std::path::Path;
//! use metro_proxy_ports::{resolve_ports, PortResolver};
//!
//! let ports = resolve_ports(Path::new("."), PortResolver::default())?;
//! println!("{} -> {}", ports.proxy_port, ports.metro_port);
//! # Ok::<(), metro_proxy_ports::ConfigError>(())
//! ```

mod env;
mod error;
mod ports;

pub use env::{DEFAULTS_FILE, EnvLayer, EnvSnapshot, LOCAL_FILE};
pub use error::ConfigError;
pub use ports::{
    METRO_PORT_VAR, MIN_PROXY_PORT, PortAssignment, PortDerivation, PortResolver,
    WEB_PORT_VAR, port_in_range, resolve_ports,
};
