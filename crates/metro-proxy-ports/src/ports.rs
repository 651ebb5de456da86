//! Port assignment: which port the proxy exposes and where Metro listens.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{ConfigError, EnvSnapshot};

/// Variable naming the externally exposed (proxy) port.
pub const METRO_PORT_VAR: &str = "RCT_METRO_PORT";

/// Variable naming the web dev-server port.
pub const WEB_PORT_VAR: &str = "WEB_PORT";

/// Lowest port accepted for `RCT_METRO_PORT`. One above the minimum so the
/// derived Metro port stays positive.
pub const MIN_PROXY_PORT: u16 = 2;

/// Returns `true` if `n` lies in `[min, max]`.
pub fn port_in_range(n: i64, min: u16, max: u16) -> bool {
    n >= i64::from(min) && n <= i64::from(max)
}

// ---------------------------------------------------------------------------
// PortDerivation
// ---------------------------------------------------------------------------

/// How the Metro port follows from the proxy port.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PortDerivation {
    /// Metro listens one port below the proxy.
    #[default]
    BelowProxy,
    /// Metro and the proxy share the number. Only usable when they bind
    /// different interfaces.
    SamePort,
}

impl PortDerivation {
    /// Computes the Metro port. May be out of range; callers validate.
    pub fn derive(self, proxy_port: u16) -> i64 {
        match self {
            Self::BelowProxy => i64::from(proxy_port) - 1,
            Self::SamePort => i64::from(proxy_port),
        }
    }
}

impl fmt::Display for PortDerivation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BelowProxy => write!(f, "below-proxy"),
            Self::SamePort => write!(f, "same-port"),
        }
    }
}

impl FromStr for PortDerivation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "below-proxy" => Ok(Self::BelowProxy),
            "same-port" => Ok(Self::SamePort),
            other => Err(format!(
                "unknown port derivation `{other}` (expected `below-proxy` or `same-port`)"
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// PortAssignment
// ---------------------------------------------------------------------------

/// The validated set of ports for one dev session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortAssignment {
    /// Public port the proxy binds on all interfaces.
    pub proxy_port: u16,
    /// Port Metro listens on, derived from `proxy_port`.
    pub metro_port: u16,
    /// Web dev-server port, when requested.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub web_port: Option<u16>,
}

impl PortAssignment {
    /// URL the proxy forwards to.
    pub fn target_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.metro_port)
    }
}

// ---------------------------------------------------------------------------
// PortResolver
// ---------------------------------------------------------------------------

/// Turns an [`EnvSnapshot`] into a [`PortAssignment`], failing loudly on
/// anything missing or malformed.
#[derive(Debug, Clone, Copy, Default)]
pub struct PortResolver {
    derivation: PortDerivation,
    require_web_port: bool,
}

impl PortResolver {
    /// Creates a resolver using the given derivation rule.
    pub fn new(derivation: PortDerivation) -> Self {
        Self {
            derivation,
            require_web_port: false,
        }
    }

    /// Also resolve `WEB_PORT`, treating its absence as an error.
    pub fn require_web_port(mut self, required: bool) -> Self {
        self.require_web_port = required;
        self
    }

    /// Resolves the ports from `env`.
    pub fn resolve(&self, env: &EnvSnapshot) -> Result<PortAssignment, ConfigError> {
        let raw = env.get(METRO_PORT_VAR).ok_or(ConfigError::MissingVar {
            var: METRO_PORT_VAR,
        })?;
        let proxy_port = parse_port(METRO_PORT_VAR, raw, MIN_PROXY_PORT)?;

        let derived = self.derivation.derive(proxy_port);
        if !port_in_range(derived, 1, u16::MAX) {
            return Err(ConfigError::DerivedPortOutOfRange { port: derived });
        }
        let metro_port = u16::try_from(derived)
            .map_err(|_| ConfigError::DerivedPortOutOfRange { port: derived })?;

        let web_port = if self.require_web_port {
            let raw = env.get(WEB_PORT_VAR).ok_or(ConfigError::MissingVar {
                var: WEB_PORT_VAR,
            })?;
            Some(parse_port(WEB_PORT_VAR, raw, 1)?)
        } else {
            None
        };

        Ok(PortAssignment {
            proxy_port,
            metro_port,
            web_port,
        })
    }
}

/// Parses `raw` as a base-10 port in `[min, 65535]`.
fn parse_port(var: &'static str, raw: &str, min: u16) -> Result<u16, ConfigError> {
    let invalid = || ConfigError::InvalidPort {
        var,
        raw: raw.to_string(),
        min,
        max: u16::MAX,
    };
    let n: i64 = raw.trim().parse().map_err(|_| invalid())?;
    if !port_in_range(n, min, u16::MAX) {
        return Err(invalid());
    }
    u16::try_from(n).map_err(|_| invalid())
}

/// Loads the env layers under `root` and resolves the ports.
pub fn resolve_ports(
    root: &Path,
    resolver: PortResolver,
) -> Result<PortAssignment, ConfigError> {
    let env = EnvSnapshot::load(root)?;
    for var in [METRO_PORT_VAR, WEB_PORT_VAR] {
        if let Some(source) = env.source_of(var) {
            tracing::debug!(var, source, "resolved variable");
        }
    }
    resolver.resolve(&env)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EnvLayer;

    fn env(pairs: &[(&str, &str)]) -> EnvSnapshot {
        EnvSnapshot::from_layers(vec![EnvLayer::from_pairs("test", pairs.iter().copied())])
    }

    #[test]
    fn test_below_proxy_derivation() {
        let ports = PortResolver::default()
            .resolve(&env(&[("RCT_METRO_PORT", "8932")]))
            .unwrap();
        assert_eq!(ports.proxy_port, 8932);
        assert_eq!(ports.metro_port, 8931);
        assert_eq!(ports.web_port, None);
        assert_eq!(ports.target_url(), "http://127.0.0.1:8931");
    }

    #[test]
    fn test_same_port_derivation() {
        let ports = PortResolver::new(PortDerivation::SamePort)
            .resolve(&env(&[("RCT_METRO_PORT", "8081")]))
            .unwrap();
        assert_eq!(ports.proxy_port, 8081);
        assert_eq!(ports.metro_port, 8081);
    }

    #[test]
    fn test_range_edges() {
        let r = PortResolver::default();
        let low = r.resolve(&env(&[("RCT_METRO_PORT", "2")])).unwrap();
        assert_eq!((low.proxy_port, low.metro_port), (2, 1));
        let high = r.resolve(&env(&[("RCT_METRO_PORT", "65535")])).unwrap();
        assert_eq!((high.proxy_port, high.metro_port), (65535, 65534));
    }

    #[test]
    fn test_every_valid_port_resolves() {
        for derivation in [PortDerivation::BelowProxy, PortDerivation::SamePort] {
            let r = PortResolver::new(derivation);
            for p in (2u16..=65535).step_by(97).chain([65535]) {
                let raw = p.to_string();
                let ports = r
                    .resolve(&env(&[("RCT_METRO_PORT", raw.as_str())]))
                    .unwrap();
                assert_eq!(ports.proxy_port, p);
                assert_eq!(i64::from(ports.metro_port), derivation.derive(p));
            }
        }
    }

    #[test]
    fn test_out_of_range_and_garbage_rejected_with_literal_value() {
        let r = PortResolver::default();
        for raw in ["0", "1", "-5", "65536", "99999999999999999999", "abc", "80.5", "", "0x50"] {
            let err = r.resolve(&env(&[("RCT_METRO_PORT", raw)])).unwrap_err();
            assert!(
                matches!(err, ConfigError::InvalidPort { var: "RCT_METRO_PORT", .. }),
                "{raw}: {err}"
            );
            assert!(err.to_string().contains(&format!("\"{raw}\"")), "{err}");
        }
    }

    #[test]
    fn test_whitespace_is_trimmed() {
        let ports = PortResolver::default()
            .resolve(&env(&[("RCT_METRO_PORT", " 8081 ")]))
            .unwrap();
        assert_eq!(ports.proxy_port, 8081);
    }

    #[test]
    fn test_same_port_accepts_minimum() {
        let ports = PortResolver::new(PortDerivation::SamePort)
            .resolve(&env(&[("RCT_METRO_PORT", "2")]))
            .unwrap();
        assert_eq!(ports.metro_port, 2);
    }

    #[test]
    fn test_missing_metro_port() {
        let err = PortResolver::default().resolve(&env(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar { var: "RCT_METRO_PORT" }));
        assert!(err.to_string().contains("RCT_METRO_PORT"));
    }

    #[test]
    fn test_web_port_required() {
        let r = PortResolver::default().require_web_port(true);
        let err = r.resolve(&env(&[("RCT_METRO_PORT", "8082")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar { var: "WEB_PORT" }));

        let err = r
            .resolve(&env(&[("RCT_METRO_PORT", "8082"), ("WEB_PORT", "0")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPort { var: "WEB_PORT", min: 1, .. }));

        let ports = r
            .resolve(&env(&[("RCT_METRO_PORT", "8082"), ("WEB_PORT", "1")]))
            .unwrap();
        assert_eq!(ports.web_port, Some(1));
    }

    #[test]
    fn test_web_port_ignored_unless_required() {
        let ports = PortResolver::default()
            .resolve(&env(&[("RCT_METRO_PORT", "8082"), ("WEB_PORT", "junk")]))
            .unwrap();
        assert_eq!(ports.web_port, None);
    }

    #[test]
    fn test_derivation_parse_and_display() {
        assert_eq!("below-proxy".parse::<PortDerivation>(), Ok(PortDerivation::BelowProxy));
        assert_eq!("same-port".parse::<PortDerivation>(), Ok(PortDerivation::SamePort));
        assert!("offset".parse::<PortDerivation>().is_err());
        assert_eq!(PortDerivation::SamePort.to_string(), "same-port");
    }

    #[test]
    fn test_assignment_serializes_without_absent_web_port() {
        let ports = PortAssignment {
            proxy_port: 8082,
            metro_port: 8081,
            web_port: None,
        };
        let json = serde_json::to_value(ports).unwrap();
        assert_eq!(json, serde_json::json!({ "proxy_port": 8082, "metro_port": 8081 }));
    }

    #[test]
    fn test_port_in_range() {
        assert!(port_in_range(1, 1, 65535));
        assert!(!port_in_range(0, 1, 65535));
        assert!(!port_in_range(65536, 1, 65535));
        assert!(!port_in_range(1, 2, 65535));
    }
}
