//! Layered environment snapshot.
//!
//! Configuration comes from an ordered list of layers, lowest precedence
//! first:
//!
//! ```text
//! default.env  <  .env  <  process environment
//! ```
//!
//! A lookup returns the value from the highest layer that defines the key.
//! Nothing here writes to the process environment; the snapshot is built
//! once and never mutated.

use std::collections::HashMap;
use std::path::Path;

use crate::ConfigError;

/// File holding the project-wide defaults.
pub const DEFAULTS_FILE: &str = "default.env";

/// File holding developer-local overrides. Usually git-ignored.
pub const LOCAL_FILE: &str = ".env";

// ---------------------------------------------------------------------------
// EnvLayer
// ---------------------------------------------------------------------------

/// One source of variables, e.g. a single env file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvLayer {
    name: String,
    vars: HashMap<String, String>,
}

impl EnvLayer {
    /// Builds a layer from arbitrary key/value pairs.
    pub fn from_pairs<K, V>(
        name: impl Into<String>,
        pairs: impl IntoIterator<Item = (K, V)>,
    ) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            name: name.into(),
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Reads a dotenv-formatted file. A missing file yields an empty layer;
    /// any other failure is an error naming the file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let name = path.display().to_string();
        let iter = match dotenvy::from_path_iter(path) {
            Ok(iter) => iter,
            Err(e) if e.not_found() => {
                tracing::trace!(path = %name, "env file not present");
                return Ok(Self::from_pairs(name, Vec::<(String, String)>::new()));
            }
            Err(source) => {
                return Err(ConfigError::EnvFile {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        let mut vars = HashMap::new();
        for item in iter {
            let (key, value) = item.map_err(|source| ConfigError::EnvFile {
                path: path.to_path_buf(),
                source,
            })?;
            vars.insert(key, value);
        }
        tracing::debug!(path = %name, count = vars.len(), "loaded env file");
        Ok(Self { name, vars })
    }

    /// Captures the current process environment. Variables whose name or
    /// value is not valid UTF-8 are skipped.
    pub fn process() -> Self {
        let vars = std::env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
            .collect();
        Self {
            name: "process environment".to_string(),
            vars,
        }
    }

    /// Human-readable name of this layer.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the value of `key` in this layer only.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }
}

// ---------------------------------------------------------------------------
// EnvSnapshot
// ---------------------------------------------------------------------------

/// Immutable, resolved view over a stack of [`EnvLayer`]s.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvSnapshot {
    // Lowest precedence first.
    layers: Vec<EnvLayer>,
}

impl EnvSnapshot {
    /// Loads `default.env` and `.env` from `root`, then the process
    /// environment on top.
    pub fn load(root: &Path) -> Result<Self, ConfigError> {
        Ok(Self::from_layers(vec![
            EnvLayer::from_file(&root.join(DEFAULTS_FILE))?,
            EnvLayer::from_file(&root.join(LOCAL_FILE))?,
            EnvLayer::process(),
        ]))
    }

    /// Builds a snapshot from caller-provided layers, lowest precedence
    /// first.
    pub fn from_layers(layers: Vec<EnvLayer>) -> Self {
        Self { layers }
    }

    /// Returns the value of `key` from the highest layer defining it.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.layers.iter().rev().find_map(|layer| layer.get(key))
    }

    /// Returns the name of the layer that supplies `key`.
    pub fn source_of(&self, key: &str) -> Option<&str> {
        self.layers
            .iter()
            .rev()
            .find(|layer| layer.get(key).is_some())
            .map(EnvLayer::name)
    }

    /// The layers in precedence order, lowest first.
    pub fn layers(&self) -> &[EnvLayer] {
        &self.layers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer(name: &str, pairs: &[(&str, &str)]) -> EnvLayer {
        EnvLayer::from_pairs(name, pairs.iter().copied())
    }

    #[test]
    fn test_higher_layer_wins() {
        let snap = EnvSnapshot::from_layers(vec![
            layer("defaults", &[("RCT_METRO_PORT", "8081"), ("A", "1")]),
            layer("local", &[("RCT_METRO_PORT", "9000")]),
        ]);
        assert_eq!(snap.get("RCT_METRO_PORT"), Some("9000"));
        assert_eq!(snap.source_of("RCT_METRO_PORT"), Some("local"));
        assert_eq!(snap.get("A"), Some("1"));
        assert_eq!(snap.source_of("A"), Some("defaults"));
    }

    #[test]
    fn test_real_env_beats_both_files() {
        let snap = EnvSnapshot::from_layers(vec![
            layer("defaults", &[("RCT_METRO_PORT", "8081")]),
            layer("local", &[("RCT_METRO_PORT", "9000")]),
            layer("process", &[("RCT_METRO_PORT", "7000")]),
        ]);
        assert_eq!(snap.get("RCT_METRO_PORT"), Some("7000"));
    }

    #[test]
    fn test_unknown_key_is_none() {
        let snap = EnvSnapshot::from_layers(vec![layer("defaults", &[])]);
        assert_eq!(snap.get("NOPE"), None);
        assert_eq!(snap.source_of("NOPE"), None);
    }

    #[test]
    fn test_empty_value_still_counts_as_defined() {
        let snap = EnvSnapshot::from_layers(vec![
            layer("defaults", &[("X", "1")]),
            layer("local", &[("X", "")]),
        ]);
        assert_eq!(snap.get("X"), Some(""));
    }
}
