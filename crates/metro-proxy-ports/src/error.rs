//! Error types for port resolution.

use std::path::PathBuf;

/// Errors raised while assembling the environment or resolving ports.
///
/// All of these are fatal at startup: the proxy never binds a listener
/// with a half-valid configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required variable is absent from every layer.
    #[error("{var} is not set. Define it in `.env`, `default.env`, or export it.")]
    MissingVar {
        /// Name of the missing variable.
        var: &'static str,
    },

    /// A port variable is not a base-10 integer inside its allowed range.
    /// `raw` is the value exactly as it was found.
    #[error("{var} invalid: \"{raw}\". Must be an integer between {min} and {max}.")]
    InvalidPort {
        /// Name of the offending variable.
        var: &'static str,
        /// The literal value that failed validation.
        raw: String,
        /// Lowest accepted port.
        min: u16,
        /// Highest accepted port.
        max: u16,
    },

    /// The Metro port computed from the proxy port fell out of range.
    #[error("derived Metro port invalid: {port}")]
    DerivedPortOutOfRange {
        /// The computed value.
        port: i64,
    },

    /// An env file exists but could not be read or parsed.
    #[error("failed to load env file {}: {source}", path.display())]
    EnvFile {
        /// Path of the file.
        path: PathBuf,
        /// Underlying parse or I/O error.
        #[source]
        source: dotenvy::Error,
    },
}
