//! Configuration errors.

use thiserror::Error;

/// Errors from configuration loading. All of these are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("cannot read config {path}: {source}")]
    Read {
        /// File path.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid YAML or has unknown keys.
    #[error("cannot parse config {path}: {source}")]
    Parse {
        /// File path.
        path: String,
        /// Underlying parse error.
        #[source]
        source: serde_yaml::Error,
    },

    /// No home directory could be resolved for the default state root.
    #[error("cannot resolve home directory for default state root")]
    NoHome,
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
