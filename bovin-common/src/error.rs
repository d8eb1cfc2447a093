//! Bootstrap errors shared by the Bovin services

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failures while loading or validating a service's bootstrap settings
#[derive(Error, Debug)]
pub enum Error {
    #[error("Cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file exists but is not valid TOML for the service's settings
    #[error("Parse {path} failed: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid value for {name}: {reason}")]
    InvalidEnv { name: String, reason: String },

    /// Settings parsed but rejected by the service's own checks
    #[error("Configuration error: {0}")]
    Config(String),
}
