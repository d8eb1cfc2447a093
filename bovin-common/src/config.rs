//! Bootstrap configuration loading
//!
//! Every Bovin service reads a small TOML bootstrap file. The file is
//! located with the following priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`BOVIN_CONFIG` by default)
//! 3. Platform config directory (`~/.config/bovin/<module>.toml` on Linux)
//! 4. None: compiled defaults are used
//!
//! A missing file is not an error. The service logs a warning and starts
//! with defaults so that a fresh install works with zero configuration.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, warn};

/// Default environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "BOVIN_CONFIG";

/// Logging configuration shared by all services
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Where the bootstrap file was found
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    CommandLine(PathBuf),
    Environment(PathBuf),
    PlatformDefault(PathBuf),
    CompiledDefaults,
}

impl ConfigSource {
    pub fn path(&self) -> Option<&Path> {
        match self {
            ConfigSource::CommandLine(p)
            | ConfigSource::Environment(p)
            | ConfigSource::PlatformDefault(p) => Some(p),
            ConfigSource::CompiledDefaults => None,
        }
    }
}

/// Locates a module's bootstrap TOML file
#[derive(Debug, Clone)]
pub struct ConfigFileResolver {
    module_name: String,
    env_var: String,
}

impl ConfigFileResolver {
    pub fn new(module_name: &str) -> Self {
        Self {
            module_name: module_name.to_string(),
            env_var: CONFIG_ENV_VAR.to_string(),
        }
    }

    /// Use a different environment variable than `BOVIN_CONFIG`
    pub fn with_env_var(mut self, env_var: &str) -> Self {
        self.env_var = env_var.to_string();
        self
    }

    /// Resolve the config file location.
    ///
    /// CLI and environment paths are returned even if the file does not
    /// exist; the platform default only when it exists.
    pub fn resolve(&self, cli_arg: Option<&Path>) -> ConfigSource {
        if let Some(path) = cli_arg {
            return ConfigSource::CommandLine(path.to_path_buf());
        }

        if let Ok(path) = std::env::var(&self.env_var) {
            if !path.trim().is_empty() {
                return ConfigSource::Environment(PathBuf::from(path));
            }
        }

        match self.platform_default() {
            Some(path) if path.exists() => ConfigSource::PlatformDefault(path),
            _ => ConfigSource::CompiledDefaults,
        }
    }

    /// `<config_dir>/bovin/<module>.toml`
    pub fn platform_default(&self) -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("bovin").join(format!("{}.toml", self.module_name)))
    }
}

/// Load a TOML bootstrap file, degrading gracefully to defaults.
///
/// A missing file yields `T::default()` with a warning. A file that exists
/// but fails to parse is a configuration error: silently ignoring a typo
/// would start the service against the wrong collaborators.
pub fn load_toml_config<T>(source: &ConfigSource) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let Some(path) = source.path() else {
        info!("No config file found, using compiled defaults");
        return Ok(T::default());
    };

    if !path.exists() {
        warn!(
            "Config file {} not found, using compiled defaults",
            path.display()
        );
        return Ok(T::default());
    }

    let content = std::fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config = toml::from_str(&content).map_err(|source| Error::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    info!("Loaded config from {}", path.display());
    Ok(config)
}

/// Read an environment override, parsing it into `T`.
///
/// Unset or blank variables yield `Ok(None)`; unparseable values are a
/// configuration error naming the variable.
pub fn env_override<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| Error::InvalidEnv {
                name: name.to_string(),
                reason: e.to_string(),
            }),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_default_level() {
        assert_eq!(LoggingConfig::default().level, "info");
    }

    #[test]
    fn test_cli_argument_wins() {
        let resolver =
            ConfigFileResolver::new("test-module").with_env_var("BOVIN_TEST_UNSET_VAR_1");
        let source = resolver.resolve(Some(Path::new("/tmp/explicit.toml")));
        assert_eq!(
            source,
            ConfigSource::CommandLine(PathBuf::from("/tmp/explicit.toml"))
        );
    }

    #[test]
    fn test_platform_default_file_name() {
        let resolver = ConfigFileResolver::new("bovin-capture");
        if let Some(path) = resolver.platform_default() {
            assert!(path.ends_with("bovin/bovin-capture.toml"));
        }
    }

    #[test]
    fn test_compiled_defaults_has_no_path() {
        assert!(ConfigSource::CompiledDefaults.path().is_none());
    }
}
