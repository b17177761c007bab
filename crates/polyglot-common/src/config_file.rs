//! TOML configuration file.
//!
//! A file has four sections: `[runtime]` ([`RuntimeConfig`]), `[server]`
//! ([`ServerConfigFile`]), `[storage]` ([`StorageConfig`]) and any number of
//! `[[bundles]]` ([`BundleEntry`]) registered at startup.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::RuntimeConfig;

/// Parsed configuration file. Every section is optional.
///
/// # Example
///
/// ```toml
/// [runtime.engine]
/// pooling_allocator = true
/// max_instances = 100
///
/// [runtime.execution]
/// max_fuel = 10_000_000
/// timeout_ms = 1000
///
/// [runtime.scripting]
/// host_access = "restricted"
///
/// [runtime.scripting.interpreters]
/// python = "/usr/bin/python3"
///
/// [server]
/// bind_addr = "0.0.0.0:8080"
/// request_timeout_secs = 30
///
/// [storage]
/// bundle_dir = "/var/lib/polyglot/bundles"
///
/// [[bundles]]
/// name = "rust-wasm"
/// path = "./bundles/rust-wasm"
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ConfigFile {
    /// Runtime configuration (engine, execution and scripting settings).
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfigFile,

    /// Bundle storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Bundles to register at startup.
    #[serde(default)]
    pub bundles: Vec<BundleEntry>,
}

impl ConfigFile {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigFileError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigFileError::Io {
            path: path.as_ref().display().to_string(),
            source: e,
        })?;

        let config = Self::from_toml(&content)?;
        debug!(
            path = %path.as_ref().display(),
            bundles = config.bundles.len(),
            "Loaded configuration file"
        );
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string cannot be parsed as TOML.
    pub fn from_toml(content: &str) -> Result<Self, ConfigFileError> {
        toml::from_str(content).map_err(|e| ConfigFileError::Parse {
            message: e.to_string(),
        })
    }
}

/// The `[server]` table.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfigFile {
    /// Bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "defaults::bind_addr")]
    pub bind_addr: String,

    /// Request timeout in seconds.
    #[serde(default = "defaults::request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Enable graceful shutdown.
    #[serde(default = "defaults::graceful_shutdown")]
    pub graceful_shutdown: bool,

    /// Maximum accepted upload size in megabytes.
    #[serde(default = "defaults::max_upload_mb")]
    pub max_upload_mb: usize,
}

impl Default for ServerConfigFile {
    fn default() -> Self {
        Self {
            bind_addr: defaults::bind_addr(),
            request_timeout_secs: defaults::request_timeout_secs(),
            graceful_shutdown: defaults::graceful_shutdown(),
            max_upload_mb: defaults::max_upload_mb(),
        }
    }
}

/// Bundle storage configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Directory that receives extracted bundles.
    ///
    /// Defaults to `polyglot-runtime/bundles` under the system temp directory.
    pub bundle_dir: Option<String>,
}

impl StorageConfig {
    /// Resolved bundle directory.
    pub fn bundle_dir(&self) -> PathBuf {
        self.bundle_dir.as_ref().map_or_else(
            || std::env::temp_dir().join("polyglot-runtime").join("bundles"),
            PathBuf::from,
        )
    }
}

/// A bundle to register at startup.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BundleEntry {
    /// Bundle name used for routing.
    pub name: String,

    /// Path to an extracted bundle directory containing `metadata.json`.
    pub path: String,
}

/// Configuration file errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigFileError {
    /// Failed to read configuration file.
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse configuration file.
    #[error("Failed to parse config file: {message}")]
    Parse { message: String },
}

// serde defaults
mod defaults {
    pub fn bind_addr() -> String {
        "0.0.0.0:8080".to_string()
    }

    pub const fn request_timeout_secs() -> u64 {
        30
    }

    pub const fn graceful_shutdown() -> bool {
        true
    }

    pub const fn max_upload_mb() -> usize {
        64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HostAccess;

    #[test]
    fn test_default_config_file() {
        let config = ConfigFile::default();

        assert_eq!(config.server.bind_addr, "0.0.0.0:8080");
        assert_eq!(config.server.request_timeout_secs, 30);
        assert!(config.server.graceful_shutdown);
        assert_eq!(config.server.max_upload_mb, 64);
        assert!(config.storage.bundle_dir.is_none());
        assert!(config.bundles.is_empty());
    }

    #[test]
    fn test_parse_minimal_config() {
        let toml = r#"
            [server]
            bind_addr = "127.0.0.1:3000"
        "#;

        let config = ConfigFile::from_toml(toml).unwrap();

        assert_eq!(config.server.bind_addr, "127.0.0.1:3000");
        // Defaults applied
        assert_eq!(config.server.request_timeout_secs, 30);
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            [runtime.engine]
            pooling_allocator = false
            max_cached_modules = 16

            [runtime.execution]
            max_fuel = 5_000_000
            timeout_ms = 50

            [runtime.scripting]
            host_access = "denied"
            timeout_ms = 2000

            [runtime.scripting.interpreters]
            python = "/opt/python/bin/python3"

            [server]
            bind_addr = "0.0.0.0:9000"
            request_timeout_secs = 60
            graceful_shutdown = false
            max_upload_mb = 8

            [storage]
            bundle_dir = "/var/lib/polyglot"

            [[bundles]]
            name = "rust-wasm"
            path = "./bundles/rust-wasm"

            [[bundles]]
            name = "javascript-example"
            path = "./bundles/javascript"
        "#;

        let config = ConfigFile::from_toml(toml).unwrap();

        assert!(!config.runtime.engine.pooling_allocator);
        assert_eq!(config.runtime.engine.max_cached_modules, 16);
        assert_eq!(config.runtime.execution.max_fuel, 5_000_000);
        assert_eq!(config.runtime.scripting.host_access, HostAccess::Denied);
        assert_eq!(
            config.runtime.scripting.interpreters.python,
            "/opt/python/bin/python3"
        );
        assert_eq!(config.server.bind_addr, "0.0.0.0:9000");
        assert!(!config.server.graceful_shutdown);
        assert_eq!(config.server.max_upload_mb, 8);
        assert_eq!(
            config.storage.bundle_dir(),
            PathBuf::from("/var/lib/polyglot")
        );
        assert_eq!(config.bundles.len(), 2);
        assert_eq!(config.bundles[0].name, "rust-wasm");
        assert_eq!(config.bundles[1].path, "./bundles/javascript");
    }

    #[test]
    fn test_default_bundle_dir_under_temp() {
        let storage = StorageConfig::default();
        assert!(storage.bundle_dir().starts_with(std::env::temp_dir()));
    }

    #[test]
    fn test_parse_invalid_toml() {
        let invalid = "this is not valid toml [";
        let result = ConfigFile::from_toml(invalid);
        assert!(result.is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("polyglot.toml");
        std::fs::write(&path, "[server]\nrequest_timeout_secs = 5\n").unwrap();

        let config = ConfigFile::from_file(&path).unwrap();
        assert_eq!(config.server.request_timeout_secs, 5);

        let missing = ConfigFile::from_file(dir.path().join("missing.toml"));
        assert!(matches!(missing, Err(ConfigFileError::Io { .. })));
    }
}
