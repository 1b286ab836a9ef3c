//! # Configuration
//!
//! Optional TOML file layered over built-in defaults.
//!
//! ```toml
//! [engine.weights]
//! rct = 1.0
//! case_report = 0.3
//!
//! [engine.limits]
//! timeout_ms = 2000
//! max_hops_limit = 6
//!
//! [server]
//! host = "0.0.0.0"
//! port = 9090
//! ```
//!
//! The file comes from `-C/--config` or, failing that, `PROVGRAPH_CONFIG`.
//! With neither set the defaults apply.

use provgraph_core::{EngineConfig, ProvGraphError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "PROVGRAPH_CONFIG";

/// Maximum config file size (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

/// Defaults for the `server` command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Full application configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub server: ServerConfig,
}

impl AppConfig {
    /// Parse and validate a TOML document. Missing sections keep their defaults.
    pub fn from_toml(text: &str) -> Result<Self, ProvGraphError> {
        let config: Self = toml::from_str(text)
            .map_err(|e| ProvGraphError::Config(format!("Invalid config: {}", e)))?;
        config.engine.validate()?;
        Ok(config)
    }

    /// Load from `path`, else from `PROVGRAPH_CONFIG`, else defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ProvGraphError> {
        let path = match path {
            Some(p) => Some(p.to_path_buf()),
            None => std::env::var_os(CONFIG_ENV)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
        };
        let Some(path) = path else {
            tracing::debug!("no config file, using defaults");
            return Ok(Self::default());
        };

        let metadata = std::fs::metadata(&path).map_err(|e| {
            ProvGraphError::Io(format!("Cannot read config '{}': {}", path.display(), e))
        })?;
        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ProvGraphError::Config(format!(
                "Config file size {} bytes exceeds maximum allowed {} bytes",
                metadata.len(),
                MAX_CONFIG_FILE_SIZE
            )));
        }
        let text = std::fs::read_to_string(&path).map_err(|e| {
            ProvGraphError::Io(format!("Cannot read config '{}': {}", path.display(), e))
        })?;
        let config = Self::from_toml(&text)?;
        tracing::info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_default() {
        assert_eq!(AppConfig::from_toml("").expect("config"), AppConfig::default());
    }

    #[test]
    fn partial_sections_keep_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [engine.weights]
            case_report = 0.3

            [engine.limits]
            timeout_ms = 2000

            [server]
            port = 9090
            "#,
        )
        .expect("config");

        assert_eq!(config.engine.weights.case_report, 0.3);
        assert_eq!(config.engine.weights.rct, 1.0);
        assert_eq!(config.engine.limits.timeout_ms, Some(2000));
        assert_eq!(config.engine.limits.max_hops_limit, 10);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9090);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = AppConfig::from_toml("[engine.weights]\nrtc = 1.0\n").expect_err("typo");
        assert!(matches!(err, ProvGraphError::Config(_)));
    }

    #[test]
    fn non_positive_weights_are_rejected() {
        let err = AppConfig::from_toml("[engine.weights]\nreview = 0.0\n").expect_err("zero");
        assert!(matches!(err, ProvGraphError::Config(_)));
    }

    #[test]
    fn explicit_file_is_loaded() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("provgraph.toml");
        std::fs::write(&path, "[server]\nhost = \"0.0.0.0\"\n").expect("write");

        let config = AppConfig::load(Some(&path)).expect("config");
        assert_eq!(config.server.host, "0.0.0.0");
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = AppConfig::load(Some(Path::new("/nonexistent/provgraph.toml")))
            .expect_err("missing");
        assert!(matches!(err, ProvGraphError::Io(_)));
    }
}
