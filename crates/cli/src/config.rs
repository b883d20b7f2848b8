//! `parley.toml` loading.
//!
//! ```toml
//! [server]
//! port = 8080
//!
//! [market]
//! min_transfer_amount = 50
//!
//! [market.fees]
//! processor_rate = "0.029"
//! ```
//!
//! Both tables are optional. Environment variables win over the file:
//! `PARLEY_API_KEY` for the server, `PARLEY_GATEWAY_URL` and
//! `PARLEY_GATEWAY_API_KEY` for the market.

use std::path::{Path, PathBuf};

use parley_market::MarketConfig;
use serde::Deserialize;

pub(crate) const DEFAULT_PORT: u16 = 8080;

#[derive(Debug, thiserror::Error)]
pub(crate) enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot parse {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("invalid configuration:\n  {}", .0.join("\n  "))]
    Invalid(Vec<String>),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct ParleyConfig {
    pub(crate) server: ServerSettings,
    pub(crate) market: MarketConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct ServerSettings {
    pub(crate) port: u16,
    /// Shared secret required on every route except `/health`.
    pub(crate) api_key: Option<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            api_key: None,
        }
    }
}

impl ParleyConfig {
    /// Parse and validate a config file, without environment overrides.
    pub(crate) fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: ParleyConfig = toml::from_str(&text).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        config.market.validate().map_err(ConfigError::Invalid)?;
        Ok(config)
    }

    /// Load `path` if given (defaults otherwise), then apply environment
    /// overrides.
    pub(crate) fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.market.apply_env_overrides();
        if let Ok(key) = std::env::var("PARLEY_API_KEY") {
            if !key.is_empty() {
                config.server.api_key = Some(key);
            }
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn empty_file_is_all_defaults() {
        let file = write_config("");
        let config = ParleyConfig::from_file(file.path()).unwrap();
        assert_eq!(config.server.port, DEFAULT_PORT);
        assert_eq!(config.market, MarketConfig::default());
    }

    #[test]
    fn nested_tables_parse() {
        let file = write_config(
            r#"
[server]
port = 9100

[market]
min_transfer_amount = 100
currency = "eur"

[market.fees]
processor_rate = "0.02"
processor_fixed = 25
platform_rate = "0"

[market.gateway]
base_url = "https://payments.example/v1"
"#,
        );
        let config = ParleyConfig::from_file(file.path()).unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.market.min_transfer_amount, 100);
        assert_eq!(config.market.currency, "eur");
        assert_eq!(config.market.fees.processor_fixed, 25);
        assert_eq!(
            config.market.gateway.base_url.as_deref(),
            Some("https://payments.example/v1")
        );
    }

    #[test]
    fn unknown_keys_rejected() {
        let file = write_config("[server]\nprot = 1\n");
        let err = ParleyConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn semantic_errors_reported() {
        let file = write_config("[market]\nmin_bid = 0\n");
        let err = ParleyConfig::from_file(file.path()).unwrap_err();
        match err {
            ConfigError::Invalid(problems) => assert!(problems[0].contains("min_bid")),
            other => panic!("expected Invalid, got {other:?}"),
        }
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = ParleyConfig::from_file(Path::new("/nonexistent/parley.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
