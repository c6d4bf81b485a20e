//! TOML-based configuration for the grouping engine.
//!
//! Everything has a sensible default; `EngineConfig::default()` is fine for
//! embedding, and [`EngineConfig::from_path`] loads overrides from a file.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::ConfigError;

/// Engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// chrono format string for the date inside change-set display names.
    #[serde(default = "default_name_date_format")]
    pub name_date_format: String,

    /// Capacity of the channel between the worker and the delivery task.
    #[serde(default = "default_delivery_buffer")]
    pub delivery_buffer: usize,
}

fn default_name_date_format() -> String {
    "%Y-%m-%d %H:%M".into()
}

fn default_delivery_buffer() -> usize {
    64
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            name_date_format: default_name_date_format(),
            delivery_buffer: default_delivery_buffer(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }
        let raw = std::fs::read_to_string(path)?;
        let config: Self =
            toml::from_str(&raw).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        debug!(path = %path.display(), "loaded engine configuration");
        Ok(config)
    }

    /// Validate field values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name_date_format.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "name_date_format".into(),
                detail: "must not be empty".into(),
            });
        }
        if self.delivery_buffer == 0 {
            return Err(ConfigError::InvalidValue {
                field: "delivery_buffer".into(),
                detail: "must be at least 1".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.name_date_format, "%Y-%m-%d %H:%M");
        assert_eq!(config.delivery_buffer, 64);
        config.validate().unwrap();
    }

    #[test]
    fn test_from_path_with_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.toml");
        std::fs::write(&path, "name_date_format = \"%d %b %Y\"\n").unwrap();
        let config = EngineConfig::from_path(&path).unwrap();
        assert_eq!(config.name_date_format, "%d %b %Y");
        // Unspecified fields keep their defaults.
        assert_eq!(config.delivery_buffer, 64);
    }

    #[test]
    fn test_missing_file() {
        let err = EngineConfig::from_path("/nonexistent/engine.toml").unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }

    #[test]
    fn test_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.toml");
        std::fs::write(&path, "name_date_format = [not toml").unwrap();
        let err = EngineConfig::from_path(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let config = EngineConfig {
            name_date_format: String::new(),
            ..EngineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));

        let config = EngineConfig {
            delivery_buffer: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }
}
