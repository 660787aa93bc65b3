//! Application configuration.

use serde::Deserialize;

use crate::error::Result;

/// Settings for an [`App`](crate::app::App).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// `id` attribute of the container element components mount into.
    pub root_id: String,

    /// Enables warnings for missing dependencies, props and components.
    pub dev_mode: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            root_id: "app".to_string(),
            dev_mode: false,
        }
    }
}

impl AppConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let config = AppConfig::from_json(r#"{"dev_mode": true}"#).unwrap();
        assert!(config.dev_mode);
        assert_eq!(config.root_id, "app");
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(AppConfig::from_json("{not json").is_err());
    }
}
