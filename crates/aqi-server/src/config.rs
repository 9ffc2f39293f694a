//! Server configuration

use anyhow::Result;
use serde::Deserialize;
use tracing::warn;

/// Server configuration, read from `AQI_*` environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Model archive loaded at startup
    #[serde(default = "default_model_path")]
    pub model_path: String,

    /// Port for the dashboard API and metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

fn default_model_path() -> String {
    "aqi_4_models.json".to_string()
}

fn default_api_port() -> u16 {
    5000
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            model_path: default_model_path(),
            api_port: default_api_port(),
            bind_address: default_bind_address(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("AQI"))
            .build()?;

        Ok(config.try_deserialize().unwrap_or_else(|e| {
            warn!(error = %e, "Invalid AQI_* configuration, using defaults");
            ServerConfig::default()
        }))
    }

    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.bind_address, self.api_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.model_path, "aqi_4_models.json");
        assert_eq!(config.listen_address(), "0.0.0.0:5000");
    }

    #[test]
    fn test_partial_source_keeps_defaults() {
        let config: ServerConfig = config::Config::builder()
            .set_override("api_port", 8081)
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(config.api_port, 8081);
        assert_eq!(config.bind_address, "0.0.0.0");
    }
}
