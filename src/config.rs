use crate::error::{Error, Result};
use serde::Deserialize;
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Connection parameters for the ingestion API
///
/// Every field is required. Example TOML:
///
/// ```toml
/// host = "https://bme.example.org"
/// port = 443
/// timeout_ms = 10000
/// retry_delay_ms = 5000
/// username = "station-1"
/// password = "secret"
/// ```
#[derive(Clone, Deserialize)]
pub struct BmeConfig {
    /// Scheme and host, e.g. `http://localhost`
    pub host: String,
    pub port: u16,
    /// Per-request timeout in milliseconds
    pub timeout_ms: u64,
    /// Delay between retries in milliseconds
    pub retry_delay_ms: u64,
    pub username: String,
    pub password: String,
}

impl BmeConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file {:?}: {}", path, e))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: BmeConfig = toml::from_str(content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// `{host}:{port}`, the prefix of every endpoint URL
    pub fn base_url(&self) -> String {
        format!("{}:{}", self.host.trim_end_matches('/'), self.port)
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(Error::InvalidArgument("host must not be empty".into()));
        }
        if self.port == 0 {
            return Err(Error::InvalidArgument("port must not be 0".into()));
        }
        if self.timeout_ms == 0 {
            return Err(Error::InvalidArgument("timeout_ms must not be 0".into()));
        }
        let url = reqwest::Url::parse(&self.base_url())
            .map_err(|e| Error::InvalidArgument(format!("host {:?}: {}", self.host, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::InvalidArgument(format!(
                "host {:?} must start with http:// or https://",
                self.host
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for BmeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BmeConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("timeout_ms", &self.timeout_ms)
            .field("retry_delay_ms", &self.retry_delay_ms)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}
