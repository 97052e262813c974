//! # Configuration Management Module
//!
//! TOML-backed configuration for the radio bridge and its diagnostics CLI.
//!
//! ## Configuration File Format
//!
//! ```toml
//! [radio]
//! port = "/dev/ttyUSB0"
//! baud_rate = 115200
//!
//! [timing]
//! status_cache_ms = 500     # freshness window for the cached status table
//! write_debounce_ms = 150   # quiet period before a coalesced output write
//!
//! [logging]
//! level = "info"
//! file = "valvelink.log"
//!
//! # Station index -> endpoint valve mapping, in station order
//! [[stations]]
//! address = 0x12345677
//! valve = 0
//! name = "Front lawn"
//! ```
//!
//! The historical firmware variants disagreed on the two timing constants
//! (150/500 ms debounce, 500/1000 ms cache TTL), so both are configuration
//! values rather than baked-in numbers.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub radio: RadioConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    pub logging: LoggingConfig,
    /// Station index -> endpoint mapping, consumed by [`crate::stations::StationMap`].
    #[serde(default)]
    pub stations: Vec<StationConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RadioConfig {
    /// Serial device of the radio master, e.g. `/dev/ttyUSB0`.
    pub port: String,
    pub baud_rate: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Maximum age of the cached status table before a read forces a re-fetch.
    #[serde(default = "default_status_cache_ms")]
    pub status_cache_ms: u64,
    /// Quiet period after the last output request before the coalesced write
    /// is actually sent.
    #[serde(default = "default_write_debounce_ms")]
    pub write_debounce_ms: u64,
}

fn default_status_cache_ms() -> u64 {
    500
}

fn default_write_debounce_ms() -> u64 {
    150
}

impl Default for TimingConfig {
    fn default() -> Self {
        TimingConfig {
            status_cache_ms: default_status_cache_ms(),
            write_debounce_ms: default_write_debounce_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

/// One station slot: which valve bit on which endpoint it drives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationConfig {
    pub address: u32,
    pub valve: u8,
    /// Display name for the endpoint this station lives on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Config {
    /// Load configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        Ok(config)
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            radio: RadioConfig {
                port: "/dev/ttyUSB0".to_string(),
                baud_rate: 115200,
            },
            timing: TimingConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
                file: Some("valvelink.log".to_string()),
            },
            stations: Vec::new(),
        }
    }
}
