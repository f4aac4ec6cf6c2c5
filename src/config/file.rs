//! Configuration file handling

use super::{FetchSettings, ProviderKind};
use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration file structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Default data provider ("etherscan" or "alchemy")
    #[serde(default)]
    pub provider: Option<String>,

    /// Default chain name or id
    #[serde(default)]
    pub chain: Option<String>,

    /// Etherscan API key
    #[serde(default)]
    pub etherscan_api_key: Option<String>,

    /// Etherscan API base URL
    #[serde(default)]
    pub etherscan_api_url: Option<String>,

    /// Alchemy API key
    #[serde(default)]
    pub alchemy_api_key: Option<String>,

    /// Fetch settings
    #[serde(default)]
    pub settings: Settings,
}

/// Fetch settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Records per page
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Delay before each page request in milliseconds
    #[serde(default = "default_rate_limit_ms")]
    pub rate_limit_ms: u64,

    /// Max records per Etherscan start block
    #[serde(default = "default_window_limit")]
    pub window_limit: u32,

    /// Parallel receipt lookups for Alchemy gas fees
    #[serde(default = "default_receipt_concurrency")]
    pub receipt_concurrency: usize,

    /// Look up receipts for Alchemy gas fees
    #[serde(default = "default_fetch_receipts")]
    pub fetch_receipts: bool,
}

fn default_page_size() -> u32 {
    super::DEFAULT_PAGE_SIZE
}

fn default_rate_limit_ms() -> u64 {
    super::DEFAULT_RATE_LIMIT_MS
}

fn default_window_limit() -> u32 {
    super::DEFAULT_WINDOW_LIMIT
}

fn default_receipt_concurrency() -> usize {
    super::DEFAULT_RECEIPT_CONCURRENCY
}

fn default_fetch_receipts() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            rate_limit_ms: default_rate_limit_ms(),
            window_limit: default_window_limit(),
            receipt_concurrency: default_receipt_concurrency(),
            fetch_receipts: default_fetch_receipts(),
        }
    }
}

impl Settings {
    /// Convert to runtime FetchSettings
    pub fn fetch_settings(&self) -> FetchSettings {
        FetchSettings::default()
            .with_page_size(self.page_size)
            .with_rate_limit_delay(Duration::from_millis(self.rate_limit_ms))
            .with_window_limit(self.window_limit)
            .with_receipt_concurrency(self.receipt_concurrency)
            .with_fetch_receipts(self.fetch_receipts)
    }
}

impl ConfigFile {
    /// Get the default config file path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("eth-tx-export")
            .join("config.toml")
    }

    /// Load from default path
    pub fn load_default() -> Result<Option<Self>> {
        let path = Self::default_path();
        if path.exists() {
            Ok(Some(Self::load(&path)?))
        } else {
            Ok(None)
        }
    }

    /// Load from a specific path
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::InvalidFile(format!("{}: {}", path.display(), e)))?;

        let config: Self = toml::from_str(&content).map_err(ConfigError::from)?;
        Ok(config)
    }

    /// Save to a specific path
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ConfigError::InvalidFile(format!("Failed to create directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::InvalidFile(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| ConfigError::InvalidFile(format!("Failed to write config: {}", e)))?;

        Ok(())
    }

    /// Save to default path
    pub fn save_default(&self) -> Result<()> {
        self.save(&Self::default_path())
    }

    /// Store the API key for a provider (does not save)
    pub fn set_api_key(&mut self, provider: ProviderKind, key: String) {
        match provider {
            ProviderKind::Etherscan => self.etherscan_api_key = Some(key),
            ProviderKind::Alchemy => self.alchemy_api_key = Some(key),
        }
    }
}
