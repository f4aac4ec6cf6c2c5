//! Configuration types
//!
//! Everything a provider needs is passed in explicitly through these types;
//! only the binary reads the environment or the config file.

mod chain;
mod file;

pub use chain::Chain;
pub use file::{ConfigFile, Settings};

use crate::error::{ConfigError, Result};
use chrono::{DateTime, NaiveDate, Utc};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Default Etherscan API base URL (the `/v2/api` path is appended)
pub const DEFAULT_ETHERSCAN_URL: &str = "https://api.etherscan.io";

/// Default Alchemy data API base URL (the API key is appended)
pub const DEFAULT_ALCHEMY_DATA_URL: &str = "https://api.g.alchemy.com/data/v1";

/// Records requested per page
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Fixed wait before every page request
pub const DEFAULT_RATE_LIMIT_MS: u64 = 200;

/// Etherscan refuses `page * offset` beyond this
pub const DEFAULT_WINDOW_LIMIT: u32 = 10_000;

/// Parallel receipt lookups (Alchemy gas fees)
pub const DEFAULT_RECEIPT_CONCURRENCY: usize = 4;

/// Upstream data provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Etherscan,
    Alchemy,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Etherscan => "etherscan",
            ProviderKind::Alchemy => "alchemy",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "etherscan" => Ok(ProviderKind::Etherscan),
            "alchemy" => Ok(ProviderKind::Alchemy),
            _ => Err(ConfigError::UnsupportedProvider(s.to_string())),
        }
    }
}

/// Pagination and rate-limit knobs shared by all providers
#[derive(Debug, Clone)]
pub struct FetchSettings {
    /// Records per page request
    pub page_size: u32,
    /// Fixed delay before each page request
    pub rate_limit_delay: Duration,
    /// Max records reachable through page numbers from one start block
    pub window_limit: u32,
    /// Parallel receipt lookups (Alchemy gas fees)
    pub receipt_concurrency: usize,
    /// Look up receipts for gas fees; when false Alchemy rows carry `"0"`
    pub fetch_receipts: bool,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            rate_limit_delay: Duration::from_millis(DEFAULT_RATE_LIMIT_MS),
            window_limit: DEFAULT_WINDOW_LIMIT,
            receipt_concurrency: DEFAULT_RECEIPT_CONCURRENCY,
            fetch_receipts: true,
        }
    }
}

impl FetchSettings {
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_rate_limit_delay(mut self, delay: Duration) -> Self {
        self.rate_limit_delay = delay;
        self
    }

    pub fn with_window_limit(mut self, limit: u32) -> Self {
        self.window_limit = limit;
        self
    }

    pub fn with_receipt_concurrency(mut self, concurrency: usize) -> Self {
        self.receipt_concurrency = concurrency.max(1);
        self
    }

    pub fn with_fetch_receipts(mut self, fetch: bool) -> Self {
        self.fetch_receipts = fetch;
        self
    }
}

/// Everything the provider factory needs
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub chain: Chain,
    pub etherscan_api_key: Option<String>,
    pub etherscan_api_url: String,
    pub alchemy_api_key: Option<String>,
    /// Overrides the per-network JSON-RPC URL derived from the key
    pub alchemy_rpc_url: Option<String>,
    pub alchemy_data_url: String,
    pub settings: FetchSettings,
}

impl ProviderConfig {
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            chain: Chain::default(),
            etherscan_api_key: None,
            etherscan_api_url: DEFAULT_ETHERSCAN_URL.to_string(),
            alchemy_api_key: None,
            alchemy_rpc_url: None,
            alchemy_data_url: DEFAULT_ALCHEMY_DATA_URL.to_string(),
            settings: FetchSettings::default(),
        }
    }

    pub fn with_chain(mut self, chain: Chain) -> Self {
        self.chain = chain;
        self
    }

    pub fn with_etherscan_key(mut self, key: impl Into<String>) -> Self {
        self.etherscan_api_key = Some(key.into());
        self
    }

    pub fn with_etherscan_url(mut self, url: impl Into<String>) -> Self {
        self.etherscan_api_url = url.into();
        self
    }

    pub fn with_alchemy_key(mut self, key: impl Into<String>) -> Self {
        self.alchemy_api_key = Some(key.into());
        self
    }

    pub fn with_alchemy_urls(mut self, rpc_url: impl Into<String>, data_url: impl Into<String>) -> Self {
        self.alchemy_rpc_url = Some(rpc_url.into());
        self.alchemy_data_url = data_url.into();
        self
    }

    pub fn with_settings(mut self, settings: FetchSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Check that the selected provider has its credentials
    pub fn validate(&self) -> Result<()> {
        let missing = |name: &str| -> Result<()> {
            Err(ConfigError::MissingField(format!("{} is required for the {} provider", name, self.kind)).into())
        };

        match self.kind {
            ProviderKind::Etherscan => {
                if self.etherscan_api_key.as_deref().unwrap_or_default().is_empty() {
                    return missing("ETHERSCAN_API_KEY");
                }
                if self.etherscan_api_url.is_empty() {
                    return missing("ETHERSCAN_API_URL");
                }
            }
            ProviderKind::Alchemy => {
                if self.alchemy_api_key.as_deref().unwrap_or_default().is_empty() {
                    return missing("ALCHEMY_API_KEY");
                }
            }
        }
        Ok(())
    }
}

/// Inclusive date window. Both ends are always present together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    from: DateTime<Utc>,
    to: DateTime<Utc>,
}

impl DateRange {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Self> {
        if to < from {
            return Err(ConfigError::InvalidDate(format!(
                "end date {} is earlier than start date {}",
                to.to_rfc3339(),
                from.to_rfc3339()
            ))
            .into());
        }
        Ok(Self { from, to })
    }

    pub fn from(&self) -> DateTime<Utc> {
        self.from
    }

    pub fn to(&self) -> DateTime<Utc> {
        self.to
    }

    /// Whole days covered by the window
    pub fn days(&self) -> i64 {
        (self.to - self.from).num_days()
    }
}

/// Parse `YYYY-MM-DD` (midnight UTC) or an RFC 3339 timestamp
pub fn parse_date(input: &str) -> Result<DateTime<Utc>> {
    let input = input.trim();

    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(midnight.and_utc());
        }
    }

    DateTime::parse_from_rfc3339(input)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ConfigError::InvalidDate(format!("{}: {}", input, e)).into())
}
