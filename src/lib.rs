//! eth-tx-export - On-chain transaction history exporter
//!
//! Fetches the complete transfer history of an address (native, internal,
//! ERC-20 and ERC-721) from Etherscan or Alchemy, normalizes it into uniform
//! rows and exports them as CSV, either in one batch or as a stream.
//!
//! # Example
//!
//! ```rust,no_run
//! use eth_tx_export::{CsvExporter, OutputWriter, Provider, ProviderConfig, ProviderKind};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ProviderConfig::new(ProviderKind::Etherscan).with_etherscan_key("YOUR_KEY");
//!     let provider = Provider::from_config(&config)?;
//!
//!     let rows = provider
//!         .fetch_transactions("0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045", None)
//!         .await?;
//!
//!     let mut exporter = CsvExporter::new(Some(Path::new("transactions.csv")))?;
//!     exporter.write_rows(&rows)?;
//!     exporter.finalize()?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod dedup;
pub mod error;
pub mod normalize;
pub mod output;
pub mod provider;
pub mod row;

// Re-exports for convenience
pub use config::{
    parse_date, Chain, ConfigFile, DateRange, FetchSettings, ProviderConfig, ProviderKind,
    Settings,
};
pub use dedup::{dedup, dedup_stream, Deduplicator};
pub use error::{
    ConfigError, Error, NormalizationWarning, OutputError, ResolutionError, Result, UpstreamError,
};
pub use output::{CsvExporter, OutputWriter};
pub use provider::{AlchemyProvider, BlockRange, BlockTag, EtherscanProvider, Provider};
pub use row::{DedupKey, TransactionRow, TransactionType};
