//! Transaction data providers
//!
//! Each provider resolves a date window to blocks, pages through the four
//! transfer categories and normalizes what it gets into [`TransactionRow`]s.
//! [`Provider`] picks one from a [`ProviderConfig`].

pub mod alchemy;
pub mod etherscan;
pub(crate) mod pagination;

pub use alchemy::AlchemyProvider;
pub use etherscan::EtherscanProvider;

use crate::config::{Chain, DateRange, ProviderConfig, ProviderKind};
use crate::error::Result;
use crate::row::TransactionRow;
use futures::stream::BoxStream;
use std::fmt;

/// Upper end of a block range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockTag {
    Number(u64),
    /// Chain head at request time
    Latest,
}

impl fmt::Display for BlockTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockTag::Number(n) => write!(f, "{}", n),
            BlockTag::Latest => f.write_str("latest"),
        }
    }
}

/// Inclusive block range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRange {
    pub start: u64,
    pub end: BlockTag,
}

impl BlockRange {
    pub fn new(start: u64, end: BlockTag) -> Self {
        Self { start, end }
    }

    pub fn end_number(&self) -> Option<u64> {
        match self.end {
            BlockTag::Number(n) => Some(n),
            BlockTag::Latest => None,
        }
    }

    /// True when the window holds no block (e.g. a date range inside one block gap)
    pub fn is_empty(&self) -> bool {
        self.end_number().is_some_and(|end| self.start > end)
    }
}

impl fmt::Display for BlockRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}

/// A configured data provider
#[derive(Debug, Clone)]
pub enum Provider {
    Etherscan(EtherscanProvider),
    Alchemy(AlchemyProvider),
}

impl Provider {
    /// Build the provider named by `config.kind`.
    ///
    /// Fails on missing credentials or when the provider cannot serve the chain.
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        config.validate()?;
        Ok(match config.kind {
            ProviderKind::Etherscan => Provider::Etherscan(EtherscanProvider::new(config)?),
            ProviderKind::Alchemy => Provider::Alchemy(AlchemyProvider::new(config)?),
        })
    }

    pub fn kind(&self) -> ProviderKind {
        match self {
            Provider::Etherscan(_) => ProviderKind::Etherscan,
            Provider::Alchemy(_) => ProviderKind::Alchemy,
        }
    }

    pub fn chain(&self) -> Chain {
        match self {
            Provider::Etherscan(p) => p.chain(),
            Provider::Alchemy(p) => p.chain(),
        }
    }

    /// Map an optional date window to a block range
    pub async fn resolve_block_range(&self, range: Option<&DateRange>) -> Result<BlockRange> {
        match self {
            Provider::Etherscan(p) => p.resolve_block_range(range).await,
            Provider::Alchemy(p) => p.resolve_block_range(range).await,
        }
    }

    /// All categories, concatenated in category order and deduplicated
    pub async fn fetch_transactions(&self, address: &str, range: Option<&DateRange>) -> Result<Vec<TransactionRow>> {
        match self {
            Provider::Etherscan(p) => p.fetch_transactions(address, range).await,
            Provider::Alchemy(p) => p.fetch_transactions(address, range).await,
        }
    }

    /// Rows as they are fetched. A resolution failure is the only item.
    pub fn fetch_transactions_stream<'a>(
        &'a self,
        address: &'a str,
        range: Option<DateRange>,
    ) -> BoxStream<'a, Result<TransactionRow>> {
        match self {
            Provider::Etherscan(p) => p.fetch_transactions_stream(address, range),
            Provider::Alchemy(p) => p.fetch_transactions_stream(address, range),
        }
    }
}
