//! Supported EVM chains

use crate::error::ConfigError;
use std::fmt;
use std::str::FromStr;

/// EVM chain to query. One chain per invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Chain {
    #[default]
    Ethereum,
    Polygon,
    Arbitrum,
    Optimism,
    Base,
    Bsc,
    Avalanche,
    /// Any other chain id (Etherscan v2 only)
    Custom(u64),
}

impl Chain {
    /// EIP-155 chain id
    pub fn chain_id(&self) -> u64 {
        match self {
            Chain::Ethereum => 1,
            Chain::Polygon => 137,
            Chain::Arbitrum => 42161,
            Chain::Optimism => 10,
            Chain::Base => 8453,
            Chain::Bsc => 56,
            Chain::Avalanche => 43114,
            Chain::Custom(id) => *id,
        }
    }

    /// Look up a known chain by id, falling back to `Custom`
    pub fn from_id(id: u64) -> Self {
        match id {
            1 => Chain::Ethereum,
            137 => Chain::Polygon,
            42161 => Chain::Arbitrum,
            10 => Chain::Optimism,
            8453 => Chain::Base,
            56 => Chain::Bsc,
            43114 => Chain::Avalanche,
            other => Chain::Custom(other),
        }
    }

    pub fn display_name(&self) -> String {
        match self {
            Chain::Ethereum => "Ethereum".to_string(),
            Chain::Polygon => "Polygon".to_string(),
            Chain::Arbitrum => "Arbitrum".to_string(),
            Chain::Optimism => "Optimism".to_string(),
            Chain::Base => "Base".to_string(),
            Chain::Bsc => "BNB Smart Chain".to_string(),
            Chain::Avalanche => "Avalanche C-Chain".to_string(),
            Chain::Custom(id) => format!("Chain {}", id),
        }
    }

    /// Symbol of the chain's base currency, used for native and internal rows
    pub fn native_symbol(&self) -> &'static str {
        match self {
            Chain::Polygon => "POL",
            Chain::Bsc => "BNB",
            Chain::Avalanche => "AVAX",
            _ => "ETH",
        }
    }

    /// Network slug used by Alchemy URLs, if Alchemy serves this chain
    pub fn alchemy_network(&self) -> Option<&'static str> {
        match self {
            Chain::Ethereum => Some("eth-mainnet"),
            Chain::Polygon => Some("polygon-mainnet"),
            Chain::Arbitrum => Some("arb-mainnet"),
            Chain::Optimism => Some("opt-mainnet"),
            Chain::Base => Some("base-mainnet"),
            _ => None,
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slug = match self {
            Chain::Ethereum => "ethereum",
            Chain::Polygon => "polygon",
            Chain::Arbitrum => "arbitrum",
            Chain::Optimism => "optimism",
            Chain::Base => "base",
            Chain::Bsc => "bsc",
            Chain::Avalanche => "avalanche",
            Chain::Custom(id) => return write!(f, "{}", id),
        };
        f.write_str(slug)
    }
}

impl FromStr for Chain {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ethereum" | "eth" | "mainnet" => Ok(Chain::Ethereum),
            "polygon" | "matic" => Ok(Chain::Polygon),
            "arbitrum" | "arb" => Ok(Chain::Arbitrum),
            "optimism" | "op" => Ok(Chain::Optimism),
            "base" => Ok(Chain::Base),
            "bsc" | "bnb" => Ok(Chain::Bsc),
            "avalanche" | "avax" => Ok(Chain::Avalanche),
            other => other
                .parse::<u64>()
                .map(Chain::from_id)
                .map_err(|_| ConfigError::InvalidChain(s.to_string())),
        }
    }
}
