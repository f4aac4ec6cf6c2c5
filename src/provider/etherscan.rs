//! Etherscan API v2 provider
//!
//! One `module=account` action per category, paged with `page`/`offset` from a
//! start block. Dates map to blocks through `getblocknobytime`.

use super::pagination::{BlockNumbered, CursorMode, Page, PageRequest, PageSource, Paginator};
use super::{BlockRange, BlockTag};
use crate::config::{Chain, DateRange, FetchSettings, ProviderConfig};
use crate::dedup::dedup;
use crate::error::{ConfigError, ResolutionError, Result, UpstreamError};
use crate::normalize;
use crate::row::{TransactionRow, TransactionType};
use async_stream::stream;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use futures::stream::BoxStream;
use serde::{Deserialize, Deserializer};
use std::time::Duration;

/// Etherscan API response envelope
#[derive(Debug, Deserialize)]
struct EtherscanResponse {
    status: String,
    message: String,
    result: serde_json::Value,
}

impl EtherscanResponse {
    fn error_message(&self) -> String {
        match self.result.as_str() {
            Some(result) if !result.is_empty() => format!("{}: {}", self.message, result),
            _ => self.message.clone(),
        }
    }
}

/// Raw record shared by all four account actions.
///
/// Each action fills a different subset; everything is optional and numeric
/// fields may arrive as strings or numbers.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EtherscanTransaction {
    #[serde(default, deserialize_with = "string_or_number")]
    pub block_number: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub time_stamp: Option<String>,
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub value: Option<String>,
    #[serde(default)]
    pub contract_address: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub gas_used: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub gas_price: Option<String>,
    #[serde(default)]
    pub token_name: Option<String>,
    #[serde(default)]
    pub token_symbol: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub token_decimal: Option<String>,
    #[serde(default, rename = "tokenID", deserialize_with = "string_or_number")]
    pub token_id: Option<String>,
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<serde_json::Value>::deserialize(deserializer)? {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

impl BlockNumbered for EtherscanTransaction {
    fn block_number(&self) -> Option<u64> {
        self.block_number.as_deref()?.trim().parse().ok()
    }
}

fn action(category: TransactionType) -> &'static str {
    match category {
        TransactionType::Native => "txlist",
        TransactionType::Internal => "txlistinternal",
        TransactionType::Erc20 => "tokentx",
        TransactionType::Erc721 => "tokennfttx",
    }
}

#[derive(Debug, Clone, Copy)]
enum Closest {
    After,
    Before,
}

impl Closest {
    fn as_str(&self) -> &'static str {
        match self {
            Closest::After => "after",
            Closest::Before => "before",
        }
    }
}

/// Etherscan-backed provider
#[derive(Debug, Clone)]
pub struct EtherscanProvider {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    chain: Chain,
    settings: FetchSettings,
}

impl EtherscanProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let api_key = config
            .etherscan_api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ConfigError::MissingField("ETHERSCAN_API_KEY".to_string()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ConfigError::InvalidFile(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_url: format!("{}/v2/api", config.etherscan_api_url.trim_end_matches('/')),
            api_key,
            chain: config.chain,
            settings: config.settings.clone(),
        })
    }

    pub fn chain(&self) -> Chain {
        self.chain
    }

    async fn get(&self, params: &[(&str, String)]) -> std::result::Result<EtherscanResponse, UpstreamError> {
        let chain_id = self.chain.chain_id().to_string();
        let response = self
            .client
            .get(&self.api_url)
            .query(&[("chainid", chain_id.as_str())])
            .query(params)
            .query(&[("apikey", self.api_key.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(UpstreamError::HttpStatus(response.status()));
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| UpstreamError::Malformed(e.to_string()))
    }

    async fn block_by_time(
        &self,
        at: DateTime<Utc>,
        closest: Closest,
    ) -> std::result::Result<u64, ResolutionError> {
        let params = [
            ("module", "block".to_string()),
            ("action", "getblocknobytime".to_string()),
            ("timestamp", at.timestamp().to_string()),
            ("closest", closest.as_str().to_string()),
        ];

        let response = self.get(&params).await.map_err(|e| ResolutionError::Status {
            timestamp: at.to_rfc3339(),
            message: e.to_string(),
        })?;

        if response.status != "1" {
            return Err(ResolutionError::Status {
                timestamp: at.to_rfc3339(),
                message: response.error_message(),
            });
        }

        let block = match &response.result {
            serde_json::Value::String(s) => s.trim().parse::<u64>().ok(),
            serde_json::Value::Number(n) => n.as_u64(),
            _ => None,
        };
        block.ok_or_else(|| ResolutionError::Malformed(response.result.to_string()))
    }

    /// Map the date window to blocks; no window means genesis to latest
    pub async fn resolve_block_range(&self, range: Option<&DateRange>) -> Result<BlockRange> {
        let Some(range) = range else {
            return Ok(BlockRange::new(0, BlockTag::Latest));
        };

        let (start, end) = tokio::try_join!(
            self.block_by_time(range.from(), Closest::After),
            self.block_by_time(range.to(), Closest::Before),
        )?;

        tracing::debug!("Resolved {} .. {} to blocks {}..{}", range.from(), range.to(), start, end);
        Ok(BlockRange::new(start, BlockTag::Number(end)))
    }

    fn query<'a>(&'a self, address: &'a str, blocks: &BlockRange, category: TransactionType) -> CategoryQuery<'a> {
        CategoryQuery {
            provider: self,
            address,
            category,
            end: blocks.end,
        }
    }

    fn paginator<'a>(&'a self, query: &'a CategoryQuery<'a>, blocks: &BlockRange) -> Paginator<'a, CategoryQuery<'a>> {
        Paginator::new(query, &self.settings, CursorMode::Offset, blocks.start, blocks.end_number())
    }

    async fn fetch_category(
        &self,
        address: &str,
        blocks: &BlockRange,
        category: TransactionType,
    ) -> Vec<EtherscanTransaction> {
        if blocks.is_empty() {
            return Vec::new();
        }
        let query = self.query(address, blocks, category);
        self.paginator(&query, blocks).collect_all().await
    }

    /// Fetch every category, normalize, concatenate and dedup
    pub async fn fetch_transactions(&self, address: &str, range: Option<&DateRange>) -> Result<Vec<TransactionRow>> {
        let blocks = self.resolve_block_range(range).await?;
        tracing::info!("Fetching {} on {} from Etherscan, blocks {}", address, self.chain, blocks);

        let fetches = TransactionType::ALL.map(|category| self.fetch_category(address, &blocks, category));
        let results = join_all(fetches).await;

        let mut rows = Vec::new();
        for (category, records) in TransactionType::ALL.into_iter().zip(results) {
            tracing::info!("{}: {} records", category, records.len());
            rows.extend(records.iter().map(|record| self.normalize(record, category)));
        }

        let total = rows.len();
        let rows = dedup(rows);
        tracing::info!("{} rows after removing {} duplicates", rows.len(), total - rows.len());
        Ok(rows)
    }

    /// Rows page by page, one category after another, without dedup
    pub fn fetch_transactions_stream<'a>(
        &'a self,
        address: &'a str,
        range: Option<DateRange>,
    ) -> BoxStream<'a, Result<TransactionRow>> {
        Box::pin(stream! {
            let blocks = match self.resolve_block_range(range.as_ref()).await {
                Ok(blocks) => blocks,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };
            tracing::info!("Streaming {} on {} from Etherscan, blocks {}", address, self.chain, blocks);

            if blocks.is_empty() {
                return;
            }

            for category in TransactionType::ALL {
                let query = self.query(address, &blocks, category);
                let mut pages = self.paginator(&query, &blocks);
                while let Some(records) = pages.next_page().await {
                    for record in &records {
                        yield Ok(self.normalize(record, category));
                    }
                }
                tracing::info!("{}: {} records", category, pages.collected());
            }
        })
    }

    /// Map a raw record to the canonical row
    pub fn normalize(&self, tx: &EtherscanTransaction, category: TransactionType) -> TransactionRow {
        let hash = tx.hash.clone().unwrap_or_default();
        let native = self.chain.native_symbol().to_string();
        let contract = || tx.contract_address.clone().unwrap_or_default();

        let (asset_contract_address, asset_symbol, token_id, value_amount) = match category {
            TransactionType::Native => (
                String::new(),
                native,
                String::new(),
                normalize::native_amount(tx.value.as_deref(), &hash),
            ),
            TransactionType::Internal => (
                contract(),
                native,
                String::new(),
                normalize::native_amount(tx.value.as_deref(), &hash),
            ),
            TransactionType::Erc20 => (
                contract(),
                tx.token_symbol.clone().unwrap_or_default(),
                String::new(),
                normalize::token_amount(tx.value.as_deref(), tx.token_decimal.as_deref(), &hash),
            ),
            TransactionType::Erc721 => (
                contract(),
                tx.token_name.clone().unwrap_or_default(),
                normalize::token_id(tx.token_id.as_deref()),
                normalize::token_amount(tx.value.as_deref(), tx.token_decimal.as_deref(), &hash),
            ),
        };

        TransactionRow {
            date_time: normalize::iso_from_unix(tx.time_stamp.as_deref(), &hash),
            from_address: tx.from.clone().unwrap_or_default(),
            to_address: tx.to.clone().unwrap_or_default(),
            transaction_type: category,
            asset_contract_address,
            asset_symbol,
            token_id,
            value_amount,
            gas_fee_eth: normalize::gas_fee(
                tx.gas_used.as_deref(),
                tx.gas_price.as_deref(),
                category == TransactionType::Internal,
                &hash,
            ),
            transaction_hash: hash,
        }
    }
}

/// One account action for one address over a block range
struct CategoryQuery<'a> {
    provider: &'a EtherscanProvider,
    address: &'a str,
    category: TransactionType,
    end: BlockTag,
}

impl PageSource for CategoryQuery<'_> {
    type Record = EtherscanTransaction;

    fn label(&self) -> String {
        format!("etherscan {}", action(self.category))
    }

    async fn fetch_page(&self, request: &PageRequest) -> std::result::Result<Page<EtherscanTransaction>, UpstreamError> {
        let params = [
            ("module", "account".to_string()),
            ("action", action(self.category).to_string()),
            ("address", self.address.to_string()),
            ("startblock", request.start_block.to_string()),
            ("endblock", self.end.to_string()),
            ("page", request.page.to_string()),
            ("offset", request.page_size.to_string()),
            ("sort", "asc".to_string()),
        ];

        let response = self.provider.get(&params).await?;

        if response.status != "1" {
            // An empty result is reported as status "0"
            if response.message.contains("No transactions found") {
                return Ok(Page::new(Vec::new()));
            }
            return Err(UpstreamError::Status {
                status: response.status.clone(),
                message: response.error_message(),
            });
        }

        let records: Vec<EtherscanTransaction> =
            serde_json::from_value(response.result).map_err(|e| UpstreamError::Malformed(e.to_string()))?;
        Ok(Page::new(records))
    }
}
