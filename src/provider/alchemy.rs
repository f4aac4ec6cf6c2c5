//! Alchemy provider
//!
//! Transfers come from `alchemy_getAssetTransfers`, which filters on one side
//! of a transfer at a time, so every category is queried twice (sent and
//! received). Gas fees need one receipt per transaction hash.

use super::pagination::{BlockNumbered, CursorMode, Page, PageRequest, PageSource, Paginator};
use super::{BlockRange, BlockTag};
use crate::config::{Chain, DateRange, FetchSettings, ProviderConfig, ProviderKind};
use crate::dedup::dedup;
use crate::error::{ConfigError, ResolutionError, Result, UpstreamError};
use crate::normalize;
use crate::row::{TransactionRow, TransactionType};
use async_stream::stream;
use chrono::{DateTime, SecondsFormat, Utc};
use futures::future::join_all;
use futures::stream::{BoxStream, StreamExt};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;

/// JSON-RPC response envelope
#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssetTransfersResult {
    #[serde(default)]
    transfers: Vec<AlchemyTransfer>,
    #[serde(default)]
    page_key: Option<String>,
}

/// One transfer as returned by `alchemy_getAssetTransfers`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AlchemyTransfer {
    pub block_num: Option<String>,
    pub hash: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub asset: Option<String>,
    pub erc721_token_id: Option<String>,
    pub token_id: Option<String>,
    pub raw_contract: RawContract,
    pub metadata: TransferMetadata,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawContract {
    pub value: Option<String>,
    pub address: Option<String>,
    pub decimal: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TransferMetadata {
    pub block_timestamp: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Receipt {
    pub gas_used: Option<String>,
    pub effective_gas_price: Option<String>,
}

/// Receipts looked up during one export, keyed by transaction hash. A failed
/// lookup is kept as `None` so it is not retried.
type ReceiptCache = HashMap<String, Option<Receipt>>;

/// Transfer plus the receipt it was paired with, if any
#[derive(Debug, Clone)]
pub struct AlchemyRecord {
    pub transfer: AlchemyTransfer,
    pub receipt: Option<Receipt>,
}

impl BlockNumbered for AlchemyTransfer {
    fn block_number(&self) -> Option<u64> {
        let raw = self.block_num.as_deref()?;
        let hex = raw.strip_prefix("0x")?;
        u64::from_str_radix(hex, 16).ok()
    }
}

#[derive(Debug, Deserialize)]
struct BlockByTimestamp {
    #[serde(default)]
    data: Vec<BlockByTimestampEntry>,
}

#[derive(Debug, Deserialize)]
struct BlockByTimestampEntry {
    block: BlockRef,
}

#[derive(Debug, Deserialize)]
struct BlockRef {
    number: Value,
}

fn category_param(category: TransactionType) -> &'static str {
    match category {
        TransactionType::Native => "external",
        TransactionType::Internal => "internal",
        TransactionType::Erc20 => "erc20",
        TransactionType::Erc721 => "erc721",
    }
}

/// Which side of the transfer the address is on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Sent,
    Received,
}

impl Direction {
    const BOTH: [Direction; 2] = [Direction::Sent, Direction::Received];

    fn param(&self) -> &'static str {
        match self {
            Direction::Sent => "fromAddress",
            Direction::Received => "toAddress",
        }
    }
}

fn parse_hex_u64(raw: &str) -> Option<u64> {
    u64::from_str_radix(raw.trim().strip_prefix("0x")?, 16).ok()
}

/// Alchemy-backed provider
#[derive(Debug, Clone)]
pub struct AlchemyProvider {
    client: reqwest::Client,
    rpc_url: String,
    data_url: String,
    network: &'static str,
    chain: Chain,
    settings: FetchSettings,
}

impl AlchemyProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let network = config
            .chain
            .alchemy_network()
            .ok_or_else(|| ConfigError::UnsupportedChain {
                provider: ProviderKind::Alchemy.to_string(),
                chain: config.chain.to_string(),
            })?;

        let api_key = config
            .alchemy_api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ConfigError::MissingField("ALCHEMY_API_KEY".to_string()))?;

        let rpc_url = config
            .alchemy_rpc_url
            .clone()
            .unwrap_or_else(|| format!("https://{}.g.alchemy.com/v2/{}", network, api_key));
        let data_url = format!("{}/{}", config.alchemy_data_url.trim_end_matches('/'), api_key);

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ConfigError::InvalidFile(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            rpc_url,
            data_url,
            network,
            chain: config.chain,
            settings: config.settings.clone(),
        })
    }

    pub fn chain(&self) -> Chain {
        self.chain
    }

    async fn rpc<T: DeserializeOwned>(&self, method: &str, params: Value) -> std::result::Result<T, UpstreamError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let response = self.client.post(&self.rpc_url).json(&body).send().await?;
        if !response.status().is_success() {
            return Err(UpstreamError::HttpStatus(response.status()));
        }

        let text = response.text().await?;
        let envelope: RpcResponse<T> =
            serde_json::from_str(&text).map_err(|e| UpstreamError::Malformed(e.to_string()))?;

        if let Some(error) = envelope.error {
            return Err(UpstreamError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        envelope
            .result
            .ok_or_else(|| UpstreamError::Malformed(format!("{} returned no result", method)))
    }

    async fn latest_block(&self) -> std::result::Result<u64, ResolutionError> {
        let head: String = self
            .rpc("eth_blockNumber", json!([]))
            .await
            .map_err(|e| ResolutionError::LatestBlock(e.to_string()))?;
        parse_hex_u64(&head).ok_or(ResolutionError::Malformed(head))
    }

    async fn block_by_time(&self, at: DateTime<Utc>, direction: &str) -> std::result::Result<u64, ResolutionError> {
        let timestamp = at.to_rfc3339_opts(SecondsFormat::Millis, true);
        let response = self
            .client
            .get(format!("{}/utility/blocks/by-timestamp", self.data_url))
            .query(&[
                ("networks", self.network),
                ("timestamp", timestamp.as_str()),
                ("direction", direction),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ResolutionError::Status {
                timestamp,
                message: format!("HTTP {}", response.status()),
            });
        }

        let body = response.text().await?;
        let parsed: BlockByTimestamp =
            serde_json::from_str(&body).map_err(|e| ResolutionError::Malformed(e.to_string()))?;
        let entry = parsed
            .data
            .into_iter()
            .next()
            .ok_or_else(|| ResolutionError::NotFound(timestamp.clone()))?;

        let number = match &entry.block.number {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => parse_hex_u64(s).or_else(|| s.parse().ok()),
            _ => None,
        };
        number.ok_or_else(|| ResolutionError::Malformed(entry.block.number.to_string()))
    }

    /// Map the date window to blocks; no window means genesis to the current head
    pub async fn resolve_block_range(&self, range: Option<&DateRange>) -> Result<BlockRange> {
        let Some(range) = range else {
            let head = self.latest_block().await?;
            return Ok(BlockRange::new(0, BlockTag::Number(head)));
        };

        let (start, end) = tokio::try_join!(
            self.block_by_time(range.from(), "AFTER"),
            self.block_by_time(range.to(), "BEFORE"),
        )?;

        tracing::debug!("Resolved {} .. {} to blocks {}..{}", range.from(), range.to(), start, end);
        Ok(BlockRange::new(start, BlockTag::Number(end)))
    }

    async fn receipt(&self, hash: &str) -> std::result::Result<Receipt, UpstreamError> {
        self.rpc("eth_getTransactionReceipt", json!([hash])).await
    }

    /// Pair transfers with receipts. Hashes missing from `cache` are looked up
    /// concurrently; each hash is requested at most once per cache.
    async fn attach_receipts(
        &self,
        transfers: Vec<AlchemyTransfer>,
        category: TransactionType,
        cache: &mut ReceiptCache,
    ) -> Vec<AlchemyRecord> {
        if !self.settings.fetch_receipts || category == TransactionType::Internal {
            return transfers
                .into_iter()
                .map(|transfer| AlchemyRecord { transfer, receipt: None })
                .collect();
        }

        let mut missing: Vec<String> = transfers
            .iter()
            .filter_map(|t| t.hash.clone())
            .filter(|h| !cache.contains_key(h))
            .collect();
        missing.sort();
        missing.dedup();

        let fetched: Vec<(String, Option<Receipt>)> = futures::stream::iter(missing)
            .map(|hash| async move {
                let receipt = match self.receipt(&hash).await {
                    Ok(receipt) => Some(receipt),
                    Err(e) => {
                        tracing::warn!("{}: receipt lookup failed, gas fee set to 0: {}", hash, e);
                        None
                    }
                };
                (hash, receipt)
            })
            .buffer_unordered(self.settings.receipt_concurrency.max(1))
            .collect()
            .await;
        cache.extend(fetched);

        transfers
            .into_iter()
            .map(|transfer| {
                let receipt = transfer
                    .hash
                    .as_ref()
                    .and_then(|h| cache.get(h))
                    .cloned()
                    .flatten();
                AlchemyRecord { transfer, receipt }
            })
            .collect()
    }

    fn query<'a>(
        &'a self,
        address: &'a str,
        blocks: &BlockRange,
        category: TransactionType,
        direction: Direction,
    ) -> TransferQuery<'a> {
        TransferQuery {
            provider: self,
            address,
            category,
            direction,
            end: blocks.end,
        }
    }

    fn paginator<'a>(&'a self, query: &'a TransferQuery<'a>, blocks: &BlockRange) -> Paginator<'a, TransferQuery<'a>> {
        Paginator::new(query, &self.settings, CursorMode::Token, blocks.start, blocks.end_number())
    }

    /// Both directions of one category, merged in block order
    async fn fetch_category(&self, address: &str, blocks: &BlockRange, category: TransactionType) -> Vec<AlchemyTransfer> {
        if blocks.is_empty() {
            return Vec::new();
        }

        let sent = self.query(address, blocks, category, Direction::Sent);
        let received = self.query(address, blocks, category, Direction::Received);
        let (mut records, received) = futures::join!(
            self.paginator(&sent, blocks).collect_all(),
            self.paginator(&received, blocks).collect_all(),
        );

        records.extend(received);
        records.sort_by_key(|r| r.block_number().unwrap_or(u64::MAX));
        records
    }

    /// Fetch every category, normalize, concatenate and dedup
    pub async fn fetch_transactions(&self, address: &str, range: Option<&DateRange>) -> Result<Vec<TransactionRow>> {
        let blocks = self.resolve_block_range(range).await?;
        tracing::info!("Fetching {} on {} from Alchemy, blocks {}", address, self.chain, blocks);

        let fetches = TransactionType::ALL.map(|category| self.fetch_category(address, &blocks, category));
        let results = join_all(fetches).await;

        let mut receipts = ReceiptCache::new();
        let mut rows = Vec::new();
        for (category, transfers) in TransactionType::ALL.into_iter().zip(results) {
            tracing::info!("{}: {} records", category, transfers.len());
            let records = self.attach_receipts(transfers, category, &mut receipts).await;
            rows.extend(records.iter().map(|record| self.normalize(record, category)));
        }

        let total = rows.len();
        let rows = dedup(rows);
        tracing::info!("{} rows after removing {} duplicates", rows.len(), total - rows.len());
        Ok(rows)
    }

    /// Rows page by page; categories in order, sent before received
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
            tracing::info!("Streaming {} on {} from Alchemy, blocks {}", address, self.chain, blocks);

            if blocks.is_empty() {
                return;
            }

            let mut receipts = ReceiptCache::new();
            for category in TransactionType::ALL {
                let mut count = 0;
                for direction in Direction::BOTH {
                    let query = self.query(address, &blocks, category, direction);
                    let mut pages = self.paginator(&query, &blocks);
                    while let Some(transfers) = pages.next_page().await {
                        let records = self.attach_receipts(transfers, category, &mut receipts).await;
                        for record in &records {
                            yield Ok(self.normalize(record, category));
                        }
                    }
                    count += pages.collected();
                }
                tracing::info!("{}: {} records", category, count);
            }
        })
    }

    /// Map a transfer (and its receipt) to the canonical row
    pub fn normalize(&self, record: &AlchemyRecord, category: TransactionType) -> TransactionRow {
        let tx = &record.transfer;
        let hash = tx.hash.clone().unwrap_or_default();
        let raw = &tx.raw_contract;

        let (asset_contract_address, asset_symbol, token_id, value_amount) = match category {
            TransactionType::Native | TransactionType::Internal => (
                String::new(),
                self.chain.native_symbol().to_string(),
                String::new(),
                normalize::native_amount(raw.value.as_deref(), &hash),
            ),
            TransactionType::Erc20 => (
                raw.address.clone().unwrap_or_default(),
                tx.asset.clone().unwrap_or_default(),
                String::new(),
                normalize::token_amount(raw.value.as_deref(), raw.decimal.as_deref(), &hash),
            ),
            TransactionType::Erc721 => (
                raw.address.clone().unwrap_or_default(),
                tx.asset.clone().unwrap_or_default(),
                normalize::token_id(tx.erc721_token_id.as_deref().or(tx.token_id.as_deref())),
                normalize::token_amount(raw.value.as_deref(), raw.decimal.as_deref(), &hash),
            ),
        };

        let receipt = record.receipt.as_ref();
        TransactionRow {
            date_time: normalize::iso_from_rfc3339(tx.metadata.block_timestamp.as_deref(), &hash),
            from_address: tx.from.clone().unwrap_or_default(),
            to_address: tx.to.clone().unwrap_or_default(),
            transaction_type: category,
            asset_contract_address,
            asset_symbol,
            token_id,
            value_amount,
            gas_fee_eth: normalize::gas_fee(
                receipt.and_then(|r| r.gas_used.as_deref()),
                receipt.and_then(|r| r.effective_gas_price.as_deref()),
                category == TransactionType::Internal,
                &hash,
            ),
            transaction_hash: hash,
        }
    }
}

/// One category and direction for one address over a block range
struct TransferQuery<'a> {
    provider: &'a AlchemyProvider,
    address: &'a str,
    category: TransactionType,
    direction: Direction,
    end: BlockTag,
}

impl PageSource for TransferQuery<'_> {
    type Record = AlchemyTransfer;

    fn label(&self) -> String {
        format!(
            "alchemy {} {}",
            category_param(self.category),
            self.direction.param()
        )
    }

    async fn fetch_page(&self, request: &PageRequest) -> std::result::Result<Page<AlchemyTransfer>, UpstreamError> {
        let to_block = match self.end {
            BlockTag::Number(n) => format!("{:#x}", n),
            BlockTag::Latest => "latest".to_string(),
        };

        let mut params = serde_json::Map::new();
        params.insert("fromBlock".into(), json!(format!("{:#x}", request.start_block)));
        params.insert("toBlock".into(), json!(to_block));
        params.insert("category".into(), json!([category_param(self.category)]));
        params.insert("order".into(), json!("asc"));
        params.insert("maxCount".into(), json!(format!("{:#x}", request.page_size)));
        params.insert("withMetadata".into(), json!(true));
        params.insert("excludeZeroValue".into(), json!(false));
        params.insert(self.direction.param().into(), json!(self.address));
        if let Some(key) = &request.page_key {
            params.insert("pageKey".into(), json!(key));
        }

        let result: AssetTransfersResult = self
            .provider
            .rpc("alchemy_getAssetTransfers", Value::Array(vec![Value::Object(params)]))
            .await?;

        Ok(Page::new(result.transfers).with_next_key(result.page_key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(fetch_receipts: bool) -> AlchemyProvider {
        let config = ProviderConfig::new(ProviderKind::Alchemy)
            .with_alchemy_key("key")
            .with_settings(FetchSettings::default().with_fetch_receipts(fetch_receipts));
        AlchemyProvider::new(&config).unwrap()
    }

    fn record(json: &str, receipt: Option<Receipt>) -> AlchemyRecord {
        AlchemyRecord {
            transfer: serde_json::from_str(json).unwrap(),
            receipt,
        }
    }

    #[test]
    fn test_unsupported_chain() {
        let config = ProviderConfig::new(ProviderKind::Alchemy)
            .with_chain(Chain::Bsc)
            .with_alchemy_key("key");
        let err = AlchemyProvider::new(&config).unwrap_err();
        assert!(err.to_string().contains("not supported by the alchemy provider"));
    }

    #[test]
    fn test_default_urls() {
        let provider = provider(true);
        assert_eq!(provider.rpc_url, "https://eth-mainnet.g.alchemy.com/v2/key");
        assert_eq!(provider.data_url, "https://api.g.alchemy.com/data/v1/key");
    }

    #[test]
    fn test_block_number_from_hex() {
        let r = record(r#"{"blockNum": "0x10"}"#, None);
        assert_eq!(r.transfer.block_number(), Some(16));
        let r = record(r#"{"blockNum": null}"#, None);
        assert_eq!(r.transfer.block_number(), None);
    }

    #[test]
    fn test_normalize_external_with_receipt() {
        let r = record(
            r#"{
                "blockNum": "0x1", "hash": "0xaaa", "from": "0xf", "to": "0xt",
                "asset": "ETH", "category": "external", "value": 1.0,
                "rawContract": {"value": "0xde0b6b3a7640000", "address": null, "decimal": "0x12"},
                "metadata": {"blockTimestamp": "2022-01-01T00:00:00.000Z"}
            }"#,
            Some(Receipt {
                gas_used: Some("0x5208".to_string()),
                effective_gas_price: Some("0x4a817c800".to_string()),
            }),
        );
        let row = provider(true).normalize(&r, TransactionType::Native);

        assert_eq!(row.date_time, "2022-01-01T00:00:00.000Z");
        assert_eq!(row.value_amount, "1");
        assert_eq!(row.asset_symbol, "ETH");
        assert_eq!(row.asset_contract_address, "");
        assert_eq!(row.gas_fee_eth, "0.00042");
    }

    #[test]
    fn test_normalize_tokens() {
        let erc20 = record(
            r#"{
                "blockNum": "0x1", "hash": "0xbbb", "from": "0xf", "to": "0xt", "asset": "USDC",
                "rawContract": {"value": "0xf4240", "address": "0xusdc", "decimal": "0x6"},
                "metadata": {"blockTimestamp": "2022-01-01T00:00:00.000Z"}
            }"#,
            None,
        );
        let row = provider(false).normalize(&erc20, TransactionType::Erc20);
        assert_eq!(row.value_amount, "1");
        assert_eq!(row.asset_symbol, "USDC");
        assert_eq!(row.asset_contract_address, "0xusdc");
        assert_eq!(row.gas_fee_eth, "0");

        let nft = record(
            r#"{
                "blockNum": "0x1", "hash": "0xccc", "from": "0xf", "to": "0xt", "asset": "PUNK",
                "erc721TokenId": "0x0000000000000000000000000000000000000000000000000000000000000010",
                "rawContract": {"value": null, "address": "0xnft", "decimal": null},
                "metadata": {"blockTimestamp": "2022-01-01T00:00:00.000Z"}
            }"#,
            None,
        );
        let row = provider(false).normalize(&nft, TransactionType::Erc721);
        assert_eq!(row.token_id, "16");
        assert_eq!(row.value_amount, "");
        assert_eq!(row.asset_symbol, "PUNK");
    }

    #[test]
    fn test_internal_has_no_fee() {
        let r = record(
            r#"{
                "blockNum": "0x1", "hash": "0xddd", "from": "0xc", "to": "0xt",
                "rawContract": {"value": "0x6f05b59d3b20000"},
                "metadata": {"blockTimestamp": "2022-01-01T00:00:00.000Z"}
            }"#,
            Some(Receipt {
                gas_used: Some("0x5208".to_string()),
                effective_gas_price: Some("0x1".to_string()),
            }),
        );
        let row = provider(true).normalize(&r, TransactionType::Internal);
        assert_eq!(row.value_amount, "0.5");
        assert_eq!(row.gas_fee_eth, "0");
    }
}
