//! Duplicate removal keyed on (hash, from, to, asset contract)

use crate::error::Result;
use crate::row::{DedupKey, TransactionRow};
use futures::{Stream, StreamExt};
use std::collections::HashSet;

/// Seen-set of row keys. First occurrence wins.
#[derive(Debug, Default)]
pub struct Deduplicator {
    seen: HashSet<DedupKey>,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the row's key; returns false if it was already seen
    pub fn insert(&mut self, row: &TransactionRow) -> bool {
        self.seen.insert(row.dedup_key())
    }
}

/// Remove duplicate rows, keeping first-seen order
pub fn dedup(rows: Vec<TransactionRow>) -> Vec<TransactionRow> {
    let mut dedup = Deduplicator::new();
    rows.into_iter().filter(|row| dedup.insert(row)).collect()
}

/// Opt-in dedup stage for the streaming path.
///
/// Holds one key per distinct row, so memory grows with the output. Errors
/// pass through untouched.
pub fn dedup_stream<S>(rows: S) -> impl Stream<Item = Result<TransactionRow>>
where
    S: Stream<Item = Result<TransactionRow>>,
{
    let mut dedup = Deduplicator::new();
    rows.filter(move |item| {
        let keep = match item {
            Ok(row) => dedup.insert(row),
            Err(_) => true,
        };
        futures::future::ready(keep)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::row::TransactionType;

    fn row(hash: &str, contract: &str, value: &str) -> TransactionRow {
        TransactionRow {
            transaction_hash: hash.to_string(),
            date_time: "2023-01-01T00:00:00.000Z".to_string(),
            from_address: "0xabc".to_string(),
            to_address: "0xdef".to_string(),
            transaction_type: TransactionType::Native,
            asset_contract_address: contract.to_string(),
            asset_symbol: "ETH".to_string(),
            token_id: String::new(),
            value_amount: value.to_string(),
            gas_fee_eth: "0".to_string(),
        }
    }

    #[test]
    fn test_removes_duplicates_keeping_first() {
        let rows = vec![row("0x123", "", "1"), row("0x123", "", "2"), row("0x456", "", "3")];

        let result = dedup(rows);
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].transaction_hash, "0x123");
        assert_eq!(result[0].value_amount, "1");
        assert_eq!(result[1].transaction_hash, "0x456");
    }

    #[test]
    fn test_empty() {
        assert!(dedup(Vec::new()).is_empty());
    }

    #[test]
    fn test_keeps_different_contracts() {
        let rows = vec![row("0x123", "0xcontract1", "1"), row("0x123", "0xcontract2", "1")];
        assert_eq!(dedup(rows).len(), 2);
    }

    #[test]
    fn test_key_ignores_non_key_fields() {
        let mut second = row("0x123", "", "1");
        second.transaction_type = TransactionType::Internal;
        second.gas_fee_eth = "0.1".to_string();

        let result = dedup(vec![row("0x123", "", "1"), second]);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].transaction_type, TransactionType::Native);
    }

    #[test]
    fn test_idempotent() {
        let rows = vec![
            row("0x1", "", "1"),
            row("0x2", "0xa", "1"),
            row("0x1", "", "1"),
            row("0x2", "0xb", "1"),
            row("0x2", "0xa", "9"),
        ];

        let once = dedup(rows);
        let twice = dedup(once.clone());
        assert_eq!(once, twice);
        assert_eq!(once.len(), 3);
    }

    #[tokio::test]
    async fn test_dedup_stream_passes_errors() {
        let items: Vec<Result<TransactionRow>> = vec![
            Ok(row("0x1", "", "1")),
            Ok(row("0x1", "", "1")),
            Err(Error::Other("boom".to_string())),
            Ok(row("0x2", "", "1")),
        ];

        let out: Vec<_> = dedup_stream(futures::stream::iter(items)).collect().await;
        assert_eq!(out.len(), 3);
        assert!(out[0].is_ok());
        assert!(out[1].is_err());
        assert_eq!(out[2].as_ref().unwrap().transaction_hash, "0x2");
    }
}
