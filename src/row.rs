//! Canonical transaction row

use std::fmt;

/// Kind of value movement a row describes.
///
/// Variant order is the category order used when concatenating results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TransactionType {
    Native,
    Internal,
    Erc20,
    Erc721,
}

impl TransactionType {
    /// All categories in fetch/concatenation order
    pub const ALL: [TransactionType; 4] = [
        TransactionType::Native,
        TransactionType::Internal,
        TransactionType::Erc20,
        TransactionType::Erc721,
    ];

    /// Label written to the CSV
    pub fn label(&self) -> &'static str {
        match self {
            TransactionType::Native => "ETH transfer",
            TransactionType::Internal => "Internal transaction",
            TransactionType::Erc20 => "ERC-20 transfer",
            TransactionType::Erc721 => "ERC-721 transfer",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One normalized transfer, ready for export
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransactionRow {
    pub transaction_hash: String,
    /// ISO-8601 UTC, millisecond precision
    pub date_time: String,
    pub from_address: String,
    /// Empty for contract creation
    pub to_address: String,
    pub transaction_type: TransactionType,
    /// Empty for native transfers
    pub asset_contract_address: String,
    pub asset_symbol: String,
    /// Empty except for ERC-721
    pub token_id: String,
    pub value_amount: String,
    pub gas_fee_eth: String,
}

/// Fields that identify the same event across categories and pages
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub transaction_hash: String,
    pub from_address: String,
    pub to_address: String,
    pub asset_contract_address: String,
}

impl TransactionRow {
    pub fn dedup_key(&self) -> DedupKey {
        DedupKey {
            transaction_hash: self.transaction_hash.clone(),
            from_address: self.from_address.clone(),
            to_address: self.to_address.clone(),
            asset_contract_address: self.asset_contract_address.clone(),
        }
    }

    /// Row carries the identifying fields an export needs.
    ///
    /// `to_address` is allowed to be empty (contract creation).
    pub fn is_exportable(&self) -> bool {
        !self.transaction_hash.is_empty()
            && !self.date_time.is_empty()
            && !self.from_address.is_empty()
    }

    /// Fields in CSV column order
    pub fn to_record(&self) -> [&str; 10] {
        [
            &self.transaction_hash,
            &self.date_time,
            &self.from_address,
            &self.to_address,
            self.transaction_type.label(),
            &self.asset_contract_address,
            &self.asset_symbol,
            &self.token_id,
            &self.value_amount,
            &self.gas_fee_eth,
        ]
    }
}
