//! Error types for eth-tx-export

use thiserror::Error;

/// Main error type for the library
#[derive(Error, Debug)]
pub enum Error {
    /// Block range resolution errors
    #[error("Resolution error: {0}")]
    Resolution(#[from] ResolutionError),

    /// Upstream request errors
    #[error("Upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Output errors
    #[error("Output error: {0}")]
    Output(#[from] OutputError),

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

/// Failures while mapping timestamps (or "latest") to block numbers.
///
/// Always fatal: without a block range there is nothing to fetch.
#[derive(Error, Debug)]
pub enum ResolutionError {
    #[error("Block lookup for {timestamp} failed: {message}")]
    Status { timestamp: String, message: String },

    #[error("Unparseable block number in response: {0}")]
    Malformed(String),

    #[error("No block found for {0}")]
    NotFound(String),

    #[error("Failed to fetch latest block: {0}")]
    LatestBlock(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Failures of a single paginated request.
///
/// Pagination catches these at the page boundary and stops with the records
/// collected so far.
#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("HTTP status {0}")]
    HttpStatus(reqwest::StatusCode),

    #[error("Provider returned status {status}: {message}")]
    Status { status: String, message: String },

    #[error("JSON-RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Malformed payload: {0}")]
    Malformed(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Unsupported data provider: {0}")]
    UnsupportedProvider(String),

    #[error("Chain {chain} is not supported by the {provider} provider")]
    UnsupportedChain { provider: String, chain: String },

    #[error("Invalid config file: {0}")]
    InvalidFile(String),

    #[error("Invalid address format: {0}")]
    InvalidAddress(String),

    #[error("Invalid date: {0}")]
    InvalidDate(String),

    #[error("Invalid chain: {0}")]
    InvalidChain(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Config file parse error: {0}")]
    ParseError(#[from] toml::de::Error),
}

/// Output-related errors
#[derive(Error, Debug)]
pub enum OutputError {
    #[error("Failed to write CSV: {0}")]
    CsvWrite(String),

    #[error("Failed to create output file: {0}")]
    FileCreate(String),
}

/// A raw record lacked data needed for a precise value; a default was used.
///
/// These are logged, never returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NormalizationWarning {
    #[error("{tx}: missing {field}, using default")]
    MissingField { tx: String, field: &'static str },

    #[error("{tx}: malformed {field} {value:?}, using default")]
    MalformedField {
        tx: String,
        field: &'static str,
        value: String,
    },

    #[error("{tx}: gas fee overflows 256 bits, using 0")]
    GasOverflow { tx: String },
}

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Other(s.to_string())
    }
}
