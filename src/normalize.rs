//! Unit conversion and field defaults shared by the provider normalizers
//!
//! Integer values are parsed into `U256` and scaled by shifting the decimal
//! point in their string form, so results are exact at any magnitude. Nothing
//! here fails: absent or malformed input falls back to a default and logs a
//! [`NormalizationWarning`].

use crate::error::NormalizationWarning;
use alloy::primitives::U256;
use chrono::{DateTime, SecondsFormat, Utc};

/// Decimals of the chain's base currency
pub const NATIVE_DECIMALS: u8 = 18;

pub(crate) fn warn(warning: NormalizationWarning) {
    tracing::warn!("{}", warning);
}

/// Treat empty strings like missing fields
fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Parse an unsigned integer given in decimal or `0x` hex
pub fn parse_uint(value: &str) -> Option<U256> {
    let value = value.trim();
    match value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        Some("") => Some(U256::ZERO),
        Some(hex) => U256::from_str_radix(hex, 16).ok(),
        None if value.is_empty() => None,
        None => U256::from_str_radix(value, 10).ok(),
    }
}

/// Render `value / 10^decimals` as a plain decimal string.
///
/// Trailing fractional zeros are trimmed; whole numbers have no decimal point.
pub fn format_units(value: U256, decimals: u8) -> String {
    let digits = value.to_string();
    let decimals = decimals as usize;
    if decimals == 0 {
        return digits;
    }

    let (int_part, frac_part) = if digits.len() > decimals {
        let split = digits.len() - decimals;
        (digits[..split].to_string(), digits[split..].to_string())
    } else {
        ("0".to_string(), format!("{:0>width$}", digits, width = decimals))
    };

    let frac = frac_part.trim_end_matches('0');
    if frac.is_empty() {
        int_part
    } else {
        format!("{}.{}", int_part, frac)
    }
}

/// Native amount in wei to ETH. Absent or malformed input becomes `"0"`.
pub fn native_amount(wei: Option<&str>, tx: &str) -> String {
    let Some(raw) = present(wei) else {
        warn(NormalizationWarning::MissingField {
            tx: tx.to_string(),
            field: "value",
        });
        return "0".to_string();
    };

    match parse_uint(raw) {
        Some(value) => format_units(value, NATIVE_DECIMALS),
        None => {
            warn(NormalizationWarning::MalformedField {
                tx: tx.to_string(),
                field: "value",
                value: raw.to_string(),
            });
            "0".to_string()
        }
    }
}

/// Token decimals, defaulting to 18 when absent or malformed
pub fn token_decimals(decimals: Option<&str>, tx: &str) -> u8 {
    let Some(raw) = present(decimals) else {
        return NATIVE_DECIMALS;
    };

    let parsed = match raw.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => raw.parse::<u64>().ok(),
    };

    match parsed.and_then(|d| u8::try_from(d).ok()) {
        Some(d) => d,
        None => {
            warn(NormalizationWarning::MalformedField {
                tx: tx.to_string(),
                field: "tokenDecimal",
                value: raw.to_string(),
            });
            NATIVE_DECIMALS
        }
    }
}

/// Token amount scaled by its decimals.
///
/// A token transfer without a raw value (typical for NFTs) yields `""`.
pub fn token_amount(raw_value: Option<&str>, decimals: Option<&str>, tx: &str) -> String {
    let Some(raw) = present(raw_value) else {
        return String::new();
    };

    match parse_uint(raw) {
        Some(value) => format_units(value, token_decimals(decimals, tx)),
        None => {
            warn(NormalizationWarning::MalformedField {
                tx: tx.to_string(),
                field: "value",
                value: raw.to_string(),
            });
            "0".to_string()
        }
    }
}

/// Fee paid in ETH: `gas_used * gas_price / 10^18`.
///
/// Internal transactions carry no fee of their own and always get `"0"`, as
/// does any record missing either input.
pub fn gas_fee(gas_used: Option<&str>, gas_price: Option<&str>, is_internal: bool, tx: &str) -> String {
    if is_internal {
        return "0".to_string();
    }

    let (Some(used), Some(price)) = (present(gas_used), present(gas_price)) else {
        tracing::debug!("{}: missing gas data, fee set to 0", tx);
        return "0".to_string();
    };

    let (Some(used_value), Some(price_value)) = (parse_uint(used), parse_uint(price)) else {
        warn(NormalizationWarning::MalformedField {
            tx: tx.to_string(),
            field: "gas",
            value: format!("{} x {}", used, price),
        });
        return "0".to_string();
    };

    match used_value.checked_mul(price_value) {
        Some(fee) => format_units(fee, NATIVE_DECIMALS),
        None => {
            warn(NormalizationWarning::GasOverflow { tx: tx.to_string() });
            "0".to_string()
        }
    }
}

fn iso(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Unix seconds (decimal or hex) to ISO-8601
pub fn iso_from_unix(timestamp: Option<&str>, tx: &str) -> String {
    let Some(raw) = present(timestamp) else {
        warn(NormalizationWarning::MissingField {
            tx: tx.to_string(),
            field: "timeStamp",
        });
        return String::new();
    };

    let secs = match raw.strip_prefix("0x") {
        Some(hex) => i64::from_str_radix(hex, 16).ok(),
        None => raw.parse::<i64>().ok(),
    };

    match secs.and_then(|s| DateTime::from_timestamp(s, 0)) {
        Some(dt) => iso(dt),
        None => {
            warn(NormalizationWarning::MalformedField {
                tx: tx.to_string(),
                field: "timeStamp",
                value: raw.to_string(),
            });
            String::new()
        }
    }
}

/// RFC 3339 timestamp to the same ISO-8601 shape as [`iso_from_unix`]
pub fn iso_from_rfc3339(timestamp: Option<&str>, tx: &str) -> String {
    let Some(raw) = present(timestamp) else {
        warn(NormalizationWarning::MissingField {
            tx: tx.to_string(),
            field: "blockTimestamp",
        });
        return String::new();
    };

    match DateTime::parse_from_rfc3339(raw) {
        Ok(dt) => iso(dt.with_timezone(&Utc)),
        Err(_) => {
            warn(NormalizationWarning::MalformedField {
                tx: tx.to_string(),
                field: "blockTimestamp",
                value: raw.to_string(),
            });
            String::new()
        }
    }
}

/// Token id as a decimal string; hex ids are converted, unparseable ids kept
pub fn token_id(id: Option<&str>) -> String {
    match present(id) {
        Some(raw) if raw.starts_with("0x") => parse_uint(raw)
            .map(|v| v.to_string())
            .unwrap_or_else(|| raw.to_string()),
        Some(raw) => raw.to_string(),
        None => String::new(),
    }
}
