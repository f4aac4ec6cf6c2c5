//! CLI integration tests
//!
//! Runs the eth-tx-export binary end-to-end: argument validation offline, and
//! full exports against a mock Etherscan server

use assert_cmd::Command;
use mockito::{Matcher, Server, ServerGuard};
use predicates::prelude::*;
use tempfile::TempDir;

const ADDRESS: &str = "0xa39b189482f984388a34460636fea9eb181ad1a6";

/// Binary with an isolated config dir and no provider settings from the environment
fn cli(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("eth-tx-export").unwrap();
    cmd.env("HOME", home.path())
        .env("XDG_CONFIG_HOME", home.path().join(".config"))
        .env_remove("DATA_PROVIDER")
        .env_remove("ETHERSCAN_API_KEY")
        .env_remove("ETHERSCAN_API_URL")
        .env_remove("ALCHEMY_API_KEY");
    cmd
}

fn home() -> TempDir {
    tempfile::tempdir().unwrap()
}

// ==================== Basic CLI tests ====================

#[test]
fn test_version() {
    cli(&home())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("eth-tx-export"));
}

#[test]
fn test_help() {
    cli(&home())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("ERC-20 and ERC-721"))
        .stdout(predicate::str::contains("--stream"));
}

// ==================== Argument validation ====================

#[test]
fn test_missing_address() {
    cli(&home())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Address is required"));
}

#[test]
fn test_invalid_address() {
    cli(&home())
        .arg("0x1234")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid address format"));
}

#[test]
fn test_single_date_rejected() {
    cli(&home())
        .args([ADDRESS, "2023-01-01"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Both FROM_DATE and TO_DATE"));
}

#[test]
fn test_invalid_date() {
    cli(&home())
        .args([ADDRESS, "2023-13-45", "2023-12-31"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid date"));
}

#[test]
fn test_reversed_dates() {
    cli(&home())
        .args([ADDRESS, "2023-12-31", "2023-01-01"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("earlier than start date"));
}

#[test]
fn test_date_range_too_large() {
    cli(&home())
        .args([ADDRESS, "2021-01-01", "2023-01-01"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("too large"));
}

#[test]
fn test_unsupported_provider() {
    cli(&home())
        .args([ADDRESS, "--provider", "infura"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unsupported data provider: infura"));
}

#[test]
fn test_missing_api_key() {
    cli(&home())
        .arg(ADDRESS)
        .assert()
        .failure()
        .stderr(predicate::str::contains("ETHERSCAN_API_KEY"));
}

#[test]
fn test_alchemy_unsupported_chain() {
    cli(&home())
        .args([ADDRESS, "--provider", "alchemy", "--alchemy-key", "k", "--chain", "bsc"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not supported by the alchemy provider"));
}

#[test]
fn test_dedup_requires_stream() {
    cli(&home())
        .args([ADDRESS, "--dedup"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--stream"));
}

// ==================== Config subcommands ====================

#[test]
fn test_config_path() {
    cli(&home())
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("eth-tx-export"))
        .stdout(predicate::str::contains("config.toml"));
}

#[test]
fn test_config_set_key_and_show() {
    let home = home();

    cli(&home)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No config file found"));

    cli(&home)
        .args(["config", "set-key", "etherscan", "saved-key"])
        .assert()
        .success();

    cli(&home)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("etherscan_api_key = \"saved-key\""));
}

#[test]
fn test_config_set_key_unknown_provider() {
    cli(&home())
        .args(["config", "set-key", "infura", "k"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unsupported data provider"));
}

// ==================== Export against a mock Etherscan ====================

fn mock_etherscan() -> ServerGuard {
    let mut server = Server::new();

    let native = serde_json::json!({
        "status": "1",
        "message": "OK",
        "result": [{
            "blockNumber": "16308200",
            "timeStamp": "1672531200",
            "hash": "0xaaa",
            "from": "0x1111111111111111111111111111111111111111",
            "to": ADDRESS,
            "value": "1500000000000000000",
            "contractAddress": "",
            "gasUsed": "21000",
            "gasPrice": "20000000000"
        }]
    });

    server
        .mock("GET", "/v2/api")
        .match_query(Matcher::UrlEncoded("action".into(), "txlist".into()))
        .with_status(200)
        .with_body(native.to_string())
        .create();

    for action in ["txlistinternal", "tokentx", "tokennfttx"] {
        server
            .mock("GET", "/v2/api")
            .match_query(Matcher::UrlEncoded("action".into(), action.into()))
            .with_status(200)
            .with_body(r#"{"status":"0","message":"No transactions found","result":[]}"#)
            .create();
    }

    server
}

#[test]
fn test_export_to_csv() {
    let home = home();
    let server = mock_etherscan();
    let output = home.path().join("out").join("history.csv");

    cli(&home)
        .env("ETHERSCAN_API_KEY", "test-key")
        .env("ETHERSCAN_API_URL", server.url())
        .args([ADDRESS, "--rate-limit-ms", "0", "-q", "-o"])
        .arg(&output)
        .assert()
        .success();

    let content = std::fs::read_to_string(&output).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("Transaction Hash,Date & Time,From Address"));
    assert_eq!(
        lines[1],
        format!(
            "0xaaa,2023-01-01T00:00:00.000Z,0x1111111111111111111111111111111111111111,{},ETH transfer,,ETH,,1.5,0.00042",
            ADDRESS
        )
    );
}

#[test]
fn test_stream_export_to_csv() {
    let home = home();
    let server = mock_etherscan();
    let output = home.path().join("streamed.csv");

    cli(&home)
        .env("ETHERSCAN_API_KEY", "test-key")
        .env("ETHERSCAN_API_URL", server.url())
        .args([ADDRESS, "--stream", "--dedup", "--rate-limit-ms", "0", "-o"])
        .arg(&output)
        .assert()
        .success()
        .stderr(predicate::str::contains("Exported 1 transactions"));

    let content = std::fs::read_to_string(&output).unwrap();
    assert_eq!(content.lines().count(), 2);
    assert!(content.contains("0xaaa"));
}

// ==================== Failed exports ====================

fn failing_block_lookup() -> ServerGuard {
    let mut server = Server::new();
    server
        .mock("GET", "/v2/api")
        .match_query(Matcher::UrlEncoded("module".into(), "block".into()))
        .with_status(200)
        .with_body(r#"{"status":"0","message":"NOTOK","result":"Error! Invalid timestamp"}"#)
        .create();
    server
}

#[test]
fn test_failed_export_keeps_existing_file() {
    let home = home();
    let server = failing_block_lookup();
    let output = home.path().join("prior.csv");
    std::fs::write(&output, "previous export contents\n").unwrap();

    cli(&home)
        .env("ETHERSCAN_API_KEY", "test-key")
        .env("ETHERSCAN_API_URL", server.url())
        .args([ADDRESS, "2023-01-01", "2023-02-01", "--rate-limit-ms", "0", "-q", "-o"])
        .arg(&output)
        .assert()
        .failure();

    assert_eq!(std::fs::read_to_string(&output).unwrap(), "previous export contents\n");
}

#[test]
fn test_failed_stream_export_creates_no_file() {
    let home = home();
    let server = failing_block_lookup();
    let output = home.path().join("out").join("streamed.csv");

    cli(&home)
        .env("ETHERSCAN_API_KEY", "test-key")
        .env("ETHERSCAN_API_URL", server.url())
        .args([ADDRESS, "2023-01-01", "2023-02-01", "--stream", "--rate-limit-ms", "0", "-q", "-o"])
        .arg(&output)
        .assert()
        .failure();

    assert!(!output.exists());
}

#[test]
fn test_receipt_concurrency_flag() {
    cli(&home())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--receipt-concurrency"));
}
