//! eth-tx-export CLI - Export the transaction history of an address to CSV

use alloy::primitives::Address;
use clap::{Parser, Subcommand};
use eth_tx_export::{
    dedup_stream, parse_date, Chain, ConfigError, ConfigFile, CsvExporter, DateRange,
    OutputWriter, Provider, ProviderConfig, ProviderKind, TransactionRow,
};
use futures::{Stream, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "eth-tx-export")]
#[command(
    version,
    about = "Export native, internal, ERC-20 and ERC-721 transfers of an address to CSV"
)]
#[command(after_help = r#"EXAMPLES:
    # Full history from Etherscan
    eth-tx-export 0xa39b189482f984388a34460636fea9eb181ad1a6

    # One year, streamed to disk as pages arrive
    eth-tx-export 0xa39b189482f984388a34460636fea9eb181ad1a6 2023-01-01 2023-12-31 --stream

    # Alchemy on Polygon, without receipt lookups
    eth-tx-export 0x... --provider alchemy --chain polygon --no-receipts

ENVIRONMENT VARIABLES:
    DATA_PROVIDER        etherscan | alchemy
    ETHERSCAN_API_KEY    Etherscan API key
    ETHERSCAN_API_URL    Etherscan base URL
    ALCHEMY_API_KEY      Alchemy API key

CONFIG FILE:
    Default: ~/.config/eth-tx-export/config.toml
"#)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Address to export
    address: Option<String>,

    /// Start date (YYYY-MM-DD or RFC 3339), requires TO_DATE
    from_date: Option<String>,

    /// End date (YYYY-MM-DD or RFC 3339), requires FROM_DATE
    to_date: Option<String>,

    /// Data provider (etherscan, alchemy)
    #[arg(long, env = "DATA_PROVIDER")]
    provider: Option<String>,

    /// Chain name or id
    #[arg(long, global = true)]
    chain: Option<String>,

    /// Etherscan API key
    #[arg(long, env = "ETHERSCAN_API_KEY", hide_env_values = true)]
    etherscan_key: Option<String>,

    /// Etherscan API base URL
    #[arg(long, env = "ETHERSCAN_API_URL")]
    etherscan_url: Option<String>,

    /// Alchemy API key
    #[arg(long, env = "ALCHEMY_API_KEY", hide_env_values = true)]
    alchemy_key: Option<String>,

    /// Output CSV path
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Write rows as pages arrive instead of after the full fetch
    #[arg(long)]
    stream: bool,

    /// Drop duplicate rows while streaming (keeps a key per row in memory)
    #[arg(long, requires = "stream")]
    dedup: bool,

    /// Records per page request
    #[arg(long)]
    page_size: Option<u32>,

    /// Delay before each page request in milliseconds
    #[arg(long)]
    rate_limit_ms: Option<u64>,

    /// Skip receipt lookups (Alchemy gas fees become 0)
    #[arg(long)]
    no_receipts: bool,

    /// Parallel receipt lookups for Alchemy gas fees
    #[arg(long)]
    receipt_concurrency: Option<usize>,

    /// Longest allowed date range in days
    #[arg(long, default_value = "365")]
    max_days: i64,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress progress output
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show config file path
    Path,

    /// Show current config
    Show,

    /// Save an API key for a provider
    SetKey {
        /// Provider (etherscan, alchemy)
        provider: String,

        /// API key
        key: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(EnvFilter::new(filter))
        .init();

    if let Some(Commands::Config { action }) = &cli.command {
        return handle_config(action);
    }

    run_export(&cli).await
}

/// Both dates or neither, in order, within `max_days`
fn date_range(cli: &Cli) -> anyhow::Result<Option<DateRange>> {
    let (from, to) = match (&cli.from_date, &cli.to_date) {
        (None, None) => return Ok(None),
        (Some(from), Some(to)) => (parse_date(from)?, parse_date(to)?),
        _ => anyhow::bail!("Both FROM_DATE and TO_DATE must be provided together, or neither"),
    };

    let range = DateRange::new(from, to)?;
    if range.to() - range.from() > chrono::Duration::days(cli.max_days) {
        anyhow::bail!(
            "Date range of {} days is too large, the maximum is {} (see --max-days)",
            range.days(),
            cli.max_days
        );
    }
    Ok(Some(range))
}

fn provider_config(cli: &Cli, config_file: &Option<ConfigFile>) -> anyhow::Result<ProviderConfig> {
    let kind: ProviderKind = cli
        .provider
        .clone()
        .or_else(|| config_file.as_ref().and_then(|c| c.provider.clone()))
        .unwrap_or_else(|| ProviderKind::Etherscan.to_string())
        .parse()?;

    let chain: Chain = cli
        .chain
        .clone()
        .or_else(|| config_file.as_ref().and_then(|c| c.chain.clone()))
        .map(|c| c.parse::<Chain>())
        .transpose()?
        .unwrap_or_default();

    let mut settings = config_file
        .as_ref()
        .map(|c| c.settings.fetch_settings())
        .unwrap_or_default();
    if let Some(page_size) = cli.page_size {
        settings = settings.with_page_size(page_size);
    }
    if let Some(ms) = cli.rate_limit_ms {
        settings = settings.with_rate_limit_delay(Duration::from_millis(ms));
    }
    if let Some(concurrency) = cli.receipt_concurrency {
        settings = settings.with_receipt_concurrency(concurrency);
    }
    if cli.no_receipts {
        settings = settings.with_fetch_receipts(false);
    }

    let mut config = ProviderConfig::new(kind).with_chain(chain).with_settings(settings);

    let etherscan_key = cli
        .etherscan_key
        .clone()
        .or_else(|| config_file.as_ref().and_then(|c| c.etherscan_api_key.clone()));
    if let Some(key) = etherscan_key {
        config = config.with_etherscan_key(key);
    }

    let etherscan_url = cli
        .etherscan_url
        .clone()
        .or_else(|| config_file.as_ref().and_then(|c| c.etherscan_api_url.clone()));
    if let Some(url) = etherscan_url {
        config = config.with_etherscan_url(url);
    }

    let alchemy_key = cli
        .alchemy_key
        .clone()
        .or_else(|| config_file.as_ref().and_then(|c| c.alchemy_api_key.clone()));
    if let Some(key) = alchemy_key {
        config = config.with_alchemy_key(key);
    }

    Ok(config)
}

async fn run_export(cli: &Cli) -> anyhow::Result<()> {
    let address = cli
        .address
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("Address is required. Usage: eth-tx-export <ADDRESS> [FROM_DATE TO_DATE]"))?;

    address
        .parse::<Address>()
        .map_err(|_| ConfigError::InvalidAddress(address.clone()))?;

    let range = date_range(cli)?;

    // Load config file for defaults
    let config_file = ConfigFile::load_default().ok().flatten();
    let config = provider_config(cli, &config_file)?;
    let provider = Provider::from_config(&config)?;

    let output = cli.output.clone().unwrap_or_else(|| {
        if cli.stream {
            PathBuf::from("output").join(format!("{}_transactions_streamed.csv", address))
        } else {
            PathBuf::from(format!("{}_transactions.csv", address))
        }
    });

    if !cli.quiet {
        eprintln!(
            "Fetching transactions for {} on {} via {}",
            address,
            provider.chain().display_name(),
            provider.kind()
        );
        if let Some(range) = &range {
            eprintln!("Date range: {} to {}", range.from().to_rfc3339(), range.to().to_rfc3339());
        }
    }

    let pb = if !cli.quiet {
        let pb = ProgressBar::new_spinner();
        pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?);
        pb.enable_steady_tick(Duration::from_millis(120));
        pb.set_message("Fetching transactions...");
        Some(pb)
    } else {
        None
    };

    let start = Instant::now();

    // The output file is only created once rows are available, so a failed
    // fetch leaves any previous export in place
    let result = if cli.stream {
        let progress = |count: usize| {
            if let Some(ref pb) = pb {
                pb.set_message(format!("{} rows written", count));
            }
        };
        let rows = provider.fetch_transactions_stream(address, range);
        if cli.dedup {
            export_stream(dedup_stream(rows), &output, progress).await
        } else {
            export_stream(rows, &output, progress).await
        }
    } else {
        let rows = provider.fetch_transactions(address, range.as_ref()).await;
        rows.and_then(|rows| {
            if let Some(ref pb) = pb {
                pb.set_message(format!("Writing {} rows...", rows.len()));
            }
            let mut exporter = CsvExporter::new(Some(&output))?;
            let written = exporter.write_rows(&rows)?;
            exporter.finalize()?;
            Ok((written, exporter.rows_skipped()))
        })
    };

    if let Some(ref pb) = pb {
        pb.finish_and_clear();
    }

    let (written, skipped) = result?;

    if !cli.quiet {
        if skipped > 0 {
            eprintln!("Skipped {} incomplete rows", skipped);
        }
        eprintln!(
            "Exported {} transactions to {} in {:.2}s",
            written,
            output.display(),
            start.elapsed().as_secs_f64()
        );
    }

    Ok(())
}

/// Write streamed rows to `output`. An error as the first item means the block
/// range could not be resolved; the file is not touched in that case.
async fn export_stream<S, F>(rows: S, output: &Path, on_progress: F) -> eth_tx_export::Result<(usize, usize)>
where
    S: Stream<Item = eth_tx_export::Result<TransactionRow>>,
    F: FnMut(usize),
{
    let mut rows = std::pin::pin!(rows);
    let first = match rows.next().await {
        Some(Err(e)) => return Err(e),
        first => first,
    };

    let mut exporter = CsvExporter::new(Some(output))?;
    let written = exporter
        .export_stream(futures::stream::iter(first).chain(rows), on_progress)
        .await?;
    Ok((written, exporter.rows_skipped()))
}

fn handle_config(action: &ConfigCommands) -> anyhow::Result<()> {
    match action {
        ConfigCommands::Path => {
            println!("{}", ConfigFile::default_path().display());
        }

        ConfigCommands::Show => {
            let path = ConfigFile::default_path();
            if path.exists() {
                let content = std::fs::read_to_string(&path)?;
                println!("# {}\n", path.display());
                println!("{}", content);
            } else {
                println!("No config file found at: {}", path.display());
                println!("\nCreate one with:");
                println!("  eth-tx-export config set-key etherscan YOUR_KEY");
            }
        }

        ConfigCommands::SetKey { provider, key } => {
            let kind: ProviderKind = provider.parse()?;
            let mut config = ConfigFile::load_default()?.unwrap_or_default();
            config.set_api_key(kind, key.clone());
            config.save_default()?;
            println!("{} API key saved to {}", kind, ConfigFile::default_path().display());
        }
    }

    Ok(())
}
