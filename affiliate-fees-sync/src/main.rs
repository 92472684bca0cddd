//! Affiliate fee listener CLI.
//!
//! Scans swap protocol events across the tracked EVM chains and THORChain
//! swap actions from Midgard, and appends every swap that paid the
//! affiliate to a CSV file or a `SQLite` database.
//!
//! # Usage
//!
//! ```bash
//! # Scan the last 10 000 blocks of every chain into ./data/affiliate_fees.csv
//! affiliate-fees-sync sync
//!
//! # One chain and protocol into SQLite, with USD pricing
//! affiliate-fees-sync sync --chain arbitrum --protocol cowswap --format sqlite --price
//!
//! # Rescan an explicit range with a custom RPC endpoint
//! affiliate-fees-sync sync --chain 8453 --rpc https://my-rpc.example.com \
//!     --from-block 20000000 --to-block 20100000
//!
//! # THORChain affiliate swaps since a date
//! affiliate-fees-sync thorchain --since 2025-01-01 --format sqlite
//! ```

use std::path::{Path, PathBuf};

use affiliate_fees::{Network, Protocol};
use affiliate_fees_sync::chains;
use affiliate_fees_sync::config::Config;
use affiliate_fees_sync::fetcher::{self, ScanReport, ScanTarget, SyncOptions};
use affiliate_fees_sync::midgard::{self, MidgardClient};
use affiliate_fees_sync::pricing::PriceOracle;
use affiliate_fees_sync::store::{self, FeeStore, StoreFormat};
use anyhow::{Context, Result, bail};
use chrono::{NaiveDate, NaiveTime};
use clap::{Parser, Subcommand};

/// Affiliate fee listener for swap protocols and THORChain.
#[derive(Debug, Parser)]
#[command(name = "affiliate-fees-sync", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// Where records are written.
#[derive(Debug, clap::Args)]
struct OutputArgs {
    /// Output backend. Guessed from the `--output` extension when omitted.
    #[arg(long, value_enum)]
    format: Option<StoreFormat>,

    /// Output file. Defaults to `affiliate_fees.{csv,db}` in `--data-dir`.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Directory for default output files.
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// Configuration file; a missing file means defaults.
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
enum Command {
    /// Scan EVM chains for swaps that paid the affiliate.
    Sync {
        /// Sync only one chain, by name or EIP-155 chain ID.
        /// If omitted, every tracked chain is synced.
        #[arg(long)]
        chain: Option<Network>,

        /// Restrict to these protocols (repeatable).
        #[arg(long = "protocol")]
        protocols: Vec<Protocol>,

        /// Override the RPC endpoints for the target chain.
        /// Only valid when `--chain` is also specified.
        #[arg(long)]
        rpc: Option<String>,

        /// Blocks to look back when there is no block tracker entry.
        #[arg(long)]
        blocks: Option<u64>,

        /// Start block, overriding the block tracker.
        #[arg(long)]
        from_block: Option<u64>,

        /// End block, capped at the chain tip.
        #[arg(long)]
        to_block: Option<u64>,

        /// Look up USD values through `CoinGecko`.
        #[arg(long)]
        price: bool,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Fetch THORChain affiliate swaps from Midgard.
    Thorchain {
        /// Only swaps on or after this date (YYYY-MM-DD, UTC).
        #[arg(long)]
        since: Option<NaiveDate>,

        /// Stop after this many pages.
        #[arg(long)]
        max_pages: Option<u32>,

        /// THORName affiliates to collect (repeatable); defaults to config.
        #[arg(long = "affiliate")]
        affiliates: Vec<String>,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// List all tracked chains and protocol deployments.
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Sync {
            chain,
            protocols,
            rpc,
            blocks,
            from_block,
            to_block,
            price,
            output,
        } => {
            let args = SyncArgs {
                chain,
                protocols,
                rpc,
                blocks,
                from_block,
                to_block,
                price,
            };
            cmd_sync(args, &output).await
        }
        Command::Thorchain {
            since,
            max_pages,
            affiliates,
            output,
        } => cmd_thorchain(since, max_pages, affiliates, &output).await,
        Command::List => {
            cmd_list();
            Ok(())
        }
    }
}

/// Arguments of the `sync` subcommand.
#[derive(Debug)]
struct SyncArgs {
    chain: Option<Network>,
    protocols: Vec<Protocol>,
    rpc: Option<String>,
    blocks: Option<u64>,
    from_block: Option<u64>,
    to_block: Option<u64>,
    price: bool,
}

/// Resolve the output backend and path, and open the store.
fn open_store(args: &OutputArgs) -> Result<(StoreFormat, PathBuf, Box<dyn FeeStore>)> {
    let (format, path) = match (args.format, &args.output) {
        (Some(format), Some(path)) => (format, path.clone()),
        (None, Some(path)) => (StoreFormat::from_path(path), path.clone()),
        (format, None) => {
            let format = format.unwrap_or(StoreFormat::Csv);
            (format, format.default_path(&args.data_dir))
        }
    };
    let store =
        store::open(format, &path).with_context(|| format!("opening {}", path.display()))?;
    Ok((format, path, store))
}

fn load_config(path: &Path) -> Result<Config> {
    Config::load(path).with_context(|| format!("loading config {}", path.display()))
}

/// Execute the `sync` subcommand.
async fn cmd_sync(args: SyncArgs, output: &OutputArgs) -> Result<()> {
    // Validate args: --rpc requires --chain.
    if args.rpc.is_some() && args.chain.is_none() {
        bail!("--rpc requires --chain to be specified");
    }

    let config = load_config(&output.config)?;

    let targets: Vec<&chains::ChainConfig> = if let Some(network) = args.chain {
        let cfg = chains::by_network(network)
            .with_context(|| format!("no chain configuration for {network}"))?;
        vec![cfg]
    } else {
        chains::ALL.iter().collect()
    };

    let mut prices = if args.price || config.pricing.enabled {
        Some(PriceOracle::from_settings(&config.pricing)?)
    } else {
        None
    };
    let (format, path, mut store) = open_store(output)?;

    let opts = SyncOptions {
        chunk_size: config.scan.chunk_size,
        delay: config.scan.delay(),
        lookback: args.blocks.unwrap_or(config.scan.lookback_blocks),
        from_block: args.from_block,
        to_block: args.to_block,
    };

    tracing::info!(
        chains = targets.len(),
        format = ?format,
        output = %path.display(),
        pricing = prices.is_some(),
        "starting sync"
    );

    let mut success = 0u32;
    let mut failed = 0u32;
    let mut total = ScanReport::default();

    for chain in &targets {
        let chain_name = chain.network.name();
        let affiliate = config.affiliate_for(chain.network)?;
        let scan_targets: Vec<ScanTarget> = chain
            .protocols()
            .filter(|p| args.protocols.is_empty() || args.protocols.contains(p))
            .filter_map(|p| ScanTarget::new(chain.network, p, affiliate))
            .collect();
        if scan_targets.is_empty() {
            tracing::debug!(chain = chain_name, "no selected protocol deployed, skipping");
            continue;
        }

        let rpcs = match &args.rpc {
            Some(url) => vec![url.clone()],
            None => config.rpcs_for(chain.chain_id(), chain.default_rpc)?,
        };

        match fetcher::sync_chain(
            chain,
            &scan_targets,
            &rpcs,
            store.as_mut(),
            opts,
            prices.as_mut(),
        )
        .await
        {
            Ok(report) => {
                success += 1;
                total += report;
                tracing::info!(
                    chain = chain_name,
                    matched = report.matched,
                    inserted = report.inserted,
                    skipped = report.skipped,
                    "sync complete"
                );
            }
            Err(e) => {
                failed += 1;
                tracing::error!(chain = chain_name, error = %e, "sync failed");
            }
        }
    }

    tracing::info!(
        success,
        failed,
        matched = total.matched,
        inserted = total.inserted,
        skipped_chunks = total.skipped,
        "sync finished"
    );

    if failed > 0 {
        bail!("{failed} chain(s) failed to sync");
    }

    Ok(())
}

/// Execute the `thorchain` subcommand.
async fn cmd_thorchain(
    since: Option<NaiveDate>,
    max_pages: Option<u32>,
    affiliates: Vec<String>,
    output: &OutputArgs,
) -> Result<()> {
    let config = load_config(&output.config)?;
    let affiliates = if affiliates.is_empty() {
        config.midgard.affiliates.clone()
    } else {
        affiliates
    };
    if affiliates.is_empty() {
        bail!("no THORChain affiliates configured");
    }

    let (_, path, mut store) = open_store(output)?;
    let source = Protocol::Thorchain.label();
    let from_height = store
        .last_block(midgard::CHAIN, source)?
        .map(|h| h + 1);
    let from_timestamp = since.map(|d| d.and_time(NaiveTime::MIN).and_utc().timestamp());

    tracing::info!(
        affiliates = %affiliates.join(","),
        from_height,
        from_timestamp,
        output = %path.display(),
        "fetching THORChain swaps"
    );

    let mut client = MidgardClient::new(&config.midgard)?;
    let (records, report) = midgard::affiliate_swaps(
        &mut client,
        &affiliates,
        from_height,
        from_timestamp,
        max_pages.unwrap_or(config.midgard.max_pages),
    )
    .await;

    let inserted = match store.append(&records) {
        Ok(n) => n,
        Err(e) => {
            tracing::warn!(records = records.len(), error = %e, "store write failed");
            0
        }
    };
    if let Some(height) = report.next_tracker(from_height)
        && let Err(e) = store.set_last_block(midgard::CHAIN, source, height)
    {
        tracing::warn!(block = height, error = %e, "block tracker update failed");
    }

    tracing::info!(
        pages = report.pages,
        actions = report.actions,
        matched = report.matched,
        inserted,
        max_height = report.max_height,
        oldest_height = report.oldest_height,
        truncated = report.truncated,
        "thorchain sync finished"
    );
    Ok(())
}

/// Execute the `list` subcommand.
#[allow(clippy::print_stdout, reason = "list output goes to stdout")]
fn cmd_list() {
    println!(
        "{:<10} {:<12} {:<44} {:<10} Protocols",
        "Chain ID", "Name", "Affiliate", "Max chunk"
    );
    println!("{}", "-".repeat(110));

    for chain in chains::ALL {
        let protocols: Vec<&str> = chain.protocols().map(Protocol::label).collect();
        println!(
            "{:<10} {:<12} {:<44} {:<10} {}",
            chain.chain_id(),
            chain.network.name(),
            format!("{:#x}", chain.network.affiliate()),
            chain.max_chunk,
            protocols.join(", "),
        );
    }
    println!(
        "{:<10} {:<12} {:<44} {:<10} {}",
        "-",
        midgard::CHAIN,
        "(midgard affiliates)",
        "-",
        Protocol::Thorchain.label(),
    );
}
