//! Chunked log scanning and chain sync orchestration.
//!
//! For each chain the fetcher:
//! 1. Resolves the block range from the block tracker (or a lookback from
//!    the chain tip on the first run).
//! 2. Queries `eth_getLogs` in fixed-size chunks for the protocol's swap
//!    event and for ERC-20 transfers into the affiliate address.
//! 3. Joins the two by transaction hash, enriches the matches, and appends
//!    them to the store.
//! 4. Advances the block tracker to the end of the range.
//!
//! A chunk that fails is logged and skipped; there is no retry. Only a scan
//! in which every chunk failed is an error, which makes [`sync_chain`] fall
//! back to the next RPC endpoint.

use std::collections::HashMap;
use std::ops::AddAssign;
use std::time::Duration;

use affiliate_fees::decode::{
    Transfer, TRANSFER_TOPIC, address_to_topic, decode_swap, decode_transfer, format_address,
    is_affiliate, partner_matches,
};
use affiliate_fees::{FeeRecord, Network, Protocol, UNKNOWN_SYMBOL};
use alloy::primitives::{Address, B256, U256};
use alloy::providers::ProviderBuilder;
use alloy::rpc::types::Log;
use anyhow::{Context, Result, bail};

use crate::chains::ChainConfig;
use crate::enrich::Enricher;
use crate::pricing::PriceOracle;
use crate::source::{ChainSource, LogQuery, RpcSource};
use crate::store::FeeStore;

/// Progress is logged every N chunks.
const PROGRESS_INTERVAL: u64 = 50;

/// Knobs for one sync run.
#[derive(Debug, Clone, Copy)]
pub struct SyncOptions {
    /// Blocks per `eth_getLogs` call.
    pub chunk_size: u64,
    /// Flat sleep between RPC calls.
    pub delay: Duration,
    /// Blocks to look back when the tracker has no row.
    pub lookback: u64,
    /// Explicit start block, overriding the tracker.
    pub from_block: Option<u64>,
    /// Explicit end block, capped at the chain tip.
    pub to_block: Option<u64>,
}

/// One protocol deployment to scan for one affiliate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanTarget {
    /// Chain.
    pub network: Network,
    /// Protocol.
    pub protocol: Protocol,
    /// Contract emitting the swap events.
    pub contract: Address,
    /// Address receiving the fees.
    pub affiliate: Address,
}

impl ScanTarget {
    /// Target for `protocol` on `network`, or `None` if not deployed there.
    #[must_use]
    pub const fn new(network: Network, protocol: Protocol, affiliate: Address) -> Option<Self> {
        match protocol.contract(network) {
            Some(contract) => Some(Self {
                network,
                protocol,
                contract,
                affiliate,
            }),
            None => None,
        }
    }

    /// Swap events emitted by the protocol contract.
    #[must_use]
    pub const fn protocol_query(&self, from: u64, to: u64) -> LogQuery {
        LogQuery {
            address: Some(self.contract),
            topic0: self.protocol.event_topic(),
            topic2: None,
            from,
            to,
        }
    }

    /// ERC-20 transfers of any token into the affiliate.
    #[must_use]
    pub fn fee_query(&self, from: u64, to: u64) -> LogQuery {
        LogQuery {
            address: None,
            topic0: Some(TRANSFER_TOPIC),
            topic2: Some(address_to_topic(self.affiliate)),
            from,
            to,
        }
    }
}

/// Counters for a scan, summed across chunks and protocols.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanReport {
    /// Chunks attempted.
    pub chunks: u64,
    /// Chunks whose RPC calls failed and were dropped.
    pub skipped: u64,
    /// Swap events returned by the node.
    pub protocol_logs: usize,
    /// Records matched to the affiliate.
    pub matched: usize,
    /// Rows newly written to the store.
    pub inserted: usize,
}

impl AddAssign for ScanReport {
    fn add_assign(&mut self, rhs: Self) {
        self.chunks += rhs.chunks;
        self.skipped += rhs.skipped;
        self.protocol_logs += rhs.protocol_logs;
        self.matched += rhs.matched;
        self.inserted += rhs.inserted;
    }
}

/// Split the inclusive range `[from, to]` into consecutive chunks of at most
/// `size` blocks.
pub fn chunks(from: u64, to: u64, size: u64) -> impl Iterator<Item = (u64, u64)> {
    let size = size.max(1);
    let mut next = (from <= to).then_some(from);
    std::iter::from_fn(move || {
        let start = next?;
        let end = start.saturating_add(size - 1).min(to);
        next = end.checked_add(1).filter(|n| *n <= to);
        Some((start, end))
    })
}

/// Format progress as a percentage string.
fn pct(current: u64, from: u64, to: u64) -> String {
    if to <= from {
        return "100%".into();
    }
    let ratio = current.saturating_sub(from) as f64 / (to - from) as f64 * 100.0;
    format!("{ratio:.0}%")
}

fn amount_string(token: Option<Address>, amount: U256) -> String {
    token.map(|_| amount.to_string()).unwrap_or_default()
}

/// Join swap events with affiliate fee transfers by transaction hash.
///
/// One record is produced per transaction. A transaction matches when it
/// carries an ERC-20 transfer into the affiliate or, for protocols that
/// index a partner, when the partner topic names the affiliate. Transfers
/// of the fee token within the transaction are summed. Removed logs and
/// logs without a transaction hash are ignored.
#[must_use]
pub fn match_fees(target: &ScanTarget, protocol_logs: &[Log], fee_logs: &[Log]) -> Vec<FeeRecord> {
    let affiliate = format_address(target.affiliate);

    let mut fees: HashMap<B256, Vec<Transfer>> = HashMap::new();
    for log in fee_logs.iter().filter(|l| !l.removed) {
        let (Some(tx), Some(transfer)) = (log.transaction_hash, decode_transfer(log)) else {
            continue;
        };
        if is_affiliate(&format_address(transfer.to), &affiliate) {
            fees.entry(tx).or_default().push(transfer);
        }
    }

    // Group swap events per transaction, keeping first-seen order.
    let mut order: Vec<B256> = Vec::new();
    let mut groups: HashMap<B256, Vec<&Log>> = HashMap::new();
    for log in protocol_logs.iter().filter(|l| !l.removed) {
        let Some(tx) = log.transaction_hash else {
            continue;
        };
        if let Some(expected) = target.protocol.event_topic()
            && log.topics().first() != Some(&expected)
        {
            continue;
        }
        groups
            .entry(tx)
            .or_insert_with(|| {
                order.push(tx);
                Vec::new()
            })
            .push(log);
    }

    let mut records = Vec::new();
    for tx in order {
        let Some(logs) = groups.get(&tx) else {
            continue;
        };
        let transfers = fees.get(&tx).map_or(&[][..], Vec::as_slice);
        let partner = logs
            .iter()
            .find(|l| partner_matches(target.protocol, l, &affiliate));
        if transfers.is_empty() && partner.is_none() {
            continue;
        }

        let fee_token = transfers.first().map(|t| t.token);
        let chosen = fee_token
            .and_then(|token| {
                logs.iter().find(|l| {
                    let swap = decode_swap(target.protocol, l);
                    swap.input_token == Some(token) || swap.output_token == Some(token)
                })
            })
            .or(partner)
            .or_else(|| logs.first());
        let Some(log) = chosen.copied() else {
            continue;
        };

        let swap = decode_swap(target.protocol, log);
        let fee_amount = transfers
            .iter()
            .filter(|t| Some(t.token) == fee_token)
            .fold(U256::ZERO, |acc, t| acc.saturating_add(t.value));

        records.push(FeeRecord {
            chain: target.network.name().to_owned(),
            protocol: target.protocol.label().to_owned(),
            tx_hash: format!("{tx:#x}"),
            block_number: log.block_number.unwrap_or_default(),
            log_index: log.log_index.unwrap_or_default(),
            timestamp: log.block_timestamp,
            sender: swap.sender.map(format_address).unwrap_or_default(),
            input_token: swap.input_token.map(format_address).unwrap_or_default(),
            input_amount: amount_string(swap.input_token, swap.input_amount),
            output_token: swap.output_token.map(format_address).unwrap_or_default(),
            output_amount: amount_string(swap.output_token, swap.output_amount),
            affiliate_address: affiliate.clone(),
            fee_token: fee_token.map(format_address).unwrap_or_default(),
            fee_token_symbol: if fee_token.is_some() {
                UNKNOWN_SYMBOL.to_owned()
            } else {
                String::new()
            },
            fee_amount: fee_amount.to_string(),
            fee_amount_usd: None,
        });
    }
    records
}

/// Runs scans against one chain source and writes into one store.
#[derive(Debug)]
pub struct Scanner<'a, S> {
    source: &'a S,
    store: &'a mut dyn FeeStore,
    opts: SyncOptions,
    enricher: Enricher<'a>,
}

impl<'a, S: ChainSource> Scanner<'a, S> {
    /// Create a scanner.
    #[must_use]
    pub fn new(
        source: &'a S,
        store: &'a mut dyn FeeStore,
        opts: SyncOptions,
        enricher: Enricher<'a>,
    ) -> Self {
        Self {
            source,
            store,
            opts,
            enricher,
        }
    }

    /// Scan every target from its resume point to the chain tip.
    ///
    /// # Errors
    ///
    /// Returns an error if the chain tip cannot be read, the tracker cannot
    /// be read, or a target's scan failed in every chunk.
    pub async fn sync(&mut self, targets: &[ScanTarget]) -> Result<ScanReport> {
        let latest = self.source.latest_block().await?;
        let mut total = ScanReport::default();

        for target in targets {
            let chain = target.network.name();
            let source = target.protocol.label();
            let from = match self.opts.from_block {
                Some(b) => b,
                None => self
                    .store
                    .last_block(chain, source)?
                    .map_or_else(|| latest.saturating_sub(self.opts.lookback), |b| b + 1),
            };
            let to = self.opts.to_block.map_or(latest, |b| b.min(latest));
            if from > to {
                tracing::info!(chain, protocol = source, latest, "already up to date");
                continue;
            }
            total += self.scan(target, from, to).await?;
        }
        Ok(total)
    }

    /// Scan `[from, to]` for one target and advance its block tracker.
    ///
    /// # Errors
    ///
    /// Returns an error if every chunk of the range failed.
    pub async fn scan(&mut self, target: &ScanTarget, from: u64, to: u64) -> Result<ScanReport> {
        let chain = target.network.name();
        let protocol = target.protocol.label();
        let mut report = ScanReport::default();

        tracing::info!(
            chain,
            protocol,
            contract = %target.contract,
            affiliate = %target.affiliate,
            from,
            to,
            "scanning"
        );

        for (start, end) in chunks(from, to, self.opts.chunk_size) {
            report.chunks += 1;
            if report.chunks.is_multiple_of(PROGRESS_INTERVAL) {
                tracing::info!(chain, protocol, chunk = report.chunks, block = start, progress = %pct(start, from, to), "fetching");
            }

            let mut records = match self.fetch_chunk(target, start, end).await {
                Ok((logs, records)) => {
                    report.protocol_logs += logs;
                    records
                }
                Err(e) => {
                    report.skipped += 1;
                    tracing::warn!(chain, protocol, from = start, to = end, error = %e, "chunk failed, skipping");
                    tokio::time::sleep(self.opts.delay).await;
                    continue;
                }
            };

            if !records.is_empty() {
                report.matched += records.len();
                self.enricher
                    .enrich(self.source, target.network, &mut records)
                    .await;
                match self.store.append(&records) {
                    Ok(n) => report.inserted += n,
                    Err(e) => {
                        tracing::warn!(chain, protocol, records = records.len(), error = %e, "store write failed");
                    }
                }
            }
            tokio::time::sleep(self.opts.delay).await;
        }

        if report.chunks > 0 && report.skipped == report.chunks {
            bail!("{chain}/{protocol}: all {} chunks failed", report.chunks);
        }
        if report.skipped > 0 {
            tracing::warn!(chain, protocol, skipped = report.skipped, "some chunks were dropped");
        }

        self.advance_tracker(chain, protocol, to);
        tracing::info!(
            chain,
            protocol,
            swaps = report.protocol_logs,
            matched = report.matched,
            inserted = report.inserted,
            skipped = report.skipped,
            "scan complete"
        );
        Ok(report)
    }

    /// Move the tracker to `block` unless it already points further ahead,
    /// so an explicit backfill never rewinds it.
    fn advance_tracker(&mut self, chain: &str, protocol: &str, block: u64) {
        let previous = self.store.last_block(chain, protocol).unwrap_or_else(|e| {
            tracing::warn!(chain, protocol, error = %e, "block tracker read failed");
            None
        });
        if let Some(previous) = previous
            && previous >= block
        {
            tracing::debug!(chain, protocol, tracker = previous, block, "tracker already ahead");
            return;
        }
        if let Err(e) = self.store.set_last_block(chain, protocol, block) {
            tracing::warn!(chain, protocol, block, error = %e, "block tracker update failed");
        }
    }

    /// Fetch and match one chunk. Returns the swap log count and matches.
    async fn fetch_chunk(
        &self,
        target: &ScanTarget,
        from: u64,
        to: u64,
    ) -> Result<(usize, Vec<FeeRecord>)> {
        let swaps = self.source.logs(target.protocol_query(from, to)).await?;
        if swaps.is_empty() {
            return Ok((0, Vec::new()));
        }
        tokio::time::sleep(self.opts.delay).await;
        let fees = self.source.logs(target.fee_query(from, to)).await?;
        Ok((swaps.len(), match_fees(target, &swaps, &fees)))
    }
}

/// Synchronize a single chain with automatic RPC fallback.
///
/// Tries each RPC in `rpcs` in order. On failure the next endpoint is
/// attempted; targets already completed have advanced their block tracker,
/// so they resume where they stopped.
///
/// # Errors
///
/// Returns an error only if *all* RPCs fail, or `rpcs` is empty.
pub async fn sync_chain(
    chain: &ChainConfig,
    targets: &[ScanTarget],
    rpcs: &[String],
    store: &mut dyn FeeStore,
    opts: SyncOptions,
    mut prices: Option<&mut PriceOracle>,
) -> Result<ScanReport> {
    let chain_name = chain.network.name();
    let opts = SyncOptions {
        chunk_size: chain.chunk_size(opts.chunk_size),
        ..opts
    };
    let mut last_err = None;

    for (i, rpc_url) in rpcs.iter().enumerate() {
        tracing::info!(chain = chain_name, rpc = %redact(rpc_url), "connecting");
        let result = match rpc_url.parse() {
            Ok(url) => {
                let source = RpcSource::new(ProviderBuilder::new().connect_http(url));
                let enricher = Enricher::new(prices.as_deref_mut());
                Scanner::new(&source, &mut *store, opts, enricher)
                    .sync(targets)
                    .await
            }
            Err(e) => Err(e).with_context(|| format!("invalid RPC URL: {}", redact(rpc_url))),
        };

        match result {
            Ok(report) => return Ok(report),
            Err(e) => {
                if let Some(next) = rpcs.get(i + 1) {
                    tracing::warn!(
                        chain = chain_name,
                        rpc = %redact(rpc_url),
                        next = %redact(next),
                        error = %e,
                        "RPC failed, falling back"
                    );
                } else {
                    tracing::error!(chain = chain_name, rpc = %redact(rpc_url), error = %e, "last RPC failed");
                }
                last_err = Some(e);
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("{chain_name}: no RPC endpoints configured")))
}

/// Hide the path of an RPC URL, where providers put API keys.
fn redact(url: &str) -> String {
    match url.split_once("://") {
        Some((scheme, rest)) => {
            let host = rest.split('/').next().unwrap_or(rest);
            if rest.len() > host.len() + 1 {
                format!("{scheme}://{host}/…")
            } else {
                url.to_owned()
            }
        }
        None => url.to_owned(),
    }
}
