//! Runtime configuration loaded from `config.toml`.
//!
//! Provides per-chain RPC endpoint lists (tried in order), per-chain
//! affiliate overrides, and the scan, Midgard and pricing knobs. RPC URLs
//! may reference environment variables as `${NAME}`, which is how provider
//! API keys are supplied.
//!
//! When no config file is present the built-in defaults are used.
//!
//! ```toml
//! [scan]
//! chunk_size = 1000
//! delay_ms = 250
//!
//! [chains.42161]
//! rpcs = ["https://arb-mainnet.g.alchemy.com/v2/${ALCHEMY_API_KEY}"]
//!
//! [midgard]
//! affiliates = ["ss"]
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use affiliate_fees::Network;
use alloy::primitives::Address;
use anyhow::{Context, Result, bail};
use serde::Deserialize;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Per-chain overrides, keyed by chain ID.
    #[serde(default)]
    pub chains: HashMap<u64, ChainOverrides>,
    /// Log scan settings.
    #[serde(default)]
    pub scan: ScanSettings,
    /// THORChain Midgard settings.
    #[serde(default)]
    pub midgard: MidgardSettings,
    /// `CoinGecko` pricing settings.
    #[serde(default)]
    pub pricing: PricingSettings,
}

/// Overrides for a single chain.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChainOverrides {
    /// Ordered list of RPC URLs (best first).
    #[serde(default)]
    pub rpcs: Vec<String>,
    /// Affiliate address replacing the built-in one.
    pub affiliate: Option<String>,
}

/// Chunked `eth_getLogs` scan settings.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct ScanSettings {
    /// Blocks per `eth_getLogs` call, capped per chain.
    pub chunk_size: u64,
    /// Flat delay between RPC calls, in milliseconds.
    pub delay_ms: u64,
    /// Blocks to look back on a chain with no block tracker row.
    pub lookback_blocks: u64,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            chunk_size: 1_000,
            delay_ms: 250,
            lookback_blocks: 10_000,
        }
    }
}

impl ScanSettings {
    /// Delay between RPC calls.
    #[must_use]
    pub const fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// Midgard (THORChain) fetch settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MidgardSettings {
    /// Base URL, without the `/v2` suffix.
    pub url: String,
    /// THORName affiliates whose swaps are collected.
    pub affiliates: Vec<String>,
    /// Actions per page.
    pub page_limit: u32,
    /// Delay between pages, in milliseconds.
    pub delay_ms: u64,
    /// Stop after this many pages in one run.
    pub max_pages: u32,
}

impl Default for MidgardSettings {
    fn default() -> Self {
        Self {
            url: "https://midgard.ninerealms.com".to_owned(),
            affiliates: vec!["ss".to_owned()],
            page_limit: 50,
            delay_ms: 1_000,
            max_pages: 200,
        }
    }
}

/// `CoinGecko` pricing settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PricingSettings {
    /// Look up USD prices for fee tokens.
    pub enabled: bool,
    /// Use the pro API, which requires a key.
    pub pro: bool,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Minimum interval between price requests, in milliseconds.
    pub delay_ms: u64,
}

impl Default for PricingSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            pro: false,
            api_key_env: "COINGECKO_API_KEY".to_owned(),
            delay_ms: 1_500,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// Returns [`Config::default`] if the file does not exist,
    /// allowing the binary to work without any config.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text =
            std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing {}", path.display()))
    }

    /// Parse configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid TOML for [`Config`].
    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Return the RPC URL list for a chain with `${VAR}` references expanded,
    /// falling back to the built-in default if the config has no entry.
    ///
    /// # Errors
    ///
    /// Returns an error if a URL references an unset environment variable.
    pub fn rpcs_for(&self, chain_id: u64, default_rpc: &str) -> Result<Vec<String>> {
        match self.chains.get(&chain_id) {
            Some(c) if !c.rpcs.is_empty() => c.rpcs.iter().map(|u| expand_env(u)).collect(),
            _ => Ok(vec![default_rpc.to_owned()]),
        }
    }

    /// Affiliate address for `network`, honoring overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the override is not a valid address.
    pub fn affiliate_for(&self, network: Network) -> Result<Address> {
        let Some(raw) = self
            .chains
            .get(&network.chain_id())
            .and_then(|c| c.affiliate.as_deref())
        else {
            return Ok(network.affiliate());
        };
        raw.trim()
            .parse()
            .map_err(|_| affiliate_fees::Error::InvalidAddress(raw.to_owned()))
            .with_context(|| format!("affiliate override for {network}"))
    }
}

/// Expand `${NAME}` references from the process environment.
///
/// # Errors
///
/// Returns an error naming the first unset variable.
pub fn expand_env(s: &str) -> Result<String> {
    expand_with(s, |name| std::env::var(name).ok())
}

/// Expand `${NAME}` references using `lookup`.
///
/// # Errors
///
/// Returns an error on an unset variable or an unterminated `${`.
pub fn expand_with(s: &str, lookup: impl Fn(&str) -> Option<String>) -> Result<String> {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find("${") {
        let (head, tail) = rest.split_at(start);
        out.push_str(head);
        let tail = tail.strip_prefix("${").unwrap_or(tail);
        let Some(end) = tail.find('}') else {
            bail!("unterminated `${{` in {s:?}");
        };
        let (name, after) = tail.split_at(end);
        match lookup(name) {
            Some(value) => out.push_str(&value),
            None => bail!("environment variable {name} is not set (referenced by {s:?})"),
        }
        rest = after.strip_prefix('}').unwrap_or(after);
    }
    out.push_str(rest);
    Ok(out)
}
