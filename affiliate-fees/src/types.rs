//! Flat record types shared by every listener.

use serde::{Deserialize, Serialize};

/// Placeholder symbol for tokens whose metadata could not be read.
pub const UNKNOWN_SYMBOL: &str = "Unknown";

/// One affiliate fee observation.
///
/// Records are write-once. Addresses and hashes are lowercase `0x` hex,
/// amounts are raw integer strings in the token's smallest unit, and any
/// field that could not be resolved is left empty (or `None`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeeRecord {
    /// Chain name (`"ethereum"`, `"thorchain"`, ...).
    pub chain: String,
    /// Protocol label (`"cowswap"`, `"0x"`, ...).
    pub protocol: String,
    /// Transaction hash (or THORChain inbound tx ID).
    pub tx_hash: String,
    /// Block number (or THORChain height).
    pub block_number: u64,
    /// Index of the swap event within the block.
    pub log_index: u64,
    /// Block timestamp in unix seconds.
    pub timestamp: Option<u64>,
    /// Trader address as reported by the swap event.
    pub sender: String,
    /// Token sold.
    pub input_token: String,
    /// Raw amount sold.
    pub input_amount: String,
    /// Token bought.
    pub output_token: String,
    /// Raw amount bought.
    pub output_amount: String,
    /// Affiliate that earned the fee.
    pub affiliate_address: String,
    /// Token in which the fee was paid.
    pub fee_token: String,
    /// Symbol of `fee_token`, or [`UNKNOWN_SYMBOL`].
    pub fee_token_symbol: String,
    /// Raw fee amount.
    pub fee_amount: String,
    /// Fee value in USD, when a price was available.
    pub fee_amount_usd: Option<f64>,
}

/// ERC-20 metadata looked up best-effort for fee tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenInfo {
    /// Ticker symbol.
    pub symbol: String,
    /// Decimal places, when the contract answered.
    pub decimals: Option<u8>,
}

impl TokenInfo {
    /// Metadata for a token that could not be resolved.
    #[must_use]
    pub fn unknown() -> Self {
        Self {
            symbol: UNKNOWN_SYMBOL.to_owned(),
            decimals: None,
        }
    }
}

impl Default for TokenInfo {
    fn default() -> Self {
        Self::unknown()
    }
}
