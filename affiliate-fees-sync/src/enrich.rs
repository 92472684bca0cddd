//! Best-effort enrichment of matched records: block timestamps, fee token
//! metadata and USD value. Every lookup is cached for the run and every
//! failure leaves the field empty.

use std::collections::HashMap;

use affiliate_fees::{FeeRecord, Network, TokenInfo};
use alloy::primitives::{Address, U256};

use crate::pricing::{PriceOracle, usd_value};
use crate::source::ChainSource;

/// Per-chain lookup caches plus the optional price oracle.
#[derive(Debug, Default)]
pub struct Enricher<'a> {
    timestamps: HashMap<u64, Option<u64>>,
    tokens: HashMap<Address, TokenInfo>,
    prices: Option<&'a mut PriceOracle>,
}

impl<'a> Enricher<'a> {
    /// Create an enricher; pass `None` to skip USD pricing.
    #[must_use]
    pub fn new(prices: Option<&'a mut PriceOracle>) -> Self {
        Self {
            timestamps: HashMap::new(),
            tokens: HashMap::new(),
            prices,
        }
    }

    /// Fill `timestamp`, `fee_token_symbol` and `fee_amount_usd` in place.
    pub async fn enrich<S: ChainSource>(
        &mut self,
        source: &S,
        network: Network,
        records: &mut [FeeRecord],
    ) {
        for record in records {
            if record.timestamp.is_none() {
                record.timestamp = self.timestamp(source, record.block_number).await;
            }

            let Ok(token) = record.fee_token.parse::<Address>() else {
                continue;
            };
            let info = self.token(source, token).await;
            record.fee_token_symbol.clone_from(&info.symbol);

            let (Some(decimals), Ok(amount)) = (info.decimals, record.fee_amount.parse::<U256>())
            else {
                continue;
            };
            if let Some(oracle) = self.prices.as_deref_mut()
                && let Some(price) = oracle.token_usd(network, token).await
            {
                record.fee_amount_usd = usd_value(amount, decimals, price);
            }
        }
    }

    async fn timestamp<S: ChainSource>(&mut self, source: &S, block: u64) -> Option<u64> {
        if let Some(ts) = self.timestamps.get(&block) {
            return *ts;
        }
        let ts = match source.block_timestamp(block).await {
            Ok(ts) => ts,
            Err(e) => {
                tracing::debug!(block, error = %e, "block timestamp lookup failed");
                None
            }
        };
        self.timestamps.insert(block, ts);
        ts
    }

    async fn token<S: ChainSource>(&mut self, source: &S, token: Address) -> TokenInfo {
        if let Some(info) = self.tokens.get(&token) {
            return info.clone();
        }
        let info = source.token_info(token).await.unwrap_or_else(|e| {
            tracing::debug!(token = %token, error = %e, "token metadata lookup failed");
            TokenInfo::unknown()
        });
        self.tokens.insert(token, info.clone());
        info
    }
}
