//! USD pricing for fee tokens via `CoinGecko`.
//!
//! Prices are spot prices at scan time, cached per token for the run.
//! Lookups are best-effort: a failed or empty response yields `None`.

use std::collections::HashMap;
use std::time::Duration;

use affiliate_fees::Network;
use alloy::primitives::utils::format_units;
use alloy::primitives::{Address, U256};
use anyhow::{Context, Result, bail};
use reqwest::header::{HeaderMap, HeaderValue};

use crate::config::PricingSettings;
use crate::http::RateLimitedClient;

const PUBLIC_API: &str = "https://api.coingecko.com/api/v3";
const PRO_API: &str = "https://pro-api.coingecko.com/api/v3";

/// `/simple/token_price` response: contract address -> currency -> price.
type TokenPrices = HashMap<String, HashMap<String, f64>>;

/// Cached `CoinGecko` token price lookups.
#[derive(Debug)]
pub struct PriceOracle {
    http: RateLimitedClient,
    base_url: String,
    cache: HashMap<(Network, Address), Option<f64>>,
}

impl PriceOracle {
    /// Build an oracle from the pricing settings.
    ///
    /// The public API works without a key; when a key is present in
    /// `api_key_env` it is sent as the demo key header.
    ///
    /// # Errors
    ///
    /// Returns an error if `pro` is set and the key variable is unset, or the
    /// HTTP client cannot be built.
    pub fn from_settings(settings: &PricingSettings) -> Result<Self> {
        let key = std::env::var(&settings.api_key_env).ok();
        let mut headers = HeaderMap::new();
        let base_url = if settings.pro {
            let Some(key) = key else {
                bail!(
                    "CoinGecko pro API requires {} to be set",
                    settings.api_key_env
                );
            };
            headers.insert(
                "x-cg-pro-api-key",
                HeaderValue::from_str(&key).context("invalid CoinGecko API key")?,
            );
            PRO_API
        } else {
            if let Some(key) = key {
                headers.insert(
                    "x-cg-demo-api-key",
                    HeaderValue::from_str(&key).context("invalid CoinGecko API key")?,
                );
            }
            PUBLIC_API
        };
        let http = RateLimitedClient::new(Duration::from_millis(settings.delay_ms), headers)?;
        Ok(Self {
            http,
            base_url: base_url.to_owned(),
            cache: HashMap::new(),
        })
    }

    /// USD price of `token` on `network`, or `None` if unavailable.
    pub async fn token_usd(&mut self, network: Network, token: Address) -> Option<f64> {
        if let Some(cached) = self.cache.get(&(network, token)) {
            return *cached;
        }
        let url = format!(
            "{}/simple/token_price/{}",
            self.base_url,
            network.coingecko_platform()
        );
        let contract = format!("{token:#x}");
        let query = [
            ("contract_addresses", contract.clone()),
            ("vs_currencies", "usd".to_owned()),
        ];
        let price = match self.http.get_json::<TokenPrices>(&url, &query).await {
            Ok(prices) => usd_price(&prices, &contract),
            Err(e) => {
                tracing::debug!(%network, token = %contract, error = %e, "price lookup failed");
                None
            }
        };
        self.cache.insert((network, token), price);
        price
    }
}

/// Extract the USD price for `contract` from a `/simple/token_price` body.
fn usd_price(prices: &TokenPrices, contract: &str) -> Option<f64> {
    prices
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(contract))
        .and_then(|(_, v)| v.get("usd").copied())
}

/// Value of `amount` raw units at `price` USD per whole token.
#[must_use]
pub fn usd_value(amount: U256, decimals: u8, price: f64) -> Option<f64> {
    let whole: f64 = format_units(amount, decimals).ok()?.parse().ok()?;
    Some(whole * price)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_token_price_body() {
        let body = r#"{"0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48":{"usd":0.9998}}"#;
        let prices: TokenPrices = serde_json::from_str(body).expect("json");
        assert_eq!(
            usd_price(&prices, "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"),
            Some(0.9998),
            "checksummed lookup"
        );
        assert_eq!(usd_price(&prices, "0xdead"), None, "absent token");
    }

    #[test]
    fn usd_value_scales_by_decimals() {
        let value = usd_value(U256::from(2_500_000_u64), 6, 1.0).expect("value");
        assert!((value - 2.5).abs() < 1e-9, "2.5 USDC at $1: {value}");
        let value = usd_value(U256::from(10_u64).pow(U256::from(17)), 18, 3_000.0).expect("value");
        assert!((value - 300.0).abs() < 1e-6, "0.1 ETH at $3000: {value}");
    }

    #[test]
    fn pro_without_key_is_fatal() {
        let settings = PricingSettings {
            enabled: true,
            pro: true,
            api_key_env: "AFFILIATE_FEES_TEST_UNSET_COINGECKO_KEY".to_owned(),
            delay_ms: 0,
        };
        assert!(PriceOracle::from_settings(&settings).is_err(), "missing key aborts");
    }
}
