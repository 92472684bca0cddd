//! THORChain affiliate swaps from the Midgard `/v2/actions` API.
//!
//! Midgard already indexes the affiliate THORName of every swap, so no log
//! decoding is involved: pages of swap actions are fetched newest first,
//! filtered on `metadata.swap.affiliateAddress`, and flattened into
//! [`FeeRecord`]s. The affiliate fee is expressed in basis points of the
//! inbound amount, so the fee is computed in the input asset's 1e8 units.

use std::future::Future;
use std::time::Duration;

use affiliate_fees::decode::is_affiliate;
use affiliate_fees::{FeeRecord, Protocol};
use anyhow::Result;
use reqwest::header::HeaderMap;
use serde::Deserialize;

use crate::config::MidgardSettings;
use crate::http::RateLimitedClient;

/// Chain label for THORChain records and tracker rows.
pub const CHAIN: &str = "thorchain";

/// THORChain amounts are fixed at 8 decimals.
const THOR_DECIMALS: i32 = 8;

/// `/v2/actions` response body.
#[derive(Debug, Deserialize)]
pub struct ActionsPage {
    /// Actions on this page, newest first.
    #[serde(default)]
    pub actions: Vec<Action>,
    /// Pagination cursors.
    #[serde(default)]
    pub meta: PageMeta,
}

/// Pagination metadata.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    /// Token for the next (older) page.
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// One Midgard action.
#[derive(Debug, Deserialize)]
pub struct Action {
    /// Nanosecond unix timestamp, as a string.
    pub date: String,
    /// THORChain block height, as a string.
    pub height: String,
    /// Inbound transactions.
    #[serde(rename = "in", default)]
    pub inputs: Vec<ActionTx>,
    /// Outbound transactions.
    #[serde(rename = "out", default)]
    pub outputs: Vec<ActionTx>,
    /// Type-specific metadata.
    #[serde(default)]
    pub metadata: ActionMetadata,
    /// `success` or `pending`.
    #[serde(default)]
    pub status: String,
    /// Action type (`swap`, ...).
    #[serde(rename = "type", default)]
    pub kind: String,
}

/// One side of an action.
#[derive(Debug, Deserialize)]
pub struct ActionTx {
    /// Sender or recipient address.
    #[serde(default)]
    pub address: String,
    /// Coins moved.
    #[serde(default)]
    pub coins: Vec<Coin>,
    /// Transaction ID.
    #[serde(rename = "txID", default)]
    pub tx_id: String,
}

/// An asset amount in 1e8 units.
#[derive(Debug, Deserialize)]
pub struct Coin {
    /// Amount as a decimal string.
    pub amount: String,
    /// Asset identifier, e.g. `ETH.ETH` or `BTC.BTC`.
    pub asset: String,
}

/// Action metadata; only swaps are of interest.
#[derive(Debug, Default, Deserialize)]
pub struct ActionMetadata {
    /// Swap metadata.
    pub swap: Option<SwapMetadata>,
}

/// Swap-specific metadata.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapMetadata {
    /// Affiliate THORName(s), `/`-separated for multi-affiliate swaps.
    #[serde(default)]
    pub affiliate_address: String,
    /// Affiliate fee in basis points, as a string.
    #[serde(default)]
    pub affiliate_fee: String,
    /// USD price of the inbound asset at swap time.
    #[serde(default, rename = "inPriceUSD")]
    pub in_price_usd: Option<String>,
}

/// Outcome of one Midgard run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MidgardReport {
    /// Pages fetched.
    pub pages: u32,
    /// Swap actions examined.
    pub actions: usize,
    /// Records produced for the configured affiliates.
    pub matched: usize,
    /// Highest THORChain height seen.
    pub max_height: Option<u64>,
    /// Lowest THORChain height seen.
    pub oldest_height: Option<u64>,
    /// The walk stopped on `max_pages` or a failed page while older pages
    /// were still pending.
    pub truncated: bool,
}

impl MidgardReport {
    /// Height to store in the block tracker after this walk, if any.
    ///
    /// Pages run newest first, so a truncated resume walk has a gap between
    /// `from_height` and `oldest_height`; the tracker then stays put and the
    /// next run repeats the range.
    #[must_use]
    pub const fn next_tracker(&self, from_height: Option<u64>) -> Option<u64> {
        if self.truncated && from_height.is_some() {
            None
        } else {
            self.max_height
        }
    }
}

/// Source of `/v2/actions` pages.
pub trait ActionPages {
    /// Fetch one page of swap actions for `affiliates`.
    fn actions_page(
        &mut self,
        affiliates: &[String],
        from_height: Option<u64>,
        from_timestamp: Option<i64>,
        page_token: Option<&str>,
    ) -> impl Future<Output = Result<ActionsPage>> + Send;
}

/// Midgard API client.
#[derive(Debug)]
pub struct MidgardClient {
    http: RateLimitedClient,
    base_url: String,
    page_limit: u32,
}

impl MidgardClient {
    /// Build a client from settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(settings: &MidgardSettings) -> Result<Self> {
        Ok(Self {
            http: RateLimitedClient::new(
                Duration::from_millis(settings.delay_ms),
                HeaderMap::new(),
            )?,
            base_url: settings.url.trim_end_matches('/').to_owned(),
            page_limit: settings.page_limit,
        })
    }
}

impl ActionPages for MidgardClient {
    fn actions_page(
        &mut self,
        affiliates: &[String],
        from_height: Option<u64>,
        from_timestamp: Option<i64>,
        page_token: Option<&str>,
    ) -> impl Future<Output = Result<ActionsPage>> + Send {
        let url = format!("{}/v2/actions", self.base_url);
        let mut query = vec![
            ("type", "swap".to_owned()),
            ("affiliate", affiliates.join(",")),
            ("limit", self.page_limit.to_string()),
        ];
        if let Some(h) = from_height {
            query.push(("fromHeight", h.to_string()));
        }
        if let Some(ts) = from_timestamp {
            query.push(("fromTimestamp", ts.to_string()));
        }
        if let Some(token) = page_token {
            query.push(("nextPageToken", token.to_owned()));
        }
        async move { self.http.get_json(&url, &query).await }
    }
}

/// Walk pages until an empty page, a missing `nextPageToken`, or
/// `max_pages`, collecting affiliate swaps.
///
/// A page that fails to load ends the walk early; records gathered so far
/// are still returned. Stopping on a failure or on `max_pages` with a
/// token still pending marks the report as truncated.
pub async fn affiliate_swaps<P: ActionPages>(
    pages: &mut P,
    affiliates: &[String],
    from_height: Option<u64>,
    from_timestamp: Option<i64>,
    max_pages: u32,
) -> (Vec<FeeRecord>, MidgardReport) {
    let mut records = Vec::new();
    let mut report = MidgardReport::default();
    let mut token: Option<String> = None;

    loop {
        if report.pages >= max_pages {
            report.truncated = true;
            break;
        }
        let page = match pages
            .actions_page(affiliates, from_height, from_timestamp, token.as_deref())
            .await
        {
            Ok(page) => page,
            Err(e) => {
                report.truncated = true;
                tracing::warn!(page = report.pages, error = %e, "midgard page failed, stopping");
                break;
            }
        };
        report.pages += 1;
        if page.actions.is_empty() {
            break;
        }
        report.actions += page.actions.len();

        for action in &page.actions {
            if let Ok(height) = action.height.parse::<u64>() {
                report.max_height = report.max_height.max(Some(height));
                report.oldest_height =
                    Some(report.oldest_height.map_or(height, |h| h.min(height)));
            }
            if let Some(record) = action_to_record(action, affiliates) {
                records.push(record);
            }
        }
        tracing::info!(
            page = report.pages,
            actions = report.actions,
            matched = records.len(),
            "midgard page"
        );

        match page.meta.next_page_token {
            Some(next) if !next.is_empty() => token = Some(next),
            _ => break,
        }
    }

    report.matched = records.len();
    if report.truncated {
        tracing::warn!(
            pages = report.pages,
            from_height,
            oldest_height = report.oldest_height,
            "midgard walk stopped before the oldest page"
        );
    }
    (records, report)
}

/// Flatten a swap action into a record if it pays one of `affiliates`.
///
/// Unparsable numbers fall back to zero rather than dropping the row.
#[must_use]
pub fn action_to_record(action: &Action, affiliates: &[String]) -> Option<FeeRecord> {
    let swap = action.metadata.swap.as_ref()?;
    let affiliate = swap
        .affiliate_address
        .split('/')
        .find(|name| affiliates.iter().any(|a| is_affiliate(name, a)))?;

    let input = action.inputs.first();
    let in_coin = input.and_then(|tx| tx.coins.first());
    let out_coin = action.outputs.iter().find_map(|tx| tx.coins.first());

    let in_amount = in_coin.and_then(|c| c.amount.parse::<u128>().ok()).unwrap_or(0);
    let bps = swap.affiliate_fee.parse::<u128>().unwrap_or(0);
    let fee_amount = in_amount.saturating_mul(bps) / 10_000;
    let fee_amount_usd = swap
        .in_price_usd
        .as_deref()
        .and_then(|p| p.parse::<f64>().ok())
        .map(|price| fee_amount as f64 / 10f64.powi(THOR_DECIMALS) * price);

    Some(FeeRecord {
        chain: CHAIN.to_owned(),
        protocol: Protocol::Thorchain.label().to_owned(),
        tx_hash: input.map(|tx| tx.tx_id.clone()).unwrap_or_default(),
        block_number: action.height.parse().unwrap_or(0),
        log_index: 0,
        timestamp: action
            .date
            .parse::<u128>()
            .ok()
            .and_then(|ns| u64::try_from(ns / 1_000_000_000).ok()),
        sender: input.map(|tx| tx.address.clone()).unwrap_or_default(),
        input_token: in_coin.map(|c| c.asset.clone()).unwrap_or_default(),
        input_amount: in_amount.to_string(),
        output_token: out_coin.map(|c| c.asset.clone()).unwrap_or_default(),
        output_amount: out_coin.map(|c| c.amount.clone()).unwrap_or_default(),
        affiliate_address: affiliate.to_owned(),
        fee_token: in_coin.map(|c| c.asset.clone()).unwrap_or_default(),
        fee_token_symbol: in_coin
            .map(|c| asset_symbol(&c.asset).to_owned())
            .unwrap_or_default(),
        fee_amount: fee_amount.to_string(),
        fee_amount_usd,
    })
}

/// Ticker of a Midgard asset: `ETH.USDC-0XA0B8...` -> `USDC`.
fn asset_symbol(asset: &str) -> &str {
    let ticker = asset.split_once(['.', '~', '/']).map_or(asset, |(_, t)| t);
    ticker.split_once('-').map_or(ticker, |(t, _)| t)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"{
      "actions": [
        {
          "date": "1717000000123456789",
          "height": "16200001",
          "in": [{"address": "bc1qsender", "coins": [{"amount": "100000000", "asset": "BTC.BTC"}], "txID": "ABC123"}],
          "out": [{"address": "0xrecipient", "coins": [{"amount": "1900000000", "asset": "ETH.ETH"}], "txID": ""}],
          "metadata": {"swap": {"affiliateAddress": "ss", "affiliateFee": "55", "inPriceUSD": "68000.5", "liquidityFee": "12345"}},
          "pools": ["BTC.BTC", "ETH.ETH"],
          "status": "success",
          "type": "swap"
        },
        {
          "date": "1716999999000000000",
          "height": "16200000",
          "in": [{"address": "0xother", "coins": [{"amount": "5000000000", "asset": "ETH.USDC-0XA0B86991C6218B36C1D19D4A2E9EB0CE3606EB48"}], "txID": "DEF456"}],
          "out": [],
          "metadata": {"swap": {"affiliateAddress": "t/ss", "affiliateFee": "10"}},
          "status": "success",
          "type": "swap"
        },
        {
          "date": "1716999998000000000",
          "height": "16199999",
          "in": [{"address": "0xthird", "coins": [{"amount": "1", "asset": "ETH.ETH"}], "txID": "FFF000"}],
          "out": [],
          "metadata": {"swap": {"affiliateAddress": "xyz", "affiliateFee": "30"}},
          "status": "success",
          "type": "swap"
        }
      ],
      "count": "3",
      "meta": {"nextPageToken": "169000000100000001", "prevPageToken": ""}
    }"#;

    fn affiliates() -> Vec<String> {
        vec!["ss".to_owned()]
    }

    #[test]
    fn parses_actions_page() {
        let page: ActionsPage = serde_json::from_str(PAGE).expect("fixture parses");
        assert_eq!(page.actions.len(), 3, "actions");
        assert_eq!(
            page.meta.next_page_token.as_deref(),
            Some("169000000100000001"),
            "next page token"
        );
        let records: Vec<_> = page
            .actions
            .iter()
            .filter_map(|a| action_to_record(a, &affiliates()))
            .collect();
        assert_eq!(records.len(), 2, "other affiliate dropped");
    }

    #[test]
    fn computes_fee_from_basis_points() {
        let page: ActionsPage = serde_json::from_str(PAGE).expect("fixture parses");
        let first = page.actions.first().expect("first action");
        let record = action_to_record(first, &affiliates()).expect("ss swap");
        assert_eq!(record.chain, "thorchain", "chain");
        assert_eq!(record.tx_hash, "ABC123", "inbound tx id");
        assert_eq!(record.block_number, 16_200_001, "height");
        assert_eq!(record.timestamp, Some(1_717_000_000), "ns to seconds");
        assert_eq!(record.input_token, "BTC.BTC", "input asset");
        assert_eq!(record.output_amount, "1900000000", "output amount");
        assert_eq!(record.fee_amount, "550000", "1 BTC * 55 bps");
        assert_eq!(record.fee_token_symbol, "BTC", "symbol");
        let usd = record.fee_amount_usd.expect("priced");
        assert!((usd - 374.00275).abs() < 1e-6, "0.0055 BTC at 68000.5: {usd}");
    }

    #[test]
    fn matches_one_of_multiple_affiliates() {
        let page: ActionsPage = serde_json::from_str(PAGE).expect("fixture parses");
        let second = page.actions.get(1).expect("second action");
        let record = action_to_record(second, &affiliates()).expect("t/ss includes ss");
        assert_eq!(record.affiliate_address, "ss", "matched name");
        assert_eq!(record.fee_amount, "5000000", "50 USDC * 10 bps");
        assert_eq!(record.fee_token_symbol, "USDC", "token ticker");
        assert_eq!(record.fee_amount_usd, None, "no price in metadata");
    }

    #[test]
    fn affiliate_match_is_case_insensitive() {
        let page: ActionsPage = serde_json::from_str(PAGE).expect("fixture parses");
        let first = page.actions.first().expect("first action");
        assert!(
            action_to_record(first, &["SS".to_owned()]).is_some(),
            "upper-case thorname"
        );
    }

    #[test]
    fn non_swap_metadata_is_skipped() {
        let action: Action = serde_json::from_str(
            r#"{"date": "1", "height": "2", "in": [], "out": [], "metadata": {}, "type": "addLiquidity"}"#,
        )
        .expect("parses");
        assert!(action_to_record(&action, &affiliates()).is_none(), "not a swap");
    }

    #[test]
    fn asset_symbols() {
        assert_eq!(asset_symbol("BTC.BTC"), "BTC", "layer one");
        assert_eq!(asset_symbol("ETH.USDC-0XA0B8"), "USDC", "erc20");
        assert_eq!(asset_symbol("THOR.RUNE"), "RUNE", "rune");
        assert_eq!(asset_symbol("ETH~ETH"), "ETH", "trade asset");
    }

    /// Canned pages served in order; records the tokens it was asked for.
    #[derive(Debug, Default)]
    struct CannedPages {
        pages: std::collections::VecDeque<Result<ActionsPage>>,
        tokens: Vec<Option<String>>,
    }

    impl ActionPages for CannedPages {
        fn actions_page(
            &mut self,
            _affiliates: &[String],
            _from_height: Option<u64>,
            _from_timestamp: Option<i64>,
            page_token: Option<&str>,
        ) -> impl Future<Output = Result<ActionsPage>> + Send {
            self.tokens.push(page_token.map(str::to_owned));
            let page = self
                .pages
                .pop_front()
                .unwrap_or_else(|| Err(anyhow::anyhow!("no more canned pages")));
            std::future::ready(page)
        }
    }

    fn swap_page(heights: &[u64], next: Option<&str>) -> Result<ActionsPage> {
        let actions: Vec<String> = heights
            .iter()
            .map(|h| {
                format!(
                    r#"{{"date": "{h}000000000", "height": "{h}",
                        "in": [{{"address": "a", "coins": [{{"amount": "10000", "asset": "BTC.BTC"}}], "txID": "T{h}"}}],
                        "out": [], "metadata": {{"swap": {{"affiliateAddress": "ss", "affiliateFee": "50"}}}},
                        "type": "swap"}}"#
                )
            })
            .collect();
        let next = next.map_or_else(String::new, |t| format!(r#", "nextPageToken": "{t}""#));
        let body = format!(
            r#"{{"actions": [{}], "meta": {{"prevPageToken": ""{next}}}}}"#,
            actions.join(",")
        );
        Ok(serde_json::from_str(&body).expect("canned page parses"))
    }

    fn canned(pages: Vec<Result<ActionsPage>>) -> CannedPages {
        CannedPages {
            pages: pages.into(),
            tokens: Vec::new(),
        }
    }

    #[tokio::test]
    async fn walk_stops_on_missing_token() {
        let mut pages = canned(vec![
            swap_page(&[300, 299], Some("p2")),
            swap_page(&[298], None),
        ]);
        let (records, report) = affiliate_swaps(&mut pages, &affiliates(), Some(250), None, 10).await;

        assert_eq!(records.len(), 3, "every swap collected");
        assert_eq!(report.pages, 2, "two pages");
        assert!(!report.truncated, "walk reached the end");
        assert_eq!(report.max_height, Some(300), "newest height");
        assert_eq!(report.oldest_height, Some(298), "oldest height");
        assert_eq!(pages.tokens, [None, Some("p2".to_owned())], "token followed");
        assert_eq!(report.next_tracker(Some(250)), Some(300), "tracker advances");
    }

    #[tokio::test]
    async fn walk_stops_on_empty_page() {
        let mut pages = canned(vec![swap_page(&[300], Some("p2")), swap_page(&[], Some("p3"))]);
        let (records, report) = affiliate_swaps(&mut pages, &affiliates(), None, None, 10).await;

        assert_eq!(records.len(), 1, "one swap");
        assert_eq!(report.pages, 2, "empty page fetched");
        assert!(!report.truncated, "empty page ends the walk normally");
        assert_eq!(pages.tokens.len(), 2, "p3 never requested");
    }

    #[tokio::test]
    async fn max_pages_with_pending_token_is_truncated() {
        let mut pages = canned(vec![
            swap_page(&[500, 499], Some("p2")),
            swap_page(&[498, 497], Some("p3")),
            swap_page(&[496], None),
        ]);
        let (records, report) = affiliate_swaps(&mut pages, &affiliates(), Some(400), None, 2).await;

        assert_eq!(records.len(), 4, "two pages of swaps");
        assert!(report.truncated, "older pages pending");
        assert_eq!(report.oldest_height, Some(497), "oldest reached");
        assert_eq!(report.next_tracker(Some(400)), None, "tracker left alone on resume");
        assert_eq!(report.next_tracker(None), Some(500), "first run still records the tip");
    }

    #[tokio::test]
    async fn failed_page_is_truncated() {
        let mut pages = canned(vec![
            swap_page(&[500], Some("p2")),
            Err(anyhow::anyhow!("503 Service Unavailable")),
        ]);
        let (records, report) = affiliate_swaps(&mut pages, &affiliates(), Some(400), None, 10).await;

        assert_eq!(records.len(), 1, "first page kept");
        assert_eq!(report.pages, 1, "failed page not counted");
        assert!(report.truncated, "failure cuts the walk short");
        assert_eq!(report.next_tracker(Some(400)), None, "tracker left alone");
    }
}
