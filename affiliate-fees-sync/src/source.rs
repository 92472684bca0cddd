//! The RPC calls the scanner needs, behind a small trait.
//!
//! [`RpcSource`] implements [`ChainSource`] on top of any alloy
//! [`Provider`]; tests substitute an in-memory log list.

use std::future::Future;
use std::time::Duration;

use affiliate_fees::TokenInfo;
use alloy::eips::BlockNumberOrTag;
use alloy::primitives::{Address, B256};
use alloy::providers::Provider;
use alloy::rpc::types::{Filter, Log};
use anyhow::{Context, Result, anyhow};

/// Per-request timeout for RPC calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

alloy::sol! {
    #[sol(rpc)]
    #[allow(missing_docs, reason = "sol! generated items")]
    interface IERC20Metadata {
        function symbol() external view returns (string);
        function decimals() external view returns (uint8);
    }
}

/// One `eth_getLogs` query over an inclusive block range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogQuery {
    /// Emitting contract, or any contract when `None`.
    pub address: Option<Address>,
    /// Required topic0.
    pub topic0: Option<B256>,
    /// Required topic2.
    pub topic2: Option<B256>,
    /// First block, inclusive.
    pub from: u64,
    /// Last block, inclusive.
    pub to: u64,
}

impl LogQuery {
    /// Whether `log` satisfies this query.
    #[must_use]
    pub fn matches(&self, log: &Log) -> bool {
        let topics = log.topics();
        log.block_number
            .is_some_and(|b| (self.from..=self.to).contains(&b))
            && self.address.is_none_or(|a| log.address() == a)
            && self.topic0.is_none_or(|t| topics.first() == Some(&t))
            && self.topic2.is_none_or(|t| topics.get(2) == Some(&t))
    }

    fn to_filter(self) -> Filter {
        let mut filter = Filter::new().from_block(self.from).to_block(self.to);
        if let Some(address) = self.address {
            filter = filter.address(address);
        }
        if let Some(topic0) = self.topic0 {
            filter = filter.event_signature(topic0);
        }
        if let Some(topic2) = self.topic2 {
            filter = filter.topic2(topic2);
        }
        filter
    }
}

/// Chain access used by the scanner.
pub trait ChainSource: Sync {
    /// Current chain tip.
    fn latest_block(&self) -> impl Future<Output = Result<u64>> + Send;

    /// Logs matching `query`.
    fn logs(&self, query: LogQuery) -> impl Future<Output = Result<Vec<Log>>> + Send;

    /// Timestamp of `block`, if the node knows the block.
    fn block_timestamp(&self, block: u64) -> impl Future<Output = Result<Option<u64>>> + Send;

    /// ERC-20 symbol and decimals of `token`.
    fn token_info(&self, token: Address) -> impl Future<Output = Result<TokenInfo>> + Send;
}

/// [`ChainSource`] over an alloy provider, with a timeout on every call.
#[derive(Debug, Clone)]
pub struct RpcSource<P> {
    provider: P,
}

impl<P: Provider> RpcSource<P> {
    /// Wrap `provider`.
    pub const fn new(provider: P) -> Self {
        Self { provider }
    }
}

async fn timed<T, E: std::fmt::Display>(
    what: &str,
    fut: impl Future<Output = Result<T, E>> + Send,
) -> Result<T> {
    tokio::time::timeout(REQUEST_TIMEOUT, fut)
        .await
        .map_err(|_| anyhow!("{what} timed out"))?
        .map_err(|e| anyhow!("{what} failed: {e}"))
}

impl<P: Provider> ChainSource for RpcSource<P> {
    fn latest_block(&self) -> impl Future<Output = Result<u64>> + Send {
        timed("eth_blockNumber", self.provider.get_block_number())
    }

    fn logs(&self, query: LogQuery) -> impl Future<Output = Result<Vec<Log>>> + Send {
        async move {
            let filter = query.to_filter();
            timed("eth_getLogs", self.provider.get_logs(&filter)).await
        }
    }

    fn block_timestamp(&self, block: u64) -> impl Future<Output = Result<Option<u64>>> + Send {
        async move {
            let block = timed(
                "eth_getBlockByNumber",
                self.provider
                    .get_block_by_number(BlockNumberOrTag::Number(block))
                    .into_future(),
            )
            .await?;
            Ok(block.map(|b| b.header.timestamp))
        }
    }

    fn token_info(&self, token: Address) -> impl Future<Output = Result<TokenInfo>> + Send {
        async move {
            let erc20 = IERC20Metadata::new(token, &self.provider);
            let symbol = timed("symbol()", erc20.symbol().call().into_future())
                .await
                .with_context(|| format!("token {token:#x}"))?;
            let decimals = timed("decimals()", erc20.decimals().call().into_future())
                .await
                .ok();
            Ok(TokenInfo { symbol, decimals })
        }
    }
}
