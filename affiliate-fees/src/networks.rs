//! EVM networks on which affiliate fees are tracked.
//!
//! Each variant carries its EIP-155 chain ID, a short lowercase name used in
//! stored records, the `CoinGecko` asset platform, and the default affiliate
//! (treasury) address that receives fee revenue on that chain.

use std::fmt;
use std::str::FromStr;

use alloy::primitives::{Address, address};

use crate::Error;

/// Supported EVM networks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[non_exhaustive]
pub enum Network {
    /// Ethereum Mainnet (chain ID 1).
    Ethereum,
    /// Optimism (chain ID 10).
    Optimism,
    /// BNB Smart Chain (chain ID 56).
    Bsc,
    /// Gnosis (chain ID 100).
    Gnosis,
    /// Polygon `PoS` (chain ID 137).
    Polygon,
    /// Base (chain ID 8453).
    Base,
    /// Arbitrum One (chain ID 42161).
    Arbitrum,
    /// Avalanche C-Chain (chain ID 43114).
    Avalanche,
}

impl Network {
    /// All supported networks, ordered by chain ID.
    pub const ALL: &[Self] = &[
        Self::Ethereum,
        Self::Optimism,
        Self::Bsc,
        Self::Gnosis,
        Self::Polygon,
        Self::Base,
        Self::Arbitrum,
        Self::Avalanche,
    ];

    /// Returns the EIP-155 chain ID.
    #[must_use]
    pub const fn chain_id(self) -> u64 {
        match self {
            Self::Ethereum => 1,
            Self::Optimism => 10,
            Self::Bsc => 56,
            Self::Gnosis => 100,
            Self::Polygon => 137,
            Self::Base => 8453,
            Self::Arbitrum => 42161,
            Self::Avalanche => 43114,
        }
    }

    /// Short lowercase name written into the `chain` column.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Ethereum => "ethereum",
            Self::Optimism => "optimism",
            Self::Bsc => "bsc",
            Self::Gnosis => "gnosis",
            Self::Polygon => "polygon",
            Self::Base => "base",
            Self::Arbitrum => "arbitrum",
            Self::Avalanche => "avalanche",
        }
    }

    /// `CoinGecko` asset platform ID used for token price lookups.
    #[must_use]
    pub const fn coingecko_platform(self) -> &'static str {
        match self {
            Self::Ethereum => "ethereum",
            Self::Optimism => "optimistic-ethereum",
            Self::Bsc => "binance-smart-chain",
            Self::Gnosis => "xdai",
            Self::Polygon => "polygon-pos",
            Self::Base => "base",
            Self::Arbitrum => "arbitrum-one",
            Self::Avalanche => "avalanche",
        }
    }

    /// Default affiliate address that receives fee revenue on this network.
    #[must_use]
    pub const fn affiliate(self) -> Address {
        match self {
            Self::Ethereum => address!("90A48D5CF7343B08dA12E067680B4C6dbfE551Be"),
            Self::Optimism => address!("6268d07327f4fb7380732dc6d63d95F88c0E083b"),
            Self::Bsc => address!("8b92b1698b57bEDF2142297e9397875ADBb2297E"),
            Self::Gnosis => address!("b0E3175341794D1dc8E5F02a02F9D26989EbedB3"),
            Self::Polygon => address!("B5F944600785724e31Edb90F9DFa16dBF01Af000"),
            Self::Base => address!("9c9aA90363630d4ab1D9dbF416cc3BBC8d3Ed502"),
            Self::Arbitrum => address!("38276553F8fbf2A027D901F8be45f00373d8Dd48"),
            Self::Avalanche => address!("74d63F31C2335b5b3BA7ad2812357672b2624cEd"),
        }
    }

    /// Look up a [`Network`] by its EIP-155 chain ID.
    #[must_use]
    pub fn from_chain_id(chain_id: u64) -> Option<Self> {
        Self::ALL.iter().find(|n| n.chain_id() == chain_id).copied()
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Parses either a chain name (`"arbitrum"`) or a numeric chain ID (`"42161"`).
impl FromStr for Network {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(id) = s.parse::<u64>() {
            return Self::from_chain_id(id).ok_or(Error::UnknownChainId(id));
        }
        Self::ALL
            .iter()
            .find(|n| n.name().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| Error::UnknownNetwork(s.to_owned()))
    }
}
