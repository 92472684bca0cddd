//! Tracked swap protocols and their per-network contract deployments.

use std::fmt;
use std::str::FromStr;

use alloy::primitives::{Address, B256, address};
use alloy::sol_types::SolEvent;

use crate::Error;
use crate::abi;
use crate::networks::Network;

/// GPv2Settlement, same address on every chain.
const COWSWAP_SETTLEMENT: Address = address!("9008D19f58AAbD9eD0D60971565AA8510560ab41");
/// 0x `ExchangeProxy`.
const ZEROEX_PROXY: Address = address!("Def1C0ded9bec7F1a1670819833240f027b25EfF");
/// 0x `ExchangeProxy` on Optimism.
const ZEROEX_PROXY_OPTIMISM: Address = address!("DEF1ABE32c034e558Cdd535791643C58a13aCC10");
/// Portals router.
const PORTALS_ROUTER: Address = address!("bf5A7F3629fB325E2a8453D595AB103465F75E62");
/// Relay receiver.
const RELAY_RECEIVER: Address = address!("a5F565650890fBA1824Ee0F21EbBbF660a179934");

/// A protocol that pays affiliate fees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[non_exhaustive]
pub enum Protocol {
    /// `CoW` Swap batch auctions.
    CowSwap,
    /// 0x swap API via the `ExchangeProxy`.
    ZeroEx,
    /// Portals zaps.
    Portals,
    /// Relay bridge and swap.
    Relay,
    /// THORChain native swaps (indexed by Midgard, not by logs).
    Thorchain,
}

impl Protocol {
    /// Protocols scanned through `eth_getLogs`.
    pub const EVM: &[Self] = &[Self::CowSwap, Self::ZeroEx, Self::Portals, Self::Relay];

    /// Label written into the `protocol` column and the block tracker.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::CowSwap => "cowswap",
            Self::ZeroEx => "0x",
            Self::Portals => "portals",
            Self::Relay => "relay",
            Self::Thorchain => "thorchain",
        }
    }

    /// Contract whose logs identify a swap of this protocol on `network`.
    ///
    /// Returns `None` when the protocol is not deployed there.
    #[must_use]
    pub const fn contract(self, network: Network) -> Option<Address> {
        match (self, network) {
            (
                Self::CowSwap,
                Network::Ethereum | Network::Gnosis | Network::Arbitrum | Network::Base,
            ) => Some(COWSWAP_SETTLEMENT),
            (Self::ZeroEx, Network::Optimism) => Some(ZEROEX_PROXY_OPTIMISM),
            (
                Self::ZeroEx,
                Network::Ethereum
                | Network::Bsc
                | Network::Polygon
                | Network::Base
                | Network::Arbitrum
                | Network::Avalanche,
            ) => Some(ZEROEX_PROXY),
            (
                Self::Portals,
                Network::Ethereum
                | Network::Optimism
                | Network::Bsc
                | Network::Polygon
                | Network::Base
                | Network::Arbitrum
                | Network::Avalanche,
            ) => Some(PORTALS_ROUTER),
            (Self::Relay, _) => Some(RELAY_RECEIVER),
            _ => None,
        }
    }

    /// Topic0 of the swap event, or `None` to accept every log from the contract.
    #[must_use]
    pub const fn event_topic(self) -> Option<B256> {
        match self {
            Self::CowSwap => Some(abi::Trade::SIGNATURE_HASH),
            Self::ZeroEx => Some(abi::TransformedERC20::SIGNATURE_HASH),
            Self::Portals => Some(abi::Portal::SIGNATURE_HASH),
            Self::Relay | Self::Thorchain => None,
        }
    }

    /// Index of the indexed `partner` topic for protocols that tag the
    /// affiliate directly in the swap event.
    #[must_use]
    pub const fn partner_topic(self) -> Option<usize> {
        match self {
            Self::Portals => Some(3),
            _ => None,
        }
    }

    /// Networks on which this protocol has a known deployment.
    pub fn networks(self) -> impl Iterator<Item = Network> {
        Network::ALL
            .iter()
            .copied()
            .filter(move |n| self.contract(*n).is_some())
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Protocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cowswap" | "cow" => Ok(Self::CowSwap),
            "0x" | "zeroex" | "zrx" => Ok(Self::ZeroEx),
            "portals" => Ok(Self::Portals),
            "relay" => Ok(Self::Relay),
            "thorchain" | "thor" => Ok(Self::Thorchain),
            _ => Err(Error::UnknownProtocol(s.to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thorchain_has_no_evm_deployment() {
        assert_eq!(Protocol::Thorchain.networks().count(), 0, "thorchain is Midgard-only");
        assert!(
            !Protocol::EVM.contains(&Protocol::Thorchain),
            "thorchain is not log-scanned"
        );
    }

    #[test]
    fn cowswap_deployments() {
        let networks: Vec<_> = Protocol::CowSwap.networks().collect();
        assert_eq!(
            networks,
            [Network::Ethereum, Network::Gnosis, Network::Base, Network::Arbitrum],
            "cowswap networks"
        );
    }

    #[test]
    fn labels_parse_back() {
        for p in Protocol::EVM.iter().chain([&Protocol::Thorchain]) {
            assert_eq!(p.label().parse::<Protocol>().ok(), Some(*p), "{p}");
        }
        assert!("uniswap".parse::<Protocol>().is_err(), "unknown protocol");
    }

    #[test]
    fn only_portals_tags_partner() {
        assert_eq!(Protocol::Portals.partner_topic(), Some(3), "portals partner topic");
        assert_eq!(Protocol::CowSwap.partner_topic(), None, "cowswap has no partner topic");
        assert!(Protocol::Relay.event_topic().is_none(), "relay accepts any log");
    }
}
