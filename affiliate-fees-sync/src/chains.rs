//! Static chain configuration for every tracked EVM network.
//!
//! Each entry pairs an [`affiliate_fees::Network`] with operational metadata
//! the library does not track: a default public RPC and the widest
//! `eth_getLogs` block span that endpoint is known to accept.

use affiliate_fees::{Network, Protocol};

/// Smallest accepted blocks-per-chunk setting.
pub const MIN_CHUNK: u64 = 500;

/// Operational metadata for a single chain.
#[derive(Debug, Clone, Copy)]
pub struct ChainConfig {
    /// The [`affiliate_fees::Network`] variant (chain ID, affiliate address).
    pub network: Network,
    /// Suggested public RPC endpoint.
    pub default_rpc: &'static str,
    /// Upper bound on blocks per `eth_getLogs` call for this chain.
    pub max_chunk: u64,
}

impl ChainConfig {
    /// Convenience: the EIP-155 chain ID.
    #[must_use]
    pub const fn chain_id(&self) -> u64 {
        self.network.chain_id()
    }

    /// Blocks per chunk: the configured size clamped to [`MIN_CHUNK`] and
    /// this chain's limit.
    #[must_use]
    pub fn chunk_size(&self, configured: u64) -> u64 {
        configured.clamp(MIN_CHUNK.min(self.max_chunk), self.max_chunk)
    }

    /// EVM protocols with a deployment on this chain.
    pub fn protocols(&self) -> impl Iterator<Item = Protocol> {
        let network = self.network;
        Protocol::EVM
            .iter()
            .copied()
            .filter(move |p| p.contract(network).is_some())
    }
}

/// All tracked chains (single source of truth).
pub const ALL: &[ChainConfig] = &[
    ChainConfig {
        network: Network::Ethereum,
        default_rpc: "https://ethereum-rpc.publicnode.com",
        max_chunk: 2_000,
    },
    ChainConfig {
        network: Network::Optimism,
        default_rpc: "https://mainnet.optimism.io",
        max_chunk: 2_000,
    },
    ChainConfig {
        network: Network::Bsc,
        default_rpc: "https://bsc-rpc.publicnode.com",
        max_chunk: 500,
    },
    ChainConfig {
        network: Network::Gnosis,
        default_rpc: "https://rpc.gnosischain.com",
        max_chunk: 2_000,
    },
    ChainConfig {
        network: Network::Polygon,
        default_rpc: "https://polygon-rpc.com",
        max_chunk: 1_000,
    },
    ChainConfig {
        network: Network::Base,
        default_rpc: "https://mainnet.base.org",
        max_chunk: 2_000,
    },
    ChainConfig {
        network: Network::Arbitrum,
        default_rpc: "https://arb1.arbitrum.io/rpc",
        max_chunk: 2_000,
    },
    ChainConfig {
        network: Network::Avalanche,
        default_rpc: "https://api.avax.network/ext/bc/C/rpc",
        max_chunk: 2_000,
    },
];

/// Look up a [`ChainConfig`] by network.
#[must_use]
pub fn by_network(network: Network) -> Option<&'static ChainConfig> {
    ALL.iter().find(|c| c.network == network)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_network_has_a_chain_entry() {
        for network in Network::ALL {
            assert!(by_network(*network).is_some(), "missing chain entry for {network}");
        }
    }

    #[test]
    fn chunk_size_respects_chain_limit() {
        let bsc = by_network(Network::Bsc).expect("bsc entry");
        assert_eq!(bsc.chunk_size(2_000), 500, "capped");
        assert_eq!(bsc.chunk_size(10), 500, "raised to the floor");
        let eth = by_network(Network::Ethereum).expect("ethereum entry");
        assert_eq!(eth.chunk_size(10), MIN_CHUNK, "tiny setting raised");
        assert_eq!(eth.chunk_size(0), MIN_CHUNK, "never zero");
        assert_eq!(eth.chunk_size(1_200), 1_200, "within range");
        assert_eq!(eth.chunk_size(50_000), 2_000, "ethereum cap");
    }

    #[test]
    fn gnosis_has_no_portals() {
        let gnosis = by_network(Network::Gnosis).expect("gnosis entry");
        let protocols: Vec<_> = gnosis.protocols().collect();
        assert_eq!(protocols, [Protocol::CowSwap, Protocol::Relay], "gnosis protocols");
    }
}
