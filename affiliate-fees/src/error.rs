//! Error type for table lookups and address parsing.

/// Errors returned by the `affiliate-fees` library.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The chain ID is not one of the tracked networks.
    #[error("unknown chain ID {0}")]
    UnknownChainId(u64),

    /// The chain name is not one of the tracked networks.
    #[error("unknown network `{0}`")]
    UnknownNetwork(String),

    /// The protocol name is not one of the tracked protocols.
    #[error("unknown protocol `{0}`")]
    UnknownProtocol(String),

    /// The string is not a 20-byte hex address.
    #[error("invalid address `{0}`")]
    InvalidAddress(String),
}

/// Convenience alias for `Result<T, affiliate_fees::Error>`.
pub type Result<T, E = Error> = std::result::Result<T, E>;
