//! Affiliate fee tracking primitives.
//!
//! Static tables of the networks and swap protocols on which affiliate fee
//! revenue is tracked, plus the positional log decoders and the affiliate
//! filter that every listener shares. This crate performs no I/O; fetching
//! and persistence live in `affiliate-fees-sync`.
//!
//! ```
//! use affiliate_fees::{Network, Protocol, decode};
//!
//! let affiliate = Network::Arbitrum.affiliate();
//! let topic = decode::address_to_topic(affiliate);
//! assert!(decode::is_affiliate(
//!     &decode::topic_address_hex(&topic),
//!     &decode::format_address(affiliate),
//! ));
//! assert!(Protocol::CowSwap.contract(Network::Arbitrum).is_some());
//! ```

mod abi;
pub mod decode;
mod error;
pub mod networks;
pub mod protocols;
pub mod types;

pub use error::{Error, Result};
pub use networks::Network;
pub use protocols::Protocol;
pub use types::{FeeRecord, TokenInfo, UNKNOWN_SYMBOL};
