//! Positional log decoding and the affiliate filter.
//!
//! Topics are read as left-padded 20-byte addresses and the data payload as
//! consecutive 32-byte big-endian words. Nothing here is ABI-driven: a
//! missing or short word decodes to zero (amounts) or `None` (addresses)
//! instead of failing, so a malformed log still yields a best-effort row.

use alloy::primitives::{Address, B256, U256};
use alloy::rpc::types::Log;
use alloy::sol_types::SolEvent;

use crate::abi;
use crate::protocols::Protocol;

/// Size of one ABI word.
const WORD: usize = 32;

/// Topic0 of the ERC-20 `Transfer(address,address,uint256)` event.
pub const TRANSFER_TOPIC: B256 = abi::Transfer::SIGNATURE_HASH;

/// An ERC-20 transfer decoded from a `Transfer` log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transfer {
    /// Token contract that emitted the log.
    pub token: Address,
    /// Sender.
    pub from: Address,
    /// Recipient.
    pub to: Address,
    /// Raw amount.
    pub value: U256,
}

/// Swap fields decoded from a protocol's swap event.
///
/// Fields the protocol does not emit stay at their defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SwapEvent {
    /// Trader (`owner`, `taker` or `sender`).
    pub sender: Option<Address>,
    /// Token sold.
    pub input_token: Option<Address>,
    /// Raw amount sold.
    pub input_amount: U256,
    /// Token bought.
    pub output_token: Option<Address>,
    /// Raw amount bought.
    pub output_amount: U256,
    /// Affiliate tagged in the event, for protocols that index it.
    pub partner: Option<Address>,
}

/// Read the address held in the last 20 bytes of a 32-byte topic.
#[must_use]
pub fn topic_to_address(topic: &B256) -> Address {
    Address::from_word(*topic)
}

/// Left-pad an address to a 32-byte topic, as `indexed address` params are.
#[must_use]
pub fn address_to_topic(address: Address) -> B256 {
    address.into_word()
}

/// Lowercase `0x`-prefixed hex.
#[must_use]
pub fn format_address(address: Address) -> String {
    format!("{address:#x}")
}

/// Lowercase hex of the address carried by `topic`.
#[must_use]
pub fn topic_address_hex(topic: &B256) -> String {
    format_address(topic_to_address(topic))
}

/// The `index`-th 32-byte word of `data`, if present in full.
#[must_use]
pub fn data_word(data: &[u8], index: usize) -> Option<B256> {
    let start = index.checked_mul(WORD)?;
    let word = data.get(start..start.checked_add(WORD)?)?;
    B256::try_from(word).ok()
}

/// Word `index` as a big-endian `uint256`; zero when missing.
#[must_use]
pub fn word_u256(data: &[u8], index: usize) -> U256 {
    data_word(data, index).map_or(U256::ZERO, |w| U256::from_be_bytes(w.0))
}

/// Word `index` as a right-aligned address; `None` when missing.
#[must_use]
pub fn word_address(data: &[u8], index: usize) -> Option<Address> {
    data_word(data, index).map(Address::from_word)
}

/// Strip whitespace and an optional `0x` prefix, then lowercase.
#[must_use]
pub fn normalize_hex(s: &str) -> String {
    let s = s.trim();
    let s = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    s.to_ascii_lowercase()
}

/// Case-insensitive string comparison against the affiliate address.
///
/// An empty candidate never matches.
#[must_use]
pub fn is_affiliate(candidate: &str, affiliate: &str) -> bool {
    let candidate = normalize_hex(candidate);
    !candidate.is_empty() && candidate == normalize_hex(affiliate)
}

/// Decode an ERC-20 `Transfer` log.
///
/// Returns `None` only when topic0 is not the `Transfer` signature or the
/// `from`/`to` topics are absent. A missing amount decodes as zero.
#[must_use]
pub fn decode_transfer(log: &Log) -> Option<Transfer> {
    let topics = log.topics();
    if topics.first() != Some(&TRANSFER_TOPIC) {
        return None;
    }
    let (from, to) = (topics.get(1)?, topics.get(2)?);
    Some(Transfer {
        token: log.address(),
        from: topic_to_address(from),
        to: topic_to_address(to),
        value: word_u256(&log.data().data, 0),
    })
}

/// Decode the swap fields of `protocol`'s event.
///
/// A log whose topic0 is not the protocol's event decodes to
/// [`SwapEvent::default`].
#[must_use]
pub fn decode_swap(protocol: Protocol, log: &Log) -> SwapEvent {
    let topics = log.topics();
    if let Some(expected) = protocol.event_topic()
        && topics.first() != Some(&expected)
    {
        return SwapEvent::default();
    }

    let data = &log.data().data;
    let topic = |i: usize| topics.get(i).map(topic_to_address);

    match protocol {
        // Trade(owner indexed, sellToken, buyToken, sellAmount, buyAmount, feeAmount, orderUid)
        // TransformedERC20(taker indexed, inputToken, outputToken, inputAmount, outputAmount)
        Protocol::CowSwap | Protocol::ZeroEx => SwapEvent {
            sender: topic(1),
            input_token: word_address(data, 0),
            output_token: word_address(data, 1),
            input_amount: word_u256(data, 2),
            output_amount: word_u256(data, 3),
            partner: None,
        },
        // Portal(inputToken, inputAmount, outputToken, sender indexed,
        //        broadcaster indexed, outputAmount, partner indexed)
        Protocol::Portals => SwapEvent {
            sender: topic(1),
            input_token: word_address(data, 0),
            input_amount: word_u256(data, 1),
            output_token: word_address(data, 2),
            output_amount: word_u256(data, 3),
            partner: topic(3),
        },
        Protocol::Relay | Protocol::Thorchain => SwapEvent::default(),
    }
}

/// Whether the protocol's indexed partner topic names the affiliate.
///
/// Always `false` for protocols without a partner topic.
#[must_use]
pub fn partner_matches(protocol: Protocol, log: &Log, affiliate: &str) -> bool {
    let Some(index) = protocol.partner_topic() else {
        return false;
    };
    if protocol.event_topic().as_ref() != log.topics().first() {
        return false;
    }
    log.topics()
        .get(index)
        .is_some_and(|t| is_affiliate(&topic_address_hex(t), affiliate))
}

#[cfg(test)]
mod tests {
    use alloy::primitives::{Bytes, LogData, address, b256};

    use super::*;

    const USDC: Address = address!("A0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48");
    const FROM: Address = address!("28C6c06298d514Db089934071355E5743bf21d60");
    const AFFILIATE: Address = address!("90A48D5CF7343B08dA12E067680B4C6dbfE551Be");

    fn rpc_log(address: Address, topics: Vec<B256>, data: Vec<u8>) -> Log {
        Log {
            inner: alloy::primitives::Log {
                address,
                data: LogData::new_unchecked(topics, Bytes::from(data)),
            },
            ..Default::default()
        }
    }

    fn words(values: &[U256]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_be_bytes::<32>()).collect()
    }

    fn addr_word(a: Address) -> U256 {
        U256::from_be_bytes(a.into_word().0)
    }

    #[test]
    fn topic_padding_does_not_change_address() {
        let expected = "0x90a48d5cf7343b08da12e067680b4c6dbfe551be";
        for pad in [0x00_u8, 0x01, 0x7f, 0xff] {
            let mut bytes = [pad; 32];
            bytes[12..].copy_from_slice(AFFILIATE.as_slice());
            let topic = B256::from(bytes);
            assert_eq!(topic_address_hex(&topic), expected, "padding byte {pad:#x}");
        }
    }

    #[test]
    fn address_topic_round_trip() {
        let topic = address_to_topic(AFFILIATE);
        assert_eq!(
            topic,
            b256!("00000000000000000000000090a48d5cf7343b08da12e067680b4c6dbfe551be"),
            "left padded"
        );
        assert_eq!(topic_to_address(&topic), AFFILIATE, "round trip");
    }

    #[test]
    fn decodes_transfer_fixture() {
        let log = rpc_log(
            USDC,
            vec![TRANSFER_TOPIC, FROM.into_word(), AFFILIATE.into_word()],
            words(&[U256::from(1_234_567_u64)]),
        );
        let transfer = decode_transfer(&log).expect("transfer fixture decodes");
        assert_eq!(transfer.token, USDC, "token");
        assert_eq!(transfer.from, FROM, "from");
        assert_eq!(transfer.to, AFFILIATE, "to");
        assert_eq!(transfer.value, U256::from(1_234_567_u64), "value");
    }

    #[test]
    fn transfer_signature_is_erc20() {
        assert_eq!(
            TRANSFER_TOPIC,
            b256!("ddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"),
            "keccak256(Transfer(address,address,uint256))"
        );
    }

    #[test]
    fn short_transfer_data_decodes_as_zero() {
        let log = rpc_log(
            USDC,
            vec![TRANSFER_TOPIC, FROM.into_word(), AFFILIATE.into_word()],
            vec![0xde, 0xad],
        );
        let transfer = decode_transfer(&log).expect("topics are complete");
        assert_eq!(transfer.value, U256::ZERO, "short data defaults to zero");
    }

    #[test]
    fn non_transfer_logs_are_rejected() {
        let other = rpc_log(USDC, vec![B256::repeat_byte(1)], vec![]);
        assert!(decode_transfer(&other).is_none(), "wrong topic0");
        let truncated = rpc_log(USDC, vec![TRANSFER_TOPIC, FROM.into_word()], vec![]);
        assert!(decode_transfer(&truncated).is_none(), "missing to topic");
    }

    #[test]
    fn affiliate_check_is_case_insensitive_and_idempotent() {
        let upper = "0x90A48D5CF7343B08DA12E067680B4C6DBFE551BE";
        let lower = "90a48d5cf7343b08da12e067680b4c6dbfe551be";
        assert!(is_affiliate(upper, lower), "mixed case and prefix");
        for _ in 0..3 {
            assert!(is_affiliate(upper, lower), "repeat check still matches");
        }
        assert!(!is_affiliate("", lower), "empty never matches");
        assert!(!is_affiliate(&format_address(FROM), lower), "other address");
    }

    #[test]
    fn decodes_cowswap_trade() {
        let weth = address!("C02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2");
        let data = words(&[
            addr_word(weth),
            addr_word(USDC),
            U256::from(10_u64).pow(U256::from(18)),
            U256::from(3_500_000_000_u64),
            U256::ZERO,
        ]);
        let log = rpc_log(
            address!("9008D19f58AAbD9eD0D60971565AA8510560ab41"),
            vec![abi::Trade::SIGNATURE_HASH, FROM.into_word()],
            data,
        );
        let swap = decode_swap(Protocol::CowSwap, &log);
        assert_eq!(swap.sender, Some(FROM), "owner");
        assert_eq!(swap.input_token, Some(weth), "sell token");
        assert_eq!(swap.output_token, Some(USDC), "buy token");
        assert_eq!(swap.output_amount, U256::from(3_500_000_000_u64), "buy amount");
        assert_eq!(swap.partner, None, "no partner topic");
    }

    #[test]
    fn decodes_portal_partner() {
        let broadcaster = address!("1111111111111111111111111111111111111111");
        let data = words(&[
            addr_word(Address::ZERO),
            U256::from(5_u64),
            addr_word(USDC),
            U256::from(7_u64),
        ]);
        let log = rpc_log(
            address!("bf5A7F3629fB325E2a8453D595AB103465F75E62"),
            vec![
                abi::Portal::SIGNATURE_HASH,
                FROM.into_word(),
                broadcaster.into_word(),
                AFFILIATE.into_word(),
            ],
            data,
        );
        let swap = decode_swap(Protocol::Portals, &log);
        assert_eq!(swap.input_token, Some(Address::ZERO), "native input");
        assert_eq!(swap.input_amount, U256::from(5_u64), "input amount");
        assert_eq!(swap.output_amount, U256::from(7_u64), "output amount");
        assert_eq!(swap.partner, Some(AFFILIATE), "partner topic");
        assert!(
            partner_matches(Protocol::Portals, &log, &format_address(AFFILIATE)),
            "portal names the affiliate"
        );
        assert!(
            !partner_matches(Protocol::CowSwap, &log, &format_address(AFFILIATE)),
            "cowswap has no partner topic"
        );
    }

    #[test]
    fn mismatched_event_decodes_to_default() {
        let log = rpc_log(USDC, vec![TRANSFER_TOPIC], words(&[U256::from(1_u64)]));
        assert_eq!(decode_swap(Protocol::ZeroEx, &log), SwapEvent::default(), "not a transform");
    }
}
