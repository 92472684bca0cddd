//! Event signatures for the tracked contracts.
//!
//! Only the `SIGNATURE_HASH` constants are used; log bodies are sliced by
//! hand in [`crate::decode`].
#![allow(missing_docs, dead_code, reason = "sol! generated items")]

alloy::sol! {
    /// ERC-20 token transfer.
    event Transfer(address indexed from, address indexed to, uint256 value);

    /// `CoW` Protocol GPv2Settlement trade.
    event Trade(
        address indexed owner,
        address sellToken,
        address buyToken,
        uint256 sellAmount,
        uint256 buyAmount,
        uint256 feeAmount,
        bytes orderUid
    );

    /// 0x `ExchangeProxy` transform.
    event TransformedERC20(
        address indexed taker,
        address inputToken,
        address outputToken,
        uint256 inputTokenAmount,
        uint256 outputTokenAmount
    );

    /// Portals router swap.
    event Portal(
        address inputToken,
        uint256 inputAmount,
        address outputToken,
        address indexed sender,
        address indexed broadcaster,
        uint256 outputAmount,
        address indexed partner
    );
}
