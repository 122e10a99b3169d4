//! Core primitive types for mesh security.
//!
//! Amounts, decimals, coins and addresses are the CosmWasm types
//! ([`Uint128`], [`Decimal`], [`Coin`], [`Addr`]), re-exported so every
//! crate agrees on one definition. On top of them this crate adds:
//!
//! - [`math`]: checked helpers the CosmWasm types only offer as panicking
//!   operators.
//! - [`ChannelId`], [`PortId`], [`ConnectionId`], [`Sequence`]: IBC
//!   identifiers.
//! - [`Timestamp`]: block time, used for unbonding and packet timeouts.
//! - [`Hash`]: Blake3 digest used for packet commitments.

mod hash;
mod identifiers;
pub mod math;

pub use cosmwasm_std::{
    coin, coins, Addr, CheckedFromRatioError, CheckedMultiplyRatioError, Coin, Decimal,
    OverflowError, Uint128,
};
pub use hash::{Hash, HexError};
pub use identifiers::{ChannelId, ConnectionId, PortId, Sequence, Timestamp};
