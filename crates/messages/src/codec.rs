//! Message encoding and decoding.
//!
//! # Wire Format
//!
//! Every payload (packet data, acknowledgement success value, contract
//! message) is JSON-encoded into a [`Binary`] with the CosmWasm codec.
//! Enums use externally-tagged snake_case variants, so a stake packet reads
//! `{"stake":{"key":"..","validator":"..","amount":"1000"}}`. A `Binary`
//! nested inside JSON is base64.

pub use cosmwasm_std::{from_binary, from_slice, to_binary, Binary, StdError, StdResult};
