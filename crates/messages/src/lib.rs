//! Wire schema for mesh security.
//!
//! - [`packet`]: payloads carried over the cross-stake channel and the
//!   acknowledgement envelope returned for each of them.
//! - [`lockup`], [`provider`], [`consumer`], [`meta_staking`], [`slasher`]:
//!   instantiate/execute/query messages of each contract, shared so that one
//!   contract can build messages for another without depending on it.
//! - [`codec`]: JSON encoding into opaque [`Binary`] payloads (CosmWasm codec).

pub mod codec;
pub mod consumer;
pub mod lockup;
pub mod meta_staking;
pub mod packet;
pub mod provider;
pub mod slasher;

pub use codec::{from_binary, from_slice, to_binary, Binary, StdError, StdResult};
pub use packet::{
    Acknowledgement, ConsumerPacket, ListValidatorsResponse, ProviderPacket, RewardsAck, StakeAck,
    ValidatorReward, IBC_APP_VERSION,
};
