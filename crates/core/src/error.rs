//! Error types for contract execution.

use cw_utils::PaymentError;
use mesh_messages::StdError;
use mesh_types::{CheckedFromRatioError, CheckedMultiplyRatioError, OverflowError, Uint128};
use thiserror::Error;

/// Errors returned by a contract entry point.
///
/// Returning an error aborts the whole transaction: the host restores every
/// contract touched by it. When the entry point is a packet receive, the
/// error text becomes the `Acknowledgement::Error` payload instead.
#[derive(Debug, PartialEq, Error)]
pub enum ContractError {
    /// Caller, port, channel or connection is not the expected one.
    #[error("Unauthorized")]
    Unauthorized,

    /// A channel handshake was attempted after a channel was bound.
    #[error("Contract already has a bound channel")]
    ChannelAlreadyBound,

    /// No channel has been bound yet.
    #[error("No channel bound to this contract")]
    NoBoundChannel,

    /// The bound channel has been closed.
    #[error("Channel {0} is closed")]
    ChannelClosed(String),

    /// Handshake version is not the protocol version.
    #[error("Invalid IBC channel version: expected {expected}, got {actual}")]
    InvalidIbcVersion { expected: String, actual: String },

    /// Channel must be unordered.
    #[error("Only unordered channels are supported")]
    InvalidChannelOrder,

    /// Delegation would exceed the consumer's registered funds.
    #[error("Insufficient staking capacity: {available} available, {requested} requested")]
    InsufficientStakingCapacity {
        available: Uint128,
        requested: Uint128,
    },

    /// Not a registered meta-staking consumer.
    #[error("Unknown consumer {0}")]
    UnknownConsumer(String),

    /// A consumer cannot be removed while it still has delegations.
    #[error("Consumer {consumer} still has {staked} staked")]
    ConsumerHasDelegations { consumer: String, staked: Uint128 },

    /// Amount exceeds the unclaimed part of the bonded balance.
    #[error("Insufficient free balance: {free} free, {requested} requested")]
    InsufficientFreeBalance { free: Uint128, requested: Uint128 },

    /// Unbonding entries exist but none has matured.
    #[error("Unbonding period not elapsed: next release at {release_at}")]
    UnbondingPeriodNotElapsed { release_at: u64 },

    /// No unbonding entries at all.
    #[error("Nothing to unbond")]
    NothingToUnbond,

    /// No claim or stake for this owner and validator.
    #[error("Unknown claim for validator {validator}")]
    UnknownClaim { validator: String },

    /// Amount exceeds the existing claim or stake.
    #[error("Insufficient claim: {available} available, {requested} requested")]
    InsufficientClaim {
        available: Uint128,
        requested: Uint128,
    },

    /// Validator is not in the known set.
    #[error("Unknown validator {0}")]
    UnknownValidator(String),

    /// Contract balance does not cover the rewards owed.
    #[error("Insufficient reward funds: {available} available, {owed} owed")]
    InsufficientRewardFunds { available: Uint128, owed: Uint128 },

    /// Slash percentage outside `0..=1`.
    #[error("Invalid slash percentage {0}")]
    InvalidPercentage(String),

    /// Funds attached to a call disagree with the declared rewards.
    #[error("Reward mismatch: declared {declared}, paid {paid}")]
    RewardMismatch { declared: Uint128, paid: Uint128 },

    /// Attached funds are missing or in the wrong denomination.
    #[error("Invalid funds: {0}")]
    InvalidFunds(#[from] PaymentError),

    /// Checked arithmetic failed.
    #[error("Arithmetic overflow: {0}")]
    ArithmeticOverflow(#[from] OverflowError),

    #[error("Arithmetic overflow: {0}")]
    MultiplyRatio(#[from] CheckedMultiplyRatioError),

    #[error("Arithmetic overflow: {0}")]
    FromRatio(#[from] CheckedFromRatioError),

    /// Message could not be encoded or decoded.
    #[error(transparent)]
    Std(#[from] StdError),

    /// The contract does not handle this entry point.
    #[error("Unsupported entry point: {0}")]
    Unsupported(&'static str),

    /// Reply for an unknown submessage.
    #[error("Unknown reply id {0}")]
    UnknownReply(u64),

    /// Failure reported by the host while querying.
    #[error("Query failed: {0}")]
    Query(String),
}
