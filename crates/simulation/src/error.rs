//! Host-level failures.

use mesh_core::ContractError;
use mesh_messages::StdError;
use mesh_types::{Addr, ChannelId, ConnectionId, OverflowError, PortId, Sequence, Uint128};
use thiserror::Error;

/// Errors raised by the simulated chain or relayer.
///
/// A failing transaction is reverted as a whole. When the failure happens
/// inside a packet receive, [`HostError::reason`] becomes the error
/// acknowledgement written for the packet.
#[derive(Debug, PartialEq, Error)]
pub enum HostError {
    #[error("Contract {contract} failed: {error}")]
    Contract {
        contract: Addr,
        error: ContractError,
    },

    #[error("Unknown contract {0}")]
    UnknownContract(Addr),

    #[error("Unknown code id {0}")]
    UnknownCode(u64),

    #[error("Insufficient funds: {address} has {balance}{denom}, needs {required}{denom}")]
    InsufficientFunds {
        address: Addr,
        denom: String,
        balance: Uint128,
        required: Uint128,
    },

    #[error("Wrong staking denom: expected {expected}, got {actual}")]
    WrongDenom { expected: String, actual: String },

    #[error("Unknown validator {0}")]
    UnknownValidator(String),

    #[error("Insufficient delegation: {delegated} delegated, {requested} requested")]
    InsufficientDelegation {
        delegated: Uint128,
        requested: Uint128,
    },

    #[error("Unknown connection {0}")]
    UnknownConnection(ConnectionId),

    #[error("Unknown channel {port}/{channel}")]
    UnknownChannel { port: PortId, channel: ChannelId },

    #[error("Channel {0} is not open")]
    ChannelNotOpen(ChannelId),

    #[error("Channel {0} is not in the expected handshake state")]
    HandshakeState(ChannelId),

    #[error("No port bound for {0}")]
    UnknownPort(PortId),

    #[error("Send sequence mismatch on {channel}: expected {expected}, got {actual}")]
    SequenceMismatch {
        channel: ChannelId,
        expected: Sequence,
        actual: Sequence,
    },

    #[error("No commitment for packet {sequence} on {channel}")]
    UnknownCommitment {
        channel: ChannelId,
        sequence: Sequence,
    },

    #[error("Packet {sequence} on {channel} timed out")]
    PacketTimedOut {
        channel: ChannelId,
        sequence: Sequence,
    },

    #[error("Transfer failed: {0}")]
    Transfer(String),

    #[error("Call depth exceeded")]
    CallDepthExceeded,

    #[error("Invalid setup: {0}")]
    InvalidSetup(String),

    #[error("Chain {actual} passed where {expected} was expected")]
    WrongChain { expected: String, actual: String },

    #[error("Arithmetic overflow: {0}")]
    Overflow(#[from] OverflowError),

    #[error(transparent)]
    Std(#[from] StdError),
}

impl HostError {
    /// Text reported to a reply handler or written into an error ack.
    /// Contract failures carry the contract's own message.
    pub fn reason(&self) -> String {
        match self {
            HostError::Contract { error, .. } => error.to_string(),
            other => other.to_string(),
        }
    }

    /// The contract error, if a contract caused this failure.
    pub fn contract_error(&self) -> Option<&ContractError> {
        match self {
            HostError::Contract { error, .. } => Some(error),
            _ => None,
        }
    }
}
