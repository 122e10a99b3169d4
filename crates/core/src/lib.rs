//! Core types for mesh security contracts.
//!
//! Contracts are deterministic state machines in the same mould as a
//! consensus node: the host feeds them [`Event`]s, they mutate their own
//! state and return a [`Response`] listing [`Action`]s for the host to
//! perform. Nothing in this crate performs I/O.
//!
//! ```text
//!        Event ──▶ Contract::handle ──▶ Response { actions, ack, .. }
//!                        │                        │
//!                   &dyn Querier             host executes
//! ```

mod action;
pub mod channel;
mod error;
mod event;
pub mod ibc;
pub mod packets;
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;
mod traits;

pub use action::{Action, ReplyOn, Response, SubMsg};
pub use channel::{ChannelAuth, ChannelBinding, PeerRequirement};
pub use error::ContractError;
pub use event::{BlockInfo, Env, Event, MessageInfo, SubMsgResponse, SubMsgResult};
pub use ibc::{
    ChannelConnectMsg, ChannelOpenMsg, ChannelOrder, IbcChannel, IbcEndpoint, IbcPacket,
};
pub use packets::PacketLedger;
pub use traits::{query_contract, Contract, InstantiateFn, Querier};

/// Seconds a packet stays deliverable unless a contract configures otherwise.
pub const DEFAULT_PACKET_LIFETIME: u64 = 3600;
