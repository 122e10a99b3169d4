//! Inputs to a contract.

use crate::ibc::{ChannelConnectMsg, ChannelOpenMsg, IbcChannel, IbcPacket};
use mesh_messages::{Acknowledgement, Binary};
use mesh_types::{Addr, Timestamp};

/// Caller and attached funds of an execute or instantiate call.
pub use cosmwasm_std::MessageInfo;

/// Block the current transaction executes in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockInfo {
    pub height: u64,
    pub time: Timestamp,
    pub chain_id: String,
}

/// Execution environment passed with every event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Env {
    pub block: BlockInfo,
    /// Address of the contract being called.
    pub contract: Addr,
}

/// Result data of a successful submessage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubMsgResponse {
    /// Address created by an `Instantiate` action.
    pub instantiated: Option<Addr>,
    /// Data set by the callee.
    pub data: Option<Binary>,
}

/// Outcome of a submessage as seen by the reply handler. The error string
/// is the callee's error message.
pub type SubMsgResult = Result<SubMsgResponse, String>;

/// All events a contract can receive.
///
/// Instantiation is not an event: a contract value only exists once its
/// code's instantiate function has succeeded.
#[derive(Debug, Clone)]
pub enum Event {
    /// User or contract call.
    Execute { info: MessageInfo, msg: Binary },

    /// Privileged call from chain governance.
    Sudo { msg: Binary },

    /// Result of a submessage with a reply.
    Reply { id: u64, result: SubMsgResult },

    /// Handshake steps.
    ChannelOpen(ChannelOpenMsg),
    ChannelConnect(ChannelConnectMsg),
    ChannelClose { channel: IbcChannel },

    /// Packet delivered from the counterparty.
    PacketReceive { packet: IbcPacket },

    /// Counterparty acknowledged one of our packets.
    PacketAck {
        packet: IbcPacket,
        ack: Acknowledgement,
    },

    /// One of our packets timed out.
    PacketTimeout { packet: IbcPacket },
}

impl Event {
    /// Get the event type name for logging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Event::Execute { .. } => "Execute",
            Event::Sudo { .. } => "Sudo",
            Event::Reply { .. } => "Reply",
            Event::ChannelOpen(_) => "ChannelOpen",
            Event::ChannelConnect(_) => "ChannelConnect",
            Event::ChannelClose { .. } => "ChannelClose",
            Event::PacketReceive { .. } => "PacketReceive",
            Event::PacketAck { .. } => "PacketAck",
            Event::PacketTimeout { .. } => "PacketTimeout",
        }
    }
}
