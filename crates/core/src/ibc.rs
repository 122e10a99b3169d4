//! Channel and packet descriptors handed to contracts by the host.

use mesh_messages::Binary;
use mesh_types::{ChannelId, ConnectionId, PortId, Sequence, Timestamp};
use serde::{Deserialize, Serialize};

/// One end of a channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IbcEndpoint {
    pub port_id: PortId,
    pub channel_id: ChannelId,
}

/// Packet ordering guarantee of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelOrder {
    Unordered,
    Ordered,
}

/// A channel as seen from the local end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IbcChannel {
    pub endpoint: IbcEndpoint,
    pub counterparty_endpoint: IbcEndpoint,
    pub order: ChannelOrder,
    pub version: String,
    pub connection_id: ConnectionId,
}

/// First half of the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelOpenMsg {
    /// Local chain initiates.
    OpenInit { channel: IbcChannel },
    /// Counterparty initiated; its proposed version is attached.
    OpenTry {
        channel: IbcChannel,
        counterparty_version: String,
    },
}

impl ChannelOpenMsg {
    pub fn channel(&self) -> &IbcChannel {
        match self {
            ChannelOpenMsg::OpenInit { channel } => channel,
            ChannelOpenMsg::OpenTry { channel, .. } => channel,
        }
    }

    pub fn counterparty_version(&self) -> Option<&str> {
        match self {
            ChannelOpenMsg::OpenInit { .. } => None,
            ChannelOpenMsg::OpenTry {
                counterparty_version,
                ..
            } => Some(counterparty_version),
        }
    }
}

/// Second half of the handshake; the channel is usable afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelConnectMsg {
    /// Initiator learns the counterparty's channel id and version.
    OpenAck {
        channel: IbcChannel,
        counterparty_version: String,
    },
    /// Responder learns the handshake completed.
    OpenConfirm { channel: IbcChannel },
}

impl ChannelConnectMsg {
    pub fn channel(&self) -> &IbcChannel {
        match self {
            ChannelConnectMsg::OpenAck { channel, .. } => channel,
            ChannelConnectMsg::OpenConfirm { channel } => channel,
        }
    }

    pub fn counterparty_version(&self) -> Option<&str> {
        match self {
            ChannelConnectMsg::OpenAck {
                counterparty_version,
                ..
            } => Some(counterparty_version),
            ChannelConnectMsg::OpenConfirm { .. } => None,
        }
    }
}

/// A packet in flight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IbcPacket {
    pub data: Binary,
    pub src: IbcEndpoint,
    pub dest: IbcEndpoint,
    pub sequence: Sequence,
    /// Destination block time after which the packet can only time out.
    pub timeout: Timestamp,
}
