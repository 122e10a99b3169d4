//! Channel binding authentication.
//!
//! Each mesh contract speaks over exactly one channel for its whole life.
//! The binding is written once, when the handshake completes, and never
//! replaced; closing the channel only flips a flag.
//!
//! ```text
//!   OpenInit/OpenTry ──▶ check: not bound, version, order, peer
//!   OpenAck/OpenConfirm ──▶ check: not bound, version ──▶ bind
//!   packet / ack / timeout ──▶ authenticate against the binding
//! ```

use crate::ibc::{ChannelConnectMsg, ChannelOpenMsg, ChannelOrder, IbcChannel, IbcPacket};
use crate::ContractError;
use mesh_messages::IBC_APP_VERSION;
use mesh_types::{ChannelId, ConnectionId, PortId};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// The channel a contract is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelBinding {
    pub channel_id: ChannelId,
    pub port_id: PortId,
    pub counterparty_channel: ChannelId,
    pub counterparty_port: PortId,
    pub connection_id: ConnectionId,
    pub version: String,
    pub closed: bool,
}

impl ChannelBinding {
    fn from_channel(channel: &IbcChannel) -> Self {
        Self {
            channel_id: channel.endpoint.channel_id.clone(),
            port_id: channel.endpoint.port_id.clone(),
            counterparty_channel: channel.counterparty_endpoint.channel_id.clone(),
            counterparty_port: channel.counterparty_endpoint.port_id.clone(),
            connection_id: channel.connection_id.clone(),
            version: channel.version.clone(),
            closed: false,
        }
    }

    fn matches(&self, channel_id: &ChannelId, port_id: &PortId) -> bool {
        &self.channel_id == channel_id && &self.port_id == port_id
    }
}

/// Who the contract is willing to bind to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerRequirement {
    /// The counterparty port must be this one (checked on `OpenInit`), and
    /// the connection must be this one (checked on `OpenAck`).
    Initiator {
        counterparty_port: PortId,
        connection_id: ConnectionId,
    },
    /// The connection must be this one (checked on `OpenTry`).
    Responder { connection_id: ConnectionId },
}

/// Holds the optional binding and enforces it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelAuth {
    requirement: PeerRequirement,
    binding: Option<ChannelBinding>,
}

impl ChannelAuth {
    pub fn new(requirement: PeerRequirement) -> Self {
        Self {
            requirement,
            binding: None,
        }
    }

    /// The current binding, if any.
    pub fn binding(&self) -> Option<&ChannelBinding> {
        self.binding.as_ref()
    }

    /// Validate the first handshake step.
    pub fn check_open(&self, msg: &ChannelOpenMsg) -> Result<(), ContractError> {
        self.ensure_unbound()?;
        let channel = msg.channel();
        check_order_and_version(channel, msg.counterparty_version())?;

        match (&self.requirement, msg) {
            (
                PeerRequirement::Initiator {
                    counterparty_port, ..
                },
                ChannelOpenMsg::OpenInit { .. },
            ) => {
                if &channel.counterparty_endpoint.port_id != counterparty_port {
                    warn!(
                        expected = %counterparty_port,
                        actual = %channel.counterparty_endpoint.port_id,
                        "Rejecting channel open from unexpected port"
                    );
                    return Err(ContractError::Unauthorized);
                }
            }
            (PeerRequirement::Responder { connection_id }, ChannelOpenMsg::OpenTry { .. }) => {
                if &channel.connection_id != connection_id {
                    warn!(
                        expected = %connection_id,
                        actual = %channel.connection_id,
                        "Rejecting channel open on unexpected connection"
                    );
                    return Err(ContractError::Unauthorized);
                }
            }
            // Wrong handshake role for this contract
            _ => return Err(ContractError::Unauthorized),
        }

        debug!(channel = %channel.endpoint.channel_id, "Channel open accepted");
        Ok(())
    }

    /// Validate the second handshake step and bind the channel.
    pub fn connect(&mut self, msg: &ChannelConnectMsg) -> Result<&ChannelBinding, ContractError> {
        self.ensure_unbound()?;
        let channel = msg.channel();
        check_order_and_version(channel, msg.counterparty_version())?;

        match (&self.requirement, msg) {
            (PeerRequirement::Initiator { connection_id, .. }, ChannelConnectMsg::OpenAck { .. }) => {
                if &channel.connection_id != connection_id {
                    warn!(
                        expected = %connection_id,
                        actual = %channel.connection_id,
                        "Rejecting channel ack on unexpected connection"
                    );
                    return Err(ContractError::Unauthorized);
                }
            }
            (PeerRequirement::Responder { .. }, ChannelConnectMsg::OpenConfirm { .. }) => {}
            _ => return Err(ContractError::Unauthorized),
        }

        info!(
            channel = %channel.endpoint.channel_id,
            counterparty = %channel.counterparty_endpoint.channel_id,
            connection = %channel.connection_id,
            "Channel bound"
        );
        Ok(&*self.binding.insert(ChannelBinding::from_channel(channel)))
    }

    /// Mark the bound channel closed. Closing any other channel is refused.
    pub fn close(&mut self, channel: &IbcChannel) -> Result<(), ContractError> {
        let binding = self.binding.as_mut().ok_or(ContractError::NoBoundChannel)?;
        if !binding.matches(&channel.endpoint.channel_id, &channel.endpoint.port_id) {
            return Err(ContractError::Unauthorized);
        }
        binding.closed = true;
        info!(channel = %binding.channel_id, "Channel closed");
        Ok(())
    }

    /// Authenticate a packet delivered to us.
    pub fn authenticate_receive(&self, packet: &IbcPacket) -> Result<&ChannelBinding, ContractError> {
        self.authenticate(&packet.dest.channel_id, &packet.dest.port_id)
    }

    /// Authenticate an ack or timeout for a packet we sent.
    pub fn authenticate_sent(&self, packet: &IbcPacket) -> Result<&ChannelBinding, ContractError> {
        self.authenticate(&packet.src.channel_id, &packet.src.port_id)
    }

    /// The binding to send on; it must exist and be open.
    pub fn sendable(&self) -> Result<&ChannelBinding, ContractError> {
        let binding = self.binding.as_ref().ok_or(ContractError::NoBoundChannel)?;
        if binding.closed {
            return Err(ContractError::ChannelClosed(binding.channel_id.to_string()));
        }
        Ok(binding)
    }

    fn authenticate(
        &self,
        channel_id: &ChannelId,
        port_id: &PortId,
    ) -> Result<&ChannelBinding, ContractError> {
        match &self.binding {
            Some(binding) if binding.matches(channel_id, port_id) => Ok(binding),
            _ => {
                warn!(channel = %channel_id, port = %port_id, "Unauthenticated channel");
                Err(ContractError::Unauthorized)
            }
        }
    }

    fn ensure_unbound(&self) -> Result<(), ContractError> {
        match &self.binding {
            Some(_) => Err(ContractError::ChannelAlreadyBound),
            None => Ok(()),
        }
    }
}

fn check_order_and_version(
    channel: &IbcChannel,
    counterparty_version: Option<&str>,
) -> Result<(), ContractError> {
    if channel.order != ChannelOrder::Unordered {
        return Err(ContractError::InvalidChannelOrder);
    }
    for version in std::iter::once(channel.version.as_str()).chain(counterparty_version) {
        if version != IBC_APP_VERSION {
            return Err(ContractError::InvalidIbcVersion {
                expected: IBC_APP_VERSION.to_string(),
                actual: version.to_string(),
            });
        }
    }
    Ok(())
}
