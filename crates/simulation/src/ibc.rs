//! IBC host state: connections, channel ends, commitments and receipts.
//!
//! The host enforces what a real chain's IBC module enforces: packets can
//! only be sent on an open channel end owned by the sender's port, send
//! sequences are strictly consecutive, and an ack or timeout is only
//! accepted against a stored commitment, which it then clears.
//!
//! Receipts are recorded for every delivery but duplicates are not filtered:
//! each redelivery reaches the application, which must replay its own ack.

use crate::HostError;
use im::{OrdMap, OrdSet, Vector};
use mesh_core::{ChannelOrder, IbcChannel, IbcEndpoint, IbcPacket};
use mesh_messages::Binary;
use mesh_types::{ChannelId, ConnectionId, Hash, PortId, Sequence, Timestamp};
use tracing::debug;

/// Handshake progress of a channel end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Init,
    TryOpen,
    Open,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelEnd {
    pub state: ChannelState,
    pub order: ChannelOrder,
    pub version: String,
    pub connection_id: ConnectionId,
    /// The counterparty channel id is empty until the handshake reveals it.
    pub counterparty: IbcEndpoint,
    pub next_sequence_send: Sequence,
}

impl ChannelEnd {
    /// The channel as handed to application callbacks.
    pub fn describe(&self, port_id: &PortId, channel_id: &ChannelId) -> IbcChannel {
        IbcChannel {
            endpoint: IbcEndpoint {
                port_id: port_id.clone(),
                channel_id: channel_id.clone(),
            },
            counterparty_endpoint: self.counterparty.clone(),
            order: self.order,
            version: self.version.clone(),
            connection_id: self.connection_id.clone(),
        }
    }
}

type PacketKey = (PortId, ChannelId, Sequence);

#[derive(Debug, Clone, Default)]
pub struct IbcHost {
    /// Connection id to counterparty chain id.
    connections: OrdMap<ConnectionId, String>,
    channels: OrdMap<(PortId, ChannelId), ChannelEnd>,
    next_channel: u64,
    commitments: OrdMap<PacketKey, Hash>,
    receipts: OrdSet<PacketKey>,
    /// Sent packets not yet picked up by a relayer.
    outbox: Vector<IbcPacket>,
}

fn commitment(packet: &IbcPacket) -> Hash {
    Hash::from_parts(&[
        packet.dest.port_id.as_str().as_bytes(),
        packet.dest.channel_id.as_str().as_bytes(),
        &packet.timeout.nanos().to_be_bytes(),
        packet.data.as_slice(),
    ])
}

impl IbcHost {
    pub fn open_connection(&mut self, counterparty_chain: &str) -> ConnectionId {
        let id = ConnectionId::new(format!("connection-{}", self.connections.len()));
        self.connections
            .insert(id.clone(), counterparty_chain.to_string());
        id
    }

    pub fn connection(&self, id: &ConnectionId) -> Result<&str, HostError> {
        self.connections
            .get(id)
            .map(String::as_str)
            .ok_or_else(|| HostError::UnknownConnection(id.clone()))
    }

    pub fn channel(&self, port_id: &PortId, channel_id: &ChannelId) -> Option<&ChannelEnd> {
        self.channels.get(&(port_id.clone(), channel_id.clone()))
    }

    pub fn channel_in_state(
        &self,
        port_id: &PortId,
        channel_id: &ChannelId,
        state: ChannelState,
    ) -> Result<&ChannelEnd, HostError> {
        let end = self
            .channel(port_id, channel_id)
            .ok_or_else(|| HostError::UnknownChannel {
                port: port_id.clone(),
                channel: channel_id.clone(),
            })?;
        if end.state != state {
            return Err(match state {
                ChannelState::Open => HostError::ChannelNotOpen(channel_id.clone()),
                _ => HostError::HandshakeState(channel_id.clone()),
            });
        }
        Ok(end)
    }

    /// Register a new channel end and return its id.
    pub fn create_channel(&mut self, port_id: &PortId, end: ChannelEnd) -> ChannelId {
        let channel_id = ChannelId::from_index(self.next_channel);
        self.next_channel += 1;
        self.channels
            .insert((port_id.clone(), channel_id.clone()), end);
        channel_id
    }

    pub fn update_channel(&mut self, port_id: &PortId, channel_id: &ChannelId, end: ChannelEnd) {
        self.channels
            .insert((port_id.clone(), channel_id.clone()), end);
    }

    /// All channel ends on a port.
    pub fn channels_on_port(&self, port_id: &PortId) -> Vec<(ChannelId, ChannelEnd)> {
        self.channels
            .iter()
            .filter(|((port, _), _)| port == port_id)
            .map(|((_, channel), end)| (channel.clone(), end.clone()))
            .collect()
    }

    /// Commit a packet and queue it for relaying.
    pub fn send_packet(
        &mut self,
        port_id: &PortId,
        channel_id: &ChannelId,
        sequence: Sequence,
        data: Binary,
        timeout: Timestamp,
    ) -> Result<IbcPacket, HostError> {
        let mut end = self
            .channel_in_state(port_id, channel_id, ChannelState::Open)?
            .clone();
        if sequence != end.next_sequence_send {
            return Err(HostError::SequenceMismatch {
                channel: channel_id.clone(),
                expected: end.next_sequence_send,
                actual: sequence,
            });
        }
        let packet = IbcPacket {
            data,
            src: IbcEndpoint {
                port_id: port_id.clone(),
                channel_id: channel_id.clone(),
            },
            dest: end.counterparty.clone(),
            sequence,
            timeout,
        };
        end.next_sequence_send = sequence.next();
        self.update_channel(port_id, channel_id, end);
        self.commitments.insert(
            (port_id.clone(), channel_id.clone(), sequence),
            commitment(&packet),
        );
        self.outbox.push_back(packet.clone());
        debug!(port = %port_id, channel = %channel_id, %sequence, "Packet committed");
        Ok(packet)
    }

    /// Check a relayed packet against its commitment and clear it.
    pub fn take_commitment(&mut self, packet: &IbcPacket) -> Result<(), HostError> {
        let key = (
            packet.src.port_id.clone(),
            packet.src.channel_id.clone(),
            packet.sequence,
        );
        match self.commitments.get(&key) {
            Some(stored) if *stored == commitment(packet) => {
                self.commitments.remove(&key);
                Ok(())
            }
            _ => Err(HostError::UnknownCommitment {
                channel: packet.src.channel_id.clone(),
                sequence: packet.sequence,
            }),
        }
    }

    pub fn has_commitment(&self, packet: &IbcPacket) -> bool {
        self.commitments
            .get(&(
                packet.src.port_id.clone(),
                packet.src.channel_id.clone(),
                packet.sequence,
            ))
            .is_some_and(|stored| *stored == commitment(packet))
    }

    pub fn pending_commitments(&self) -> usize {
        self.commitments.len()
    }

    pub fn record_receipt(&mut self, packet: &IbcPacket) {
        self.receipts.insert((
            packet.dest.port_id.clone(),
            packet.dest.channel_id.clone(),
            packet.sequence,
        ));
    }

    pub fn has_receipt(&self, packet: &IbcPacket) -> bool {
        self.receipts.contains(&(
            packet.dest.port_id.clone(),
            packet.dest.channel_id.clone(),
            packet.sequence,
        ))
    }

    /// Remove and return queued packets sent over `connection_id`.
    pub fn drain_outbox(&mut self, connection_id: &ConnectionId) -> Vec<IbcPacket> {
        let mut matching = Vec::new();
        let mut rest = Vector::new();
        for packet in self.outbox.iter().cloned() {
            let on_connection = self
                .channels
                .get(&(packet.src.port_id.clone(), packet.src.channel_id.clone()))
                .is_some_and(|end| &end.connection_id == connection_id);
            if on_connection {
                matching.push(packet);
            } else {
                rest.push_back(packet);
            }
        }
        self.outbox = rest;
        matching
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_end(connection_id: &ConnectionId) -> ChannelEnd {
        ChannelEnd {
            state: ChannelState::Open,
            order: ChannelOrder::Unordered,
            version: "mesh-security-v0.1".into(),
            connection_id: connection_id.clone(),
            counterparty: IbcEndpoint {
                port_id: PortId::new("wasm.juno1consumer"),
                channel_id: ChannelId::new("channel-0"),
            },
            next_sequence_send: Sequence::FIRST,
        }
    }

    #[test]
    fn test_send_checks_sequence_and_commits() {
        let mut host = IbcHost::default();
        let connection = host.open_connection("juno-1");
        let port = PortId::new("wasm.osmo1provider");
        let channel = host.create_channel(&port, open_end(&connection));

        let err = host
            .send_packet(
                &port,
                &channel,
                Sequence(2),
                Binary::default(),
                Timestamp::from_seconds(10),
            )
            .unwrap_err();
        assert!(matches!(err, HostError::SequenceMismatch { .. }));

        let packet = host
            .send_packet(
                &port,
                &channel,
                Sequence(1),
                Binary::from(b"{}".to_vec()),
                Timestamp::from_seconds(10),
            )
            .unwrap();
        assert!(host.has_commitment(&packet));

        let drained = host.drain_outbox(&connection);
        assert_eq!(drained, vec![packet.clone()]);
        assert!(host.drain_outbox(&connection).is_empty());

        // A tampered packet does not match the commitment
        let mut forged = packet.clone();
        forged.data = Binary::from(b"[]".to_vec());
        assert!(host.take_commitment(&forged).is_err());

        host.take_commitment(&packet).unwrap();
        assert!(matches!(
            host.take_commitment(&packet),
            Err(HostError::UnknownCommitment { .. })
        ));
    }

    #[test]
    fn test_closed_channel_refuses_send() {
        let mut host = IbcHost::default();
        let connection = host.open_connection("juno-1");
        let port = PortId::new("wasm.osmo1provider");
        let mut end = open_end(&connection);
        end.state = ChannelState::Closed;
        let channel = host.create_channel(&port, end);

        let err = host
            .send_packet(
                &port,
                &channel,
                Sequence(1),
                Binary::default(),
                Timestamp::from_seconds(10),
            )
            .unwrap_err();
        assert_eq!(err, HostError::ChannelNotOpen(channel));
    }
}
