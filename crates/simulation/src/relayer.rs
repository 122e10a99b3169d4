//! Relayer between two chains over one connection.
//!
//! `relay_all` drains both chains' outboxes and keeps delivering until no
//! new packets or acks appear. Each delivery round passes through the
//! [`SimulatedNetwork`], which may hold items back for the next call,
//! duplicate them or shuffle the round.
//!
//! ```text
//!   chain A outbox ──packet──▶ chain B receive ──ack──▶ chain A acknowledge
//!        ▲                          │
//!        └──── timeout (expired or channel closed) ◀┘
//! ```

use crate::network::{Fate, NetworkConfig, NetworkStats, SimulatedNetwork};
use crate::{Chain, HostError};
use mesh_core::{ChannelOrder, IbcEndpoint, IbcPacket};
use mesh_messages::Acknowledgement;
use mesh_types::{ConnectionId, PortId};
use tracing::{debug, info};

/// Counts of what one `relay_all` call delivered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayInfo {
    pub packets_from_a: usize,
    pub packets_from_b: usize,
    pub acks_from_a: usize,
    pub acks_from_b: usize,
    pub timeouts: usize,
}

impl RelayInfo {
    pub fn is_empty(&self) -> bool {
        *self == RelayInfo::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    A,
    B,
}

impl Side {
    fn other(self) -> Side {
        match self {
            Side::A => Side::B,
            Side::B => Side::A,
        }
    }
}

/// Both ends of a channel created by [`Link::create_channel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelPair {
    pub a: IbcEndpoint,
    pub b: IbcEndpoint,
}

#[derive(Debug, Clone)]
enum Transit {
    Packet {
        from: Side,
        packet: IbcPacket,
    },
    /// `from` is the chain that wrote the ack.
    Ack {
        from: Side,
        packet: IbcPacket,
        ack: Acknowledgement,
    },
}

pub struct Link {
    chain_a: String,
    chain_b: String,
    connection_a: ConnectionId,
    connection_b: ConnectionId,
    network: SimulatedNetwork,
    /// Items held back by the network, retried on the next pass.
    backlog: Vec<Transit>,
}

/// `(side, other side)` as mutable references.
fn pick<'c>(side: Side, a: &'c mut Chain, b: &'c mut Chain) -> (&'c mut Chain, &'c mut Chain) {
    match side {
        Side::A => (a, b),
        Side::B => (b, a),
    }
}

impl Link {
    /// Open a connection between `a` and `b`.
    pub fn connect(a: &mut Chain, b: &mut Chain, network: NetworkConfig) -> Self {
        let connection_a = a.open_connection(b.chain_id());
        let connection_b = b.open_connection(a.chain_id());
        info!(
            chain_a = %a.chain_id(),
            chain_b = %b.chain_id(),
            %connection_a,
            %connection_b,
            "Connection opened"
        );
        Self {
            chain_a: a.chain_id().to_string(),
            chain_b: b.chain_id().to_string(),
            connection_a,
            connection_b,
            network: SimulatedNetwork::new(network),
            backlog: Vec::new(),
        }
    }

    pub fn connection_a(&self) -> &ConnectionId {
        &self.connection_a
    }

    pub fn connection_b(&self) -> &ConnectionId {
        &self.connection_b
    }

    pub fn set_network(&mut self, config: NetworkConfig) {
        self.network.set_config(config);
    }

    pub fn network_stats(&self) -> NetworkStats {
        self.network.stats()
    }

    /// Items held back by the network.
    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    fn check(&self, a: &Chain, b: &Chain) -> Result<(), HostError> {
        for (expected, chain) in [(&self.chain_a, a), (&self.chain_b, b)] {
            if expected != chain.chain_id() {
                return Err(HostError::WrongChain {
                    expected: expected.clone(),
                    actual: chain.chain_id().to_string(),
                });
            }
        }
        Ok(())
    }

    /// Run the four-step handshake, initiated by `port_a` on chain A.
    pub fn create_channel(
        &mut self,
        a: &mut Chain,
        b: &mut Chain,
        port_a: &PortId,
        port_b: &PortId,
        version: &str,
        order: ChannelOrder,
    ) -> Result<ChannelPair, HostError> {
        self.check(a, b)?;
        let channel_a = a.chan_open_init(port_a, &self.connection_a, port_b, version, order)?;
        let endpoint_a = IbcEndpoint {
            port_id: port_a.clone(),
            channel_id: channel_a.clone(),
        };
        let channel_b = b.chan_open_try(port_b, &self.connection_b, &endpoint_a, version, order)?;
        a.chan_open_ack(port_a, &channel_a, &channel_b, version)?;
        b.chan_open_confirm(port_b, &channel_b)?;
        info!(%port_a, %channel_a, %port_b, %channel_b, "Channel open");
        Ok(ChannelPair {
            a: endpoint_a,
            b: IbcEndpoint {
                port_id: port_b.clone(),
                channel_id: channel_b,
            },
        })
    }

    /// Close a channel from the A side and confirm on B. Packets still in
    /// flight on it time out on the next relay.
    pub fn close_channel(
        &mut self,
        a: &mut Chain,
        b: &mut Chain,
        channel: &ChannelPair,
    ) -> Result<(), HostError> {
        self.check(a, b)?;
        a.chan_close(&channel.a.port_id, &channel.a.channel_id)?;
        b.chan_close(&channel.b.port_id, &channel.b.channel_id)?;
        Ok(())
    }

    /// Relay until both chains are quiet.
    pub fn relay_all(&mut self, a: &mut Chain, b: &mut Chain) -> Result<RelayInfo, HostError> {
        self.check(a, b)?;
        let mut info = RelayInfo::default();
        let mut round = std::mem::take(&mut self.backlog);

        loop {
            round.extend(
                a.drain_packets(&self.connection_a)
                    .into_iter()
                    .map(|packet| Transit::Packet {
                        from: Side::A,
                        packet,
                    }),
            );
            round.extend(
                b.drain_packets(&self.connection_b)
                    .into_iter()
                    .map(|packet| Transit::Packet {
                        from: Side::B,
                        packet,
                    }),
            );
            if round.is_empty() {
                break;
            }

            self.network.maybe_reorder(&mut round);
            let mut produced = Vec::new();
            for item in std::mem::take(&mut round) {
                match self.network.fate() {
                    Fate::Drop => self.backlog.push(item),
                    Fate::Deliver => deliver(a, b, item, &mut produced, &mut info)?,
                    Fate::Duplicate => {
                        deliver(a, b, item.clone(), &mut produced, &mut info)?;
                        deliver(a, b, item, &mut produced, &mut info)?;
                    }
                }
            }
            round = produced;
        }

        debug!(?info, backlog = self.backlog.len(), "Relay pass finished");
        Ok(info)
    }
}

fn deliver(
    a: &mut Chain,
    b: &mut Chain,
    item: Transit,
    produced: &mut Vec<Transit>,
    info: &mut RelayInfo,
) -> Result<(), HostError> {
    match item {
        Transit::Packet { from, packet } => {
            let (src, dest) = pick(from, a, b);
            if !src.has_commitment(&packet) {
                debug!(sequence = %packet.sequence, "Packet already resolved, skipping");
                return Ok(());
            }
            if dest.packet_expired(&packet) {
                src.timeout_packet(&packet)?;
                info.timeouts += 1;
                return Ok(());
            }
            let ack = match dest.receive_packet(&packet) {
                Ok(ack) => ack,
                // Redelivery of an already received packet whose ack is still in
                // flight; the channel has since closed or the deadline passed
                Err(e @ (HostError::ChannelNotOpen(_) | HostError::PacketTimedOut { .. })) => {
                    debug!(sequence = %packet.sequence, error = %e, "Redelivery dropped");
                    return Ok(());
                }
                Err(e) => return Err(e),
            };
            match from {
                Side::A => info.packets_from_a += 1,
                Side::B => info.packets_from_b += 1,
            }
            produced.push(Transit::Ack {
                from: from.other(),
                packet,
                ack,
            });
        }
        Transit::Ack { from, packet, ack } => {
            let (_, src) = pick(from, a, b);
            if !src.has_commitment(&packet) {
                debug!(sequence = %packet.sequence, "Ack for resolved packet, skipping");
                return Ok(());
            }
            src.acknowledge_packet(&packet, &ack)?;
            match from {
                Side::A => info.acks_from_a += 1,
                Side::B => info.acks_from_b += 1,
            }
        }
    }
    Ok(())
}
