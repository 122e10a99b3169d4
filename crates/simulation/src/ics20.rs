//! ICS20 fungible token transfers on the `transfer` port.
//!
//! Native tokens are escrowed on send and arrive as vouchers named
//! `transfer/<dest channel>/<denom>`. Vouchers travelling back are burned on
//! send and released from escrow on arrival. A failed or timed-out transfer
//! refunds the sender.

use crate::bank::Bank;
use crate::HostError;
use im::OrdMap;
use mesh_core::IbcPacket;
use mesh_messages::{from_binary, to_binary, Acknowledgement, Binary};
use mesh_types::{coin, Addr, ChannelId, Coin, Sequence, Uint128};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const ICS20_VERSION: &str = "ics20-1";

/// Packet payload of a transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ics20Packet {
    /// Denom as held on the sending chain.
    pub denom: String,
    pub amount: Uint128,
    pub sender: String,
    pub receiver: String,
}

pub fn voucher_denom(channel: &ChannelId, denom: &str) -> String {
    format!("transfer/{channel}/{denom}")
}

pub fn escrow_address(channel: &ChannelId) -> Addr {
    Addr::unchecked(format!("transfer-escrow/{channel}"))
}

#[derive(Debug, Clone, Default)]
pub struct Ics20 {
    /// Acks already written, replayed on redelivery.
    received: OrdMap<(ChannelId, Sequence), Acknowledgement>,
}

impl Ics20 {
    /// Take the funds from `sender` and encode the packet payload.
    pub fn send(
        &self,
        bank: &mut Bank,
        sender: &Addr,
        channel: &ChannelId,
        amount: &Coin,
        receiver: String,
    ) -> Result<Binary, HostError> {
        if amount.amount.is_zero() {
            return Err(HostError::Transfer("zero amount".into()));
        }
        if receiver.is_empty() {
            return Err(HostError::Transfer("empty receiver".into()));
        }
        let returning = format!("transfer/{channel}/");
        if amount.denom.starts_with(&returning) {
            bank.burn(sender, amount)?;
        } else {
            bank.send(sender, &escrow_address(channel), std::slice::from_ref(amount))?;
        }
        Ok(to_binary(&Ics20Packet {
            denom: amount.denom.clone(),
            amount: amount.amount,
            sender: sender.to_string(),
            receiver,
        })?)
    }

    pub fn receive(&mut self, bank: &mut Bank, packet: &IbcPacket) -> Acknowledgement {
        let key = (packet.dest.channel_id.clone(), packet.sequence);
        if let Some(ack) = self.received.get(&key) {
            debug!(sequence = %packet.sequence, "Duplicate transfer, replaying ack");
            return ack.clone();
        }
        let ack = match Self::credit(bank, packet) {
            Ok(()) => Acknowledgement::Result(Binary::from(vec![1])),
            Err(e) => {
                warn!(sequence = %packet.sequence, error = %e, "Transfer rejected");
                Acknowledgement::error(e.to_string())
            }
        };
        self.received.insert(key, ack.clone());
        ack
    }

    fn credit(bank: &mut Bank, packet: &IbcPacket) -> Result<(), HostError> {
        let data: Ics20Packet = from_binary(&packet.data)?;
        let receiver = Addr::unchecked(data.receiver);
        let origin = format!("transfer/{}/", packet.src.channel_id);
        match data.denom.strip_prefix(&origin) {
            Some(base) => bank.send(
                &escrow_address(&packet.dest.channel_id),
                &receiver,
                &[coin(data.amount.u128(), base)],
            ),
            None => {
                let voucher = voucher_denom(&packet.dest.channel_id, &data.denom);
                debug!(%receiver, denom = %voucher, amount = %data.amount, "Minting voucher");
                bank.mint(&receiver, &coin(data.amount.u128(), voucher))
            }
        }
    }

    pub fn on_ack(
        &self,
        bank: &mut Bank,
        packet: &IbcPacket,
        ack: &Acknowledgement,
    ) -> Result<(), HostError> {
        if ack.is_success() {
            return Ok(());
        }
        self.refund(bank, packet)
    }

    pub fn refund(&self, bank: &mut Bank, packet: &IbcPacket) -> Result<(), HostError> {
        let data: Ics20Packet = from_binary(&packet.data)?;
        let sender = Addr::unchecked(data.sender);
        let coin = coin(data.amount.u128(), data.denom.clone());
        let returning = format!("transfer/{}/", packet.src.channel_id);
        if data.denom.starts_with(&returning) {
            bank.mint(&sender, &coin)?;
        } else {
            bank.send(
                &escrow_address(&packet.src.channel_id),
                &sender,
                std::slice::from_ref(&coin),
            )?;
        }
        debug!(%sender, denom = %coin.denom, amount = %coin.amount, "Transfer refunded");
        Ok(())
    }
}
