//! Consumer channel handshake and packet handling.

use crate::contract::ConsumerContract;
use crate::state::{InflightOp, StakeKind};
use mesh_core::{
    Action, ChannelConnectMsg, ChannelOpenMsg, ContractError, IbcChannel, IbcPacket, Querier,
    Response, SubMsg,
};
use mesh_messages::meta_staking::ExecuteMsg as MetaStakingExecuteMsg;
use mesh_messages::{
    from_binary, Acknowledgement, ListValidatorsResponse, ProviderPacket, StakeAck,
};
use mesh_types::Uint128;
use tracing::{debug, info, warn};

impl ConsumerContract {
    pub(crate) fn channel_open(&mut self, msg: &ChannelOpenMsg) -> Result<Response, ContractError> {
        self.auth.check_open(msg)?;
        Ok(Response::new().add_attribute("action", "channel_open"))
    }

    pub(crate) fn channel_connect(
        &mut self,
        msg: &ChannelConnectMsg,
    ) -> Result<Response, ContractError> {
        let channel_id = self.auth.connect(msg)?.channel_id.clone();
        Ok(Response::new()
            .add_attribute("action", "channel_connect")
            .add_attribute("channel", channel_id))
    }

    pub(crate) fn channel_close(&mut self, channel: &IbcChannel) -> Result<Response, ContractError> {
        self.auth.close(channel)?;
        Ok(Response::new().add_attribute("action", "channel_close"))
    }

    /// Apply a provider packet. Staking packets are acknowledged from the
    /// meta-staking reply; everything else is acknowledged here.
    pub(crate) fn packet_receive(
        &mut self,
        querier: &dyn Querier,
        packet: &IbcPacket,
    ) -> Result<Response, ContractError> {
        self.auth.authenticate_receive(packet)?;
        if let Some(ack) = self.packets.receipt(packet.sequence) {
            debug!(sequence = %packet.sequence, "Duplicate packet, replaying ack");
            return Ok(Response::new()
                .set_ack(ack.clone())
                .add_attribute("action", "duplicate_packet"));
        }

        let msg: ProviderPacket = match from_binary(&packet.data) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(sequence = %packet.sequence, error = %e, "Undecodable packet");
                return Ok(self.finish(packet, Acknowledgement::error(e.to_string())));
            }
        };
        debug!(sequence = %packet.sequence, packet = msg.type_name(), "Received packet");

        match msg {
            ProviderPacket::ListValidators {} => {
                let validators = querier.validators();
                info!(count = validators.len(), "Reporting validator set");
                let ack = Acknowledgement::success(&ListValidatorsResponse { validators })?;
                Ok(self.finish(packet, ack))
            }
            ProviderPacket::Stake {
                key,
                validator,
                amount,
            } => self.apply_stake(packet, StakeKind::Stake, key, validator, amount),
            ProviderPacket::Unstake {
                key,
                validator,
                amount,
            } => self.apply_stake(packet, StakeKind::Unstake, key, validator, amount),
        }
    }

    fn finish(&mut self, packet: &IbcPacket, ack: Acknowledgement) -> Response {
        self.packets.record_receipt(packet.sequence, ack.clone());
        Response::new()
            .set_ack(ack)
            .add_attribute("action", "receive_packet")
    }

    /// Stake and unstake convert the running provider-unit total of the
    /// (key, validator) position, and meta-staking moves the difference.
    fn apply_stake(
        &mut self,
        packet: &IbcPacket,
        kind: StakeKind,
        key: String,
        validator: String,
        amount: Uint128,
    ) -> Result<Response, ContractError> {
        let rate = self.config.remote_to_local_exchange_rate;
        let current = self.position(&key, &validator);

        let moved = match kind {
            StakeKind::Stake => current
                .staked(amount, rate)
                .and_then(|next| Ok((next, next.local.checked_sub(current.local)?))),
            StakeKind::Unstake if amount > current.remote => {
                Err(ContractError::InsufficientClaim {
                    available: current.remote,
                    requested: amount,
                })
            }
            StakeKind::Unstake => current
                .unstaked(amount, rate)
                .and_then(|next| Ok((next, current.local.checked_sub(next.local)?))),
        };
        let (position, local_amount) = match moved {
            Ok(moved) => moved,
            Err(e) => return Ok(self.finish(packet, Acknowledgement::error(e.to_string()))),
        };

        if local_amount.is_zero() {
            if kind == StakeKind::Stake {
                let reason = format!("Amount {amount} converts to zero");
                return Ok(self.finish(packet, Acknowledgement::error(reason)));
            }
            // Only rounding dust leaves; nothing to undelegate
            debug!(
                sequence = %packet.sequence,
                %key,
                %validator,
                %amount,
                "Unstake below one local unit"
            );
            self.set_position(key, validator, position);
            let ack = Acknowledgement::success(&StakeAck { local_amount })?;
            return Ok(self.finish(packet, ack));
        }

        let msg = match kind {
            StakeKind::Stake => MetaStakingExecuteMsg::Delegate {
                validator: validator.clone(),
                amount: local_amount,
            },
            StakeKind::Unstake => MetaStakingExecuteMsg::Undelegate {
                validator: validator.clone(),
                amount: local_amount,
            },
        };

        let id = packet.sequence.0;
        self.inflight.insert(
            id,
            InflightOp {
                sequence: packet.sequence,
                kind,
                key,
                validator,
                position,
                local_amount,
            },
        );
        let call = Action::execute(&self.config.meta_staking, &msg, vec![])?;
        Ok(Response::new()
            .add_submessage(SubMsg::reply_always(id, call))
            .add_attribute("action", "receive_packet")
            .add_attribute("local_amount", local_amount))
    }

    pub(crate) fn packet_ack(
        &mut self,
        packet: &IbcPacket,
        ack: Acknowledgement,
    ) -> Result<Response, ContractError> {
        self.auth.authenticate_sent(packet)?;
        let Some(pending) = self.packets.resolve(packet.sequence) else {
            return Ok(Response::new().add_attribute("action", "ignore_ack"));
        };
        match ack {
            Acknowledgement::Result(_) => {
                debug!(sequence = %packet.sequence, "Rewards packet acknowledged");
            }
            Acknowledgement::Error(reason) => {
                warn!(sequence = %packet.sequence, %reason, "Rewards packet rejected, parking");
                self.park(pending.rewards)?;
            }
        }
        Ok(Response::new().add_attribute("action", "ack"))
    }

    pub(crate) fn packet_timeout(&mut self, packet: &IbcPacket) -> Result<Response, ContractError> {
        self.auth.authenticate_sent(packet)?;
        if let Some(pending) = self.packets.resolve(packet.sequence) {
            warn!(sequence = %packet.sequence, "Rewards packet timed out, parking");
            self.park(pending.rewards)?;
        }
        Ok(Response::new().add_attribute("action", "timeout"))
    }
}
