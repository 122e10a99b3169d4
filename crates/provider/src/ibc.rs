//! Provider channel handshake, packet receipt and ack reconciliation.
//!
//! # Reconciliation
//!
//! | pending op       | success ack               | error ack / timeout                  |
//! |------------------|---------------------------|--------------------------------------|
//! | `ListValidators` | add validators            | ask again while the channel is open  |
//! | `Stake`          | move in-flight to staked  | drop in-flight, release lockup claim |
//! | `Unstake`        | confirm unbonding entry   | restore stake, drop unbonding entry  |

use crate::contract::ProviderContract;
use crate::state::{PendingOp, ValidatorState};
use mesh_core::{
    Action, ChannelConnectMsg, ChannelOpenMsg, ContractError, Env, IbcChannel, IbcPacket,
    Response,
};
use mesh_messages::lockup::ExecuteMsg as LockupExecuteMsg;
use mesh_messages::{
    from_binary, Acknowledgement, ConsumerPacket, ListValidatorsResponse, ProviderPacket,
    RewardsAck, ValidatorReward,
};
use mesh_types::{Addr, ChannelId, Uint128};
use tracing::{debug, info, warn};

impl ProviderContract {
    pub(crate) fn channel_open(&mut self, msg: &ChannelOpenMsg) -> Result<Response, ContractError> {
        self.auth.check_open(msg)?;
        Ok(Response::new().add_attribute("action", "channel_open"))
    }

    /// Bind the channel and ask the consumer for its validators.
    pub(crate) fn channel_connect(
        &mut self,
        env: &Env,
        msg: &ChannelConnectMsg,
    ) -> Result<Response, ContractError> {
        let channel_id = self.auth.connect(msg)?.channel_id.clone();
        let (_, send) =
            self.send_packet(env, &ProviderPacket::ListValidators {}, PendingOp::ListValidators)?;
        Ok(Response::new()
            .add_action(send)
            .add_attribute("action", "channel_connect")
            .add_attribute("channel", channel_id))
    }

    pub(crate) fn channel_close(&mut self, channel: &IbcChannel) -> Result<Response, ContractError> {
        self.auth.close(channel)?;
        Ok(Response::new().add_attribute("action", "channel_close"))
    }

    pub(crate) fn packet_receive(&mut self, packet: &IbcPacket) -> Result<Response, ContractError> {
        self.auth.authenticate_receive(packet)?;
        if let Some(ack) = self.packets.receipt(packet.sequence) {
            debug!(sequence = %packet.sequence, "Duplicate packet, replaying ack");
            return Ok(Response::new()
                .set_ack(ack.clone())
                .add_attribute("action", "duplicate_packet"));
        }

        let ack = match from_binary::<ConsumerPacket>(&packet.data) {
            Ok(ConsumerPacket::ClaimRewards {
                rewards_by_validator,
                denom,
                transfer_channel,
            }) => self.credit_rewards(rewards_by_validator, &denom, &transfer_channel)?,
            Err(e) => {
                warn!(sequence = %packet.sequence, error = %e, "Undecodable packet");
                Acknowledgement::error(e.to_string())
            }
        };
        self.packets.record_receipt(packet.sequence, ack.clone());
        Ok(Response::new()
            .set_ack(ack)
            .add_attribute("action", "receive_packet"))
    }

    /// Spread rewards over each validator's stakers.
    fn credit_rewards(
        &mut self,
        rewards: Vec<ValidatorReward>,
        denom: &str,
        transfer_channel: &ChannelId,
    ) -> Result<Acknowledgement, ContractError> {
        let mut credited = Uint128::zero();
        let mut updated = Vec::with_capacity(rewards.len());
        for reward in rewards {
            let mut state = self
                .validators
                .get(&reward.validator)
                .cloned()
                .unwrap_or_default();
            match state.distribute(reward.amount) {
                Ok(amount) => credited = credited.checked_add(amount)?,
                Err(e) => return Ok(Acknowledgement::error(e.to_string())),
            }
            updated.push((reward.validator, state));
        }
        for (validator, state) in updated {
            self.validators.insert(validator, state);
        }

        let voucher = format!("transfer/{transfer_channel}/{denom}");
        info!(%credited, denom = %voucher, "Rewards credited");
        self.rewards_denom = Some(voucher);
        Ok(Acknowledgement::success(&RewardsAck { credited })?)
    }

    pub(crate) fn packet_ack(
        &mut self,
        env: &Env,
        packet: &IbcPacket,
        ack: Acknowledgement,
    ) -> Result<Response, ContractError> {
        self.auth.authenticate_sent(packet)?;
        let Some(op) = self.packets.resolve(packet.sequence) else {
            return Ok(Response::new().add_attribute("action", "ignore_ack"));
        };

        match ack {
            Acknowledgement::Result(data) => self.confirm(packet, op, &data),
            Acknowledgement::Error(reason) => {
                warn!(
                    sequence = %packet.sequence,
                    op = op.type_name(),
                    %reason,
                    "Packet rejected by consumer"
                );
                self.roll_back(env, packet, op)
            }
        }
    }

    pub(crate) fn packet_timeout(
        &mut self,
        env: &Env,
        packet: &IbcPacket,
    ) -> Result<Response, ContractError> {
        self.auth.authenticate_sent(packet)?;
        let Some(op) = self.packets.resolve(packet.sequence) else {
            return Ok(Response::new().add_attribute("action", "ignore_timeout"));
        };
        warn!(sequence = %packet.sequence, op = op.type_name(), "Packet timed out");
        self.roll_back(env, packet, op)
    }

    fn confirm(
        &mut self,
        packet: &IbcPacket,
        op: PendingOp,
        data: &mesh_messages::Binary,
    ) -> Result<Response, ContractError> {
        match op {
            PendingOp::ListValidators => {
                let list: ListValidatorsResponse = from_binary(data)?;
                let mut added = 0usize;
                for validator in list.validators {
                    if !self.validators.contains_key(&validator) {
                        self.validators.insert(validator, ValidatorState::default());
                        added += 1;
                    }
                }
                info!(added, total = self.validators.len(), "Validator set updated");
            }
            PendingOp::Stake {
                owner,
                validator,
                amount,
                multiplier,
            } => {
                let mut state = self.validators.get(&validator).cloned().unwrap_or_default();
                let mut delegation = self.settled_delegation(&owner, &validator)?;
                delegation.in_flight = delegation.in_flight.checked_sub(amount)?;
                delegation.add_stake(amount, multiplier, state.multiplier)?;
                state.in_flight = state.in_flight.checked_sub(amount)?;
                state.stake = state.stake.checked_add(amount)?;
                self.validators.insert(validator.clone(), state);
                self.store_delegation(&owner, &validator, delegation);
                debug!(owner = %owner, validator = %validator, %amount, "Cross-stake confirmed");
            }
            PendingOp::Unstake {
                owner, validator, ..
            } => {
                if let Some(entries) = self.unbonding.get_mut(&owner) {
                    for entry in entries.iter_mut().filter(|e| e.sequence == packet.sequence) {
                        entry.confirmed = true;
                    }
                }
                debug!(owner = %owner, validator = %validator, "Undelegation confirmed");
            }
        }
        Ok(Response::new()
            .add_attribute("action", "ack")
            .add_attribute("sequence", packet.sequence.0))
    }

    /// Undo the optimistic effect of a failed packet.
    fn roll_back(
        &mut self,
        env: &Env,
        packet: &IbcPacket,
        op: PendingOp,
    ) -> Result<Response, ContractError> {
        let mut response = Response::new()
            .add_attribute("action", "rollback")
            .add_attribute("sequence", packet.sequence.0);

        match op {
            PendingOp::ListValidators => {
                if self.auth.sendable().is_ok() {
                    let (_, send) = self.send_packet(
                        env,
                        &ProviderPacket::ListValidators {},
                        PendingOp::ListValidators,
                    )?;
                    response = response.add_action(send);
                }
            }
            PendingOp::Stake {
                owner,
                validator,
                amount,
                ..
            } => {
                let mut delegation = self.settled_delegation(&owner, &validator)?;
                delegation.in_flight = delegation.in_flight.checked_sub(amount)?;
                let mut state = self.validators.get(&validator).cloned().unwrap_or_default();
                state.in_flight = state.in_flight.checked_sub(amount)?;
                self.validators.insert(validator.clone(), state);
                self.store_delegation(&owner, &validator, delegation);

                info!(owner = %owner, validator = %validator, %amount, "Cross-stake rolled back");
                response = response.add_action(self.release_claim(&owner, &validator, amount)?);
            }
            PendingOp::Unstake {
                owner,
                validator,
                amount,
                multiplier,
            } => {
                let mut state = self.validators.get(&validator).cloned().unwrap_or_default();
                let mut delegation = self.settled_delegation(&owner, &validator)?;
                delegation.add_stake(amount, multiplier, state.multiplier)?;
                state.stake = state.stake.checked_add(amount)?;
                self.validators.insert(validator.clone(), state);
                self.store_delegation(&owner, &validator, delegation);

                if let Some(mut entries) = self.unbonding.get(&owner).cloned() {
                    entries.retain(|e| e.sequence != packet.sequence);
                    if entries.is_empty() {
                        self.unbonding.remove(&owner);
                    } else {
                        self.unbonding.insert(owner.clone(), entries);
                    }
                }
                info!(owner = %owner, validator = %validator, %amount, "Unstake rolled back");
            }
        }
        Ok(response)
    }

    fn release_claim(
        &self,
        owner: &Addr,
        validator: &str,
        amount: Uint128,
    ) -> Result<Action, ContractError> {
        Ok(Action::execute(
            &self.config.lockup,
            &LockupExecuteMsg::ReleaseClaim {
                owner: owner.to_string(),
                amount,
                validator: validator.to_string(),
            },
            vec![],
        )?)
    }
}
