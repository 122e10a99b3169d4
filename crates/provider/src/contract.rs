//! Provider contract: local entry points and queries.

use crate::state::{Delegation, PendingOp, UnbondingEntry, ValidatorState};
use im::OrdMap;
use mesh_core::{
    Action, ChannelAuth, Contract, ContractError, Env, Event, MessageInfo, PacketLedger,
    PeerRequirement, Querier, Response, SubMsg, DEFAULT_PACKET_LIFETIME,
};
use mesh_messages::lockup::ExecuteMsg as LockupExecuteMsg;
use mesh_messages::provider::{
    AccountResponse, ConfigResponse, ConsumerInfo, DelegationResponse, ExecuteMsg,
    InstantiateMsg, PendingPacketResponse, PendingPacketsResponse, QueryMsg, UnbondingResponse,
    ValidatorResponse, ValidatorsResponse,
};
use mesh_messages::{from_binary, to_binary, Binary, ProviderPacket};
use mesh_types::{coins, Addr, Decimal, Sequence, Timestamp, Uint128};
use tracing::{debug, info, warn};

/// Reply id of the slasher instantiation.
pub const SLASHER_REPLY_ID: u64 = 1;

const SLASHER_LABEL: &str = "mesh-slasher";
const DEFAULT_QUERY_LIMIT: u32 = 30;
const MAX_QUERY_LIMIT: u32 = 100;

/// Static configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub consumer: ConsumerInfo,
    pub lockup: Addr,
    pub unbonding_period: u64,
    pub packet_lifetime: u64,
}

/// Create a provider contract, and its slasher if one is configured.
pub fn instantiate(
    _env: &Env,
    _querier: &dyn Querier,
    _info: MessageInfo,
    msg: &Binary,
) -> Result<(Box<dyn Contract>, Response), ContractError> {
    let msg: InstantiateMsg = from_binary(msg)?;
    let config = Config {
        consumer: msg.consumer.clone(),
        lockup: Addr::unchecked(msg.lockup),
        unbonding_period: msg.unbonding_period,
        packet_lifetime: msg.packet_lifetime.unwrap_or(DEFAULT_PACKET_LIFETIME),
    };
    info!(
        connection = %config.consumer.connection_id,
        lockup = %config.lockup,
        unbonding_period = config.unbonding_period,
        "Provider instantiated"
    );

    let mut response = Response::new().add_attribute("action", "instantiate");
    if let Some(slasher) = msg.slasher {
        response = response.add_submessage(SubMsg::reply_on_success(
            SLASHER_REPLY_ID,
            Action::Instantiate {
                code_id: slasher.code_id,
                msg: slasher.msg,
                label: SLASHER_LABEL.to_string(),
            },
        ));
    }

    let contract = ProviderContract {
        auth: ChannelAuth::new(PeerRequirement::Responder {
            connection_id: config.consumer.connection_id.clone(),
        }),
        config,
        slasher: None,
        packets: PacketLedger::new(),
        validators: OrdMap::new(),
        delegations: OrdMap::new(),
        unbonding: OrdMap::new(),
        rewards_denom: None,
    };
    Ok((Box::new(contract), response))
}

/// Provider half of the cross-stake engine.
///
/// A granted claim is held as in-flight stake until the consumer
/// acknowledges the packet; only then does it count toward rewards.
#[derive(Debug, Clone)]
pub struct ProviderContract {
    pub(crate) config: Config,
    pub(crate) slasher: Option<Addr>,
    pub(crate) auth: ChannelAuth,
    pub(crate) packets: PacketLedger<PendingOp>,
    pub(crate) validators: OrdMap<String, ValidatorState>,
    pub(crate) delegations: OrdMap<(Addr, String), Delegation>,
    pub(crate) unbonding: OrdMap<Addr, Vec<UnbondingEntry>>,
    /// ICS20 voucher denom of the rewards, learned from reward packets.
    pub(crate) rewards_denom: Option<String>,
}

impl ProviderContract {
    fn execute(
        &mut self,
        env: &Env,
        querier: &dyn Querier,
        info: MessageInfo,
        msg: ExecuteMsg,
    ) -> Result<Response, ContractError> {
        match msg {
            ExecuteMsg::ReceiveClaim {
                owner,
                amount,
                validator,
            } => self.receive_claim(env, info, Addr::unchecked(owner), amount, validator),
            ExecuteMsg::Unstake { amount, validator } => {
                self.unstake(env, info, amount, validator)
            }
            ExecuteMsg::Unbond {} => self.unbond(env, info),
            ExecuteMsg::ClaimRewards { validator } => {
                self.claim_rewards(env, querier, info, validator)
            }
            ExecuteMsg::Slash {
                validator,
                percentage,
            } => self.slash(info, validator, percentage),
        }
    }

    /// Build a packet action on the bound channel, recording `op` as pending.
    pub(crate) fn send_packet(
        &mut self,
        env: &Env,
        packet: &ProviderPacket,
        op: PendingOp,
    ) -> Result<(Sequence, Action), ContractError> {
        let channel_id = self.auth.sendable()?.channel_id.clone();
        let data = to_binary(packet)?;
        let sequence = self.packets.send(op);
        debug!(
            channel = %channel_id,
            %sequence,
            packet = packet.type_name(),
            "Sending packet"
        );
        let action = Action::SendPacket {
            channel_id,
            sequence,
            data,
            timeout: env.block.time.plus_seconds(self.config.packet_lifetime),
        };
        Ok((sequence, action))
    }

    /// Delegation with rewards settled up to the current index.
    pub(crate) fn settled_delegation(
        &self,
        owner: &Addr,
        validator: &str,
    ) -> Result<Delegation, ContractError> {
        let index = self
            .validators
            .get(validator)
            .map(|v| v.reward_index)
            .unwrap_or_default();
        let mut delegation = self
            .delegations
            .get(&(owner.clone(), validator.to_string()))
            .cloned()
            .unwrap_or_default();
        delegation.settle(index)?;
        Ok(delegation)
    }

    pub(crate) fn store_delegation(&mut self, owner: &Addr, validator: &str, delegation: Delegation) {
        let key = (owner.clone(), validator.to_string());
        if delegation.is_empty() {
            self.delegations.remove(&key);
        } else {
            self.delegations.insert(key, delegation);
        }
    }

    fn receive_claim(
        &mut self,
        env: &Env,
        info: MessageInfo,
        owner: Addr,
        amount: Uint128,
        validator: String,
    ) -> Result<Response, ContractError> {
        if info.sender != self.config.lockup {
            return Err(ContractError::Unauthorized);
        }
        let mut validator_state = self
            .validators
            .get(&validator)
            .cloned()
            .ok_or_else(|| ContractError::UnknownValidator(validator.clone()))?;

        let mut delegation = self.settled_delegation(&owner, &validator)?;
        delegation.in_flight = delegation.in_flight.checked_add(amount)?;
        validator_state.in_flight = validator_state.in_flight.checked_add(amount)?;

        let packet = ProviderPacket::Stake {
            key: owner.to_string(),
            validator: validator.clone(),
            amount,
        };
        let op = PendingOp::Stake {
            owner: owner.clone(),
            validator: validator.clone(),
            amount,
            multiplier: validator_state.multiplier,
        };
        let (_, send) = self.send_packet(env, &packet, op)?;

        info!(
            owner = %owner,
            validator = %validator,
            %amount,
            in_flight = %delegation.in_flight,
            "Cross-stake sent"
        );
        self.validators.insert(validator.clone(), validator_state);
        self.store_delegation(&owner, &validator, delegation);

        Ok(Response::new()
            .add_action(send)
            .add_attribute("action", "receive_claim")
            .add_attribute("owner", owner)
            .add_attribute("validator", validator)
            .add_attribute("amount", amount))
    }

    fn unstake(
        &mut self,
        env: &Env,
        info: MessageInfo,
        amount: Uint128,
        validator: String,
    ) -> Result<Response, ContractError> {
        let owner = info.sender;
        let key = (owner.clone(), validator.clone());
        if !self.delegations.contains_key(&key) {
            return Err(ContractError::UnknownClaim { validator });
        }
        let mut delegation = self.settled_delegation(&owner, &validator)?;
        let available = delegation.unstakable();
        if amount.is_zero() || amount > available {
            return Err(ContractError::InsufficientClaim {
                available,
                requested: amount,
            });
        }
        delegation.staked = delegation.staked.checked_sub(amount)?;

        let mut validator_state = self
            .validators
            .get(&validator)
            .cloned()
            .ok_or_else(|| ContractError::UnknownValidator(validator.clone()))?;
        validator_state.stake = validator_state.stake.checked_sub(amount)?;

        let packet = ProviderPacket::Unstake {
            key: owner.to_string(),
            validator: validator.clone(),
            amount,
        };
        let op = PendingOp::Unstake {
            owner: owner.clone(),
            validator: validator.clone(),
            amount,
            multiplier: delegation.multiplier,
        };
        let (sequence, send) = self.send_packet(env, &packet, op)?;

        let release_at = env.block.time.plus_seconds(self.config.unbonding_period);
        let mut entries = self.unbonding.get(&owner).cloned().unwrap_or_default();
        entries.push(UnbondingEntry {
            validator: validator.clone(),
            amount,
            release_at,
            sequence,
            multiplier: delegation.multiplier,
            confirmed: false,
        });

        info!(
            owner = %owner,
            validator = %validator,
            %amount,
            release_at = release_at.seconds(),
            "Unstake sent"
        );
        self.unbonding.insert(owner.clone(), entries);
        self.validators.insert(validator.clone(), validator_state);
        self.store_delegation(&owner, &validator, delegation);

        Ok(Response::new()
            .add_action(send)
            .add_attribute("action", "unstake")
            .add_attribute("validator", validator)
            .add_attribute("amount", amount))
    }

    fn unbond(&mut self, env: &Env, info: MessageInfo) -> Result<Response, ContractError> {
        let owner = info.sender;
        let entries = self.unbonding.get(&owner).cloned().unwrap_or_default();
        if entries.is_empty() {
            return Err(ContractError::NothingToUnbond);
        }

        let now = env.block.time;
        let (mature, waiting): (Vec<_>, Vec<_>) =
            entries.into_iter().partition(|e| e.is_mature(now));
        if mature.is_empty() {
            let release_at = waiting
                .iter()
                .map(|e| e.release_at)
                .min()
                .unwrap_or(Timestamp::from_nanos(u64::MAX));
            return Err(ContractError::UnbondingPeriodNotElapsed {
                release_at: release_at.seconds(),
            });
        }

        let mut actions = Vec::new();
        let mut released_total = Uint128::zero();
        let mut slashed_total = Uint128::zero();
        for entry in &mature {
            let current = self
                .validators
                .get(&entry.validator)
                .map(|v| v.multiplier)
                .unwrap_or_else(Decimal::one);
            let (released, slashed) = entry.split(current)?;

            if !released.is_zero() {
                actions.push(Action::execute(
                    &self.config.lockup,
                    &LockupExecuteMsg::ReleaseClaim {
                        owner: owner.to_string(),
                        amount: released,
                        validator: entry.validator.clone(),
                    },
                    vec![],
                )?);
            }
            if !slashed.is_zero() {
                actions.push(Action::execute(
                    &self.config.lockup,
                    &LockupExecuteMsg::SlashClaim {
                        owner: owner.to_string(),
                        amount: slashed,
                        validator: entry.validator.clone(),
                    },
                    vec![],
                )?);
            }
            released_total = released_total.checked_add(released)?;
            slashed_total = slashed_total.checked_add(slashed)?;
        }

        info!(
            owner = %owner,
            entries = mature.len(),
            released = %released_total,
            slashed = %slashed_total,
            "Unbonded"
        );
        if waiting.is_empty() {
            self.unbonding.remove(&owner);
        } else {
            self.unbonding.insert(owner, waiting);
        }

        Ok(Response::new()
            .add_actions(actions)
            .add_attribute("action", "unbond")
            .add_attribute("released", released_total)
            .add_attribute("slashed", slashed_total))
    }

    fn claim_rewards(
        &mut self,
        env: &Env,
        querier: &dyn Querier,
        info: MessageInfo,
        validator: Option<String>,
    ) -> Result<Response, ContractError> {
        let owner = info.sender;
        let targets: Vec<String> = match validator {
            Some(validator) => {
                if !self
                    .delegations
                    .contains_key(&(owner.clone(), validator.clone()))
                {
                    return Err(ContractError::UnknownClaim { validator });
                }
                vec![validator]
            }
            None => self
                .delegations
                .keys()
                .filter(|(o, _)| o == &owner)
                .map(|(_, v)| v.clone())
                .collect(),
        };

        let mut owed = Uint128::zero();
        let mut settled = Vec::with_capacity(targets.len());
        for validator in targets {
            let mut delegation = self.settled_delegation(&owner, &validator)?;
            owed = owed.checked_add(delegation.accrued)?;
            delegation.accrued = Uint128::zero();
            settled.push((validator, delegation));
        }

        if owed.is_zero() {
            debug!(owner = %owner, "No rewards to claim");
            return Ok(Response::new()
                .add_attribute("action", "claim_rewards")
                .add_attribute("amount", owed));
        }

        let denom = match &self.rewards_denom {
            Some(denom) => denom.clone(),
            None => {
                return Err(ContractError::InsufficientRewardFunds {
                    available: Uint128::zero(),
                    owed,
                })
            }
        };
        let available = querier.balance(&env.contract, &denom);
        if available < owed {
            warn!(
                owner = %owner,
                %owed,
                %available,
                "Reward funds not yet arrived"
            );
            return Err(ContractError::InsufficientRewardFunds { available, owed });
        }

        for (validator, delegation) in settled {
            self.store_delegation(&owner, &validator, delegation);
        }
        info!(owner = %owner, amount = %owed, denom = %denom, "Rewards claimed");

        Ok(Response::new()
            .add_action(Action::BankSend {
                to: owner,
                amount: coins(owed.u128(), denom),
            })
            .add_attribute("action", "claim_rewards")
            .add_attribute("amount", owed))
    }

    fn slash(
        &mut self,
        info: MessageInfo,
        validator: String,
        percentage: Decimal,
    ) -> Result<Response, ContractError> {
        if self.slasher.as_ref() != Some(&info.sender) {
            return Err(ContractError::Unauthorized);
        }
        if percentage > Decimal::one() {
            return Err(ContractError::InvalidPercentage(percentage.to_string()));
        }
        let mut state = self
            .validators
            .get(&validator)
            .cloned()
            .ok_or_else(|| ContractError::UnknownValidator(validator.clone()))?;
        state.slash(percentage)?;
        warn!(
            validator = %validator,
            %percentage,
            multiplier = %state.multiplier,
            "Validator slashed"
        );
        let multiplier = state.multiplier;
        self.validators.insert(validator.clone(), state);

        Ok(Response::new()
            .add_attribute("action", "slash")
            .add_attribute("validator", validator)
            .add_attribute("multiplier", multiplier))
    }

    fn reply(&mut self, id: u64, result: mesh_core::SubMsgResult) -> Result<Response, ContractError> {
        if id != SLASHER_REPLY_ID {
            return Err(ContractError::UnknownReply(id));
        }
        let slasher = result
            .map_err(ContractError::Query)?
            .instantiated
            .ok_or(ContractError::UnknownReply(id))?;
        info!(slasher = %slasher, "Slasher registered");
        self.slasher = Some(slasher.clone());
        Ok(Response::new()
            .add_attribute("action", "register_slasher")
            .add_attribute("slasher", slasher))
    }

    fn validator_response(address: &str, state: &ValidatorState) -> ValidatorResponse {
        ValidatorResponse {
            address: address.to_string(),
            stake: state.stake,
            in_flight: state.in_flight,
            multiplier: state.multiplier,
            reward_index: state.reward_index,
            undistributed: state.undistributed,
        }
    }

    fn query_account(&self, address: &str) -> Result<AccountResponse, ContractError> {
        let owner = Addr::unchecked(address);
        let mut delegations = Vec::new();
        for ((o, validator), _) in self.delegations.iter().filter(|((o, _), _)| o == &owner) {
            let settled = self.settled_delegation(o, validator)?;
            delegations.push(DelegationResponse {
                validator: validator.clone(),
                staked: settled.staked,
                in_flight: settled.in_flight,
                pending_rewards: settled.accrued,
            });
        }
        let unbonding = self
            .unbonding
            .get(&owner)
            .map(|entries| {
                entries
                    .iter()
                    .map(|e| UnbondingResponse {
                        validator: e.validator.clone(),
                        amount: e.amount,
                        release_at: e.release_at.seconds(),
                        confirmed: e.confirmed,
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(AccountResponse {
            delegations,
            unbonding,
        })
    }

    fn query_pending(&self) -> PendingPacketsResponse {
        let packets = self
            .packets
            .pending_iter()
            .map(|(sequence, op)| {
                let (owner, validator, amount) = match op {
                    PendingOp::ListValidators => (None, None, None),
                    PendingOp::Stake {
                        owner,
                        validator,
                        amount,
                        ..
                    }
                    | PendingOp::Unstake {
                        owner,
                        validator,
                        amount,
                        ..
                    } => (
                        Some(owner.to_string()),
                        Some(validator.clone()),
                        Some(*amount),
                    ),
                };
                PendingPacketResponse {
                    sequence: sequence.0,
                    kind: op.type_name().to_string(),
                    owner,
                    validator,
                    amount,
                }
            })
            .collect();
        PendingPacketsResponse { packets }
    }
}

impl Contract for ProviderContract {
    fn name(&self) -> &'static str {
        "provider"
    }

    fn handle(
        &mut self,
        env: &Env,
        querier: &dyn Querier,
        event: Event,
    ) -> Result<Response, ContractError> {
        match event {
            Event::Execute { info, msg } => self.execute(env, querier, info, from_binary(&msg)?),
            Event::Reply { id, result } => self.reply(id, result),
            Event::ChannelOpen(msg) => self.channel_open(&msg),
            Event::ChannelConnect(msg) => self.channel_connect(env, &msg),
            Event::ChannelClose { channel } => self.channel_close(&channel),
            Event::PacketReceive { packet } => self.packet_receive(&packet),
            Event::PacketAck { packet, ack } => self.packet_ack(env, &packet, ack),
            Event::PacketTimeout { packet } => self.packet_timeout(env, &packet),
            Event::Sudo { .. } => Err(ContractError::Unsupported("Sudo")),
        }
    }

    fn query(
        &self,
        _env: &Env,
        _querier: &dyn Querier,
        msg: &Binary,
    ) -> Result<Binary, ContractError> {
        let bytes = match from_binary(msg)? {
            QueryMsg::Config {} => to_binary(&ConfigResponse {
                consumer: self.config.consumer.clone(),
                slasher: self.slasher.as_ref().map(|s| s.to_string()),
                lockup: self.config.lockup.to_string(),
                unbonding_period: self.config.unbonding_period,
                packet_lifetime: self.config.packet_lifetime,
                rewards_denom: self.rewards_denom.clone(),
            })?,
            QueryMsg::Channel {} => to_binary(&self.auth.binding())?,
            QueryMsg::Validators { start_after, limit } => {
                let limit = limit.unwrap_or(DEFAULT_QUERY_LIMIT).min(MAX_QUERY_LIMIT) as usize;
                let validators = self
                    .validators
                    .iter()
                    .filter(|(address, _)| {
                        start_after.as_ref().map_or(true, |after| *address > after)
                    })
                    .take(limit)
                    .map(|(address, state)| Self::validator_response(address, state))
                    .collect();
                to_binary(&ValidatorsResponse { validators })?
            }
            QueryMsg::Validator { address } => {
                let state = self
                    .validators
                    .get(&address)
                    .ok_or_else(|| ContractError::UnknownValidator(address.clone()))?;
                to_binary(&Self::validator_response(&address, state))?
            }
            QueryMsg::Account { address } => to_binary(&self.query_account(&address)?)?,
            QueryMsg::PendingPackets {} => to_binary(&self.query_pending())?,
        };
        Ok(bytes)
    }

    fn box_clone(&self) -> Box<dyn Contract> {
        Box::new(self.clone())
    }
}
