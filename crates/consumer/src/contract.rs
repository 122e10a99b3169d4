//! Consumer contract: reward forwarding, replies and queries.

use crate::state::{InflightOp, PendingRewards, StakePosition};
use im::OrdMap;
use mesh_core::{
    Action, ChannelAuth, Contract, ContractError, Env, Event, MessageInfo, PacketLedger,
    PeerRequirement, Querier, Response, SubMsgResult, DEFAULT_PACKET_LIFETIME,
};
use mesh_messages::consumer::{
    ConfigResponse, ExecuteMsg, InstantiateMsg, ParkedRewardsResponse, ProviderInfo, QueryMsg,
    StakeResponse, StakesResponse,
};
use mesh_messages::{
    from_binary, to_binary, Acknowledgement, Binary, ConsumerPacket, StakeAck, ValidatorReward,
};
use cw_utils::must_pay;
use mesh_types::{coin, Addr, ChannelId, Coin, Decimal, Uint128};
use tracing::{debug, info, warn};

/// Static configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub provider: ProviderInfo,
    pub remote_to_local_exchange_rate: Decimal,
    pub meta_staking: Addr,
    pub ics20_channel: ChannelId,
    pub packet_lifetime: u64,
}

pub fn instantiate(
    _env: &Env,
    _querier: &dyn Querier,
    _info: MessageInfo,
    msg: &Binary,
) -> Result<(Box<dyn Contract>, Response), ContractError> {
    let msg: InstantiateMsg = from_binary(msg)?;
    let config = Config {
        provider: msg.provider,
        remote_to_local_exchange_rate: msg.remote_to_local_exchange_rate,
        meta_staking: Addr::unchecked(msg.meta_staking_contract_address),
        ics20_channel: msg.ics20_channel,
        packet_lifetime: msg.packet_lifetime.unwrap_or(DEFAULT_PACKET_LIFETIME),
    };
    info!(
        provider_port = %config.provider.port_id,
        connection = %config.provider.connection_id,
        rate = %config.remote_to_local_exchange_rate,
        meta_staking = %config.meta_staking,
        "Consumer instantiated"
    );

    let contract = ConsumerContract {
        auth: ChannelAuth::new(PeerRequirement::Initiator {
            counterparty_port: config.provider.port_id.clone(),
            connection_id: config.provider.connection_id.clone(),
        }),
        config,
        packets: PacketLedger::new(),
        inflight: OrdMap::new(),
        stakes: OrdMap::new(),
        parked: OrdMap::new(),
    };
    Ok((
        Box::new(contract),
        Response::new().add_attribute("action", "instantiate"),
    ))
}

/// Consumer half of the cross-stake engine.
///
/// Staking packets are applied through meta-staking as submessages; the
/// reply decides the ack. Rewards received from meta-staking are sent to
/// the provider as an ICS20 transfer plus an accounting packet.
#[derive(Debug, Clone)]
pub struct ConsumerContract {
    pub(crate) config: Config,
    pub(crate) auth: ChannelAuth,
    pub(crate) packets: PacketLedger<PendingRewards>,
    /// Keyed by reply id, which is the inbound packet sequence.
    pub(crate) inflight: OrdMap<u64, InflightOp>,
    /// Stake per (provider key, validator).
    pub(crate) stakes: OrdMap<(String, String), StakePosition>,
    /// Rewards whose accounting packet failed, per validator.
    pub(crate) parked: OrdMap<String, Uint128>,
}

impl ConsumerContract {
    pub(crate) fn position(&self, key: &str, validator: &str) -> StakePosition {
        self.stakes
            .get(&(key.to_string(), validator.to_string()))
            .copied()
            .unwrap_or_default()
    }

    pub(crate) fn set_position(&mut self, key: String, validator: String, position: StakePosition) {
        if position.is_empty() {
            self.stakes.remove(&(key, validator));
        } else {
            self.stakes.insert((key, validator), position);
        }
    }

    fn execute(
        &mut self,
        env: &Env,
        querier: &dyn Querier,
        info: MessageInfo,
        msg: ExecuteMsg,
    ) -> Result<Response, ContractError> {
        match msg {
            ExecuteMsg::ReceiveRewards {
                rewards_by_validator,
            } => self.receive_rewards(env, querier, info, rewards_by_validator),
            ExecuteMsg::RetryRewards {} => self.retry_rewards(env, querier),
        }
    }

    fn receive_rewards(
        &mut self,
        env: &Env,
        querier: &dyn Querier,
        info: MessageInfo,
        rewards: Vec<ValidatorReward>,
    ) -> Result<Response, ContractError> {
        if info.sender != self.config.meta_staking {
            return Err(ContractError::Unauthorized);
        }
        let denom = querier.bonded_denom();
        let paid = must_pay(&info, &denom)?;
        let declared = rewards
            .iter()
            .try_fold(Uint128::zero(), |acc, r| acc.checked_add(r.amount))?;
        if declared != paid {
            return Err(ContractError::RewardMismatch { declared, paid });
        }

        let transfer = self.transfer_to_provider(env, coin(paid.u128(), denom.clone()))?;
        let mut accounting = self.take_parked();
        accounting.extend(rewards);
        let send = self.send_rewards(env, querier, accounting, &denom)?;

        info!(amount = %paid, denom = %denom, "Forwarding rewards to provider");
        Ok(Response::new()
            .add_action(transfer)
            .add_action(send)
            .add_attribute("action", "receive_rewards")
            .add_attribute("amount", paid))
    }

    /// Re-send parked accounting and any reward balance refunded by a
    /// failed transfer.
    fn retry_rewards(&mut self, env: &Env, querier: &dyn Querier) -> Result<Response, ContractError> {
        let denom = querier.bonded_denom();
        let refunded = querier.balance(&env.contract, &denom);
        let mut response = Response::new().add_attribute("action", "retry_rewards");

        if !refunded.is_zero() {
            response = response
                .add_action(self.transfer_to_provider(env, coin(refunded.u128(), denom.clone()))?)
                .add_attribute("refunded", refunded);
        }
        let parked = self.take_parked();
        if !parked.is_empty() {
            response = response
                .add_action(self.send_rewards(env, querier, parked, &denom)?)
                .add_attribute("resent", "true");
        }
        debug!(%refunded, "Reward retry");
        Ok(response)
    }

    fn take_parked(&mut self) -> Vec<ValidatorReward> {
        let parked = std::mem::take(&mut self.parked);
        parked
            .into_iter()
            .map(|(validator, amount)| ValidatorReward { validator, amount })
            .collect()
    }

    pub(crate) fn park(&mut self, rewards: Vec<ValidatorReward>) -> Result<(), ContractError> {
        for reward in rewards {
            let current = self.parked.get(&reward.validator).copied().unwrap_or_default();
            self.parked
                .insert(reward.validator, current.checked_add(reward.amount)?);
        }
        Ok(())
    }

    fn transfer_to_provider(&self, env: &Env, amount: Coin) -> Result<Action, ContractError> {
        let binding = self.auth.sendable()?;
        let to_address = binding
            .counterparty_port
            .as_str()
            .strip_prefix("wasm.")
            .ok_or(ContractError::Unauthorized)?
            .to_string();
        Ok(Action::Transfer {
            channel_id: self.config.ics20_channel.clone(),
            to_address,
            amount,
            timeout: env.block.time.plus_seconds(self.config.packet_lifetime),
        })
    }

    fn send_rewards(
        &mut self,
        env: &Env,
        querier: &dyn Querier,
        rewards: Vec<ValidatorReward>,
        denom: &str,
    ) -> Result<Action, ContractError> {
        let channel_id = self.auth.sendable()?.channel_id.clone();
        let transfer_channel = querier
            .ics20_counterparty(&self.config.ics20_channel)
            .ok_or_else(|| {
                ContractError::Query(format!("unknown ICS20 channel {}", self.config.ics20_channel))
            })?;
        let packet = ConsumerPacket::ClaimRewards {
            rewards_by_validator: rewards.clone(),
            denom: denom.to_string(),
            transfer_channel,
        };
        let data = to_binary(&packet)?;
        let sequence = self.packets.send(PendingRewards { rewards });
        debug!(%sequence, total = %packet.total()?, "Sending rewards packet");
        Ok(Action::SendPacket {
            channel_id,
            sequence,
            data,
            timeout: env.block.time.plus_seconds(self.config.packet_lifetime),
        })
    }

    /// Meta-staking finished applying a staking packet; write its ack.
    fn reply(&mut self, id: u64, result: SubMsgResult) -> Result<Response, ContractError> {
        let op = self
            .inflight
            .get(&id)
            .cloned()
            .ok_or(ContractError::UnknownReply(id))?;
        self.inflight.remove(&id);

        let ack = match result {
            Ok(_) => {
                self.set_position(op.key.clone(), op.validator.clone(), op.position);
                info!(
                    sequence = %op.sequence,
                    kind = ?op.kind,
                    key = %op.key,
                    validator = %op.validator,
                    amount = %op.local_amount,
                    "Staking packet applied"
                );
                Acknowledgement::success(&StakeAck {
                    local_amount: op.local_amount,
                })?
            }
            Err(reason) => {
                warn!(sequence = %op.sequence, %reason, "Staking packet rejected");
                Acknowledgement::error(reason)
            }
        };
        self.packets.record_receipt(op.sequence, ack.clone());
        Ok(Response::new()
            .set_ack(ack)
            .add_attribute("action", "reply")
            .add_attribute("sequence", op.sequence.0))
    }
}

impl Contract for ConsumerContract {
    fn name(&self) -> &'static str {
        "consumer"
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
            Event::ChannelConnect(msg) => self.channel_connect(&msg),
            Event::ChannelClose { channel } => self.channel_close(&channel),
            Event::PacketReceive { packet } => self.packet_receive(querier, &packet),
            Event::PacketAck { packet, ack } => self.packet_ack(&packet, ack),
            Event::PacketTimeout { packet } => self.packet_timeout(&packet),
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
                provider: self.config.provider.clone(),
                remote_to_local_exchange_rate: self.config.remote_to_local_exchange_rate,
                meta_staking_contract_address: self.config.meta_staking.to_string(),
                ics20_channel: self.config.ics20_channel.clone(),
                packet_lifetime: self.config.packet_lifetime,
            })?,
            QueryMsg::Channel {} => to_binary(&self.auth.binding())?,
            QueryMsg::Stakes { key } => {
                let stakes = self
                    .stakes
                    .iter()
                    .filter(|((k, _), _)| k == &key)
                    .map(|((_, validator), position)| StakeResponse {
                        validator: validator.clone(),
                        amount: position.local,
                        remote: position.remote,
                    })
                    .collect();
                to_binary(&StakesResponse { stakes })?
            }
            QueryMsg::ParkedRewards {} => to_binary(&ParkedRewardsResponse {
                rewards: self
                    .parked
                    .iter()
                    .map(|(validator, amount)| ValidatorReward {
                        validator: validator.clone(),
                        amount: *amount,
                    })
                    .collect(),
            })?,
        };
        Ok(bytes)
    }

    fn box_clone(&self) -> Box<dyn Contract> {
        Box::new(self.clone())
    }
}
