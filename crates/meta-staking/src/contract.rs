//! Meta-staking state machine.

use im::OrdMap;
use mesh_core::{Action, Contract, ContractError, Env, Event, MessageInfo, Querier, Response};
use mesh_messages::consumer::ExecuteMsg as ConsumerExecuteMsg;
use mesh_messages::meta_staking::{
    AllDelegationsResponse, ConsumerInfo, ConsumerRewardsResponse, ConsumersResponse, Delegation,
    ExecuteMsg, InstantiateMsg, QueryMsg, SudoMsg,
};
use mesh_messages::{from_binary, to_binary, Binary, ValidatorReward};
use cw_utils::PaymentError;
use mesh_types::{coin, coins, Addr, Coin, Uint128};
use tracing::{debug, info};

pub fn instantiate(
    _env: &Env,
    querier: &dyn Querier,
    _info: MessageInfo,
    msg: &Binary,
) -> Result<(Box<dyn Contract>, Response), ContractError> {
    let _: InstantiateMsg = from_binary(msg)?;
    let denom = querier.bonded_denom();
    info!(denom = %denom, "Meta-staking instantiated");
    let contract = MetaStakingContract {
        denom,
        consumers: OrdMap::new(),
        delegations: OrdMap::new(),
        validator_totals: OrdMap::new(),
        rewards: OrdMap::new(),
        unattributed: OrdMap::new(),
    };
    Ok((
        Box::new(contract),
        Response::new().add_attribute("action", "instantiate"),
    ))
}

/// Capacity and usage of one registered consumer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsumerState {
    pub available: Uint128,
    pub total_staked: Uint128,
}

impl ConsumerState {
    fn capacity_left(&self) -> Uint128 {
        self.available.saturating_sub(self.total_staked)
    }
}

#[derive(Debug, Clone)]
pub struct MetaStakingContract {
    denom: String,
    consumers: OrdMap<Addr, ConsumerState>,
    delegations: OrdMap<(Addr, String), Uint128>,
    validator_totals: OrdMap<String, Uint128>,
    /// Withdrawn rewards attributed to a consumer, per validator.
    rewards: OrdMap<(Addr, String), Uint128>,
    /// Rounding remainder per validator.
    unattributed: OrdMap<String, Uint128>,
}

impl MetaStakingContract {
    fn consumer(&self, address: &Addr) -> Result<ConsumerState, ContractError> {
        self.consumers
            .get(address)
            .cloned()
            .ok_or(ContractError::Unauthorized)
    }

    fn sudo(&mut self, msg: SudoMsg) -> Result<Response, ContractError> {
        match msg {
            SudoMsg::AddConsumer {
                consumer_address,
                funds_available_for_staking,
            } => self.add_consumer(Addr::unchecked(consumer_address), funds_available_for_staking),
            SudoMsg::RemoveConsumer { consumer_address } => {
                self.remove_consumer(Addr::unchecked(consumer_address))
            }
        }
    }

    fn add_consumer(&mut self, address: Addr, funds: Coin) -> Result<Response, ContractError> {
        if funds.denom != self.denom {
            return Err(PaymentError::MissingDenom(self.denom.clone()).into());
        }
        let available = funds.amount;
        let mut state = self.consumers.get(&address).cloned().unwrap_or_default();
        if available < state.total_staked {
            return Err(ContractError::InsufficientStakingCapacity {
                available,
                requested: state.total_staked,
            });
        }
        state.available = available;
        info!(consumer = %address, %available, "Consumer registered");
        self.consumers.insert(address.clone(), state);
        Ok(Response::new()
            .add_attribute("action", "add_consumer")
            .add_attribute("consumer", address)
            .add_attribute("available", available))
    }

    fn remove_consumer(&mut self, address: Addr) -> Result<Response, ContractError> {
        let state = self
            .consumers
            .get(&address)
            .cloned()
            .ok_or_else(|| ContractError::UnknownConsumer(address.to_string()))?;
        if !state.total_staked.is_zero() {
            return Err(ContractError::ConsumerHasDelegations {
                consumer: address.to_string(),
                staked: state.total_staked,
            });
        }
        self.consumers.remove(&address);
        info!(consumer = %address, "Consumer removed");
        Ok(Response::new()
            .add_attribute("action", "remove_consumer")
            .add_attribute("consumer", address))
    }

    fn execute(
        &mut self,
        env: &Env,
        querier: &dyn Querier,
        info: MessageInfo,
        msg: ExecuteMsg,
    ) -> Result<Response, ContractError> {
        match msg {
            ExecuteMsg::Delegate { validator, amount } => self.delegate(info, validator, amount),
            ExecuteMsg::Undelegate { validator, amount } => {
                self.undelegate(info, validator, amount)
            }
            ExecuteMsg::WithdrawDelegatorReward { validator } => {
                self.withdraw_delegator_reward(env, querier, validator)
            }
            ExecuteMsg::WithdrawAllToConsumer { consumer } => {
                self.withdraw_all_to_consumer(Addr::unchecked(consumer))
            }
        }
    }

    fn delegate(
        &mut self,
        info: MessageInfo,
        validator: String,
        amount: Uint128,
    ) -> Result<Response, ContractError> {
        let mut consumer = self.consumer(&info.sender)?;
        if amount.is_zero() {
            return Err(PaymentError::NoFunds {}.into());
        }
        let left = consumer.capacity_left();
        if amount > left {
            return Err(ContractError::InsufficientStakingCapacity {
                available: left,
                requested: amount,
            });
        }

        let key = (info.sender.clone(), validator.clone());
        let delegation = self.delegations.get(&key).copied().unwrap_or_default();
        let total = self
            .validator_totals
            .get(&validator)
            .copied()
            .unwrap_or_default();
        consumer.total_staked = consumer.total_staked.checked_add(amount)?;
        self.delegations.insert(key, delegation.checked_add(amount)?);
        self.validator_totals
            .insert(validator.clone(), total.checked_add(amount)?);
        info!(
            consumer = %info.sender,
            validator = %validator,
            %amount,
            total_staked = %consumer.total_staked,
            "Delegated"
        );
        self.consumers.insert(info.sender, consumer);

        Ok(Response::new()
            .add_action(Action::Delegate {
                validator,
                amount: coin(amount.u128(), self.denom.clone()),
            })
            .add_attribute("action", "delegate")
            .add_attribute("amount", amount))
    }

    fn undelegate(
        &mut self,
        info: MessageInfo,
        validator: String,
        amount: Uint128,
    ) -> Result<Response, ContractError> {
        let mut consumer = self.consumer(&info.sender)?;
        let key = (info.sender.clone(), validator.clone());
        let delegation = self.delegations.get(&key).copied().unwrap_or_default();
        if amount.is_zero() || amount > delegation {
            return Err(ContractError::InsufficientClaim {
                available: delegation,
                requested: amount,
            });
        }
        let total = self
            .validator_totals
            .get(&validator)
            .copied()
            .unwrap_or_default();

        consumer.total_staked = consumer.total_staked.checked_sub(amount)?;
        let remaining = delegation.checked_sub(amount)?;
        if remaining.is_zero() {
            self.delegations.remove(&key);
        } else {
            self.delegations.insert(key, remaining);
        }
        self.validator_totals
            .insert(validator.clone(), total.checked_sub(amount)?);
        info!(consumer = %info.sender, validator = %validator, %amount, "Undelegated");
        self.consumers.insert(info.sender, consumer);

        Ok(Response::new()
            .add_action(Action::Undelegate {
                validator,
                amount: coin(amount.u128(), self.denom.clone()),
            })
            .add_attribute("action", "undelegate")
            .add_attribute("amount", amount))
    }

    /// Withdraw what the staking module accrued for `validator` and split it
    /// between the consumers delegating to it.
    fn withdraw_delegator_reward(
        &mut self,
        env: &Env,
        querier: &dyn Querier,
        validator: String,
    ) -> Result<Response, ContractError> {
        let reward = querier.delegation_rewards(&env.contract, &validator);
        if reward.is_zero() {
            debug!(validator = %validator, "No rewards to withdraw");
            return Ok(Response::new()
                .add_attribute("action", "withdraw_delegator_reward")
                .add_attribute("amount", reward));
        }

        let total = self
            .validator_totals
            .get(&validator)
            .copied()
            .unwrap_or_default();
        let mut attributed = Uint128::zero();
        if !total.is_zero() {
            let holders: Vec<(Addr, Uint128)> = self
                .delegations
                .iter()
                .filter(|((_, v), _)| v == &validator)
                .map(|((consumer, _), amount)| (consumer.clone(), *amount))
                .collect();
            for (consumer, delegation) in holders {
                let share = reward.checked_multiply_ratio(delegation, total)?;
                if share.is_zero() {
                    continue;
                }
                let key = (consumer, validator.clone());
                let current = self.rewards.get(&key).copied().unwrap_or_default();
                self.rewards.insert(key, current.checked_add(share)?);
                attributed = attributed.checked_add(share)?;
            }
        }

        let dust = reward.checked_sub(attributed)?;
        if !dust.is_zero() {
            let current = self
                .unattributed
                .get(&validator)
                .copied()
                .unwrap_or_default();
            self.unattributed
                .insert(validator.clone(), current.checked_add(dust)?);
        }
        info!(validator = %validator, %reward, %attributed, %dust, "Rewards withdrawn");

        Ok(Response::new()
            .add_action(Action::WithdrawDelegatorReward {
                validator: validator.clone(),
            })
            .add_attribute("action", "withdraw_delegator_reward")
            .add_attribute("validator", validator)
            .add_attribute("amount", reward))
    }

    fn withdraw_all_to_consumer(&mut self, consumer: Addr) -> Result<Response, ContractError> {
        if !self.consumers.contains_key(&consumer) {
            return Err(ContractError::UnknownConsumer(consumer.to_string()));
        }
        let rewards = self.consumer_rewards(&consumer);
        if rewards.is_empty() {
            return Ok(Response::new()
                .add_attribute("action", "withdraw_all_to_consumer")
                .add_attribute("amount", Uint128::zero()));
        }

        let total = rewards
            .iter()
            .try_fold(Uint128::zero(), |acc, r| acc.checked_add(r.amount))?;
        for reward in &rewards {
            self.rewards
                .remove(&(consumer.clone(), reward.validator.clone()));
        }
        info!(consumer = %consumer, %total, validators = rewards.len(), "Paying rewards to consumer");

        let call = Action::execute(
            &consumer,
            &ConsumerExecuteMsg::ReceiveRewards {
                rewards_by_validator: rewards,
            },
            coins(total.u128(), self.denom.clone()),
        )?;
        Ok(Response::new()
            .add_action(call)
            .add_attribute("action", "withdraw_all_to_consumer")
            .add_attribute("amount", total))
    }

    fn consumer_rewards(&self, consumer: &Addr) -> Vec<ValidatorReward> {
        self.rewards
            .iter()
            .filter(|((c, _), amount)| c == consumer && !amount.is_zero())
            .map(|((_, validator), amount)| ValidatorReward {
                validator: validator.clone(),
                amount: *amount,
            })
            .collect()
    }

    fn consumer_info(address: &Addr, state: &ConsumerState) -> ConsumerInfo {
        ConsumerInfo {
            address: address.to_string(),
            available_funds: state.available,
            total_staked: state.total_staked,
        }
    }
}

impl Contract for MetaStakingContract {
    fn name(&self) -> &'static str {
        "meta-staking"
    }

    fn handle(
        &mut self,
        env: &Env,
        querier: &dyn Querier,
        event: Event,
    ) -> Result<Response, ContractError> {
        match event {
            Event::Execute { info, msg } => self.execute(env, querier, info, from_binary(&msg)?),
            Event::Sudo { msg } => self.sudo(from_binary(&msg)?),
            other => Err(ContractError::Unsupported(other.type_name())),
        }
    }

    fn query(
        &self,
        _env: &Env,
        _querier: &dyn Querier,
        msg: &Binary,
    ) -> Result<Binary, ContractError> {
        let bytes = match from_binary(msg)? {
            QueryMsg::AllDelegations { consumer } => {
                let consumer = Addr::unchecked(consumer);
                let delegations = self
                    .delegations
                    .iter()
                    .filter(|((c, _), _)| c == &consumer)
                    .map(|((_, validator), amount)| Delegation {
                        validator: validator.clone(),
                        delegation: *amount,
                    })
                    .collect();
                to_binary(&AllDelegationsResponse { delegations })?
            }
            QueryMsg::Delegation {
                consumer,
                validator,
            } => {
                let amount = self
                    .delegations
                    .get(&(Addr::unchecked(consumer), validator.clone()))
                    .copied()
                    .unwrap_or_default();
                to_binary(&Delegation {
                    validator,
                    delegation: amount,
                })?
            }
            QueryMsg::Consumer { address } => {
                let address = Addr::unchecked(address);
                let info = self
                    .consumers
                    .get(&address)
                    .map(|state| Self::consumer_info(&address, state));
                to_binary(&info)?
            }
            QueryMsg::Consumers {} => to_binary(&ConsumersResponse {
                consumers: self
                    .consumers
                    .iter()
                    .map(|(address, state)| Self::consumer_info(address, state))
                    .collect(),
            })?,
            QueryMsg::ConsumerRewards { consumer } => to_binary(&ConsumerRewardsResponse {
                rewards: self.consumer_rewards(&Addr::unchecked(consumer)),
                denom: self.denom.clone(),
            })?,
        };
        Ok(bytes)
    }

    fn box_clone(&self) -> Box<dyn Contract> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_core::testing::{execute, mock_env, mock_info, query, MockQuerier};
    use mesh_types::coin;
    use tracing_test::traced_test;

    const META: &str = "juno1meta";

    fn setup() -> (Box<dyn Contract>, MockQuerier, Env) {
        let querier = MockQuerier::new("ujuno").with_validators(&["v1", "v2"]);
        let env = mock_env(META, 100);
        let (mut contract, _) = instantiate(
            &env,
            &querier,
            mock_info("gov", &[]),
            &to_binary(&InstantiateMsg {}).unwrap(),
        )
        .unwrap();
        for consumer in ["juno1alpha", "juno1beta"] {
            sudo(
                contract.as_mut(),
                &env,
                &querier,
                SudoMsg::AddConsumer {
                    consumer_address: consumer.into(),
                    funds_available_for_staking: coin(1_000, "ujuno"),
                },
            )
            .unwrap();
        }
        (contract, querier, env)
    }

    fn sudo(
        contract: &mut dyn Contract,
        env: &Env,
        querier: &MockQuerier,
        msg: SudoMsg,
    ) -> Result<Response, ContractError> {
        contract.handle(
            env,
            querier,
            Event::Sudo {
                msg: to_binary(&msg).unwrap(),
            },
        )
    }

    fn delegate(
        contract: &mut dyn Contract,
        env: &Env,
        querier: &MockQuerier,
        consumer: &str,
        validator: &str,
        amount: u128,
    ) -> Result<Response, ContractError> {
        execute(
            contract,
            env,
            querier,
            mock_info(consumer, &[]),
            &ExecuteMsg::Delegate {
                validator: validator.into(),
                amount: Uint128::new(amount),
            },
        )
    }

    #[traced_test]
    #[test]
    fn test_delegate_within_capacity() {
        let (mut contract, querier, env) = setup();
        let response = delegate(contract.as_mut(), &env, &querier, "juno1alpha", "v1", 600).unwrap();
        assert_eq!(
            response.actions,
            vec![Action::Delegate {
                validator: "v1".into(),
                amount: coin(600, "ujuno"),
            }]
        );

        let err = delegate(contract.as_mut(), &env, &querier, "juno1alpha", "v2", 401).unwrap_err();
        assert_eq!(
            err,
            ContractError::InsufficientStakingCapacity {
                available: Uint128::new(400),
                requested: Uint128::new(401),
            }
        );

        let info: Option<ConsumerInfo> = query(
            contract.as_ref(),
            &env,
            &querier,
            &QueryMsg::Consumer {
                address: "juno1alpha".into(),
            },
        )
        .unwrap();
        assert_eq!(info.unwrap().total_staked, Uint128::new(600));
    }

    #[test]
    fn test_unregistered_caller_rejected() {
        let (mut contract, querier, env) = setup();
        let err = delegate(contract.as_mut(), &env, &querier, "juno1stranger", "v1", 1).unwrap_err();
        assert_eq!(err, ContractError::Unauthorized);
    }

    #[test]
    fn test_undelegate_and_remove_consumer() {
        let (mut contract, querier, env) = setup();
        delegate(contract.as_mut(), &env, &querier, "juno1alpha", "v1", 300).unwrap();

        let remove = SudoMsg::RemoveConsumer {
            consumer_address: "juno1alpha".into(),
        };
        let err = sudo(contract.as_mut(), &env, &querier, remove.clone()).unwrap_err();
        assert!(matches!(err, ContractError::ConsumerHasDelegations { .. }));

        let undelegate = |amount: u128| ExecuteMsg::Undelegate {
            validator: "v1".into(),
            amount: Uint128::new(amount),
        };
        let err = execute(
            contract.as_mut(),
            &env,
            &querier,
            mock_info("juno1alpha", &[]),
            &undelegate(301),
        )
        .unwrap_err();
        assert!(matches!(err, ContractError::InsufficientClaim { .. }));

        let response = execute(
            contract.as_mut(),
            &env,
            &querier,
            mock_info("juno1alpha", &[]),
            &undelegate(300),
        )
        .unwrap();
        assert_eq!(
            response.actions,
            vec![Action::Undelegate {
                validator: "v1".into(),
                amount: coin(300, "ujuno"),
            }]
        );

        sudo(contract.as_mut(), &env, &querier, remove).unwrap();
        let consumers: ConsumersResponse =
            query(contract.as_ref(), &env, &querier, &QueryMsg::Consumers {}).unwrap();
        assert_eq!(consumers.consumers.len(), 1);
    }

    #[traced_test]
    #[test]
    fn test_rewards_split_pro_rata() {
        let (mut contract, mut querier, env) = setup();
        delegate(contract.as_mut(), &env, &querier, "juno1alpha", "v1", 200).unwrap();
        delegate(contract.as_mut(), &env, &querier, "juno1beta", "v1", 100).unwrap();
        querier.set_rewards(META, "v1", 100);

        let response = execute(
            contract.as_mut(),
            &env,
            &querier,
            mock_info("anyone", &[]),
            &ExecuteMsg::WithdrawDelegatorReward {
                validator: "v1".into(),
            },
        )
        .unwrap();
        assert_eq!(
            response.actions,
            vec![Action::WithdrawDelegatorReward {
                validator: "v1".into()
            }]
        );

        let alpha: ConsumerRewardsResponse = query(
            contract.as_ref(),
            &env,
            &querier,
            &QueryMsg::ConsumerRewards {
                consumer: "juno1alpha".into(),
            },
        )
        .unwrap();
        assert_eq!(alpha.rewards[0].amount, Uint128::new(66));
        let beta: ConsumerRewardsResponse = query(
            contract.as_ref(),
            &env,
            &querier,
            &QueryMsg::ConsumerRewards {
                consumer: "juno1beta".into(),
            },
        )
        .unwrap();
        assert_eq!(beta.rewards[0].amount, Uint128::new(33));

        let response = execute(
            contract.as_mut(),
            &env,
            &querier,
            mock_info("anyone", &[]),
            &ExecuteMsg::WithdrawAllToConsumer {
                consumer: "juno1alpha".into(),
            },
        )
        .unwrap();
        match &response.actions[..] {
            [Action::Execute {
                contract: target,
                msg,
                funds,
            }] => {
                assert_eq!(target.as_str(), "juno1alpha");
                assert_eq!(funds, &coins(66, "ujuno"));
                let msg: ConsumerExecuteMsg = from_binary(msg).unwrap();
                assert_eq!(
                    msg,
                    ConsumerExecuteMsg::ReceiveRewards {
                        rewards_by_validator: vec![ValidatorReward {
                            validator: "v1".into(),
                            amount: Uint128::new(66),
                        }],
                    }
                );
            }
            other => panic!("unexpected actions {other:?}"),
        }

        // Paid out, nothing left to send
        let response = execute(
            contract.as_mut(),
            &env,
            &querier,
            mock_info("anyone", &[]),
            &ExecuteMsg::WithdrawAllToConsumer {
                consumer: "juno1alpha".into(),
            },
        )
        .unwrap();
        assert!(response.actions.is_empty());
    }
}
