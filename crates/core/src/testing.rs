//! Test utilities for contract unit tests.
//!
//! Provides a [`MockQuerier`] with canned chain state and helpers to drive a
//! single contract without a host.

use crate::{BlockInfo, Contract, ContractError, Env, Event, MessageInfo, Querier, Response};
use mesh_messages::{from_binary, to_binary, Binary};
use mesh_types::{Addr, ChannelId, Coin, Timestamp, Uint128};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;

/// Chain id used by [`mock_env`].
pub const MOCK_CHAIN_ID: &str = "mock-chain";

/// Env for `contract` at `seconds` past the epoch; height follows time.
pub fn mock_env(contract: &str, seconds: u64) -> Env {
    Env {
        block: BlockInfo {
            height: 1 + seconds / 5,
            time: Timestamp::from_seconds(seconds),
            chain_id: MOCK_CHAIN_ID.to_string(),
        },
        contract: Addr::unchecked(contract),
    }
}

/// Message info for `sender` with `funds`.
pub fn mock_info(sender: &str, funds: &[Coin]) -> MessageInfo {
    MessageInfo {
        sender: Addr::unchecked(sender),
        funds: funds.to_vec(),
    }
}

/// Static chain state.
#[derive(Debug, Clone, Default)]
pub struct MockQuerier {
    pub bonded_denom: String,
    pub validators: Vec<String>,
    pub balances: BTreeMap<(Addr, String), Uint128>,
    pub rewards: BTreeMap<(Addr, String), Uint128>,
    pub contract_responses: BTreeMap<Addr, Binary>,
    pub ics20_channels: BTreeMap<ChannelId, ChannelId>,
}

impl MockQuerier {
    pub fn new(bonded_denom: &str) -> Self {
        Self {
            bonded_denom: bonded_denom.to_string(),
            ..Self::default()
        }
    }

    pub fn with_validators(mut self, validators: &[&str]) -> Self {
        self.validators = validators.iter().map(|v| v.to_string()).collect();
        self
    }

    pub fn set_balance(&mut self, address: &str, denom: &str, amount: u128) {
        self.balances.insert(
            (Addr::unchecked(address), denom.to_string()),
            Uint128::new(amount),
        );
    }

    pub fn set_rewards(&mut self, delegator: &str, validator: &str, amount: u128) {
        self.rewards.insert(
            (Addr::unchecked(delegator), validator.to_string()),
            Uint128::new(amount),
        );
    }

    pub fn set_ics20_counterparty(&mut self, local: &str, remote: &str) {
        self.ics20_channels
            .insert(ChannelId::new(local), ChannelId::new(remote));
    }
}

impl Querier for MockQuerier {
    fn balance(&self, address: &Addr, denom: &str) -> Uint128 {
        self.balances
            .get(&(address.clone(), denom.to_string()))
            .copied()
            .unwrap_or_default()
    }

    fn bonded_denom(&self) -> String {
        self.bonded_denom.clone()
    }

    fn validators(&self) -> Vec<String> {
        self.validators.clone()
    }

    fn delegation_rewards(&self, delegator: &Addr, validator: &str) -> Uint128 {
        self.rewards
            .get(&(delegator.clone(), validator.to_string()))
            .copied()
            .unwrap_or_default()
    }

    fn query_contract(&self, contract: &Addr, _msg: &Binary) -> Result<Binary, ContractError> {
        self.contract_responses
            .get(contract)
            .cloned()
            .ok_or_else(|| ContractError::Query(format!("no mock response for {contract}")))
    }

    fn ics20_counterparty(&self, channel: &ChannelId) -> Option<ChannelId> {
        self.ics20_channels.get(channel).cloned()
    }
}

/// Send a typed execute message to a contract.
pub fn execute<M: Serialize>(
    contract: &mut dyn Contract,
    env: &Env,
    querier: &dyn Querier,
    info: MessageInfo,
    msg: &M,
) -> Result<Response, ContractError> {
    contract.handle(
        env,
        querier,
        Event::Execute {
            info,
            msg: to_binary(msg)?,
        },
    )
}

/// Run a typed query against a contract.
pub fn query<M: Serialize, R: DeserializeOwned>(
    contract: &dyn Contract,
    env: &Env,
    querier: &dyn Querier,
    msg: &M,
) -> Result<R, ContractError> {
    let bytes = contract.query(env, querier, &to_binary(msg)?)?;
    Ok(from_binary(&bytes)?)
}
