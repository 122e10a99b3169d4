//! Meta-staking ledger messages.

use crate::packet::ValidatorReward;
use mesh_types::{Coin, Uint128};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstantiateMsg {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecuteMsg {
    /// Registered consumer only.
    Delegate { validator: String, amount: Uint128 },
    /// Registered consumer only.
    Undelegate { validator: String, amount: Uint128 },
    /// Withdraw staking rewards for `validator` and attribute them to
    /// consumers in proportion to their delegation.
    WithdrawDelegatorReward { validator: String },
    /// Send all attributed rewards of `consumer` to it.
    WithdrawAllToConsumer { consumer: String },
}

/// Privileged entry points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SudoMsg {
    AddConsumer {
        consumer_address: String,
        funds_available_for_staking: Coin,
    },
    RemoveConsumer { consumer_address: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryMsg {
    AllDelegations { consumer: String },
    Delegation { consumer: String, validator: String },
    Consumer { address: String },
    Consumers {},
    ConsumerRewards { consumer: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delegation {
    pub validator: String,
    pub delegation: Uint128,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllDelegationsResponse {
    pub delegations: Vec<Delegation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerInfo {
    pub address: String,
    pub available_funds: Uint128,
    pub total_staked: Uint128,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumersResponse {
    pub consumers: Vec<ConsumerInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerRewardsResponse {
    pub rewards: Vec<ValidatorReward>,
    pub denom: String,
}
