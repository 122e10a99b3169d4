//! Consumer contract messages.

use crate::packet::ValidatorReward;
use mesh_types::{ChannelId, ConnectionId, Decimal, PortId, Uint128};
use serde::{Deserialize, Serialize};

/// Where the provider half lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub port_id: PortId,
    pub connection_id: ConnectionId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstantiateMsg {
    pub provider: ProviderInfo,
    /// Consumer native units per provider unit.
    pub remote_to_local_exchange_rate: Decimal,
    pub meta_staking_contract_address: String,
    /// Local end of the ICS20 channel rewards are transferred over.
    pub ics20_channel: ChannelId,
    #[serde(default)]
    pub packet_lifetime: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecuteMsg {
    /// Meta-staking only: rewards withdrawn for this consumer, funds attached.
    ReceiveRewards {
        rewards_by_validator: Vec<ValidatorReward>,
    },
    /// Re-send parked reward packets and any refunded reward balance.
    RetryRewards {},
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryMsg {
    Config {},
    Channel {},
    /// Local stakes held for one provider key.
    Stakes { key: String },
    /// Rewards whose packet failed and that wait for a retry.
    ParkedRewards {},
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigResponse {
    pub provider: ProviderInfo,
    pub remote_to_local_exchange_rate: Decimal,
    pub meta_staking_contract_address: String,
    pub ics20_channel: ChannelId,
    pub packet_lifetime: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeResponse {
    pub validator: String,
    /// Consumer native units.
    pub amount: Uint128,
    /// Provider units the stake was granted in.
    pub remote: Uint128,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakesResponse {
    pub stakes: Vec<StakeResponse>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParkedRewardsResponse {
    pub rewards: Vec<ValidatorReward>,
}
