//! Provider staking contract messages.

use crate::codec::Binary;
use mesh_types::{ConnectionId, Decimal, Uint128};
use serde::{Deserialize, Serialize};

/// Where the consumer half lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerInfo {
    /// The only connection a channel may be opened on.
    pub connection_id: ConnectionId,
}

/// Code and instantiate message for the slasher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlasherInfo {
    pub code_id: u64,
    pub msg: Binary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstantiateMsg {
    pub consumer: ConsumerInfo,
    pub slasher: Option<SlasherInfo>,
    /// Lockup contract address; the only allowed caller of `ReceiveClaim`.
    pub lockup: String,
    /// Seconds between unstake and unbond.
    pub unbonding_period: u64,
    /// Seconds before an outbound packet times out.
    #[serde(default)]
    pub packet_lifetime: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecuteMsg {
    /// Sent by the lockup after a claim was granted to this contract.
    ReceiveClaim {
        owner: String,
        amount: Uint128,
        validator: String,
    },
    /// Start unbonding part of a stake.
    Unstake { amount: Uint128, validator: String },
    /// Release every matured unbonding entry of the sender.
    Unbond {},
    /// Pay accrued rewards, for one validator or all of them.
    ClaimRewards { validator: Option<String> },
    /// Slasher only.
    Slash {
        validator: String,
        percentage: Decimal,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryMsg {
    Config {},
    /// Bound channel, if any.
    Channel {},
    Validators {
        start_after: Option<String>,
        limit: Option<u32>,
    },
    Validator { address: String },
    Account { address: String },
    PendingPackets {},
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigResponse {
    pub consumer: ConsumerInfo,
    pub slasher: Option<String>,
    pub lockup: String,
    pub unbonding_period: u64,
    pub packet_lifetime: u64,
    /// ICS20 voucher denom rewards are paid in, once known.
    pub rewards_denom: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorResponse {
    pub address: String,
    /// Provider stake the consumer has confirmed.
    pub stake: Uint128,
    /// Stake sent but not yet acknowledged.
    pub in_flight: Uint128,
    pub multiplier: Decimal,
    pub reward_index: Decimal,
    /// Rewards received while no one was staked.
    pub undistributed: Uint128,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorsResponse {
    pub validators: Vec<ValidatorResponse>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegationResponse {
    pub validator: String,
    pub staked: Uint128,
    pub in_flight: Uint128,
    pub pending_rewards: Uint128,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnbondingResponse {
    pub validator: String,
    pub amount: Uint128,
    /// Unix seconds.
    pub release_at: u64,
    /// Consumer acknowledged the undelegation.
    pub confirmed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountResponse {
    pub delegations: Vec<DelegationResponse>,
    pub unbonding: Vec<UnbondingResponse>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingPacketResponse {
    pub sequence: u64,
    /// Packet type, e.g. `CrossStake`.
    pub kind: String,
    pub owner: Option<String>,
    pub validator: Option<String>,
    pub amount: Option<Uint128>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingPacketsResponse {
    pub packets: Vec<PendingPacketResponse>,
}
