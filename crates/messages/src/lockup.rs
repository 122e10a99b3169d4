//! Lockup ledger messages.

use mesh_types::Uint128;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstantiateMsg {
    /// Denomination accepted for bonding.
    pub denom: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecuteMsg {
    /// Lock the attached funds.
    Bond {},
    /// Withdraw unclaimed funds back to the owner.
    Unbond { amount: Uint128 },
    /// Authorize `leinholder` to stake `amount` of the sender's bonded funds
    /// on `validator`. The leinholder is notified in the same transaction.
    GrantClaim {
        leinholder: String,
        amount: Uint128,
        validator: String,
    },
    /// Leinholder only: give back part of a claim.
    ReleaseClaim {
        owner: String,
        amount: Uint128,
        validator: String,
    },
    /// Leinholder only: reduce a claim and burn the same amount of the
    /// owner's bonded funds.
    SlashClaim {
        owner: String,
        amount: Uint128,
        validator: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryMsg {
    Config {},
    Balance { account: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigResponse {
    pub denom: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeinResponse {
    pub leinholder: String,
    pub validator: String,
    pub amount: Uint128,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub bonded: Uint128,
    /// `bonded` minus the sum of all claims.
    pub free: Uint128,
    pub claims: Vec<LeinResponse>,
}
