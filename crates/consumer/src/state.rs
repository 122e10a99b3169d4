//! Consumer bookkeeping.

use mesh_core::ContractError;
use mesh_messages::ValidatorReward;
use mesh_types::math::mul_floor;
use mesh_types::{Decimal, Sequence, Uint128};

/// Direction of a staking packet being applied through meta-staking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StakeKind {
    Stake,
    Unstake,
}

/// Stake held for one (provider key, validator).
///
/// `local` is always `floor(remote * rate)`, so converting totals rather
/// than single packets never strands rounding dust.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StakePosition {
    /// Provider units.
    pub remote: Uint128,
    /// Consumer native units.
    pub local: Uint128,
}

impl StakePosition {
    /// Position after adding `amount` provider units.
    pub fn staked(&self, amount: Uint128, rate: Decimal) -> Result<Self, ContractError> {
        let remote = self.remote.checked_add(amount)?;
        Ok(Self {
            remote,
            local: mul_floor(remote, rate)?,
        })
    }

    /// Position after removing `amount` provider units.
    pub fn unstaked(&self, amount: Uint128, rate: Decimal) -> Result<Self, ContractError> {
        let remote = self.remote.checked_sub(amount)?;
        Ok(Self {
            remote,
            local: mul_floor(remote, rate)?,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.remote.is_zero() && self.local.is_zero()
    }
}

/// A received staking packet waiting for the meta-staking reply that
/// decides its ack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InflightOp {
    pub sequence: Sequence,
    pub kind: StakeKind,
    pub key: String,
    pub validator: String,
    /// Position to store once meta-staking accepts.
    pub position: StakePosition,
    /// Amount in consumer native units.
    pub local_amount: Uint128,
}

/// An outbound reward packet awaiting its ack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRewards {
    pub rewards: Vec<ValidatorReward>,
}
