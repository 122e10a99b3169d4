//! Provider ledger entries.

use mesh_core::ContractError;
use mesh_types::math::{decimal_add, decimal_sub, mul_floor, mul_ratio_floor};
use mesh_types::{Addr, Decimal, Sequence, Timestamp, Uint128};

/// A consumer validator as tracked on the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorState {
    /// Stake the consumer has confirmed. Only this earns rewards.
    pub stake: Uint128,
    /// Stake sent but not yet acknowledged.
    pub in_flight: Uint128,
    /// Product of `1 - percentage` over every slash so far. Starts at one
    /// and only shrinks.
    pub multiplier: Decimal,
    /// Cumulative rewards per unit of confirmed stake.
    pub reward_index: Decimal,
    /// Rewards that arrived while `stake` was zero.
    pub undistributed: Uint128,
}

impl Default for ValidatorState {
    fn default() -> Self {
        Self {
            stake: Uint128::zero(),
            in_flight: Uint128::zero(),
            multiplier: Decimal::one(),
            reward_index: Decimal::zero(),
            undistributed: Uint128::zero(),
        }
    }
}

impl ValidatorState {
    /// Spread `amount` over the confirmed stake. Returns the part credited
    /// to stakers.
    pub fn distribute(&mut self, amount: Uint128) -> Result<Uint128, ContractError> {
        if self.stake.is_zero() {
            self.undistributed = self.undistributed.checked_add(amount)?;
            return Ok(Uint128::zero());
        }
        let per_unit = Decimal::checked_from_ratio(amount, self.stake)?;
        self.reward_index = decimal_add(self.reward_index, per_unit)?;
        Ok(amount)
    }

    /// Scale the multiplier by `1 - percentage`.
    pub fn slash(&mut self, percentage: Decimal) -> Result<(), ContractError> {
        let remaining = decimal_sub(Decimal::one(), percentage)?;
        self.multiplier = self.multiplier.checked_mul(remaining)?;
        Ok(())
    }
}

/// Part of `amount`, staked when the validator multiplier was `recorded`,
/// that survives the slashes up to `current`.
pub fn surviving(
    amount: Uint128,
    current: Decimal,
    recorded: Decimal,
) -> Result<Uint128, ContractError> {
    if current.is_zero() || recorded.is_zero() {
        return Ok(Uint128::zero());
    }
    if current == recorded {
        return Ok(amount);
    }
    Ok(mul_ratio_floor(amount, current, recorded)?)
}

/// One owner's stake on one validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delegation {
    /// Stake the consumer has confirmed.
    pub staked: Uint128,
    /// Stake waiting for its ack; earns nothing and cannot be unstaked.
    pub in_flight: Uint128,
    /// Validator multiplier `staked` is measured against. Only slashes
    /// after this point reduce it.
    pub multiplier: Decimal,
    /// Validator reward index at the last settlement.
    pub reward_snapshot: Decimal,
    /// Rewards settled but not yet paid.
    pub accrued: Uint128,
}

impl Default for Delegation {
    fn default() -> Self {
        Self {
            staked: Uint128::zero(),
            in_flight: Uint128::zero(),
            multiplier: Decimal::one(),
            reward_snapshot: Decimal::zero(),
            accrued: Uint128::zero(),
        }
    }
}

impl Delegation {
    /// Move rewards earned since the last snapshot into `accrued`.
    pub fn settle(&mut self, reward_index: Decimal) -> Result<(), ContractError> {
        let delta = decimal_sub(reward_index, self.reward_snapshot)?;
        let earned = mul_floor(self.staked, delta)?;
        self.accrued = self.accrued.checked_add(earned)?;
        self.reward_snapshot = reward_index;
        Ok(())
    }

    /// Add `amount` recorded at multiplier `recorded`, re-basing the
    /// delegation so its surviving stake under `current` is the sum of
    /// both parts.
    pub fn add_stake(
        &mut self,
        amount: Uint128,
        recorded: Decimal,
        current: Decimal,
    ) -> Result<(), ContractError> {
        if self.staked.is_zero() {
            self.staked = amount;
            self.multiplier = recorded;
            return Ok(());
        }
        let total = self.staked.checked_add(amount)?;
        if recorded != self.multiplier {
            let survives = surviving(self.staked, current, self.multiplier)?
                .checked_add(surviving(amount, current, recorded)?)?;
            self.multiplier = if survives.is_zero() {
                recorded
            } else {
                Decimal::checked_from_ratio(total, survives)?.checked_mul(current)?
            };
        }
        self.staked = total;
        Ok(())
    }

    /// Stake that may be unstaked now.
    pub fn unstakable(&self) -> Uint128 {
        self.staked
    }

    pub fn is_empty(&self) -> bool {
        self.staked.is_zero() && self.in_flight.is_zero() && self.accrued.is_zero()
    }
}

/// Stake waiting out the unbonding period.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnbondingEntry {
    pub validator: String,
    pub amount: Uint128,
    pub release_at: Timestamp,
    /// Sequence of the unstake packet this entry belongs to.
    pub sequence: Sequence,
    /// Delegation multiplier when unstaked.
    pub multiplier: Decimal,
    /// Consumer acknowledged the undelegation.
    pub confirmed: bool,
}

impl UnbondingEntry {
    pub fn is_mature(&self, now: Timestamp) -> bool {
        self.confirmed && self.release_at <= now
    }

    /// Split into (released, slashed) under the validator's current
    /// multiplier.
    pub fn split(&self, current: Decimal) -> Result<(Uint128, Uint128), ContractError> {
        let released = surviving(self.amount, current, self.multiplier)?;
        Ok((released, self.amount.checked_sub(released)?))
    }
}

/// What an unacknowledged outbound packet did, so it can be undone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingOp {
    ListValidators,
    Stake {
        owner: Addr,
        validator: String,
        amount: Uint128,
        /// Validator multiplier when sent.
        multiplier: Decimal,
    },
    Unstake {
        owner: Addr,
        validator: String,
        amount: Uint128,
        /// Delegation multiplier the amount left with.
        multiplier: Decimal,
    },
}

impl PendingOp {
    pub fn type_name(&self) -> &'static str {
        match self {
            PendingOp::ListValidators => "ListValidators",
            PendingOp::Stake { .. } => "CrossStake",
            PendingOp::Unstake { .. } => "Undelegate",
        }
    }
}
