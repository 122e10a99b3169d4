//! Staking module: validator set, delegations and reward accrual.
//!
//! Bonded funds move to a module account. Undelegation pays out at once;
//! there is no unbonding queue on the host.

use crate::bank::Bank;
use crate::HostError;
use im::{OrdMap, OrdSet};
use mesh_types::{coin, Addr, Coin, Uint128};
use tracing::debug;

/// Module account holding bonded funds.
pub const BONDED_POOL: &str = "bonded_tokens_pool";

#[derive(Debug, Clone)]
pub struct Staking {
    denom: String,
    validators: OrdSet<String>,
    delegations: OrdMap<(Addr, String), Uint128>,
    rewards: OrdMap<(Addr, String), Uint128>,
}

impl Staking {
    pub fn new(denom: impl Into<String>, validators: &[String]) -> Self {
        Self {
            denom: denom.into(),
            validators: validators.iter().cloned().collect(),
            delegations: OrdMap::new(),
            rewards: OrdMap::new(),
        }
    }

    pub fn denom(&self) -> &str {
        &self.denom
    }

    pub fn validators(&self) -> Vec<String> {
        self.validators.iter().cloned().collect()
    }

    pub fn add_validator(&mut self, validator: impl Into<String>) {
        self.validators.insert(validator.into());
    }

    pub fn delegation(&self, delegator: &Addr, validator: &str) -> Uint128 {
        self.delegations
            .get(&(delegator.clone(), validator.to_string()))
            .copied()
            .unwrap_or_default()
    }

    pub fn rewards(&self, delegator: &Addr, validator: &str) -> Uint128 {
        self.rewards
            .get(&(delegator.clone(), validator.to_string()))
            .copied()
            .unwrap_or_default()
    }

    fn check(&self, validator: &str, amount: &Coin) -> Result<(), HostError> {
        if !self.validators.contains(validator) {
            return Err(HostError::UnknownValidator(validator.to_string()));
        }
        if amount.denom != self.denom {
            return Err(HostError::WrongDenom {
                expected: self.denom.clone(),
                actual: amount.denom.clone(),
            });
        }
        Ok(())
    }

    pub fn delegate(
        &mut self,
        bank: &mut Bank,
        delegator: &Addr,
        validator: &str,
        amount: &Coin,
    ) -> Result<(), HostError> {
        self.check(validator, amount)?;
        bank.send(
            delegator,
            &Addr::unchecked(BONDED_POOL),
            std::slice::from_ref(amount),
        )?;
        let key = (delegator.clone(), validator.to_string());
        let current = self.delegations.get(&key).copied().unwrap_or_default();
        self.delegations
            .insert(key, current.checked_add(amount.amount)?);
        debug!(%delegator, validator, amount = %amount.amount, "Delegated");
        Ok(())
    }

    pub fn undelegate(
        &mut self,
        bank: &mut Bank,
        delegator: &Addr,
        validator: &str,
        amount: &Coin,
    ) -> Result<(), HostError> {
        self.check(validator, amount)?;
        let key = (delegator.clone(), validator.to_string());
        let delegated = self.delegations.get(&key).copied().unwrap_or_default();
        if amount.amount > delegated {
            return Err(HostError::InsufficientDelegation {
                delegated,
                requested: amount.amount,
            });
        }
        let remaining = delegated.checked_sub(amount.amount)?;
        if remaining.is_zero() {
            self.delegations.remove(&key);
        } else {
            self.delegations.insert(key, remaining);
        }
        bank.send(
            &Addr::unchecked(BONDED_POOL),
            delegator,
            std::slice::from_ref(amount),
        )?;
        debug!(%delegator, validator, amount = %amount.amount, "Undelegated");
        Ok(())
    }

    /// Credit rewards to a delegation. They stay with the module until
    /// withdrawn.
    pub fn accrue(
        &mut self,
        delegator: &Addr,
        validator: &str,
        amount: Uint128,
    ) -> Result<(), HostError> {
        if !self.validators.contains(validator) {
            return Err(HostError::UnknownValidator(validator.to_string()));
        }
        let key = (delegator.clone(), validator.to_string());
        let current = self.rewards.get(&key).copied().unwrap_or_default();
        self.rewards.insert(key, current.checked_add(amount)?);
        Ok(())
    }

    /// Pay out accrued rewards by minting them to the delegator.
    pub fn withdraw_rewards(
        &mut self,
        bank: &mut Bank,
        delegator: &Addr,
        validator: &str,
    ) -> Result<Uint128, HostError> {
        let amount = self
            .rewards
            .remove(&(delegator.clone(), validator.to_string()))
            .unwrap_or_default();
        if !amount.is_zero() {
            bank.mint(delegator, &coin(amount.u128(), self.denom.clone()))?;
        }
        debug!(%delegator, validator, %amount, "Rewards withdrawn");
        Ok(amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_types::coin;

    #[test]
    fn test_delegate_and_undelegate() {
        let meta = Addr::unchecked("juno1meta");
        let mut bank = Bank::default();
        bank.mint(&meta, &coin(1_000, "ujuno")).unwrap();
        let mut staking = Staking::new("ujuno", &["v1".to_string()]);

        staking
            .delegate(&mut bank, &meta, "v1", &coin(600, "ujuno"))
            .unwrap();
        assert_eq!(staking.delegation(&meta, "v1"), Uint128::new(600));
        assert_eq!(bank.balance(&meta, "ujuno"), Uint128::new(400));

        assert!(matches!(
            staking.delegate(&mut bank, &meta, "v9", &coin(1, "ujuno")),
            Err(HostError::UnknownValidator(_))
        ));
        assert!(matches!(
            staking.undelegate(&mut bank, &meta, "v1", &coin(601, "ujuno")),
            Err(HostError::InsufficientDelegation { .. })
        ));

        staking
            .undelegate(&mut bank, &meta, "v1", &coin(600, "ujuno"))
            .unwrap();
        assert_eq!(bank.balance(&meta, "ujuno"), Uint128::new(1_000));
    }

    #[test]
    fn test_rewards_minted_on_withdraw() {
        let meta = Addr::unchecked("juno1meta");
        let mut bank = Bank::default();
        let mut staking = Staking::new("ujuno", &["v1".to_string()]);

        staking.accrue(&meta, "v1", Uint128::new(50)).unwrap();
        assert_eq!(staking.rewards(&meta, "v1"), Uint128::new(50));

        let paid = staking.withdraw_rewards(&mut bank, &meta, "v1").unwrap();
        assert_eq!(paid, Uint128::new(50));
        assert_eq!(bank.balance(&meta, "ujuno"), Uint128::new(50));
        assert!(staking.rewards(&meta, "v1").is_zero());
    }
}
