//! Bank balances.

use crate::HostError;
use im::OrdMap;
use mesh_types::math::checked_sum;
use mesh_types::{coin, Addr, Coin, Uint128};

#[derive(Debug, Clone, Default)]
pub struct Bank {
    balances: OrdMap<(Addr, String), Uint128>,
}

impl Bank {
    pub fn balance(&self, address: &Addr, denom: &str) -> Uint128 {
        self.balances
            .get(&(address.clone(), denom.to_string()))
            .copied()
            .unwrap_or_default()
    }

    /// All non-zero balances of `address`, ordered by denom.
    pub fn all_balances(&self, address: &Addr) -> Vec<Coin> {
        self.balances
            .iter()
            .filter(|((owner, _), amount)| owner == address && !amount.is_zero())
            .map(|((_, denom), amount)| coin(amount.u128(), denom.clone()))
            .collect()
    }

    /// Total amount of `denom` held across all accounts.
    pub fn supply(&self, denom: &str) -> Result<Uint128, HostError> {
        let held = self
            .balances
            .iter()
            .filter(|((_, d), _)| d == denom)
            .map(|(_, amount)| *amount);
        Ok(checked_sum(held)?)
    }

    pub fn mint(&mut self, address: &Addr, coin: &Coin) -> Result<(), HostError> {
        let key = (address.clone(), coin.denom.clone());
        let current = self.balances.get(&key).copied().unwrap_or_default();
        self.balances.insert(key, current.checked_add(coin.amount)?);
        Ok(())
    }

    pub fn burn(&mut self, address: &Addr, coin: &Coin) -> Result<(), HostError> {
        let key = (address.clone(), coin.denom.clone());
        let balance = self.balances.get(&key).copied().unwrap_or_default();
        if balance < coin.amount {
            return Err(HostError::InsufficientFunds {
                address: address.clone(),
                denom: coin.denom.clone(),
                balance,
                required: coin.amount,
            });
        }
        let remaining = balance.checked_sub(coin.amount)?;
        if remaining.is_zero() {
            self.balances.remove(&key);
        } else {
            self.balances.insert(key, remaining);
        }
        Ok(())
    }

    pub fn send(&mut self, from: &Addr, to: &Addr, coins: &[Coin]) -> Result<(), HostError> {
        for coin in coins.iter().filter(|c| !c.amount.is_zero()) {
            self.burn(from, coin)?;
            self.mint(to, coin)?;
        }
        Ok(())
    }
}
