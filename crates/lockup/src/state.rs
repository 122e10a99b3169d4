//! Per-account lockup balances.

use mesh_types::{Addr, OverflowError, Uint128};

/// A claim on part of an account's bonded funds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lein {
    pub leinholder: Addr,
    pub validator: String,
    pub amount: Uint128,
}

/// Bonded funds of one owner and the claims against them.
///
/// Invariant: the claims never sum to more than `bonded`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Balance {
    pub bonded: Uint128,
    pub claims: Vec<Lein>,
}

impl Balance {
    /// Sum of all claims.
    pub fn claimed(&self) -> Result<Uint128, OverflowError> {
        self.claims
            .iter()
            .try_fold(Uint128::zero(), |acc, lein| acc.checked_add(lein.amount))
    }

    /// Bonded funds not covered by any claim.
    pub fn free(&self) -> Result<Uint128, OverflowError> {
        self.bonded.checked_sub(self.claimed()?)
    }

    pub fn claim(&self, leinholder: &Addr, validator: &str) -> Option<&Lein> {
        self.claims
            .iter()
            .find(|l| &l.leinholder == leinholder && l.validator == validator)
    }

    /// Add to the claim for `(leinholder, validator)`, creating it if needed.
    pub fn add_claim(
        &mut self,
        leinholder: &Addr,
        validator: &str,
        amount: Uint128,
    ) -> Result<(), OverflowError> {
        match self
            .claims
            .iter_mut()
            .find(|l| &l.leinholder == leinholder && l.validator == validator)
        {
            Some(lein) => lein.amount = lein.amount.checked_add(amount)?,
            None => self.claims.push(Lein {
                leinholder: leinholder.clone(),
                validator: validator.to_string(),
                amount,
            }),
        }
        Ok(())
    }

    /// Reduce a claim, dropping it when it reaches zero. The caller has
    /// checked that the claim exists and covers `amount`.
    pub fn reduce_claim(
        &mut self,
        leinholder: &Addr,
        validator: &str,
        amount: Uint128,
    ) -> Result<(), OverflowError> {
        if let Some(lein) = self
            .claims
            .iter_mut()
            .find(|l| &l.leinholder == leinholder && l.validator == validator)
        {
            lein.amount = lein.amount.checked_sub(amount)?;
        }
        self.claims.retain(|l| !l.amount.is_zero());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claims_merge_and_free() {
        let provider = Addr::unchecked("provider");
        let mut balance = Balance {
            bonded: Uint128::new(1000),
            claims: vec![],
        };
        balance.add_claim(&provider, "v1", Uint128::new(300)).unwrap();
        balance.add_claim(&provider, "v1", Uint128::new(200)).unwrap();
        balance.add_claim(&provider, "v2", Uint128::new(100)).unwrap();
        assert_eq!(balance.claims.len(), 2);
        assert_eq!(balance.free().unwrap(), Uint128::new(400));

        balance.reduce_claim(&provider, "v1", Uint128::new(500)).unwrap();
        assert_eq!(balance.claims.len(), 1, "empty claims are dropped");
        assert_eq!(balance.free().unwrap(), Uint128::new(900));
    }
}
