//! Weighted random cross-stake operations.

use super::{Operation, OperationKind, WorkloadGenerator};
use crate::config::WorkloadConfig;
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;

/// Picks operations by weight with uniformly random owners, validators and
/// amounts. Invalid picks (unstaking more than is staked, unbonding too
/// early) are generated on purpose: the contracts must reject them cleanly.
pub struct StakingWorkload {
    config: WorkloadConfig,
    validators: Vec<String>,
    /// `None` when every weight is zero.
    kinds: Option<WeightedIndex<u32>>,
}

impl StakingWorkload {
    pub fn new(config: WorkloadConfig, validators: Vec<String>) -> Self {
        let kinds = WeightedIndex::new(config.weights()).ok();
        Self {
            config,
            validators,
            kinds,
        }
    }

    fn validator(&self, rng: &mut impl Rng) -> Option<String> {
        if self.validators.is_empty() {
            return None;
        }
        Some(self.validators[rng.gen_range(0..self.validators.len())].clone())
    }
}

impl WorkloadGenerator for StakingWorkload {
    fn generate_batch(&mut self, owners: usize, rng: &mut impl Rng) -> Vec<Operation> {
        let mut operations = Vec::with_capacity(self.config.ops_per_round);

        for _ in 0..self.config.ops_per_round {
            if let Some(op) = self.generate_one(owners, rng) {
                operations.push(op);
            }
        }

        operations
    }

    fn generate_one(&mut self, owners: usize, rng: &mut impl Rng) -> Option<Operation> {
        if owners == 0 {
            return None;
        }
        let kind = OperationKind::ALL[self.kinds.as_ref()?.sample(rng)];
        let owner = rng.gen_range(0..owners);
        let stake = u128::from(rng.gen_range(1..=self.config.max_stake));

        let op = match kind {
            OperationKind::Bond => Operation::Bond {
                owner,
                amount: u128::from(rng.gen_range(1..=self.config.max_bond)),
            },
            OperationKind::Grant => Operation::Grant {
                owner,
                validator: self.validator(rng)?,
                amount: stake,
            },
            OperationKind::Unstake => Operation::Unstake {
                owner,
                validator: self.validator(rng)?,
                amount: stake / 2 + 1,
            },
            OperationKind::Unbond => Operation::Unbond { owner },
            OperationKind::Release => Operation::Release {
                owner,
                amount: stake,
            },
            OperationKind::ClaimRewards => Operation::ClaimRewards { owner },
            OperationKind::Rewards => Operation::Rewards {
                validator: self.validator(rng)?,
                amount: u128::from(rng.gen_range(1..=self.config.max_reward)),
            },
            OperationKind::Slash => Operation::Slash {
                validator: self.validator(rng)?,
                percent: rng.gen_range(1..=self.config.max_slash_percent),
            },
        };
        Some(op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn validators() -> Vec<String> {
        vec!["val1alpha".to_string(), "val1beta".to_string()]
    }

    #[test]
    fn test_same_seed_same_batch() {
        let mut first = StakingWorkload::new(WorkloadConfig::default(), validators());
        let mut second = StakingWorkload::new(WorkloadConfig::default(), validators());
        let mut rng_a = ChaCha8Rng::seed_from_u64(9);
        let mut rng_b = ChaCha8Rng::seed_from_u64(9);

        for _ in 0..10 {
            assert_eq!(
                first.generate_batch(4, &mut rng_a),
                second.generate_batch(4, &mut rng_b)
            );
        }
    }

    #[test]
    fn test_zero_weight_is_never_picked() {
        let mut workload = StakingWorkload::new(WorkloadConfig::staking_only(), validators());
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        let batch: Vec<_> = (0..50)
            .flat_map(|_| workload.generate_batch(3, &mut rng))
            .collect();
        assert_eq!(batch.len(), 50 * WorkloadConfig::default().ops_per_round);
        assert!(batch.iter().all(|op| matches!(
            op.kind(),
            OperationKind::Bond | OperationKind::Grant | OperationKind::Unstake
        )));
    }

    #[test]
    fn test_values_within_bounds() {
        let config = WorkloadConfig::default();
        let mut workload = StakingWorkload::new(config.clone(), validators());
        let mut rng = ChaCha8Rng::seed_from_u64(3);

        for op in (0..100).flat_map(|_| workload.generate_batch(2, &mut rng)) {
            match op {
                Operation::Bond { owner, amount } => {
                    assert!(owner < 2);
                    assert!((1..=u128::from(config.max_bond)).contains(&amount));
                }
                Operation::Grant {
                    validator, amount, ..
                }
                | Operation::Unstake {
                    validator, amount, ..
                } => {
                    assert!(validators().contains(&validator));
                    assert!((1..=u128::from(config.max_stake)).contains(&amount));
                }
                Operation::Slash { percent, .. } => {
                    assert!((1..=config.max_slash_percent).contains(&percent));
                }
                _ => {}
            }
        }
    }

    #[test]
    fn test_no_owners_no_operations() {
        let mut workload = StakingWorkload::new(WorkloadConfig::default(), validators());
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        assert!(workload.generate_batch(0, &mut rng).is_empty());
    }
}
