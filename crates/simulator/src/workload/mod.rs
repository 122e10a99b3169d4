//! Workload generation for simulations.
//!
//! Operations name owners by index, so a generated batch can be replayed
//! against any fixture with the same number of owners.

mod staking;

pub use staking::StakingWorkload;

use std::fmt;

/// What an [`Operation`] does, for counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OperationKind {
    Bond,
    Grant,
    Unstake,
    Unbond,
    Release,
    ClaimRewards,
    Rewards,
    Slash,
}

impl OperationKind {
    /// Same order as [`crate::WorkloadConfig::weights`].
    pub const ALL: [OperationKind; 8] = [
        OperationKind::Bond,
        OperationKind::Grant,
        OperationKind::Unstake,
        OperationKind::Unbond,
        OperationKind::Release,
        OperationKind::ClaimRewards,
        OperationKind::Rewards,
        OperationKind::Slash,
    ];

    pub fn name(self) -> &'static str {
        match self {
            OperationKind::Bond => "bond",
            OperationKind::Grant => "grant",
            OperationKind::Unstake => "unstake",
            OperationKind::Unbond => "unbond",
            OperationKind::Release => "release",
            OperationKind::ClaimRewards => "claim_rewards",
            OperationKind::Rewards => "rewards",
            OperationKind::Slash => "slash",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One user or keeper action against the two chains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Lock provider tokens in the lockup.
    Bond { owner: usize, amount: u128 },
    /// Grant the provider a claim, cross-staking it.
    Grant {
        owner: usize,
        validator: String,
        amount: u128,
    },
    Unstake {
        owner: usize,
        validator: String,
        amount: u128,
    },
    /// Release matured unbonding entries back to the lockup.
    Unbond { owner: usize },
    /// Withdraw free tokens out of the lockup.
    Release { owner: usize, amount: u128 },
    ClaimRewards { owner: usize },
    /// Accrue consumer staking rewards and forward them to the provider.
    Rewards { validator: String, amount: u128 },
    Slash { validator: String, percent: u64 },
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Bond { .. } => OperationKind::Bond,
            Operation::Grant { .. } => OperationKind::Grant,
            Operation::Unstake { .. } => OperationKind::Unstake,
            Operation::Unbond { .. } => OperationKind::Unbond,
            Operation::Release { .. } => OperationKind::Release,
            Operation::ClaimRewards { .. } => OperationKind::ClaimRewards,
            Operation::Rewards { .. } => OperationKind::Rewards,
            Operation::Slash { .. } => OperationKind::Slash,
        }
    }
}

/// Trait for generating operation workloads.
pub trait WorkloadGenerator {
    /// Generate a batch of operations for `owners` accounts.
    fn generate_batch(&mut self, owners: usize, rng: &mut impl rand::Rng) -> Vec<Operation>;

    /// Generate a single operation.
    fn generate_one(&mut self, owners: usize, rng: &mut impl rand::Rng) -> Option<Operation>;
}
