//! Counters collected during a run and the final report.

use crate::workload::OperationKind;
use mesh_simulation::{NetworkStats, RelayInfo};
use std::collections::BTreeMap;

/// Accumulates per-round counters.
#[derive(Debug, Clone, Default)]
pub struct MetricsCollector {
    applied: BTreeMap<OperationKind, u64>,
    rejected: BTreeMap<OperationKind, u64>,
    relayed: RelayInfo,
    rewards_accrued: u128,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_applied(&mut self, kind: OperationKind) {
        *self.applied.entry(kind).or_default() += 1;
    }

    pub fn record_rejected(&mut self, kind: OperationKind) {
        *self.rejected.entry(kind).or_default() += 1;
    }

    pub fn record_relay(&mut self, info: RelayInfo) {
        self.relayed.packets_from_a += info.packets_from_a;
        self.relayed.packets_from_b += info.packets_from_b;
        self.relayed.acks_from_a += info.acks_from_a;
        self.relayed.acks_from_b += info.acks_from_b;
        self.relayed.timeouts += info.timeouts;
    }

    pub fn record_rewards(&mut self, amount: u128) {
        self.rewards_accrued = self.rewards_accrued.saturating_add(amount);
    }

    /// Consumer rewards accrued so far; an upper bound on what owners can
    /// ever claim.
    pub fn rewards_accrued(&self) -> u128 {
        self.rewards_accrued
    }

    pub fn finish(&self, end: RunSummary) -> SimulationReport {
        SimulationReport {
            rounds: end.rounds,
            seed: end.seed,
            applied: self.applied.clone(),
            rejected: self.rejected.clone(),
            relayed: self.relayed,
            network: end.network,
            total_staked: end.total_staked,
            rewards_accrued: self.rewards_accrued,
            rewards_claimed: end.rewards_claimed,
        }
    }
}

/// State read from the chains once the run has settled.
#[derive(Debug, Clone, Copy)]
pub struct RunSummary {
    pub rounds: u32,
    pub seed: u64,
    pub network: NetworkStats,
    pub total_staked: u128,
    pub rewards_claimed: u128,
}

/// Outcome of a full run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationReport {
    pub rounds: u32,
    pub seed: u64,
    pub applied: BTreeMap<OperationKind, u64>,
    pub rejected: BTreeMap<OperationKind, u64>,
    /// Link side A is the consumer chain.
    pub relayed: RelayInfo,
    pub network: NetworkStats,
    /// Consumer stake held by meta-staking after settling.
    pub total_staked: u128,
    pub rewards_accrued: u128,
    /// Reward vouchers paid out to owners on the provider chain.
    pub rewards_claimed: u128,
}

impl SimulationReport {
    pub fn total_applied(&self) -> u64 {
        self.applied.values().sum()
    }

    pub fn total_rejected(&self) -> u64 {
        self.rejected.values().sum()
    }

    pub fn print(&self) {
        println!("=== Simulation report (seed {}) ===", self.seed);
        println!("Rounds:            {}", self.rounds);
        println!(
            "Operations:        {} applied, {} rejected",
            self.total_applied(),
            self.total_rejected()
        );
        for kind in OperationKind::ALL {
            let applied = self.applied.get(&kind).copied().unwrap_or(0);
            let rejected = self.rejected.get(&kind).copied().unwrap_or(0);
            if applied + rejected > 0 {
                println!("  {:<15} {applied:>6} ok {rejected:>6} rejected", kind.name());
            }
        }
        println!(
            "Provider packets:  {} delivered, {} acked",
            self.relayed.packets_from_b, self.relayed.acks_from_a
        );
        println!(
            "Consumer packets:  {} delivered, {} acked",
            self.relayed.packets_from_a, self.relayed.acks_from_b
        );
        println!("Timeouts:          {}", self.relayed.timeouts);
        println!(
            "Faults:            {} dropped, {} duplicated, {} reordered rounds",
            self.network.dropped, self.network.duplicated, self.network.reordered_rounds
        );
        println!("Total staked:      {}", self.total_staked);
        println!(
            "Rewards:           {} accrued, {} claimed",
            self.rewards_accrued, self.rewards_claimed
        );
    }
}
