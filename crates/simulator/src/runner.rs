//! Round-based runner.
//!
//! ```text
//!   ┌── round ───────────────────────────────────────────────┐
//!   │ generate ops ─▶ apply on chains ─▶ relay_all ─▶ check   │──▶ advance time
//!   └─────────────────────────────────────────────────────────┘
//!   after the last round: reliable relay ─▶ check ─▶ converged?
//! ```
//!
//! Operations the contracts reject are counted, not fatal. Relayer errors
//! and invariant violations abort the run.

use crate::config::{ConfigError, SimulatorConfig};
use crate::metrics::{MetricsCollector, RunSummary, SimulationReport};
use crate::workload::{Operation, StakingWorkload, WorkloadGenerator};
use mesh_messages::slasher::ExecuteMsg as SlasherExecuteMsg;
use mesh_simulation::{HostError, NetworkConfig};
use mesh_test_helpers::{MeshSetup, VALIDATORS};
use mesh_types::math::checked_sum;
use mesh_types::{Decimal, Uint128};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum SimulatorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Host(#[from] HostError),

    #[error("Invariant violated in round {round}: {detail}")]
    Invariant { round: u32, detail: String },

    #[error("Chains did not converge: {0}")]
    NotConverged(String),
}

pub struct Simulator {
    config: SimulatorConfig,
    setup: MeshSetup,
    workload: StakingWorkload,
    rng: ChaCha8Rng,
    metrics: MetricsCollector,
    round: u32,
}

impl Simulator {
    pub fn new(config: SimulatorConfig) -> Result<Self, SimulatorError> {
        config.validate()?;
        let setup = MeshSetup::new(config.to_mesh_config())?;
        let validators = VALIDATORS.iter().map(|v| v.to_string()).collect();
        info!(
            owners = config.owners,
            rounds = config.rounds,
            seed = config.seed,
            "Simulator ready"
        );
        Ok(Self {
            workload: StakingWorkload::new(config.workload.clone(), validators),
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            metrics: MetricsCollector::new(),
            round: 0,
            setup,
            config,
        })
    }

    pub fn setup(&self) -> &MeshSetup {
        &self.setup
    }

    /// Rounds completed so far.
    pub fn round(&self) -> u32 {
        self.round
    }

    /// Run one round: apply a batch, relay, check, advance time.
    pub fn step(&mut self) -> Result<(), SimulatorError> {
        let operations = self
            .workload
            .generate_batch(self.setup.owners.len(), &mut self.rng);
        for op in operations {
            let kind = op.kind();
            match self.apply(&op) {
                Ok(()) => self.metrics.record_applied(kind),
                Err(e) => {
                    debug!(round = self.round, ?op, error = %e, "Operation rejected");
                    self.metrics.record_rejected(kind);
                }
            }
        }

        let relayed = self.setup.relay()?;
        self.metrics.record_relay(relayed);
        self.check_invariants()?;

        self.setup.advance_time(self.config.seconds_per_round);
        self.round += 1;
        Ok(())
    }

    /// Run every round, settle and report.
    pub fn run(mut self) -> Result<SimulationReport, SimulatorError> {
        while self.round < self.config.rounds {
            self.step()?;
        }
        self.settle()?;
        self.report()
    }

    /// Turn faults off and relay until quiet, then require both chains to
    /// agree.
    pub fn settle(&mut self) -> Result<(), SimulatorError> {
        self.setup.link.set_network(NetworkConfig::reliable());
        let relayed = self.setup.relay()?;
        self.metrics.record_relay(relayed);
        if self.setup.link.backlog_len() > 0 {
            return Err(SimulatorError::NotConverged(format!(
                "{} items still held by the relayer",
                self.setup.link.backlog_len()
            )));
        }
        self.check_invariants()?;
        self.check_converged()
    }

    fn apply(&mut self, op: &Operation) -> Result<(), HostError> {
        let setup = &mut self.setup;
        match op {
            Operation::Bond { owner, amount } => {
                let owner = setup.owners[*owner].clone();
                setup.bond(&owner, *amount)
            }
            Operation::Grant {
                owner,
                validator,
                amount,
            } => {
                let owner = setup.owners[*owner].clone();
                setup.grant(&owner, *amount, validator)
            }
            Operation::Unstake {
                owner,
                validator,
                amount,
            } => {
                let owner = setup.owners[*owner].clone();
                setup.unstake(&owner, *amount, validator)
            }
            Operation::Unbond { owner } => {
                let owner = setup.owners[*owner].clone();
                setup.unbond(&owner)
            }
            Operation::Release { owner, amount } => {
                let owner = setup.owners[*owner].clone();
                setup.unbond_lockup(&owner, *amount)
            }
            Operation::ClaimRewards { owner } => {
                let owner = setup.owners[*owner].clone();
                setup.claim_rewards(&owner)
            }
            Operation::Rewards { validator, amount } => {
                // Counted up front: the accrual stays even if forwarding fails
                self.metrics.record_rewards(*amount);
                setup.distribute_rewards(validator, *amount)
            }
            Operation::Slash { validator, percent } => {
                let admin = setup.admin.clone();
                let slasher = setup.slasher.clone();
                setup
                    .provider_chain
                    .execute(
                        &admin,
                        &slasher,
                        &SlasherExecuteMsg::Slash {
                            validator: validator.clone(),
                            percentage: Decimal::percent(*percent),
                        },
                        &[],
                    )
                    .map(|_| ())
            }
        }
    }

    fn violation(&self, detail: String) -> SimulatorError {
        warn!(round = self.round, %detail, "Invariant violated");
        SimulatorError::Invariant {
            round: self.round,
            detail,
        }
    }

    /// Properties that hold after every relay pass, faults or not.
    pub fn check_invariants(&self) -> Result<(), SimulatorError> {
        let setup = &self.setup;

        for owner in &setup.owners {
            let balance = setup.lockup_balance(owner)?;
            let claimed = checked_sum(balance.claims.iter().map(|c| c.amount))
                .map_err(|e| self.violation(format!("{owner} claims overflow: {e}")))?;
            if claimed > balance.bonded {
                return Err(self.violation(format!(
                    "{owner} has {claimed} claimed over {} bonded",
                    balance.bonded
                )));
            }
            if balance.free.checked_add(claimed).ok() != Some(balance.bonded) {
                return Err(self.violation(format!(
                    "{owner} free {} plus claims {claimed} differs from bonded {}",
                    balance.free, balance.bonded
                )));
            }
        }

        let consumer = setup.meta_consumer()?;
        if consumer.total_staked > consumer.available_funds {
            return Err(self.violation(format!(
                "meta-staking staked {} over {} available",
                consumer.total_staked, consumer.available_funds
            )));
        }

        let mut delegated = 0u128;
        for validator in VALIDATORS {
            let meta = setup.meta_delegation(validator)?;
            let module = setup
                .consumer_chain
                .delegation(&setup.meta_staking, validator);
            if module != meta {
                return Err(self.violation(format!(
                    "{validator}: staking module holds {module}, meta-staking records {meta}"
                )));
            }
            delegated += meta.u128();
        }
        if delegated != consumer.total_staked.u128() {
            return Err(self.violation(format!(
                "delegations sum to {delegated}, total staked is {}",
                consumer.total_staked
            )));
        }

        let claimed = self.rewards_claimed();
        if claimed > self.metrics.rewards_accrued() {
            return Err(self.violation(format!(
                "{claimed} rewards claimed, only {} accrued",
                self.metrics.rewards_accrued()
            )));
        }
        Ok(())
    }

    /// With nothing in flight, every provider stake is backed on the
    /// consumer.
    pub fn check_converged(&self) -> Result<(), SimulatorError> {
        let setup = &self.setup;
        let pending = setup.provider_chain.pending_commitments()
            + setup.consumer_chain.pending_commitments();
        if pending > 0 {
            return Err(SimulatorError::NotConverged(format!(
                "{pending} packets unresolved"
            )));
        }

        for validator in VALIDATORS {
            let meta = setup.meta_delegation(validator)?;
            let mut backed = Uint128::zero();
            for owner in &setup.owners {
                let stakes = setup.consumer_stakes(owner)?.stakes;
                let held = stakes
                    .iter()
                    .filter(|s| s.validator == validator)
                    .map(|s| s.amount);
                backed = checked_sum(held)
                    .and_then(|held| backed.checked_add(held))
                    .map_err(|e| SimulatorError::NotConverged(format!("{validator}: {e}")))?;
            }
            if backed != meta {
                return Err(SimulatorError::NotConverged(format!(
                    "{validator}: consumer stakes sum to {backed}, meta-staking holds {meta}"
                )));
            }

            let provider = setup.provider_validator(validator)?.stake;
            if self.config.exchange_rate == Decimal::one() && provider != meta {
                return Err(SimulatorError::NotConverged(format!(
                    "{validator}: provider stake {provider}, consumer delegation {meta}"
                )));
            }
        }
        Ok(())
    }

    fn rewards_claimed(&self) -> u128 {
        let voucher = self.setup.reward_voucher();
        self.setup
            .owners
            .iter()
            .map(|owner| self.setup.provider_chain.balance(owner, &voucher).u128())
            .sum()
    }

    pub fn report(&self) -> Result<SimulationReport, SimulatorError> {
        let total_staked = self.setup.meta_consumer()?.total_staked.u128();
        Ok(self.metrics.finish(RunSummary {
            rounds: self.round,
            seed: self.config.seed,
            network: self.setup.link.network_stats(),
            total_staked,
            rewards_claimed: self.rewards_claimed(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FaultConfig, WorkloadConfig};
    use crate::workload::OperationKind;
    use tracing_test::traced_test;

    fn small(seed: u64) -> SimulatorConfig {
        SimulatorConfig::default()
            .with_owners(3)
            .with_rounds(15)
            .with_seed(seed)
    }

    #[traced_test]
    #[test]
    fn test_reliable_run_converges() {
        let config = small(1).with_faults(FaultConfig::none());
        let report = Simulator::new(config).unwrap().run().unwrap();

        assert_eq!(report.rounds, 15);
        assert!(report.total_applied() > 0);
        assert_eq!(report.relayed.timeouts, 0);
        assert_eq!(report.network.dropped, 0);
        assert!(report.rewards_claimed <= report.rewards_accrued);
    }

    #[traced_test]
    #[test]
    fn test_faulty_run_keeps_invariants() {
        let faults = FaultConfig {
            drop_probability: 0.3,
            duplicate_probability: 0.2,
            reorder_probability: 0.5,
        };
        let config = small(42).with_faults(faults).with_rounds(25);
        let report = Simulator::new(config).unwrap().run().unwrap();

        assert!(report.network.dropped > 0);
        assert!(report.applied.contains_key(&OperationKind::Bond));
    }

    #[traced_test]
    #[test]
    fn test_same_seed_same_report() {
        let run = |seed| Simulator::new(small(seed)).unwrap().run().unwrap();
        assert_eq!(run(7), run(7));
    }

    #[traced_test]
    #[test]
    fn test_step_advances_round() {
        let config = small(3).with_workload(WorkloadConfig::staking_only());
        let mut simulator = Simulator::new(config).unwrap();
        simulator.step().unwrap();
        simulator.step().unwrap();
        assert_eq!(simulator.round(), 2);
        simulator.settle().unwrap();
        assert_eq!(simulator.setup().provider_chain.pending_commitments(), 0);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = SimulatorConfig::default().with_owners(0);
        assert!(matches!(
            Simulator::new(config),
            Err(SimulatorError::Config(ConfigError::Invalid(_)))
        ));
    }
}
