//! Configuration types for the simulator.
//!
//! Every field has a default, so a TOML file only needs the values it
//! changes:
//!
//! ```toml
//! owners = 8
//! rounds = 200
//!
//! [faults]
//! drop_probability = 0.3
//!
//! [workload]
//! slash_weight = 0
//! ```

use mesh_simulation::NetworkConfig;
use mesh_test_helpers::MeshConfig;
use mesh_types::Decimal;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Configuration for a simulation run.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulatorConfig {
    /// Number of funded owner accounts on the provider chain.
    pub owners: usize,

    /// Workload rounds to run before settling.
    pub rounds: u32,

    /// Simulated time between rounds.
    pub seconds_per_round: u64,

    /// Funds meta-staking holds for the consumer.
    pub staking_capacity: u64,

    /// Consumer native units per provider unit.
    pub exchange_rate: Decimal,

    /// Seconds before a relayed packet times out.
    pub packet_lifetime: u64,

    /// Provider unbonding period in seconds.
    pub unbonding_period: u64,

    /// Relay fault model.
    pub faults: FaultConfig,

    /// Workload configuration.
    pub workload: WorkloadConfig,

    /// Random seed for deterministic simulation.
    pub seed: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            owners: 4,
            rounds: 50,
            seconds_per_round: 60,
            staking_capacity: 500_000,
            exchange_rate: Decimal::one(),
            packet_lifetime: 300,
            unbonding_period: 600,
            faults: FaultConfig::default(),
            workload: WorkloadConfig::default(),
            seed: 12345,
        }
    }
}

impl SimulatorConfig {
    /// Parse a TOML document; missing fields keep their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.owners == 0 {
            return Err(ConfigError::Invalid("at least one owner is required".into()));
        }
        if self.exchange_rate.is_zero() {
            return Err(ConfigError::Invalid("exchange rate must be positive".into()));
        }
        if self.packet_lifetime == 0 {
            return Err(ConfigError::Invalid("packet lifetime must be positive".into()));
        }
        self.faults.validate()?;
        self.workload.validate()
    }

    /// Set the number of owner accounts.
    pub fn with_owners(mut self, owners: usize) -> Self {
        self.owners = owners;
        self
    }

    /// Set the number of workload rounds.
    pub fn with_rounds(mut self, rounds: u32) -> Self {
        self.rounds = rounds;
        self
    }

    pub fn with_exchange_rate(mut self, rate: Decimal) -> Self {
        self.exchange_rate = rate;
        self
    }

    pub fn with_faults(mut self, faults: FaultConfig) -> Self {
        self.faults = faults;
        self
    }

    /// Set the workload configuration.
    pub fn with_workload(mut self, workload: WorkloadConfig) -> Self {
        self.workload = workload;
        self
    }

    /// Set the random seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Owner account names, `owner0` upwards.
    pub fn owner_names(&self) -> Vec<String> {
        (0..self.owners).map(|i| format!("owner{i}")).collect()
    }

    /// Convert to the fixture configuration for the two chains.
    pub fn to_mesh_config(&self) -> MeshConfig {
        MeshConfig {
            exchange_rate: self.exchange_rate,
            staking_capacity: u128::from(self.staking_capacity),
            unbonding_period: self.unbonding_period,
            packet_lifetime: Some(self.packet_lifetime),
            network: self.faults.to_network_config(self.seed),
            owners: self.owner_names(),
        }
    }
}

/// Relay fault probabilities.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FaultConfig {
    pub drop_probability: f64,
    pub duplicate_probability: f64,
    pub reorder_probability: f64,
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self {
            drop_probability: 0.1,
            duplicate_probability: 0.05,
            reorder_probability: 0.3,
        }
    }
}

impl FaultConfig {
    /// No faults at all.
    pub fn none() -> Self {
        Self {
            drop_probability: 0.0,
            duplicate_probability: 0.0,
            reorder_probability: 0.0,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (name, p) in [
            ("drop_probability", self.drop_probability),
            ("duplicate_probability", self.duplicate_probability),
            ("reorder_probability", self.reorder_probability),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(ConfigError::Invalid(format!("{name} must be within [0, 1]")));
            }
        }
        Ok(())
    }

    pub fn to_network_config(&self, seed: u64) -> NetworkConfig {
        NetworkConfig::reliable()
            .with_drop_probability(self.drop_probability)
            .with_duplicate_probability(self.duplicate_probability)
            .with_reorder_probability(self.reorder_probability)
            .with_seed(seed)
    }
}

/// Workload configuration.
///
/// Weights are relative: an operation with weight 4 is picked twice as
/// often as one with weight 2. A zero weight disables the operation.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct WorkloadConfig {
    /// Operations generated per round.
    pub ops_per_round: usize,

    pub bond_weight: u32,
    pub grant_weight: u32,
    pub unstake_weight: u32,
    pub unbond_weight: u32,
    pub release_weight: u32,
    pub claim_weight: u32,
    pub rewards_weight: u32,
    pub slash_weight: u32,

    /// Upper bound for a single bond, in provider units.
    pub max_bond: u64,
    /// Upper bound for a single grant or unstake.
    pub max_stake: u64,
    /// Upper bound for one reward accrual, in consumer units.
    pub max_reward: u64,
    /// Upper bound for one slash, in percent.
    pub max_slash_percent: u64,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            ops_per_round: 6,
            bond_weight: 3,
            grant_weight: 4,
            unstake_weight: 2,
            unbond_weight: 2,
            release_weight: 1,
            claim_weight: 1,
            rewards_weight: 2,
            slash_weight: 1,
            max_bond: 50_000,
            max_stake: 20_000,
            max_reward: 5_000,
            max_slash_percent: 10,
        }
    }
}

impl WorkloadConfig {
    /// Only bond, grant and unstake.
    pub fn staking_only() -> Self {
        Self {
            unbond_weight: 0,
            release_weight: 0,
            claim_weight: 0,
            rewards_weight: 0,
            slash_weight: 0,
            ..Default::default()
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.weights().iter().all(|w| *w == 0) {
            return Err(ConfigError::Invalid("every operation weight is zero".into()));
        }
        if self.max_bond == 0 || self.max_stake == 0 || self.max_reward == 0 {
            return Err(ConfigError::Invalid("amount bounds must be positive".into()));
        }
        if self.max_slash_percent == 0 || self.max_slash_percent > 100 {
            return Err(ConfigError::Invalid(
                "max_slash_percent must be within [1, 100]".into(),
            ));
        }
        Ok(())
    }

    /// Weights in [`crate::OperationKind::ALL`] order.
    pub fn weights(&self) -> [u32; 8] {
        [
            self.bond_weight,
            self.grant_weight,
            self.unstake_weight,
            self.unbond_weight,
            self.release_weight,
            self.claim_weight,
            self.rewards_weight,
            self.slash_weight,
        ]
    }

    /// Set the number of operations per round.
    pub fn with_ops_per_round(mut self, ops: usize) -> Self {
        self.ops_per_round = ops;
        self
    }

    pub fn with_slash_weight(mut self, weight: u32) -> Self {
        self.slash_weight = weight;
        self
    }
}
