//! Mesh Simulator
//!
//! A randomized workload runner built on top of the two-chain simulation.
//! It drives owners through bond, grant, unstake and unbond, forwards
//! consumer rewards and slashes validators while the relayer drops,
//! duplicates and reorders packets, checking the cross-chain invariants
//! after every round.
//!
//! # Example
//!
//! ```ignore
//! use mesh_simulator::{FaultConfig, Simulator, SimulatorConfig};
//!
//! let config = SimulatorConfig::default()
//!     .with_owners(8)
//!     .with_rounds(200)
//!     .with_faults(FaultConfig::default());
//!
//! let report = Simulator::new(config)?.run()?;
//! report.print();
//! ```

pub mod config;
pub mod metrics;
pub mod runner;
pub mod workload;

pub use config::{ConfigError, FaultConfig, SimulatorConfig, WorkloadConfig};
pub use metrics::{MetricsCollector, SimulationReport};
pub use runner::{Simulator, SimulatorError};
pub use workload::{Operation, OperationKind, StakingWorkload, WorkloadGenerator};
