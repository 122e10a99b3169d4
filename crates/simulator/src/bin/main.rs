//! Mesh security simulator CLI
//!
//! Runs a randomized cross-stake workload between a provider and a consumer
//! chain and prints a report.

use anyhow::Context;
use clap::Parser;
use mesh_simulator::{Simulator, SimulatorConfig};
use mesh_types::Decimal;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mesh-sim")]
#[command(about = "Randomized cross-stake simulation under relay faults")]
#[command(version)]
struct Cli {
    /// TOML configuration file; flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Random seed
    #[arg(long)]
    seed: Option<u64>,

    /// Number of workload rounds
    #[arg(short, long)]
    rounds: Option<u32>,

    /// Number of owner accounts
    #[arg(long)]
    owners: Option<usize>,

    /// Consumer units per provider unit (e.g. "0.5")
    #[arg(long)]
    exchange_rate: Option<Decimal>,

    /// Probability a relayed item is held back
    #[arg(long)]
    drop: Option<f64>,

    /// Probability a relayed item is delivered twice
    #[arg(long)]
    duplicate: Option<f64>,

    /// Probability a relay round is shuffled
    #[arg(long)]
    reorder: Option<f64>,
}

impl Cli {
    fn into_config(self) -> anyhow::Result<SimulatorConfig> {
        let mut config = match &self.config {
            Some(path) => SimulatorConfig::load(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => SimulatorConfig::default(),
        };
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(rounds) = self.rounds {
            config.rounds = rounds;
        }
        if let Some(owners) = self.owners {
            config.owners = owners;
        }
        if let Some(rate) = self.exchange_rate {
            config.exchange_rate = rate;
        }
        if let Some(p) = self.drop {
            config.faults.drop_probability = p;
        }
        if let Some(p) = self.duplicate {
            config.faults.duplicate_probability = p;
        }
        if let Some(p) = self.reorder {
            config.faults.reorder_probability = p;
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let config = Cli::parse().into_config()?;
    let seed = config.seed;
    println!(
        "Running {} rounds with {} owners (seed {seed})...",
        config.rounds, config.owners
    );

    let simulator = Simulator::new(config).context("setting up chains")?;
    let report = simulator
        .run()
        .with_context(|| format!("simulation failed, rerun with --seed {seed}"))?;
    report.print();
    Ok(())
}
