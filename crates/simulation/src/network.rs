//! Fault injection for relayed packets and acknowledgements.

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Relay fault model.
///
/// A dropped item is not lost: it stays with the relayer and is retried on
/// the next relay pass, by which time the packet may have timed out.
#[derive(Clone, Debug)]
pub struct NetworkConfig {
    /// Probability an item is held back for a later pass.
    pub drop_probability: f64,

    /// Probability an item is delivered twice.
    pub duplicate_probability: f64,

    /// Probability a relay round is shuffled before delivery.
    pub reorder_probability: f64,

    /// Seed for the fault RNG.
    pub seed: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            drop_probability: 0.0,
            duplicate_probability: 0.0,
            reorder_probability: 0.0,
            seed: 0,
        }
    }
}

impl NetworkConfig {
    /// No faults.
    pub fn reliable() -> Self {
        Self::default()
    }

    /// Every fault enabled at a moderate rate.
    pub fn lossy(seed: u64) -> Self {
        Self {
            drop_probability: 0.2,
            duplicate_probability: 0.1,
            reorder_probability: 0.5,
            seed,
        }
    }

    pub fn with_drop_probability(mut self, p: f64) -> Self {
        self.drop_probability = p.clamp(0.0, 1.0);
        self
    }

    pub fn with_duplicate_probability(mut self, p: f64) -> Self {
        self.duplicate_probability = p.clamp(0.0, 1.0);
        self
    }

    pub fn with_reorder_probability(mut self, p: f64) -> Self {
        self.reorder_probability = p.clamp(0.0, 1.0);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// What happens to one relayed item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fate {
    Deliver,
    Duplicate,
    Drop,
}

/// Counters of injected faults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetworkStats {
    pub dropped: u64,
    pub duplicated: u64,
    pub reordered_rounds: u64,
}

pub struct SimulatedNetwork {
    config: NetworkConfig,
    rng: ChaCha8Rng,
    stats: NetworkStats,
}

impl SimulatedNetwork {
    pub fn new(config: NetworkConfig) -> Self {
        let rng = ChaCha8Rng::seed_from_u64(config.seed);
        Self {
            config,
            rng,
            stats: NetworkStats::default(),
        }
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    /// Swap the fault model, keeping the RNG stream.
    pub fn set_config(&mut self, config: NetworkConfig) {
        self.config = config;
    }

    pub fn stats(&self) -> NetworkStats {
        self.stats
    }

    pub fn fate(&mut self) -> Fate {
        if self.config.drop_probability > 0.0 && self.rng.gen_bool(self.config.drop_probability) {
            self.stats.dropped += 1;
            return Fate::Drop;
        }
        if self.config.duplicate_probability > 0.0
            && self.rng.gen_bool(self.config.duplicate_probability)
        {
            self.stats.duplicated += 1;
            return Fate::Duplicate;
        }
        Fate::Deliver
    }

    pub fn maybe_reorder<T>(&mut self, items: &mut [T]) {
        if items.len() > 1
            && self.config.reorder_probability > 0.0
            && self.rng.gen_bool(self.config.reorder_probability)
        {
            items.shuffle(&mut self.rng);
            self.stats.reordered_rounds += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reliable_always_delivers() {
        let mut network = SimulatedNetwork::new(NetworkConfig::reliable());
        assert!((0..100).all(|_| network.fate() == Fate::Deliver));
        assert_eq!(network.stats(), NetworkStats::default());
    }

    #[test]
    fn test_same_seed_same_faults() {
        let run = |seed| {
            let mut network = SimulatedNetwork::new(NetworkConfig::lossy(seed));
            (0..50).map(|_| network.fate()).collect::<Vec<_>>()
        };
        assert_eq!(run(7), run(7));
        assert!(run(7).contains(&Fate::Drop));
    }

    #[test]
    fn test_full_drop() {
        let mut network =
            SimulatedNetwork::new(NetworkConfig::reliable().with_drop_probability(1.0));
        assert_eq!(network.fate(), Fate::Drop);
        assert_eq!(network.stats().dropped, 1);
    }
}
