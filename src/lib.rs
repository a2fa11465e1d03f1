//! # forage
//!
//! Multi-agent foraging simulator. Agents leave a colony, find food patches
//! of varying density on a walled grid and carry food home. Every agent is
//! driven by the same brain: a finite-state automaton or a behaviour tree
//! built from mutable condition trees and actions.
//!
//! ## Features
//!
//! - **Incremental pathfinding**: single-source fields that follow wall
//!   changes, or all-pairs tables cached on disk
//! - **Evolvable behaviour**: conditions, automata and trees mutate with
//!   Poisson-sized structural changes
//! - **Communication**: agents read each other's memory, with optional noise
//! - **Parallel**: independent runs spread over all cores via Rayon
//! - **Reproducible**: seeded random number generation
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use forage::{Brain, Config, Map, Simulation};
//! use forage::behavior::Preset;
//!
//! let config = Config::default();
//! let map = Map::generate(&config.map).unwrap();
//! let brain = Brain::from_preset(Preset::CommunicatingTree);
//!
//! let mut sim = Simulation::new(&map, brain, &config, 42);
//! sim.run(1000);
//! println!("Score: {}", sim.score());
//! ```
//!
//! ## Batches
//!
//! ```rust,no_run
//! use forage::{runner, simulation, Brain, Config, Map};
//! use forage::pathfinder::Navigator;
//!
//! let config = Config::default();
//! let map = Map::generate(&config.map).unwrap();
//! let brain = Brain::from_config(&config.behavior).unwrap();
//!
//! let results = runner::run_batch(config.runner.runs, &config.runner, |id| {
//!     let navigator = Navigator::incremental(map.walls.clone());
//!     simulation::run_hidden(id, &map, &brain, &config, config.simulation.t_max, navigator)
//! });
//! ```

pub mod agent;
pub mod behavior;
pub mod chunks;
pub mod config;
pub mod grid;
pub mod map;
pub mod pathfinder;
pub mod results;
pub mod runner;
pub mod simulation;
pub mod stats;
pub mod world;

// Re-export main types
pub use agent::Agent;
pub use behavior::Brain;
pub use config::Config;
pub use map::Map;
pub use simulation::Simulation;
pub use stats::RunResult;
pub use world::World;

use pathfinder::{AllPairsPathfinder, Navigator};
use std::sync::Arc;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Navigation backend for a map: the shared all-pairs table when
/// precomputation is enabled, else lazily built fields
pub fn navigator_source(map: &Map, config: &Config) -> NavigatorSource {
    if config.navigation.precompute {
        let table = AllPairsPathfinder::load_or_build(map, &config.navigation.cache_dir);
        NavigatorSource::Shared(Arc::new(table))
    } else {
        NavigatorSource::Lazy
    }
}

/// Hands out one navigator per run
pub enum NavigatorSource {
    Shared(Arc<AllPairsPathfinder>),
    Lazy,
}

impl NavigatorSource {
    pub fn navigator(&self, map: &Map) -> Navigator {
        match self {
            NavigatorSource::Shared(table) => Navigator::precomputed(Arc::clone(table)),
            NavigatorSource::Lazy => Navigator::incremental(map.walls.clone()),
        }
    }
}

/// Run a quick benchmark on the default map
pub fn benchmark(steps: u64, creatures: usize) -> Result<BenchmarkResult, String> {
    use std::time::Instant;

    let mut config = Config::default();
    config.map.creature_count = creatures;
    let map = Map::generate(&config.map)?;
    let brain = Brain::from_preset(config.behavior.preset);

    let mut sim = Simulation::new(&map, brain, &config, config.map.seed);

    let start = Instant::now();
    sim.run(steps);
    let elapsed = start.elapsed();

    Ok(BenchmarkResult {
        steps,
        creatures,
        elapsed_secs: elapsed.as_secs_f64(),
        steps_per_second: steps as f64 / elapsed.as_secs_f64(),
        final_score: sim.score(),
    })
}

/// Benchmark result
#[derive(Debug, Clone)]
pub struct BenchmarkResult {
    pub steps: u64,
    pub creatures: usize,
    pub elapsed_secs: f64,
    pub steps_per_second: f64,
    pub final_score: f64,
}

impl std::fmt::Display for BenchmarkResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Benchmark Results ===")?;
        writeln!(f, "Steps: {}", self.steps)?;
        writeln!(f, "Agents: {}", self.creatures)?;
        writeln!(f, "Time: {:.3}s", self.elapsed_secs)?;
        writeln!(f, "Speed: {:.1} steps/s", self.steps_per_second)?;
        writeln!(f, "Final score: {:.1}", self.final_score)?;
        Ok(())
    }
}
