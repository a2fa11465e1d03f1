//! Configuration system for the foraging simulation.
//!
//! Supports YAML configuration files with sensible defaults.

use crate::behavior::Preset;
use crate::map::{MapConfig, MapShape};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub map: MapConfig,
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub behavior: BehaviorConfig,
    #[serde(default)]
    pub distortion: DistortionConfig,
    #[serde(default)]
    pub food: FoodConfig,
    #[serde(default)]
    pub mutation: OptimizationParameters,
    #[serde(default)]
    pub navigation: NavigationConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Per-run simulation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Path distance within which agents detect food
    pub smell_range: u16,
    /// Path distance within which agents can communicate
    pub comm_range: u16,
    /// Mean number of partners drawn by a communication loop
    pub n_comm: f64,
    /// Reject moves into cells that already hold an agent
    pub exclusive_cells: bool,
    /// Ticks per run
    pub t_max: u64,
    /// Ticks between progress log lines and series samples
    pub stats_interval: u64,
}

/// Which behaviour drives the agents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorConfig {
    pub preset: Preset,
    /// YAML brain file; overrides the preset when set
    #[serde(default)]
    pub file: Option<PathBuf>,
}

/// Corruption applied when an agent reads another agent's memory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistortionConfig {
    /// Chance a float register read is perturbed
    pub float_probability: f64,
    /// Std of the multiplicative normal perturbation
    pub float_std: f64,
    /// Chance a coordinate read is displaced
    pub coord_probability: f64,
    /// Mean number of random hops away from the colony
    pub coord_hops: f64,
}

/// Food dynamics during a run. All zero keeps the initial food static.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodConfig {
    /// Per-tick chance of a new food cell appearing
    pub spawn_chance: f64,
    pub spawn_amount: u32,
    pub spawn_density_min: f64,
    pub spawn_density_max: f64,
    /// Per-tick chance that one unit of food disappears from a random food cell
    pub decay_chance: f64,
}

/// Rates for the structural mutation operators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationParameters {
    /// Chance an expansion wraps a subtree in NOT instead of AND/OR
    pub p_not: f64,
    /// Chance a random comparison is against a constant
    pub p_const: f64,
    /// Chance a random sensor reads the acting agent rather than the saved target
    pub p_target_self: f64,
    /// Chance a sensor inside an agent-selection condition reads the queried agent
    pub p_queried: f64,
    pub const_min: i64,
    pub const_max: i64,
    /// Mean number of edges added (and removed) per automaton mutation
    pub condition_amount_mutate_rate: f64,
    /// Mean number of expansions (and reductions) per condition mutation
    pub condition_mutate_rate: f64,
    /// Chance each finish edge is repointed
    pub finish_edge_mutation_rate: f64,
    /// Chance each action slot is replaced or cleared
    pub action_mutation_rate: f64,
}

/// Pathfinding strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationConfig {
    /// Use the all-pairs tables instead of lazily built single-source fields
    pub precompute: bool,
    pub cache_dir: PathBuf,
}

/// Parallel batch settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerConfig {
    pub runs: usize,
    /// Worker threads, 0 for one per core
    pub workers: usize,
    /// Tasks submitted to the pool at a time
    pub max_in_flight: usize,
}

/// Logging and output configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    pub log_level: String,
    pub results_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            map: MapConfig::default(),
            simulation: SimulationConfig::default(),
            behavior: BehaviorConfig::default(),
            distortion: DistortionConfig::default(),
            food: FoodConfig::default(),
            mutation: OptimizationParameters::default(),
            navigation: NavigationConfig::default(),
            runner: RunnerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            smell_range: 10,
            comm_range: 10,
            n_comm: 2.0,
            exclusive_cells: false,
            t_max: 1000,
            stats_interval: 100,
        }
    }
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            preset: Preset::MemorizingTree,
            file: None,
        }
    }
}

impl Default for DistortionConfig {
    fn default() -> Self {
        Self {
            float_probability: 0.0,
            float_std: 0.1,
            coord_probability: 0.0,
            coord_hops: 2.0,
        }
    }
}

impl Default for FoodConfig {
    fn default() -> Self {
        Self {
            spawn_chance: 0.0,
            spawn_amount: 1,
            spawn_density_min: 1.0,
            spawn_density_max: 4.0,
            decay_chance: 0.0,
        }
    }
}

impl Default for OptimizationParameters {
    fn default() -> Self {
        Self {
            p_not: 0.1,
            p_const: 0.5,
            p_target_self: 0.8,
            p_queried: 0.5,
            const_min: 0,
            const_max: 10,
            condition_amount_mutate_rate: 0.5,
            condition_mutate_rate: 1.0,
            finish_edge_mutation_rate: 0.1,
            action_mutation_rate: 0.1,
        }
    }
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            precompute: false,
            cache_dir: PathBuf::from("pathfinder_cache"),
        }
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            runs: 8,
            workers: 0,
            max_in_flight: 16,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            results_dir: PathBuf::from("results"),
        }
    }
}

fn probability(name: &str, p: f64) -> Result<(), String> {
    if (0.0..=1.0).contains(&p) {
        Ok(())
    } else {
        Err(format!("{} must be between 0 and 1", name))
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a YAML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        match &self.map.shape {
            MapShape::Circle {
                r,
                big_r,
                density_min,
                density_max,
                ..
            } => {
                if r > big_r {
                    return Err("circle room radius cannot exceed the map radius".to_string());
                }
                if density_min >= density_max {
                    return Err("density_min must be below density_max".to_string());
                }
            }
            MapShape::FourRooms { r1, r2, .. } => {
                if *r1 == 0 || *r2 == 0 {
                    return Err("room radii must be > 0".to_string());
                }
            }
        }
        if self.simulation.t_max == 0 {
            return Err("t_max must be > 0".to_string());
        }
        if self.simulation.n_comm < 0.0 {
            return Err("n_comm must be >= 0".to_string());
        }
        if self.simulation.stats_interval == 0 {
            return Err("stats_interval must be > 0".to_string());
        }

        probability("float_probability", self.distortion.float_probability)?;
        probability("coord_probability", self.distortion.coord_probability)?;
        if self.distortion.float_std < 0.0 || self.distortion.coord_hops < 0.0 {
            return Err("distortion spreads must be >= 0".to_string());
        }

        probability("spawn_chance", self.food.spawn_chance)?;
        probability("decay_chance", self.food.decay_chance)?;
        if self.food.spawn_density_min > self.food.spawn_density_max {
            return Err("spawn_density_min cannot exceed spawn_density_max".to_string());
        }

        let m = &self.mutation;
        probability("p_not", m.p_not)?;
        probability("p_const", m.p_const)?;
        probability("p_target_self", m.p_target_self)?;
        probability("p_queried", m.p_queried)?;
        probability("finish_edge_mutation_rate", m.finish_edge_mutation_rate)?;
        probability("action_mutation_rate", m.action_mutation_rate)?;
        if m.const_min >= m.const_max {
            return Err("const_min must be below const_max".to_string());
        }
        if m.condition_mutate_rate < 0.0 || m.condition_amount_mutate_rate < 0.0 {
            return Err("mutation rates must be >= 0".to_string());
        }

        if self.runner.max_in_flight == 0 {
            return Err("max_in_flight must be > 0".to_string());
        }
        Ok(())
    }
}
