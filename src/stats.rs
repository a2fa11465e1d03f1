//! Run statistics: periodic snapshots and the final result vector.

use crate::agent::Agent;
use crate::pathfinder::UNREACHABLE;
use crate::world::World;
use serde::{Deserialize, Serialize};

/// Statistics snapshot for a simulation step
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    /// Simulation time
    pub time: u64,
    /// Accumulated score
    pub score: f64,
    /// Units delivered to the colony
    pub food_collected: u64,
    /// Agents currently carrying food
    pub carrying: usize,
    /// Mean path distance from agents to the colony
    pub mean_colony_distance: f64,
    /// Food units left on the map
    pub food_remaining: u64,
}

impl Stats {
    /// Snapshot the current world
    pub fn capture(world: &mut World, agents: &[Agent]) -> Self {
        let colony = world.colony;
        // Agents walled off from the colony do not count towards the mean
        let reachable: Vec<u64> = agents
            .iter()
            .map(|a| world.navigator.distance(colony, a.pos))
            .filter(|&d| d < UNREACHABLE)
            .map(u64::from)
            .collect();
        let mean_colony_distance = if reachable.is_empty() {
            0.0
        } else {
            reachable.iter().sum::<u64>() as f64 / reachable.len() as f64
        };

        Self {
            time: world.time,
            score: world.score,
            food_collected: world.food_collected,
            carrying: agents.iter().filter(|a| a.is_holding_food).count(),
            mean_colony_distance,
            food_remaining: world.food.total_amount(),
        }
    }

    /// Format stats as a one-line summary
    pub fn summary(&self) -> String {
        format!(
            "T:{:6} | Score:{:8.1} | Collected:{:5} | Carrying:{:4} | Dist:{:6.1} | Food left:{:6}",
            self.time,
            self.score,
            self.food_collected,
            self.carrying,
            self.mean_colony_distance,
            self.food_remaining
        )
    }
}

/// Snapshots taken every `interval` ticks plus the running score average
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StatsHistory {
    pub snapshots: Vec<Stats>,
    pub interval: u64,
    score_sum: f64,
    ticks: u64,
}

impl StatsHistory {
    pub fn new(interval: u64) -> Self {
        Self {
            snapshots: Vec::new(),
            interval: interval.max(1),
            score_sum: 0.0,
            ticks: 0,
        }
    }

    /// Account for one finished tick; takes a snapshot on interval boundaries
    pub fn tick(&mut self, world: &mut World, agents: &[Agent]) -> Option<&Stats> {
        self.score_sum += world.score;
        self.ticks += 1;
        if world.time % self.interval != 0 {
            return None;
        }
        self.snapshots.push(Stats::capture(world, agents));
        self.snapshots.last()
    }

    /// Mean of the score over every tick so far
    pub fn average_score(&self) -> f64 {
        if self.ticks == 0 {
            0.0
        } else {
            self.score_sum / self.ticks as f64
        }
    }

    pub fn distance_series(&self) -> Vec<f64> {
        self.snapshots.iter().map(|s| s.mean_colony_distance).collect()
    }

    pub fn collected_series(&self) -> Vec<u64> {
        self.snapshots.iter().map(|s| s.food_collected).collect()
    }
}

/// Outcome of one simulation run
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub final_score: f64,
    pub average_score: f64,
    pub best_density: f64,
    pub food_collected: u64,
    pub distance_series: Vec<f64>,
    pub collected_series: Vec<u64>,
}

impl RunResult {
    pub fn from_history(world: &World, history: &StatsHistory) -> Self {
        Self {
            final_score: world.score,
            average_score: history.average_score(),
            best_density: world.best_density,
            food_collected: world.food_collected,
            distance_series: history.distance_series(),
            collected_series: history.collected_series(),
        }
    }

    /// Save the result to a JSON file
    pub fn save_json<P: AsRef<std::path::Path>>(&self, path: P) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
    }

    /// Load a result from a JSON file
    pub fn load_json<P: AsRef<std::path::Path>>(path: P) -> std::io::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    pub fn summary(&self) -> String {
        format!(
            "score {:.1} (avg {:.1}) | {} units collected | best density {:.1}",
            self.final_score, self.average_score, self.food_collected, self.best_density
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_json_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        let result = RunResult {
            final_score: 12.0,
            average_score: 4.5,
            best_density: 3.0,
            food_collected: 4,
            distance_series: vec![0.0, 2.5],
            collected_series: vec![0, 4],
        };
        result.save_json(&path).unwrap();
        assert_eq!(RunResult::load_json(&path).unwrap(), result);
    }

    #[test]
    fn test_mean_distance_skips_walled_off_agents() {
        use crate::config::Config;
        use crate::grid::Pos;
        use crate::map::Map;
        use crate::pathfinder::Navigator;

        let map = Map::from_ascii("#########\n#C.....1#\n#########", 2, 1).unwrap();
        let config = Config::default();
        let mut world = World::new(&map, &config, Navigator::incremental(map.walls.clone()), 1);
        let agents = vec![Agent::new(0, Pos::new(3, 1)), Agent::new(1, Pos::new(6, 1))];

        let stats = Stats::capture(&mut world, &agents);
        assert_eq!(stats.mean_colony_distance, 3.5);

        // Cut the far agent off: only the near one counts
        assert!(world.set_wall(Pos::new(5, 1)));
        let stats = Stats::capture(&mut world, &agents);
        assert_eq!(stats.mean_colony_distance, 2.0);

        // Nobody reachable
        let stranded = vec![Agent::new(1, Pos::new(6, 1))];
        assert_eq!(Stats::capture(&mut world, &stranded).mean_colony_distance, 0.0);
    }

    #[test]
    fn test_empty_history_average() {
        let history = StatsHistory::new(0);
        assert_eq!(history.interval, 1);
        assert_eq!(history.average_score(), 0.0);
    }
}
