//! Simulation engine: the per-tick agent loop and headless runs.

use crate::agent::Agent;
use crate::behavior::{Brain, Context};
use crate::config::Config;
use crate::grid::FoodGrid;
use crate::map::Map;
use crate::pathfinder::Navigator;
use crate::stats::{RunResult, StatsHistory};
use crate::world::World;
use ndarray::Array2;

/// One run: a world, its agents and the brain they share
pub struct Simulation {
    pub world: World,
    pub agents: Vec<Agent>,
    pub brain: Brain,
    pub history: StatsHistory,
    seed: u64,
}

impl Simulation {
    /// Create a simulation that builds pathfinding fields on demand
    pub fn new(map: &Map, brain: Brain, config: &Config, seed: u64) -> Self {
        let navigator = Navigator::incremental(map.walls.clone());
        Self::with_navigator(map, brain, config, navigator, seed)
    }

    /// Create a simulation over an existing navigator, e.g. a shared
    /// precomputed table
    pub fn with_navigator(map: &Map, brain: Brain, config: &Config, navigator: Navigator, seed: u64) -> Self {
        let mut world = World::new(map, config, navigator, seed);
        let agents: Vec<Agent> = (0..map.creature_count)
            .map(|id| Agent::new(id, map.colony))
            .collect();
        for agent in &agents {
            world.place_agent(agent);
        }

        Self {
            world,
            agents,
            brain,
            history: StatsHistory::new(config.simulation.stats_interval),
            seed,
        }
    }

    /// Advance one tick: every agent acts once, in id order
    pub fn step(&mut self) {
        for id in 0..self.agents.len() {
            self.agents[id].reset_tick();
            let mut ctx = Context::new(&mut self.world, &mut self.agents, id);
            self.brain.run(&mut ctx);
        }
        self.world.update_food();
        self.world.time += 1;

        if let Some(stats) = self.history.tick(&mut self.world, &self.agents) {
            log::debug!("{}", stats.summary());
        }
    }

    /// Run for a number of ticks
    pub fn run(&mut self, steps: u64) {
        for _ in 0..steps {
            self.step();
        }
    }

    /// Run with a callback after every tick
    pub fn run_with_callback<F>(&mut self, steps: u64, mut callback: F)
    where
        F: FnMut(&Simulation),
    {
        for _ in 0..steps {
            self.step();
            callback(self);
        }
    }

    pub fn result(&self) -> RunResult {
        RunResult::from_history(&self.world, &self.history)
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn time(&self) -> u64 {
        self.world.time
    }

    pub fn score(&self) -> f64 {
        self.world.score
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn food(&self) -> &FoodGrid {
        &self.world.food
    }

    pub fn walls(&self) -> &Array2<bool> {
        self.world.navigator.walls()
    }
}

/// Seed of run `id` in a batch
pub fn run_seed(base: u64, id: usize) -> u64 {
    base.wrapping_add(id as u64)
}

/// Run one headless simulation for `t_max` ticks. Touches nothing outside
/// its own simulation.
pub fn run_hidden(
    id: usize,
    map: &Map,
    brain: &Brain,
    config: &Config,
    t_max: u64,
    navigator: Navigator,
) -> (usize, RunResult) {
    let seed = run_seed(config.map.seed, id);
    let mut sim = Simulation::with_navigator(map, brain.clone(), config, navigator, seed);
    sim.run(t_max);
    let result = sim.result();
    log::info!("run {} (seed {}) finished: {}", id, seed, result.summary());
    (id, result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::Preset;
    use crate::grid::Pos;

    const ROOM: &str = "
        ###########
        #.........#
        #....C....#
        #.........#
        #.2.....3.#
        ###########
    ";

    fn sim(preset: Preset, creatures: usize, seed: u64) -> Simulation {
        let map = Map::from_ascii(ROOM, creatures, 20).unwrap();
        Simulation::new(&map, Brain::from_preset(preset), &Config::default(), seed)
    }

    #[test]
    fn test_agents_start_at_colony() {
        let s = sim(Preset::BaseTree, 4, 1);
        assert_eq!(s.agents().len(), 4);
        assert!(s.agents().iter().all(|a| a.pos == Pos::new(5, 2)));
        assert_eq!(s.time(), 0);
    }

    #[test]
    fn test_run_advances_time_and_scores() {
        let mut s = sim(Preset::MemorizingTree, 3, 2);
        s.run(60);
        assert_eq!(s.time(), 60);
        assert!(s.score() > 0.0);
        assert!(s.world.food_collected > 0);
    }

    #[test]
    fn test_same_seed_same_outcome() {
        for preset in [Preset::CommunicatingTree, Preset::BaseAutomaton] {
            let mut a = sim(preset, 5, 9);
            let mut b = sim(preset, 5, 9);
            a.run(80);
            b.run(80);
            assert_eq!(a.result(), b.result());
            let pa: Vec<Pos> = a.agents().iter().map(|x| x.pos).collect();
            let pb: Vec<Pos> = b.agents().iter().map(|x| x.pos).collect();
            assert_eq!(pa, pb);
        }
    }

    #[test]
    fn test_callback_sees_every_tick() {
        let mut s = sim(Preset::BaseTree, 1, 3);
        let mut times = Vec::new();
        s.run_with_callback(5, |sim| times.push(sim.time()));
        assert_eq!(times, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_run_hidden_reports_id() {
        let map = Map::from_ascii(ROOM, 2, 20).unwrap();
        let mut config = Config::default();
        config.simulation.stats_interval = 10;
        let brain = Brain::from_preset(Preset::BaseTree);
        let (id, result) = run_hidden(7, &map, &brain, &config, 50, Navigator::incremental(map.walls.clone()));
        assert_eq!(id, 7);
        assert_eq!(result.distance_series.len(), 5);
        assert_eq!(result.collected_series.len(), 5);
        assert!(result.average_score <= result.final_score);
    }
}
