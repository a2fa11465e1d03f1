//! World state shared by every agent: terrain, food, occupancy, score and RNG.

use crate::agent::{Agent, AgentId};
use crate::behavior::mutation::poisson;
use crate::chunks::ChunkManager;
use crate::config::{Config, DistortionConfig, FoodConfig, SimulationConfig};
use crate::grid::{FoodGrid, Pos, SpatialIndex};
use crate::map::Map;
use crate::pathfinder::Navigator;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rand_distr::Normal;

/// Attempts at finding an open cell for spawned food before giving up this tick
const SPAWN_ATTEMPTS: usize = 32;

/// The environment agents act on
pub struct World {
    pub width: usize,
    pub height: usize,
    pub colony: Pos,

    // Environment
    pub food: FoodGrid,
    pub navigator: Navigator,

    // Configuration
    pub settings: SimulationConfig,
    pub distortion: DistortionConfig,
    pub food_config: FoodConfig,

    // Random number generator (seeded for reproducibility)
    pub rng: ChaCha8Rng,

    // Outcome
    pub score: f64,
    pub food_collected: u64,
    pub best_density: f64,
    pub time: u64,

    // Spatial indexes
    food_chunks: ChunkManager,
    agent_chunks: ChunkManager,
    occupancy: SpatialIndex,
}

impl World {
    pub fn new(map: &Map, config: &Config, navigator: Navigator, seed: u64) -> Self {
        let settings = config.simulation.clone();
        let mut food = FoodGrid::new(map.width, map.height);
        let mut food_chunks = ChunkManager::new(settings.smell_range as usize, settings.smell_range as usize);
        for (pos, amount, density) in map.food_cells() {
            food.add(pos, amount, density);
            food_chunks.add(pos);
        }
        let comm = settings.comm_range as usize;

        Self {
            width: map.width,
            height: map.height,
            colony: map.colony,
            food,
            navigator,
            settings,
            distortion: config.distortion.clone(),
            food_config: config.food.clone(),
            rng: ChaCha8Rng::seed_from_u64(seed),
            score: 0.0,
            food_collected: 0,
            best_density: 0.0,
            time: 0,
            food_chunks,
            agent_chunks: ChunkManager::new(comm, comm),
            occupancy: SpatialIndex::new(map.width, map.height),
        }
    }

    #[inline]
    pub fn in_bounds(&self, pos: Pos) -> bool {
        pos.x < self.width && pos.y < self.height
    }

    /// Whether an agent may step onto `pos` this tick. The colony is always
    /// shareable; elsewhere occupancy only matters with exclusive cells.
    pub fn can_enter(&self, pos: Pos) -> bool {
        if !self.navigator.is_open(pos) {
            return false;
        }
        pos == self.colony || !self.settings.exclusive_cells || !self.occupancy.is_occupied(pos)
    }

    /// Register an agent at its current position
    pub fn place_agent(&mut self, agent: &Agent) {
        self.occupy(agent.pos, agent.id);
    }

    fn occupy(&mut self, pos: Pos, id: AgentId) {
        self.occupancy.insert(pos, id);
        if self.occupancy.count_at(pos) == 1 {
            self.agent_chunks.add(pos);
        }
    }

    fn vacate(&mut self, pos: Pos, id: AgentId) {
        if self.occupancy.remove(pos, id) && !self.occupancy.is_occupied(pos) {
            self.agent_chunks.remove(pos);
        }
    }

    /// Move an agent one cell. Rejected moves leave it where it is.
    pub fn move_agent(&mut self, agent: &mut Agent, to: Pos) -> bool {
        if agent.pos.manhattan(to) != 1 || !self.can_enter(to) {
            return false;
        }
        self.vacate(agent.pos, agent.id);
        self.occupy(to, agent.id);
        agent.pos = to;
        agent.steps_taken += 1;
        true
    }

    /// Agent ids standing on a cell
    pub fn agents_at(&self, pos: Pos) -> &[AgentId] {
        self.occupancy.get(pos)
    }

    /// Food cells within smell range of `pos`, with their path distance
    pub fn food_in_range(&self, pos: Pos) -> Vec<(Pos, u16)> {
        let range = self.settings.smell_range;
        let candidates = self.food_chunks.get_neighbours(pos);
        let distances = self.navigator.distances_within(pos, &candidates, range);
        candidates
            .into_iter()
            .zip(distances)
            .filter(|&(_, d)| d <= range)
            .collect()
    }

    /// Closest food cell in smell range; ties go to the lowest position
    pub fn nearest_food(&self, pos: Pos) -> Option<(Pos, u16)> {
        self.food_in_range(pos)
            .into_iter()
            .min_by_key(|&(cell, d)| (d, cell))
    }

    /// Other agents within communication range of `pos`, by id
    pub fn agents_near(&self, me: AgentId, pos: Pos) -> Vec<AgentId> {
        let range = self.settings.comm_range;
        let cells = self.agent_chunks.get_neighbours(pos);
        let distances = self.navigator.distances_within(pos, &cells, range);

        let mut ids: Vec<AgentId> = cells
            .into_iter()
            .zip(distances)
            .filter(|&(_, d)| d <= range)
            .flat_map(|(cell, _)| self.occupancy.get(cell).iter().copied())
            .filter(|&id| id != me)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Take one unit of food from the agent's cell
    pub fn pick_up(&mut self, agent: &mut Agent) -> bool {
        if agent.is_holding_food {
            return false;
        }
        let pos = agent.pos;
        let density = self.food.density(pos);
        let (taken, emptied) = self.food.consume(pos, 1);
        if taken == 0 {
            return false;
        }
        if emptied {
            self.food_chunks.remove(pos);
            self.navigator.release(pos);
        }
        agent.pick_up(density);
        if density > self.best_density {
            self.best_density = density;
        }
        true
    }

    /// Deposit carried food at the colony, returning its density
    pub fn drop_off(&mut self, agent: &mut Agent) -> Option<f64> {
        if agent.pos != self.colony {
            return None;
        }
        let density = agent.drop_off()?;
        self.score += density;
        self.food_collected += 1;
        log::trace!("agent {} deposited food of density {:.2} at t={}", agent.id, density, self.time);
        Some(density)
    }

    /// Turn an open cell into a wall. The colony, occupied cells and cells
    /// outside the map are refused. Food on the cell is lost.
    pub fn set_wall(&mut self, pos: Pos) -> bool {
        if pos == self.colony || !self.navigator.is_open(pos) || self.occupancy.is_occupied(pos) {
            return false;
        }
        let amount = self.food.amount(pos);
        if amount > 0 {
            self.food.consume(pos, amount);
            self.food_chunks.remove(pos);
        }
        self.navigator.release(pos);
        self.navigator.add_wall(pos);
        log::debug!("wall added at {} (t={})", pos, self.time);
        true
    }

    /// Open a wall cell
    pub fn clear_wall(&mut self, pos: Pos) -> bool {
        if !self.in_bounds(pos) || self.navigator.is_open(pos) {
            return false;
        }
        self.navigator.remove_wall(pos);
        log::debug!("wall removed at {} (t={})", pos, self.time);
        true
    }

    /// Per-tick food dynamics: maybe spawn a patch cell, maybe decay existing food
    pub fn update_food(&mut self) {
        let cfg = self.food_config.clone();

        if cfg.spawn_chance > 0.0 && self.rng.gen::<f64>() < cfg.spawn_chance {
            for _ in 0..SPAWN_ATTEMPTS {
                let pos = Pos::new(self.rng.gen_range(0..self.width), self.rng.gen_range(0..self.height));
                if pos == self.colony || !self.navigator.is_open(pos) {
                    continue;
                }
                let density = if cfg.spawn_density_min < cfg.spawn_density_max {
                    self.rng.gen_range(cfg.spawn_density_min..cfg.spawn_density_max)
                } else {
                    cfg.spawn_density_min
                };
                if self.food.add(pos, cfg.spawn_amount, density) {
                    self.food_chunks.add(pos);
                }
                break;
            }
        }

        if cfg.decay_chance > 0.0 {
            let cells: Vec<Pos> = self.food.food_cells().collect();
            for pos in cells {
                if self.rng.gen::<f64>() < cfg.decay_chance {
                    let (_, emptied) = self.food.consume(pos, 1);
                    if emptied {
                        self.food_chunks.remove(pos);
                        self.navigator.release(pos);
                    }
                }
            }
        }
    }

    /// A float read from another agent's memory, possibly corrupted by a
    /// multiplicative normal error
    pub fn distort_float(&mut self, value: f64) -> f64 {
        let p = self.distortion.float_probability;
        if p <= 0.0 || self.rng.gen::<f64>() >= p {
            return value;
        }
        match Normal::new(1.0, self.distortion.float_std) {
            Ok(noise) => value * noise.sample(&mut self.rng),
            Err(_) => value,
        }
    }

    /// A coordinate read from another agent's memory, possibly displaced by a
    /// Poisson number of random hops away from the colony
    pub fn distort_coord(&mut self, pos: Pos) -> Pos {
        let p = self.distortion.coord_probability;
        if p <= 0.0 || self.rng.gen::<f64>() >= p {
            return pos;
        }
        let hops = poisson(self.distortion.coord_hops, &mut self.rng);
        let colony = self.colony;
        let mut at = pos;
        for _ in 0..hops {
            let away = self.navigator.prev(colony, at);
            match away.choose(&mut self.rng) {
                Some(&next) => at = next,
                None => break,
            }
        }
        at
    }
}
