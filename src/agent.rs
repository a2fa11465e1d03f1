//! Agent state: position, carried food and the scratch register file read
//! and written by conditions and actions.

use crate::grid::Pos;
use serde::{Deserialize, Serialize};

/// Index of an agent in the simulation's agent list
pub type AgentId = usize;

/// Slots in each register bank
pub const REGISTER_COUNT: usize = 10;

/// A foraging agent
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub pos: Pos,

    // Payload
    pub is_holding_food: bool,
    pub food_density: f64,

    // Register file
    pub flags: [bool; REGISTER_COUNT],
    pub counters: [i64; REGISTER_COUNT],
    pub floats: [f64; REGISTER_COUNT],
    pub coords: [Option<Pos>; REGISTER_COUNT],

    /// Remembered cell the agent can walk back to
    pub waypoint: Option<Pos>,
    /// Food cell currently being approached
    pub food_target: Option<Pos>,
    /// Peer chosen by `SelectTargetAgent`, read by `saved` sensors
    pub target_agent: Option<AgentId>,
    /// Peer being visited by a communication loop, read by `queried` sensors
    pub queried_agent: Option<AgentId>,

    /// Automaton state
    pub current_node: usize,
    /// Set once a task has consumed this tick
    pub is_done: bool,

    // Statistics
    pub steps_taken: u64,
    pub food_collected: u32,

    /// Agents within communication range, computed at most once per tick
    #[serde(skip)]
    pub nearby_agents: Option<Vec<AgentId>>,
}

impl Agent {
    pub fn new(id: AgentId, pos: Pos) -> Self {
        Self {
            id,
            pos,
            is_holding_food: false,
            food_density: 0.0,
            flags: [false; REGISTER_COUNT],
            counters: [0; REGISTER_COUNT],
            floats: [0.0; REGISTER_COUNT],
            coords: [None; REGISTER_COUNT],
            waypoint: None,
            food_target: None,
            target_agent: None,
            queried_agent: None,
            current_node: 0,
            is_done: false,
            steps_taken: 0,
            food_collected: 0,
            nearby_agents: None,
        }
    }

    /// Clear per-tick state before the agent acts
    pub fn reset_tick(&mut self) {
        self.is_done = false;
        self.queried_agent = None;
        self.nearby_agents = None;
    }

    /// Start carrying one unit of food
    pub fn pick_up(&mut self, density: f64) {
        self.is_holding_food = true;
        self.food_density = density;
    }

    /// Drop the carried food, returning its density
    pub fn drop_off(&mut self) -> Option<f64> {
        if !self.is_holding_food {
            return None;
        }
        let density = self.food_density;
        self.is_holding_food = false;
        self.food_density = 0.0;
        self.food_collected += 1;
        Some(density)
    }
}
