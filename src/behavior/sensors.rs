//! Leaf readings of agent and world state.
//!
//! Every sensor reads the agent selected by a [`Target`]. Reads of another
//! agent's memory (floats, coordinates, waypoint) pass through the world's
//! distortion model.

use super::{Context, Target};
use crate::agent::{AgentId, REGISTER_COUNT};
use crate::pathfinder::UNREACHABLE;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Boolean readings
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BoolSensor {
    IsHoldingFood,
    IsWaypointSet,
    IsTargetAgentSet,
    IsAtColony,
    Flag(usize),
    IsCoordSet(usize),
}

/// Numeric readings
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueSensor {
    /// Food cells within smell range
    NearbyFood,
    /// Agents within communication range
    NearbyAgents,
    /// Density of the food being carried
    CarriedDensity,
    /// Food density on the agent's cell
    GroundDensity,
    /// Food density at the waypoint
    WaypointDensity,
    /// Waypoint density divided by its path distance from the colony
    WaypointEfficiency,
    /// Path distance from the agent to its waypoint
    WaypointDistance,
    /// Path distance between two coordinate registers
    CoordDistance(usize, usize),
    Counter(usize),
    Float(usize),
}

impl BoolSensor {
    /// Sensors drawn by random condition generation
    pub const RANDOM_POOL: [BoolSensor; 4] = [
        BoolSensor::IsHoldingFood,
        BoolSensor::IsWaypointSet,
        BoolSensor::IsTargetAgentSet,
        BoolSensor::IsAtColony,
    ];

    /// Read the sensor on the agent `target` designates; false when unset
    pub fn read(self, ctx: &mut Context, target: Target) -> bool {
        let Some(id) = ctx.resolve(target) else {
            return false;
        };
        let agent = &ctx.agents[id];
        match self {
            BoolSensor::IsHoldingFood => agent.is_holding_food,
            BoolSensor::IsWaypointSet => agent.waypoint.is_some(),
            BoolSensor::IsTargetAgentSet => agent.target_agent.is_some(),
            BoolSensor::IsAtColony => agent.pos == ctx.world.colony,
            BoolSensor::Flag(i) => agent.flags.get(i).copied().unwrap_or(false),
            BoolSensor::IsCoordSet(i) => matches!(agent.coords.get(i), Some(Some(_))),
        }
    }

    /// Register index this sensor reads, by bank name
    pub fn register(self) -> Option<(&'static str, usize)> {
        match self {
            BoolSensor::Flag(i) => Some(("flag", i)),
            BoolSensor::IsCoordSet(i) => Some(("coord", i)),
            _ => None,
        }
    }
}

impl ValueSensor {
    /// Sensors drawn by random condition generation
    pub const RANDOM_POOL: [ValueSensor; 7] = [
        ValueSensor::NearbyFood,
        ValueSensor::NearbyAgents,
        ValueSensor::CarriedDensity,
        ValueSensor::GroundDensity,
        ValueSensor::WaypointDensity,
        ValueSensor::WaypointEfficiency,
        ValueSensor::WaypointDistance,
    ];

    /// Read the sensor on the agent `target` designates; 0 when unset.
    /// Distances to missing coordinates read as [`UNREACHABLE`].
    pub fn read(self, ctx: &mut Context, target: Target) -> f64 {
        let Some(id) = ctx.resolve(target) else {
            return 0.0;
        };
        let pos = ctx.agents[id].pos;
        let unreachable = UNREACHABLE as f64;

        match self {
            ValueSensor::NearbyFood => ctx.world.food_in_range(pos).len() as f64,
            ValueSensor::NearbyAgents => nearby_agent_count(ctx, id) as f64,
            ValueSensor::CarriedDensity => ctx.agents[id].food_density,
            ValueSensor::GroundDensity => ctx.world.food.density(pos),
            ValueSensor::WaypointDensity => ctx
                .read_waypoint(target)
                .map_or(0.0, |wp| ctx.world.food.density(wp)),
            ValueSensor::WaypointEfficiency => match ctx.read_waypoint(target) {
                Some(wp) => {
                    let colony = ctx.world.colony;
                    let distance = ctx.world.navigator.distance(colony, wp);
                    if distance >= UNREACHABLE {
                        0.0
                    } else {
                        ctx.world.food.density(wp) / distance.max(1) as f64
                    }
                }
                None => 0.0,
            },
            ValueSensor::WaypointDistance => match ctx.read_waypoint(target) {
                Some(wp) => ctx.world.navigator.distance(wp, pos) as f64,
                None => unreachable,
            },
            ValueSensor::CoordDistance(a, b) => {
                match (ctx.read_coord(target, a), ctx.read_coord(target, b)) {
                    (Some(a), Some(b)) => ctx.world.navigator.distance(a, b) as f64,
                    _ => unreachable,
                }
            }
            ValueSensor::Counter(i) => ctx.agents[id].counters.get(i).map_or(0.0, |&c| c as f64),
            ValueSensor::Float(i) => ctx.read_float(target, i).unwrap_or(0.0),
        }
    }

    /// Register indices this sensor reads, by bank name
    pub fn registers(self) -> Vec<(&'static str, usize)> {
        match self {
            ValueSensor::CoordDistance(a, b) => vec![("coord", a), ("coord", b)],
            ValueSensor::Counter(i) => vec![("counter", i)],
            ValueSensor::Float(i) => vec![("float", i)],
            _ => Vec::new(),
        }
    }
}

fn nearby_agent_count(ctx: &mut Context, id: AgentId) -> usize {
    if id == ctx.me {
        ctx.nearby_agents().len()
    } else {
        ctx.world.agents_near(id, ctx.agents[id].pos).len()
    }
}

/// Whether a register index fits the register file
pub fn in_range(index: usize) -> bool {
    index < REGISTER_COUNT
}

impl fmt::Display for BoolSensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoolSensor::IsHoldingFood => write!(f, "IsHoldingFood"),
            BoolSensor::IsWaypointSet => write!(f, "IsWaypointSet"),
            BoolSensor::IsTargetAgentSet => write!(f, "TargetAgentSet"),
            BoolSensor::IsAtColony => write!(f, "IsAtColony"),
            BoolSensor::Flag(i) => write!(f, "Flag[{}]", i),
            BoolSensor::IsCoordSet(i) => write!(f, "CoordSet[{}]", i),
        }
    }
}

impl fmt::Display for ValueSensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueSensor::NearbyFood => write!(f, "NearbyFood"),
            ValueSensor::NearbyAgents => write!(f, "NearbyAgents"),
            ValueSensor::CarriedDensity => write!(f, "AgentFoodDensity"),
            ValueSensor::GroundDensity => write!(f, "GroundFoodDensity"),
            ValueSensor::WaypointDensity => write!(f, "WaypointDensity"),
            ValueSensor::WaypointEfficiency => write!(f, "WaypointEfficiency"),
            ValueSensor::WaypointDistance => write!(f, "WaypointDistance"),
            ValueSensor::CoordDistance(a, b) => write!(f, "Distance(Coord[{}], Coord[{}])", a, b),
            ValueSensor::Counter(i) => write!(f, "Counter[{}]", i),
            ValueSensor::Float(i) => write!(f, "Float[{}]", i),
        }
    }
}
