//! Atomic effects an agent applies to its own memory.

use super::condition::{Condition, Expression};
use super::mutation::{mutate_condition, OptimizationParameters};
use super::{Context, Target};
use crate::grid::Pos;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where `SetInternalCoord` takes its coordinate from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoordSource {
    /// The acting agent's own cell
    Position,
    Waypoint { target: Target },
    Register { index: usize, target: Target },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Action {
    /// Remember the current cell as the waypoint
    SetWaypoint,
    /// Forget the waypoint, or a coordinate register when one is named
    ResetWaypoint { register: Option<usize> },
    /// Save a random agent in communication range that satisfies the condition
    SelectTargetAgent { condition: Option<Condition> },
    /// Drop the saved target once it is out of communication range
    ForgetTarget,
    /// Adopt another agent's waypoint
    CopyWaypoint { from: Target },
    SetInternalBool { index: usize, value: Condition },
    SetInternalCounter { index: usize, value: Expression },
    SetInternalFloat { index: usize, value: Expression },
    SetInternalCoord { index: usize, source: CoordSource },
    IncrementCounter { index: usize },
}

impl Action {
    /// Apply the effect. Returns false when it could not be applied.
    pub fn run(&self, ctx: &mut Context) -> bool {
        match self {
            Action::SetWaypoint => {
                let pos = ctx.agent().pos;
                ctx.agent_mut().waypoint = Some(pos);
                true
            }
            Action::ResetWaypoint { register: None } => {
                ctx.agent_mut().waypoint = None;
                true
            }
            Action::ResetWaypoint { register: Some(i) } => match ctx.agent_mut().coords.get_mut(*i) {
                Some(slot) => {
                    *slot = None;
                    true
                }
                None => false,
            },
            Action::SelectTargetAgent { condition } => select_target(ctx, condition.as_ref()),
            Action::ForgetTarget => {
                if let Some(target) = ctx.agent().target_agent {
                    let range = ctx.world.settings.comm_range;
                    let here = ctx.agent().pos;
                    let there = ctx.agents.get(target).map(|a| a.pos);
                    let in_range = there
                        .map_or(false, |there| ctx.world.navigator.distance_within(here, there, range) <= range);
                    if !in_range {
                        ctx.agent_mut().target_agent = None;
                    }
                }
                true
            }
            Action::CopyWaypoint { from } => match ctx.read_waypoint(*from) {
                Some(waypoint) => {
                    ctx.agent_mut().waypoint = Some(waypoint);
                    true
                }
                None => false,
            },
            Action::SetInternalBool { index, value } => {
                let v = value.evaluate(ctx);
                write_register(&mut ctx.agent_mut().flags, *index, v)
            }
            Action::SetInternalCounter { index, value } => {
                let v = value.evaluate(ctx).round() as i64;
                write_register(&mut ctx.agent_mut().counters, *index, v)
            }
            Action::SetInternalFloat { index, value } => {
                let v = value.evaluate(ctx);
                write_register(&mut ctx.agent_mut().floats, *index, v)
            }
            Action::SetInternalCoord { index, source } => match read_coord_source(ctx, *source) {
                Some(pos) => write_register(&mut ctx.agent_mut().coords, *index, Some(pos)),
                None => false,
            },
            Action::IncrementCounter { index } => match ctx.agent_mut().counters.get_mut(*index) {
                Some(counter) => {
                    *counter += 1;
                    true
                }
                None => false,
            },
        }
    }

    /// Grow or shrink any condition this action carries
    pub fn mutate(&mut self, op: &OptimizationParameters, rng: &mut impl Rng) {
        match self {
            Action::SelectTargetAgent { condition } => {
                *condition = mutate_condition(condition.take(), op, true, rng);
            }
            Action::SetInternalBool { value, .. } => {
                if let Some(mutated) = mutate_condition(Some(value.copy()), op, false, rng) {
                    *value = mutated;
                }
            }
            _ => {}
        }
    }

    /// Register indices this action touches, by bank name
    pub fn registers(&self) -> Vec<(&'static str, usize)> {
        let mut out = Vec::new();
        match self {
            Action::ResetWaypoint { register: Some(i) } => out.push(("coord", *i)),
            Action::SelectTargetAgent { condition: Some(c) } => condition_registers(c, &mut out),
            Action::SetInternalBool { index, value } => {
                out.push(("flag", *index));
                condition_registers(value, &mut out);
            }
            Action::SetInternalCounter { index, value } => {
                out.push(("counter", *index));
                out.extend(value.sensors().into_iter().flat_map(|s| s.registers()));
            }
            Action::SetInternalFloat { index, value } => {
                out.push(("float", *index));
                out.extend(value.sensors().into_iter().flat_map(|s| s.registers()));
            }
            Action::SetInternalCoord { index, source } => {
                out.push(("coord", *index));
                if let CoordSource::Register { index, .. } = source {
                    out.push(("coord", *index));
                }
            }
            Action::IncrementCounter { index } => out.push(("counter", *index)),
            _ => {}
        }
        out
    }
}

pub(crate) fn condition_registers(c: &Condition, out: &mut Vec<(&'static str, usize)>) {
    let (bools, values) = c.sensors();
    out.extend(bools.into_iter().filter_map(|s| s.register()));
    out.extend(values.into_iter().flat_map(|s| s.registers()));
}

fn write_register<T>(bank: &mut [T], index: usize, value: T) -> bool {
    match bank.get_mut(index) {
        Some(slot) => {
            *slot = value;
            true
        }
        None => false,
    }
}

fn read_coord_source(ctx: &mut Context, source: CoordSource) -> Option<Pos> {
    match source {
        CoordSource::Position => Some(ctx.agent().pos),
        CoordSource::Waypoint { target } => ctx.read_waypoint(target),
        CoordSource::Register { index, target } => ctx.read_coord(target, index),
    }
}

/// Evaluate the condition once per nearby agent with that agent queried,
/// then save one of the matches at random
fn select_target(ctx: &mut Context, condition: Option<&Condition>) -> bool {
    let previous = ctx.agent().queried_agent;
    let mut matches = Vec::new();
    for candidate in ctx.nearby_agents() {
        ctx.agent_mut().queried_agent = Some(candidate);
        if condition.map_or(true, |c| c.evaluate(ctx)) {
            matches.push(candidate);
        }
    }
    ctx.agent_mut().queried_agent = previous;

    if matches.is_empty() {
        return false;
    }
    let chosen = matches[ctx.world.rng.gen_range(0..matches.len())];
    ctx.agent_mut().target_agent = Some(chosen);
    true
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::SetWaypoint => write!(f, "SetWaypoint"),
            Action::ResetWaypoint { register: None } => write!(f, "ResetWaypoint"),
            Action::ResetWaypoint { register: Some(i) } => write!(f, "ResetCoord[{}]", i),
            Action::SelectTargetAgent { condition: None } => write!(f, "SelectAgent"),
            Action::SelectTargetAgent { condition: Some(c) } => write!(f, "SelectAgent({})", c),
            Action::ForgetTarget => write!(f, "ForgetTarget"),
            Action::CopyWaypoint { from: Target::Own } => write!(f, "CopyWaypoint"),
            Action::CopyWaypoint { from: Target::Saved } => write!(f, "CopyWaypoint[saved]"),
            Action::CopyWaypoint { from: Target::Queried } => write!(f, "CopyWaypoint[queried]"),
            Action::SetInternalBool { index, value } => write!(f, "Flag[{}] = {}", index, value),
            Action::SetInternalCounter { index, value } => write!(f, "Counter[{}] = {}", index, value),
            Action::SetInternalFloat { index, value } => write!(f, "Float[{}] = {}", index, value),
            Action::SetInternalCoord { index, source } => match source {
                CoordSource::Position => write!(f, "Coord[{}] = Position", index),
                CoordSource::Waypoint { .. } => write!(f, "Coord[{}] = Waypoint", index),
                CoordSource::Register { index: from, .. } => write!(f, "Coord[{}] = Coord[{}]", index, from),
            },
            Action::IncrementCounter { index } => write!(f, "Counter[{}]++", index),
        }
    }
}
