//! Terminal tasks: the only behaviour nodes that move an agent.

use super::Context;
use crate::grid::Pos;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Outcome of acting on a task for one tick
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskStatus {
    /// Moved towards the goal, which is not reached yet
    Running,
    /// The goal was reached this tick (arrival, pickup, deposit)
    Complete,
    /// Nothing to do: no goal, goal unreachable, or already there
    Idle,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Task {
    /// Walk away from the colony
    Explore,
    /// Walk to the colony and deposit carried food there
    ReturnHome,
    /// Walk to the nearest food in smell range and pick one unit up
    Gather,
    /// Walk to the waypoint
    GoToWaypoint,
    /// Step to a random free neighbour
    RandomWalk,
    /// Do nothing, successfully
    Stay,
}

impl Task {
    pub fn name(self) -> &'static str {
        match self {
            Task::Explore => "Explore",
            Task::ReturnHome => "Return Home",
            Task::Gather => "GatherFood",
            Task::GoToWaypoint => "Go waypoint",
            Task::RandomWalk => "RandomWalk",
            Task::Stay => "Stay",
        }
    }

    pub fn act(self, ctx: &mut Context) -> TaskStatus {
        match self {
            Task::Explore => explore(ctx),
            Task::ReturnHome => return_home(ctx),
            Task::Gather => gather(ctx),
            Task::GoToWaypoint => go_to_waypoint(ctx),
            Task::RandomWalk => random_walk(ctx),
            Task::Stay => TaskStatus::Complete,
        }
    }
}

/// Try to step onto one of `options`, picked uniformly. The move fails
/// silently when the cell is taken.
fn step(ctx: &mut Context, options: &[Pos]) -> bool {
    if options.is_empty() {
        return false;
    }
    let to = options[ctx.world.rng.gen_range(0..options.len())];
    ctx.move_to(to)
}

fn explore(ctx: &mut Context) -> TaskStatus {
    let colony = ctx.world.colony;
    let pos = ctx.agent().pos;
    let away = ctx.world.navigator.prev(colony, pos);
    if away.is_empty() {
        return TaskStatus::Idle;
    }
    step(ctx, &away);
    TaskStatus::Running
}

fn deposit(ctx: &mut Context) -> TaskStatus {
    match ctx.world.drop_off(&mut ctx.agents[ctx.me]) {
        Some(_) => TaskStatus::Complete,
        None => TaskStatus::Idle,
    }
}

fn return_home(ctx: &mut Context) -> TaskStatus {
    let colony = ctx.world.colony;
    let pos = ctx.agent().pos;
    if pos == colony {
        return deposit(ctx);
    }

    let home = ctx.world.navigator.next(colony, pos);
    if home.is_empty() {
        return TaskStatus::Idle;
    }
    if step(ctx, &home) && ctx.agent().pos == colony && ctx.agent().is_holding_food {
        return deposit(ctx);
    }
    TaskStatus::Running
}

fn pick_up(ctx: &mut Context) -> TaskStatus {
    ctx.agent_mut().food_target = None;
    if ctx.world.pick_up(&mut ctx.agents[ctx.me]) {
        TaskStatus::Complete
    } else {
        TaskStatus::Idle
    }
}

fn gather(ctx: &mut Context) -> TaskStatus {
    if ctx.agent().is_holding_food {
        return TaskStatus::Idle;
    }
    let pos = ctx.agent().pos;

    // Drop a target somebody else emptied
    if let Some(target) = ctx.agent().food_target {
        if !ctx.world.food.has_food(target) {
            ctx.agent_mut().food_target = None;
        }
    }

    let target = match ctx.agent().food_target {
        Some(target) => target,
        None => match ctx.world.nearest_food(pos) {
            Some((target, _)) => {
                ctx.agent_mut().food_target = Some(target);
                target
            }
            None => return TaskStatus::Idle,
        },
    };

    if pos == target {
        return pick_up(ctx);
    }

    let closer = ctx.world.navigator.next(target, pos);
    if closer.is_empty() {
        ctx.agent_mut().food_target = None;
        return TaskStatus::Idle;
    }
    if step(ctx, &closer) && ctx.agent().pos == target {
        return pick_up(ctx);
    }
    TaskStatus::Running
}

fn go_to_waypoint(ctx: &mut Context) -> TaskStatus {
    let Some(waypoint) = ctx.agent().waypoint else {
        return TaskStatus::Idle;
    };
    let pos = ctx.agent().pos;
    if pos == waypoint {
        return TaskStatus::Idle;
    }

    let closer = ctx.world.navigator.next(waypoint, pos);
    if closer.is_empty() {
        return TaskStatus::Idle;
    }
    if step(ctx, &closer) && ctx.agent().pos == waypoint {
        return TaskStatus::Complete;
    }
    TaskStatus::Running
}

fn random_walk(ctx: &mut Context) -> TaskStatus {
    let pos = ctx.agent().pos;
    let free: Vec<Pos> = crate::grid::Direction::ALL
        .iter()
        .filter_map(|&d| pos.step(d))
        .filter(|&n| ctx.world.can_enter(n))
        .collect();
    if step(ctx, &free) {
        TaskStatus::Running
    } else {
        TaskStatus::Idle
    }
}
