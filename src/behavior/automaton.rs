//! Finite-state controller over a fixed task catalogue.
//!
//! Each tick the agent may take one conditional edge out of its current node,
//! then acts on that node's task. A task that stops running sends the agent
//! along the node's finish edge.

use super::action::{condition_registers, Action};
use super::condition::{Condition, Expression};
use super::mutation::{mutate_condition, poisson, random_action, random_condition, OptimizationParameters};
use super::sensors::{BoolSensor, ValueSensor};
use super::task::{Task, TaskStatus};
use super::{Context, Target};
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Automaton {
    pub tasks: Vec<Task>,
    /// `edges[from][to]`: condition under which `from` moves to `to`
    pub edges: Vec<Vec<Option<Condition>>>,
    /// `actions[from][to]`: fired when that edge is taken
    pub actions: Vec<Vec<Option<Action>>>,
    pub finish_edges: Vec<usize>,
    pub finish_actions: Vec<Option<Action>>,
}

impl Automaton {
    /// Nodes for the given tasks, no conditional edges, every finish edge a self-loop
    pub fn new(tasks: Vec<Task>) -> Self {
        let n = tasks.len();
        Self {
            tasks,
            edges: vec![vec![None; n]; n],
            actions: vec![vec![None; n]; n],
            finish_edges: (0..n).collect(),
            finish_actions: vec![None; n],
        }
    }

    /// Explore until food is smelled, gather it, carry it home. A waypoint
    /// is remembered on rich food and walked back to after each delivery.
    pub fn base() -> Self {
        let mut a = Self::new(vec![Task::Explore, Task::ReturnHome, Task::Gather, Task::GoToWaypoint]);

        a.finish_edges = vec![1, 0, 1, 2];

        a.edges[0][2] = Some(Condition::greater(
            Expression::value(ValueSensor::NearbyFood, Target::Own),
            Expression::constant(0.0),
        ));
        a.edges[2][2] = Some(Condition::greater(
            Expression::value(ValueSensor::GroundDensity, Target::Own),
            Expression::constant(2.0),
        ));
        a.actions[2][2] = Some(Action::SetWaypoint);

        a.edges[0][3] = Some(Condition::flag(BoolSensor::IsWaypointSet, Target::Own));
        a.finish_actions[3] = Some(Action::ResetWaypoint { register: None });
        a
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn run(&self, ctx: &mut Context) {
        let n = self.len();
        if n == 0 {
            return;
        }
        let mut node = ctx.agent().current_node;
        if node >= n {
            node = 0;
        }

        // Missing edge rows or entries count as no edge
        let mut open = Vec::new();
        if let Some(row) = self.edges.get(node) {
            for (to, edge) in row.iter().enumerate().take(n) {
                if let Some(condition) = edge {
                    if condition.evaluate(ctx) {
                        open.push(to);
                    }
                }
            }
        }
        if !open.is_empty() {
            let to = open[ctx.world.rng.gen_range(0..open.len())];
            if let Some(action) = self.actions.get(node).and_then(|row| row.get(to)).and_then(Option::as_ref) {
                action.run(ctx);
            }
            node = to;
        }
        ctx.agent_mut().current_node = node;

        if self.tasks[node].act(ctx) != TaskStatus::Running {
            if let Some(action) = self.finish_actions.get(node).and_then(Option::as_ref) {
                action.run(ctx);
            }
            // A missing or dangling finish edge keeps the agent where it is
            let next = self.finish_edges.get(node).copied().filter(|&to| to < n);
            ctx.agent_mut().current_node = next.unwrap_or(node);
        }
        ctx.agent_mut().is_done = true;
    }

    /// Finish edges must point at existing nodes and the matrices must be square
    pub fn validate(&self) -> Result<(), String> {
        let n = self.len();
        if self.edges.len() != n || self.edges.iter().any(|row| row.len() != n) {
            return Err(format!("automaton edge matrix must be {}x{}", n, n));
        }
        if self.actions.len() != n || self.actions.iter().any(|row| row.len() != n) {
            return Err(format!("automaton action matrix must be {}x{}", n, n));
        }
        if self.finish_edges.len() != n || self.finish_actions.len() != n {
            return Err(format!("automaton needs {} finish edges and actions", n));
        }
        if let Some(bad) = self.finish_edges.iter().find(|&&to| to >= n) {
            return Err(format!("finish edge points at missing node {}", bad));
        }
        Ok(())
    }

    fn edge(&self, from: usize, to: usize) -> Option<&Condition> {
        self.edges.get(from)?.get(to)?.as_ref()
    }

    fn filled_edges(&self) -> Vec<(usize, usize)> {
        let n = self.len();
        (0..n)
            .flat_map(|i| (0..n).map(move |j| (i, j)))
            .filter(|&(i, j)| self.edge(i, j).is_some())
            .collect()
    }

    fn empty_edges(&self) -> Vec<(usize, usize)> {
        let n = self.len();
        (0..n)
            .flat_map(|i| (0..n).map(move |j| (i, j)))
            .filter(|&(i, j)| i != j && self.edge(i, j).is_none())
            .collect()
    }

    /// Pad or cut the matrices to `len() x len()` and point dangling finish
    /// edges back at their own node
    pub fn normalize(&mut self) {
        let n = self.len();
        self.edges.resize(n, vec![None; n]);
        self.edges.iter_mut().for_each(|row| row.resize(n, None));
        self.actions.resize(n, vec![None; n]);
        self.actions.iter_mut().for_each(|row| row.resize(n, None));
        self.finish_actions.resize(n, None);
        self.finish_edges.truncate(n);
        while self.finish_edges.len() < n {
            self.finish_edges.push(self.finish_edges.len());
        }
        for (i, to) in self.finish_edges.iter_mut().enumerate() {
            if *to >= n {
                *to = i;
            }
        }
    }

    pub fn mutate(&mut self, op: &OptimizationParameters, rng: &mut impl Rng) {
        let n = self.len();
        if n == 0 {
            return;
        }
        self.normalize();

        // Add and remove whole edges
        for _ in 0..poisson(op.condition_amount_mutate_rate, rng) {
            let empty = self.empty_edges();
            if empty.is_empty() {
                break;
            }
            let (i, j) = empty[rng.gen_range(0..empty.len())];
            self.edges[i][j] = Some(random_condition(op, false, rng));
        }
        for _ in 0..poisson(op.condition_amount_mutate_rate, rng) {
            let filled = self.filled_edges();
            if filled.is_empty() {
                break;
            }
            let (i, j) = filled[rng.gen_range(0..filled.len())];
            self.edges[i][j] = None;
            self.actions[i][j] = None;
        }

        // Grow or shrink the surviving conditions
        for (i, j) in self.filled_edges() {
            let condition = self.edges[i][j].take();
            self.edges[i][j] = mutate_condition(condition, op, false, rng);
        }

        for to in self.finish_edges.iter_mut() {
            if rng.gen::<f64>() < op.finish_edge_mutation_rate {
                *to = rng.gen_range(0..n);
            }
        }

        for (i, j) in self.filled_edges() {
            mutate_action(&mut self.actions[i][j], op, rng);
        }
        for slot in self.finish_actions.iter_mut() {
            mutate_action(slot, op, rng);
        }
    }

    pub fn registers(&self) -> Vec<(&'static str, usize)> {
        let mut out = Vec::new();
        for condition in self.edges.iter().flatten().flatten() {
            condition_registers(condition, &mut out);
        }
        for action in self.actions.iter().flatten().flatten().chain(self.finish_actions.iter().flatten()) {
            out.extend(action.registers());
        }
        out
    }

    pub fn to_dot(&self) -> String {
        let mut text = String::from("digraph G {\n");
        for (i, task) in self.tasks.iter().enumerate() {
            text += &format!("n{} [label=\"{}\"]\n", i, task.name());
        }
        for (i, j) in self.filled_edges() {
            let mut label = self.edges[i][j].as_ref().map(ToString::to_string).unwrap_or_default();
            if let Some(action) = &self.actions[i][j] {
                label += &format!("\\n{}", action);
            }
            text += &format!("n{}->n{} [label=\"{}\"]\n", i, j, label);
        }
        for (i, &to) in self.finish_edges.iter().enumerate() {
            let label = self.finish_actions[i]
                .as_ref()
                .map(|a| a.to_string())
                .unwrap_or_default();
            text += &format!("n{}->n{} [style=dashed,label=\"{}\"]\n", i, to, label);
        }
        text.push('}');
        text
    }
}

/// Replace or clear an action slot, or mutate the action in place
fn mutate_action(slot: &mut Option<Action>, op: &OptimizationParameters, rng: &mut impl Rng) {
    if rng.gen::<f64>() < op.action_mutation_rate {
        *slot = if rng.gen_bool(0.5) {
            Some(random_action(rng))
        } else {
            None
        };
    } else if let Some(action) = slot {
        action.mutate(op, rng);
    }
}
