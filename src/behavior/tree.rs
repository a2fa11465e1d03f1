//! Behaviour trees.
//!
//! The tree is re-entered from the root every tick. A task that moves the
//! agent (or finishes its goal) sets `is_done`, and every composite above it
//! returns immediately, so at most one task acts per tick.

use super::action::{condition_registers, Action};
use super::condition::{Condition, Expression};
use super::mutation::{mutate_condition, poisson, random_action, OptimizationParameters};
use super::sensors::{BoolSensor, ValueSensor};
use super::task::{Task, TaskStatus};
use super::{Context, Target};
use crate::agent::AgentId;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum BtNode {
    /// Runs children in order until one fails
    Sequence(Vec<BtNode>),
    /// Runs children in order until one succeeds
    Selector(Vec<BtNode>),
    /// Runs the child for its effects and reports a fixed result
    Skipper { child: Box<BtNode>, value: bool },
    /// Runs the child while the condition holds, at most `max_iterations` times
    Loop {
        condition: Condition,
        child: Box<BtNode>,
        max_iterations: usize,
    },
    /// Runs the child once per sampled communication partner, with that
    /// partner as the queried agent
    CommunicationLoop { child: Box<BtNode> },
    Task(Task),
    Condition(Condition),
    Action(#[serde(with = "serde_yaml::with::singleton_map")] Action),
}

impl BtNode {
    pub fn run(&self, ctx: &mut Context) -> bool {
        match self {
            BtNode::Sequence(children) => {
                for child in children {
                    if ctx.agent().is_done {
                        return true;
                    }
                    if !child.run(ctx) {
                        return false;
                    }
                }
                true
            }
            BtNode::Selector(children) => {
                for child in children {
                    if ctx.agent().is_done {
                        return true;
                    }
                    if child.run(ctx) {
                        return true;
                    }
                }
                false
            }
            BtNode::Skipper { child, value } => {
                child.run(ctx);
                *value
            }
            BtNode::Loop {
                condition,
                child,
                max_iterations,
            } => {
                let mut any = false;
                for _ in 0..*max_iterations {
                    if ctx.agent().is_done || !condition.evaluate(ctx) {
                        break;
                    }
                    any |= child.run(ctx);
                }
                any
            }
            BtNode::CommunicationLoop { child } => {
                let partners = select_partners(ctx);
                let previous = ctx.agent().queried_agent;
                let mut any = false;
                for partner in partners {
                    if ctx.agent().is_done {
                        break;
                    }
                    ctx.agent_mut().queried_agent = Some(partner);
                    any |= child.run(ctx);
                }
                ctx.agent_mut().queried_agent = previous;
                any
            }
            BtNode::Task(task) => match task.act(ctx) {
                TaskStatus::Running | TaskStatus::Complete => {
                    ctx.agent_mut().is_done = true;
                    true
                }
                TaskStatus::Idle => false,
            },
            BtNode::Condition(condition) => condition.evaluate(ctx),
            BtNode::Action(action) => action.run(ctx),
        }
    }

    fn children(&self) -> Vec<&BtNode> {
        match self {
            BtNode::Sequence(children) | BtNode::Selector(children) => children.iter().collect(),
            BtNode::Skipper { child, .. }
            | BtNode::Loop { child, .. }
            | BtNode::CommunicationLoop { child } => vec![child.as_ref()],
            _ => Vec::new(),
        }
    }

    fn children_mut(&mut self) -> Vec<&mut BtNode> {
        match self {
            BtNode::Sequence(children) | BtNode::Selector(children) => children.iter_mut().collect(),
            BtNode::Skipper { child, .. }
            | BtNode::Loop { child, .. }
            | BtNode::CommunicationLoop { child } => vec![child.as_mut()],
            _ => Vec::new(),
        }
    }

    pub fn label(&self) -> String {
        match self {
            BtNode::Sequence(_) => "Sequence".to_string(),
            BtNode::Selector(_) => "Selector".to_string(),
            BtNode::Skipper { value, .. } => format!("Skipper({})", value),
            BtNode::Loop {
                condition,
                max_iterations,
                ..
            } => format!("Loop({}, max {})", condition, max_iterations),
            BtNode::CommunicationLoop { .. } => "CommunicationLoop".to_string(),
            BtNode::Task(task) => task.name().to_string(),
            BtNode::Condition(condition) => condition.to_string(),
            BtNode::Action(action) => action.to_string(),
        }
    }

    fn color(&self) -> &'static str {
        match self {
            BtNode::Condition(_) => "#a1dd80",
            BtNode::Action(_) => "#ddb380",
            BtNode::Task(_) => "#dd8080",
            BtNode::Selector(_) => "#dadd80",
            _ => "#80d4dd",
        }
    }
}

/// Draw `min(|eligible|, Poisson(n_comm))` distinct agents from those in
/// communication range
pub fn select_partners(ctx: &mut Context) -> Vec<AgentId> {
    let eligible = ctx.nearby_agents();
    let n_comm = ctx.world.settings.n_comm;
    let count = (poisson(n_comm, &mut ctx.world.rng) as usize).min(eligible.len());
    eligible
        .choose_multiple(&mut ctx.world.rng, count)
        .copied()
        .collect()
}

/// A behaviour tree: one root node
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BehaviourTree {
    pub root: BtNode,
}

fn holding_food() -> Condition {
    Condition::flag(BoolSensor::IsHoldingFood, Target::Own)
}

fn food_nearby() -> Condition {
    Condition::greater(
        Expression::value(ValueSensor::NearbyFood, Target::Own),
        Expression::constant(0.0),
    )
}

fn waypoint_set(target: Target) -> Condition {
    Condition::flag(BoolSensor::IsWaypointSet, target)
}

impl BehaviourTree {
    pub fn new(root: BtNode) -> Self {
        Self { root }
    }

    /// Carry food home, else gather nearby food, else wander
    pub fn base() -> Self {
        Self::new(BtNode::Selector(vec![
            BtNode::Sequence(vec![BtNode::Condition(holding_food()), BtNode::Task(Task::ReturnHome)]),
            BtNode::Sequence(vec![BtNode::Condition(food_nearby()), BtNode::Task(Task::Gather)]),
            BtNode::Task(Task::RandomWalk),
        ]))
    }

    /// Like the base tree, but remembers where food was found and walks back there
    pub fn memorizing() -> Self {
        Self::new(BtNode::Selector(vec![
            BtNode::Sequence(vec![BtNode::Condition(holding_food()), BtNode::Task(Task::ReturnHome)]),
            BtNode::Sequence(vec![
                BtNode::Condition(food_nearby()),
                BtNode::Action(Action::SetWaypoint),
                BtNode::Task(Task::Gather),
            ]),
            BtNode::Sequence(vec![
                BtNode::Condition(waypoint_set(Target::Own)),
                BtNode::Task(Task::GoToWaypoint),
            ]),
            BtNode::Sequence(vec![
                BtNode::Action(Action::ResetWaypoint { register: None }),
                BtNode::Task(Task::RandomWalk),
            ]),
        ]))
    }

    /// Like the memorizing tree, but an agent without a waypoint asks nearby
    /// agents for theirs before wandering
    pub fn communicating() -> Self {
        let ask_peers = BtNode::Skipper {
            child: Box::new(BtNode::CommunicationLoop {
                child: Box::new(BtNode::Sequence(vec![
                    BtNode::Condition(Condition::not(waypoint_set(Target::Own))),
                    BtNode::Condition(waypoint_set(Target::Queried)),
                    BtNode::Action(Action::CopyWaypoint { from: Target::Queried }),
                ])),
            }),
            value: true,
        };

        Self::new(BtNode::Selector(vec![
            BtNode::Sequence(vec![BtNode::Condition(holding_food()), BtNode::Task(Task::ReturnHome)]),
            BtNode::Sequence(vec![
                BtNode::Condition(food_nearby()),
                BtNode::Action(Action::SetWaypoint),
                BtNode::Task(Task::Gather),
            ]),
            BtNode::Sequence(vec![
                BtNode::Condition(waypoint_set(Target::Own)),
                BtNode::Task(Task::GoToWaypoint),
            ]),
            BtNode::Sequence(vec![
                BtNode::Action(Action::ResetWaypoint { register: None }),
                ask_peers,
                BtNode::Selector(vec![
                    BtNode::Sequence(vec![
                        BtNode::Condition(waypoint_set(Target::Own)),
                        BtNode::Task(Task::GoToWaypoint),
                    ]),
                    BtNode::Task(Task::RandomWalk),
                ]),
            ]),
        ]))
    }

    pub fn run(&self, ctx: &mut Context) {
        ctx.agent_mut().is_done = false;
        self.root.run(ctx);
    }

    /// Grow or shrink every condition and occasionally swap action leaves
    pub fn mutate(&mut self, op: &OptimizationParameters, rng: &mut impl Rng) {
        let mut stack = vec![&mut self.root];
        while let Some(node) = stack.pop() {
            match &mut *node {
                BtNode::Condition(condition) | BtNode::Loop { condition, .. } => {
                    if let Some(mutated) = mutate_condition(Some(condition.copy()), op, false, rng) {
                        *condition = mutated;
                    }
                }
                BtNode::Action(action) => {
                    if rng.gen::<f64>() < op.action_mutation_rate {
                        *action = random_action(rng);
                    } else {
                        action.mutate(op, rng);
                    }
                }
                _ => {}
            }
            stack.extend(node.children_mut());
        }
    }

    /// Register indices read or written anywhere in the tree
    pub fn registers(&self) -> Vec<(&'static str, usize)> {
        let mut out = Vec::new();
        let mut stack = vec![&self.root];
        while let Some(node) = stack.pop() {
            match node {
                BtNode::Condition(c) | BtNode::Loop { condition: c, .. } => condition_registers(c, &mut out),
                BtNode::Action(a) => out.extend(a.registers()),
                _ => {}
            }
            stack.extend(node.children());
        }
        out
    }

    /// Graphviz rendering, nodes numbered breadth first
    pub fn to_dot(&self) -> String {
        let mut text = String::from("digraph G {\nnodesep=0.5\nranksep=0.5\n");
        let mut queue = VecDeque::from([&self.root]);
        let mut i = 0;
        while let Some(node) = queue.pop_front() {
            text += &format!(
                "n{} [label=\"{}\",style=filled,shape=rect,fillcolor=\"{}\"]\n",
                i,
                node.label(),
                node.color()
            );
            let mut j = i + queue.len() + 1;
            for child in node.children() {
                queue.push_back(child);
                text += &format!("n{}->n{}\n", i, j);
                j += 1;
            }
            i += 1;
        }
        text.push('}');
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_dot_numbering() {
        let dot = BehaviourTree::base().to_dot();
        assert!(dot.starts_with("digraph G {"));
        assert!(dot.contains("n0 [label=\"Selector\""));
        assert!(dot.contains("n0->n1\nn0->n2\nn0->n3\n"));
        // Children of the first sequence come after the root's three children
        assert!(dot.contains("n1->n4\nn1->n5\n"));
        assert!(dot.contains("label=\"Return Home\""));
        assert!(dot.ends_with('}'));
    }

    #[test]
    fn test_prebuilt_trees_use_no_registers() {
        for tree in [BehaviourTree::base(), BehaviourTree::memorizing(), BehaviourTree::communicating()] {
            assert!(tree.registers().is_empty());
        }
    }

    #[test]
    fn test_mutation_keeps_shape() {
        use rand::SeedableRng;
        let op = OptimizationParameters {
            condition_mutate_rate: 2.0,
            action_mutation_rate: 1.0,
            ..OptimizationParameters::default()
        };
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(4);
        let mut tree = BehaviourTree::memorizing();
        tree.mutate(&op, &mut rng);
        match &tree.root {
            BtNode::Selector(children) => assert_eq!(children.len(), 4),
            other => panic!("root changed to {:?}", other),
        }
    }

    #[test]
    fn test_partners_are_distinct_peers() {
        use super::super::fixtures::{Scene, CORRIDOR};
        use crate::config::Config;
        use crate::grid::Pos;

        let mut config = Config::default();
        config.simulation.n_comm = 3.0;
        let colony = Pos::new(1, 1);
        let mut scene = Scene::new(CORRIDOR, &[colony; 6], &config);
        for _ in 0..50 {
            let mut ctx = scene.ctx(2);
            let mut partners = select_partners(&mut ctx);
            assert!(partners.len() <= 5);
            assert!(!partners.contains(&2));
            partners.sort_unstable();
            let n = partners.len();
            partners.dedup();
            assert_eq!(partners.len(), n);
        }
    }
}
