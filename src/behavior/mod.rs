//! Agent behaviour: conditions, actions, tasks and the two control engines
//! (automaton and behaviour tree) that tie them together.

pub mod action;
pub mod automaton;
pub mod condition;
pub mod mutation;
pub mod sensors;
pub mod task;
pub mod tree;

pub use action::{Action, CoordSource};
pub use automaton::Automaton;
pub use condition::{Condition, Expression};
pub use mutation::OptimizationParameters;
pub use sensors::{BoolSensor, ValueSensor};
pub use task::{Task, TaskStatus};
pub use tree::{BehaviourTree, BtNode};

use crate::agent::{Agent, AgentId, REGISTER_COUNT};
use crate::config::BehaviorConfig;
use crate::grid::Pos;
use crate::world::World;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Whose state a sensor reads
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    /// The acting agent
    #[serde(rename = "self")]
    Own,
    /// The agent saved by `SelectTargetAgent`
    Saved,
    /// The agent a communication loop is currently visiting
    Queried,
}

/// Everything an agent's behaviour may read or change during its turn
pub struct Context<'a> {
    pub world: &'a mut World,
    pub agents: &'a mut [Agent],
    pub me: AgentId,
}

impl<'a> Context<'a> {
    pub fn new(world: &'a mut World, agents: &'a mut [Agent], me: AgentId) -> Self {
        Self { world, agents, me }
    }

    #[inline]
    pub fn agent(&self) -> &Agent {
        &self.agents[self.me]
    }

    #[inline]
    pub fn agent_mut(&mut self) -> &mut Agent {
        &mut self.agents[self.me]
    }

    /// The agent a target designates, if it is set and still exists
    pub fn resolve(&self, target: Target) -> Option<AgentId> {
        let id = match target {
            Target::Own => Some(self.me),
            Target::Saved => self.agent().target_agent,
            Target::Queried => self.agent().queried_agent,
        }?;
        (id < self.agents.len()).then_some(id)
    }

    /// Agents in communication range, computed once per tick
    pub fn nearby_agents(&mut self) -> Vec<AgentId> {
        if let Some(cached) = &self.agent().nearby_agents {
            return cached.clone();
        }
        let pos = self.agent().pos;
        let nearby = self.world.agents_near(self.me, pos);
        self.agent_mut().nearby_agents = Some(nearby.clone());
        nearby
    }

    pub fn read_float(&mut self, target: Target, index: usize) -> Option<f64> {
        let id = self.resolve(target)?;
        let value = *self.agents[id].floats.get(index)?;
        Some(if target == Target::Own {
            value
        } else {
            self.world.distort_float(value)
        })
    }

    pub fn read_coord(&mut self, target: Target, index: usize) -> Option<Pos> {
        let id = self.resolve(target)?;
        let pos = (*self.agents[id].coords.get(index)?)?;
        Some(self.distort(target, pos))
    }

    pub fn read_waypoint(&mut self, target: Target) -> Option<Pos> {
        let id = self.resolve(target)?;
        let pos = self.agents[id].waypoint?;
        Some(self.distort(target, pos))
    }

    fn distort(&mut self, target: Target, pos: Pos) -> Pos {
        if target == Target::Own {
            pos
        } else {
            self.world.distort_coord(pos)
        }
    }

    /// Step the acting agent onto a neighbouring cell
    pub fn move_to(&mut self, to: Pos) -> bool {
        self.world.move_agent(&mut self.agents[self.me], to)
    }
}

/// Built-in behaviours
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preset {
    BaseTree,
    MemorizingTree,
    CommunicatingTree,
    BaseAutomaton,
}

/// The controller every agent of a run shares
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Brain {
    Automaton(Automaton),
    BehaviourTree(BehaviourTree),
}

impl Brain {
    pub fn from_preset(preset: Preset) -> Self {
        match preset {
            Preset::BaseTree => Brain::BehaviourTree(BehaviourTree::base()),
            Preset::MemorizingTree => Brain::BehaviourTree(BehaviourTree::memorizing()),
            Preset::CommunicatingTree => Brain::BehaviourTree(BehaviourTree::communicating()),
            Preset::BaseAutomaton => Brain::Automaton(Automaton::base()),
        }
    }

    /// The brain a run uses: the YAML file when one is named, else the preset
    pub fn from_config(config: &BehaviorConfig) -> Result<Self, Box<dyn std::error::Error>> {
        match &config.file {
            Some(path) => {
                log::info!("Loading brain from {}", path.display());
                Self::load(path)
            }
            None => Ok(Self::from_preset(config.preset)),
        }
    }

    /// Give the acting agent its turn
    pub fn run(&self, ctx: &mut Context) {
        match self {
            Brain::Automaton(a) => a.run(ctx),
            Brain::BehaviourTree(t) => t.run(ctx),
        }
    }

    pub fn to_dot(&self) -> String {
        match self {
            Brain::Automaton(a) => a.to_dot(),
            Brain::BehaviourTree(t) => t.to_dot(),
        }
    }

    pub fn mutate(&mut self, op: &OptimizationParameters, rng: &mut impl Rng) {
        match self {
            Brain::Automaton(a) => a.mutate(op, rng),
            Brain::BehaviourTree(t) => t.mutate(op, rng),
        }
    }

    /// A mutated copy, leaving `self` untouched
    pub fn create_offspring(&self, op: &OptimizationParameters, rng: &mut impl Rng) -> Self {
        let mut child = self.clone();
        child.mutate(op, rng);
        child
    }

    /// Register indices read or written, sorted and deduplicated
    pub fn register_usage(&self) -> Vec<(&'static str, usize)> {
        let mut registers = match self {
            Brain::Automaton(a) => a.registers(),
            Brain::BehaviourTree(t) => t.registers(),
        };
        registers.sort_unstable();
        registers.dedup();
        registers
    }

    /// Reject register indices outside the register file and automata whose
    /// finish edges point nowhere
    pub fn validate(&self) -> Result<(), String> {
        let bad: Vec<String> = self
            .register_usage()
            .into_iter()
            .filter(|&(_, i)| !sensors::in_range(i))
            .map(|(bank, i)| format!("{}[{}]", bank, i))
            .collect();
        if !bad.is_empty() {
            return Err(format!(
                "register indices out of range (max {}): {}",
                REGISTER_COUNT - 1,
                bad.join(", ")
            ));
        }
        if let Brain::Automaton(a) = self {
            a.validate()?;
        }
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)?;
        let brain: Brain = serde_yaml::from_str(&contents)?;
        brain.validate()?;
        Ok(brain)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }
}
