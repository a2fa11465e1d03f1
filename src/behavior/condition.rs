//! Boolean conditions and numeric expressions.
//!
//! A tree lives in a flat arena of [`Node`]s addressed by index, with the root
//! stored alongside. Children are indices into the same arena, so replacing
//! the subtree in a parent slot is a single table write. Every tree owns its
//! arena outright: combining trees copies the operands in, and no node is
//! ever reachable from two parents.
//!
//! Structural mutation works on the logical skeleton of a condition, the
//! `NOT`/`AND`/`OR` operators and the atoms beneath them. [`Condition::size`]
//! counts that skeleton: one more than the number of logical operators.

use super::mutation::{random_condition, OptimizationParameters};
use super::sensors::{BoolSensor, ValueSensor};
use super::{Context, Target};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Index of a node in its tree's arena
pub type NodeId = usize;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Node {
    // Boolean
    Flag { sensor: BoolSensor, target: Target },
    Not(NodeId),
    And(NodeId, NodeId),
    Or(NodeId, NodeId),
    Greater(NodeId, NodeId),
    AtLeast(NodeId, NodeId),
    /// True with probability `p_max / (1 + exp((E1 - E2) / T))`
    Boltzmann {
        current: NodeId,
        candidate: NodeId,
        temperature: f64,
        p_max: f64,
    },

    // Numeric
    Constant(f64),
    Value { sensor: ValueSensor, target: Target },
    Add(NodeId, NodeId),
    Sub(NodeId, NodeId),
    Mul(NodeId, NodeId),
    /// Division by zero yields zero
    Div(NodeId, NodeId),
}

impl Node {
    fn children(&self) -> Vec<NodeId> {
        match *self {
            Node::Flag { .. } | Node::Constant(_) | Node::Value { .. } => Vec::new(),
            Node::Not(c) => vec![c],
            Node::And(a, b)
            | Node::Or(a, b)
            | Node::Greater(a, b)
            | Node::AtLeast(a, b)
            | Node::Add(a, b)
            | Node::Sub(a, b)
            | Node::Mul(a, b)
            | Node::Div(a, b) => vec![a, b],
            Node::Boltzmann {
                current, candidate, ..
            } => vec![current, candidate],
        }
    }

    fn map_children(self, f: &mut impl FnMut(NodeId) -> NodeId) -> Node {
        match self {
            Node::Not(c) => Node::Not(f(c)),
            Node::And(a, b) => Node::And(f(a), f(b)),
            Node::Or(a, b) => Node::Or(f(a), f(b)),
            Node::Greater(a, b) => Node::Greater(f(a), f(b)),
            Node::AtLeast(a, b) => Node::AtLeast(f(a), f(b)),
            Node::Add(a, b) => Node::Add(f(a), f(b)),
            Node::Sub(a, b) => Node::Sub(f(a), f(b)),
            Node::Mul(a, b) => Node::Mul(f(a), f(b)),
            Node::Div(a, b) => Node::Div(f(a), f(b)),
            Node::Boltzmann {
                current,
                candidate,
                temperature,
                p_max,
            } => Node::Boltzmann {
                current: f(current),
                candidate: f(candidate),
                temperature,
                p_max,
            },
            leaf => leaf,
        }
    }

    /// `NOT`, `AND` or `OR`
    pub fn is_logical(&self) -> bool {
        matches!(self, Node::Not(_) | Node::And(..) | Node::Or(..))
    }

    fn set_child(&mut self, index: usize, child: NodeId) {
        match (self, index) {
            (Node::Not(c), 0) => *c = child,
            (Node::And(a, _), 0) | (Node::Or(a, _), 0) => *a = child,
            (Node::And(_, b), 1) | (Node::Or(_, b), 1) => *b = child,
            _ => {}
        }
    }
}

/// Operand slot of a logical operator
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Slot {
    pub parent: NodeId,
    pub index: usize,
}

/// Copy the subtree under `id` into `dst`, returning its new root
fn copy_subtree(src: &[Node], id: NodeId, dst: &mut Vec<Node>) -> NodeId {
    let node = src[id].clone().map_children(&mut |c| copy_subtree(src, c, dst));
    dst.push(node);
    dst.len() - 1
}

fn eval_bool(nodes: &[Node], id: NodeId, ctx: &mut Context) -> bool {
    match nodes[id] {
        Node::Flag { sensor, target } => sensor.read(ctx, target),
        Node::Not(c) => !eval_bool(nodes, c, ctx),
        Node::And(a, b) => eval_bool(nodes, a, ctx) && eval_bool(nodes, b, ctx),
        Node::Or(a, b) => eval_bool(nodes, a, ctx) || eval_bool(nodes, b, ctx),
        Node::Greater(a, b) => eval_num(nodes, a, ctx) > eval_num(nodes, b, ctx),
        Node::AtLeast(a, b) => eval_num(nodes, a, ctx) >= eval_num(nodes, b, ctx),
        Node::Boltzmann {
            current,
            candidate,
            temperature,
            p_max,
        } => {
            let e1 = eval_num(nodes, current, ctx);
            let e2 = eval_num(nodes, candidate, ctx);
            let p = boltzmann_probability(e1, e2, temperature, p_max);
            ctx.world.rng.gen::<f64>() < p
        }
        _ => eval_num(nodes, id, ctx) != 0.0,
    }
}

fn eval_num(nodes: &[Node], id: NodeId, ctx: &mut Context) -> f64 {
    match nodes[id] {
        Node::Constant(v) => v,
        Node::Value { sensor, target } => sensor.read(ctx, target),
        Node::Add(a, b) => eval_num(nodes, a, ctx) + eval_num(nodes, b, ctx),
        Node::Sub(a, b) => eval_num(nodes, a, ctx) - eval_num(nodes, b, ctx),
        Node::Mul(a, b) => eval_num(nodes, a, ctx) * eval_num(nodes, b, ctx),
        Node::Div(a, b) => {
            let numerator = eval_num(nodes, a, ctx);
            let denominator = eval_num(nodes, b, ctx);
            if denominator == 0.0 {
                0.0
            } else {
                numerator / denominator
            }
        }
        _ => {
            if eval_bool(nodes, id, ctx) {
                1.0
            } else {
                0.0
            }
        }
    }
}

/// Chance of switching from a current option scored `e1` to a candidate
/// scored `e2`. A non-positive temperature makes the choice deterministic.
pub fn boltzmann_probability(e1: f64, e2: f64, temperature: f64, p_max: f64) -> f64 {
    if temperature <= 0.0 {
        return if e2 > e1 { p_max } else { 0.0 };
    }
    p_max / (1.0 + ((e1 - e2) / temperature).exp())
}

fn target_suffix(target: Target) -> &'static str {
    match target {
        Target::Own => "",
        Target::Saved => "[saved]",
        Target::Queried => "[queried]",
    }
}

fn write_node(nodes: &[Node], id: NodeId, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let binary = |f: &mut fmt::Formatter<'_>, a, op: &str, b, parens: bool| -> fmt::Result {
        if parens {
            write!(f, "(")?;
        }
        write_node(nodes, a, f)?;
        write!(f, " {} ", op)?;
        write_node(nodes, b, f)?;
        if parens {
            write!(f, ")")?;
        }
        Ok(())
    };
    match nodes[id] {
        Node::Flag { sensor, target } => write!(f, "{}{}", sensor, target_suffix(target)),
        Node::Value { sensor, target } => write!(f, "{}{}", sensor, target_suffix(target)),
        Node::Constant(v) => write!(f, "{}", v),
        Node::Not(c) => {
            // Comparisons print without their own parentheses
            if matches!(nodes[c], Node::Greater(..) | Node::AtLeast(..)) {
                write!(f, "NOT (")?;
                write_node(nodes, c, f)?;
                write!(f, ")")
            } else {
                write!(f, "NOT ")?;
                write_node(nodes, c, f)
            }
        }
        Node::And(a, b) => binary(f, a, "AND", b, true),
        Node::Or(a, b) => binary(f, a, "OR", b, true),
        Node::Greater(a, b) => binary(f, a, ">", b, false),
        Node::AtLeast(a, b) => binary(f, a, ">=", b, false),
        Node::Add(a, b) => binary(f, a, "+", b, true),
        Node::Sub(a, b) => binary(f, a, "-", b, true),
        Node::Mul(a, b) => binary(f, a, "*", b, true),
        Node::Div(a, b) => binary(f, a, "/", b, true),
        Node::Boltzmann {
            current,
            candidate,
            temperature,
            p_max,
        } => {
            write!(f, "Boltzmann(")?;
            write_node(nodes, current, f)?;
            write!(f, ", ")?;
            write_node(nodes, candidate, f)?;
            write!(f, ", T={}, p={})", temperature, p_max)
        }
    }
}

/// A boolean tree
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    nodes: Vec<Node>,
    root: NodeId,
}

/// A numeric tree
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Expression {
    nodes: Vec<Node>,
    root: NodeId,
}

/// Append an operator over fresh copies of the operand arenas
fn combine(operands: &[(&[Node], NodeId)], make: impl FnOnce(&[NodeId]) -> Node) -> (Vec<Node>, NodeId) {
    let mut nodes = Vec::new();
    let roots: Vec<NodeId> = operands
        .iter()
        .map(|&(src, root)| copy_subtree(src, root, &mut nodes))
        .collect();
    nodes.push(make(&roots));
    let root = nodes.len() - 1;
    (nodes, root)
}

impl Condition {
    fn parts(&self) -> (&[Node], NodeId) {
        (&self.nodes, self.root)
    }

    pub fn flag(sensor: BoolSensor, target: Target) -> Self {
        Self {
            nodes: vec![Node::Flag { sensor, target }],
            root: 0,
        }
    }

    pub fn not(c: Condition) -> Self {
        let (nodes, root) = combine(&[c.parts()], |r| Node::Not(r[0]));
        Self { nodes, root }
    }

    pub fn and(a: Condition, b: Condition) -> Self {
        let (nodes, root) = combine(&[a.parts(), b.parts()], |r| Node::And(r[0], r[1]));
        Self { nodes, root }
    }

    pub fn or(a: Condition, b: Condition) -> Self {
        let (nodes, root) = combine(&[a.parts(), b.parts()], |r| Node::Or(r[0], r[1]));
        Self { nodes, root }
    }

    /// `a > b`
    pub fn greater(a: Expression, b: Expression) -> Self {
        let (nodes, root) = combine(&[a.parts(), b.parts()], |r| Node::Greater(r[0], r[1]));
        Self { nodes, root }
    }

    /// `a >= b`
    pub fn at_least(a: Expression, b: Expression) -> Self {
        let (nodes, root) = combine(&[a.parts(), b.parts()], |r| Node::AtLeast(r[0], r[1]));
        Self { nodes, root }
    }

    pub fn boltzmann(current: Expression, candidate: Expression, temperature: f64, p_max: f64) -> Self {
        let (nodes, root) = combine(
            &[current.parts(), candidate.parts()],
            |r| Node::Boltzmann {
                current: r[0],
                candidate: r[1],
                temperature,
                p_max,
            },
        );
        Self { nodes, root }
    }

    pub fn evaluate(&self, ctx: &mut Context) -> bool {
        eval_bool(&self.nodes, self.root, ctx)
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    /// Nodes reachable from the root
    pub fn node_count(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            count += 1;
            stack.extend(self.nodes[id].children());
        }
        count
    }

    /// Logical operators plus one
    pub fn size(&self) -> usize {
        self.descendants()
            .iter()
            .filter(|(id, _)| self.nodes[*id].is_logical())
            .count()
            + 1
    }

    /// Every node of the logical skeleton with the operator slot holding it,
    /// root first (slot `None`)
    pub fn descendants(&self) -> Vec<(NodeId, Option<Slot>)> {
        let mut out = Vec::new();
        self.collect_descendants(self.root, None, &mut out);
        out
    }

    fn collect_descendants(&self, id: NodeId, slot: Option<Slot>, out: &mut Vec<(NodeId, Option<Slot>)>) {
        out.push((id, slot));
        if self.nodes[id].is_logical() {
            for (index, child) in self.nodes[id].children().into_iter().enumerate() {
                self.collect_descendants(child, Some(Slot { parent: id, index }), out);
            }
        }
    }

    /// Ways to remove one logical operator: each entry is the operand that
    /// replaces an operator, and the slot that operator occupies. An operator
    /// with an atom operand can be replaced by its other operand (a `NOT` by
    /// its atom); operator operands are searched recursively instead.
    pub fn removables(&self) -> Vec<(NodeId, Option<Slot>)> {
        let mut out = Vec::new();
        self.collect_removables(self.root, None, &mut out);
        out
    }

    fn collect_removables(&self, id: NodeId, slot: Option<Slot>, out: &mut Vec<(NodeId, Option<Slot>)>) {
        match self.nodes[id] {
            Node::And(a, b) | Node::Or(a, b) => {
                if self.nodes[a].is_logical() {
                    self.collect_removables(a, Some(Slot { parent: id, index: 0 }), out);
                } else {
                    out.push((b, slot));
                }
                if self.nodes[b].is_logical() {
                    self.collect_removables(b, Some(Slot { parent: id, index: 1 }), out);
                } else {
                    out.push((a, slot));
                }
            }
            Node::Not(c) => {
                if self.nodes[c].is_logical() {
                    self.collect_removables(c, Some(Slot { parent: id, index: 0 }), out);
                } else {
                    out.push((c, slot));
                }
            }
            _ => {}
        }
    }

    fn place(&mut self, node: NodeId, slot: Option<Slot>) {
        match slot {
            None => self.root = node,
            Some(Slot { parent, index }) => self.nodes[parent].set_child(index, node),
        }
    }

    /// Grow by one logical operator: wrap a random skeleton node in `NOT`, or
    /// join it with a fresh random atom under `AND`/`OR`
    pub fn expand(&mut self, op: &OptimizationParameters, queried: bool, rng: &mut impl Rng) {
        let descendants = self.descendants();
        let (child, slot) = descendants[rng.gen_range(0..descendants.len())];

        let operator = if rng.gen::<f64>() < op.p_not {
            Node::Not(child)
        } else {
            let atom = random_condition(op, queried, rng);
            let atom_root = copy_subtree(&atom.nodes, atom.root, &mut self.nodes);
            if rng.gen_bool(0.5) {
                Node::And(child, atom_root)
            } else {
                Node::Or(child, atom_root)
            }
        };
        self.nodes.push(operator);
        let id = self.nodes.len() - 1;
        self.place(id, slot);
    }

    /// Shrink by one logical operator. A tree without operators is left unchanged.
    pub fn reduce(&mut self, rng: &mut impl Rng) {
        let removables = self.removables();
        if removables.is_empty() {
            return;
        }
        let (replacement, slot) = removables[rng.gen_range(0..removables.len())];
        self.place(replacement, slot);
        self.compact();
    }

    /// Drop arena entries no longer reachable from the root
    fn compact(&mut self) {
        let mut nodes = Vec::with_capacity(self.nodes.len());
        self.root = copy_subtree(&self.nodes, self.root, &mut nodes);
        self.nodes = nodes;
    }

    /// Deep copy holding only reachable nodes
    pub fn copy(&self) -> Self {
        let mut nodes = Vec::new();
        let root = copy_subtree(&self.nodes, self.root, &mut nodes);
        Self { nodes, root }
    }

    /// Every sensor read anywhere in the tree
    pub fn sensors(&self) -> (Vec<BoolSensor>, Vec<ValueSensor>) {
        let mut bools = Vec::new();
        let mut values = Vec::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            match self.nodes[id] {
                Node::Flag { sensor, .. } => bools.push(sensor),
                Node::Value { sensor, .. } => values.push(sensor),
                ref node => stack.extend(node.children()),
            }
        }
        (bools, values)
    }
}

impl Expression {
    fn parts(&self) -> (&[Node], NodeId) {
        (&self.nodes, self.root)
    }

    pub fn constant(value: f64) -> Self {
        Self {
            nodes: vec![Node::Constant(value)],
            root: 0,
        }
    }

    pub fn value(sensor: ValueSensor, target: Target) -> Self {
        Self {
            nodes: vec![Node::Value { sensor, target }],
            root: 0,
        }
    }

    pub fn add(a: Expression, b: Expression) -> Self {
        let (nodes, root) = combine(&[a.parts(), b.parts()], |r| Node::Add(r[0], r[1]));
        Self { nodes, root }
    }

    pub fn sub(a: Expression, b: Expression) -> Self {
        let (nodes, root) = combine(&[a.parts(), b.parts()], |r| Node::Sub(r[0], r[1]));
        Self { nodes, root }
    }

    pub fn mul(a: Expression, b: Expression) -> Self {
        let (nodes, root) = combine(&[a.parts(), b.parts()], |r| Node::Mul(r[0], r[1]));
        Self { nodes, root }
    }

    pub fn div(a: Expression, b: Expression) -> Self {
        let (nodes, root) = combine(&[a.parts(), b.parts()], |r| Node::Div(r[0], r[1]));
        Self { nodes, root }
    }

    pub fn evaluate(&self, ctx: &mut Context) -> f64 {
        eval_num(&self.nodes, self.root, ctx)
    }

    /// Nodes reachable from the root
    pub fn size(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            count += 1;
            stack.extend(self.nodes[id].children());
        }
        count
    }

    pub fn copy(&self) -> Self {
        let mut nodes = Vec::new();
        let root = copy_subtree(&self.nodes, self.root, &mut nodes);
        Self { nodes, root }
    }

    pub fn sensors(&self) -> Vec<ValueSensor> {
        let mut values = Vec::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            match self.nodes[id] {
                Node::Value { sensor, .. } => values.push(sensor),
                ref node => stack.extend(node.children()),
            }
        }
        values
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_node(&self.nodes, self.root, f)
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_node(&self.nodes, self.root, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn food_check() -> Condition {
        Condition::greater(
            Expression::value(ValueSensor::NearbyFood, Target::Own),
            Expression::constant(0.0),
        )
    }

    #[test]
    fn test_to_string() {
        let c = Condition::and(
            Condition::not(Condition::flag(BoolSensor::IsHoldingFood, Target::Own)),
            Condition::or(food_check(), Condition::flag(BoolSensor::IsWaypointSet, Target::Saved)),
        );
        assert_eq!(
            c.to_string(),
            "(NOT IsHoldingFood AND (NearbyFood > 0 OR IsWaypointSet[saved]))"
        );

        let e = Expression::div(
            Expression::value(ValueSensor::GroundDensity, Target::Queried),
            Expression::add(Expression::constant(1.5), Expression::value(ValueSensor::Counter(2), Target::Own)),
        );
        assert_eq!(e.to_string(), "(GroundFoodDensity[queried] / (1.5 + Counter[2]))");
    }

    #[test]
    fn test_negated_comparison_is_parenthesized() {
        assert_eq!(Condition::not(food_check()).to_string(), "NOT (NearbyFood > 0)");

        let at_least = Condition::at_least(
            Expression::value(ValueSensor::Counter(1), Target::Own),
            Expression::constant(3.0),
        );
        let c = Condition::or(
            Condition::not(at_least),
            Condition::not(Condition::not(Condition::flag(BoolSensor::IsAtColony, Target::Own))),
        );
        assert_eq!(c.to_string(), "(NOT (Counter[1] >= 3) OR NOT NOT IsAtColony)");
    }

    #[test]
    fn test_size_counts_logical_operators() {
        assert_eq!(food_check().size(), 1);
        assert_eq!(food_check().node_count(), 3);
        let c = Condition::or(Condition::not(food_check()), Condition::flag(BoolSensor::IsAtColony, Target::Own));
        assert_eq!(c.size(), 3);
        assert_eq!(c.descendants().len(), 4);
    }

    #[test]
    fn test_removables() {
        // (a AND b): either operand can replace the operator
        let c = Condition::and(
            Condition::flag(BoolSensor::IsHoldingFood, Target::Own),
            Condition::flag(BoolSensor::IsAtColony, Target::Own),
        );
        let removables = c.removables();
        assert_eq!(removables.len(), 2);
        assert!(removables.iter().all(|(_, slot)| slot.is_none()));

        // A lone atom cannot shrink
        assert!(food_check().removables().is_empty());
    }

    #[test]
    fn test_reduce_on_atom_is_unchanged() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut c = food_check();
        c.reduce(&mut rng);
        assert_eq!(c, food_check());
    }

    #[test]
    fn test_reduce_compacts_arena() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut c = Condition::not(Condition::not(food_check()));
        c.reduce(&mut rng);
        assert_eq!(c.to_string(), "NOT (NearbyFood > 0)");
        assert_eq!(c.node_count(), c.nodes.len());
    }

    #[test]
    fn test_expand_reduce_size_laws() {
        let op = OptimizationParameters::default();
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let mut c = food_check();
        for _ in 0..30 {
            let before = c.size();
            c.expand(&op, false, &mut rng);
            assert_eq!(c.size(), before + 1);

            let mut reduced = c.copy();
            reduced.reduce(&mut rng);
            assert_eq!(reduced.size(), before);
        }
    }

    #[test]
    fn test_copy_does_not_alias() {
        let op = OptimizationParameters::default();
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let original = Condition::and(food_check(), Condition::flag(BoolSensor::IsHoldingFood, Target::Saved));
        let text = original.to_string();

        let mut copy = original.copy();
        assert_eq!(copy.to_string(), text);
        for _ in 0..5 {
            copy.expand(&op, true, &mut rng);
        }
        assert_ne!(copy.to_string(), text);
        assert_eq!(original.to_string(), text);
    }

    #[test]
    fn test_boltzmann_probability() {
        assert!((boltzmann_probability(1.0, 1.0, 1.0, 0.8) - 0.4).abs() < 1e-12);
        assert!(boltzmann_probability(0.0, 10.0, 1.0, 1.0) > 0.99);
        assert!(boltzmann_probability(10.0, 0.0, 1.0, 1.0) < 0.01);
        assert_eq!(boltzmann_probability(1.0, 2.0, 0.0, 0.5), 0.5);
        assert_eq!(boltzmann_probability(2.0, 1.0, 0.0, 0.5), 0.0);
    }

    #[test]
    fn test_serde_roundtrip() {
        let c = Condition::or(food_check(), Condition::flag(BoolSensor::Flag(3), Target::Queried));
        let yaml = serde_yaml::to_string(&c).unwrap();
        let back: Condition = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back.to_string(), c.to_string());
    }
}
