//! Grid shortest-path fields.
//!
//! A [`Pathfinder`] holds, for one source cell, the 4-connected shortest-path
//! distance to every cell and a bitmask of the neighbours lying exactly one
//! step closer to the source. Following any set bit walks a shortest path home.
//!
//! The field is maintained incrementally: wall removals flood outward from the
//! opened cell only where distances shrink, and wall additions invalidate the
//! cells whose every shortest path ran through the new wall before re-seeding
//! them from their intact neighbours.

pub mod all_pairs;
pub mod cache;
pub mod navigator;

pub use all_pairs::AllPairsPathfinder;
pub use cache::CacheError;
pub use navigator::{Navigator, PathfinderPool, POOL_CAPACITY};

use crate::grid::{Direction, Pos};
use ndarray::Array2;
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap, VecDeque};

/// Distance stored for cells that cannot reach the source
pub const UNREACHABLE: u16 = 999;

/// Single-source shortest-path field with incremental maintenance
#[derive(Clone, Debug)]
pub struct Pathfinder {
    source: Pos,
    walls: Array2<bool>,
    distance: Array2<u16>,
    direction: Array2<u8>,
}

impl Pathfinder {
    /// Build the field for `source` over the given wall grid (indexed `[[x, y]]`)
    pub fn new(walls: Array2<bool>, source: Pos) -> Self {
        let dim = walls.dim();
        let mut pathfinder = Self {
            source,
            walls,
            distance: Array2::from_elem(dim, UNREACHABLE),
            direction: Array2::zeros(dim),
        };
        pathfinder.update_from(source);
        pathfinder
    }

    #[inline]
    pub fn source(&self) -> Pos {
        self.source
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.walls.dim().0
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.walls.dim().1
    }

    /// In bounds and not a wall
    #[inline]
    pub fn is_open(&self, pos: Pos) -> bool {
        is_open(&self.walls, pos)
    }

    /// Distance from `pos` to the source, [`UNREACHABLE`] for walls and
    /// disconnected cells
    #[inline]
    pub fn distance(&self, pos: Pos) -> u16 {
        if self.is_open(pos) {
            self.distance[[pos.x, pos.y]]
        } else {
            UNREACHABLE
        }
    }

    #[inline]
    pub fn direction_mask(&self, pos: Pos) -> u8 {
        if self.is_open(pos) {
            self.direction[[pos.x, pos.y]]
        } else {
            0
        }
    }

    pub fn distances(&self) -> &Array2<u16> {
        &self.distance
    }

    pub fn directions(&self) -> &Array2<u8> {
        &self.direction
    }

    /// Neighbours exactly one step closer to the source
    pub fn next(&self, pos: Pos) -> Vec<Pos> {
        let mask = self.direction_mask(pos);
        Direction::ALL
            .iter()
            .filter(|d| mask & d.bit() != 0)
            .filter_map(|&d| pos.step(d))
            .collect()
    }

    /// Neighbours exactly one step farther from the source
    pub fn prev(&self, pos: Pos) -> Vec<Pos> {
        let here = self.distance(pos);
        if here >= UNREACHABLE {
            return Vec::new();
        }
        open_neighbours(&self.walls, pos)
            .filter(|&(_, n)| self.distance[[n.x, n.y]] == here + 1)
            .map(|(_, n)| n)
            .collect()
    }

    /// 0 at the source, otherwise one more than the closest open neighbour
    fn calculate_distance(&self, pos: Pos) -> u16 {
        if pos == self.source {
            return 0;
        }
        let closest = open_neighbours(&self.walls, pos)
            .map(|(_, n)| self.distance[[n.x, n.y]])
            .min()
            .unwrap_or(UNREACHABLE);
        if closest >= UNREACHABLE - 1 {
            UNREACHABLE
        } else {
            closest + 1
        }
    }

    /// Settle `pos` at `distance`, recompute its direction bits, and queue
    /// neighbours whose distance must shrink to `distance + 1`
    fn update_tile(&mut self, pos: Pos, distance: u16, next: &mut Vec<Pos>) {
        let mut mask = 0u8;
        self.distance[[pos.x, pos.y]] = distance;

        for (dir, n) in open_neighbours(&self.walls, pos) {
            let nd = self.distance[[n.x, n.y]];
            if distance > 0 && nd == distance - 1 {
                mask |= dir.bit();
            } else if nd > distance + 1 {
                // Tentative; overwritten when the next layer is settled
                self.distance[[n.x, n.y]] = distance + 1;
                next.push(n);
            } else if nd == distance + 1 {
                self.direction[[n.x, n.y]] |= dir.opposite().bit();
            }
        }

        self.direction[[pos.x, pos.y]] = mask;
    }

    /// Propagate from `pos` layer by layer, lowering distances wherever a
    /// shorter route through `pos` now exists
    pub fn update_from(&mut self, pos: Pos) {
        if !self.is_open(pos) {
            return;
        }
        let mut distance = self.calculate_distance(pos);
        if distance >= UNREACHABLE {
            return;
        }

        let mut current = vec![pos];
        while !current.is_empty() {
            let mut next = Vec::new();
            for &p in &current {
                self.update_tile(p, distance, &mut next);
            }
            current = next;
            distance += 1;
            if distance >= UNREACHABLE {
                break;
            }
        }
    }

    /// Turn `pos` into a wall and repair the field
    pub fn add_wall(&mut self, pos: Pos) {
        if !self.is_open(pos) {
            return;
        }
        self.walls[[pos.x, pos.y]] = true;

        if pos == self.source {
            self.distance.fill(UNREACHABLE);
            self.direction.fill(0);
            return;
        }

        let old = self.distance[[pos.x, pos.y]];
        self.distance[[pos.x, pos.y]] = UNREACHABLE;
        self.direction[[pos.x, pos.y]] = 0;
        if old >= UNREACHABLE {
            return;
        }

        // Cells left without any direction bit lost every shortest path
        let mut affected = Vec::new();
        let mut queue = VecDeque::from([pos]);
        while let Some(lost) = queue.pop_front() {
            for (dir, n) in open_neighbours(&self.walls, lost) {
                let back = dir.opposite().bit();
                let mask = &mut self.direction[[n.x, n.y]];
                if *mask & back == 0 {
                    continue;
                }
                *mask &= !back;
                if *mask == 0 && n != self.source && self.distance[[n.x, n.y]] < UNREACHABLE {
                    self.distance[[n.x, n.y]] = UNREACHABLE;
                    affected.push(n);
                    queue.push_back(n);
                }
            }
        }

        // Re-seed from intact neighbours and settle in distance order
        let mut buckets: BTreeMap<u16, Vec<Pos>> = BTreeMap::new();
        for &cell in &affected {
            let d = self.calculate_distance(cell);
            if d < UNREACHABLE {
                buckets.entry(d).or_default().push(cell);
            }
        }
        while let Some((d, cells)) = buckets.pop_first() {
            for cell in cells {
                if self.distance[[cell.x, cell.y]] <= d {
                    continue;
                }
                self.distance[[cell.x, cell.y]] = d;
                if d + 1 >= UNREACHABLE {
                    continue;
                }
                for (_, n) in open_neighbours(&self.walls, cell) {
                    if self.distance[[n.x, n.y]] > d + 1 {
                        buckets.entry(d + 1).or_default().push(n);
                    }
                }
            }
        }

        for &cell in &affected {
            self.refresh_mask(cell);
            let neighbours: Vec<Pos> = open_neighbours(&self.walls, cell).map(|(_, n)| n).collect();
            for n in neighbours {
                self.refresh_mask(n);
            }
        }
    }

    /// Open the wall at `pos` and repair the field
    pub fn remove_wall(&mut self, pos: Pos) {
        if pos.x >= self.width() || pos.y >= self.height() || !self.walls[[pos.x, pos.y]] {
            return;
        }
        self.walls[[pos.x, pos.y]] = false;
        self.distance[[pos.x, pos.y]] = UNREACHABLE;
        self.direction[[pos.x, pos.y]] = 0;
        self.update_from(pos);
    }

    /// Discard the field and rebuild it from the source
    pub fn recompute(&mut self) {
        self.distance.fill(UNREACHABLE);
        self.direction.fill(0);
        self.update_from(self.source);
    }

    fn refresh_mask(&mut self, pos: Pos) {
        let d = self.distance[[pos.x, pos.y]];
        let mut mask = 0u8;
        if d > 0 && d < UNREACHABLE {
            for (dir, n) in open_neighbours(&self.walls, pos) {
                if self.distance[[n.x, n.y]] == d - 1 {
                    mask |= dir.bit();
                }
            }
        }
        self.direction[[pos.x, pos.y]] = mask;
    }
}

#[inline]
pub(crate) fn is_open(walls: &Array2<bool>, pos: Pos) -> bool {
    let (w, h) = walls.dim();
    pos.x < w && pos.y < h && !walls[[pos.x, pos.y]]
}

/// Open 4-neighbours of a cell with the direction leading to each
pub(crate) fn open_neighbours(
    walls: &Array2<bool>,
    pos: Pos,
) -> impl Iterator<Item = (Direction, Pos)> + '_ {
    Direction::ALL.into_iter().filter_map(move |dir| {
        pos.step(dir)
            .filter(|&n| is_open(walls, n))
            .map(|n| (dir, n))
    })
}

/// Distances from `from` to every open cell at most `limit` steps away
pub fn bounded_field(walls: &Array2<bool>, from: Pos, limit: u16) -> HashMap<Pos, u16> {
    let mut reached = HashMap::new();
    if !is_open(walls, from) {
        return reached;
    }
    reached.insert(from, 0);
    let mut frontier = vec![from];
    for d in 1..=limit {
        let mut next = Vec::new();
        for p in frontier {
            for (_, n) in open_neighbours(walls, p) {
                if let Entry::Vacant(slot) = reached.entry(n) {
                    slot.insert(d);
                    next.push(n);
                }
            }
        }
        if next.is_empty() {
            break;
        }
        frontier = next;
    }
    reached
}

/// Path distance from `from` to `to` found by a breadth-first search that
/// gives up beyond `limit` steps
pub fn bounded_distance(walls: &Array2<bool>, from: Pos, to: Pos, limit: u16) -> u16 {
    if !is_open(walls, from) || !is_open(walls, to) {
        return UNREACHABLE;
    }
    if from == to {
        return 0;
    }
    if from.manhattan(to) > limit as usize {
        return UNREACHABLE;
    }

    let mut seen = std::collections::HashSet::from([from]);
    let mut frontier = vec![from];
    for d in 1..=limit {
        let mut next = Vec::new();
        for p in frontier {
            for (_, n) in open_neighbours(walls, p) {
                if n == to {
                    return d;
                }
                if seen.insert(n) {
                    next.push(n);
                }
            }
        }
        if next.is_empty() {
            break;
        }
        frontier = next;
    }
    UNREACHABLE
}
