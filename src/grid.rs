//! Grid primitives: positions, cardinal directions, agent occupancy and food.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// A cell on the map, 0-indexed
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Pos {
    pub x: usize,
    pub y: usize,
}

impl Pos {
    #[inline]
    pub const fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }

    /// Step one cell in a direction, `None` when that leaves the positive quadrant
    #[inline]
    pub fn step(self, dir: Direction) -> Option<Pos> {
        let (dx, dy) = dir.delta();
        let x = self.x as isize + dx;
        let y = self.y as isize + dy;
        if x < 0 || y < 0 {
            None
        } else {
            Some(Pos::new(x as usize, y as usize))
        }
    }

    /// Manhattan distance, ignoring walls
    pub fn manhattan(self, other: Pos) -> usize {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }

    /// Straight-line distance, ignoring walls
    pub fn euclidean(self, other: Pos) -> f64 {
        let dx = self.x as f64 - other.x as f64;
        let dy = self.y as f64 - other.y as f64;
        (dx * dx + dy * dy).sqrt()
    }
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// The four cardinal directions. The discriminant is the bit index used in
/// pathfinder direction masks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    East = 0,
    South = 1,
    West = 2,
    North = 3,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::East,
        Direction::South,
        Direction::West,
        Direction::North,
    ];

    #[inline]
    pub fn delta(self) -> (isize, isize) {
        match self {
            Direction::East => (1, 0),
            Direction::South => (0, 1),
            Direction::West => (-1, 0),
            Direction::North => (0, -1),
        }
    }

    #[inline]
    pub fn opposite(self) -> Direction {
        match self {
            Direction::East => Direction::West,
            Direction::South => Direction::North,
            Direction::West => Direction::East,
            Direction::North => Direction::South,
        }
    }

    #[inline]
    pub fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

/// Per-cell agent lists for fast lookups by position
#[derive(Clone, Debug)]
pub struct SpatialIndex {
    width: usize,
    height: usize,
    /// cells[y][x] contains ids of agents at that position
    cells: Vec<Vec<Vec<usize>>>,
}

impl SpatialIndex {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            cells: vec![vec![Vec::new(); width]; height],
        }
    }

    pub fn clear(&mut self) {
        for row in &mut self.cells {
            for cell in row {
                cell.clear();
            }
        }
    }

    /// Insert an agent id at the given position
    #[inline]
    pub fn insert(&mut self, pos: Pos, id: usize) {
        if pos.x < self.width && pos.y < self.height {
            self.cells[pos.y][pos.x].push(id);
        }
    }

    /// Remove an agent id from the given position. Returns true if it was there.
    pub fn remove(&mut self, pos: Pos, id: usize) -> bool {
        if pos.x >= self.width || pos.y >= self.height {
            return false;
        }
        let cell = &mut self.cells[pos.y][pos.x];
        match cell.iter().position(|&other| other == id) {
            Some(i) => {
                cell.swap_remove(i);
                true
            }
            None => false,
        }
    }

    /// All agent ids at a specific cell
    #[inline]
    pub fn get(&self, pos: Pos) -> &[usize] {
        if pos.x < self.width && pos.y < self.height {
            &self.cells[pos.y][pos.x]
        } else {
            &[]
        }
    }

    #[inline]
    pub fn is_occupied(&self, pos: Pos) -> bool {
        !self.get(pos).is_empty()
    }

    #[inline]
    pub fn count_at(&self, pos: Pos) -> usize {
        self.get(pos).len()
    }
}

/// Depletable food: an integer amount and a per-unit density for every cell
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FoodGrid {
    width: usize,
    height: usize,
    amount: Vec<Vec<u32>>,
    density: Vec<Vec<f64>>,
    /// Cells currently holding at least one unit
    occupied: BTreeSet<Pos>,
}

impl FoodGrid {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            amount: vec![vec![0; width]; height],
            density: vec![vec![0.0; width]; height],
            occupied: BTreeSet::new(),
        }
    }

    #[inline]
    fn in_bounds(&self, pos: Pos) -> bool {
        pos.x < self.width && pos.y < self.height
    }

    #[inline]
    pub fn amount(&self, pos: Pos) -> u32 {
        if self.in_bounds(pos) {
            self.amount[pos.y][pos.x]
        } else {
            0
        }
    }

    #[inline]
    pub fn density(&self, pos: Pos) -> f64 {
        if self.in_bounds(pos) {
            self.density[pos.y][pos.x]
        } else {
            0.0
        }
    }

    #[inline]
    pub fn has_food(&self, pos: Pos) -> bool {
        self.amount(pos) > 0
    }

    /// Add food at a position. The density is overwritten.
    /// Returns true if the cell had no food before.
    pub fn add(&mut self, pos: Pos, amount: u32, density: f64) -> bool {
        if !self.in_bounds(pos) || amount == 0 {
            return false;
        }
        let was_empty = self.amount[pos.y][pos.x] == 0;
        self.amount[pos.y][pos.x] += amount;
        self.density[pos.y][pos.x] = density;
        self.occupied.insert(pos);
        was_empty
    }

    /// Take up to `max_amount` units. Returns the amount taken and whether
    /// the cell is now empty.
    pub fn consume(&mut self, pos: Pos, max_amount: u32) -> (u32, bool) {
        if !self.in_bounds(pos) {
            return (0, false);
        }
        let available = self.amount[pos.y][pos.x];
        if available == 0 {
            return (0, false);
        }
        let taken = available.min(max_amount);
        self.amount[pos.y][pos.x] -= taken;
        let emptied = self.amount[pos.y][pos.x] == 0;
        if emptied {
            self.density[pos.y][pos.x] = 0.0;
            self.occupied.remove(&pos);
        }
        (taken, emptied)
    }

    /// Cells holding food, in position order
    pub fn food_cells(&self) -> impl Iterator<Item = Pos> + '_ {
        self.occupied.iter().copied()
    }

    pub fn food_cell_count(&self) -> usize {
        self.occupied.len()
    }

    pub fn total_amount(&self) -> u64 {
        self.amount.iter().flatten().map(|&a| a as u64).sum()
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }
}
