//! Distance and step queries as seen by the world.
//!
//! The world asks "how far is `at` from `source`" and "which neighbours of
//! `at` lead towards `source`" without caring which variant answers. The
//! incremental variant builds single-source fields lazily, one per source
//! it is asked about, and keeps them up to date when walls change.

use super::{bounded_distance, bounded_field, is_open, AllPairsPathfinder, Pathfinder, UNREACHABLE};
use crate::grid::Pos;
use ndarray::Array2;
use std::collections::HashMap;
use std::sync::Arc;

/// Fields kept alive by default. Sources beyond this are rebuilt on demand.
pub const POOL_CAPACITY: usize = 64;

/// Lazily built single-source fields sharing one wall grid. The least
/// recently used field is dropped once `capacity` fields exist.
#[derive(Clone, Debug)]
pub struct PathfinderPool {
    walls: Array2<bool>,
    fields: HashMap<Pos, (Pathfinder, u64)>,
    capacity: usize,
    clock: u64,
}

impl PathfinderPool {
    pub fn new(walls: Array2<bool>) -> Self {
        Self::with_capacity(walls, POOL_CAPACITY)
    }

    pub fn with_capacity(walls: Array2<bool>, capacity: usize) -> Self {
        Self {
            walls,
            fields: HashMap::new(),
            capacity: capacity.max(1),
            clock: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Field rooted at `source`, built on first use. `None` for wall cells.
    pub fn field(&mut self, source: Pos) -> Option<&Pathfinder> {
        if !is_open(&self.walls, source) {
            return None;
        }
        self.clock += 1;
        if !self.fields.contains_key(&source) && self.fields.len() >= self.capacity {
            self.evict_oldest();
        }
        let walls = &self.walls;
        let entry = self
            .fields
            .entry(source)
            .or_insert_with(|| (Pathfinder::new(walls.clone(), source), 0));
        entry.1 = self.clock;
        Some(&entry.0)
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .fields
            .iter()
            .min_by_key(|(pos, (_, used))| (*used, **pos))
            .map(|(pos, _)| *pos);
        if let Some(pos) = oldest {
            self.fields.remove(&pos);
        }
    }

    /// Field rooted at `source` if one has been built
    pub fn cached(&self, source: Pos) -> Option<&Pathfinder> {
        self.fields.get(&source).map(|(field, _)| field)
    }

    /// Drop the field rooted at `source`
    pub fn evict(&mut self, source: Pos) {
        self.fields.remove(&source);
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn add_wall(&mut self, pos: Pos) {
        if !is_open(&self.walls, pos) {
            return;
        }
        self.walls[[pos.x, pos.y]] = true;
        for (field, _) in self.fields.values_mut() {
            field.add_wall(pos);
        }
    }

    pub fn remove_wall(&mut self, pos: Pos) {
        let (w, h) = self.walls.dim();
        if pos.x >= w || pos.y >= h || !self.walls[[pos.x, pos.y]] {
            return;
        }
        self.walls[[pos.x, pos.y]] = false;
        for (field, _) in self.fields.values_mut() {
            field.remove_wall(pos);
        }
    }
}

/// Source of path queries for a running world
#[derive(Clone, Debug)]
pub enum Navigator {
    Incremental(PathfinderPool),
    Precomputed(Arc<AllPairsPathfinder>),
}

impl Navigator {
    pub fn incremental(walls: Array2<bool>) -> Self {
        Navigator::Incremental(PathfinderPool::new(walls))
    }

    pub fn precomputed(table: Arc<AllPairsPathfinder>) -> Self {
        Navigator::Precomputed(table)
    }

    pub fn is_precomputed(&self) -> bool {
        matches!(self, Navigator::Precomputed(_))
    }

    pub fn walls(&self) -> &Array2<bool> {
        match self {
            Navigator::Incremental(pool) => &pool.walls,
            Navigator::Precomputed(table) => table.walls(),
        }
    }

    #[inline]
    pub fn is_open(&self, pos: Pos) -> bool {
        is_open(self.walls(), pos)
    }

    /// Path distance from `at` to `source`, [`UNREACHABLE`] when disconnected
    pub fn distance(&mut self, source: Pos, at: Pos) -> u16 {
        match self {
            Navigator::Incremental(pool) => pool.field(source).map_or(UNREACHABLE, |f| f.distance(at)),
            Navigator::Precomputed(table) => table.distance(source, at),
        }
    }

    /// Neighbours of `at` one step closer to `source`
    pub fn next(&mut self, source: Pos, at: Pos) -> Vec<Pos> {
        match self {
            Navigator::Incremental(pool) => pool.field(source).map_or_else(Vec::new, |f| f.next(at)),
            Navigator::Precomputed(table) => table.next(source, at),
        }
    }

    /// Neighbours of `at` one step farther from `source`
    pub fn prev(&mut self, source: Pos, at: Pos) -> Vec<Pos> {
        match self {
            Navigator::Incremental(pool) => pool.field(source).map_or_else(Vec::new, |f| f.prev(at)),
            Navigator::Precomputed(table) => table.prev(source, at),
        }
    }

    /// Path distance between two cells if it is at most `limit`, otherwise
    /// [`UNREACHABLE`]. Uses an existing field when there is one and a bounded
    /// search otherwise, so no new field is built.
    pub fn distance_within(&self, a: Pos, b: Pos, limit: u16) -> u16 {
        let d = match self {
            Navigator::Precomputed(table) => table.distance(a, b),
            Navigator::Incremental(pool) => match (pool.cached(a), pool.cached(b)) {
                (Some(field), _) => field.distance(b),
                (None, Some(field)) => field.distance(a),
                (None, None) => bounded_distance(&pool.walls, a, b, limit),
            },
        };
        if d <= limit {
            d
        } else {
            UNREACHABLE
        }
    }

    /// [`Navigator::distance_within`] for many targets sharing one origin
    pub fn distances_within(&self, from: Pos, targets: &[Pos], limit: u16) -> Vec<u16> {
        let bound = |d: u16| if d <= limit { d } else { UNREACHABLE };
        match self {
            Navigator::Precomputed(table) => targets
                .iter()
                .map(|&t| bound(table.distance(from, t)))
                .collect(),
            Navigator::Incremental(pool) => match pool.cached(from) {
                Some(field) => targets.iter().map(|&t| bound(field.distance(t))).collect(),
                None => {
                    let reached = bounded_field(&pool.walls, from, limit);
                    targets
                        .iter()
                        .map(|t| reached.get(t).copied().unwrap_or(UNREACHABLE))
                        .collect()
                }
            },
        }
    }

    /// Forget the field rooted at `source`; no-op for precomputed tables
    pub fn release(&mut self, source: Pos) {
        if let Navigator::Incremental(pool) = self {
            pool.evict(source);
        }
    }

    /// Single-source fields currently held. Always 0 for precomputed tables.
    pub fn cached_fields(&self) -> usize {
        match self {
            Navigator::Incremental(pool) => pool.len(),
            Navigator::Precomputed(_) => 0,
        }
    }

    /// Precomputed tables cannot follow wall changes
    fn downgrade(&mut self) {
        if let Navigator::Precomputed(table) = self {
            log::info!("Wall change on {}: switching to incremental pathfinding", table.map_name());
            let walls = table.walls().clone();
            *self = Navigator::incremental(walls);
        }
    }

    pub fn add_wall(&mut self, pos: Pos) {
        if !self.is_open(pos) {
            return;
        }
        self.downgrade();
        if let Navigator::Incremental(pool) = self {
            pool.add_wall(pos);
        }
    }

    pub fn remove_wall(&mut self, pos: Pos) {
        let (w, h) = self.walls().dim();
        if pos.x >= w || pos.y >= h || self.is_open(pos) {
            return;
        }
        self.downgrade();
        if let Navigator::Incremental(pool) = self {
            pool.remove_wall(pos);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::Map;
    use crate::pathfinder::tests::walls_from;

    #[test]
    fn test_pool_builds_lazily() {
        let mut pool = PathfinderPool::new(walls_from(&["....", ".##.", "...."]));
        assert!(pool.is_empty());
        assert!(pool.field(Pos::new(1, 1)).is_none());
        assert_eq!(pool.field(Pos::new(0, 0)).map(|f| f.distance(Pos::new(3, 2))), Some(5));
        assert_eq!(pool.len(), 1);
        pool.evict(Pos::new(0, 0));
        assert!(pool.is_empty());
    }

    #[test]
    fn test_pool_drops_least_recently_used() {
        let walls = walls_from(&["........", "........", "........"]);
        let mut pool = PathfinderPool::with_capacity(walls, 4);
        let colony = Pos::new(0, 0);

        for x in 0..8 {
            for y in 0..3 {
                pool.field(colony);
                let d = pool.field(Pos::new(x, y)).map(|f| f.distance(Pos::new(7, 2)));
                assert_eq!(d, Some((7 - x + 2 - y) as u16));
                assert!(pool.len() <= 4);
            }
        }

        // The field used on every round survives, the oldest do not
        assert!(pool.cached(colony).is_some());
        assert!(pool.cached(Pos::new(7, 2)).is_some());
        assert!(pool.cached(Pos::new(0, 1)).is_none());
        assert_eq!(pool.len(), 4);
    }

    #[test]
    fn test_variants_agree() {
        let map = Map::from_ascii(
            "
            ########
            #C.....#
            #.##.#.#
            #....#2#
            ########
            ",
            1,
            1,
        )
        .unwrap();
        let mut incremental = Navigator::incremental(map.walls.clone());
        let mut precomputed = Navigator::precomputed(Arc::new(AllPairsPathfinder::build(&map)));
        let food = Pos::new(6, 3);

        for x in 0..map.width {
            for y in 0..map.height {
                let p = Pos::new(x, y);
                assert_eq!(incremental.distance(map.colony, p), precomputed.distance(map.colony, p));
                assert_eq!(incremental.next(food, p), precomputed.next(food, p));
                assert_eq!(
                    incremental.distance_within(p, food, 4),
                    precomputed.distance_within(p, food, 4)
                );
            }
        }
    }

    #[test]
    fn test_distance_within_without_fields() {
        let nav = Navigator::incremental(walls_from(&[".....", ".###.", "....."]));
        assert_eq!(nav.distance_within(Pos::new(0, 1), Pos::new(4, 1), 6), 6);
        assert_eq!(nav.distance_within(Pos::new(0, 1), Pos::new(4, 1), 5), UNREACHABLE);
    }

    #[test]
    fn test_distances_within_matches_single_queries() {
        let walls = walls_from(&["......", ".##.#.", "......"]);
        let mut nav = Navigator::incremental(walls);
        let from = Pos::new(0, 1);
        let targets = [Pos::new(5, 1), Pos::new(3, 1), Pos::new(1, 1), Pos::new(2, 2)];
        let expected: Vec<u16> = targets.iter().map(|&t| nav.distance_within(from, t, 5)).collect();
        assert_eq!(nav.distances_within(from, &targets, 5), expected);
        assert_eq!(expected, vec![UNREACHABLE, 5, UNREACHABLE, 3]);

        // Same answers once a field rooted at the origin exists
        nav.distance(from, from);
        assert_eq!(nav.distances_within(from, &targets, 5), expected);
    }

    #[test]
    fn test_wall_change_downgrades_precomputed() {
        let map = Map::from_ascii("#####\n#C..#\n#...#\n#####", 1, 1).unwrap();
        let mut nav = Navigator::precomputed(Arc::new(AllPairsPathfinder::build(&map)));
        let corner = Pos::new(3, 1);
        assert_eq!(nav.distance(map.colony, corner), 2);

        nav.add_wall(Pos::new(2, 1));
        assert!(!nav.is_precomputed());
        assert_eq!(nav.distance(map.colony, corner), 4);

        nav.remove_wall(Pos::new(2, 1));
        assert_eq!(nav.distance(map.colony, corner), 2);
    }
}
