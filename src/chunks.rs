//! Chunk-bucketed spatial hash for "what is near this point" queries.
//!
//! Points are bucketed into `dx` x `dy` chunks. Besides the exact bucket, every
//! point is replicated into the 3x3 block of chunks around its own, so a single
//! lookup returns everything within one chunk radius. Callers filter the
//! returned candidates with an exact distance.

use crate::grid::Pos;
use std::collections::{BTreeSet, HashMap};

/// Integer chunk coordinate
pub type ChunkKey = (i64, i64);

#[derive(Clone, Debug)]
pub struct ChunkManager {
    dx: usize,
    dy: usize,
    chunks: HashMap<ChunkKey, BTreeSet<Pos>>,
    neighbour_chunks: HashMap<ChunkKey, BTreeSet<Pos>>,
}

impl ChunkManager {
    /// Chunk sizes below one are clamped to one
    pub fn new(dx: usize, dy: usize) -> Self {
        Self {
            dx: dx.max(1),
            dy: dy.max(1),
            chunks: HashMap::new(),
            neighbour_chunks: HashMap::new(),
        }
    }

    #[inline]
    pub fn hash(&self, pos: Pos) -> ChunkKey {
        ((pos.x / self.dx) as i64, (pos.y / self.dy) as i64)
    }

    fn block(key: ChunkKey) -> impl Iterator<Item = ChunkKey> {
        (-1..=1).flat_map(move |i| (-1..=1).map(move |j| (key.0 + i, key.1 + j)))
    }

    /// Register a point. Returns false if it was already present.
    pub fn add(&mut self, pos: Pos) -> bool {
        let key = self.hash(pos);
        if !self.chunks.entry(key).or_default().insert(pos) {
            return false;
        }
        for neighbour in Self::block(key) {
            self.neighbour_chunks.entry(neighbour).or_default().insert(pos);
        }
        true
    }

    /// Unregister a point. Returns false if it was not present.
    pub fn remove(&mut self, pos: Pos) -> bool {
        let key = self.hash(pos);
        let removed = match self.chunks.get_mut(&key) {
            Some(set) => {
                let removed = set.remove(&pos);
                if set.is_empty() {
                    self.chunks.remove(&key);
                }
                removed
            }
            None => false,
        };
        if !removed {
            return false;
        }
        for neighbour in Self::block(key) {
            if let Some(set) = self.neighbour_chunks.get_mut(&neighbour) {
                set.remove(&pos);
                if set.is_empty() {
                    self.neighbour_chunks.remove(&neighbour);
                }
            }
        }
        true
    }

    pub fn contains(&self, pos: Pos) -> bool {
        self.chunks
            .get(&self.hash(pos))
            .map_or(false, |set| set.contains(&pos))
    }

    /// Points registered in exactly this chunk
    pub fn get(&self, key: ChunkKey) -> Vec<Pos> {
        self.chunks
            .get(&key)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// All points in the chunk containing `pos` and its 8 surrounding chunks,
    /// in position order
    pub fn get_neighbours(&self, pos: Pos) -> Vec<Pos> {
        self.neighbour_chunks
            .get(&self.hash(pos))
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.chunks.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chebyshev(a: ChunkKey, b: ChunkKey) -> i64 {
        (a.0 - b.0).abs().max((a.1 - b.1).abs())
    }

    #[test]
    fn test_neighbour_completeness() {
        let mut manager = ChunkManager::new(5, 5);
        let points: Vec<Pos> = (0..40)
            .step_by(3)
            .flat_map(|x| (0..40).step_by(4).map(move |y| Pos::new(x, y)))
            .collect();
        for &p in &points {
            assert!(manager.add(p));
        }

        for qx in 0..40 {
            for qy in 0..40 {
                let q = Pos::new(qx, qy);
                let found = manager.get_neighbours(q);
                for &p in &points {
                    let near = chebyshev(manager.hash(p), manager.hash(q)) <= 1;
                    assert_eq!(found.contains(&p), near, "p={} q={}", p, q);
                }
            }
        }
    }

    #[test]
    fn test_add_remove() {
        let mut manager = ChunkManager::new(4, 4);
        let p = Pos::new(9, 2);
        assert!(manager.add(p));
        assert!(!manager.add(p));
        assert!(manager.contains(p));
        assert_eq!(manager.get((2, 0)), vec![p]);
        assert_eq!(manager.get_neighbours(Pos::new(13, 7)), vec![p]);
        assert!(manager.get_neighbours(Pos::new(16, 2)).is_empty());

        assert!(manager.remove(p));
        assert!(!manager.remove(p));
        assert!(manager.is_empty());
        assert!(manager.get_neighbours(Pos::new(9, 2)).is_empty());
    }

    #[test]
    fn test_zero_chunk_size_is_clamped() {
        let mut manager = ChunkManager::new(0, 0);
        manager.add(Pos::new(1, 1));
        assert_eq!(manager.get_neighbours(Pos::new(2, 2)), vec![Pos::new(1, 1)]);
        assert!(manager.get_neighbours(Pos::new(3, 3)).is_empty());
        assert_eq!(manager.len(), 1);
    }
}
