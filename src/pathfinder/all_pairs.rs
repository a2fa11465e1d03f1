//! All-pairs shortest paths over a fixed map, persisted between runs.

use super::cache::{self, CacheError, Table, TableHeader, DIRECTION_FILE, DISTANCE_FILE};
use super::{open_neighbours, Pathfinder, UNREACHABLE};
use crate::grid::{Direction, Pos};
use crate::map::Map;
use ndarray::Array2;
use rayon::prelude::*;
use std::fs;
use std::path::Path;

/// Distance and direction tables for every (source, cell) pair of open cells.
///
/// Open cells are enumerated column-major (`x` outer, `y` inner) into a dense
/// index; wall cells have no index. Row `i` of each table is the single-source
/// field rooted at cell `i`. Tables loaded from the cache are memory-mapped
/// and clones share them.
#[derive(Clone, Debug)]
pub struct AllPairsPathfinder {
    map_name: String,
    layout: String,
    walls: Array2<bool>,
    /// Dense index per cell, `usize::MAX` for walls
    index: Array2<usize>,
    cells: Vec<Pos>,
    distances: Table<u16>,
    directions: Table<u8>,
}

impl AllPairsPathfinder {
    /// Build every single-source field, one per open cell, in parallel
    pub fn build(map: &Map) -> Self {
        let mut pathfinder = Self::empty(map);
        let n = pathfinder.cells.len();
        log::info!("Building all-pairs pathfinder for {} ({} cells)", map.name, n);

        let rows: Vec<(Vec<u16>, Vec<u8>)> = pathfinder
            .cells
            .par_iter()
            .map(|&source| {
                let field = Pathfinder::new(map.walls.clone(), source);
                let distances = pathfinder.cells.iter().map(|&p| field.distance(p)).collect();
                let directions = pathfinder.cells.iter().map(|&p| field.direction_mask(p)).collect();
                (distances, directions)
            })
            .collect();

        let mut distances = Vec::with_capacity(n * n);
        let mut directions = Vec::with_capacity(n * n);
        for (d, m) in rows {
            distances.extend(d);
            directions.extend(m);
        }
        pathfinder.distances = Table::from_entries(&distances);
        pathfinder.directions = Table::from_entries(&directions);
        pathfinder
    }

    fn empty(map: &Map) -> Self {
        let mut index = Array2::from_elem(map.walls.dim(), usize::MAX);
        let mut cells = Vec::new();
        for x in 0..map.width {
            for y in 0..map.height {
                if !map.walls[[x, y]] {
                    index[[x, y]] = cells.len();
                    cells.push(Pos::new(x, y));
                }
            }
        }
        Self {
            map_name: map.name.clone(),
            layout: map.layout_hash(),
            walls: map.walls.clone(),
            index,
            cells,
            distances: Table::from_entries(&[]),
            directions: Table::from_entries(&[]),
        }
    }

    /// Load the tables for `map` from `cache_root`, building and saving them
    /// when the cache is missing, stale or corrupt. A failed save is logged
    /// and ignored.
    pub fn load_or_build<P: AsRef<Path>>(map: &Map, cache_root: P) -> Self {
        let dir = cache::cache_dir(cache_root.as_ref(), map);
        match Self::load(map, &dir) {
            Ok(pathfinder) => {
                log::info!("Loaded pathfinder cache from {}", dir.display());
                return pathfinder;
            }
            Err(CacheError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("No pathfinder cache at {}", dir.display());
            }
            Err(e) => log::warn!("Discarding pathfinder cache at {}: {}", dir.display(), e),
        }

        let pathfinder = Self::build(map);
        match pathfinder.save(&dir) {
            Ok(()) => log::info!("Saved pathfinder cache to {}", dir.display()),
            Err(e) => log::warn!("Failed to save pathfinder cache: {}", e),
        }
        pathfinder
    }

    /// Map both tables from a cache directory, rejecting tables built for a
    /// different layout
    pub fn load<P: AsRef<Path>>(map: &Map, dir: P) -> Result<Self, CacheError> {
        let dir = dir.as_ref();
        let mut pathfinder = Self::empty(map);

        let (distance_header, distances) = Table::<u16>::open(dir.join(DISTANCE_FILE))?;
        let (direction_header, directions) = Table::<u8>::open(dir.join(DIRECTION_FILE))?;
        for header in [&distance_header, &direction_header] {
            pathfinder.check_header(header)?;
        }

        pathfinder.distances = distances;
        pathfinder.directions = directions;
        Ok(pathfinder)
    }

    fn check_header(&self, header: &TableHeader) -> Result<(), CacheError> {
        let n = self.cells.len();
        if header.cell_count != n {
            return Err(CacheError::MapMismatch {
                expected: n,
                found: header.cell_count,
            });
        }
        if header.layout != self.layout {
            return Err(CacheError::StaleLayout {
                expected: self.layout.clone(),
                found: header.layout.clone(),
            });
        }
        Ok(())
    }

    /// Write both tables into a cache directory, creating it if needed
    pub fn save<P: AsRef<Path>>(&self, dir: P) -> Result<(), CacheError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let n = self.cells.len();
        self.distances.save(
            &TableHeader::new::<u16>(&self.map_name, &self.layout, n),
            dir.join(DISTANCE_FILE),
        )?;
        self.directions.save(
            &TableHeader::new::<u8>(&self.map_name, &self.layout, n),
            dir.join(DIRECTION_FILE),
        )?;
        Ok(())
    }

    pub fn map_name(&self) -> &str {
        &self.map_name
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Whether the tables are read from mapped cache files
    pub fn is_mapped(&self) -> bool {
        self.distances.is_mapped() && self.directions.is_mapped()
    }

    pub fn walls(&self) -> &Array2<bool> {
        &self.walls
    }

    #[inline]
    fn index_of(&self, pos: Pos) -> Option<usize> {
        let (w, h) = self.index.dim();
        if pos.x >= w || pos.y >= h {
            return None;
        }
        match self.index[[pos.x, pos.y]] {
            usize::MAX => None,
            i => Some(i),
        }
    }

    #[inline]
    fn slot(&self, source: Pos, at: Pos) -> Option<usize> {
        Some(self.index_of(source)? * self.cells.len() + self.index_of(at)?)
    }

    /// Distance from `at` to `source`
    pub fn distance(&self, source: Pos, at: Pos) -> u16 {
        self.slot(source, at)
            .and_then(|i| self.distances.get(i))
            .unwrap_or(UNREACHABLE)
    }

    /// Neighbours of `at` one step closer to `source`
    pub fn next(&self, source: Pos, at: Pos) -> Vec<Pos> {
        let mask = self
            .slot(source, at)
            .and_then(|i| self.directions.get(i))
            .unwrap_or(0);
        Direction::ALL
            .iter()
            .filter(|d| mask & d.bit() != 0)
            .filter_map(|&d| at.step(d))
            .collect()
    }

    /// Neighbours of `at` one step farther from `source`
    pub fn prev(&self, source: Pos, at: Pos) -> Vec<Pos> {
        let here = self.distance(source, at);
        if here >= UNREACHABLE {
            return Vec::new();
        }
        open_neighbours(&self.walls, at)
            .filter(|&(_, n)| self.distance(source, n) == here + 1)
            .map(|(_, n)| n)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corridor_map() -> Map {
        Map::from_ascii(
            "
            #######
            #C....#
            #.###.#
            #...1.#
            #######
            ",
            1,
            3,
        )
        .unwrap()
    }

    #[test]
    fn test_matches_single_source_fields() {
        let map = corridor_map();
        let all = AllPairsPathfinder::build(&map);
        assert_eq!(all.cell_count(), map.open_cell_count());

        for x in 0..map.width {
            for y in 0..map.height {
                let source = Pos::new(x, y);
                if map.is_wall(source) {
                    continue;
                }
                let single = Pathfinder::new(map.walls.clone(), source);
                for &p in &all.cells {
                    assert_eq!(all.distance(source, p), single.distance(p));
                    assert_eq!(all.next(source, p), single.next(p));
                    let mut a = all.prev(source, p);
                    let mut b = single.prev(p);
                    a.sort();
                    b.sort();
                    assert_eq!(a, b);
                }
            }
        }
    }

    #[test]
    fn test_walls_are_unreachable() {
        let map = corridor_map();
        let all = AllPairsPathfinder::build(&map);
        assert_eq!(all.distance(map.colony, Pos::new(0, 0)), UNREACHABLE);
        assert_eq!(all.distance(Pos::new(3, 2), map.colony), UNREACHABLE);
        assert!(all.next(map.colony, Pos::new(50, 50)).is_empty());
    }

    #[test]
    fn test_cache_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let map = corridor_map();

        let built = AllPairsPathfinder::load_or_build(&map, dir.path());
        assert!(!built.is_mapped());
        let cache = cache::cache_dir(dir.path(), &map);
        assert!(cache.join(DISTANCE_FILE).exists());
        assert!(cache.join(DIRECTION_FILE).exists());

        let loaded = AllPairsPathfinder::load(&map, &cache).unwrap();
        assert!(loaded.is_mapped());
        assert_eq!(loaded.distances.to_vec(), built.distances.to_vec());
        assert_eq!(loaded.directions.to_vec(), built.directions.to_vec());
        assert_eq!(loaded.distance(map.colony, Pos::new(4, 3)), built.distance(map.colony, Pos::new(4, 3)));
    }

    #[test]
    fn test_cache_rejects_other_map() {
        let dir = tempfile::tempdir().unwrap();
        let map = corridor_map();
        AllPairsPathfinder::build(&map).save(dir.path()).unwrap();

        let mut other = map.clone();
        other.walls[[5, 2]] = true;
        match AllPairsPathfinder::load(&other, dir.path()) {
            Err(CacheError::MapMismatch { expected, found }) => {
                assert_eq!(found, expected + 1);
            }
            _ => panic!("expected a map mismatch"),
        }
    }

    #[test]
    fn test_cache_rejects_same_size_other_layout() {
        // Same canonical name and open-cell count, different walls
        let a = Map::from_ascii("#####\n#C.##\n#...#\n#####", 1, 1).unwrap();
        let b = Map::from_ascii("#####\n#C..#\n#.#.#\n#####", 1, 1).unwrap();
        assert_eq!(a.name, b.name);
        assert_eq!(a.open_cell_count(), b.open_cell_count());
        assert_ne!(cache::cache_dir(Path::new("root"), &a), cache::cache_dir(Path::new("root"), &b));

        let dir = tempfile::tempdir().unwrap();
        AllPairsPathfinder::build(&a).save(dir.path()).unwrap();
        match AllPairsPathfinder::load(&b, dir.path()) {
            Err(CacheError::StaleLayout { expected, found }) => {
                assert_eq!(expected, b.layout_hash());
                assert_eq!(found, a.layout_hash());
            }
            other => panic!("expected a stale layout, got {:?}", other.map(|p| p.cell_count())),
        }

        // Both maps cached side by side under one root answer for their own walls
        let root = tempfile::tempdir().unwrap();
        AllPairsPathfinder::load_or_build(&a, root.path());
        let fresh = AllPairsPathfinder::build(&b);
        let cached = AllPairsPathfinder::load_or_build(&b, root.path());
        let reloaded = AllPairsPathfinder::load_or_build(&b, root.path());
        assert!(reloaded.is_mapped());
        for pf in [&cached, &reloaded] {
            assert_eq!(pf.distances.to_vec(), fresh.distances.to_vec());
        }
        assert_eq!(reloaded.distance(b.colony, Pos::new(3, 2)), 3);
    }
}
