//! Static terrain: walls, colony position and initial food placement.
//!
//! Maps are generated deterministically from a [`MapConfig`] (room radii,
//! corridor geometry, food quantities and densities, generation seed).

use crate::grid::Pos;
use ndarray::Array2;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Procedural layout of a map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MapShape {
    /// One round room of radius `r` centred in a `(2R+1)^2` grid, food scattered randomly
    Circle {
        r: usize,
        big_r: usize,
        food_amount: u32,
        density_min: u32,
        density_max: u32,
    },
    /// A central room of radius `r1` joined by corridors of half-width `w`
    /// and length `d` to four rooms of radius `r2`, each holding food of its
    /// own density (east, south, west, north)
    FourRooms {
        r1: usize,
        r2: usize,
        d: usize,
        w: usize,
        food_amount: u32,
        densities: [f64; 4],
    },
}

/// Map generation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapConfig {
    pub shape: MapShape,
    /// Number of agents spawned at the colony
    pub creature_count: usize,
    /// Seed for randomized food placement
    pub seed: u64,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            shape: MapShape::FourRooms {
                r1: 6,
                r2: 6,
                d: 6,
                w: 1,
                food_amount: 10,
                densities: [1.0, 2.0, 3.0, 4.0],
            },
            creature_count: 15,
            seed: 0,
        }
    }
}

impl MapConfig {
    /// Canonical string naming this configuration, used as the pathfinder cache key
    pub fn canonical_name(&self) -> String {
        match &self.shape {
            MapShape::Circle {
                r,
                big_r,
                food_amount,
                density_min,
                density_max,
            } => format!(
                "circle_r{}_R{}_f{}_d{}-{}_n{}_s{}",
                r, big_r, food_amount, density_min, density_max, self.creature_count, self.seed
            ),
            MapShape::FourRooms {
                r1,
                r2,
                d,
                w,
                food_amount,
                densities,
            } => format!(
                "fourrooms_r{}_r{}_d{}_w{}_f{}_{}_{}_{}_{}_n{}",
                r1,
                r2,
                d,
                w,
                food_amount,
                densities[0],
                densities[1],
                densities[2],
                densities[3],
                self.creature_count
            ),
        }
    }
}

/// Generated terrain. Arrays are indexed `[[x, y]]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Map {
    pub name: String,
    pub width: usize,
    pub height: usize,
    pub colony: Pos,
    pub creature_count: usize,
    pub walls: Array2<bool>,
    pub food_amount: Array2<u32>,
    pub food_density: Array2<f64>,
}

impl Map {
    /// A map of the given size that is entirely wall
    pub fn filled(width: usize, height: usize, colony: Pos, creature_count: usize) -> Self {
        Self {
            name: format!("custom_{}x{}", width, height),
            width,
            height,
            colony,
            creature_count,
            walls: Array2::from_elem((width, height), true),
            food_amount: Array2::zeros((width, height)),
            food_density: Array2::zeros((width, height)),
        }
    }

    /// Generate a map from its configuration
    pub fn generate(config: &MapConfig) -> Result<Self, String> {
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);

        let mut map = match &config.shape {
            MapShape::Circle {
                r,
                big_r,
                food_amount,
                density_min,
                density_max,
            } => {
                if r > big_r {
                    return Err("circle map room radius exceeds map radius".to_string());
                }
                if density_min >= density_max {
                    return Err("density_min must be below density_max".to_string());
                }
                let size = 2 * big_r + 1;
                let colony = Pos::new(*big_r, *big_r);
                let mut map = Self::filled(size, size, colony, config.creature_count);
                map.remove_wall_circle(colony, *r as f64);

                for _ in 0..*food_amount {
                    let pos = Pos::new(rng.gen_range(0..size), rng.gen_range(0..size));
                    if map.walls[[pos.x, pos.y]] || pos == colony {
                        continue;
                    }
                    let density = rng.gen_range(*density_min..*density_max) as f64;
                    map.food_amount[[pos.x, pos.y]] += *food_amount;
                    map.food_density[[pos.x, pos.y]] = density;
                }
                map
            }
            MapShape::FourRooms {
                r1,
                r2,
                d,
                w,
                food_amount,
                densities,
            } => {
                let size = 2 * (r1 + d + 2 * r2) + 1;
                let c = (size - 1) / 2;
                let colony = Pos::new(c, c);
                let mut map = Self::filled(size, size, colony, config.creature_count);
                map.remove_wall_circle(colony, *r1 as f64);

                let reach = (r1 + r2 + d) as isize;
                let (cx, cy, w) = (c as isize, c as isize, *w as isize);
                let directions = [(1isize, 0isize), (0, 1), (-1, 0), (0, -1)];
                for (i, &(dx, dy)) in directions.iter().enumerate() {
                    let room = Pos::new((cx + dx * reach) as usize, (cy + dy * reach) as usize);
                    map.remove_wall_circle(room, *r2 as f64);

                    let xs = [room.x as isize, cx + dy * w, cx - dy * w];
                    let ys = [room.y as isize, cy + dx * w, cy - dx * w];
                    map.remove_wall_rectangle(
                        xs.iter().copied().min().unwrap_or(cx),
                        xs.iter().copied().max().unwrap_or(cx),
                        ys.iter().copied().min().unwrap_or(cy),
                        ys.iter().copied().max().unwrap_or(cy),
                    );
                    map.place_food_circle(room, *r2 as f64, *food_amount, densities[i]);
                }
                map
            }
        };

        map.name = config.canonical_name();
        map.validate()?;
        log::info!(
            "Generated map {} ({}x{}, {} open cells, {} food cells)",
            map.name,
            map.width,
            map.height,
            map.open_cell_count(),
            map.food_cells().len()
        );
        Ok(map)
    }

    /// Parse a map from text, one row per line: `#` wall, `.` open, `C` colony,
    /// `1`-`9` food of that density holding `food_amount` units
    pub fn from_ascii(text: &str, creature_count: usize, food_amount: u32) -> Result<Self, String> {
        let rows: Vec<&str> = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();
        let height = rows.len();
        let width = rows.iter().map(|r| r.chars().count()).max().unwrap_or(0);
        if width == 0 || height == 0 {
            return Err("empty map".to_string());
        }

        let mut colony = None;
        let mut map = Self::filled(width, height, Pos::new(0, 0), creature_count);
        for (y, row) in rows.iter().enumerate() {
            for (x, ch) in row.chars().enumerate() {
                match ch {
                    '#' => {}
                    '.' => map.walls[[x, y]] = false,
                    'C' => {
                        map.walls[[x, y]] = false;
                        colony = Some(Pos::new(x, y));
                    }
                    '1'..='9' => {
                        map.walls[[x, y]] = false;
                        map.food_amount[[x, y]] = food_amount;
                        map.food_density[[x, y]] = ch.to_digit(10).unwrap_or(1) as f64;
                    }
                    other => return Err(format!("unexpected map character {:?}", other)),
                }
            }
        }

        map.colony = colony.ok_or_else(|| "map has no colony".to_string())?;
        map.validate()?;
        Ok(map)
    }

    /// Check structural invariants
    pub fn validate(&self) -> Result<(), String> {
        if self.walls.dim() != (self.width, self.height) {
            return Err("wall grid does not match map size".to_string());
        }
        if self.colony.x >= self.width || self.colony.y >= self.height {
            return Err("colony lies outside the map".to_string());
        }
        if self.walls[[self.colony.x, self.colony.y]] {
            return Err("colony cell is a wall".to_string());
        }
        Ok(())
    }

    #[inline]
    pub fn in_bounds(&self, pos: Pos) -> bool {
        pos.x < self.width && pos.y < self.height
    }

    #[inline]
    pub fn is_wall(&self, pos: Pos) -> bool {
        !self.in_bounds(pos) || self.walls[[pos.x, pos.y]]
    }

    pub fn open_cell_count(&self) -> usize {
        self.walls.iter().filter(|&&w| !w).count()
    }

    /// SHA-256 of the dimensions, colony and wall grid, as lowercase hex.
    /// Two maps with the same hash have identical pathfinding tables.
    pub fn layout_hash(&self) -> String {
        let mut hasher = Sha256::new();
        for value in [self.width, self.height, self.colony.x, self.colony.y] {
            hasher.update((value as u64).to_le_bytes());
        }
        for x in 0..self.width {
            for y in 0..self.height {
                hasher.update([self.walls[[x, y]] as u8]);
            }
        }
        format!("{:x}", hasher.finalize())
    }

    /// Food-bearing cells with their amount and density
    pub fn food_cells(&self) -> Vec<(Pos, u32, f64)> {
        let mut cells = Vec::new();
        for y in 0..self.height {
            for x in 0..self.width {
                let amount = self.food_amount[[x, y]];
                if amount > 0 && !self.walls[[x, y]] {
                    cells.push((Pos::new(x, y), amount, self.food_density[[x, y]]));
                }
            }
        }
        cells
    }

    pub fn remove_wall_circle(&mut self, center: Pos, r: f64) {
        let (cx, cy) = (center.x as f64, center.y as f64);
        let x_min = (cx - r).floor().max(0.0) as usize;
        let y_min = (cy - r).floor().max(0.0) as usize;
        let x_max = ((cx + r).ceil() as usize).min(self.width.saturating_sub(1));
        let y_max = ((cy + r).ceil() as usize).min(self.height.saturating_sub(1));
        for x in x_min..=x_max {
            for y in y_min..=y_max {
                let (dx, dy) = (x as f64 - cx, y as f64 - cy);
                if dx * dx + dy * dy <= r * r {
                    self.walls[[x, y]] = false;
                }
            }
        }
    }

    pub fn remove_wall_rectangle(&mut self, x_min: isize, x_max: isize, y_min: isize, y_max: isize) {
        let clamp_x = |v: isize| v.clamp(0, self.width as isize - 1) as usize;
        let clamp_y = |v: isize| v.clamp(0, self.height as isize - 1) as usize;
        for x in clamp_x(x_min)..=clamp_x(x_max) {
            for y in clamp_y(y_min)..=clamp_y(y_max) {
                self.walls[[x, y]] = false;
            }
        }
    }

    pub fn place_food_circle(&mut self, center: Pos, r: f64, amount: u32, density: f64) {
        let (cx, cy) = (center.x as f64, center.y as f64);
        for x in 0..self.width {
            for y in 0..self.height {
                let (dx, dy) = (x as f64 - cx, y as f64 - cy);
                if dx * dx + dy * dy <= r * r && !self.walls[[x, y]] {
                    self.food_amount[[x, y]] = amount;
                    self.food_density[[x, y]] = density;
                }
            }
        }
    }
}
