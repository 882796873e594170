//! Tile map loading and static collision geometry

use std::path::Path;

use rand::Rng;

use super::collision::{CollisionBox, Structure};

/// Side length of one map tile in world units
pub const TILE_SIZE: f32 = 64.0;

/// Character marking a wall tile
pub const WALL_MARKER: char = '#';

/// Map loading errors
#[derive(Debug, thiserror::Error)]
pub enum MapError {
    #[error("Failed to read map file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Map contains no tiles")]
    Empty,
}

/// Static world: bounds, wall geometry and open spawn tiles
#[derive(Debug, Clone)]
pub struct WorldMap {
    pub width: f32,
    pub height: f32,
    pub structures: Vec<Structure>,
    open_tiles: Vec<(usize, usize)>,
}

impl WorldMap {
    /// Parse an ASCII map: rows separated by line breaks, one character per
    /// tile, `#` for walls and anything else open
    pub fn parse(text: &str) -> Result<Self, MapError> {
        let mut rows: Vec<&str> = text
            .lines()
            .map(|line| line.trim_end_matches('\r'))
            .collect();
        // Interior blank rows are open rows; only trailing ones are dropped
        while rows.last().is_some_and(|line| line.is_empty()) {
            rows.pop();
        }

        let columns = rows.iter().map(|r| r.chars().count()).max().unwrap_or(0);
        if rows.is_empty() || columns == 0 {
            return Err(MapError::Empty);
        }

        let tile = CollisionBox::new(TILE_SIZE, TILE_SIZE);
        let mut structures = Vec::new();
        let mut open_tiles = Vec::new();

        for (row, line) in rows.iter().enumerate() {
            let mut chars = line.chars();
            for col in 0..columns {
                // Short rows are padded with open space
                match chars.next() {
                    Some(WALL_MARKER) => structures.push(Structure {
                        x: col as f32 * TILE_SIZE,
                        y: row as f32 * TILE_SIZE,
                        collision: tile,
                    }),
                    _ => open_tiles.push((col, row)),
                }
            }
        }

        Ok(Self {
            width: columns as f32 * TILE_SIZE,
            height: rows.len() as f32 * TILE_SIZE,
            structures,
            open_tiles,
        })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, MapError> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// Wall-less arena of the given size in tiles
    pub fn open_arena(columns: usize, rows: usize) -> Self {
        let columns = columns.max(1);
        let rows = rows.max(1);
        let open_tiles = (0..rows)
            .flat_map(|row| (0..columns).map(move |col| (col, row)))
            .collect();

        Self {
            width: columns as f32 * TILE_SIZE,
            height: rows as f32 * TILE_SIZE,
            structures: Vec::new(),
            open_tiles,
        }
    }

    pub fn open_tile_count(&self) -> usize {
        self.open_tiles.len()
    }

    /// Top-left corner of a random open tile
    pub fn random_spawn<R: Rng + ?Sized>(&self, rng: &mut R) -> (f32, f32) {
        if self.open_tiles.is_empty() {
            return (
                rng.gen_range(0.0..self.width.max(1.0)),
                rng.gen_range(0.0..self.height.max(1.0)),
            );
        }
        let (col, row) = self.open_tiles[rng.gen_range(0..self.open_tiles.len())];
        (col as f32 * TILE_SIZE, row as f32 * TILE_SIZE)
    }

    /// Clamp an owner position so its tile-sized sprite stays on the map
    pub fn clamp(&self, x: f32, y: f32) -> (f32, f32) {
        (
            x.clamp(0.0, (self.width - TILE_SIZE).max(0.0)),
            y.clamp(0.0, (self.height - TILE_SIZE).max(0.0)),
        )
    }
}
