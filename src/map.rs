use anyhow::{anyhow, Context, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::types::{GridPosition, Position};

/// A named rectangular region of the map, in world pixels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub name: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Place {
    pub fn new(name: impl Into<String>, x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            name: name.into(),
            x,
            y,
            width,
            height,
        }
    }

    /// Inclusive on all edges
    pub fn contains(&self, position: &Position) -> bool {
        position.x >= self.x
            && position.x <= self.x + self.width
            && position.y >= self.y
            && position.y <= self.y + self.height
    }

    pub fn random_point(&self, rng: &mut impl Rng) -> Position {
        Position::new(
            self.x + rng.gen::<f64>() * self.width,
            self.y + rng.gen::<f64>() * self.height,
        )
    }
}

/// Cost class of a walkable tile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Terrain {
    Wall,
    Road,
    Ground,
}

impl Terrain {
    pub fn cost(&self) -> Option<u32> {
        match self {
            Terrain::Wall => None,
            Terrain::Road => Some(1),
            Terrain::Ground => Some(10),
        }
    }
}

/// Read-only static world: tile grid, places and spawn region
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldMap {
    pub width: i32,
    pub height: i32,
    pub tile_size: f64,
    #[serde(default)]
    pub walls: Vec<GridPosition>,
    #[serde(default)]
    pub roads: Vec<GridPosition>,
    pub places: Vec<Place>,
    pub spawn_place: String,
    #[serde(skip)]
    terrain: Vec<Terrain>,
}

impl WorldMap {
    pub fn new(
        width: i32,
        height: i32,
        tile_size: f64,
        places: Vec<Place>,
        spawn_place: impl Into<String>,
    ) -> Self {
        let mut map = Self {
            width,
            height,
            tile_size,
            walls: Vec::new(),
            roads: Vec::new(),
            places,
            spawn_place: spawn_place.into(),
            terrain: Vec::new(),
        };
        map.rebuild_terrain();
        map
    }

    pub fn with_walls(mut self, walls: impl IntoIterator<Item = GridPosition>) -> Self {
        self.walls.extend(walls);
        self.rebuild_terrain();
        self
    }

    pub fn with_roads(mut self, roads: impl IntoIterator<Item = GridPosition>) -> Self {
        self.roads.extend(roads);
        self.rebuild_terrain();
        self
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content =
            fs::read_to_string(path).with_context(|| format!("Failed to read map {:?}", path))?;
        let mut map: WorldMap = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse map {:?}", path))?;
        if map.width <= 0 || map.height <= 0 {
            return Err(anyhow!("map {:?} has an empty grid", path));
        }
        map.rebuild_terrain();
        map.spawn_area()?;
        log::info!("🗺️ Loaded map {:?} with {} places", path, map.places.len());
        Ok(map)
    }

    fn rebuild_terrain(&mut self) {
        let size = (self.width.max(0) * self.height.max(0)) as usize;
        let mut terrain = vec![Terrain::Ground; size];
        for cell in &self.roads {
            if let Some(idx) = self.index(*cell) {
                terrain[idx] = Terrain::Road;
            }
        }
        for cell in &self.walls {
            if let Some(idx) = self.index(*cell) {
                terrain[idx] = Terrain::Wall;
            }
        }
        self.terrain = terrain;
    }

    pub fn in_bounds(&self, cell: GridPosition) -> bool {
        cell.x >= 0 && cell.y >= 0 && cell.x < self.width && cell.y < self.height
    }

    pub(crate) fn index(&self, cell: GridPosition) -> Option<usize> {
        if self.in_bounds(cell) {
            Some((cell.y * self.width + cell.x) as usize)
        } else {
            None
        }
    }

    pub fn terrain(&self, cell: GridPosition) -> Terrain {
        self.index(cell)
            .and_then(|idx| self.terrain.get(idx).copied())
            .unwrap_or(Terrain::Wall)
    }

    /// Out-of-bounds cells count as walls
    pub fn is_walkable(&self, cell: GridPosition) -> bool {
        self.terrain(cell) != Terrain::Wall
    }

    pub fn world_to_grid(&self, position: Position) -> GridPosition {
        GridPosition::new(
            ((position.x - 1.0) / self.tile_size).floor() as i32,
            ((position.y - 1.0) / self.tile_size).floor() as i32,
        )
    }

    /// Standing point of a cell: horizontally centred, on the bottom edge
    pub fn grid_to_world(&self, cell: GridPosition) -> Position {
        Position::new(
            f64::from(cell.x) * self.tile_size + self.tile_size / 2.0,
            f64::from(cell.y) * self.tile_size + self.tile_size,
        )
    }

    pub fn place(&self, name: &str) -> Option<&Place> {
        self.places.iter().find(|place| place.name == name)
    }

    pub fn place_names(&self) -> Vec<String> {
        self.places.iter().map(|place| place.name.clone()).collect()
    }

    pub fn spawn_area(&self) -> Result<&Place> {
        self.place(&self.spawn_place)
            .ok_or_else(|| anyhow!("spawn place {:?} is not defined", self.spawn_place))
    }

    /// Every walkable cell whose standing point lies inside the place
    pub fn cells_in(&self, place: &Place) -> Vec<GridPosition> {
        let min = self.world_to_grid(Position::new(place.x + 1.0, place.y + 1.0));
        let max = self.world_to_grid(Position::new(place.x + place.width, place.y + place.height));
        let mut cells = Vec::new();
        for y in min.y..=max.y {
            for x in min.x..=max.x {
                let cell = GridPosition::new(x, y);
                if self.is_walkable(cell) {
                    cells.push(cell);
                }
            }
        }
        cells
    }
}
