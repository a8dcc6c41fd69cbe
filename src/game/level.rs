//! Level Layout and Generation
//!
//! A level is a walled rectangle with interior pillars, gold piles and a
//! staircase. Generation draws only from the session generator and walks
//! cells in sorted order, so a seed always yields the same level.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::core::rng::DeterministicRng;
use crate::game::rules::Rules;
use crate::game::state::{MonsterTemplate, Position, BESTIARY};

/// Static layout of one dungeon level.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Level {
    /// Columns, border included
    pub width: i32,
    /// Rows, border included
    pub height: i32,
    /// Impassable cells
    pub walls: BTreeSet<Position>,
    /// Down staircase
    pub stairs: Option<Position>,
    /// Gold lying on the floor
    #[serde(with = "cell_map")]
    pub gold: BTreeMap<Position, u32>,
}

impl Level {
    /// Empty room with a wall border.
    pub fn open_room(width: i32, height: i32) -> Self {
        let mut walls = BTreeSet::new();
        for x in 0..width {
            walls.insert(Position::new(x, 0));
            walls.insert(Position::new(x, height - 1));
        }
        for y in 0..height {
            walls.insert(Position::new(0, y));
            walls.insert(Position::new(width - 1, y));
        }
        Self {
            width,
            height,
            walls,
            stairs: None,
            gold: BTreeMap::new(),
        }
    }

    /// Add a wall cell.
    pub fn with_wall(mut self, position: Position) -> Self {
        self.walls.insert(position);
        self
    }

    /// Place the staircase.
    pub fn with_stairs(mut self, position: Position) -> Self {
        self.stairs = Some(position);
        self
    }

    /// Drop a gold pile.
    pub fn with_gold(mut self, position: Position, amount: u32) -> Self {
        *self.gold.entry(position).or_insert(0) += amount;
        self
    }

    /// Inside the map rectangle.
    pub fn in_bounds(&self, position: Position) -> bool {
        position.x >= 0 && position.y >= 0 && position.x < self.width && position.y < self.height
    }

    /// Walls and anything out of bounds block movement.
    pub fn is_passable(&self, position: Position) -> bool {
        self.in_bounds(position) && !self.walls.contains(&position)
    }

    /// Passable cells in row-major order.
    pub fn floor_cells(&self) -> Vec<Position> {
        let mut cells = Vec::new();
        for y in 0..self.height {
            for x in 0..self.width {
                let p = Position::new(x, y);
                if self.is_passable(p) {
                    cells.push(p);
                }
            }
        }
        cells
    }

    /// Pick a passable cell not in `taken`.
    pub fn random_free_cell(&self, rng: &mut DeterministicRng, taken: &BTreeSet<Position>) -> Option<Position> {
        let candidates: Vec<Position> = self
            .floor_cells()
            .into_iter()
            .filter(|p| !taken.contains(p))
            .collect();
        rng.choose(&candidates).copied()
    }
}

/// Freshly generated level plus where things go on it.
#[derive(Debug)]
pub struct Generated {
    /// Layout
    pub level: Level,
    /// Player arrival cell
    pub start: Position,
    /// Monsters to place
    pub monsters: Vec<(&'static MonsterTemplate, Position)>,
}

/// Generate the level for a depth.
pub fn generate(depth: u32, rules: &Rules, rng: &mut DeterministicRng) -> Generated {
    let mut level = Level::open_room(rules.level_width, rules.level_height);
    let mut taken = BTreeSet::new();

    // Start cell first so pillars never trap the player
    let start = level
        .random_free_cell(rng, &taken)
        .unwrap_or(Position::new(1, 1));
    taken.insert(start);
    for p in level.floor_cells() {
        if p.is_adjacent(start) {
            taken.insert(p);
        }
    }

    let pillars = rng.next_int_range(rules.pillars.0, rules.pillars.1);
    for _ in 0..pillars {
        if let Some(p) = level.random_free_cell(rng, &taken) {
            level.walls.insert(p);
            taken.insert(p);
        }
    }

    if let Some(stairs) = level.random_free_cell(rng, &taken) {
        level.stairs = Some(stairs);
        taken.insert(stairs);
    }

    for _ in 0..rules.gold_piles {
        if let Some(p) = level.random_free_cell(rng, &taken) {
            let amount = rng.next_int_range(rules.gold_amount.0, rules.gold_amount.1 * depth as i32);
            level.gold.insert(p, amount.max(1) as u32);
            taken.insert(p);
        }
    }

    let roster = &BESTIARY[..(depth as usize + 1).min(BESTIARY.len())];
    let count = rules.monsters_per_level + depth / 2;
    let mut monsters = Vec::new();
    for _ in 0..count {
        let Some(template) = rng.choose(roster) else { break };
        if let Some(p) = level.random_free_cell(rng, &taken) {
            monsters.push((template, p));
            taken.insert(p);
        }
    }

    Generated { level, start, monsters }
}

/// Serialize a position-keyed map as a list of `[position, value]` pairs,
/// since JSON object keys must be strings.
mod cell_map {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use crate::game::state::Position;

    pub fn serialize<S: Serializer>(map: &BTreeMap<Position, u32>, serializer: S) -> Result<S::Ok, S::Error> {
        let pairs: Vec<(&Position, &u32)> = map.iter().collect();
        pairs.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BTreeMap<Position, u32>, D::Error> {
        let pairs = Vec::<(Position, u32)>::deserialize(deserializer)?;
        Ok(pairs.into_iter().collect())
    }
}

// =============================================================================
// TESTS
// =============================================================================
