//! Game State Definitions
//!
//! All state types for a dungeon run.
//! Uses BTreeMap/BTreeSet for deterministic iteration order.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::core::hash::{state_digest, DigestError, StateDigest};
use crate::game::level::Level;

// =============================================================================
// POSITION & DIRECTION
// =============================================================================

/// Grid cell. `x` grows to the right, `y` grows downwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    /// Column
    pub x: i32,
    /// Row
    pub y: i32,
}

impl Position {
    /// Create a position.
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Neighbouring cell in a direction.
    pub fn step(self, direction: Direction) -> Self {
        let (dx, dy) = direction.delta();
        Self::new(self.x + dx, self.y + dy)
    }

    /// Chebyshev distance (king moves).
    pub fn distance(self, other: Position) -> i32 {
        (self.x - other.x).abs().max((self.y - other.y).abs())
    }

    /// True when the two cells touch, diagonals included.
    pub fn is_adjacent(self, other: Position) -> bool {
        self != other && self.distance(other) == 1
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// One of the eight movement directions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// y - 1
    Up,
    /// y + 1
    Down,
    /// x - 1
    Left,
    /// x + 1
    Right,
    /// Diagonal up-left
    UpLeft,
    /// Diagonal up-right
    UpRight,
    /// Diagonal down-left
    DownLeft,
    /// Diagonal down-right
    DownRight,
}

impl Direction {
    /// All directions in a fixed order.
    pub const ALL: [Direction; 8] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
        Direction::UpLeft,
        Direction::UpRight,
        Direction::DownLeft,
        Direction::DownRight,
    ];

    /// Grid offset for this direction.
    pub fn delta(self) -> (i32, i32) {
        match self {
            Direction::Up => (0, -1),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
            Direction::UpLeft => (-1, -1),
            Direction::UpRight => (1, -1),
            Direction::DownLeft => (-1, 1),
            Direction::DownRight => (1, 1),
        }
    }

    /// Direction that moves `from` one step closer to `to`, if they differ.
    pub fn toward(from: Position, to: Position) -> Option<Direction> {
        let dx = (to.x - from.x).signum();
        let dy = (to.y - from.y).signum();
        Direction::ALL.into_iter().find(|d| d.delta() == (dx, dy))
    }
}

// =============================================================================
// MONSTERS
// =============================================================================

/// Monster identifier, rendered as `monster-<n>`.
///
/// Ordered numerically so monster turns run in spawn order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonsterId(pub u32);

impl fmt::Display for MonsterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "monster-{}", self.0)
    }
}

impl FromStr for MonsterId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.strip_prefix("monster-")
            .and_then(|n| n.parse().ok())
            .map(MonsterId)
            .ok_or_else(|| format!("invalid monster id {:?}", s))
    }
}

impl Serialize for MonsterId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MonsterId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// How a monster spends its turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Behavior {
    /// Holds position, attacks when the player is adjacent.
    Guard,
    /// Closes in on the player when within hunting range.
    Hunt,
}

/// A monster on the current level.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Monster {
    /// Identifier
    pub id: MonsterId,
    /// Display name ("goblin")
    pub name: String,
    /// Current cell
    pub position: Position,
    /// Hit points
    pub hp: i32,
    /// Maximum hit points
    pub max_hp: i32,
    /// Minimum damage per hit
    pub damage_min: i32,
    /// Maximum damage per hit
    pub damage_max: i32,
    /// Hit chance in percent
    pub hit_chance: u32,
    /// Turn behaviour
    pub behavior: Behavior,
}

/// Static description of a monster species.
#[derive(Clone, Copy, Debug)]
pub struct MonsterTemplate {
    /// Species name
    pub name: &'static str,
    /// Starting hit points
    pub hp: i32,
    /// Damage range
    pub damage: (i32, i32),
    /// Hit chance in percent
    pub hit_chance: u32,
}

/// Species table, weakest first. Deeper levels unlock later entries.
pub static BESTIARY: [MonsterTemplate; 5] = [
    MonsterTemplate { name: "rat", hp: 3, damage: (1, 2), hit_chance: 40 },
    MonsterTemplate { name: "jackal", hp: 4, damage: (1, 3), hit_chance: 45 },
    MonsterTemplate { name: "goblin", hp: 6, damage: (1, 4), hit_chance: 50 },
    MonsterTemplate { name: "orc", hp: 10, damage: (2, 6), hit_chance: 55 },
    MonsterTemplate { name: "troll", hp: 18, damage: (3, 8), hit_chance: 60 },
];

impl MonsterTemplate {
    /// Look up a species by name.
    pub fn named(name: &str) -> Option<&'static MonsterTemplate> {
        BESTIARY.iter().find(|t| t.name == name)
    }

    /// Instantiate at a position.
    pub fn spawn(&self, id: MonsterId, position: Position, behavior: Behavior) -> Monster {
        Monster {
            id,
            name: self.name.to_string(),
            position,
            hp: self.hp,
            max_hp: self.hp,
            damage_min: self.damage.0,
            damage_max: self.damage.1,
            hit_chance: self.hit_chance,
            behavior,
        }
    }
}

// =============================================================================
// PLAYER
// =============================================================================

/// The adventurer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    /// Character name
    pub name: String,
    /// Current cell
    pub position: Position,
    /// Hit points
    pub hp: i32,
    /// Maximum hit points
    pub max_hp: i32,
    /// Accumulated gold
    pub gold: u32,
    /// Remaining nutrition; starvation damage at zero
    pub nutrition: u32,
    /// Monsters killed
    pub kills: u32,
}

impl Player {
    /// Fresh character.
    pub fn new(name: impl Into<String>, position: Position, hp: i32, nutrition: u32) -> Self {
        Self {
            name: name.into(),
            position,
            hp,
            max_hp: hp,
            gold: 0,
            nutrition,
            kills: 0,
        }
    }

    /// Still standing?
    pub fn is_alive(&self) -> bool {
        self.hp > 0
    }
}

// =============================================================================
// GAME STATE
// =============================================================================

/// How the run ended, if it has.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// Still playing.
    #[default]
    Ongoing,
    /// Escaped the bottom of the dungeon.
    Won,
    /// Killed.
    Died,
}

/// Complete, self-contained state of a dungeon run.
///
/// Rules never mutate a state in place; each action produces a new value
/// from the previous one. Every collection is ordered so that iteration,
/// serialization and hashing are reproducible.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameState {
    /// Dungeon level, starting at 1
    pub depth: u32,
    /// Game time: turns in which the world advanced
    pub moves: u64,
    /// The adventurer
    pub player: Player,
    /// Monsters on this level, in turn order
    pub monsters: BTreeMap<MonsterId, Monster>,
    /// Map of the current level
    pub level: Level,
    /// Message log, oldest first
    pub messages: Vec<String>,
    /// Run outcome
    pub outcome: Outcome,
    /// Next id handed to a spawned monster
    pub next_monster_id: u32,
}

impl GameState {
    /// State on a hand-built level, used for fixtures and scripted scenarios.
    pub fn new(player: Player, level: Level) -> Self {
        Self {
            depth: 1,
            moves: 0,
            player,
            monsters: BTreeMap::new(),
            level,
            messages: Vec::new(),
            outcome: Outcome::Ongoing,
            next_monster_id: 1,
        }
    }

    /// Add a monster of a known species and return its id.
    pub fn spawn(&mut self, template: &MonsterTemplate, position: Position, behavior: Behavior) -> MonsterId {
        let id = MonsterId(self.next_monster_id);
        self.next_monster_id += 1;
        self.monsters.insert(id, template.spawn(id, position, behavior));
        id
    }

    /// Builder form of [`Self::spawn`].
    pub fn with_monster(mut self, template: &MonsterTemplate, position: Position, behavior: Behavior) -> Self {
        self.spawn(template, position, behavior);
        self
    }

    /// Monster standing on a cell.
    pub fn monster_at(&self, position: Position) -> Option<&Monster> {
        self.monsters.values().find(|m| m.position == position)
    }

    /// True when nothing blocks the cell.
    pub fn is_free(&self, position: Position) -> bool {
        self.level.is_passable(position)
            && self.player.position != position
            && self.monster_at(position).is_none()
    }

    /// Append a message.
    pub fn say(&mut self, message: impl Into<String>) {
        self.messages.push(message.into());
    }

    /// Run is over.
    pub fn is_finished(&self) -> bool {
        self.outcome != Outcome::Ongoing
    }

    /// Checkpoint hash of this state.
    pub fn digest(&self) -> Result<StateDigest, DigestError> {
        state_digest(self)
    }
}

// =============================================================================
// TESTS
// =============================================================================
