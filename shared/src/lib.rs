use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub type PlayerId = u32;

/// Milliseconds since the Unix epoch.
pub type Timestamp = u64;

pub const PROTOCOL_VERSION: u32 = 1;
pub const MAX_PLAYERS_PER_ROOM: usize = 4;
pub const INITIAL_SNAKE_LENGTH: usize = 3;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum Packet {
    Connect {
        client_version: u32,
    },
    CreateRoom {
        name: String,
        grid_size: Option<u32>,
        duration_secs: Option<u32>,
        food_policy: Option<FoodPolicy>,
    },
    JoinRoom {
        room_code: String,
        name: String,
    },
    StartGame,
    SetHeading {
        heading: Direction,
    },
    RequestReset,
    Disconnect,

    Connected {
        client_id: u32,
    },
    RoomJoined {
        room_code: String,
        player_id: PlayerId,
    },
    Rejected {
        reason: String,
    },
    GameState {
        timestamp: u64,
        snapshot: RoomSnapshot,
    },
    MatchEnded {
        result: Option<MatchResult>,
    },
    Disconnected {
        reason: String,
    },
}

/// A grid coordinate. Signed so that an unwrapped step off the board is
/// representable and can be rejected by the bounds check.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Cell {
    pub x: i32,
    pub y: i32,
}

impl Cell {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// One step in `direction`, without wrapping.
    pub fn step(self, direction: Direction) -> Cell {
        let (dx, dy) = direction.delta();
        Cell {
            x: self.x + dx,
            y: self.y + dy,
        }
    }

    /// Maps the cell onto a toroidal `size` x `size` board.
    pub fn wrapped(self, size: u32) -> Cell {
        let n = size as i32;
        Cell {
            x: self.x.rem_euclid(n),
            y: self.y.rem_euclid(n),
        }
    }

    pub fn in_bounds(self, size: u32) -> bool {
        let n = size as i32;
        self.x >= 0 && self.x < n && self.y >= 0 && self.y < n
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    /// Unit vector of the heading. Positive y points down the board.
    pub fn delta(self) -> (i32, i32) {
        match self {
            Direction::Up => (0, -1),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
        }
    }

    pub fn opposite(self) -> Direction {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
        }
    }

    pub fn is_reverse_of(self, other: Direction) -> bool {
        self.opposite() == other
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FoodKind {
    Normal,
    BonusScore,
    SpeedBuff,
}

impl FoodKind {
    pub fn score(self) -> u32 {
        match self {
            FoodKind::BonusScore => 2,
            FoodKind::Normal | FoodKind::SpeedBuff => 1,
        }
    }

    pub fn grows(self) -> bool {
        !matches!(self, FoodKind::SpeedBuff)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct Food {
    pub position: Cell,
    pub kind: FoodKind,
    pub score: u32,
    pub grow: bool,
}

impl Food {
    pub fn new(position: Cell, kind: FoodKind) -> Self {
        Self {
            position,
            kind,
            score: kind.score(),
            grow: kind.grows(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PowerupKind {
    Invincible,
    SpeedBoost,
    Multiplier,
    Freeze,
}

/// Static per-kind tuning and display data.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerupInfo {
    pub name: &'static str,
    pub color: &'static str,
    pub duration_ms: u64,
    pub spawn_weight: u32,
}

const INVINCIBLE_INFO: PowerupInfo = PowerupInfo {
    name: "Invincible",
    color: "#fbbf24",
    duration_ms: 6_000,
    spawn_weight: 1,
};

const SPEED_BOOST_INFO: PowerupInfo = PowerupInfo {
    name: "Speed Boost",
    color: "#3b82f6",
    duration_ms: 6_000,
    spawn_weight: 1,
};

const MULTIPLIER_INFO: PowerupInfo = PowerupInfo {
    name: "2x Points",
    color: "#10b981",
    duration_ms: 6_000,
    spawn_weight: 1,
};

const FREEZE_INFO: PowerupInfo = PowerupInfo {
    name: "Freeze Others",
    color: "#0ea5e9",
    duration_ms: 4_000,
    spawn_weight: 1,
};

impl PowerupKind {
    pub const ALL: [PowerupKind; 4] = [
        PowerupKind::Invincible,
        PowerupKind::SpeedBoost,
        PowerupKind::Multiplier,
        PowerupKind::Freeze,
    ];

    pub fn info(self) -> &'static PowerupInfo {
        match self {
            PowerupKind::Invincible => &INVINCIBLE_INFO,
            PowerupKind::SpeedBoost => &SPEED_BOOST_INFO,
            PowerupKind::Multiplier => &MULTIPLIER_INFO,
            PowerupKind::Freeze => &FREEZE_INFO,
        }
    }
}

impl fmt::Display for PowerupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.info().name)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct Powerup {
    pub kind: PowerupKind,
    pub position: Cell,
    pub spawned_at: Timestamp,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct Effect {
    pub kind: PowerupKind,
    pub expires_at: Timestamp,
}

impl Effect {
    pub fn is_active(&self, now: Timestamp) -> bool {
        now < self.expires_at
    }

    /// Seconds left before expiry, clamped at zero.
    pub fn remaining_secs(&self, now: Timestamp) -> f32 {
        self.expires_at.saturating_sub(now) as f32 / 1000.0
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub color: String,
    pub score: u32,
    pub alive: bool,
    pub heading: Direction,
    /// Head first; never empty.
    pub body: Vec<Cell>,
    pub effects: Vec<Effect>,
    pub frozen_until: Option<Timestamp>,
}

impl Player {
    /// Builds a snake of `length` cells with its head on `start`, trailing
    /// away from `heading` and wrapped onto the board.
    pub fn new(
        id: PlayerId,
        name: String,
        color: String,
        start: Cell,
        heading: Direction,
        length: usize,
        grid_size: u32,
    ) -> Self {
        let trail = heading.opposite();
        let mut body = Vec::with_capacity(length.max(1));
        let mut cell = start;
        for _ in 0..length.max(1) {
            body.push(cell.wrapped(grid_size));
            cell = cell.step(trail);
        }

        Self {
            id,
            name,
            color,
            score: 0,
            alive: true,
            heading,
            body,
            effects: Vec::new(),
            frozen_until: None,
        }
    }

    pub fn head(&self) -> Cell {
        self.body[0]
    }

    pub fn tail(&self) -> Cell {
        self.body[self.body.len() - 1]
    }

    pub fn length(&self) -> usize {
        self.body.len()
    }

    pub fn has_effect(&self, kind: PowerupKind, now: Timestamp) -> bool {
        self.effects
            .iter()
            .any(|effect| effect.kind == kind && effect.is_active(now))
    }

    pub fn is_frozen(&self, now: Timestamp) -> bool {
        matches!(self.frozen_until, Some(until) if now < until)
    }

    pub fn occupies(&self, cell: Cell) -> bool {
        self.body.contains(&cell)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Waiting,
    Playing,
    Ended,
}

/// How many food items a room keeps on the board.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum FoodPolicy {
    Fixed(u32),
    PerPlayer,
    HalfPlayerCount,
}

impl Default for FoodPolicy {
    fn default() -> Self {
        FoodPolicy::Fixed(1)
    }
}

impl FromStr for FoodPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "EQUAL" | "PER_PLAYER" => Ok(FoodPolicy::PerPlayer),
            "HALF" | "HALF_PLAYER_COUNT" => Ok(FoodPolicy::HalfPlayerCount),
            other => other
                .parse::<u32>()
                .map(|k| FoodPolicy::Fixed(k.max(1)))
                .map_err(|_| format!("invalid food policy '{}'", s)),
        }
    }
}

impl fmt::Display for FoodPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FoodPolicy::Fixed(k) => write!(f, "{}", k),
            FoodPolicy::PerPlayer => f.write_str("EQUAL"),
            FoodPolicy::HalfPlayerCount => f.write_str("HALF"),
        }
    }
}

/// Final record of a match, handed to whatever stores the leaderboard.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct MatchResult {
    pub winner_name: String,
    pub winner_score: u32,
    pub duration_ms: u64,
    pub player_count: usize,
}

impl MatchResult {
    pub fn duration_secs(&self) -> u64 {
        self.duration_ms / 1000
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RoomSnapshot {
    pub code: String,
    pub phase: Phase,
    pub host: PlayerId,
    pub grid_size: u32,
    pub tick: u32,
    pub players: Vec<Player>,
    pub food: Vec<Food>,
    pub powerups: Vec<Powerup>,
    pub ends_at: Option<Timestamp>,
}
