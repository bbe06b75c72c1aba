//! Server-wide and per-room tuning.
//!
//! `GameConfig` holds the defaults the server was launched with; every room
//! gets its own `RoomConfig` copy, optionally overridden by the creating
//! client's request.

use shared::{FoodPolicy, PowerupKind, MAX_PLAYERS_PER_ROOM};
use std::time::Duration;

pub const DEFAULT_TICK_RATE: u32 = 8;
pub const DEFAULT_GRID_SIZE: u32 = 20;
pub const MIN_GRID_SIZE: u32 = 10;
pub const MAX_GRID_SIZE: u32 = 60;
pub const DEFAULT_MATCH_SECS: u32 = 120;
pub const MIN_MATCH_SECS: u32 = 10;
pub const MAX_MATCH_SECS: u32 = 3600;
pub const DEFAULT_CLIENT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq)]
pub struct PowerupConfig {
    /// Probability that an otherwise permitted spawn attempt succeeds.
    pub spawn_chance: f64,
    pub max_active: usize,
    pub min_spawn_interval_ms: u64,
    pub enabled: Vec<PowerupKind>,
}

impl Default for PowerupConfig {
    fn default() -> Self {
        Self {
            spawn_chance: 0.90,
            max_active: 2,
            min_spawn_interval_ms: 5_000,
            enabled: PowerupKind::ALL.to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoomConfig {
    pub grid_size: u32,
    pub tick_rate: u32,
    pub match_duration_ms: u64,
    pub max_players: usize,
    pub food_policy: FoodPolicy,
    /// Toroidal board. When false, leaving the board kills non-invincible
    /// snakes.
    pub wrap: bool,
    pub powerups: PowerupConfig,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            grid_size: DEFAULT_GRID_SIZE,
            tick_rate: DEFAULT_TICK_RATE,
            match_duration_ms: DEFAULT_MATCH_SECS as u64 * 1000,
            max_players: MAX_PLAYERS_PER_ROOM,
            food_policy: FoodPolicy::default(),
            wrap: true,
            powerups: PowerupConfig::default(),
        }
    }
}

impl RoomConfig {
    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f32(1.0 / self.tick_rate.max(1) as f32)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GameConfig {
    pub max_clients: usize,
    pub client_timeout: Duration,
    pub room: RoomConfig,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            max_clients: 64,
            client_timeout: DEFAULT_CLIENT_TIMEOUT,
            room: RoomConfig::default(),
        }
    }
}

impl GameConfig {
    /// Room settings for a new room, applying a client's requested overrides.
    pub fn room_config(
        &self,
        grid_size: Option<u32>,
        duration_secs: Option<u32>,
        food_policy: Option<FoodPolicy>,
    ) -> RoomConfig {
        let mut room = self.room.clone();
        if let Some(size) = grid_size {
            room.grid_size = clamp_grid_size(size);
        }
        if let Some(secs) = duration_secs {
            room.match_duration_ms = clamp_match_secs(secs) as u64 * 1000;
        }
        if let Some(policy) = food_policy {
            room.food_policy = policy;
        }
        room
    }
}

/// Clamps into `MIN_GRID_SIZE..=MAX_GRID_SIZE` and rounds down to a multiple of ten.
pub fn clamp_grid_size(requested: u32) -> u32 {
    let size = requested.clamp(MIN_GRID_SIZE, MAX_GRID_SIZE);
    size / 10 * 10
}

pub fn clamp_match_secs(requested: u32) -> u32 {
    requested.clamp(MIN_MATCH_SECS, MAX_MATCH_SECS)
}
