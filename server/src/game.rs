//! The room: one match's authoritative state and its lifecycle.

use crate::config::RoomConfig;
use crate::food;
use crate::powerup::PowerupBoard;
use crate::utils::generate_color;
use log::info;
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::{
    Cell, Direction, Food, MatchResult, Phase, Player, PlayerId, RoomSnapshot, Timestamp,
    INITIAL_SNAKE_LENGTH,
};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum JoinError {
    #[error("Room full")]
    RoomFull,
    #[error("Game already started")]
    AlreadyStarted,
    #[error("Already in this room")]
    AlreadyJoined,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum StartError {
    #[error("Game is not waiting to start")]
    NotWaiting,
    #[error("Only the host can start the game")]
    NotHost,
    #[error("Not enough players")]
    NoPlayers,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ResetError {
    #[error("Game has not ended")]
    NotEnded,
    #[error("Only the host can reset the game")]
    NotHost,
}

/// Start cell and heading for a join slot: four quadrant corners, facing
/// inwards along the x axis.
pub fn spawn_layout(slot: usize, grid_size: u32) -> (Cell, Direction) {
    let q = (grid_size / 4) as i32;
    let t = (grid_size * 3 / 4) as i32;
    match slot % 4 {
        0 => (Cell::new(q, q), Direction::Right),
        1 => (Cell::new(t, t), Direction::Left),
        2 => (Cell::new(t, q), Direction::Left),
        _ => (Cell::new(q, t), Direction::Right),
    }
}

#[derive(Debug)]
pub struct Room {
    pub code: String,
    pub host: PlayerId,
    pub config: RoomConfig,
    pub phase: Phase,
    pub players: HashMap<PlayerId, Player>,
    pub food: Vec<Food>,
    pub powerups: PowerupBoard,
    pub tick: u32,
    pub started_at: Option<Timestamp>,
    pub ends_at: Option<Timestamp>,
    pub ended_at: Option<Timestamp>,
    pub(crate) rng: StdRng,
}

impl Room {
    pub fn new(code: String, config: RoomConfig, host: PlayerId, host_name: String) -> Self {
        Self::with_rng(code, config, host, host_name, StdRng::from_entropy())
    }

    /// Same as `new` with a caller-supplied RNG, for reproducible matches.
    pub fn with_rng(
        code: String,
        config: RoomConfig,
        host: PlayerId,
        host_name: String,
        rng: StdRng,
    ) -> Self {
        let mut room = Self {
            code,
            host,
            config,
            phase: Phase::Waiting,
            players: HashMap::new(),
            food: Vec::new(),
            powerups: PowerupBoard::new(),
            tick: 0,
            started_at: None,
            ends_at: None,
            ended_at: None,
            rng,
        };
        room.insert_player(host, host_name);
        info!("Room {} created by player {}", room.code, host);
        room
    }

    /// Lowest start slot whose cell no current snake covers. Slots freed by
    /// leavers are handed out again before new ones.
    fn free_slot(&self) -> usize {
        (0..4)
            .find(|&slot| {
                let (cell, _) = spawn_layout(slot, self.config.grid_size);
                !self.players.values().any(|p| p.occupies(cell))
            })
            .unwrap_or(self.players.len())
    }

    fn insert_player(&mut self, id: PlayerId, name: String) -> &Player {
        let (start, heading) = spawn_layout(self.free_slot(), self.config.grid_size);
        let color = generate_color(self.players.values().map(|p| p.color.as_str()));
        let player = Player::new(
            id,
            name,
            color,
            start,
            heading,
            INITIAL_SNAKE_LENGTH,
            self.config.grid_size,
        );
        self.players.entry(id).or_insert(player)
    }

    pub fn add_player(&mut self, id: PlayerId, name: String) -> Result<&Player, JoinError> {
        if self.players.contains_key(&id) {
            return Err(JoinError::AlreadyJoined);
        }
        if self.phase != Phase::Waiting {
            return Err(JoinError::AlreadyStarted);
        }
        if self.players.len() >= self.config.max_players {
            return Err(JoinError::RoomFull);
        }

        info!("Player {} ({}) joined room {}", id, name, self.code);
        Ok(self.insert_player(id, name))
    }

    /// Removes a player at any phase. Host reassignment is left to the caller.
    pub fn remove_player(&mut self, id: PlayerId) -> Option<Player> {
        let removed = self.players.remove(&id);
        if removed.is_some() {
            info!("Player {} left room {}", id, self.code);
        }
        removed
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn living_count(&self) -> usize {
        self.players.values().filter(|p| p.alive).count()
    }

    pub fn food_target(&self) -> usize {
        food::target_count(self.config.food_policy, self.players.len())
    }

    /// `waiting -> playing`. Records the start and scheduled end and lays out
    /// the initial food.
    pub fn start(&mut self, now: Timestamp) -> Result<(), StartError> {
        if self.phase != Phase::Waiting {
            return Err(StartError::NotWaiting);
        }
        if self.players.is_empty() {
            return Err(StartError::NoPlayers);
        }

        self.phase = Phase::Playing;
        self.tick = 0;
        self.started_at = Some(now);
        self.ends_at = Some(now + self.config.match_duration_ms);
        self.ended_at = None;
        self.powerups.clear();
        self.food.clear();
        self.replenish_food();

        info!(
            "Room {} started with {} player(s) on a {}x{} board",
            self.code,
            self.players.len(),
            self.config.grid_size,
            self.config.grid_size
        );
        Ok(())
    }

    pub(crate) fn replenish_food(&mut self) -> usize {
        let target = self.food_target();
        food::replenish(
            &mut self.rng,
            self.config.grid_size,
            &mut self.food,
            &self.players,
            &self.powerups.active,
            target,
        )
    }

    /// `playing -> ended`. Powerups on the board vanish with the match.
    pub(crate) fn end(&mut self, now: Timestamp) {
        self.phase = Phase::Ended;
        self.ended_at = Some(now);
        self.powerups.clear();
        info!(
            "Room {} ended after {} ticks, {} alive",
            self.code,
            self.tick,
            self.living_count()
        );
    }

    /// `ended -> waiting`, putting every player back on a start slot in join
    /// order while keeping id, name and color.
    pub fn reset(&mut self) -> Result<(), ResetError> {
        if self.phase != Phase::Ended {
            return Err(ResetError::NotEnded);
        }

        let mut ids: Vec<PlayerId> = self.players.keys().copied().collect();
        ids.sort_unstable();
        for (slot, id) in ids.into_iter().enumerate() {
            if let Some(old) = self.players.remove(&id) {
                let (start, heading) = spawn_layout(slot, self.config.grid_size);
                let fresh = Player::new(
                    id,
                    old.name,
                    old.color,
                    start,
                    heading,
                    INITIAL_SNAKE_LENGTH,
                    self.config.grid_size,
                );
                self.players.insert(id, fresh);
            }
        }

        self.phase = Phase::Waiting;
        self.tick = 0;
        self.food.clear();
        self.powerups.clear();
        self.started_at = None;
        self.ends_at = None;
        self.ended_at = None;

        info!("Room {} reset", self.code);
        Ok(())
    }

    /// Updates a player's heading for the next tick. Exact reversals are
    /// refused; anything else, including the current heading, is accepted.
    pub fn set_heading(&mut self, id: PlayerId, heading: Direction) -> bool {
        match self.players.get_mut(&id) {
            Some(player) if !heading.is_reverse_of(player.heading) => {
                player.heading = heading;
                true
            }
            _ => false,
        }
    }

    /// Winner, duration and roster size of a finished match.
    ///
    /// The winner is the top scorer among survivors, or among everybody when
    /// nobody survived. Equal scores go to the lowest player id.
    pub fn match_result(&self) -> Option<MatchResult> {
        if self.phase != Phase::Ended {
            return None;
        }

        let best = |alive_only: bool| {
            self.players
                .values()
                .filter(|p| !alive_only || p.alive)
                .max_by(|a, b| a.score.cmp(&b.score).then(b.id.cmp(&a.id)))
        };
        let winner = best(true).or_else(|| best(false))?;

        let duration_ms = match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) => end.saturating_sub(start),
            _ => 0,
        };

        Some(MatchResult {
            winner_name: winner.name.clone(),
            winner_score: winner.score,
            duration_ms,
            player_count: self.players.len(),
        })
    }

    pub fn snapshot(&self) -> RoomSnapshot {
        let mut players: Vec<Player> = self.players.values().cloned().collect();
        players.sort_by_key(|p| p.id);

        RoomSnapshot {
            code: self.code.clone(),
            phase: self.phase,
            host: self.host,
            grid_size: self.config.grid_size,
            tick: self.tick,
            players,
            food: self.food.clone(),
            powerups: self.powerups.active.clone(),
            ends_at: self.ends_at,
        }
    }
}
