//! Powerup spawning, collection and the effects they grant.
//!
//! A room keeps at most `PowerupConfig::max_active` powerups on the board.
//! Collecting one attaches a timed `Effect` to the collector, except
//! `Freeze`, which instead stops every other living snake for its duration.
//! Reapplying a kind that is still active restarts its window rather than
//! extending it.

use crate::config::PowerupConfig;
use crate::placement::find_free_cell;
use log::{debug, info};
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use shared::{Cell, Effect, Food, Player, PlayerId, Powerup, PowerupKind, Timestamp};
use std::collections::HashMap;

/// On-board powerups of one room plus the spawn throttle.
#[derive(Debug, Clone, Default)]
pub struct PowerupBoard {
    pub active: Vec<Powerup>,
    pub last_spawn: Option<Timestamp>,
}

impl PowerupBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempts a spawn. All three gates must pass: room below the concurrent
    /// cap, minimum interval since the last spawn elapsed, and a Bernoulli
    /// draw at `config.spawn_chance`.
    pub fn try_spawn<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        config: &PowerupConfig,
        grid_size: u32,
        players: &HashMap<PlayerId, Player>,
        food: &[Food],
        now: Timestamp,
    ) -> Option<Powerup> {
        if self.active.len() >= config.max_active {
            return None;
        }
        if let Some(last) = self.last_spawn {
            if now.saturating_sub(last) < config.min_spawn_interval_ms {
                return None;
            }
        }
        if !rng.gen_bool(config.spawn_chance.clamp(0.0, 1.0)) {
            return None;
        }

        let kind = choose_kind(rng, &config.enabled)?;
        let position = {
            let on_snake = |c: Cell| players.values().any(|p| p.occupies(c));
            let on_food = |c: Cell| food.iter().any(|f| f.position == c);
            let on_powerup = |c: Cell| self.active.iter().any(|p| p.position == c);
            find_free_cell(rng, grid_size, &[&on_snake, &on_food, &on_powerup])?
        };

        let powerup = Powerup {
            kind,
            position,
            spawned_at: now,
        };
        self.active.push(powerup);
        self.last_spawn = Some(now);

        info!("Spawned {} at {}", kind, position);
        Some(powerup)
    }

    /// Removes and returns the powerup sitting exactly on `head`.
    pub fn collect(&mut self, head: Cell) -> Option<Powerup> {
        let index = self.active.iter().position(|p| p.position == head)?;
        Some(self.active.remove(index))
    }

    pub fn clear(&mut self) {
        self.active.clear();
        self.last_spawn = None;
    }
}

/// Weighted pick among the enabled kinds using the static spawn weights.
pub fn choose_kind<R: Rng + ?Sized>(rng: &mut R, enabled: &[PowerupKind]) -> Option<PowerupKind> {
    let weights = enabled.iter().map(|kind| kind.info().spawn_weight);
    let index = WeightedIndex::new(weights).ok()?;
    Some(enabled[index.sample(rng)])
}

/// Attaches `kind` to `player` until `now + duration`. An existing effect of
/// the same kind has its expiry reset.
pub fn apply_effect(player: &mut Player, kind: PowerupKind, now: Timestamp) {
    let expires_at = now + kind.info().duration_ms;
    match player.effects.iter_mut().find(|effect| effect.kind == kind) {
        Some(effect) => effect.expires_at = expires_at,
        None => player.effects.push(Effect { kind, expires_at }),
    }
    debug!(
        "Applied {} to player {} until {}",
        kind, player.id, expires_at
    );
}

/// Applies a collected powerup on behalf of `collector`.
pub fn apply_collected(
    players: &mut HashMap<PlayerId, Player>,
    collector: PlayerId,
    kind: PowerupKind,
    now: Timestamp,
) {
    if kind == PowerupKind::Freeze {
        let until = now + kind.info().duration_ms;
        for player in players.values_mut() {
            if player.id != collector && player.alive {
                player.frozen_until = Some(until);
                info!("Player {} frozen by {} until {}", player.id, collector, until);
            }
        }
        return;
    }

    if let Some(player) = players.get_mut(&collector) {
        apply_effect(player, kind, now);
    }
}

/// Drops expired effects and thaws players whose freeze has run out.
pub fn sweep_expired(players: &mut HashMap<PlayerId, Player>, now: Timestamp) {
    for player in players.values_mut() {
        let before = player.effects.len();
        player.effects.retain(|effect| effect.is_active(now));
        if player.effects.len() < before {
            debug!(
                "Expired {} effect(s) on player {}",
                before - player.effects.len(),
                player.id
            );
        }

        if matches!(player.frozen_until, Some(until) if until <= now) {
            player.frozen_until = None;
            debug!("Player {} thawed", player.id);
        }
    }
}
