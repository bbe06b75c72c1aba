//! Simultaneous collision resolution for one sub-tick.
//!
//! Both passes read the same pre-move board. Neither sees the other's
//! verdicts, so the fatality set does not depend on player iteration order.

use crate::food::food_at;
use shared::{Cell, Food, Player, PlayerId, PowerupKind, Timestamp};
use std::collections::{HashMap, HashSet};

/// Where a moving player's head will be after this sub-tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProposedMove {
    pub player: PlayerId,
    pub head: Cell,
}

/// Computes which of the moving players die this sub-tick.
///
/// `moves` holds only players that actually move; frozen snakes are absent
/// from it but still block as bodies.
pub fn resolve(
    moves: &[ProposedMove],
    players: &HashMap<PlayerId, Player>,
    food: &[Food],
    grid_size: u32,
    now: Timestamp,
) -> HashSet<PlayerId> {
    let mut fatalities = head_to_head(moves, players, now);

    for proposal in moves {
        if fatalities.contains(&proposal.player) {
            continue;
        }
        if hits_wall_or_body(proposal, players, food, grid_size, now) {
            fatalities.insert(proposal.player);
        }
    }

    fatalities
}

fn is_invincible(players: &HashMap<PlayerId, Player>, id: PlayerId, now: Timestamp) -> bool {
    players
        .get(&id)
        .map_or(false, |p| p.has_effect(PowerupKind::Invincible, now))
}

/// Heads claiming the same cell. Invincible claimants survive and take every
/// other claimant down with them; without one, everybody on the cell dies.
fn head_to_head(
    moves: &[ProposedMove],
    players: &HashMap<PlayerId, Player>,
    now: Timestamp,
) -> HashSet<PlayerId> {
    let mut claims: HashMap<Cell, Vec<PlayerId>> = HashMap::new();
    for proposal in moves {
        claims.entry(proposal.head).or_default().push(proposal.player);
    }

    let mut fatalities = HashSet::new();
    for claimants in claims.values().filter(|ids| ids.len() > 1) {
        let any_invincible = claimants
            .iter()
            .any(|id| is_invincible(players, *id, now));

        for id in claimants {
            if !any_invincible || !is_invincible(players, *id, now) {
                fatalities.insert(*id);
            }
        }
    }

    fatalities
}

fn hits_wall_or_body(
    proposal: &ProposedMove,
    players: &HashMap<PlayerId, Player>,
    food: &[Food],
    grid_size: u32,
    now: Timestamp,
) -> bool {
    let Some(attacker) = players.get(&proposal.player) else {
        return false;
    };
    // Invincible snakes ignore walls and pass through every body.
    if attacker.has_effect(PowerupKind::Invincible, now) {
        return false;
    }

    if !proposal.head.in_bounds(grid_size) {
        return true;
    }

    let grows = food_at(proposal.head, food).map_or(false, |f| f.grow);
    players
        .values()
        .filter(|other| other.alive)
        .any(|other| body_blocks(other, proposal, grows))
}

fn body_blocks(snake: &Player, proposal: &ProposedMove, grows: bool) -> bool {
    if snake.id != proposal.player {
        return snake.occupies(proposal.head);
    }
    // Own tail moves out of the way this sub-tick unless the snake grows.
    if !grows && snake.tail() == proposal.head {
        return false;
    }
    // The pre-move head is never an obstacle to the next one.
    snake.body[1..].contains(&proposal.head)
}
