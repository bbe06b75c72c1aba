//! One scheduled simulation step of a room.
//!
//! A tick runs a primary sub-tick for every player and, for players holding
//! an active speed boost, a bonus sub-tick afterwards. Each sub-tick
//! proposes heads, resolves collisions on the untouched board, then applies
//! deaths, movement, food and (primary only) powerups. The match ends as soon
//! as one living player or fewer remain, or the scheduled end time passes.

use crate::collision::{self, ProposedMove};
use crate::food;
use crate::game::Room;
use crate::powerup;
use crate::utils::get_timestamp;
use log::{debug, info};
use shared::{Phase, PlayerId, PowerupKind, Timestamp};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickOutcome {
    pub match_ended: bool,
    /// Players killed during this tick, in the order they were processed.
    pub died: Vec<PlayerId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SubTick {
    Primary,
    Bonus,
}

/// Advances `room` by one tick using the wall clock.
pub fn advance(room: &mut Room) -> TickOutcome {
    advance_at(room, get_timestamp())
}

/// Advances `room` by one tick at time `now`. Rooms that are not playing
/// are left untouched.
pub fn advance_at(room: &mut Room, now: Timestamp) -> TickOutcome {
    let mut outcome = TickOutcome::default();
    match room.phase {
        Phase::Waiting => return outcome,
        Phase::Ended => {
            outcome.match_ended = true;
            return outcome;
        }
        Phase::Playing => {}
    }

    room.tick += 1;

    let mut everyone: Vec<PlayerId> = room.players.keys().copied().collect();
    everyone.sort_unstable();
    let boosted: Vec<PlayerId> = everyone
        .iter()
        .copied()
        .filter(|id| {
            room.players
                .get(id)
                .map_or(false, |p| p.alive && p.has_effect(PowerupKind::SpeedBoost, now))
        })
        .collect();

    run_sub_tick(room, &everyone, SubTick::Primary, now, &mut outcome.died);
    if check_match_end(room, now) {
        outcome.match_ended = true;
        return outcome;
    }

    if !boosted.is_empty() {
        run_sub_tick(room, &boosted, SubTick::Bonus, now, &mut outcome.died);
        if check_match_end(room, now) {
            outcome.match_ended = true;
        }
    }

    outcome
}

/// Heads for every eligible, living, unfrozen player. Ids that no longer
/// resolve to a player are skipped.
fn propose_moves(room: &Room, eligible: &[PlayerId], now: Timestamp) -> Vec<ProposedMove> {
    let grid_size = room.config.grid_size;
    eligible
        .iter()
        .filter_map(|id| room.players.get(id))
        .filter(|player| player.alive && !player.is_frozen(now))
        .map(|player| {
            let raw = player.head().step(player.heading);
            let wraps = room.config.wrap || player.has_effect(PowerupKind::Invincible, now);
            ProposedMove {
                player: player.id,
                head: if wraps { raw.wrapped(grid_size) } else { raw },
            }
        })
        .collect()
}

fn run_sub_tick(
    room: &mut Room,
    eligible: &[PlayerId],
    pass: SubTick,
    now: Timestamp,
    died: &mut Vec<PlayerId>,
) {
    let moves = propose_moves(room, eligible, now);
    let fatalities = collision::resolve(
        &moves,
        &room.players,
        &room.food,
        room.config.grid_size,
        now,
    );

    let mut ate_food = false;
    for proposal in &moves {
        let Some(player) = room.players.get_mut(&proposal.player) else {
            continue;
        };

        if fatalities.contains(&proposal.player) {
            player.alive = false;
            died.push(player.id);
            debug!(
                "Room {}: player {} died moving to {}",
                room.code, player.id, proposal.head
            );
            continue;
        }

        player.body.insert(0, proposal.head);
        match food::consume(proposal.head, &mut room.food) {
            Some((_, eaten)) => {
                let multiplier = if player.has_effect(PowerupKind::Multiplier, now) {
                    2
                } else {
                    1
                };
                player.score += eaten.score * multiplier;
                if !eaten.grow {
                    player.body.pop();
                }
                ate_food = true;
            }
            None => {
                player.body.pop();
            }
        }

        if pass == SubTick::Primary {
            if let Some(collected) = room.powerups.collect(proposal.head) {
                info!(
                    "Room {}: player {} collected {}",
                    room.code,
                    proposal.player,
                    collected.kind
                );
                powerup::apply_collected(&mut room.players, proposal.player, collected.kind, now);
            }
        }
    }

    // Refill after every move has landed so fresh food never appears under a
    // head that was resolved against the old board. A crowded board may leave
    // the count short; the next sub-tick tries again.
    if room.food.len() < room.food_target() {
        room.replenish_food();
    }

    if pass == SubTick::Primary {
        if ate_food {
            room.powerups.try_spawn(
                &mut room.rng,
                &room.config.powerups,
                room.config.grid_size,
                &room.players,
                &room.food,
                now,
            );
        }
        powerup::sweep_expired(&mut room.players, now);
    }
}

fn check_match_end(room: &mut Room, now: Timestamp) -> bool {
    let out_of_time = room.ends_at.map_or(false, |end| now >= end);
    if room.living_count() <= 1 || out_of_time {
        room.end(now);
        return true;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PowerupConfig, RoomConfig};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use shared::{Cell, Direction, Effect, Food, FoodKind, FoodPolicy, Player, Powerup};

    const N: u32 = 10;
    const PARKED_FOOD: Cell = Cell::new(7, 5);

    fn quiet_config() -> RoomConfig {
        RoomConfig {
            grid_size: N,
            powerups: PowerupConfig {
                spawn_chance: 0.0,
                ..PowerupConfig::default()
            },
            ..RoomConfig::default()
        }
    }

    /// Two snakes far apart on row 1 and row 8, both heading right. The
    /// single food item sits at (7, 5), off every path the tests drive.
    fn playing_room() -> Room {
        let mut room = Room::with_rng(
            "TEST".to_string(),
            quiet_config(),
            1,
            "one".to_string(),
            StdRng::seed_from_u64(42),
        );
        room.add_player(2, "two".to_string()).unwrap();
        room.start(0).unwrap();
        place(&mut room, 1, &[(4, 1), (3, 1), (2, 1)], Direction::Right);
        place(&mut room, 2, &[(4, 8), (3, 8), (2, 8)], Direction::Right);
        room.food = vec![Food::new(PARKED_FOOD, FoodKind::Normal)];
        room
    }

    fn place(room: &mut Room, id: PlayerId, body: &[(i32, i32)], heading: Direction) {
        let player = room.players.get_mut(&id).unwrap();
        player.body = body.iter().map(|&(x, y)| Cell::new(x, y)).collect();
        player.heading = heading;
    }

    fn give(room: &mut Room, id: PlayerId, kind: PowerupKind, expires_at: Timestamp) {
        room.players.get_mut(&id).unwrap().effects.push(Effect { kind, expires_at });
    }

    #[test]
    fn test_waiting_room_is_untouched() {
        let mut room = Room::new("WAIT".to_string(), quiet_config(), 1, "one".to_string());
        let before = room.players[&1].body.clone();

        let outcome = advance_at(&mut room, 100);

        assert!(!outcome.match_ended);
        assert_eq!(room.tick, 0);
        assert_eq!(room.players[&1].body, before);
    }

    #[test]
    fn test_ended_room_reports_ended() {
        let mut room = playing_room();
        room.end(10);
        let outcome = advance_at(&mut room, 20);
        assert!(outcome.match_ended);
        assert_eq!(room.phase, Phase::Ended);
    }

    #[test]
    fn test_plain_move_keeps_length() {
        let mut room = playing_room();
        let outcome = advance_at(&mut room, 125);

        assert!(!outcome.match_ended);
        assert!(outcome.died.is_empty());
        let player = &room.players[&1];
        assert_eq!(player.body, vec![Cell::new(5, 1), Cell::new(4, 1), Cell::new(3, 1)]);
        assert_eq!(room.tick, 1);
    }

    #[test]
    fn test_move_wraps_at_edge() {
        let mut room = playing_room();
        place(&mut room, 1, &[(9, 1), (8, 1), (7, 1)], Direction::Right);
        place(&mut room, 2, &[(4, 0), (4, 1), (4, 2)], Direction::Up);

        advance_at(&mut room, 125);

        assert_eq!(room.players[&1].head(), Cell::new(0, 1));
        assert_eq!(room.players[&2].head(), Cell::new(4, 9));
    }

    #[test]
    fn test_move_off_board_kills_without_wrap() {
        let mut room = playing_room();
        room.config.wrap = false;
        add_snake(&mut room, 3, &[(5, 5), (5, 6)], Direction::Up);
        place(&mut room, 1, &[(9, 1), (8, 1), (7, 1)], Direction::Right);

        let outcome = advance_at(&mut room, 125);

        assert_eq!(outcome.died, vec![1]);
        assert!(!room.players[&1].alive);
        assert_eq!(room.players[&1].head(), Cell::new(9, 1));
    }

    #[test]
    fn test_eating_grow_food() {
        let mut room = playing_room();
        room.food.push(Food::new(Cell::new(5, 1), FoodKind::Normal));

        advance_at(&mut room, 125);

        let player = &room.players[&1];
        assert_eq!(player.length(), 4);
        assert_eq!(player.score, 1);
        assert_eq!(room.food.len(), room.food_target());
        assert!(room.food.iter().all(|f| f.position != Cell::new(5, 1)));
    }

    #[test]
    fn test_empty_board_is_restocked() {
        let mut room = playing_room();
        room.food.clear();

        let outcome = advance_at(&mut room, 125);

        assert!(outcome.died.is_empty());
        assert_eq!(room.players[&1].score, 0);
        assert_eq!(room.food.len(), room.food_target());
    }

    #[test]
    fn test_food_held_at_target_every_tick() {
        let mut room = playing_room();
        room.config.food_policy = FoodPolicy::Fixed(3);
        room.food.clear();

        for tick in 1..=5 {
            advance_at(&mut room, tick * 125);
            assert_eq!(room.food.len(), 3, "tick {}", tick);
        }
    }

    #[test]
    fn test_eating_speed_buff_does_not_grow() {
        let mut room = playing_room();
        room.food.push(Food::new(Cell::new(5, 1), FoodKind::SpeedBuff));

        advance_at(&mut room, 125);

        let player = &room.players[&1];
        assert_eq!(player.length(), 3);
        assert_eq!(player.score, 1);
    }

    #[test]
    fn test_multiplier_doubles_food_score() {
        let mut room = playing_room();
        give(&mut room, 1, PowerupKind::Multiplier, 10_000);
        room.food.push(Food::new(Cell::new(5, 1), FoodKind::BonusScore));

        advance_at(&mut room, 125);

        assert_eq!(room.players[&1].score, 4);
    }

    #[test]
    fn test_frozen_player_stays_put_and_blocks() {
        let mut room = playing_room();
        room.players.get_mut(&2).unwrap().frozen_until = Some(1_000);
        place(&mut room, 1, &[(4, 7), (3, 7), (2, 7)], Direction::Down);
        place(&mut room, 2, &[(4, 8), (5, 8), (6, 8)], Direction::Left);
        add_snake(&mut room, 3, &[(0, 0), (0, 1)], Direction::Right);

        let outcome = advance_at(&mut room, 125);

        assert_eq!(outcome.died, vec![1]);
        assert_eq!(room.players[&2].head(), Cell::new(4, 8));
        assert!(room.players[&2].alive);
    }

    #[test]
    fn test_freeze_thaws_after_expiry() {
        let mut room = playing_room();
        room.players.get_mut(&2).unwrap().frozen_until = Some(250);

        advance_at(&mut room, 125);
        assert_eq!(room.players[&2].head(), Cell::new(4, 8));

        advance_at(&mut room, 250);
        assert_eq!(room.players[&2].frozen_until, None);
        assert_eq!(room.players[&2].head(), Cell::new(5, 8));
    }

    #[test]
    fn test_collecting_freeze_stops_others() {
        let mut room = playing_room();
        room.powerups.active.push(Powerup {
            kind: PowerupKind::Freeze,
            position: Cell::new(5, 1),
            spawned_at: 0,
        });

        advance_at(&mut room, 125);

        assert!(room.powerups.active.is_empty());
        assert_eq!(room.players[&2].frozen_until, Some(4_125));
        assert_eq!(room.players[&1].frozen_until, None);

        advance_at(&mut room, 250);
        assert_eq!(room.players[&2].head(), Cell::new(5, 8));
        assert_eq!(room.players[&1].head(), Cell::new(6, 1));
    }

    #[test]
    fn test_speed_boost_moves_twice() {
        let mut room = playing_room();
        give(&mut room, 1, PowerupKind::SpeedBoost, 10_000);

        advance_at(&mut room, 125);

        assert_eq!(room.players[&1].head(), Cell::new(6, 1));
        assert_eq!(room.players[&1].length(), 3);
        assert_eq!(room.players[&2].head(), Cell::new(5, 8));
    }

    #[test]
    fn test_bonus_sub_tick_skips_powerup_collection() {
        let mut room = playing_room();
        give(&mut room, 1, PowerupKind::SpeedBoost, 10_000);
        room.powerups.active.push(Powerup {
            kind: PowerupKind::Multiplier,
            position: Cell::new(6, 1),
            spawned_at: 0,
        });

        advance_at(&mut room, 125);

        assert_eq!(room.players[&1].head(), Cell::new(6, 1));
        assert_eq!(room.powerups.active.len(), 1);
        assert!(!room.players[&1].has_effect(PowerupKind::Multiplier, 125));
    }

    #[test]
    fn test_time_limit_ends_match() {
        let mut room = playing_room();
        let end = room.ends_at.unwrap();

        assert!(!advance_at(&mut room, end - 1).match_ended);
        let outcome = advance_at(&mut room, end);

        assert!(outcome.match_ended);
        assert_eq!(room.phase, Phase::Ended);
        assert_eq!(room.ended_at, Some(end));
    }

    #[test]
    fn test_game_over_skips_bonus_sub_tick() {
        let mut room = playing_room();
        give(&mut room, 2, PowerupKind::SpeedBoost, 10_000);
        // Player 1 runs into player 2's body on the primary sub-tick.
        place(&mut room, 1, &[(3, 7), (3, 6), (3, 5)], Direction::Down);

        let outcome = advance_at(&mut room, 125);

        assert!(outcome.match_ended);
        assert_eq!(outcome.died, vec![1]);
        assert_eq!(room.players[&2].head(), Cell::new(5, 8));
    }

    #[test]
    fn test_removed_player_leaves_the_tick() {
        let mut room = playing_room();
        add_snake(&mut room, 3, &[(0, 5), (0, 6)], Direction::Up);
        room.remove_player(2);

        let outcome = advance_at(&mut room, 125);

        assert!(!outcome.match_ended);
        assert_eq!(room.players.len(), 2);
    }

    fn add_snake(room: &mut Room, id: PlayerId, body: &[(i32, i32)], heading: Direction) {
        let mut player = Player::new(
            id,
            format!("p{}", id),
            "#ef4444".to_string(),
            Cell::new(body[0].0, body[0].1),
            heading,
            1,
            room.config.grid_size,
        );
        player.body = body.iter().map(|&(x, y)| Cell::new(x, y)).collect();
        room.players.insert(id, player);
    }
}
