//! Food targets, spawning and consumption.

use crate::placement::find_free_cell;
use log::debug;
use rand::Rng;
use shared::{Cell, Food, FoodKind, FoodPolicy, Player, PlayerId, Powerup};
use std::collections::HashMap;

/// Number of food items a room keeps on the board. Never below one.
pub fn target_count(policy: FoodPolicy, player_count: usize) -> usize {
    let target = match policy {
        FoodPolicy::PerPlayer => player_count,
        FoodPolicy::HalfPlayerCount => player_count / 2,
        FoodPolicy::Fixed(k) => k as usize,
    };
    target.max(1)
}

/// 80% normal, 10% bonus score, 10% speed buff.
pub fn random_kind<R: Rng + ?Sized>(rng: &mut R) -> FoodKind {
    let roll: f64 = rng.gen();
    if roll < 0.8 {
        FoodKind::Normal
    } else if roll < 0.9 {
        FoodKind::BonusScore
    } else {
        FoodKind::SpeedBuff
    }
}

/// Tops `food` up to `target` items, keeping what is already there.
///
/// New items avoid every snake segment (dead snakes included), existing food
/// and on-board powerups. Stops early when the board is too crowded to place
/// another item. Returns how many items were added.
pub fn replenish<R: Rng + ?Sized>(
    rng: &mut R,
    grid_size: u32,
    food: &mut Vec<Food>,
    players: &HashMap<PlayerId, Player>,
    powerups: &[Powerup],
    target: usize,
) -> usize {
    let mut added = 0;

    while food.len() < target {
        let cell = {
            let existing: &[Food] = food;
            let on_snake = |c: Cell| players.values().any(|p| p.occupies(c));
            let on_food = |c: Cell| existing.iter().any(|f| f.position == c);
            let on_powerup = |c: Cell| powerups.iter().any(|p| p.position == c);
            find_free_cell(rng, grid_size, &[&on_snake, &on_food, &on_powerup])
        };

        match cell {
            Some(position) => {
                food.push(Food::new(position, random_kind(rng)));
                added += 1;
            }
            None => {
                debug!(
                    "Board too crowded for food: {} of {} placed",
                    food.len(),
                    target
                );
                break;
            }
        }
    }

    added
}

pub fn food_at(cell: Cell, food: &[Food]) -> Option<&Food> {
    food.iter().find(|f| f.position == cell)
}

/// Removes and returns the first food item sitting exactly on `head`.
pub fn consume(head: Cell, food: &mut Vec<Food>) -> Option<(usize, Food)> {
    let index = food.iter().position(|f| f.position == head)?;
    Some((index, food.remove(index)))
}
