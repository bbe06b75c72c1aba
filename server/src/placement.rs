//! Random free-cell search shared by food and powerup spawning.

use log::debug;
use rand::Rng;
use shared::Cell;

pub const MAX_PLACEMENT_ATTEMPTS: usize = 100;

/// Samples uniformly random cells until one is rejected by none of the
/// `occupied` predicates.
///
/// Returns `None` after `MAX_PLACEMENT_ATTEMPTS` misses; callers skip the
/// spawn and try again on a later tick.
pub fn find_free_cell<R: Rng + ?Sized>(
    rng: &mut R,
    grid_size: u32,
    occupied: &[&dyn Fn(Cell) -> bool],
) -> Option<Cell> {
    for _ in 0..MAX_PLACEMENT_ATTEMPTS {
        let cell = random_cell(rng, grid_size);
        if !occupied.iter().any(|is_occupied| is_occupied(cell)) {
            return Some(cell);
        }
    }

    debug!(
        "No free cell found on {}x{} board after {} attempts",
        grid_size, grid_size, MAX_PLACEMENT_ATTEMPTS
    );
    None
}

pub fn random_cell<R: Rng + ?Sized>(rng: &mut R, grid_size: u32) -> Cell {
    let n = grid_size.max(1) as i32;
    Cell::new(rng.gen_range(0..n), rng.gen_range(0..n))
}
