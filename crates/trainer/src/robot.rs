//! Robot morphology: a cell matrix stamped into the scene as solid blocks.
//!
//! Each cell holds an actuator id, the passive marker, or the empty marker
//! (any value >= the actuator count). The mutation operator reassigns cells
//! to a neighboring cell's value, which keeps mutated bodies mostly
//! contiguous instead of scattering disconnected blocks.

use diffmpm::scene::UNACTUATED;
use diffmpm::{ParticleKind, Scene};
use rand::Rng;

pub const ROWS: usize = 10;
pub const COLS: usize = 20;
pub const NUM_ACTUATORS: usize = 2;

/// Cell matrix, row 0 on top. Values below the actuator count are placed
/// cells ([`UNACTUATED`] or an actuator id); anything else is empty space.
pub type Layout = [[i32; COLS]; ROWS];

const EMPTY: i32 = NUM_ACTUATORS as i32;

/// Hand-tuned starting morphology: a wedge-shaped crawler with two muscle
/// groups and a passive interior cavity.
pub fn seed_layout() -> Layout {
    [
        [2, 2, 2, 2, -1, -1, -1, -1, -1, -1, -1, 2, -1, -1, 2, 2, 2, 2, 2, 0],
        [2, 2, 2, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, 2, 2, 0, 0, 0],
        [2, 2, 2, 2, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, 2, 2, 0, 0, 0, 0],
        [2, 2, 2, 1, -1, -1, -1, -1, -1, -1, -1, -1, -1, 2, 2, 0, 0, 0, 0, 0],
        [2, 2, 1, 1, 1, 1, -1, -1, -1, -1, -1, -1, 2, 2, 0, 0, 0, 0, 0, 0],
        [2, 1, 1, 1, 1, 1, 1, -1, -1, -1, -1, -1, 2, 0, 0, 0, 0, 0, 0, 0],
        [2, 1, 1, 1, 1, 1, 1, 1, -1, -1, 1, 1, 0, 0, 0, 0, 0, 0, 0, 0],
        [1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0],
        [1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0],
        [1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 2, 1, 0, 0, 0, 0, 0, 0, 0, 0],
    ]
}

/// Reassign each cell, with probability `rate`, to the value of one of its
/// four neighbors (off-grid neighbors count as empty). Cells already equal
/// to every candidate are left alone. Mutations are applied in place, so a
/// change can feed the candidates of cells visited later in the sweep.
pub fn mutate(layout: &mut Layout, rate: f64, rng: &mut impl Rng) {
    for row in 0..ROWS {
        for col in 0..COLS {
            if rng.gen::<f64>() >= rate {
                continue;
            }
            let current = layout[row][col];
            let neighbors = [
                if row + 1 < ROWS { layout[row + 1][col] } else { EMPTY },
                if row > 0 { layout[row - 1][col] } else { EMPTY },
                if col + 1 < COLS { layout[row][col + 1] } else { EMPTY },
                if col > 0 { layout[row][col - 1] } else { EMPTY },
            ];
            let candidates: Vec<i32> =
                neighbors.iter().copied().filter(|&v| v != current).collect();
            if !candidates.is_empty() {
                layout[row][col] = candidates[rng.gen_range(0..candidates.len())];
            }
        }
    }
}

/// Number of placed (non-empty) cells.
pub fn placed_cells(layout: &Layout) -> usize {
    layout
        .iter()
        .flatten()
        .filter(|&&v| v < NUM_ACTUATORS as i32)
        .count()
}

/// Stamp the layout into the scene as `unit x unit` solid blocks, anchored
/// at `(x, y)` with row 0 on top.
pub fn build(scene: &mut Scene, layout: &Layout, x: f64, y: f64, unit: f64) {
    for (row, cells) in layout.iter().enumerate() {
        let row_y = y - row as f64 * unit;
        for (col, &value) in cells.iter().enumerate() {
            if value < NUM_ACTUATORS as i32 {
                let actuator = if value < 0 { UNACTUATED } else { value };
                scene.add_rect(
                    x + col as f64 * unit,
                    row_y,
                    unit,
                    unit,
                    actuator,
                    ParticleKind::Solid,
                );
            }
        }
    }
    scene.set_n_actuators(NUM_ACTUATORS);
}
