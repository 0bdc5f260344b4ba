//! Scratch grid for one simulation step.
//!
//! The grid is double-buffered: P2G scatters into the momentum/mass
//! accumulators, the grid update resolves them into the velocity buffer that
//! G2P reads. It carries no history - every step starts from a full clear,
//! and the backward sweep additionally clears the gradient mirrors before
//! re-populating the step's grid state.

use glam::DVec2;

/// Dense per-cell state for an `n_grid x n_grid` lattice, flat-indexed as
/// `i * n_grid + j`. Pre-allocated once; `clear` is a fill, not a realloc.
pub struct GridState {
    n_grid: usize,
    /// Accumulated momentum (input side of the step).
    pub momentum: Vec<DVec2>,
    /// Accumulated mass (input side of the step).
    pub mass: Vec<f64>,
    /// Resolved velocity after the grid update (output side).
    pub velocity: Vec<DVec2>,
    /// Gradient of the loss w.r.t. the momentum accumulator.
    pub grad_momentum: Vec<DVec2>,
    /// Gradient of the loss w.r.t. the mass accumulator.
    pub grad_mass: Vec<f64>,
    /// Gradient of the loss w.r.t. the resolved velocity.
    pub grad_velocity: Vec<DVec2>,
}

impl GridState {
    pub fn new(n_grid: usize) -> Self {
        let cells = n_grid * n_grid;
        Self {
            n_grid,
            momentum: vec![DVec2::ZERO; cells],
            mass: vec![0.0; cells],
            velocity: vec![DVec2::ZERO; cells],
            grad_momentum: vec![DVec2::ZERO; cells],
            grad_mass: vec![0.0; cells],
            grad_velocity: vec![DVec2::ZERO; cells],
        }
    }

    #[inline]
    pub fn n_grid(&self) -> usize {
        self.n_grid
    }

    #[inline]
    pub fn idx(&self, i: usize, j: usize) -> usize {
        debug_assert!(i < self.n_grid && j < self.n_grid);
        i * self.n_grid + j
    }

    /// Reset the value buffers. Must run at the start of every forward step:
    /// no step may observe a previous step's residue.
    pub fn clear(&mut self) {
        self.momentum.fill(DVec2::ZERO);
        self.mass.fill(0.0);
        self.velocity.fill(DVec2::ZERO);
    }

    /// Reset the gradient buffers. The backward sweep calls this alongside
    /// [`GridState::clear`] before recomputing each step's grid state.
    pub fn clear_gradients(&mut self) {
        self.grad_momentum.fill(DVec2::ZERO);
        self.grad_mass.fill(0.0);
        self.grad_velocity.fill(DVec2::ZERO);
    }

    /// Total accumulated mass. P2G conserves mass exactly, so after a
    /// transfer this equals the summed particle masses.
    pub fn total_mass(&self) -> f64 {
        self.mass.iter().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clear_resets_values_but_not_gradients() {
        let mut grid = GridState::new(4);
        let idx = grid.idx(1, 2);
        grid.mass[idx] = 2.0;
        grid.momentum[idx] = DVec2::new(1.0, -1.0);
        grid.grad_mass[idx] = 0.5;
        grid.clear();
        assert_eq!(grid.mass[idx], 0.0);
        assert_eq!(grid.momentum[idx], DVec2::ZERO);
        assert_eq!(grid.grad_mass[idx], 0.5);
        grid.clear_gradients();
        assert_eq!(grid.grad_mass[idx], 0.0);
    }
}
