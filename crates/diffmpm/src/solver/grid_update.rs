//! Grid velocity resolve, gravity, and boundary/friction handling.
//!
//! This is the only place contact policy is enforced. Side and top walls
//! zero out velocities that point into the wall; the floor applies a
//! Coulomb-style stick/slide response. The adjoint replays exactly the
//! branch the forward pass took for each cell.

use glam::DVec2;
use rayon::prelude::*;

use crate::config::SimConfig;
use crate::grid::GridState;

/// Guard for empty cells: momentum / (mass + EPS) instead of a division check.
const MASS_EPS: f64 = 1e-10;
/// Keeps the tangential norm away from zero in the friction ratio.
const TANGENT_EPS: f64 = 1e-10;

/// How the boundary operator transformed a cell velocity. Zeroing branches
/// absorb all gradient; the sliding branch has a nontrivial Jacobian.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Contact {
    Free,
    Stopped,
    Sliding,
}

#[inline]
fn resolve_boundary(cfg: &SimConfig, i: usize, j: usize, v_in: DVec2) -> (DVec2, Contact) {
    let n = cfg.n_grid;
    let bound = cfg.bound;
    let mut v = v_in;
    let mut contact = Contact::Free;

    if i < bound && v.x < 0.0 {
        v = DVec2::ZERO;
        contact = Contact::Stopped;
    }
    if i > n - bound && v.x > 0.0 {
        v = DVec2::ZERO;
        contact = Contact::Stopped;
    }
    if j < bound && v.y < 0.0 {
        // Floor contact with outward normal (0, 1). A negative coefficient
        // is the sentinel for a fully sticky floor.
        if cfg.friction < 0.0 {
            v = DVec2::ZERO;
            contact = Contact::Stopped;
        } else {
            let lin = v.y;
            let lit = v.x.abs() + TANGENT_EPS;
            if lit + cfg.friction * lin <= 0.0 {
                // Friction exceeds the available tangential speed: stick.
                v = DVec2::ZERO;
                contact = Contact::Stopped;
            } else {
                v = DVec2::new((1.0 + cfg.friction * lin / lit) * v.x, 0.0);
                contact = Contact::Sliding;
            }
        }
    }
    if j > n - bound && v.y > 0.0 {
        v = DVec2::ZERO;
        contact = Contact::Stopped;
    }
    (v, contact)
}

/// Boundary/friction operator for a single cell, as a pure function of the
/// post-gravity velocity. Idempotent: re-applying it to its own output is a
/// no-op for every cell.
#[inline]
pub fn apply_boundary(cfg: &SimConfig, i: usize, j: usize, v: DVec2) -> DVec2 {
    resolve_boundary(cfg, i, j, v).0
}

#[inline]
fn resolved_velocity(cfg: &SimConfig, momentum: DVec2, mass: f64) -> DVec2 {
    let inv_m = 1.0 / (mass + MASS_EPS);
    let mut v = momentum * inv_m;
    v.y -= cfg.dt * cfg.gravity;
    v
}

/// Resolve every cell's velocity from the accumulated momentum and mass,
/// apply gravity, then the boundary operator. Cells are independent.
pub fn grid_update(cfg: &SimConfig, grid: &mut GridState) {
    let n = cfg.n_grid;
    let GridState {
        momentum,
        mass,
        velocity,
        ..
    } = grid;
    velocity
        .par_iter_mut()
        .enumerate()
        .for_each(|(idx, out)| {
            let (i, j) = (idx / n, idx % n);
            let v = resolved_velocity(cfg, momentum[idx], mass[idx]);
            *out = apply_boundary(cfg, i, j, v);
        });
}

/// Adjoint of [`grid_update`]: pull the resolved-velocity gradients back to
/// the momentum and mass accumulators, through the branch each cell took.
pub fn grid_update_adjoint(cfg: &SimConfig, grid: &mut GridState) {
    let n = cfg.n_grid;
    let GridState {
        momentum,
        mass,
        grad_momentum,
        grad_mass,
        grad_velocity,
        ..
    } = grid;
    grad_momentum
        .par_iter_mut()
        .zip(grad_mass.par_iter_mut())
        .enumerate()
        .for_each(|(idx, (g_mom, g_mass))| {
            let (i, j) = (idx / n, idx % n);
            let v0 = resolved_velocity(cfg, momentum[idx], mass[idx]);
            let (_, contact) = resolve_boundary(cfg, i, j, v0);
            let upstream = grad_velocity[idx];
            let v0_bar = match contact {
                Contact::Free => upstream,
                Contact::Stopped => DVec2::ZERO,
                Contact::Sliding => {
                    // out.x = s * u with u = v0.x, lin = v0.y,
                    // lit = |u| + eps, s = 1 + friction * lin / lit.
                    let u = v0.x;
                    let lin = v0.y;
                    let lit = u.abs() + TANGENT_EPS;
                    let s = 1.0 + cfg.friction * lin / lit;
                    let dxdx = s - cfg.friction * lin * u.abs() / (lit * lit);
                    let dxdy = cfg.friction * u / lit;
                    DVec2::new(upstream.x * dxdx, upstream.x * dxdy)
                }
            };
            let inv_m = 1.0 / (mass[idx] + MASS_EPS);
            *g_mom += inv_m * v0_bar;
            *g_mass += -(inv_m * inv_m) * momentum[idx].dot(v0_bar);
        });
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn cfg() -> SimConfig {
        SimConfig::default()
    }

    #[test]
    fn interior_cells_pass_through() {
        let c = cfg();
        let v = DVec2::new(0.3, -0.7);
        assert_eq!(apply_boundary(&c, 64, 64, v), v);
    }

    #[test]
    fn walls_zero_inward_velocity_only() {
        let c = cfg();
        // Moving into the left wall: fully stopped.
        assert_eq!(apply_boundary(&c, 1, 60, DVec2::new(-1.0, 0.2)), DVec2::ZERO);
        // Moving away from it: untouched.
        let out = apply_boundary(&c, 1, 60, DVec2::new(1.0, 0.2));
        assert_eq!(out, DVec2::new(1.0, 0.2));
        // Top wall stops upward motion.
        assert_eq!(apply_boundary(&c, 60, 126, DVec2::new(0.4, 1.0)), DVec2::ZERO);
        // Right wall stops outward motion.
        assert_eq!(apply_boundary(&c, 126, 60, DVec2::new(1.0, 0.0)), DVec2::ZERO);
    }

    #[test]
    fn boundary_operator_is_idempotent() {
        let c = cfg();
        let velocities = [
            DVec2::new(-1.0, 0.3),
            DVec2::new(0.5, -0.8),
            DVec2::new(0.0, 0.0),
            DVec2::new(1.2, 1.2),
            DVec2::new(-0.1, -0.1),
        ];
        for i in [0, 2, 64, 126] {
            for j in [0, 2, 64, 126] {
                for v in velocities {
                    let once = apply_boundary(&c, i, j, v);
                    let twice = apply_boundary(&c, i, j, once);
                    assert_eq!(once, twice, "not idempotent at ({i}, {j}) for {v:?}");
                }
            }
        }
    }

    #[test]
    fn floor_slides_with_reduced_tangential_speed() {
        let c = cfg();
        // lin = -0.5, lit = 1.0: scale = 1 + 0.5 * (-0.5) = 0.75
        let out = apply_boundary(&c, 64, 1, DVec2::new(1.0, -0.5));
        assert_relative_eq!(out.x, 0.75, epsilon = 1e-9);
        assert_eq!(out.y, 0.0);
    }

    #[test]
    fn floor_sticks_when_friction_wins() {
        let c = cfg();
        // lit = 0.1, friction * lin = -0.25: sticks.
        assert_eq!(apply_boundary(&c, 64, 1, DVec2::new(0.1, -0.5)), DVec2::ZERO);
    }

    #[test]
    fn negative_friction_sentinel_is_fully_inelastic() {
        let c = SimConfig {
            friction: -1.0,
            ..SimConfig::default()
        };
        assert_eq!(apply_boundary(&c, 64, 0, DVec2::new(2.0, -0.01)), DVec2::ZERO);
    }

    #[test]
    fn zero_friction_slides_unimpeded() {
        let c = SimConfig {
            friction: 0.0,
            ..SimConfig::default()
        };
        let out = apply_boundary(&c, 64, 1, DVec2::new(0.8, -0.3));
        assert_relative_eq!(out.x, 0.8, epsilon = 1e-12);
        assert_eq!(out.y, 0.0);
    }

    #[test]
    fn sliding_adjoint_matches_finite_difference() {
        let c = cfg();
        let mut grid = GridState::new(c.n_grid);
        let idx = grid.idx(64, 1);
        grid.mass[idx] = 2.0;
        grid.momentum[idx] = DVec2::new(2.0, -1.0);
        grid.grad_velocity[idx] = DVec2::new(1.0, 0.0);
        grid_update(&c, &mut grid);
        grid_update_adjoint(&c, &mut grid);

        let h = 1e-7;
        let probe = |mom: DVec2, mass: f64| {
            let v = resolved_velocity(&c, mom, mass);
            apply_boundary(&c, 64, 1, v).x
        };
        let base_mom = DVec2::new(2.0, -1.0);
        let fd_x = (probe(base_mom + DVec2::new(h, 0.0), 2.0)
            - probe(base_mom - DVec2::new(h, 0.0), 2.0))
            / (2.0 * h);
        let fd_y = (probe(base_mom + DVec2::new(0.0, h), 2.0)
            - probe(base_mom - DVec2::new(0.0, h), 2.0))
            / (2.0 * h);
        let fd_m = (probe(base_mom, 2.0 + h) - probe(base_mom, 2.0 - h)) / (2.0 * h);
        assert_relative_eq!(grid.grad_momentum[idx].x, fd_x, epsilon = 1e-6);
        assert_relative_eq!(grid.grad_momentum[idx].y, fd_y, epsilon = 1e-6);
        assert_relative_eq!(grid.grad_mass[idx], fd_m, epsilon = 1e-6);
    }
}
