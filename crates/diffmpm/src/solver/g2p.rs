//! Grid-to-Particle transfer: velocity gather, APIC affine reconstruction,
//! explicit Euler advection - plus its adjoint.
//!
//! The gather is a pure read of the resolved grid velocities, so the forward
//! pass runs per-particle on rayon. The adjoint scatters into shared grid
//! gradient cells and stays sequential.

use glam::{DMat2, DVec2};
use rayon::prelude::*;

use crate::config::SimConfig;
use crate::grid::GridState;
use crate::kernels::{base_and_frac, bspline_weight_derivatives, bspline_weights, outer_product};
use crate::particle::ParticleTrajectory;

/// Forward G2P for time step `step`: fills velocity, affine matrix and
/// position at step `step + 1` from the resolved grid velocities.
pub fn grid_to_particles(
    cfg: &SimConfig,
    step: usize,
    traj: &mut ParticleTrajectory,
    grid: &GridState,
) {
    let n = traj.n_particles();
    let inv_dx = cfg.inv_dx();
    let apic_scale = 4.0 * inv_dx;
    let dt = cfg.dt;
    let row = step * n;
    let split = (step + 1) * n;

    let (pos_cur, pos_next) = traj.pos.split_at_mut(split);
    let pos_cur = &pos_cur[row..];
    let (_, vel_next) = traj.vel.split_at_mut(split);
    let (_, aff_next) = traj.affine.split_at_mut(split);

    pos_next[..n]
        .par_iter_mut()
        .zip(vel_next[..n].par_iter_mut())
        .zip(aff_next[..n].par_iter_mut())
        .enumerate()
        .for_each(|(p, ((x_next, v_next), c_next))| {
            let x = pos_cur[p];
            let (base, fx) = base_and_frac(x, inv_dx);
            let w = bspline_weights(fx);

            let mut new_v = DVec2::ZERO;
            let mut new_c = DMat2::ZERO;
            for i in 0..3 {
                for j in 0..3 {
                    let dpos = DVec2::new(i as f64, j as f64) - fx;
                    let cell = grid.idx((base.x + i as i32) as usize, (base.y + j as i32) as usize);
                    let g_v = grid.velocity[cell];
                    let weight = w[i].x * w[j].y;
                    new_v += weight * g_v;
                    new_c += apic_scale * weight * outer_product(g_v, dpos);
                }
            }
            *v_next = new_v;
            *x_next = x + dt * new_v;
            *c_next = new_c;
        });
}

/// Adjoint of [`grid_to_particles`].
///
/// Consumes the step `step + 1` position/velocity/affine gradients, scatters
/// velocity gradients into the grid, and accumulates position gradients at
/// step `step` (both through the advection term and through the weights).
pub fn g2p_adjoint(cfg: &SimConfig, step: usize, traj: &mut ParticleTrajectory, grid: &mut GridState) {
    let n = traj.n_particles();
    let inv_dx = cfg.inv_dx();
    let apic_scale = 4.0 * inv_dx;
    let dt = cfg.dt;

    for p in 0..n {
        let idx = traj.idx(step, p);
        let idx_next = traj.idx(step + 1, p);
        let x = traj.pos[idx];
        let (base, fx) = base_and_frac(x, inv_dx);
        let w = bspline_weights(fx);
        let dw = bspline_weight_derivatives(fx);

        let gx_next = traj.grad_pos[idx_next];
        let gv_next = traj.grad_vel[idx_next];
        let gc_next = traj.grad_affine[idx_next];

        // x[f+1] = x[f] + dt v[f+1]: the position gradient flows both into
        // the previous position and into the gathered velocity.
        let new_v_bar = gv_next + dt * gx_next;
        let mut fx_bar = DVec2::ZERO;
        for i in 0..3 {
            for j in 0..3 {
                let dpos = DVec2::new(i as f64, j as f64) - fx;
                let cell = grid.idx((base.x + i as i32) as usize, (base.y + j as i32) as usize);
                let g_v = grid.velocity[cell];
                let weight = w[i].x * w[j].y;

                grid.grad_velocity[cell] +=
                    weight * new_v_bar + apic_scale * weight * (gc_next * dpos);
                let weight_bar = new_v_bar.dot(g_v) + apic_scale * g_v.dot(gc_next * dpos);
                let dpos_bar = apic_scale * weight * (gc_next.transpose() * g_v);
                fx_bar -= dpos_bar;
                fx_bar.x += weight_bar * dw[i].x * w[j].y;
                fx_bar.y += weight_bar * w[i].x * dw[j].y;
            }
        }
        traj.grad_pos[idx] += gx_next + inv_dx * fx_bar;
    }
}
