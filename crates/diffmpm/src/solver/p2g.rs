//! Particle-to-Grid transfer: deformation update, constitutive stress,
//! actuation stress, and the 3x3 momentum/mass scatter - plus its adjoint.
//!
//! The scatter is sequential over particles. Multiple particles accumulate
//! into shared cells and addition is commutative, but a fixed summation
//! order keeps the whole rollout bit-reproducible.

use glam::{DMat2, DVec2};

use crate::config::SimConfig;
use crate::error::SimError;
use crate::grid::GridState;
use crate::kernels::{
    apic_d_inverse, base_and_frac, bspline_weight_derivatives, bspline_weights, frobenius_dot,
    outer_product, polar_rotation, polar_rotation_adjoint,
};
use crate::particle::{ParticleKind, ParticleTrajectory};
use crate::scene::UNACTUATED;

/// Deterministic per-particle quantities recomputed identically by the
/// forward pass and the adjoint.
struct P2gLocals {
    base: glam::IVec2,
    fx: DVec2,
    f_pre: DMat2,
    j_det: f64,
    new_f: DMat2,
    act: f64,
    affine: DMat2,
    mass: f64,
}

#[inline]
fn actuation_matrix(act: f64) -> DMat2 {
    // Anisotropic stress along the particle's local y axis.
    DMat2::from_cols(DVec2::ZERO, DVec2::new(0.0, act))
}

#[inline]
fn stress_scale(cfg: &SimConfig) -> f64 {
    -(cfg.dt * cfg.particle_volume * apic_d_inverse(cfg.dx()))
}

fn compute_locals(
    cfg: &SimConfig,
    step: usize,
    p: usize,
    kind: ParticleKind,
    actuator_id: i32,
    activations: &[f64],
    traj: &ParticleTrajectory,
) -> Result<P2gLocals, SimError> {
    let idx = traj.idx(step, p);
    let x = traj.pos[idx];
    let c = traj.affine[idx];
    let f_old = traj.def_grad[idx];

    if !x.is_finite() {
        return Err(SimError::NumericDivergence {
            step,
            what: "non-finite particle position",
        });
    }
    let (base, fx) = base_and_frac(x, cfg.inv_dx());
    if base.x < 0 || base.y < 0 || base.x + 2 >= cfg.n_grid as i32 || base.y + 2 >= cfg.n_grid as i32
    {
        return Err(SimError::NumericDivergence {
            step,
            what: "particle left the simulation domain",
        });
    }

    let f_pre = (DMat2::IDENTITY + cfg.dt * c) * f_old;
    let j_det = f_pre.determinant();
    if !(j_det > 0.0 && j_det.is_finite()) {
        return Err(SimError::NumericDivergence {
            step,
            what: "non-positive deformation-gradient determinant",
        });
    }

    // The fluid surrogate keeps only the volume change: shear is discarded
    // by rescaling F to sqrt(J) I.
    let new_f = match kind {
        ParticleKind::Fluid => DMat2::from_diagonal(DVec2::splat(j_det.sqrt())),
        ParticleKind::Solid => f_pre,
    };

    let act = if actuator_id == UNACTUATED {
        0.0
    } else {
        activations[actuator_id as usize] * cfg.act_strength
    };

    let mut cauchy = match kind {
        ParticleKind::Fluid => {
            DMat2::from_diagonal(DVec2::new(1.0, 0.1)) * ((j_det - 1.0) * cfg.youngs_modulus)
        }
        ParticleKind::Solid => {
            let r = polar_rotation(new_f);
            2.0 * cfg.mu * (new_f - r) * new_f.transpose()
                + DMat2::from_diagonal(DVec2::splat(cfg.lambda * (j_det - 1.0) * j_det))
        }
    };
    cauchy += new_f * actuation_matrix(act) * new_f.transpose();

    let mass = kind.mass();
    let affine = stress_scale(cfg) * cauchy + mass * c;

    Ok(P2gLocals {
        base,
        fx,
        f_pre,
        j_det,
        new_f,
        act,
        affine,
        mass,
    })
}

/// Forward P2G for time step `step`.
///
/// Writes the updated deformation gradients into step `step + 1` and
/// scatters mass and momentum into the grid accumulators. Fails the rollout
/// on numerical divergence instead of clamping.
pub fn particles_to_grid(
    cfg: &SimConfig,
    step: usize,
    kinds: &[ParticleKind],
    actuator_ids: &[i32],
    activations: &[f64],
    traj: &mut ParticleTrajectory,
    grid: &mut GridState,
) -> Result<(), SimError> {
    let dx = cfg.dx();
    for p in 0..traj.n_particles() {
        let locals = compute_locals(cfg, step, p, kinds[p], actuator_ids[p], activations, traj)?;
        let idx_next = traj.idx(step + 1, p);
        traj.def_grad[idx_next] = locals.new_f;

        let v = traj.vel[traj.idx(step, p)];
        let w = bspline_weights(locals.fx);
        for i in 0..3 {
            for j in 0..3 {
                let offset = DVec2::new(i as f64, j as f64);
                let dpos = (offset - locals.fx) * dx;
                let weight = w[i].x * w[j].y;
                let cell = grid.idx(
                    (locals.base.x + i as i32) as usize,
                    (locals.base.y + j as i32) as usize,
                );
                grid.momentum[cell] += weight * (locals.mass * v + locals.affine * dpos);
                grid.mass[cell] += weight * locals.mass;
            }
        }
    }
    Ok(())
}

/// Adjoint of [`particles_to_grid`].
///
/// Consumes the grid accumulator gradients and the step `step + 1`
/// deformation-gradient gradients; accumulates into the step `step` particle
/// gradients and the activation gradients. Runs only after the forward
/// recompute for this step, so the divergence checks have already passed.
pub fn p2g_adjoint(
    cfg: &SimConfig,
    step: usize,
    kinds: &[ParticleKind],
    actuator_ids: &[i32],
    activations: &[f64],
    grad_activations: &mut [f64],
    traj: &mut ParticleTrajectory,
    grid: &GridState,
) -> Result<(), SimError> {
    let dx = cfg.dx();
    let inv_dx = cfg.inv_dx();
    for p in 0..traj.n_particles() {
        let kind = kinds[p];
        let locals = compute_locals(cfg, step, p, kind, actuator_ids[p], activations, traj)?;
        let idx = traj.idx(step, p);
        let v = traj.vel[idx];
        let c = traj.affine[idx];
        let f_old = traj.def_grad[idx];
        let w = bspline_weights(locals.fx);
        let dw = bspline_weight_derivatives(locals.fx);

        // Scatter adjoint: gradients of every touched cell flow back to the
        // particle velocity, the affine momentum matrix, and (through the
        // interpolation weights and dpos) the particle position.
        let mut v_bar = DVec2::ZERO;
        let mut affine_bar = DMat2::ZERO;
        let mut fx_bar = DVec2::ZERO;
        for i in 0..3 {
            for j in 0..3 {
                let offset = DVec2::new(i as f64, j as f64);
                let dpos = (offset - locals.fx) * dx;
                let weight = w[i].x * w[j].y;
                let cell = grid.idx(
                    (locals.base.x + i as i32) as usize,
                    (locals.base.y + j as i32) as usize,
                );
                let g_mom = grid.grad_momentum[cell];
                let g_mass = grid.grad_mass[cell];

                v_bar += weight * locals.mass * g_mom;
                affine_bar += weight * outer_product(g_mom, dpos);
                let weight_bar =
                    g_mom.dot(locals.mass * v + locals.affine * dpos) + locals.mass * g_mass;
                let dpos_bar = weight * (locals.affine.transpose() * g_mom);
                fx_bar += -dx * dpos_bar;
                fx_bar.x += weight_bar * dw[i].x * w[j].y;
                fx_bar.y += weight_bar * w[i].x * dw[j].y;
            }
        }

        // affine = stress_scale * cauchy + mass * C
        let mut c_bar = locals.mass * affine_bar;
        let cauchy_bar = stress_scale(cfg) * affine_bar;

        // Incoming deformation-gradient adjoint from all future steps.
        let mut new_f_bar = traj.grad_def[traj.idx(step + 1, p)];

        // Actuation stress term: cauchy += F_new A F_new^T with A = diag(0, act).
        let a_mat = actuation_matrix(locals.act);
        new_f_bar +=
            cauchy_bar * locals.new_f * a_mat + cauchy_bar.transpose() * locals.new_f * a_mat;
        if actuator_ids[p] != UNACTUATED {
            let unit_y = actuation_matrix(1.0);
            let sensitivity = locals.new_f * unit_y * locals.new_f.transpose();
            grad_activations[actuator_ids[p] as usize] +=
                frobenius_dot(sensitivity, cauchy_bar) * cfg.act_strength;
        }

        let mut j_bar = 0.0;
        let mut f_pre_bar = DMat2::ZERO;
        match kind {
            ParticleKind::Fluid => {
                // Pressure term diag(1, 0.1) (J - 1) E.
                j_bar += cfg.youngs_modulus * (cauchy_bar.x_axis.x + 0.1 * cauchy_bar.y_axis.y);
                // F_new = sqrt(J) I: the whole F_new adjoint folds into J.
                j_bar += 0.5 / locals.j_det.sqrt() * (new_f_bar.x_axis.x + new_f_bar.y_axis.y);
            }
            ParticleKind::Solid => {
                f_pre_bar += new_f_bar;
                let g = cauchy_bar;
                let r = polar_rotation(locals.new_f);
                // Corotated term 2 mu (F - R) F^T.
                f_pre_bar += 2.0 * cfg.mu * (g * locals.new_f + g.transpose() * (locals.new_f - r));
                let r_bar = -2.0 * cfg.mu * (g * locals.new_f);
                f_pre_bar += polar_rotation_adjoint(locals.f_pre, r_bar);
                // Volumetric term diag(lambda (J - 1) J).
                j_bar += cfg.lambda * (2.0 * locals.j_det - 1.0) * (g.x_axis.x + g.y_axis.y);
            }
        }

        // d(det F)/dF is the cofactor matrix.
        f_pre_bar += j_bar
            * DMat2::from_cols(
                DVec2::new(locals.f_pre.y_axis.y, -locals.f_pre.y_axis.x),
                DVec2::new(-locals.f_pre.x_axis.y, locals.f_pre.x_axis.x),
            );

        // F_pre = (I + dt C) F_old
        traj.grad_def[idx] += (DMat2::IDENTITY + cfg.dt * c).transpose() * f_pre_bar;
        c_bar += cfg.dt * (f_pre_bar * f_old.transpose());

        traj.grad_affine[idx] += c_bar;
        traj.grad_vel[idx] += v_bar;
        traj.grad_pos[idx] += inv_dx * fx_bar;
    }
    Ok(())
}
