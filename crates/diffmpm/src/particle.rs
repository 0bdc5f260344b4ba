//! Particle material kinds and the full-horizon trajectory storage.
//!
//! Unlike the grid, particle state is kept for every time step of a rollout:
//! the reverse-mode pass revisits each step's positions, velocities, affine
//! matrices and deformation gradients. All buffers are sized to the
//! `max_steps` horizon once, at engine construction.

use glam::{DMat2, DVec2};

/// Material model selector for a particle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParticleKind {
    /// Near-incompressible fluid surrogate: isotropic pressure, no shear
    /// memory (the deformation gradient is rescaled to `sqrt(J) I`).
    Fluid,
    /// Corotated elastic solid. Only solid particles enter the loss.
    Solid,
}

impl ParticleKind {
    /// Particle mass in grid units.
    #[inline]
    pub const fn mass(self) -> f64 {
        match self {
            ParticleKind::Fluid => 4.0,
            ParticleKind::Solid => 1.0,
        }
    }

    #[inline]
    pub const fn is_solid(self) -> bool {
        matches!(self, ParticleKind::Solid)
    }
}

/// Per-step, per-particle state arrays spanning the whole rollout horizon,
/// plus a gradient mirror for each differentiable field.
///
/// Layout is SoA with flat index `step * n_particles + p`.
pub struct ParticleTrajectory {
    n_particles: usize,
    max_steps: usize,
    /// Position (unit-square domain coordinates).
    pub pos: Vec<DVec2>,
    /// Velocity.
    pub vel: Vec<DVec2>,
    /// APIC affine velocity matrix (C).
    pub affine: Vec<DMat2>,
    /// Deformation gradient (F); starts as identity, must stay invertible.
    pub def_grad: Vec<DMat2>,
    pub grad_pos: Vec<DVec2>,
    pub grad_vel: Vec<DVec2>,
    pub grad_affine: Vec<DMat2>,
    pub grad_def: Vec<DMat2>,
}

impl ParticleTrajectory {
    /// Allocate the full horizon. Step 0 gets identity deformation gradients
    /// and zero velocity; positions are filled in by [`Self::set_initial_positions`].
    pub fn new(n_particles: usize, max_steps: usize) -> Self {
        let len = n_particles * max_steps;
        let mut traj = Self {
            n_particles,
            max_steps,
            pos: vec![DVec2::ZERO; len],
            vel: vec![DVec2::ZERO; len],
            affine: vec![DMat2::ZERO; len],
            def_grad: vec![DMat2::ZERO; len],
            grad_pos: vec![DVec2::ZERO; len],
            grad_vel: vec![DVec2::ZERO; len],
            grad_affine: vec![DMat2::ZERO; len],
            grad_def: vec![DMat2::ZERO; len],
        };
        for f in traj.def_grad[..n_particles].iter_mut() {
            *f = DMat2::IDENTITY;
        }
        traj
    }

    #[inline]
    pub fn n_particles(&self) -> usize {
        self.n_particles
    }

    #[inline]
    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    /// Flat index of particle `p` at time step `step`.
    #[inline]
    pub fn idx(&self, step: usize, p: usize) -> usize {
        debug_assert!(step < self.max_steps && p < self.n_particles);
        step * self.n_particles + p
    }

    /// Rest positions for step 0, handed over from the morphology collaborator.
    pub fn set_initial_positions(&mut self, positions: &[DVec2]) {
        assert_eq!(positions.len(), self.n_particles);
        self.pos[..self.n_particles].copy_from_slice(positions);
    }

    /// Read-only position snapshot for one step (visualization handoff).
    #[inline]
    pub fn positions(&self, step: usize) -> &[DVec2] {
        let start = step * self.n_particles;
        &self.pos[start..start + self.n_particles]
    }

    /// Zero every gradient buffer across the whole horizon. Runs at the start
    /// of each backward sweep so gradient accumulation starts clean.
    pub fn clear_gradients(&mut self) {
        self.grad_pos.fill(DVec2::ZERO);
        self.grad_vel.fill(DVec2::ZERO);
        self.grad_affine.fill(DMat2::ZERO);
        self.grad_def.fill(DMat2::ZERO);
    }
}
