//! Simulation configuration.
//!
//! All size and material parameters are captured here once, at engine
//! construction time. Nothing in this struct may change during a rollout:
//! the backward sweep replays the forward kernels and both passes must see
//! identical constants.

use serde::{Deserialize, Serialize};

use crate::error::SimError;

/// Global simulation parameters.
///
/// Defaults reproduce the reference soft-robot setup: a unit-square domain on
/// a 128x128 grid, explicit Euler at `dt = 1e-3`, and a neo-Hookean-ish solid
/// with `E = mu = lambda = 10`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimConfig {
    /// Grid resolution per axis; the domain is the unit square, `dx = 1/n_grid`.
    pub n_grid: usize,
    /// Time step (s).
    pub dt: f64,
    /// Gravity acceleration, applied along -Y at the grid stage.
    pub gravity: f64,
    /// Width of the boundary margin, in cells, on all four domain sides.
    pub bound: usize,
    /// Coulomb friction coefficient for the floor. Negative values are a
    /// sentinel for a fully sticky floor (pure inelastic stop).
    pub friction: f64,
    /// Young's modulus scale for the fluid pressure term.
    pub youngs_modulus: f64,
    /// Shear modulus (mu) for the corotated solid term.
    pub mu: f64,
    /// Lame's first parameter (lambda) for the volumetric solid term.
    pub lambda: f64,
    /// Per-particle volume used in the stress-to-momentum scaling.
    pub particle_volume: f64,
    /// Scale applied to controller activations before they become stress.
    pub act_strength: f64,
    /// Angular frequency of the sinusoidal actuation basis.
    pub actuation_omega: f64,
    /// Number of sinusoidal basis functions per actuator.
    pub n_sin_waves: usize,
    /// Capacity of every per-step buffer. The longest rollout ever requested
    /// must fit; no reallocation happens once the engine is built, because
    /// the reverse pass revisits every step's stored particle state.
    pub max_steps: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            n_grid: 128,
            dt: 1e-3,
            gravity: 3.8,
            bound: 3,
            friction: 0.5,
            youngs_modulus: 10.0,
            mu: 10.0,
            lambda: 10.0,
            particle_volume: 1.0,
            act_strength: 4.0,
            actuation_omega: 20.0,
            n_sin_waves: 4,
            max_steps: 2048,
        }
    }
}

impl SimConfig {
    /// Cell size of the background grid.
    #[inline]
    pub fn dx(&self) -> f64 {
        1.0 / self.n_grid as f64
    }

    /// Reciprocal cell size.
    #[inline]
    pub fn inv_dx(&self) -> f64 {
        self.n_grid as f64
    }

    /// Check internal consistency before any buffer is sized from this config.
    pub fn validate(&self) -> Result<(), SimError> {
        if self.n_grid < 2 * self.bound + 3 {
            return Err(SimError::Config(format!(
                "n_grid = {} leaves no interior cells inside bound = {}",
                self.n_grid, self.bound
            )));
        }
        if !(self.dt > 0.0 && self.dt.is_finite()) {
            return Err(SimError::Config(format!("dt must be positive, got {}", self.dt)));
        }
        if self.max_steps < 1 {
            return Err(SimError::Config("max_steps must be at least 1".into()));
        }
        if self.n_sin_waves == 0 {
            return Err(SimError::Config("n_sin_waves must be at least 1".into()));
        }
        if !(self.particle_volume > 0.0) {
            return Err(SimError::Config(format!(
                "particle_volume must be positive, got {}",
                self.particle_volume
            )));
        }
        Ok(())
    }
}
