//! Scene handoff from the morphology collaborator.
//!
//! A `Scene` is the ordered particle set the engine is built from: initial
//! positions, per-particle actuator group and material kind, plus the
//! actuator count used to size the controller. The engine copies this data
//! once at construction; particle topology is immutable afterwards.

use glam::DVec2;

use crate::config::SimConfig;
use crate::error::SimError;
use crate::particle::ParticleKind;

/// Sentinel actuator id for passive particles.
pub const UNACTUATED: i32 = -1;

/// Particle set under construction.
pub struct Scene {
    dx: f64,
    positions: Vec<DVec2>,
    actuator_ids: Vec<i32>,
    kinds: Vec<ParticleKind>,
    n_solid: usize,
    n_actuators: usize,
    offset: DVec2,
}

impl Scene {
    /// `dx` is the grid cell size; rectangles are sampled at two particles
    /// per cell per axis.
    pub fn new(dx: f64) -> Self {
        Self {
            dx,
            positions: Vec::new(),
            actuator_ids: Vec::new(),
            kinds: Vec::new(),
            n_solid: 0,
            n_actuators: 0,
            offset: DVec2::ZERO,
        }
    }

    /// Translation applied to every subsequently added particle.
    pub fn set_offset(&mut self, x: f64, y: f64) {
        self.offset = DVec2::new(x, y);
    }

    /// Number of actuator groups referenced by this scene.
    pub fn set_n_actuators(&mut self, n: usize) {
        self.n_actuators = n;
    }

    pub fn add_particle(&mut self, position: DVec2, actuator: i32, kind: ParticleKind) {
        self.positions.push(position + self.offset);
        self.actuator_ids.push(actuator);
        self.kinds.push(kind);
        if kind.is_solid() {
            self.n_solid += 1;
        }
    }

    /// Fill a `w x h` rectangle anchored at `(x, y)` with a regular particle
    /// lattice, two samples per grid cell per axis.
    pub fn add_rect(&mut self, x: f64, y: f64, w: f64, h: f64, actuator: i32, kind: ParticleKind) {
        let w_count = ((w / self.dx) as usize) * 2;
        let h_count = ((h / self.dx) as usize) * 2;
        if w_count == 0 || h_count == 0 {
            return;
        }
        let real_dx = w / w_count as f64;
        let real_dy = h / h_count as f64;
        for i in 0..w_count {
            for j in 0..h_count {
                let p = DVec2::new(
                    x + (i as f64 + 0.5) * real_dx,
                    y + (j as f64 + 0.5) * real_dy,
                );
                self.add_particle(p, actuator, kind);
            }
        }
    }

    #[inline]
    pub fn n_particles(&self) -> usize {
        self.positions.len()
    }

    #[inline]
    pub fn n_solid_particles(&self) -> usize {
        self.n_solid
    }

    #[inline]
    pub fn n_actuators(&self) -> usize {
        self.n_actuators
    }

    #[inline]
    pub fn positions(&self) -> &[DVec2] {
        &self.positions
    }

    #[inline]
    pub fn actuator_ids(&self) -> &[i32] {
        &self.actuator_ids
    }

    #[inline]
    pub fn kinds(&self) -> &[ParticleKind] {
        &self.kinds
    }

    /// Consistency checks run before any engine buffer is sized from this
    /// scene. All violations are configuration errors, never kernel failures.
    pub fn validate(&self, cfg: &SimConfig) -> Result<(), SimError> {
        if self.positions.is_empty() {
            return Err(SimError::Config("scene contains no particles".into()));
        }
        if self.n_solid == 0 {
            return Err(SimError::Config(
                "scene contains no solid particles; the loss is undefined".into(),
            ));
        }
        let margin = cfg.bound as f64 * cfg.dx();
        for (p, (&pos, (&aid, &kind))) in self
            .positions
            .iter()
            .zip(self.actuator_ids.iter().zip(self.kinds.iter()))
            .enumerate()
        {
            if !(pos.x.is_finite() && pos.y.is_finite())
                || pos.x <= 0.0
                || pos.x >= 1.0
                || pos.y <= 0.0
                || pos.y >= 1.0
            {
                return Err(SimError::Config(format!(
                    "particle {p} at ({}, {}) lies outside the unit domain",
                    pos.x, pos.y
                )));
            }
            if pos.x < margin || pos.x > 1.0 - margin || pos.y < margin || pos.y > 1.0 - margin {
                log::warn!(
                    "particle {p} starts inside the {}-cell boundary margin",
                    cfg.bound
                );
            }
            if aid != UNACTUATED && (aid < 0 || aid as usize >= self.n_actuators) {
                return Err(SimError::Config(format!(
                    "particle {p} references actuator {aid}, but the scene declares {}",
                    self.n_actuators
                )));
            }
            if kind == ParticleKind::Fluid && aid != UNACTUATED {
                return Err(SimError::Config(format!(
                    "fluid particle {p} cannot be actuated (actuator {aid})"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_samples_two_per_cell() {
        let dx = 1.0 / 128.0;
        let mut scene = Scene::new(dx);
        scene.add_rect(0.4, 0.4, 2.0 * dx, dx, UNACTUATED, ParticleKind::Solid);
        // 4 samples along x, 2 along y
        assert_eq!(scene.n_particles(), 8);
        assert_eq!(scene.n_solid_particles(), 8);
    }

    #[test]
    fn offset_shifts_particles() {
        let mut scene = Scene::new(1.0 / 64.0);
        scene.set_offset(0.1, 0.2);
        scene.add_particle(DVec2::new(0.3, 0.3), UNACTUATED, ParticleKind::Solid);
        assert_eq!(scene.positions()[0], DVec2::new(0.4, 0.5));
    }

    #[test]
    fn rejects_actuated_fluid() {
        let cfg = SimConfig::default();
        let mut scene = Scene::new(cfg.dx());
        scene.set_n_actuators(1);
        scene.add_particle(DVec2::new(0.5, 0.5), UNACTUATED, ParticleKind::Solid);
        scene.add_particle(DVec2::new(0.5, 0.6), 0, ParticleKind::Fluid);
        assert!(scene.validate(&cfg).is_err());
    }

    #[test]
    fn rejects_out_of_range_actuator() {
        let cfg = SimConfig::default();
        let mut scene = Scene::new(cfg.dx());
        scene.set_n_actuators(1);
        scene.add_particle(DVec2::new(0.5, 0.5), 3, ParticleKind::Solid);
        assert!(scene.validate(&cfg).is_err());
    }
}
