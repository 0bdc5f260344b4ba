//! Simulation engine: rollout orchestration, loss, and the backward sweep.
//!
//! One optimization iteration is
//! `run_forward` (clear -> steps-1 forward steps -> loss) followed by
//! `run_backward` (clear gradients -> seed loss gradient -> reverse sweep).
//! The engine enforces that ordering with a small state machine; the driver
//! applies its parameter update only after the backward sweep completes.

use glam::DVec2;

use crate::actuation::ActuationController;
use crate::config::SimConfig;
use crate::error::SimError;
use crate::grid::GridState;
use crate::particle::{ParticleKind, ParticleTrajectory};
use crate::scene::Scene;
use crate::solver::{
    g2p_adjoint, grid_to_particles, grid_update, grid_update_adjoint, p2g_adjoint,
    particles_to_grid,
};

/// Observable rollout states. The transient per-step states (forward and
/// backward sweeps in flight) only exist inside `run_forward`/`run_backward`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// No rollout result is available.
    Idle,
    /// A forward rollout finished and `loss()` is valid.
    LossComputed,
    /// The backward sweep finished; parameter gradients are valid.
    BackwardDone,
}

impl Phase {
    fn name(self) -> &'static str {
        match self {
            Phase::Idle => "Idle",
            Phase::LossComputed => "LossComputed",
            Phase::BackwardDone => "BackwardDone",
        }
    }
}

/// Differentiable MPM engine.
///
/// Owns the particle trajectory and the scratch grid; the particle topology
/// (actuator ids, material kinds) is copied from the [`Scene`] once and is
/// immutable afterwards. The controller is owned here too, but the driver is
/// free to mutate its parameters between iterations.
pub struct Simulation {
    cfg: SimConfig,
    kinds: Vec<ParticleKind>,
    actuator_ids: Vec<i32>,
    n_solid: usize,
    /// Length of the last forward rollout, in stored steps.
    steps: usize,
    phase: Phase,
    loss: f64,
    pub trajectory: ParticleTrajectory,
    pub grid: GridState,
    pub controller: ActuationController,
}

impl Simulation {
    /// Build an engine from a validated config and scene. Every buffer is
    /// sized here, once; rollouts never reallocate.
    pub fn new(cfg: SimConfig, scene: &Scene) -> Result<Self, SimError> {
        cfg.validate()?;
        scene.validate(&cfg)?;

        let n_particles = scene.n_particles();
        let mut trajectory = ParticleTrajectory::new(n_particles, cfg.max_steps);
        trajectory.set_initial_positions(scene.positions());
        let grid = GridState::new(cfg.n_grid);
        let controller = ActuationController::new(scene.n_actuators(), &cfg);

        Ok(Self {
            kinds: scene.kinds().to_vec(),
            actuator_ids: scene.actuator_ids().to_vec(),
            n_solid: scene.n_solid_particles(),
            steps: 0,
            phase: Phase::Idle,
            loss: 0.0,
            trajectory,
            grid,
            controller,
            cfg,
        })
    }

    #[inline]
    pub fn config(&self) -> &SimConfig {
        &self.cfg
    }

    #[inline]
    pub fn n_particles(&self) -> usize {
        self.kinds.len()
    }

    #[inline]
    pub fn n_solid_particles(&self) -> usize {
        self.n_solid
    }

    #[inline]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Loss of the last completed forward rollout.
    #[inline]
    pub fn loss(&self) -> f64 {
        self.loss
    }

    /// Read-only position snapshot for the visualization collaborator.
    #[inline]
    pub fn positions(&self, step: usize) -> &[DVec2] {
        self.trajectory.positions(step)
    }

    /// Read-only activation snapshot for the visualization collaborator.
    #[inline]
    pub fn activations(&self, step: usize) -> &[f64] {
        self.controller.activations(step)
    }

    /// Advance one time step: clear the grid, evaluate the actuation signal,
    /// then P2G -> grid update -> G2P. Leaves the grid holding step `f`'s
    /// state. Invalidates any previously computed loss.
    pub fn step_forward(&mut self, f: usize) -> Result<(), SimError> {
        if f + 1 >= self.cfg.max_steps {
            return Err(SimError::Config(format!(
                "step {f} does not fit the max_steps = {} horizon",
                self.cfg.max_steps
            )));
        }
        self.phase = Phase::Idle;
        self.grid.clear();
        self.controller.compute_step(f);
        particles_to_grid(
            &self.cfg,
            f,
            &self.kinds,
            &self.actuator_ids,
            self.controller.activations(f),
            &mut self.trajectory,
            &mut self.grid,
        )?;
        grid_update(&self.cfg, &mut self.grid);
        grid_to_particles(&self.cfg, f, &mut self.trajectory, &self.grid);
        Ok(())
    }

    /// Run a full forward rollout of `steps` stored states (`steps - 1`
    /// integration steps) and evaluate the loss.
    pub fn run_forward(&mut self, steps: usize) -> Result<f64, SimError> {
        if steps < 1 || steps > self.cfg.max_steps {
            return Err(SimError::Config(format!(
                "rollout of {steps} steps does not fit the max_steps = {} horizon",
                self.cfg.max_steps
            )));
        }
        self.controller.clear_activations();
        for f in 0..steps - 1 {
            self.step_forward(f)?;
        }
        self.steps = steps;
        self.loss = self.compute_loss(steps - 1)?;
        self.phase = Phase::LossComputed;
        Ok(self.loss)
    }

    /// Negated mean x of the solid particles at the final step: maximizing
    /// rightward displacement of the solid body minimizes the loss.
    fn compute_loss(&self, last_step: usize) -> Result<f64, SimError> {
        let mut x_avg = DVec2::ZERO;
        let weight = 1.0 / self.n_solid as f64;
        for (p, kind) in self.kinds.iter().enumerate() {
            if kind.is_solid() {
                x_avg += weight * self.trajectory.pos[self.trajectory.idx(last_step, p)];
            }
        }
        let loss = -x_avg.x;
        if !loss.is_finite() {
            return Err(SimError::NumericDivergence {
                step: last_step,
                what: "non-finite loss",
            });
        }
        Ok(loss)
    }

    /// Reverse sweep over the last forward rollout.
    ///
    /// Clears every gradient buffer, seeds the loss gradient at the final
    /// step, then walks the steps in reverse. Grid state for each step is
    /// recomputed (clear -> P2G -> grid update) before the adjoints run,
    /// since only particle state is stored across the horizon.
    pub fn run_backward(&mut self) -> Result<(), SimError> {
        if self.phase != Phase::LossComputed {
            return Err(SimError::InvalidPhase {
                expected: Phase::LossComputed.name(),
                actual: self.phase.name(),
            });
        }
        self.trajectory.clear_gradients();
        self.controller.clear_gradients();

        // d loss / d pos[last, p] = (-1/n_solid, 0) for solid particles.
        let last = self.steps - 1;
        let seed = DVec2::new(-1.0 / self.n_solid as f64, 0.0);
        for (p, kind) in self.kinds.iter().enumerate() {
            if kind.is_solid() {
                let idx = self.trajectory.idx(last, p);
                self.trajectory.grad_pos[idx] += seed;
            }
        }

        for f in (0..self.steps - 1).rev() {
            self.grid.clear();
            self.grid.clear_gradients();
            particles_to_grid(
                &self.cfg,
                f,
                &self.kinds,
                &self.actuator_ids,
                self.controller.activations(f),
                &mut self.trajectory,
                &mut self.grid,
            )?;
            grid_update(&self.cfg, &mut self.grid);

            g2p_adjoint(&self.cfg, f, &mut self.trajectory, &mut self.grid);
            grid_update_adjoint(&self.cfg, &mut self.grid);
            {
                // Split borrows: the controller hands out the activation row
                // and its gradient row separately.
                let Self {
                    cfg,
                    kinds,
                    actuator_ids,
                    trajectory,
                    grid,
                    controller,
                    ..
                } = self;
                let (activations, grad_activations) = controller.step_rows_mut(f);
                p2g_adjoint(
                    cfg,
                    f,
                    kinds,
                    actuator_ids,
                    activations,
                    grad_activations,
                    trajectory,
                    grid,
                )?;
            }
            self.controller.adjoint_step(f);
        }

        self.phase = Phase::BackwardDone;
        Ok(())
    }
}
