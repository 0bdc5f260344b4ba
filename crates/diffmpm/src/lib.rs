//! Differentiable 2D Material Point Method for soft-robot locomotion.
//!
//! Particles carry position, velocity, an APIC affine-velocity matrix and a
//! deformation gradient; a dense background grid mediates momentum exchange.
//! Every forward kernel has a matching hand-derived adjoint, so a scalar loss
//! on the final particle positions can be backpropagated through the whole
//! rollout to the actuation controller's parameters.
//!
//! One simulation step runs:
//!
//! 1. Clear the scratch grid
//! 2. Evaluate the actuation signal for this step
//! 3. Particle-to-grid transfer (P2G): scatter mass, momentum and stress
//! 4. Grid update: resolve velocities, apply gravity, walls and floor friction
//! 5. Grid-to-particle transfer (G2P): gather velocities, rebuild the affine
//!    matrix, advect positions
//!
//! The backward sweep walks the steps in reverse. Grid state is never stored
//! across steps; each backward step re-runs P2G and the grid update for that
//! step before taking the adjoints (recompute-then-differentiate), so memory
//! stays bounded to the particle trajectory plus one grid.
//!
//! This crate is driver-agnostic - it handles simulation and gradients only.
//! Use the `trainer` crate for morphology generation and the optimizer loop.
//!
//! Reference: Hu et al. 2019 "ChainQueen: A Real-Time Differentiable Physical
//! Simulator for Soft Robotics", and Jiang et al. 2015 "The Affine
//! Particle-In-Cell Method" for the transfer scheme.

pub mod actuation;
pub mod config;
pub mod error;
pub mod grid;
pub mod kernels;
pub mod particle;
pub mod scene;
pub mod sim;
pub mod solver;

pub use actuation::ActuationController;
pub use config::SimConfig;
pub use error::SimError;
pub use glam::{DMat2, DVec2};
pub use grid::GridState;
pub use particle::{ParticleKind, ParticleTrajectory};
pub use scene::Scene;
pub use sim::{Phase, Simulation};
