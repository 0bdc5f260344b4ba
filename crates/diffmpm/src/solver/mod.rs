//! Forward and adjoint MPM step kernels.
//!
//! Each forward operator lives next to its hand-derived reverse-mode
//! counterpart, and both operate on the same per-step data:
//!
//! 1. **P2G** ([`particles_to_grid`] / [`p2g_adjoint`]): deformation update,
//!    constitutive stress, actuation stress, 3x3 scatter of mass/momentum.
//! 2. **Grid update** ([`grid_update`] / [`grid_update_adjoint`]): momentum
//!    to velocity, gravity, wall and floor-friction handling.
//! 3. **G2P** ([`grid_to_particles`] / [`g2p_adjoint`]): velocity gather,
//!    APIC affine reconstruction, explicit Euler advection.
//!
//! The scatter in P2G (and every adjoint accumulation into shared buffers)
//! is sequential over particles, which keeps rollouts bit-reproducible.
//! The per-cell grid update and the per-particle G2P gather have no shared
//! writes and run on rayon.

mod g2p;
mod grid_update;
mod p2g;

pub use g2p::{g2p_adjoint, grid_to_particles};
pub use grid_update::{apply_boundary, grid_update, grid_update_adjoint};
pub use p2g::{p2g_adjoint, particles_to_grid};
