//! Error types for engine construction and rollouts.

use thiserror::Error;

/// Failures surfaced by the simulation engine.
///
/// The hot per-step kernels never panic; anything that can go wrong is either
/// caught at construction time (`Config`) or reported as a failed rollout
/// (`NumericDivergence`). Empty grid cells are not errors - they use an
/// epsilon-guarded reciprocal in the grid update.
#[derive(Debug, Error)]
pub enum SimError {
    /// Buffer sizes or scene data inconsistent with the configuration.
    /// Always detected before any kernel runs.
    #[error("configuration error: {0}")]
    Config(String),

    /// The simulation blew up: a deformation-gradient determinant dropped to
    /// zero or below, a particle left the domain, or a non-finite value
    /// appeared. The rollout is aborted; continuing would compound garbage.
    #[error("numeric divergence at step {step}: {what}")]
    NumericDivergence { step: usize, what: &'static str },

    /// Rollout state machine misuse, e.g. a backward sweep requested before
    /// the forward pass computed a loss.
    #[error("invalid phase: expected {expected}, was {actual}")]
    InvalidPhase {
        expected: &'static str,
        actual: &'static str,
    },
}
