//! Top-level solver error type, composing the per-concern error enums of
//! the crates below it.

use thiserror::Error;

use crate::backend::BackendError;

/// Raised when a state variable that must stay finite and physical
/// (`psi`, slip velocity, a root-find bracket) goes non-finite or out of
/// its physical range mid-run. Carries enough context to print the fail-
/// fast diagnostic the friction law calls for.
#[derive(Debug, Clone, Error)]
#[error("invariant violated at fault node {node}: {message} (psi={psi}, a={a}, sigma_n={sigma_n}, Z={z}, tau={tau}, V={v})")]
pub struct InvariantError {
    pub node: usize,
    pub message: String,
    pub psi: f64,
    pub a: f64,
    pub sigma_n: f64,
    pub z: f64,
    pub tau: f64,
    pub v: f64,
}

#[derive(Debug, Error)]
pub enum SCycleError {
    #[error("configuration error: {0}")]
    Config(#[from] scycle_model::ConfigError),

    #[error("linear solver backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("{0}")]
    Invariant(#[from] InvariantError),

    #[error("I/O error: {0}")]
    Io(#[from] scycle_io::IoError),

    #[error("the integrator failed to find a step size satisfying minDeltaT after {attempts} halvings")]
    StepSizeCollapse { attempts: usize },
}
