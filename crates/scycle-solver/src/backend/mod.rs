//! Numerical backend abstraction layer for the bulk linear solve.
//!
//! Trait-based interface over the concrete linear-algebra approach, so the
//! SBP assembly layer is backend-agnostic. `select` dispatches on the
//! four-way configuration enum of §4.2.

pub mod iterative;
pub mod native;
pub mod traits;

pub use iterative::{AlgebraicMultigridBackend, ConjugateGradientBackend};
pub use native::{DirectCholeskyBackend, DirectLuBackend};
pub use traits::*;

use scycle_model::BulkSolverKind;

/// Builds the backend named by a `BulkSolverKind` configuration value.
pub fn select(kind: BulkSolverKind, tol: f64) -> Box<dyn SolverBackend> {
    match kind {
        BulkSolverKind::AlgebraicMultigrid => Box::new(AlgebraicMultigridBackend {
            tol,
            max_iterations: 10_000,
        }),
        BulkSolverKind::ConjugateGradient => Box::new(ConjugateGradientBackend {
            tol,
            max_iterations: 10_000,
        }),
        BulkSolverKind::DirectLu => Box::new(DirectLuBackend),
        BulkSolverKind::DirectCholesky => Box::new(DirectCholeskyBackend),
    }
}
