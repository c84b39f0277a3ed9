//! Backend trait definitions for the bulk linear solve.
//!
//! These traits abstract over the concrete numerical library used to solve
//! `A * u = rhs`, the SBP-SAT system built by the [`crate::sbp`] operator
//! kit. The same abstraction backs the heat-equation and pressure-diffusion
//! implicit solves, which reuse it directly.

use nalgebra::DVector;

/// Error type for backend operations: factorization failure, iterative
/// solver non-convergence, or a malformed system.
#[derive(Debug, Clone)]
pub struct BackendError(pub String);

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for BackendError {}

impl From<String> for BackendError {
    fn from(s: String) -> Self {
        BackendError(s)
    }
}

impl From<&str> for BackendError {
    fn from(s: &str) -> Self {
        BackendError(s.to_string())
    }
}

/// Sparse matrix in COO (coordinate/triplet) format.
///
/// This is the backend-agnostic interchange format between the SBP
/// assembly layer and any solver backend.
#[derive(Debug, Clone)]
pub struct SparseTripletsF64 {
    pub nrows: usize,
    pub ncols: usize,
    pub row_indices: Vec<usize>,
    pub col_indices: Vec<usize>,
    pub values: Vec<f64>,
}

impl SparseTripletsF64 {
    pub fn nnz(&self) -> usize {
        self.values.len()
    }
}

/// A linear system ready for solving: `A * u = rhs`.
///
/// Boundary SAT terms should already be folded into `matrix` and `rhs`
/// before constructing this struct.
pub struct LinearSystemData {
    pub matrix: SparseTripletsF64,
    pub rhs: DVector<f64>,
    pub num_dofs: usize,
}

/// Solver convergence and diagnostic info.
pub struct SolveInfo {
    /// Number of iterations (1 for direct solvers).
    pub iterations: usize,
    pub residual_norm: Option<f64>,
    pub solver_name: String,
}

/// Trait for a linear solver backend.
pub trait LinearSolver: Send + Sync {
    fn solve_linear(
        &self,
        system: &LinearSystemData,
    ) -> Result<(DVector<f64>, SolveInfo), BackendError>;
}

/// A backend that can additionally report whether it should refactor
/// before the next solve (the reuse discipline of §4.2: factor once after
/// a matrix change, hold constant thereafter).
pub trait SolverBackend: LinearSolver {
    fn name(&self) -> &str;
}
