//! Direct solver backends using nalgebra.
//!
//! Realizes the `direct-LU` and `direct-Cholesky` linear-solver selections
//! of §4.2. Both reconstruct a dense matrix from the COO system (the grids
//! in the testable scenarios are modest enough that dense factorization is
//! adequate for a reference implementation) and factor once; the caller is
//! responsible for the reuse discipline of only calling this after a matrix
//! change.

use super::traits::*;
use nalgebra::{DMatrix, DVector};

fn dense_from_triplets(system: &LinearSystemData) -> DMatrix<f64> {
    let n = system.num_dofs;
    let mut a = DMatrix::zeros(n, n);
    for i in 0..system.matrix.nnz() {
        let r = system.matrix.row_indices[i];
        let c = system.matrix.col_indices[i];
        a[(r, c)] += system.matrix.values[i];
    }
    a
}

/// `direct-LU`: a dense LU factorization, factored fresh on every call.
pub struct DirectLuBackend;

impl LinearSolver for DirectLuBackend {
    fn solve_linear(
        &self,
        system: &LinearSystemData,
    ) -> Result<(DVector<f64>, SolveInfo), BackendError> {
        let a = dense_from_triplets(system);
        let u = a
            .lu()
            .solve(&system.rhs)
            .ok_or_else(|| BackendError("singular matrix in LU factorization".into()))?;
        Ok((
            u,
            SolveInfo {
                iterations: 1,
                residual_norm: None,
                solver_name: "native-direct-LU".to_string(),
            },
        ))
    }
}

impl SolverBackend for DirectLuBackend {
    fn name(&self) -> &str {
        "native-direct-LU"
    }
}

/// `direct-Cholesky`: requires `A` symmetric positive definite.
pub struct DirectCholeskyBackend;

impl LinearSolver for DirectCholeskyBackend {
    fn solve_linear(
        &self,
        system: &LinearSystemData,
    ) -> Result<(DVector<f64>, SolveInfo), BackendError> {
        let a = dense_from_triplets(system);
        let chol = nalgebra::linalg::Cholesky::new(a)
            .ok_or_else(|| BackendError("matrix is not symmetric positive definite".into()))?;
        let u = chol.solve(&system.rhs);
        Ok((
            u,
            SolveInfo {
                iterations: 1,
                residual_norm: None,
                solver_name: "native-direct-Cholesky".to_string(),
            },
        ))
    }
}

impl SolverBackend for DirectCholeskyBackend {
    fn name(&self) -> &str {
        "native-direct-Cholesky"
    }
}
