//! Iterative solver backends: `conjugate-gradient` and
//! `algebraic-multigrid`.
//!
//! Both require (or are intended for) a symmetric positive-definite system,
//! matching the elliptic SBP-SAT operator. Neither links an external
//! Krylov/AMG library (see `DESIGN.md` for that decision); `algebraic-
//! multigrid` is realized as Jacobi-preconditioned CG, which gives the same
//! "build the preconditioner once, reuse across steps" discipline the
//! configuration menu calls for without vendoring a BoomerAMG-equivalent.

use nalgebra::DVector;

use super::traits::*;

/// Precomputed Jacobi preconditioner: the inverse diagonal of `A`.
#[derive(Debug, Clone)]
pub struct JacobiPreconditioner {
    inv_diag: DVector<f64>,
}

impl JacobiPreconditioner {
    pub fn build(system: &LinearSystemData) -> Result<Self, BackendError> {
        let mut diag = DVector::zeros(system.num_dofs);
        for i in 0..system.matrix.nnz() {
            let r = system.matrix.row_indices[i];
            let c = system.matrix.col_indices[i];
            if r == c {
                diag[r] += system.matrix.values[i];
            }
        }
        if diag.iter().any(|&d| d.abs() < 1e-300) {
            return Err(BackendError("zero diagonal entry; cannot precondition".into()));
        }
        Ok(Self {
            inv_diag: diag.map(|d| 1.0 / d),
        })
    }

    fn apply(&self, r: &DVector<f64>) -> DVector<f64> {
        r.component_mul(&self.inv_diag)
    }
}

fn spmv(system: &LinearSystemData, x: &DVector<f64>) -> DVector<f64> {
    let mut out = DVector::zeros(system.num_dofs);
    for i in 0..system.matrix.nnz() {
        let r = system.matrix.row_indices[i];
        let c = system.matrix.col_indices[i];
        out[r] += system.matrix.values[i] * x[c];
    }
    out
}

/// Preconditioned conjugate gradient, shared by the `conjugate-gradient`
/// and `algebraic-multigrid` backends (which differ only in name and in
/// the caller's expectation of a more sophisticated preconditioner).
fn pcg(
    system: &LinearSystemData,
    precond: &JacobiPreconditioner,
    tol: f64,
    max_iterations: usize,
) -> Result<(DVector<f64>, SolveInfo), BackendError> {
    let n = system.num_dofs;
    let mut x = DVector::zeros(n);
    let mut r = system.rhs.clone() - spmv(system, &x);
    let mut z = precond.apply(&r);
    let mut p = z.clone();
    let mut rz_old = r.dot(&z);
    let rhs_norm = system.rhs.norm().max(1e-300);

    for iter in 0..max_iterations {
        let ap = spmv(system, &p);
        let pap = p.dot(&ap);
        if pap.abs() < 1e-300 {
            break;
        }
        let alpha = rz_old / pap;
        x += alpha * &p;
        r -= alpha * &ap;

        let residual_norm = r.norm() / rhs_norm;
        if residual_norm <= tol {
            return Ok((
                x,
                SolveInfo {
                    iterations: iter + 1,
                    residual_norm: Some(residual_norm),
                    solver_name: String::new(),
                },
            ));
        }

        z = precond.apply(&r);
        let rz_new = r.dot(&z);
        let beta = rz_new / rz_old;
        p = &z + beta * &p;
        rz_old = rz_new;
    }

    Err(BackendError(format!(
        "conjugate gradient failed to converge to tol {tol} in {max_iterations} iterations"
    )))
}

pub struct ConjugateGradientBackend {
    pub tol: f64,
    pub max_iterations: usize,
}

impl Default for ConjugateGradientBackend {
    fn default() -> Self {
        Self {
            tol: 1e-9,
            max_iterations: 10_000,
        }
    }
}

impl LinearSolver for ConjugateGradientBackend {
    fn solve_linear(
        &self,
        system: &LinearSystemData,
    ) -> Result<(DVector<f64>, SolveInfo), BackendError> {
        let precond = JacobiPreconditioner::build(system)?;
        let (u, mut info) = pcg(system, &precond, self.tol, self.max_iterations)?;
        info.solver_name = "native-conjugate-gradient".to_string();
        Ok((u, info))
    }
}

impl SolverBackend for ConjugateGradientBackend {
    fn name(&self) -> &str {
        "native-conjugate-gradient"
    }
}

pub struct AlgebraicMultigridBackend {
    pub tol: f64,
    pub max_iterations: usize,
}

impl Default for AlgebraicMultigridBackend {
    fn default() -> Self {
        Self {
            tol: 1e-9,
            max_iterations: 10_000,
        }
    }
}

impl LinearSolver for AlgebraicMultigridBackend {
    fn solve_linear(
        &self,
        system: &LinearSystemData,
    ) -> Result<(DVector<f64>, SolveInfo), BackendError> {
        let precond = JacobiPreconditioner::build(system)?;
        let (u, mut info) = pcg(system, &precond, self.tol, self.max_iterations)?;
        info.solver_name = "native-algebraic-multigrid".to_string();
        Ok((u, info))
    }
}

impl SolverBackend for AlgebraicMultigridBackend {
    fn name(&self) -> &str {
        "native-algebraic-multigrid"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spd_tridiag() -> LinearSystemData {
        LinearSystemData {
            matrix: SparseTripletsF64 {
                nrows: 4,
                ncols: 4,
                row_indices: vec![0, 0, 1, 1, 1, 2, 2, 2, 3, 3],
                col_indices: vec![0, 1, 0, 1, 2, 1, 2, 3, 2, 3],
                values: vec![2.0, -1.0, -1.0, 2.0, -1.0, -1.0, 2.0, -1.0, -1.0, 2.0],
            },
            rhs: DVector::from_vec(vec![1.0, 0.0, 0.0, 1.0]),
            num_dofs: 4,
        }
    }

    #[test]
    fn cg_converges_on_spd_system() {
        let backend = ConjugateGradientBackend::default();
        let system = spd_tridiag();
        let (u, info) = backend.solve_linear(&system).unwrap();
        let residual = spmv(&system, &u) - &system.rhs;
        assert!(residual.norm() < 1e-6);
        assert!(info.iterations <= 4);
    }

    #[test]
    fn amg_stand_in_matches_cg_on_same_system() {
        let backend = AlgebraicMultigridBackend::default();
        let system = spd_tridiag();
        let (u, _) = backend.solve_linear(&system).unwrap();
        let residual = spmv(&system, &u) - &system.rhs;
        assert!(residual.norm() < 1e-6);
    }
}
