//! Pore-pressure diffusion along the fault: a 1-D SBP-SAT backward-Euler
//! solve with Dirichlet boundaries at the free surface and the base of
//! the modeled domain.
//!
//! Grounded on `pressureEq.hpp`'s field set (`_n_p`, `_beta_p`, `_k_p`,
//! `_eta_p`, `_rho_f`, `_g`). The original treats `_bcL` (a left-boundary
//! value) as part of its interface but the 1-D along-fault reduction used
//! here has no "left" side distinct from the diffusion axis itself, so
//! only the top (`_bcT`) and bottom (`_bcB`) Dirichlet values are used;
//! see `DESIGN.md`.

use nalgebra::DVector;
use scycle_model::BulkSolverKind;

use crate::backend::{self, LinearSystemData, SolverBackend, SparseTripletsF64};
use crate::error::SCycleError;
use crate::sbp::Sbp1D;

pub struct PressureSolver {
    sbp: Sbp1D,
    nz: usize,
    diffusivity: Vec<f64>,
    inv_storage: Vec<f64>,
    /// `A_p = -D2(diffusivity) + SAT`, so that `storage * dp/dt = -A_p*p + rhs`
    /// reduces to `div(D grad p) + rhs` away from the boundary SAT rows.
    matrix: nalgebra::DMatrix<f64>,
    backend: Box<dyn SolverBackend>,
}

impl PressureSolver {
    /// `k_p`, `eta_p`, `n_p`, `beta_p` are depth profiles of length `nz`.
    pub fn new(
        nz: usize,
        dz: f64,
        order: usize,
        k_p: &[f64],
        eta_p: &[f64],
        n_p: &[f64],
        beta_p: &[f64],
        lin_solver: BulkSolverKind,
        ksp_tol: f64,
    ) -> Self {
        assert_eq!(k_p.len(), nz);
        assert_eq!(eta_p.len(), nz);
        let sbp = Sbp1D::build(nz, dz, order);

        let diffusivity: Vec<f64> = k_p.iter().zip(eta_p).map(|(&k, &eta)| k / eta).collect();
        let inv_storage: Vec<f64> = n_p
            .iter()
            .zip(beta_p)
            .map(|(&n, &beta)| 1.0 / (n * beta))
            .collect();

        let d2 = sbp.d2_variable_coef(&diffusivity);
        let mut matrix = -d2;
        matrix[(0, 0)] += sbp.alpha_d * diffusivity[0] * sbp.hinv_diag[0];
        matrix[(nz - 1, nz - 1)] += sbp.alpha_d * diffusivity[nz - 1] * sbp.hinv_diag[nz - 1];

        Self {
            sbp,
            nz,
            diffusivity,
            inv_storage,
            matrix,
            backend: backend::select(lin_solver, ksp_tol),
        }
    }

    /// Gravitational forcing `rho_f * g * dD/dz`, added to the diffusion
    /// source alongside any externally supplied forcing term.
    pub fn gravity_source(&self, rho_f: f64, g: f64) -> Vec<f64> {
        let d_vec = DVector::from_row_slice(&self.diffusivity);
        let dd_dz = &self.sbp.d1 * d_vec;
        (0..self.nz).map(|i| rho_f * g * dd_dz[i]).collect()
    }

    /// Right-hand side with the top/bottom Dirichlet SAT penalty and any
    /// extra volumetric source folded in.
    pub fn assemble_rhs(&self, bc_top: f64, bc_bottom: f64, source: &[f64]) -> DVector<f64> {
        let mut rhs = DVector::from_row_slice(source);
        rhs[0] += self.sbp.alpha_d * self.diffusivity[0] * self.sbp.hinv_diag[0] * bc_top;
        rhs[self.nz - 1] +=
            self.sbp.alpha_d * self.diffusivity[self.nz - 1] * self.sbp.hinv_diag[self.nz - 1] * bc_bottom;
        rhs
    }

    /// One backward-Euler step: `(I + dt * diag(inv_storage) * A_p) p_new
    /// = p_old + dt * diag(inv_storage) * rhs`.
    pub fn step_backward_euler(
        &self,
        p_prev: &DVector<f64>,
        dt: f64,
        rhs: &DVector<f64>,
    ) -> Result<DVector<f64>, SCycleError> {
        let n = self.nz;
        let mut lhs = nalgebra::DMatrix::zeros(n, n);
        for r in 0..n {
            for c in 0..n {
                lhs[(r, c)] = dt * self.inv_storage[r] * self.matrix[(r, c)];
            }
            lhs[(r, r)] += 1.0;
        }

        let mut system_rhs = DVector::zeros(n);
        for i in 0..n {
            system_rhs[i] = p_prev[i] + dt * self.inv_storage[i] * rhs[i];
        }

        let system = LinearSystemData {
            matrix: dense_to_triplets(&lhs),
            rhs: system_rhs,
            num_dofs: n,
        };
        let (p_new, _info) = self
            .backend
            .solve_linear(&system)
            .map_err(SCycleError::Backend)?;
        Ok(p_new)
    }

    /// Direct steady-state solve `A_p * p = rhs`.
    pub fn solve_steady_state(&self, rhs: &DVector<f64>) -> Result<DVector<f64>, SCycleError> {
        let system = LinearSystemData {
            matrix: dense_to_triplets(&self.matrix),
            rhs: rhs.clone(),
            num_dofs: self.nz,
        };
        let (p, _info) = self
            .backend
            .solve_linear(&system)
            .map_err(SCycleError::Backend)?;
        Ok(p)
    }
}

fn dense_to_triplets(m: &nalgebra::DMatrix<f64>) -> SparseTripletsF64 {
    let (nrows, ncols) = (m.nrows(), m.ncols());
    let mut row_indices = Vec::new();
    let mut col_indices = Vec::new();
    let mut values = Vec::new();
    for r in 0..nrows {
        for c in 0..ncols {
            let v = m[(r, c)];
            if v != 0.0 {
                row_indices.push(r);
                col_indices.push(c);
                values.push(v);
            }
        }
    }
    SparseTripletsF64 {
        nrows,
        ncols,
        row_indices,
        col_indices,
        values,
    }
}
