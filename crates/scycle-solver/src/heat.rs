//! The transient/steady-state heat equation solved on the same SBP-SAT
//! grid as the bulk elasticity problem, with conductivity `k` playing the
//! role `mu` plays in [`crate::bulk`].
//!
//! Grounded on `heatEquation.cpp`, which owns a separate `SbpOps` instance
//! from the elastic bulk solver (the two fields use independent material
//! profiles) but assembles its SAT boundary terms the same way: Dirichlet
//! at the top, bottom and right edges, Neumann (prescribed flux) on the
//! left edge where frictional heat enters from the fault.

use nalgebra::DVector;
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use scycle_model::Grid;

use crate::backend::{self, LinearSystemData, SolverBackend, SparseTripletsF64};
use crate::error::SCycleError;
use crate::sbp::Sbp2D;

/// `Qrad(z) = A0(z) * exp(-z / Lrad)`, the radioactive heat production
/// term. `z` is measured positive down from the surface.
pub fn radioactive_heat_generation(z: &[f64], a0_by_depth: &[f64], lrad: f64) -> Vec<f64> {
    z.iter()
        .zip(a0_by_depth)
        .map(|(&zi, &a0)| a0 * (-zi / lrad).exp())
        .collect()
}

/// Shear heating from power-law viscous deformation: `sigma_xy * dgxy/dt +
/// sigma_xz * dgxz/dt`, the rate of mechanical work converted to heat.
pub fn viscous_shear_heating(
    sigma_xy: &[f64],
    sigma_xz: &[f64],
    dgxy_dt: &[f64],
    dgxz_dt: &[f64],
) -> Vec<f64> {
    sigma_xy
        .iter()
        .zip(sigma_xz)
        .zip(dgxy_dt.iter().zip(dgxz_dt))
        .map(|((&sxy, &sxz), (&dgxy, &dgxz))| sxy * dgxy + sxz * dgxz)
        .collect()
}

/// Frictional heat generation rate per unit fault area, `tau * V`, applied
/// as a Neumann flux on the left (fault) boundary.
pub fn frictional_heat_flux(tau: &[f64], v: &[f64]) -> Vec<f64> {
    tau.iter().zip(v).map(|(&t, &v)| t * v).collect()
}

/// Gaussian shear-zone weight `G_w(y) = exp(-y^2 / (2 w^2)) / (sqrt(2 pi) w)`.
fn gaussian_weight(y: f64, w: f64) -> f64 {
    (-(y * y) / (2.0 * w * w)).exp() / ((2.0 * std::f64::consts::PI).sqrt() * w)
}

/// Frictional heating distributed as a volumetric source across a
/// shear zone of width `w(z)` centered on the fault, rather than applied
/// as a boundary flux. `tau`/`v`/`w_by_depth` are length-`nz` depth
/// profiles; the result is a full-grid source (length `ny*nz`).
pub fn frictional_heat_volumetric(
    grid: &Grid,
    tau: &[f64],
    v: &[f64],
    w_by_depth: &[f64],
) -> Vec<f64> {
    let mut q = vec![0.0; grid.num_nodes()];
    let y_coords = grid.y_coords();
    for iz in 0..grid.nz {
        let rate = tau[iz] * v[iz];
        let w = w_by_depth[iz];
        for (iy, &y) in y_coords.iter().enumerate() {
            q[grid.idx(iy, iz)] = rate * gaussian_weight(y, w);
        }
    }
    q
}

/// The heat-equation SBP-SAT operator: Dirichlet on top/bottom/right,
/// Neumann (flux) on the left, fixed regardless of the bulk problem's
/// boundary configuration.
pub struct HeatSolver {
    sbp: Sbp2D,
    ny: usize,
    nz: usize,
    k_by_depth: Vec<f64>,
    inv_rho_c: Vec<f64>,
    /// `A_k = -(D2y + D2z)(k) + SAT`, solving `A_k * T = rhs` for the
    /// steady-state problem and forming the implicit operator for the
    /// transient backward-Euler step.
    matrix: CsrMatrix<f64>,
    backend: Box<dyn SolverBackend>,
}

impl HeatSolver {
    pub fn new(
        grid: &Grid,
        k_full: &[f64],
        rho_full: &[f64],
        c_full: &[f64],
        lin_solver: scycle_model::BulkSolverKind,
        ksp_tol: f64,
    ) -> Self {
        let sbp = Sbp2D::build(grid.ny, grid.nz, grid.dy(), grid.dz(), grid.order);
        let k_by_depth: Vec<f64> = (0..grid.nz).map(|iz| k_full[grid.idx(0, iz)]).collect();

        let base = sbp.bulk_operator(&k_by_depth);
        let matrix = apply_heat_sat(&sbp, &base, &k_by_depth, grid.ny, grid.nz);

        let inv_rho_c: Vec<f64> = rho_full
            .iter()
            .zip(c_full)
            .map(|(&rho, &c)| 1.0 / (rho * c))
            .collect();

        Self {
            sbp,
            ny: grid.ny,
            nz: grid.nz,
            k_by_depth,
            inv_rho_c,
            matrix,
            backend: backend::select(lin_solver, ksp_tol),
        }
    }

    fn idx(&self, iy: usize, iz: usize) -> usize {
        iy * self.nz + iz
    }

    /// Composes the SAT contribution of the boundary data plus the
    /// volumetric source into a right-hand side vector.
    pub fn assemble_rhs(&self, bc_l_flux: &[f64], bc_t: &[f64], bc_b: &[f64], bc_r: &[f64], source: &[f64]) -> DVector<f64> {
        let n = self.ny * self.nz;
        let mut rhs = DVector::zeros(n);

        let alpha_t = self.sbp.sbp_y.alpha_t;
        let alpha_d = self.sbp.sbp_y.alpha_d;
        let hinv0 = self.sbp.sbp_y.hinv_diag[0];
        let hinvn = self.sbp.sbp_y.hinv_diag[self.ny - 1];

        for iz in 0..self.nz {
            let k = self.k_by_depth[iz];
            rhs[self.idx(0, iz)] += alpha_t * hinv0 * bc_l_flux[iz];
            rhs[self.idx(self.ny - 1, iz)] += alpha_d * k * hinvn * bc_r[iz];
        }

        let alpha_d_z = self.sbp.sbp_z.alpha_d;
        let hinv0_z = self.sbp.sbp_z.hinv_diag[0];
        let hinvn_z = self.sbp.sbp_z.hinv_diag[self.nz - 1];
        let k_top = self.k_by_depth[0];
        let k_bot = self.k_by_depth[self.nz - 1];
        for iy in 0..self.ny {
            rhs[self.idx(iy, 0)] += alpha_d_z * k_top * hinv0_z * bc_t[iy];
            rhs[self.idx(iy, self.nz - 1)] += alpha_d_z * k_bot * hinvn_z * bc_b[iy];
        }

        for i in 0..n {
            rhs[i] += source[i];
        }
        rhs
    }

    /// Solves the steady-state problem `A_k * T = rhs` directly.
    pub fn solve_steady_state(&self, rhs: &DVector<f64>) -> Result<DVector<f64>, SCycleError> {
        let system = LinearSystemData {
            matrix: csr_to_triplets(&self.matrix),
            rhs: rhs.clone(),
            num_dofs: self.ny * self.nz,
        };
        let (t, _info) = self
            .backend
            .solve_linear(&system)
            .map_err(SCycleError::Backend)?;
        Ok(t)
    }

    /// Advances the transient equation one backward-Euler step:
    /// `(I + dt * diag(1/(rho c)) * A_k) T_new = T_old + dt * diag(1/(rho c)) * rhs`.
    ///
    /// The implicit system is rebuilt fresh each call since `dt` varies
    /// step-to-step under adaptive stepping; see `DESIGN.md` for the
    /// tradeoff against reusing a single factorization.
    pub fn step_backward_euler(
        &self,
        t_prev: &DVector<f64>,
        dt: f64,
        rhs: &DVector<f64>,
    ) -> Result<DVector<f64>, SCycleError> {
        let n = self.ny * self.nz;
        let mut coo = CooMatrix::new(n, n);
        for (r, c, &v) in self.matrix.triplet_iter() {
            coo.push(r, c, dt * self.inv_rho_c[r] * v);
        }
        for i in 0..n {
            coo.push(i, i, 1.0);
        }
        let lhs = CsrMatrix::from(&coo);

        let mut system_rhs = DVector::zeros(n);
        for i in 0..n {
            system_rhs[i] = t_prev[i] + dt * self.inv_rho_c[i] * rhs[i];
        }

        let system = LinearSystemData {
            matrix: csr_to_triplets(&lhs),
            rhs: system_rhs,
            num_dofs: n,
        };
        let (t_new, _info) = self
            .backend
            .solve_linear(&system)
            .map_err(SCycleError::Backend)?;
        Ok(t_new)
    }
}

fn apply_heat_sat(sbp: &Sbp2D, base: &CooMatrix<f64>, k_by_depth: &[f64], ny: usize, nz: usize) -> CsrMatrix<f64> {
    let mut coo = CooMatrix::new(ny * nz, ny * nz);
    for (r, c, &v) in base.triplet_iter() {
        coo.push(r, c, v);
    }
    let idx = |iy: usize, iz: usize| iy * nz + iz;

    let alpha_t = sbp.sbp_y.alpha_t;
    let alpha_d = sbp.sbp_y.alpha_d;
    let hinv0 = sbp.sbp_y.hinv_diag[0];
    let hinvn = sbp.sbp_y.hinv_diag[ny - 1];

    for iz in 0..nz {
        let k = k_by_depth[iz];
        // Left: Neumann (flux), frictional heat enters through here.
        for c in 0..ny {
            let v = sbp.sbp_y.d1[(0, c)];
            if v != 0.0 {
                coo.push(idx(0, iz), idx(c, iz), alpha_t * hinv0 * k * v);
            }
        }
        // Right: Dirichlet.
        coo.push(idx(ny - 1, iz), idx(ny - 1, iz), alpha_d * k * hinvn);
    }

    let alpha_d_z = sbp.sbp_z.alpha_d;
    let hinv0_z = sbp.sbp_z.hinv_diag[0];
    let hinvn_z = sbp.sbp_z.hinv_diag[nz - 1];
    let k_top = k_by_depth[0];
    let k_bot = k_by_depth[nz - 1];
    for iy in 0..ny {
        // Top and bottom: Dirichlet.
        coo.push(idx(iy, 0), idx(iy, 0), alpha_d_z * k_top * hinv0_z);
        coo.push(idx(iy, nz - 1), idx(iy, nz - 1), alpha_d_z * k_bot * hinvn_z);
    }

    CsrMatrix::from(&coo)
}

fn csr_to_triplets(m: &CsrMatrix<f64>) -> SparseTripletsF64 {
    let (nrows, ncols) = (m.nrows(), m.ncols());
    let mut row_indices = Vec::with_capacity(m.nnz());
    let mut col_indices = Vec::with_capacity(m.nnz());
    let mut values = Vec::with_capacity(m.nnz());
    for (r, c, &v) in m.triplet_iter() {
        row_indices.push(r);
        col_indices.push(c);
        values.push(v);
    }
    SparseTripletsF64 {
        nrows,
        ncols,
        row_indices,
        col_indices,
        values,
    }
}
