//! The bulk SBP-SAT solver: `setRhs`, `solve`, `stresses`, `shearOnFault`.

use nalgebra::DVector;
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use scycle_model::{BcKind, BoundaryConfig, BulkSolverKind, Grid};

use crate::backend::{self, LinearSystemData, SolverBackend, SparseTripletsF64};
use crate::error::SCycleError;
use crate::sbp::Sbp2D;

/// Whether a boundary side prescribes a displacement value (Dirichlet) or
/// a traction/flux value (Neumann): `symmFault`, `rigidFault` and
/// `remoteLoading` all pin a displacement; `freeSurface` and
/// `outGoingCharacteristics` prescribe a traction. `outGoingCharacteristics`
/// is only meaningful in the dynamic regime; the bulk (quasi-static) solver
/// treats it as a zero-flux Neumann side since it is never selected there.
fn is_dirichlet(kind: BcKind) -> bool {
    matches!(kind, BcKind::SymmFault | BcKind::RigidFault | BcKind::RemoteLoading)
}

pub struct BulkSolver {
    sbp: Sbp2D,
    ny: usize,
    nz: usize,
    mu_by_depth: Vec<f64>,
    mu_full: Vec<f64>,
    bc: BoundaryConfig,
    /// Base operator (volumetric term only, before SAT).
    base: CooMatrix<f64>,
    /// Base operator plus SAT boundary contributions, held fixed for the
    /// life of the solver (rebuilt only if the caller constructs a new
    /// `BulkSolver`, e.g. on a qd/dyn switch).
    matrix: CsrMatrix<f64>,
    d1y: CsrMatrix<f64>,
    d1z: CsrMatrix<f64>,
    backend: Box<dyn SolverBackend>,
    backend_tol: f64,
}

impl BulkSolver {
    pub fn new(grid: &Grid, mu_full: &[f64], bc: BoundaryConfig, lin_solver: BulkSolverKind, ksp_tol: f64) -> Self {
        let sbp = Sbp2D::build(grid.ny, grid.nz, grid.dy(), grid.dz(), grid.order);
        let mu_by_depth: Vec<f64> = (0..grid.nz).map(|iz| mu_full[grid.idx(0, iz)]).collect();

        let base = sbp.bulk_operator(&mu_by_depth);
        let matrix = apply_sat_to_matrix(&sbp, &base, &mu_by_depth, bc, grid.ny, grid.nz);
        let d1y = CsrMatrix::from(&sbp.d1y_full());
        let d1z = CsrMatrix::from(&sbp.d1z_full());

        Self {
            sbp,
            ny: grid.ny,
            nz: grid.nz,
            mu_by_depth,
            mu_full: mu_full.to_vec(),
            bc,
            base,
            matrix,
            d1y,
            d1z,
            backend: backend::select(lin_solver, ksp_tol),
            backend_tol: ksp_tol,
        }
    }

    fn idx(&self, iy: usize, iz: usize) -> usize {
        iy * self.nz + iz
    }

    /// Composes the SAT contributions of the four boundary vectors into a
    /// right-hand side vector, adding `body_force` (the viscous-strain
    /// back-reaction source) on top.
    pub fn set_rhs(
        &self,
        bc_l: &[f64],
        bc_r: &[f64],
        bc_t: &[f64],
        bc_b: &[f64],
        body_force: Option<&[f64]>,
    ) -> DVector<f64> {
        let n = self.ny * self.nz;
        let mut rhs = DVector::zeros(n);

        let alpha_d = self.sbp.sbp_y.alpha_d;
        let alpha_t = self.sbp.sbp_y.alpha_t;

        for iz in 0..self.nz {
            let mu = self.mu_by_depth[iz];
            let hinv0 = self.sbp.sbp_y.hinv_diag[0];
            let hinvn = self.sbp.sbp_y.hinv_diag[self.ny - 1];

            if is_dirichlet(self.bc.left) {
                rhs[self.idx(0, iz)] += alpha_d * mu * hinv0 * bc_l[iz];
            } else {
                rhs[self.idx(0, iz)] += alpha_t * hinv0 * bc_l[iz];
            }

            if is_dirichlet(self.bc.right) {
                rhs[self.idx(self.ny - 1, iz)] += alpha_d * mu * hinvn * bc_r[iz];
            } else {
                rhs[self.idx(self.ny - 1, iz)] += alpha_t * hinvn * bc_r[iz];
            }
        }

        let alpha_d_z = self.sbp.sbp_z.alpha_d;
        let alpha_t_z = self.sbp.sbp_z.alpha_t;
        let hinv0_z = self.sbp.sbp_z.hinv_diag[0];
        let hinvn_z = self.sbp.sbp_z.hinv_diag[self.nz - 1];
        for iy in 0..self.ny {
            let mu_top = self.mu_full[self.idx(iy, 0)];
            let mu_bot = self.mu_full[self.idx(iy, self.nz - 1)];

            if is_dirichlet(self.bc.top) {
                rhs[self.idx(iy, 0)] += alpha_d_z * mu_top * hinv0_z * bc_t[iy];
            } else {
                rhs[self.idx(iy, 0)] += alpha_t_z * hinv0_z * bc_t[iy];
            }

            if is_dirichlet(self.bc.bottom) {
                rhs[self.idx(iy, self.nz - 1)] += alpha_d_z * mu_bot * hinvn_z * bc_b[iy];
            } else {
                rhs[self.idx(iy, self.nz - 1)] += alpha_t_z * hinvn_z * bc_b[iy];
            }
        }

        if let Some(force) = body_force {
            for i in 0..n {
                rhs[i] += force[i];
            }
        }

        rhs
    }

    /// `solve(rhs) -> u`: the linear solve `A u = rhs`.
    pub fn solve(&self, rhs: &DVector<f64>) -> Result<DVector<f64>, SCycleError> {
        let triplets = csr_to_triplets(&self.matrix);
        let system = LinearSystemData {
            matrix: triplets,
            rhs: rhs.clone(),
            num_dofs: self.ny * self.nz,
        };
        let (u, _info) = self
            .backend
            .solve_linear(&system)
            .map_err(SCycleError::Backend)?;
        Ok(u)
    }

    /// `stresses(u) -> (sigma_xy, sigma_xz, sigma_dev)`.
    pub fn stresses(
        &self,
        u: &DVector<f64>,
        gxy: Option<&[f64]>,
        gxz: Option<&[f64]>,
    ) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
        let n = self.ny * self.nz;
        let d1y_u = &self.d1y * u;
        let d1z_u = &self.d1z * u;

        let mut sigma_xy = vec![0.0; n];
        let mut sigma_xz = vec![0.0; n];
        let mut sigma_dev = vec![0.0; n];
        for i in 0..n {
            let gxy_i = gxy.map(|g| g[i]).unwrap_or(0.0);
            let gxz_i = gxz.map(|g| g[i]).unwrap_or(0.0);
            sigma_xy[i] = self.mu_full[i] * (d1y_u[i] - gxy_i);
            sigma_xz[i] = self.mu_full[i] * (d1z_u[i] - gxz_i);
            sigma_dev[i] = (sigma_xy[i] * sigma_xy[i] + sigma_xz[i] * sigma_xz[i]).sqrt();
        }
        (sigma_xy, sigma_xz, sigma_dev)
    }

    /// Extracts the first `Nz` entries of `sigma_xy`, the fault-plane shear
    /// traction `tau_qs`.
    pub fn shear_on_fault(&self, sigma_xy: &[f64]) -> Vec<f64> {
        sigma_xy[0..self.nz].to_vec()
    }

    /// Raw matrix-vector product `A * u` against the assembled (base +
    /// SAT) system matrix, used by the explicit dynamic integrator which
    /// needs `A*u` directly rather than a solve of `A*u = rhs`.
    pub fn matvec(&self, u: &DVector<f64>) -> DVector<f64> {
        &self.matrix * u
    }

    /// Body-force contribution of the power-law viscous strain tensor,
    /// substituted into the momentum balance: `-(D1y(mu*gxy) +
    /// D1z(mu*gxz))`, so that `solve` still returns the elastic
    /// displacement field while the viscous strain back-reacts on it.
    pub fn viscous_body_force(&self, gxy: &[f64], gxz: &[f64]) -> Vec<f64> {
        let n = self.ny * self.nz;
        let mu_gxy = DVector::from_fn(n, |i, _| self.mu_full[i] * gxy[i]);
        let mu_gxz = DVector::from_fn(n, |i, _| self.mu_full[i] * gxz[i]);
        let term = &self.d1y * &mu_gxy + &self.d1z * &mu_gxz;
        (0..n).map(|i| -term[i]).collect()
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn ksp_tol(&self) -> f64 {
        self.backend_tol
    }
}

fn apply_sat_to_matrix(
    sbp: &Sbp2D,
    base: &CooMatrix<f64>,
    mu_by_depth: &[f64],
    bc: BoundaryConfig,
    ny: usize,
    nz: usize,
) -> CsrMatrix<f64> {
    let mut coo = CooMatrix::new(ny * nz, ny * nz);
    for (r, c, &v) in base.triplet_iter() {
        coo.push(r, c, v);
    }
    let idx = |iy: usize, iz: usize| iy * nz + iz;

    let alpha_d = sbp.sbp_y.alpha_d;
    let alpha_t = sbp.sbp_y.alpha_t;
    let hinv0 = sbp.sbp_y.hinv_diag[0];
    let hinvn = sbp.sbp_y.hinv_diag[ny - 1];

    for iz in 0..nz {
        let mu = mu_by_depth[iz];
        if is_dirichlet(bc.left) {
            coo.push(idx(0, iz), idx(0, iz), alpha_d * mu * hinv0);
        } else {
            for c in 0..ny {
                let v = sbp.sbp_y.d1[(0, c)];
                if v != 0.0 {
                    coo.push(idx(0, iz), idx(c, iz), alpha_t * hinv0 * mu * v);
                }
            }
        }
        if is_dirichlet(bc.right) {
            coo.push(idx(ny - 1, iz), idx(ny - 1, iz), alpha_d * mu * hinvn);
        } else {
            for c in 0..ny {
                let v = sbp.sbp_y.d1[(ny - 1, c)];
                if v != 0.0 {
                    coo.push(idx(ny - 1, iz), idx(c, iz), alpha_t * hinvn * mu * v);
                }
            }
        }
    }

    let alpha_d_z = sbp.sbp_z.alpha_d;
    let alpha_t_z = sbp.sbp_z.alpha_t;
    let hinv0_z = sbp.sbp_z.hinv_diag[0];
    let hinvn_z = sbp.sbp_z.hinv_diag[nz - 1];
    for iy in 0..ny {
        let mu_top = mu_by_depth[0];
        let mu_bot = mu_by_depth[nz - 1];
        if is_dirichlet(bc.top) {
            coo.push(idx(iy, 0), idx(iy, 0), alpha_d_z * mu_top * hinv0_z);
        } else {
            for c in 0..nz {
                let v = sbp.sbp_z.d1[(0, c)];
                if v != 0.0 {
                    coo.push(idx(iy, 0), idx(iy, c), alpha_t_z * hinv0_z * mu_top * v);
                }
            }
        }
        if is_dirichlet(bc.bottom) {
            coo.push(idx(iy, nz - 1), idx(iy, nz - 1), alpha_d_z * mu_bot * hinvn_z);
        } else {
            for c in 0..nz {
                let v = sbp.sbp_z.d1[(nz - 1, c)];
                if v != 0.0 {
                    coo.push(idx(iy, nz - 1), idx(iy, c), alpha_t_z * hinvn_z * mu_bot * v);
                }
            }
        }
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
