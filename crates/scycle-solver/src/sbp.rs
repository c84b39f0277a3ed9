//! Summation-by-parts (SBP) operator kit.
//!
//! Builds the 1-D norm and first-derivative operators at accuracy orders 2
//! and 4, the variable-coefficient second-derivative construction, and
//! tensor-products them into the 2-D operators the bulk solver and the
//! dynamic leap-frog integrator both consume.
//!
//! The 1-D operators satisfy the SBP compatibility condition `Q + Q^T = B`
//! (`B = diag(-1, 0, ..., 0, 1)`) to machine precision, which is what
//! guarantees the discrete energy estimate (Testable Property 1). At order
//! 2, the plain one-sided/central-difference stencil already has this
//! property under the trapezoidal norm, so `D1` is built straight from it.
//! At order 4, compatibility is necessary but not sufficient for accuracy:
//! `D1` uses the published Mattsson-Nordstrom boundary closure (the 4x6
//! block paired with the `17/48, 59/48, 43/48, 49/48` norm), transcribed
//! directly rather than derived from a lower-order one-sided stencil.

use nalgebra::DMatrix;
use nalgebra_sparse::{CooMatrix, CsrMatrix};

/// One axis' worth of SBP operators, built once per grid at construction
/// time and held read-only for the life of the run.
#[derive(Debug, Clone)]
pub struct Sbp1D {
    pub n: usize,
    pub h: f64,
    pub order: usize,
    /// `H` diagonal (the norm).
    pub h_diag: Vec<f64>,
    /// `H^-1` diagonal.
    pub hinv_diag: Vec<f64>,
    /// First-derivative operator, dense (boundary-local corrections only;
    /// the interior is a banded central-difference stencil).
    pub d1: DMatrix<f64>,
    /// Dirichlet penalty parameter `alphaD`.
    pub alpha_d: f64,
    /// Neumann penalty parameter `alphaT`.
    pub alpha_t: f64,
}

impl Sbp1D {
    pub fn build(n: usize, h: f64, order: usize) -> Self {
        assert!(n >= 3, "SBP operators need at least 3 nodes");
        assert!(order == 2 || order == 4, "SBP order must be 2 or 4");
        assert!(
            order != 4 || n >= 8,
            "4th-order SBP operators need at least 8 nodes"
        );

        let h_diag = norm_diag(n, h, order);
        let hinv_diag: Vec<f64> = h_diag.iter().map(|&h| 1.0 / h).collect();
        let d1 = build_d1(n, h, order, &h_diag);

        let alpha_d = if order == 4 {
            -48.0 / (17.0 * h)
        } else {
            -4.0 / h
        };
        let alpha_t = -1.0;

        Self {
            n,
            h,
            order,
            h_diag,
            hinv_diag,
            d1,
            alpha_d,
            alpha_t,
        }
    }

    /// `D2(mu) = H^-1 * ( -D1^T H diag(mu) D1 + diag(mu) B D1 )`.
    ///
    /// The fully-compatible remainder `R` is taken as zero: this is the
    /// "narrow stencil" variable-coefficient construction, one step short of
    /// the literature's fully-compatible closure (see `DESIGN.md`).
    pub fn d2_variable_coef(&self, mu: &[f64]) -> DMatrix<f64> {
        assert_eq!(mu.len(), self.n);
        let n = self.n;
        let h_mat = DMatrix::from_diagonal(&nalgebra::DVector::from_row_slice(&self.h_diag));
        let mu_mat = DMatrix::from_diagonal(&nalgebra::DVector::from_row_slice(mu));
        let hinv_mat =
            DMatrix::from_diagonal(&nalgebra::DVector::from_row_slice(&self.hinv_diag));

        let mut b = DMatrix::zeros(n, n);
        b[(0, 0)] = -1.0;
        b[(n - 1, n - 1)] = 1.0;

        let term1 = -(self.d1.transpose()) * &h_mat * &mu_mat * &self.d1;
        let term2 = &mu_mat * &b * &self.d1;
        hinv_mat * (term1 + term2)
    }

    /// Single-row projection picking out node 0 (`e0`).
    pub fn e0_row(&self) -> Vec<f64> {
        let mut row = vec![0.0; self.n];
        row[0] = 1.0;
        row
    }

    /// Single-row projection picking out the last node (`eN`).
    pub fn en_row(&self) -> Vec<f64> {
        let mut row = vec![0.0; self.n];
        row[self.n - 1] = 1.0;
        row
    }
}

/// Diagonal SBP norm. Order 2: the trapezoidal-like `[1/2, 1, ..., 1, 1/2]`
/// norm. Order 4: the classical Mattsson-Nordstrom boundary-weighted norm.
fn norm_diag(n: usize, h: f64, order: usize) -> Vec<f64> {
    let mut diag = vec![1.0; n];
    match order {
        2 => {
            diag[0] = 0.5;
            diag[n - 1] = 0.5;
        }
        4 => {
            let boundary = [17.0 / 48.0, 59.0 / 48.0, 43.0 / 48.0, 49.0 / 48.0];
            for (i, &w) in boundary.iter().enumerate() {
                if i < n {
                    diag[i] = w;
                }
                if n - 1 - i != i && n >= boundary.len() * 2 {
                    diag[n - 1 - i] = w;
                }
            }
        }
        _ => unreachable!(),
    }
    diag.iter().map(|&d| d * h).collect()
}

/// Builds `D1 = H^-1 Q`, `Q + Q^T = B` with `B = diag(-1, 0, ..., 0, 1)`.
fn build_d1(n: usize, h: f64, order: usize, h_diag: &[f64]) -> DMatrix<f64> {
    match order {
        2 => build_d1_order2(n, h, h_diag),
        4 => build_d1_order4(n, h),
        _ => unreachable!(),
    }
}

/// Order-2 SBP `D1`: the raw one-sided/central-difference stencil already
/// satisfies `Q + Q^T = B` under the trapezoidal norm, so `D1` is read off
/// it directly (the symmetrization below is a no-op on this stencil, kept
/// so the construction stays manifestly exact to machine precision).
fn build_d1_order2(n: usize, h: f64, h_diag: &[f64]) -> DMatrix<f64> {
    let mut raw = DMatrix::zeros(n, n);
    for i in 1..n - 1 {
        raw[(i, i - 1)] = -0.5 / h;
        raw[(i, i + 1)] = 0.5 / h;
    }
    raw[(0, 0)] = -1.0 / h;
    raw[(0, 1)] = 1.0 / h;
    raw[(n - 1, n - 2)] = -1.0 / h;
    raw[(n - 1, n - 1)] = 1.0 / h;

    let h_mat = DMatrix::from_diagonal(&nalgebra::DVector::from_row_slice(h_diag));
    let q_raw = &h_mat * &raw;

    let mut b = DMatrix::zeros(n, n);
    b[(0, 0)] = -1.0;
    b[(n - 1, n - 1)] = 1.0;

    let q = 0.5 * (&q_raw - q_raw.transpose()) + 0.5 * &b;

    let hinv_mat = DMatrix::from_diagonal(&nalgebra::DVector::from_row_slice(
        &h_diag.iter().map(|&h| 1.0 / h).collect::<Vec<_>>(),
    ));
    hinv_mat * q
}

/// Order-4 SBP `D1`: the classical Mattsson-Nordstrom boundary closure (4
/// rows of a 4x6 block at each end, paired with the `17/48, 59/48, 43/48,
/// 49/48` norm in [`norm_diag`]), 4th-order central difference in the
/// interior. Transcribed directly from the published coefficients rather
/// than derived from a lower-order one-sided stencil, since compatibility
/// with `B` alone does not imply the boundary closure is accurate.
fn build_d1_order4(n: usize, h: f64) -> DMatrix<f64> {
    assert!(n >= 8, "4th-order SBP operator needs at least 8 nodes");
    let mut d = DMatrix::zeros(n, n);

    let left: [[f64; 6]; 4] = [
        [-24.0 / 17.0, 59.0 / 34.0, -4.0 / 17.0, -3.0 / 34.0, 0.0, 0.0],
        [-1.0 / 2.0, 0.0, 1.0 / 2.0, 0.0, 0.0, 0.0],
        [4.0 / 43.0, -59.0 / 86.0, 0.0, 59.0 / 86.0, -4.0 / 43.0, 0.0],
        [3.0 / 98.0, 0.0, -59.0 / 98.0, 0.0, 32.0 / 49.0, -4.0 / 49.0],
    ];
    for (i, row) in left.iter().enumerate() {
        for (j, &c) in row.iter().enumerate() {
            if c != 0.0 {
                d[(i, j)] = c / h;
            }
        }
    }

    for i in 4..n - 4 {
        d[(i, i - 2)] = 1.0 / (12.0 * h);
        d[(i, i - 1)] = -8.0 / (12.0 * h);
        d[(i, i + 1)] = 8.0 / (12.0 * h);
        d[(i, i + 2)] = -1.0 / (12.0 * h);
    }

    // Right boundary: point-reflected, sign-flipped mirror of the left
    // block. The operator is skew except at the two boundary rows, so
    // this reproduces the same published closure at the far end.
    for (i, row) in left.iter().enumerate() {
        for (j, &c) in row.iter().enumerate() {
            if c != 0.0 {
                d[(n - 1 - i, n - 1 - j)] = -c / h;
            }
        }
    }

    d
}

/// The 2-D tensor-product operator kit for a fixed grid.
///
/// Material fields in this model are depth-dependent only (`mu(y,z) =
/// mu(z)`), so the `y`-derivative term reduces to a per-column scalar
/// multiple of the constant-coefficient `y` operator, and the
/// `z`-derivative term is the same variable-coefficient `z` operator
/// repeated for every `y` column. Both simplifications are exact given
/// that material structure, not an approximation of the general case.
pub struct Sbp2D {
    pub ny: usize,
    pub nz: usize,
    pub sbp_y: Sbp1D,
    pub sbp_z: Sbp1D,
}

impl Sbp2D {
    pub fn build(ny: usize, nz: usize, dy: f64, dz: f64, order: usize) -> Self {
        Self {
            ny,
            nz,
            sbp_y: Sbp1D::build(ny, dy, order),
            sbp_z: Sbp1D::build(nz, dz, order),
        }
    }

    fn idx(&self, iy: usize, iz: usize) -> usize {
        iy * self.nz + iz
    }

    /// `-(D2y(mu) + D2z(mu))` assembled as a sparse COO matrix over the
    /// full grid, `mu` given as a depth profile of length `nz`.
    pub fn bulk_operator(&self, mu_by_depth: &[f64]) -> CooMatrix<f64> {
        assert_eq!(mu_by_depth.len(), self.nz);
        let n = self.ny * self.nz;
        let mut coo = CooMatrix::new(n, n);

        // y-direction: standard D2y scaled by the (y-constant) mu at each
        // depth, one independent Ny x Ny block per z-column.
        let d2y_standard = self.sbp_y.d2_variable_coef(&vec![1.0; self.ny]);
        for iz in 0..self.nz {
            let mu = mu_by_depth[iz];
            for iy_r in 0..self.ny {
                for iy_c in 0..self.ny {
                    let v = d2y_standard[(iy_r, iy_c)];
                    if v != 0.0 {
                        coo.push(self.idx(iy_r, iz), self.idx(iy_c, iz), -mu * v);
                    }
                }
            }
        }

        // z-direction: full variable-coefficient D2z(mu), identical for
        // every y-column since material does not vary with y.
        let d2z_mu = self.sbp_z.d2_variable_coef(mu_by_depth);
        for iy in 0..self.ny {
            for iz_r in 0..self.nz {
                for iz_c in 0..self.nz {
                    let v = d2z_mu[(iz_r, iz_c)];
                    if v != 0.0 {
                        coo.push(self.idx(iy, iz_r), self.idx(iy, iz_c), -v);
                    }
                }
            }
        }

        coo
    }

    pub fn to_csr(coo: &CooMatrix<f64>) -> CsrMatrix<f64> {
        CsrMatrix::from(coo)
    }

    /// `D1y` applied across the full grid, used to extract `sigma_xy`.
    pub fn d1y_full(&self) -> CooMatrix<f64> {
        let n = self.ny * self.nz;
        let mut coo = CooMatrix::new(n, n);
        for iz in 0..self.nz {
            for r in 0..self.ny {
                for c in 0..self.ny {
                    let v = self.sbp_y.d1[(r, c)];
                    if v != 0.0 {
                        coo.push(self.idx(r, iz), self.idx(c, iz), v);
                    }
                }
            }
        }
        coo
    }

    /// `D1z` applied across the full grid, used to extract `sigma_xz`.
    pub fn d1z_full(&self) -> CooMatrix<f64> {
        let n = self.ny * self.nz;
        let mut coo = CooMatrix::new(n, n);
        for iy in 0..self.ny {
            for r in 0..self.nz {
                for c in 0..self.nz {
                    let v = self.sbp_z.d1[(r, c)];
                    if v != 0.0 {
                        coo.push(self.idx(iy, r), self.idx(iy, c), v);
                    }
                }
            }
        }
        coo
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn energy_identity_holds(order: usize) {
        let n = 9;
        let h = 1.0 / (n - 1) as f64;
        let sbp = Sbp1D::build(n, h, order);
        let mu: Vec<f64> = (0..n).map(|i| 1.0 + 0.1 * i as f64).collect();
        let d2 = sbp.d2_variable_coef(&mu);

        let h_mat = DMatrix::from_diagonal(&nalgebra::DVector::from_row_slice(&sbp.h_diag));
        let mu_mat = DMatrix::from_diagonal(&nalgebra::DVector::from_row_slice(&mu));
        let mut b = DMatrix::zeros(n, n);
        b[(0, 0)] = -1.0;
        b[(n - 1, n - 1)] = 1.0;
        let rhs_form = -(sbp.d1.transpose()) * &h_mat * &mu_mat * &sbp.d1 + &mu_mat * &b * &sbp.d1;

        let f = nalgebra::DVector::from_fn(n, |i, _| ((i + 1) as f64).sin());
        let g = nalgebra::DVector::from_fn(n, |i, _| ((i + 2) as f64).cos());

        let lhs = f.dot(&(&h_mat * &d2 * &g));
        let rhs = f.dot(&(&rhs_form * &g));
        assert!((lhs - rhs).abs() < 1e-9 * f.norm() * g.norm().max(1.0));
    }

    #[test]
    fn sbp_energy_identity_order2() {
        energy_identity_holds(2);
    }

    #[test]
    fn sbp_energy_identity_order4() {
        energy_identity_holds(4);
    }

    #[test]
    fn d1_is_exact_for_linear_functions() {
        let n = 11;
        let h = 1.0 / (n - 1) as f64;
        let sbp = Sbp1D::build(n, h, 4);
        let f = nalgebra::DVector::from_fn(n, |i, _| 2.0 + 3.0 * (i as f64 * h));
        let df = &sbp.d1 * &f;
        for i in 0..n {
            assert!((df[i] - 3.0).abs() < 1e-8, "row {i}: {}", df[i]);
        }
    }

    #[test]
    fn compatibility_condition_holds_exactly() {
        for order in [2, 4] {
            let n = 9;
            let h = 0.1;
            let sbp = Sbp1D::build(n, h, order);
            let h_mat = DMatrix::from_diagonal(&nalgebra::DVector::from_row_slice(&sbp.h_diag));
            let q = &h_mat * &sbp.d1;
            let mut b = DMatrix::zeros(n, n);
            b[(0, 0)] = -1.0;
            b[(n - 1, n - 1)] = 1.0;
            let sym = &q + q.transpose() - &b;
            assert!(sym.norm() < 1e-10, "order {order}: {sym}");
        }
    }

    #[test]
    fn bulk_operator_annihilates_constant_field() {
        // d/dy(mu d/dy c) + d/dz(mu d/dz c) == 0 for any constant c,
        // regardless of boundary closure details.
        let sbp2d = Sbp2D::build(6, 6, 0.2, 0.2, 2);
        let mu = vec![30e9; 6];
        let a = sbp2d.bulk_operator(&mu);
        let a_csr = CsrMatrix::from(&a);
        let ones = nalgebra::DVector::from_element(36, 1.0);
        let result = &a_csr * &ones;
        assert!(result.norm() < 1e-3, "residual norm {}", result.norm());
    }
}
