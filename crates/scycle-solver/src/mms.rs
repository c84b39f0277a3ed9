//! Method-of-manufactured-solutions convergence harness for the bulk
//! elasticity operator.
//!
//! Grounded on the (mostly commented-out) `MMS_*` function family in
//! `genFuncs.hpp`: an analytic displacement field plus the forcing and
//! boundary data it implies, used to verify that the discrete operator
//! converges at the expected SBP order. This module is never touched by
//! [`crate::coordinator::Coordinator`] — it exists solely for the
//! convergence test in this crate's `tests/` directory and is the one
//! place allowed to overwrite a "live" field with analytic data, since it
//! never shares a coordinator's integrand map.

use nalgebra::DVector;
use scycle_model::{BcKind, BoundaryConfig, BulkSolverKind, Grid, SbpType};

use crate::bulk::BulkSolver;
use crate::error::SCycleError;

/// `u_A(y,z) = sin(pi y / Ly) * sin(pi z / Lz)`, a field that vanishes on
/// all four sides of the `[0,Ly] x [0,Lz]` domain and is smooth to
/// arbitrary order, suiting a pure-Dirichlet convergence test.
pub fn analytic_solution(y: f64, z: f64, ly: f64, lz: f64) -> f64 {
    let ky = std::f64::consts::PI / ly;
    let kz = std::f64::consts::PI / lz;
    (ky * y).sin() * (kz * z).sin()
}

/// Forcing consistent with the constant-coefficient operator
/// `-mu*(u_yy + u_zz)` solved by [`BulkSolver`]: for `u_A` above,
/// `u_yy = -ky^2 u_A` and `u_zz = -kz^2 u_A`, so the body force that
/// reproduces `u_A` exactly is `mu*(ky^2 + kz^2)*u_A`.
pub fn analytic_forcing(y: f64, z: f64, mu: f64, ly: f64, lz: f64) -> f64 {
    let ky = std::f64::consts::PI / ly;
    let kz = std::f64::consts::PI / lz;
    mu * (ky * ky + kz * kz) * analytic_solution(y, z, ly, lz)
}

/// One resolution's worth of convergence data.
#[derive(Debug, Clone, Copy)]
pub struct ConvergenceResult {
    pub n: usize,
    pub h: f64,
    pub l2_error: f64,
}

/// Builds a [`BulkSolver`] at each `n` in `resolutions` (`Ny = Nz = n`),
/// forces it with the analytic body force and homogeneous Dirichlet
/// boundary data, and reports the discrete L2 error against `u_A`.
pub fn run_convergence_sweep(
    resolutions: &[usize],
    order: usize,
    mu0: f64,
    ly: f64,
    lz: f64,
) -> Result<Vec<ConvergenceResult>, SCycleError> {
    resolutions
        .iter()
        .map(|&n| single_resolution(n, order, mu0, ly, lz))
        .collect()
}

fn single_resolution(n: usize, order: usize, mu0: f64, ly: f64, lz: f64) -> Result<ConvergenceResult, SCycleError> {
    let grid = Grid::new(n, n, ly, lz, order, SbpType::FullyCompatible)?;
    let mu_full = vec![mu0; grid.num_nodes()];
    let bc = BoundaryConfig {
        left: BcKind::RigidFault,
        right: BcKind::RigidFault,
        top: BcKind::RigidFault,
        bottom: BcKind::RigidFault,
    };
    let solver = BulkSolver::new(&grid, &mu_full, bc, BulkSolverKind::DirectLu, 1e-12);

    let y_coords = grid.y_coords();
    let z_coords = grid.z_coords();

    let bc_l: Vec<f64> = z_coords.iter().map(|&z| analytic_solution(0.0, z, ly, lz)).collect();
    let bc_r: Vec<f64> = z_coords.iter().map(|&z| analytic_solution(ly, z, ly, lz)).collect();
    let bc_t: Vec<f64> = y_coords.iter().map(|&y| analytic_solution(y, 0.0, ly, lz)).collect();
    let bc_b: Vec<f64> = y_coords.iter().map(|&y| analytic_solution(y, lz, ly, lz)).collect();

    let body_force: Vec<f64> = (0..grid.ny)
        .flat_map(|iy| {
            let y = y_coords[iy];
            (0..grid.nz).map(move |iz| (iy, iz, y))
        })
        .map(|(_iy, iz, y)| analytic_forcing(y, z_coords[iz], mu0, ly, lz))
        .collect();

    let rhs = solver.set_rhs(&bc_l, &bc_r, &bc_t, &bc_b, Some(&body_force));
    let u = solver.solve(&rhs)?;

    let u_exact = DVector::from_fn(grid.num_nodes(), |i, _| {
        let iy = i / grid.nz;
        let iz = i % grid.nz;
        analytic_solution(y_coords[iy], z_coords[iz], ly, lz)
    });

    let diff = &u - &u_exact;
    let l2_error = (diff.norm_squared() * grid.dy() * grid.dz()).sqrt();

    Ok(ConvergenceResult { n, h: grid.dy().min(grid.dz()), l2_error })
}

/// `log2(err_k / err_{k+1})` between successive sweep entries, the
/// empirical convergence order used by the §8 manufactured-solution test.
pub fn observed_orders(results: &[ConvergenceResult]) -> Vec<f64> {
    results
        .windows(2)
        .map(|pair| (pair[0].l2_error / pair[1].l2_error).log2())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_decreases_monotonically_with_resolution() {
        let results = run_convergence_sweep(&[11, 21, 41], 4, 30e9, 10_000.0, 10_000.0).unwrap();
        assert!(results[0].l2_error > results[1].l2_error);
        assert!(results[1].l2_error > results[2].l2_error);
    }

    #[test]
    fn fourth_order_sbp_converges_at_roughly_fourth_order() {
        let results = run_convergence_sweep(&[11, 21, 41, 81], 4, 30e9, 10_000.0, 10_000.0).unwrap();
        let orders = observed_orders(&results);
        for order in orders {
            assert!(order > 3.0, "expected roughly 4th-order convergence, got {order}");
        }
    }

    #[test]
    fn second_order_sbp_converges_at_roughly_second_order() {
        let results = run_convergence_sweep(&[11, 21, 41, 81], 2, 30e9, 10_000.0, 10_000.0).unwrap();
        let orders = observed_orders(&results);
        for order in orders {
            assert!(order > 1.5, "expected roughly 2nd-order convergence, got {order}");
        }
    }
}
