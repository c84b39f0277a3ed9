//! Solver-side fault friction closure: the rate-and-state strength law,
//! the bisection rootfinder for slip velocity, and the aging-law state
//! evolution.
//!
//! [`scycle_model::FaultLine`] only stores the fault's data; this module
//! owns the nonlinear solve that couples it to the bulk stress field each
//! step.

use crate::error::InvariantError;

/// Frictional strength `sigma_n * a * asinh( V/(2*v0) * exp(psi/a) )`.
pub fn strength(v: f64, a: f64, sigma_n: f64, v0: f64, psi: f64) -> f64 {
    sigma_n * a * (0.5 * v / v0 * (psi / a).exp()).asinh()
}

/// Quasi-dynamic stress balance: the quasi-static shear stress reduced by
/// the radiation-damping term `eta * V`.
pub fn stress(v: f64, tau_qs: f64, eta: f64) -> f64 {
    tau_qs - eta * v
}

/// `resid(V) = strength(V) - stress(V)`, the root of which is the slip
/// velocity consistent with both the friction law and the quasi-dynamic
/// radiation-damping approximation.
pub fn resid(v: f64, a: f64, sigma_n: f64, v0: f64, psi: f64, tau_qs: f64, eta: f64) -> f64 {
    strength(v, a, sigma_n, v0, psi) - stress(v, tau_qs, eta)
}

/// Bisection rootfinder for the slip velocity at a single fault node.
///
/// `resid` is monotonically increasing in `V` (strength grows like
/// `asinh`, stress falls linearly), so a bracket with opposite-sign
/// endpoints always contains exactly one root. Narrows until the bracket
/// width is below `1e-14`, at which point it returns the left edge rather
/// than iterating on a width already below the precision of the physical
/// quantities involved.
pub fn bisect_slip_velocity(
    node: usize,
    a: f64,
    sigma_n: f64,
    v0: f64,
    psi: f64,
    tau_qs: f64,
    eta: f64,
    mut v_lo: f64,
    mut v_hi: f64,
    max_iterations: usize,
) -> Result<f64, InvariantError> {
    let f = |v: f64| resid(v, a, sigma_n, v0, psi, tau_qs, eta);

    let mut f_lo = f(v_lo);
    let f_hi = f(v_hi);

    if !f_lo.is_finite() || !f_hi.is_finite() {
        return Err(InvariantError {
            node,
            message: "non-finite residual at bracket endpoint".to_string(),
            psi,
            a,
            sigma_n,
            z: eta,
            tau: tau_qs,
            v: v_lo,
        });
    }
    if f_lo.signum() == f_hi.signum() && f_lo != 0.0 {
        return Err(InvariantError {
            node,
            message: "bisection bracket does not change sign".to_string(),
            psi,
            a,
            sigma_n,
            z: eta,
            tau: tau_qs,
            v: v_lo,
        });
    }

    for _ in 0..max_iterations {
        if (v_hi - v_lo).abs() < 1e-14 {
            return Ok(v_lo);
        }
        let v_mid = 0.5 * (v_lo + v_hi);
        let f_mid = f(v_mid);
        if !f_mid.is_finite() {
            return Err(InvariantError {
                node,
                message: "non-finite residual during bisection".to_string(),
                psi,
                a,
                sigma_n,
                z: eta,
                tau: tau_qs,
                v: v_mid,
            });
        }
        if f_mid == 0.0 {
            return Ok(v_mid);
        }
        if f_mid.signum() == f_lo.signum() {
            v_lo = v_mid;
            f_lo = f_mid;
        } else {
            v_hi = v_mid;
        }
    }
    Ok(v_lo)
}

/// Aging-law state evolution `dpsi/dt = (b*v0/Dc) * (exp((f0-psi)/b) - |V|/v0)`.
///
/// Regularized to `0` when `b` is so small (`b <= 1e-3`) that `exp(1/b)`
/// would overflow to infinity, since the state variable is then
/// effectively frozen on any timescale the integrator resolves.
pub fn aging_law_rate(psi: f64, v: f64, b: f64, dc: f64, f0: f64, v0: f64) -> f64 {
    if b <= 1e-3 || (1.0 / b).exp().is_infinite() {
        return 0.0;
    }
    (b * v0 / dc) * (((f0 - psi) / b).exp() - v.abs() / v0)
}

/// Checks that a freshly evolved state-rate value is finite, producing the
/// diagnostic the friction law's hard invariant calls for on failure.
pub fn check_state_rate(
    node: usize,
    rate: f64,
    psi: f64,
    a: f64,
    sigma_n: f64,
    eta: f64,
    tau: f64,
    v: f64,
) -> Result<f64, InvariantError> {
    if rate.is_finite() {
        Ok(rate)
    } else {
        Err(InvariantError {
            node,
            message: "non-finite d(psi)/dt".to_string(),
            psi,
            a,
            sigma_n,
            z: eta,
            tau,
            v,
        })
    }
}
