//! Power-law viscous creep: the Arrhenius strain-rate law that turns the
//! deviatoric stress field into a rate of change for the viscous strain
//! tensor `(gxy, gxz)`, and the effective-viscosity diagnostic used by the
//! quasi-dynamic step-size clip.
//!
//! Grounded on `powerLaw.cpp`'s `setViscStrainRates`/effective-viscosity
//! computation: strain rate follows `A * exp(-B/T) * sigma_dev^n`, split
//! between the two shear components in proportion to `sigma_xy`/`sigma_xz`.

/// Floor on effective viscosity (GPa s), preventing the `n > 1`,
/// zero-stress case from returning an infinite viscosity.
pub const ETA_MIN: f64 = 1e-3;

/// Scalar strain rate `A * exp(-B/T) * sigma_dev^n` at one node.
pub fn strain_rate_invariant(a: f64, b: f64, n: f64, t: f64, sigma_dev: f64) -> f64 {
    if sigma_dev <= 0.0 {
        return 0.0;
    }
    a * (-b / t).exp() * sigma_dev.powf(n)
}

/// `dgxy/dt, dgxz/dt` at one node: the strain-rate invariant distributed
/// between the two shear components in the direction of the stress vector
/// `(sigma_xy, sigma_xz)`.
pub fn viscous_strain_rate(
    sigma_xy: f64,
    sigma_xz: f64,
    sigma_dev: f64,
    a: f64,
    b: f64,
    n: f64,
    t: f64,
) -> (f64, f64) {
    if sigma_dev <= 0.0 {
        return (0.0, 0.0);
    }
    let rate = strain_rate_invariant(a, b, n, t, sigma_dev);
    (rate * sigma_xy / sigma_dev, rate * sigma_xz / sigma_dev)
}

/// Effective viscosity `sigma_dev / (2 * strainRate)`, floored at
/// [`ETA_MIN`] so a zero-stress node with `n > 1` (where the strain rate
/// invariant above is exactly zero) never divides out to infinity.
pub fn effective_viscosity(a: f64, b: f64, n: f64, t: f64, sigma_dev: f64) -> f64 {
    let rate = strain_rate_invariant(a, b, n, t, sigma_dev);
    if rate <= 0.0 {
        return ETA_MIN;
    }
    (sigma_dev / (2.0 * rate)).max(ETA_MIN)
}
