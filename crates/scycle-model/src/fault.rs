//! The rate-and-state fault line, always the `y = 0` column.

use crate::depth_profile::DepthProfile;
use crate::error::ConfigError;
use crate::grid::Grid;
use crate::material::MaterialField;

/// Whether the fault is solved with one side (mirrored) or both sides
/// explicitly. The only behavioral difference downstream is how the
/// radiation impedance and effective quasi-static traction are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultVariant {
    Symmetric,
    Asymmetric,
}

/// Per-node rate-and-state fields on the fault line, `Nz` entries long.
#[derive(Debug, Clone, PartialEq)]
pub struct FaultLine {
    pub variant: FaultVariant,
    pub nz: usize,

    pub a: Vec<f64>,
    pub b: Vec<f64>,
    pub sigma_n: Vec<f64>,
    pub dc: Vec<f64>,

    pub psi: Vec<f64>,
    pub slip: Vec<f64>,
    pub slip_vel: Vec<f64>,
    pub tau_qs: Vec<f64>,

    /// Radiation impedance on the `+` side, `mu_plus / cs_plus`.
    pub z_plus: Vec<f64>,
    /// Radiation impedance on the `-` side; only populated when
    /// `variant == Asymmetric`.
    pub z_minus: Option<Vec<f64>>,

    pub f0: f64,
    pub v0: f64,
    pub v_l: f64,
}

impl FaultLine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        grid: &Grid,
        material_plus: &MaterialField,
        material_minus: Option<&MaterialField>,
        a: &DepthProfile,
        b: &DepthProfile,
        sigma_n: &DepthProfile,
        dc: &DepthProfile,
        f0: f64,
        v0: f64,
        v_l: f64,
        variant: FaultVariant,
    ) -> Result<Self, ConfigError> {
        let z = grid.z_coords();
        let a_vals = a.resolve(&z, "a")?;
        let b_vals = b.resolve(&z, "b")?;
        let sigma_n_vals = sigma_n.resolve(&z, "sigma_n")?;
        let dc_vals = dc.resolve(&z, "Dc")?;

        check_positive(&a_vals, "a")?;
        check_positive(&sigma_n_vals, "sigma_n")?;
        check_positive(&dc_vals, "Dc")?;

        match (variant, material_minus) {
            (FaultVariant::Asymmetric, None) => {
                return Err(ConfigError::InvalidValue {
                    key: "faultVariant".to_string(),
                    value: "asymmetric".to_string(),
                    expected: "a `-`-side material field",
                })
            }
            (FaultVariant::Symmetric, Some(_)) => {
                return Err(ConfigError::MutuallyExclusive {
                    a: "faultVariant=symmetric".to_string(),
                    b: "materialMinus".to_string(),
                })
            }
            _ => {}
        }

        let z_plus: Vec<f64> = (0..grid.nz)
            .map(|iz| {
                let idx = grid.idx(0, iz);
                material_plus.mu[idx] / material_plus.cs[idx]
            })
            .collect();
        let z_minus = material_minus.map(|m| {
            (0..grid.nz)
                .map(|iz| {
                    let idx = grid.idx(0, iz);
                    m.mu[idx] / m.cs[idx]
                })
                .collect()
        });

        let psi = vec![f0; grid.nz];
        let tau_qs = (0..grid.nz)
            .map(|iz| initial_tau_qs(sigma_n_vals[iz], a_vals[iz], f0, v0, v_l))
            .collect();

        Ok(Self {
            variant,
            nz: grid.nz,
            a: a_vals,
            b: b_vals,
            sigma_n: sigma_n_vals,
            dc: dc_vals,
            psi,
            slip: vec![0.0; grid.nz],
            slip_vel: vec![v_l; grid.nz],
            tau_qs,
            z_plus,
            z_minus,
            f0,
            v0,
            v_l,
        })
    }

    /// Radiation-damping coefficient `eta` for node `i`: `Z/2` symmetric,
    /// `Z+ Z- / (Z+ + Z-)` asymmetric.
    pub fn eta(&self, i: usize) -> f64 {
        match &self.z_minus {
            None => self.z_plus[i] / 2.0,
            Some(z_minus) => self.z_plus[i] * z_minus[i] / (self.z_plus[i] + z_minus[i]),
        }
    }
}

/// `tau_qs_0 = sigma_n * a * asinh( 0.5 * vL * exp(f0/a) / v0 )`, the
/// remote-loading steady estimate used both as the initial fault traction
/// and to set the right-boundary displacement shift.
pub fn initial_tau_qs(sigma_n: f64, a: f64, f0: f64, v0: f64, v_l: f64) -> f64 {
    sigma_n * a * (0.5 * v_l * (f0 / a).exp() / v0).asinh()
}

fn check_positive(values: &[f64], field: &str) -> Result<(), ConfigError> {
    if values.iter().any(|&v| !(v > 0.0)) {
        return Err(ConfigError::InvalidValue {
            key: field.to_string(),
            value: "<=0 entry present>".to_string(),
            expected: "strictly positive values",
        });
    }
    Ok(())
}
