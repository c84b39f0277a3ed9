//! Cell-centered material properties, persistent for the run.

use crate::depth_profile::DepthProfile;
use crate::error::ConfigError;
use crate::grid::Grid;

/// Shear modulus, density, shear-wave speed, and (for power-law rheology)
/// the Arrhenius parameters, sampled on the full 2-D grid.
///
/// Every field is depth-dependent only at construction time (the source
/// tables vary with `z`), then broadcast uniformly across `y` to fill the
/// full grid, matching how the original keeps material structure purely a
/// function of depth in this 2-D cross-section model.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialField {
    pub mu: Vec<f64>,
    pub rho: Vec<f64>,
    pub cs: Vec<f64>,
    pub power_law: Option<PowerLawField>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PowerLawField {
    pub a: Vec<f64>,
    pub b: Vec<f64>,
    pub n: Vec<f64>,
    pub t: Vec<f64>,
}

impl MaterialField {
    pub fn from_profiles(
        grid: &Grid,
        mu: &DepthProfile,
        rho: &DepthProfile,
    ) -> Result<Self, ConfigError> {
        let z = grid.z_coords();
        let mu_col = mu.resolve(&z, "mu")?;
        let rho_col = rho.resolve(&z, "rho")?;
        validate_positive(&mu_col, "mu")?;
        validate_positive(&rho_col, "rho")?;

        let mu_full = broadcast_over_y(grid, &mu_col);
        let rho_full = broadcast_over_y(grid, &rho_col);
        let cs = mu_full
            .iter()
            .zip(rho_full.iter())
            .map(|(&m, &r)| (m / r).sqrt())
            .collect();

        Ok(Self {
            mu: mu_full,
            rho: rho_full,
            cs,
            power_law: None,
        })
    }

    pub fn with_power_law(
        mut self,
        grid: &Grid,
        a: &DepthProfile,
        b: &DepthProfile,
        n: &DepthProfile,
        t: &DepthProfile,
    ) -> Result<Self, ConfigError> {
        let z = grid.z_coords();
        let a_col = a.resolve(&z, "A")?;
        let b_col = b.resolve(&z, "B")?;
        let n_col = n.resolve(&z, "n")?;
        let t_col = t.resolve(&z, "T")?;
        self.power_law = Some(PowerLawField {
            a: broadcast_over_y(grid, &a_col),
            b: broadcast_over_y(grid, &b_col),
            n: broadcast_over_y(grid, &n_col),
            t: broadcast_over_y(grid, &t_col),
        });
        Ok(self)
    }
}

fn broadcast_over_y(grid: &Grid, column: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0; grid.num_nodes()];
    for iy in 0..grid.ny {
        for iz in 0..grid.nz {
            out[grid.idx(iy, iz)] = column[iz];
        }
    }
    out
}

fn validate_positive(values: &[f64], field: &str) -> Result<(), ConfigError> {
    if values.iter().any(|&v| !(v > 0.0)) {
        return Err(ConfigError::InvalidValue {
            key: field.to_string(),
            value: "<=0 entry present>".to_string(),
            expected: "strictly positive values",
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::SbpType;

    #[test]
    fn broadcasts_depth_profile_uniformly_across_y() {
        let grid = Grid::new(3, 3, 2.0, 2.0, 2, SbpType::ConstantCoef).unwrap();
        let mu = DepthProfile::Table {
            values: vec![30e9, 30e9],
            depths: vec![0.0, 2.0],
        };
        let rho = DepthProfile::Table {
            values: vec![2670.0, 2670.0],
            depths: vec![0.0, 2.0],
        };
        let field = MaterialField::from_profiles(&grid, &mu, &rho).unwrap();
        assert_eq!(field.mu.len(), 9);
        assert!(field.mu.iter().all(|&m| (m - 30e9).abs() < 1.0));
        let expected_cs = (30e9f64 / 2670.0).sqrt();
        assert!((field.cs[0] - expected_cs).abs() < 1e-6);
    }

    #[test]
    fn rejects_nonpositive_material_values() {
        let grid = Grid::new(3, 3, 2.0, 2.0, 2, SbpType::ConstantCoef).unwrap();
        let mu = DepthProfile::Table {
            values: vec![-1.0, 1.0],
            depths: vec![0.0, 2.0],
        };
        let rho = DepthProfile::Table {
            values: vec![2670.0, 2670.0],
            depths: vec![0.0, 2.0],
        };
        assert!(MaterialField::from_profiles(&grid, &mu, &rho).is_err());
    }
}
