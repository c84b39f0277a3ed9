//! Depth-dependent scalar fields.
//!
//! Every depth-dependent field in the data model (`a, b, sigma_n, Dc, rho,
//! k, c, h, A, B, n, T, w, A0, visc`) is represented the same way: either a
//! `(values, depths)` piecewise-linear table, or a path to a binary vector
//! file already sampled on the grid. This generalizes the per-field tables
//! that the original solver built with a single reusable interpolation
//! routine shared by its fault and domain objects.

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use byteorder::{NativeEndian, ReadBytesExt};

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq)]
pub enum DepthProfile {
    /// `values[i]` holds at `depths[i]`, linearly interpolated in between
    /// and held constant beyond the first/last entry.
    Table { values: Vec<f64>, depths: Vec<f64> },
    /// A native-endian binary file of `f64`s, one per queried depth, in the
    /// same order the caller will query.
    File(PathBuf),
}

impl DepthProfile {
    /// Resolves the profile onto `query_depths`, producing one value per
    /// query point in the same order.
    pub fn resolve(&self, query_depths: &[f64], field: &str) -> Result<Vec<f64>, ConfigError> {
        match self {
            DepthProfile::Table { values, depths } => {
                if values.is_empty() || depths.is_empty() {
                    return Err(ConfigError::DepthProfileEmpty {
                        field: field.to_string(),
                    });
                }
                if values.len() != depths.len() {
                    return Err(ConfigError::DepthProfileMismatch {
                        field: field.to_string(),
                        n_vals: values.len(),
                        n_depths: depths.len(),
                    });
                }
                Ok(query_depths
                    .iter()
                    .map(|&z| interpolate_piecewise_linear(values, depths, z))
                    .collect())
            }
            DepthProfile::File(path) => {
                let data = read_binary_vec(path).map_err(|source| ConfigError::VectorFileRead {
                    path: path.display().to_string(),
                    source,
                })?;
                Ok(data)
            }
        }
    }
}

/// Linear interpolation of a table `(values, depths)` at `z`, assuming
/// `depths` is monotonically non-decreasing (as it is when built from a
/// top-to-bottom sampling of the domain). Clamps outside the table's range.
fn interpolate_piecewise_linear(values: &[f64], depths: &[f64], z: f64) -> f64 {
    if depths.len() == 1 || z <= depths[0] {
        return values[0];
    }
    let last = depths.len() - 1;
    if z >= depths[last] {
        return values[last];
    }
    // depths[i] <= z < depths[i+1]
    let i = match depths.partition_point(|&d| d <= z) {
        0 => 0,
        n => n - 1,
    };
    let (z0, z1) = (depths[i], depths[i + 1]);
    let (v0, v1) = (values[i], values[i + 1]);
    if (z1 - z0).abs() < f64::EPSILON {
        return v0;
    }
    let t = (z - z0) / (z1 - z0);
    v0 + t * (v1 - v0)
}

/// Reads a native-endian binary vector file: a flat sequence of `f64`s,
/// no header.
pub fn read_binary_vec(path: &std::path::Path) -> std::io::Result<Vec<f64>> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut out = Vec::new();
    loop {
        match reader.read_f64::<NativeEndian>() {
            Ok(v) => out.push(v),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e),
        }
    }
    Ok(out)
}

/// Writes a flat `f64` vector as a native-endian binary file, with no
/// header, matching [`read_binary_vec`].
pub fn write_binary_vec(path: &std::path::Path, data: &[f64]) -> std::io::Result<()> {
    use byteorder::WriteBytesExt;
    use std::io::BufWriter;
    let mut writer = BufWriter::new(File::create(path)?);
    for &v in data {
        writer.write_f64::<NativeEndian>(v)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interpolates_between_two_points() {
        let values = vec![10.0, 20.0];
        let depths = vec![0.0, 10.0];
        assert!((interpolate_piecewise_linear(&values, &depths, 5.0) - 15.0).abs() < 1e-12);
    }

    #[test]
    fn clamps_outside_table_range() {
        let values = vec![10.0, 20.0, 30.0];
        let depths = vec![0.0, 5.0, 10.0];
        assert_eq!(interpolate_piecewise_linear(&values, &depths, -1.0), 10.0);
        assert_eq!(interpolate_piecewise_linear(&values, &depths, 11.0), 30.0);
    }

    #[test]
    fn resolve_table_mismatch_is_config_error() {
        let profile = DepthProfile::Table {
            values: vec![1.0, 2.0],
            depths: vec![0.0],
        };
        let err = profile.resolve(&[0.0, 1.0], "a").unwrap_err();
        assert!(matches!(err, ConfigError::DepthProfileMismatch { .. }));
    }

    #[test]
    fn binary_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vec.bin");
        let data = vec![1.0, 2.5, -3.25, 4.0];
        write_binary_vec(&path, &data).unwrap();
        let back = read_binary_vec(&path).unwrap();
        assert_eq!(data, back);
    }
}
