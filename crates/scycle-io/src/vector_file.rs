//! Named binary vector files: material-field snapshots and individual
//! integrand vectors written outside a checkpoint (e.g. for post-run
//! inspection), one `f64` vector per file, native-endian.

use std::path::Path;

use scycle_model::{read_binary_vec, write_binary_vec};

use crate::error::{IoError, Result};

pub fn write_vector(path: impl AsRef<Path>, data: &[f64]) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    write_binary_vec(path, data).map_err(IoError::Io)
}

pub fn read_vector(path: impl AsRef<Path>) -> Result<Vec<f64>> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(IoError::FileNotFound(path.display().to_string()));
    }
    read_binary_vec(path).map_err(IoError::Io)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_vector() {
        let path = std::env::temp_dir().join(format!(
            "scycle-vec-{}-{}.bin",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .subsec_nanos()
        ));
        let data = vec![1.0, -2.0, 3.5];
        write_vector(&path, &data).unwrap();
        assert_eq!(read_vector(&path).unwrap(), data);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn missing_file_is_file_not_found() {
        let path = std::env::temp_dir().join("scycle-vec-does-not-exist.bin");
        assert!(matches!(read_vector(&path), Err(IoError::FileNotFound(_))));
    }
}
