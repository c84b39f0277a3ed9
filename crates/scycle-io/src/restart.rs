//! Checkpoint persistence: a single JSON file per checkpoint holding the
//! coordinator's scalar state and every named integrand vector inline.
//!
//! This inlines vectors into the JSON document rather than writing one
//! binary file per vector (as the distilled input-file contract suggests);
//! see `DESIGN.md` for why.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Checkpoint {
    pub schema_version: u32,
    pub ckpt_number: usize,
    pub curr_time: f64,
    pub step_count: usize,
    pub delta_t: f64,
    /// The last two PI-controller error estimates, most recent first.
    pub pi_err_history: [f64; 2],
    pub in_dynamic: bool,
    /// Every named integrand vector live at checkpoint time (`psi`, `slip`,
    /// `gxy`, `gxz`, `u`, `uPrev`, `T`, ... depending on which regime and
    /// rheology are active).
    pub integrands: BTreeMap<String, Vec<f64>>,
}

impl Default for Checkpoint {
    fn default() -> Self {
        Self {
            schema_version: 1,
            ckpt_number: 0,
            curr_time: 0.0,
            step_count: 0,
            delta_t: 0.0,
            pi_err_history: [1.0, 1.0],
            in_dynamic: false,
            integrands: BTreeMap::new(),
        }
    }
}

pub fn save_checkpoint(path: impl AsRef<Path>, state: &Checkpoint) -> io::Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let bytes = serde_json::to_vec_pretty(state)
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
    fs::write(path, &bytes)?;
    tracing::debug!(
        path = %path.display(),
        ckpt_number = state.ckpt_number,
        curr_time = state.curr_time,
        bytes = bytes.len(),
        "checkpoint written"
    );
    Ok(())
}

pub fn load_checkpoint(path: impl AsRef<Path>) -> io::Result<Checkpoint> {
    let path = path.as_ref();
    let bytes = fs::read(path)?;
    let checkpoint: Checkpoint = serde_json::from_slice(&bytes)
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
    tracing::info!(
        path = %path.display(),
        ckpt_number = checkpoint.ckpt_number,
        curr_time = checkpoint.curr_time,
        step_count = checkpoint.step_count,
        "checkpoint loaded, resuming"
    );
    Ok(checkpoint)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkpoint_roundtrip_preserves_state() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("ckpt.json");
        let mut integrands = BTreeMap::new();
        integrands.insert("psi".to_string(), vec![0.6, 0.6, 0.6]);
        integrands.insert("slip".to_string(), vec![0.0, 0.1, 0.2]);

        let state = Checkpoint {
            schema_version: 1,
            ckpt_number: 4,
            curr_time: 1.25e10,
            step_count: 812,
            delta_t: 3.4e6,
            pi_err_history: [0.9, 1.1],
            in_dynamic: false,
            integrands,
        };

        save_checkpoint(&path, &state).expect("save should succeed");
        let loaded = load_checkpoint(&path).expect("load should succeed");
        assert_eq!(loaded, state);
    }

    #[test]
    fn load_checkpoint_fails_for_missing_file() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("missing.json");
        let err = load_checkpoint(&path).expect_err("missing file should fail");
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn load_checkpoint_fails_for_invalid_payload() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("bad.json");
        fs::write(&path, "{invalid json").expect("write invalid payload");
        let err = load_checkpoint(&path).expect_err("invalid JSON should fail");
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
