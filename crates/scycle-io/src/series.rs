//! ASCII scalar-per-timestep series writer (`time, dt`, one accepted step
//! per line), appended incrementally as the coordinator advances.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{IoError, Result};

pub struct SeriesWriter {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl SeriesWriter {
    /// Opens (creating parent directories as needed) the series file in
    /// append mode, matching the output-viewer registry's lazy-open,
    /// append-until-coordinator-destruction lifecycle.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }

    pub fn append_step(&mut self, time: f64, dt: f64) -> Result<()> {
        writeln!(self.writer, "{time:.17e} {dt:.17e}")
            .map_err(|e| IoError::InvalidData(format!("{}: {e}", self.path.display())))?;
        self.writer
            .flush()
            .map_err(|e| IoError::InvalidData(format!("{}: {e}", self.path.display())))
    }
}
