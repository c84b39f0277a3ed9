//! Persistence for the earthquake-cycle solver: binary vector files,
//! ASCII scalar-per-timestep series, and JSON checkpoints.

pub mod error;
pub mod restart;
pub mod series;
pub mod vector_file;

pub use error::{IoError, Result};
pub use restart::{load_checkpoint, save_checkpoint, Checkpoint};
pub use series::SeriesWriter;
pub use vector_file::{read_vector, write_vector};
