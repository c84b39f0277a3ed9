//! The data model shared by every component of the earthquake-cycle solver:
//! the grid, material field, fault line, and the validated configuration
//! (`Params`) that builds them from an input file.

pub mod depth_profile;
pub mod error;
pub mod fault;
pub mod grid;
pub mod material;
pub mod params;

pub use depth_profile::{read_binary_vec, write_binary_vec, DepthProfile};
pub use error::ConfigError;
pub use fault::{initial_tau_qs, FaultLine, FaultVariant};
pub use grid::{Grid, SbpType};
pub use material::{MaterialField, PowerLawField};
pub use params::{BcKind, BoundaryConfig, BulkSolverKind, HeatEquationType, Params, TimeIntegrator};
