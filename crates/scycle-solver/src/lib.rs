//! The numerical core: SBP-SAT bulk elasticity, rate-and-state fault
//! friction, power-law viscoelasticity, heat and pore-pressure coupling,
//! and the quasi-dynamic/fully-dynamic cycle coordinator that ties them
//! together.

pub mod backend;
pub mod bulk;
pub mod coordinator;
pub mod creep;
pub mod error;
pub mod fault;
pub mod heat;
pub mod mms;
pub mod pressure;
pub mod sbp;

pub use backend::{BackendError, LinearSolver, LinearSystemData, SolveInfo, SolverBackend, SparseTripletsF64};
pub use bulk::BulkSolver;
pub use coordinator::{Coordinator, IntegrandMap, Regime};
pub use error::{InvariantError, SCycleError};
pub use fault::{aging_law_rate, bisect_slip_velocity, check_state_rate, resid, strength, stress};
pub use heat::{
    frictional_heat_flux, frictional_heat_volumetric, radioactive_heat_generation,
    viscous_shear_heating, HeatSolver,
};
pub use pressure::PressureSolver;
