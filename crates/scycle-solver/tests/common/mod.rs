//! Shared setup for the cross-crate integration tests in this directory.
//!
//! Builds a minimal, valid input deck (the symmetric linear-elastic
//! spin-up material parameters from §8's S1 scenario) and lets each test
//! override or add keys on top of it. Grids are kept small (`Ny = Nz =
//! 15`) relative to the spec's illustrative `101` so the suite runs
//! without needing a toolchain invocation to estimate wall time.

use scycle_inp::RawInput;
use scycle_model::Params;
use scycle_solver::Coordinator;

pub const MU: f64 = 30e9;
pub const RHO: f64 = 2670.0;
pub const A: f64 = 0.015;
pub const B: f64 = 0.02;
pub const SIGMA_N: f64 = 50e6;
pub const DC: f64 = 0.008;
pub const V_L: f64 = 1e-9;
pub const F0: f64 = 0.6;
pub const V0: f64 = 1e-6;

/// A fresh output directory under the system temp dir, unique per call.
/// `into_path` hands back a plain `PathBuf` and disables the directory's
/// automatic cleanup, since the coordinator writes into it for the rest
/// of the test after this function returns.
pub fn temp_output_dir(tag: &str) -> std::path::PathBuf {
    tempfile::Builder::new()
        .prefix(&format!("scycle-it-{tag}-"))
        .tempdir()
        .expect("create temp output dir")
        .into_path()
}

/// Builds the base S1-style input deck as text, with `extra` appended
/// (later keys win ties only insofar as `Params::from_entries` allows;
/// in practice `extra` should only add keys not already present above).
pub fn base_deck(tag: &str, extra: &str) -> String {
    let dir = temp_output_dir(tag);
    format!(
        "order = 4\n\
         Ny = 15\n\
         Nz = 15\n\
         Ly = 30000\n\
         Lz = 30000\n\
         momBal_bcL_qd = symmFault\n\
         momBal_bcR_qd = remoteLoading\n\
         momBal_bcT_qd = freeSurface\n\
         momBal_bcB_qd = freeSurface\n\
         vL = {V_L}\n\
         f0 = {F0}\n\
         v0 = {V0}\n\
         initDeltaT = 1e4\n\
         minDeltaT = 1.0\n\
         maxDeltaT = 1e7\n\
         muVals = {{{MU}, {MU}}}\n\
         muDepths = {{0, 30000}}\n\
         rhoVals = {{{RHO}, {RHO}}}\n\
         rhoDepths = {{0, 30000}}\n\
         aVals = {{{A}, {A}}}\n\
         aDepths = {{0, 30000}}\n\
         bVals = {{{B}, {B}}}\n\
         bDepths = {{0, 30000}}\n\
         sigma_nVals = {{{SIGMA_N}, {SIGMA_N}}}\n\
         sigma_nDepths = {{0, 30000}}\n\
         DcVals = {{{DC}, {DC}}}\n\
         DcDepths = {{0, 30000}}\n\
         outputDir = {dir}\n",
        dir = dir.display()
    ) + extra
}

pub fn coordinator_from_deck(text: &str) -> Coordinator {
    let raw = RawInput::parse_str(text, " = ").expect("deck parses");
    let params = Params::from_entries(&raw).expect("deck validates");
    Coordinator::new(params).expect("coordinator constructs")
}
