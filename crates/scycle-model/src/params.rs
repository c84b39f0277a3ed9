//! Validated, fully-typed run configuration.
//!
//! `Params::from_entries` is the single place untyped text turns into typed
//! values; every other component receives a `Params` (or a narrower slice
//! of it) and never parses text again.

use std::collections::HashMap;

use scycle_inp::RawInput;

use crate::depth_profile::DepthProfile;
use crate::error::ConfigError;
use crate::grid::SbpType;

/// Four-sided boundary-condition kind, independently selected per side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BcKind {
    SymmFault,
    RigidFault,
    RemoteLoading,
    FreeSurface,
    OutGoingCharacteristics,
}

impl BcKind {
    fn parse(key: &str, value: &str) -> Result<Self, ConfigError> {
        match value {
            "symmFault" => Ok(BcKind::SymmFault),
            "rigidFault" => Ok(BcKind::RigidFault),
            "remoteLoading" => Ok(BcKind::RemoteLoading),
            "freeSurface" => Ok(BcKind::FreeSurface),
            "outGoingCharacteristics" => Ok(BcKind::OutGoingCharacteristics),
            other => Err(ConfigError::UnrecognizedEnum {
                key: key.to_string(),
                value: other.to_string(),
                allowed: &[
                    "symmFault",
                    "rigidFault",
                    "remoteLoading",
                    "freeSurface",
                    "outGoingCharacteristics",
                ],
            }),
        }
    }
}

/// The quasi-dynamic boundary configuration, one kind per side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundaryConfig {
    pub left: BcKind,
    pub right: BcKind,
    pub top: BcKind,
    pub bottom: BcKind,
}

/// Quasi-dynamic time integrator, with the two IMEX variants that take the
/// heat equation implicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeIntegrator {
    Rk32,
    Rk43,
    Rk32Wbe,
    Rk43Wbe,
}

impl TimeIntegrator {
    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value {
            "RK32" => Ok(TimeIntegrator::Rk32),
            "RK43" => Ok(TimeIntegrator::Rk43),
            "RK32_WBE" => Ok(TimeIntegrator::Rk32Wbe),
            "RK43_WBE" => Ok(TimeIntegrator::Rk43Wbe),
            other => Err(ConfigError::UnrecognizedEnum {
                key: "timeIntegrator".to_string(),
                value: other.to_string(),
                allowed: &["RK32", "RK43", "RK32_WBE", "RK43_WBE"],
            }),
        }
    }

    pub fn is_imex(self) -> bool {
        matches!(self, TimeIntegrator::Rk32Wbe | TimeIntegrator::Rk43Wbe)
    }

    /// The embedded pair's lower order `p`, used in the PI step-size rule
    /// `dt * (tol/err)^(1/p)`.
    pub fn order(self) -> f64 {
        match self {
            TimeIntegrator::Rk32 | TimeIntegrator::Rk32Wbe => 2.0,
            TimeIntegrator::Rk43 | TimeIntegrator::Rk43Wbe => 3.0,
        }
    }
}

/// Linear-solver backend selection (§4.2's four recognized values).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkSolverKind {
    AlgebraicMultigrid,
    ConjugateGradient,
    DirectLu,
    DirectCholesky,
}

impl BulkSolverKind {
    fn parse(key: &str, value: &str) -> Result<Self, ConfigError> {
        match value {
            "algebraic-multigrid" => Ok(BulkSolverKind::AlgebraicMultigrid),
            "conjugate-gradient" => Ok(BulkSolverKind::ConjugateGradient),
            "direct-LU" => Ok(BulkSolverKind::DirectLu),
            "direct-Cholesky" => Ok(BulkSolverKind::DirectCholesky),
            other => Err(ConfigError::UnrecognizedEnum {
                key: key.to_string(),
                value: other.to_string(),
                allowed: &[
                    "algebraic-multigrid",
                    "conjugate-gradient",
                    "direct-LU",
                    "direct-Cholesky",
                ],
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeatEquationType {
    Transient,
    SteadyState,
}

impl HeatEquationType {
    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value {
            "transient" => Ok(HeatEquationType::Transient),
            "steadyState" => Ok(HeatEquationType::SteadyState),
            other => Err(ConfigError::UnrecognizedEnum {
                key: "heatEquationType".to_string(),
                value: other.to_string(),
                allowed: &["transient", "steadyState"],
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Params {
    pub order: usize,
    pub ny: usize,
    pub nz: usize,
    pub ly: f64,
    pub lz: f64,
    pub sbp_type: SbpType,
    pub bc_qd: BoundaryConfig,

    pub time_integrator: TimeIntegrator,
    pub stride1d: usize,
    pub stride2d: usize,
    pub max_step_count: usize,
    pub init_time: f64,
    pub max_time: f64,
    pub min_delta_t: f64,
    pub max_delta_t: f64,
    pub init_delta_t: f64,
    pub atol: f64,
    pub time_int_inds: Vec<String>,

    pub v_l: f64,
    pub body_force: Option<f64>,

    pub lin_solver: BulkSolverKind,
    pub ksp_tol: f64,
    pub lin_solver_heateq: BulkSolverKind,
    pub ksp_tol_heateq: f64,

    pub heat_equation_type: Option<HeatEquationType>,
    pub with_visc_shear_heating: bool,
    pub with_frictional_heating: bool,
    pub with_radio_heat_generation: bool,
    pub he_lrad: Option<f64>,

    pub guess_steady_state_ics: bool,

    pub trigger_qd2d: f64,
    pub trigger_d2qd: f64,
    pub limit_qd: f64,
    pub limit_dyn: f64,
    pub cfl: f64,
    pub delta_t: f64,

    pub f0: f64,
    pub v0: f64,

    pub with_hydraulic_coupling: bool,
    pub rho_f: f64,
    pub gravity: f64,

    pub output_dir: String,
    pub input_dir: String,

    /// Depth-dependent fields keyed by name (`mu, a, b, sigma_n, Dc, rho, k,
    /// c, h, A, B, n, T, w, A0, visc, k_p, eta_p, n_p, beta_p`), each either
    /// a table or a vector-file path, resolved onto the grid by the
    /// component that owns the field.
    pub profiles: HashMap<String, DepthProfile>,
}

impl Params {
    pub fn from_entries(input: &RawInput) -> Result<Self, ConfigError> {
        check_no_unrecognized_keys(input)?;

        let order: usize = required_parse(input, "order")?;
        let ny: usize = required_parse(input, "Ny")?;
        let nz: usize = required_parse(input, "Nz")?;
        let ly: f64 = required_parse(input, "Ly")?;
        let lz: f64 = required_parse(input, "Lz")?;

        let sbp_type = match input.get("sbpType") {
            Some(v) => SbpType::parse(v)?,
            None => SbpType::FullyCompatible,
        };

        let bc_qd = BoundaryConfig {
            left: bc_side(input, "momBal_bcL_qd")?,
            right: bc_side(input, "momBal_bcR_qd")?,
            top: bc_side(input, "momBal_bcT_qd")?,
            bottom: bc_side(input, "momBal_bcB_qd")?,
        };

        let time_integrator = match input.get("timeIntegrator") {
            Some(v) => TimeIntegrator::parse(v)?,
            None => TimeIntegrator::Rk43,
        };

        let lin_solver = match input.get("linSolver") {
            Some(v) => BulkSolverKind::parse("linSolver", v)?,
            None => BulkSolverKind::DirectLu,
        };
        let lin_solver_heateq = match input.get("linSolver_heateq") {
            Some(v) => BulkSolverKind::parse("linSolver_heateq", v)?,
            None => lin_solver,
        };

        let heat_equation_type = match input.get("heatEquationType") {
            Some(v) => Some(HeatEquationType::parse(v)?),
            None => None,
        };

        let time_int_inds = match input.get("timeIntInds") {
            Some(v) => v.split(',').map(|s| s.trim().to_string()).collect(),
            None => vec!["psi".to_string(), "slip".to_string()],
        };

        let profiles = collect_profiles(input)?;

        Ok(Self {
            order,
            ny,
            nz,
            ly,
            lz,
            sbp_type,
            bc_qd,
            time_integrator,
            stride1d: optional_parse(input, "stride1D")?.unwrap_or(1),
            stride2d: optional_parse(input, "stride2D")?.unwrap_or(1),
            max_step_count: optional_parse(input, "maxStepCount")?.unwrap_or(usize::MAX),
            init_time: optional_parse(input, "initTime")?.unwrap_or(0.0),
            max_time: required_parse(input, "maxTime")?,
            min_delta_t: optional_parse(input, "minDeltaT")?.unwrap_or(1e-3),
            max_delta_t: optional_parse(input, "maxDeltaT")?.unwrap_or(f64::INFINITY),
            init_delta_t: optional_parse(input, "initDeltaT")?.unwrap_or(1.0),
            atol: optional_parse(input, "atol")?.unwrap_or(1e-8),
            time_int_inds,
            v_l: required_parse(input, "vL")?,
            body_force: optional_parse(input, "bodyForce")?,
            lin_solver,
            ksp_tol: optional_parse(input, "kspTol")?.unwrap_or(1e-9),
            lin_solver_heateq,
            ksp_tol_heateq: optional_parse(input, "kspTol_heateq")?.unwrap_or(1e-9),
            heat_equation_type,
            with_visc_shear_heating: optional_yes_no(input, "withViscShearHeating")?
                .unwrap_or(false),
            with_frictional_heating: optional_yes_no(input, "withFrictionalHeating")?
                .unwrap_or(false),
            with_radio_heat_generation: optional_yes_no(input, "withRadioHeatGeneration")?
                .unwrap_or(false),
            he_lrad: optional_parse(input, "he_Lrad")?,
            guess_steady_state_ics: optional_parse::<u8>(input, "guessSteadyStateICs")?
                .map(|v| v != 0)
                .unwrap_or(false),
            trigger_qd2d: optional_parse(input, "triggerqd2d")?.unwrap_or(1e-3),
            trigger_d2qd: optional_parse(input, "triggerd2qd")?.unwrap_or(1e-6),
            limit_qd: optional_parse(input, "limit_qd")?.unwrap_or(1e-4),
            limit_dyn: optional_parse(input, "limit_dyn")?.unwrap_or(1e-5),
            cfl: optional_parse(input, "CFL")?.unwrap_or(0.5),
            delta_t: optional_parse(input, "deltaT")?.unwrap_or(1e-5),
            f0: optional_parse(input, "f0")?.unwrap_or(0.6),
            v0: optional_parse(input, "v0")?.unwrap_or(1e-6),
            with_hydraulic_coupling: optional_yes_no(input, "withHydraulicCoupling")?
                .unwrap_or(false),
            rho_f: optional_parse(input, "rho_f")?.unwrap_or(1000.0),
            gravity: optional_parse(input, "g")?.unwrap_or(9.8),
            output_dir: input.get("outputDir").unwrap_or("./output").to_string(),
            input_dir: input.get("inputDir").unwrap_or("./input").to_string(),
            profiles,
        })
    }

    pub fn profile(&self, name: &str) -> Result<&DepthProfile, ConfigError> {
        self.profiles
            .get(name)
            .ok_or_else(|| ConfigError::MissingKey(format!("{name}Vals/{name}Depths")))
    }
}

// `mu` is not in spec's own (non-exhaustive) key table, but the material
// field's shear modulus has to come from somewhere and every other field
// that feeds `MaterialField`/`FaultLine` is expressed this same way, so it
// is added here as the missing profile field.
const PROFILE_FIELDS: &[&str] = &[
    "mu", "a", "b", "sigma_n", "Dc", "rho", "k", "c", "h", "A", "B", "n", "T", "w", "A0", "visc",
    "k_p", "eta_p", "n_p", "beta_p",
];

/// `A0` is the one field with two possible key prefixes: the generic
/// `A0Vals`/`A0Depths` pair (implied by its presence in the generic
/// per-field profile list) and the `he_`-prefixed `he_A0Vals`/`he_A0Depths`
/// pair documented alongside `he_Lrad`. The `he_`-prefixed keys are tried
/// first since they're the ones named in the radioactive-heat section.
fn profile_keys(field: &str) -> (String, String) {
    if field == "A0" {
        ("he_A0Vals".to_string(), "he_A0Depths".to_string())
    } else {
        (format!("{field}Vals"), format!("{field}Depths"))
    }
}

fn collect_profiles(input: &RawInput) -> Result<HashMap<String, DepthProfile>, ConfigError> {
    let mut out = HashMap::new();
    for &field in PROFILE_FIELDS {
        let (mut vals_key, mut depths_key) = profile_keys(field);
        if field == "A0" && input.get(&vals_key).is_none() && input.get("A0Vals").is_some() {
            vals_key = "A0Vals".to_string();
            depths_key = "A0Depths".to_string();
        }
        match (input.get(&vals_key), input.get(&depths_key)) {
            (Some(vals), Some(depths)) => {
                let values = parse_csv_f64(&vals_key, vals)?;
                let depths = parse_csv_f64(&depths_key, depths)?;
                out.insert(field.to_string(), DepthProfile::Table { values, depths });
            }
            (Some(_), None) | (None, Some(_)) => {
                return Err(ConfigError::MutuallyExclusive {
                    a: vals_key,
                    b: depths_key,
                })
            }
            (None, None) => {}
        }
        let file_key = format!("{field}File");
        if let Some(path) = input.get(&file_key) {
            out.insert(
                field.to_string(),
                DepthProfile::File(std::path::PathBuf::from(path)),
            );
        }
    }
    Ok(out)
}

/// Every key `Params::from_entries` recognizes, either literally or as a
/// `{field}Vals`/`{field}Depths`/`{field}File` pattern. Anything else in
/// the input is a hard configuration error.
fn recognized_keys() -> Vec<String> {
    let mut keys: Vec<String> = vec![
        "order", "Ny", "Nz", "Ly", "Lz", "sbpType", "momBal_bcL_qd", "momBal_bcR_qd",
        "momBal_bcT_qd", "momBal_bcB_qd", "timeIntegrator", "timeControlType", "normType",
        "linSolver", "linSolver_heateq", "heatEquationType", "timeIntInds", "stride1D",
        "stride2D", "maxStepCount", "initTime", "maxTime", "minDeltaT", "maxDeltaT",
        "initDeltaT", "atol", "vL", "bodyForce", "kspTol", "kspTol_heateq",
        "withViscShearHeating", "withFrictionalHeating", "withRadioHeatGeneration", "he_Lrad",
        "guessSteadyStateICs", "triggerqd2d", "triggerd2qd", "limit_qd", "limit_dyn", "CFL",
        "deltaT", "f0", "v0", "withHydraulicCoupling", "rho_f", "g", "outputDir", "inputDir",
    ]
    .into_iter()
    .map(String::from)
    .collect();

    for &field in PROFILE_FIELDS {
        let (vals_key, depths_key) = profile_keys(field);
        keys.push(vals_key);
        keys.push(depths_key);
        keys.push(format!("{field}File"));
        if field == "A0" {
            keys.push("A0Vals".to_string());
            keys.push("A0Depths".to_string());
        }
    }
    keys
}

fn check_no_unrecognized_keys(input: &RawInput) -> Result<(), ConfigError> {
    let recognized = recognized_keys();
    for entry in &input.entries {
        if !recognized.iter().any(|k| k == &entry.key) {
            return Err(ConfigError::UnknownKey(entry.key.clone()));
        }
    }
    Ok(())
}

fn parse_csv_f64(key: &str, raw: &str) -> Result<Vec<f64>, ConfigError> {
    raw.trim_matches(|c| c == '{' || c == '}')
        .split(',')
        .map(|s| {
            s.trim().parse::<f64>().map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value: s.to_string(),
                expected: "a floating-point number",
            })
        })
        .collect()
}

fn bc_side(input: &RawInput, key: &str) -> Result<BcKind, ConfigError> {
    let value = input
        .get(key)
        .ok_or_else(|| ConfigError::MissingKey(key.to_string()))?;
    BcKind::parse(key, value)
}

fn required_parse<T: std::str::FromStr>(input: &RawInput, key: &str) -> Result<T, ConfigError> {
    let raw = input
        .get(key)
        .ok_or_else(|| ConfigError::MissingKey(key.to_string()))?;
    raw.parse::<T>().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: raw.to_string(),
        expected: std::any::type_name::<T>(),
    })
}

fn optional_parse<T: std::str::FromStr>(
    input: &RawInput,
    key: &str,
) -> Result<Option<T>, ConfigError> {
    match input.get(key) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value: raw.to_string(),
                expected: std::any::type_name::<T>(),
            }),
    }
}

fn optional_yes_no(input: &RawInput, key: &str) -> Result<Option<bool>, ConfigError> {
    match input.get(key) {
        None => Ok(None),
        Some("yes") => Ok(Some(true)),
        Some("no") => Ok(Some(false)),
        Some(other) => Err(ConfigError::UnrecognizedEnum {
            key: key.to_string(),
            value: other.to_string(),
            allowed: &["yes", "no"],
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_input() -> RawInput {
        RawInput::parse_str(
            "order = 4\n\
             Ny = 21\n\
             Nz = 21\n\
             Ly = 30000\n\
             Lz = 30000\n\
             momBal_bcL_qd = symmFault\n\
             momBal_bcR_qd = remoteLoading\n\
             momBal_bcT_qd = freeSurface\n\
             momBal_bcB_qd = freeSurface\n\
             maxTime = 1e11\n\
             vL = 1e-9\n",
            " = ",
        )
        .unwrap()
    }

    #[test]
    fn parses_required_fields_and_applies_defaults() {
        let params = Params::from_entries(&minimal_input()).unwrap();
        assert_eq!(params.order, 4);
        assert_eq!(params.ny, 21);
        assert_eq!(params.bc_qd.left, BcKind::SymmFault);
        assert_eq!(params.time_integrator, TimeIntegrator::Rk43);
        assert_eq!(params.lin_solver, BulkSolverKind::DirectLu);
    }

    #[test]
    fn missing_required_key_is_config_error() {
        let input = RawInput::parse_str("Ny = 21\n", " = ").unwrap();
        let err = Params::from_entries(&input).unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey(_)));
    }

    #[test]
    fn unrecognized_bc_kind_is_config_error() {
        let input = RawInput::parse_str(
            "order = 4\nNy=21\nNz=21\nLy=1\nLz=1\nmaxTime=1\nvL=1e-9\n\
             momBal_bcL_qd = bogus\nmomBal_bcR_qd = freeSurface\n\
             momBal_bcT_qd = freeSurface\nmomBal_bcB_qd = freeSurface\n",
            " = ",
        )
        .unwrap();
        let err = Params::from_entries(&input).unwrap_err();
        assert!(matches!(err, ConfigError::UnrecognizedEnum { .. }));
    }

    #[test]
    fn depth_profile_vals_without_depths_is_mutually_exclusive_error() {
        let mut src = String::from(
            "order = 4\nNy=21\nNz=21\nLy=1\nLz=1\nmaxTime=1\nvL=1e-9\n\
             momBal_bcL_qd = symmFault\nmomBal_bcR_qd = freeSurface\n\
             momBal_bcT_qd = freeSurface\nmomBal_bcB_qd = freeSurface\n",
        );
        src.push_str("aVals = {0.01, 0.02}\n");
        let input = RawInput::parse_str(&src, " = ").unwrap();
        let err = Params::from_entries(&input).unwrap_err();
        assert!(matches!(err, ConfigError::MutuallyExclusive { .. }));
    }

    #[test]
    fn parses_depth_profile_pair() {
        let mut src = String::from(
            "order = 4\nNy=21\nNz=21\nLy=1\nLz=1\nmaxTime=1\nvL=1e-9\n\
             momBal_bcL_qd = symmFault\nmomBal_bcR_qd = freeSurface\n\
             momBal_bcT_qd = freeSurface\nmomBal_bcB_qd = freeSurface\n",
        );
        src.push_str("aVals = {0.01, 0.02}\n");
        src.push_str("aDepths = {0, 30000}\n");
        let input = RawInput::parse_str(&src, " = ").unwrap();
        let params = Params::from_entries(&input).unwrap();
        let profile = params.profile("a").unwrap();
        match profile {
            DepthProfile::Table { values, depths } => {
                assert_eq!(values, &vec![0.01, 0.02]);
                assert_eq!(depths, &vec![0.0, 30000.0]);
            }
            DepthProfile::File(_) => panic!("expected table"),
        }
    }

    #[test]
    fn unrecognized_key_is_config_error() {
        let mut src = minimal_input_text();
        src.push_str("notAKey = 3\n");
        let input = RawInput::parse_str(&src, " = ").unwrap();
        let err = Params::from_entries(&input).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownKey(ref k) if k == "notAKey"));
    }

    #[test]
    fn he_prefixed_a0_profile_is_recognized() {
        let mut src = minimal_input_text();
        src.push_str("he_A0Vals = {1e-6, 1e-6}\n");
        src.push_str("he_A0Depths = {0, 30000}\n");
        let input = RawInput::parse_str(&src, " = ").unwrap();
        let params = Params::from_entries(&input).unwrap();
        assert!(params.profile("A0").is_ok());
    }

    #[test]
    fn bare_a0_profile_still_works_as_fallback() {
        let mut src = minimal_input_text();
        src.push_str("A0Vals = {1e-6, 1e-6}\n");
        src.push_str("A0Depths = {0, 30000}\n");
        let input = RawInput::parse_str(&src, " = ").unwrap();
        let params = Params::from_entries(&input).unwrap();
        assert!(params.profile("A0").is_ok());
    }

    #[test]
    fn mu_is_a_recognized_profile_field() {
        let mut src = minimal_input_text();
        src.push_str("muVals = {30e9, 30e9}\n");
        src.push_str("muDepths = {0, 30000}\n");
        let input = RawInput::parse_str(&src, " = ").unwrap();
        let params = Params::from_entries(&input).unwrap();
        assert!(params.profile("mu").is_ok());
    }

    fn minimal_input_text() -> String {
        String::from(
            "order = 4\n\
             Ny = 21\n\
             Nz = 21\n\
             Ly = 30000\n\
             Lz = 30000\n\
             momBal_bcL_qd = symmFault\n\
             momBal_bcR_qd = remoteLoading\n\
             momBal_bcT_qd = freeSurface\n\
             momBal_bcB_qd = freeSurface\n\
             maxTime = 1e11\n\
             vL = 1e-9\n",
        )
    }
}
