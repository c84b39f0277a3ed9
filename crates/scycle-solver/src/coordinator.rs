//! The earthquake-cycle coordinator: owns every per-run solver object and
//! drives the quasi-dynamic/fully-dynamic stepping loop described by the
//! per-stage data-flow (update BCs, bulk solve, stress extraction, fault
//! rootfinding, state-variable rate) and the regime-switch state machine.
//!
//! Grounded on the original's `sbpWave`/momentum-balance driver: a single
//! object owning the bulk solver(s), the fault line, and the optional
//! heat/pressure couplings, advancing one accepted step at a time and
//! writing output through a small registry of open output files (here,
//! [`SeriesWriter`] plus periodic JSON checkpoints).

use std::collections::BTreeMap;

use nalgebra::DVector;
use tracing::{debug, info, warn};

use scycle_io::{Checkpoint, SeriesWriter};
use scycle_model::{
    BcKind, FaultLine, FaultVariant, Grid, MaterialField, Params, TimeIntegrator,
};

use crate::bulk::BulkSolver;
use crate::creep;
use crate::error::SCycleError;
use crate::fault::{aging_law_rate, bisect_slip_velocity, check_state_rate};
use crate::heat::{
    frictional_heat_flux, frictional_heat_volumetric, radioactive_heat_generation,
    viscous_shear_heating, HeatSolver,
};
use crate::pressure::PressureSolver;

/// Named state vectors integrated by the coordinator: always `psi` and
/// `slip`; `gVxy`/`gVxz` under power-law rheology; `u`/`uPrev` while in the
/// dynamic regime; `T` and `p` while heat/pressure coupling are active.
/// Key names mirror the original's `_varEx` map entries.
pub type IntegrandMap = BTreeMap<String, Vec<f64>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Regime {
    QuasiDynamic,
    Dynamic,
}

struct StageState {
    sigma_xy: Vec<f64>,
    sigma_xz: Vec<f64>,
    sigma_dev: Vec<f64>,
    tau_qs: Vec<f64>,
    slip_vel: Vec<f64>,
}

pub struct Coordinator {
    grid: Grid,
    params: Params,
    material: MaterialField,
    fault: FaultLine,

    bulk_qd: BulkSolver,
    bulk_dyn: Option<BulkSolver>,

    heat: Option<HeatSolver>,
    heat_bc_top: Vec<f64>,
    heat_bc_bottom: Vec<f64>,
    heat_bc_right: Vec<f64>,
    a0_by_depth: Option<Vec<f64>>,
    w_by_depth: Option<Vec<f64>>,

    pressure: Option<PressureSolver>,

    /// Linear displacement profile matching the uniform remote-loading
    /// traction `fault.tau_qs`; see `initial_tau_qs`'s doc comment.
    bc_r_shift: Vec<f64>,

    regime: Regime,
    switch_allowed: bool,

    curr_time: f64,
    step_count: usize,
    delta_t: f64,
    pi_err_history: [f64; 2],

    integrands: IntegrandMap,
    series: Option<SeriesWriter>,
    ckpt_number: usize,
}

impl Coordinator {
    pub fn new(params: Params) -> Result<Self, SCycleError> {
        if params.heat_equation_type.is_some() && !params.time_integrator.is_imex() {
            return Err(SCycleError::Config(scycle_model::ConfigError::MutuallyExclusive {
                a: "heatEquationType".to_string(),
                b: format!(
                    "timeIntegrator={:?} (heat coupling requires an _WBE integrator)",
                    params.time_integrator
                ),
            }));
        }

        let grid = Grid::new(
            params.ny,
            params.nz,
            params.ly,
            params.lz,
            params.order,
            params.sbp_type,
        )?;

        let mut material =
            MaterialField::from_profiles(&grid, params.profile("mu")?, params.profile("rho")?)?;
        if let (Some(a), Some(b), Some(n), Some(t)) = (
            params.profiles.get("A"),
            params.profiles.get("B"),
            params.profiles.get("n"),
            params.profiles.get("T"),
        ) {
            material = material.with_power_law(&grid, a, b, n, t)?;
        }

        // Only the mirrored single-material fault is reachable: `Params`
        // has no keys for a `-`-side material profile, so `Asymmetric`
        // would always be rejected downstream anyway.
        let fault = FaultLine::new(
            &grid,
            &material,
            None,
            params.profile("a")?,
            params.profile("b")?,
            params.profile("sigma_n")?,
            params.profile("Dc")?,
            params.f0,
            params.v0,
            params.v_l,
            FaultVariant::Symmetric,
        )?;

        let bulk_qd = BulkSolver::new(&grid, &material.mu, params.bc_qd, params.lin_solver, params.ksp_tol);

        let bc_r_shift: Vec<f64> = (0..grid.nz)
            .map(|iz| fault.tau_qs[iz] / material.mu[grid.idx(grid.ny - 1, iz)] * grid.ly)
            .collect();

        let mut integrands = IntegrandMap::new();
        integrands.insert("psi".to_string(), fault.psi.clone());
        integrands.insert("slip".to_string(), fault.slip.clone());
        if material.power_law.is_some() {
            integrands.insert("gVxy".to_string(), vec![0.0; grid.num_nodes()]);
            integrands.insert("gVxz".to_string(), vec![0.0; grid.num_nodes()]);
        }

        let z_coords = grid.z_coords();
        let (heat, heat_bc_top, heat_bc_bottom, heat_bc_right, a0_by_depth, w_by_depth) =
            if params.heat_equation_type.is_some() {
                let k_col = params.profile("k")?.resolve(&z_coords, "k")?;
                let c_col = params.profile("c")?.resolve(&z_coords, "c")?;
                let t_col = params.profile("T")?.resolve(&z_coords, "T")?;
                let k_full = broadcast_over_y(&grid, &k_col);
                let c_full = broadcast_over_y(&grid, &c_col);
                let solver = HeatSolver::new(
                    &grid,
                    &k_full,
                    &material.rho,
                    &c_full,
                    params.lin_solver_heateq,
                    params.ksp_tol_heateq,
                );
                integrands.insert("T".to_string(), broadcast_over_y(&grid, &t_col));

                let a0 = if params.with_radio_heat_generation {
                    Some(params.profile("A0")?.resolve(&z_coords, "A0")?)
                } else {
                    None
                };
                let w = if params.with_frictional_heating {
                    params
                        .profiles
                        .get("w")
                        .map(|p| p.resolve(&z_coords, "w"))
                        .transpose()?
                } else {
                    None
                };

                let bc_top = vec![t_col[0]; grid.ny];
                let bc_bottom = vec![t_col[grid.nz - 1]; grid.ny];
                let bc_right = t_col.clone();

                // `guessSteadyStateICs`: seed T from a steady-state solve
                // under the initial fault traction/loading-rate state
                // instead of leaving it at the depth-profile table alone.
                if params.guess_steady_state_ics {
                    let n = grid.num_nodes();
                    let mut source = vec![0.0; n];
                    if let Some(a0_vals) = &a0 {
                        let lrad = params.he_lrad.unwrap_or(1e4);
                        let rad = radioactive_heat_generation(&z_coords, a0_vals, lrad);
                        for iz in 0..grid.nz {
                            for iy in 0..grid.ny {
                                source[grid.idx(iy, iz)] += rad[iz];
                            }
                        }
                    }
                    let mut bc_l_flux = vec![0.0; grid.nz];
                    if params.with_frictional_heating {
                        let flux = frictional_heat_flux(&fault.tau_qs, &fault.slip_vel);
                        match &w {
                            Some(w_vals) => {
                                let vol = frictional_heat_volumetric(&grid, &fault.tau_qs, &fault.slip_vel, w_vals);
                                for i in 0..n {
                                    source[i] += vol[i];
                                }
                            }
                            None => bc_l_flux = flux,
                        }
                    }
                    let rhs = solver.assemble_rhs(&bc_l_flux, &bc_top, &bc_bottom, &bc_right, &source);
                    let t_guess = solver.solve_steady_state(&rhs)?;
                    integrands.insert("T".to_string(), t_guess.iter().cloned().collect());
                }

                (Some(solver), bc_top, bc_bottom, bc_right, a0, w)
            } else {
                (None, Vec::new(), Vec::new(), Vec::new(), None, None)
            };

        let pressure = if params.with_hydraulic_coupling {
            let k_p = params.profile("k_p")?.resolve(&z_coords, "k_p")?;
            let eta_p = params.profile("eta_p")?.resolve(&z_coords, "eta_p")?;
            let n_p = params.profile("n_p")?.resolve(&z_coords, "n_p")?;
            let beta_p = params.profile("beta_p")?.resolve(&z_coords, "beta_p")?;
            integrands.insert("p".to_string(), vec![0.0; grid.nz]);
            Some(PressureSolver::new(
                grid.nz,
                grid.dz(),
                grid.order,
                &k_p,
                &eta_p,
                &n_p,
                &beta_p,
                params.lin_solver,
                params.ksp_tol,
            ))
        } else {
            None
        };

        let series = Some(SeriesWriter::open(format!("{}/series.dat", params.output_dir))?);
        let delta_t = params.init_delta_t;
        let init_time = params.init_time;

        Ok(Self {
            grid,
            material,
            fault,
            bulk_qd,
            bulk_dyn: None,
            heat,
            heat_bc_top,
            heat_bc_bottom,
            heat_bc_right,
            a0_by_depth,
            w_by_depth,
            pressure,
            bc_r_shift,
            regime: Regime::QuasiDynamic,
            switch_allowed: false,
            curr_time: init_time,
            step_count: 0,
            delta_t,
            pi_err_history: [1.0, 1.0],
            integrands,
            series,
            ckpt_number: 0,
            params,
        })
    }

    pub fn curr_time(&self) -> f64 {
        self.curr_time
    }

    pub fn step_count(&self) -> usize {
        self.step_count
    }

    pub fn regime(&self) -> Regime {
        self.regime
    }

    /// Peak slip velocity across the fault, the quantity the regime-switch
    /// predicate and the §8 scenario assertions both key on.
    pub fn max_slip_vel(&self) -> f64 {
        self.fault.slip_vel.iter().cloned().fold(0.0_f64, f64::max)
    }

    pub fn fault_psi(&self) -> &[f64] {
        &self.fault.psi
    }

    pub fn fault_slip(&self) -> &[f64] {
        &self.fault.slip
    }

    pub fn fault_slip_vel(&self) -> &[f64] {
        &self.fault.slip_vel
    }

    pub fn fault_tau_qs(&self) -> &[f64] {
        &self.fault.tau_qs
    }

    /// Read-only access to a named integrand vector (`"T"`, `"p"`, `"u"`,
    /// `"gVxy"`, ...), for callers that only need to observe state rather
    /// than drive the step loop.
    pub fn integrand(&self, name: &str) -> Option<&[f64]> {
        self.integrands.get(name).map(Vec::as_slice)
    }

    pub fn delta_t(&self) -> f64 {
        self.delta_t
    }

    /// Forces an immediate quasi-dynamic->dynamic switch regardless of the
    /// velocity-based predicate. Paired with
    /// [`Coordinator::force_switch_to_quasi_dynamic`] so the switch-handoff
    /// idempotence property (§8 Testable Property 5) can be exercised
    /// without waiting for a real nucleation.
    pub fn force_switch_to_dynamic(&mut self) -> Result<(), SCycleError> {
        self.switch_to_dynamic()
    }

    /// Forces an immediate dynamic->quasi-dynamic switch regardless of the
    /// velocity-based predicate, used by the switch-idempotence test (§8
    /// Testable Property 5) to compare a forced handoff against an
    /// uninterrupted quasi-dynamic run.
    pub fn force_switch_to_quasi_dynamic(&mut self) -> Result<(), SCycleError> {
        self.switch_to_quasi_dynamic()
    }

    /// Runs until `maxTime`/`maxStepCount`, writing a checkpoint every
    /// `stride2D` accepted steps.
    pub fn run(&mut self) -> Result<(), SCycleError> {
        while self.curr_time < self.params.max_time && self.step_count < self.params.max_step_count
        {
            self.step()?;
            if self.step_count % self.params.stride2d.max(1) == 0 {
                self.write_checkpoint()?;
            }
        }
        Ok(())
    }

    pub fn step(&mut self) -> Result<(), SCycleError> {
        match self.regime {
            Regime::QuasiDynamic => self.qd_step()?,
            Regime::Dynamic => self.dyn_step()?,
        }
        self.evaluate_switch()?;
        if self.step_count % self.params.stride1d.max(1) == 0 {
            if let Some(series) = &mut self.series {
                series.append_step(self.curr_time, self.delta_t)?;
            }
        }
        Ok(())
    }

    // ---- quasi-dynamic regime ----------------------------------------

    fn qd_step(&mut self) -> Result<(), SCycleError> {
        let t0 = self.curr_time;
        let y0: IntegrandMap = self
            .integrands
            .iter()
            .filter(|(k, _)| k.as_str() == "psi" || k.as_str() == "slip" || k.starts_with("gV"))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let mut attempts = 0usize;
        loop {
            let dt = self.delta_t;
            let (y1, err) = self.embedded_rk_step(t0, dt, &y0)?;

            if err <= 1.0 || dt <= self.params.min_delta_t * (1.0 + 1e-9) {
                for (k, v) in y1 {
                    self.integrands.insert(k, v);
                }
                self.curr_time = t0 + dt;
                self.step_count += 1;
                self.fault.psi = self.integrands["psi"].clone();
                self.fault.slip = self.integrands["slip"].clone();

                let state = self.stage_state(self.curr_time, &self.integrands)?;
                self.fault.slip_vel = state.slip_vel;
                self.fault.tau_qs = state.tau_qs;

                self.advance_heat_and_pressure(&state, dt)?;

                let err_prev = self.pi_err_history[0].max(1e-12);
                let p = self.params.time_integrator.order();
                let raw = dt * (1.0 / err.max(1e-12)).powf(0.7 / p) * (err_prev / err.max(1e-12)).powf(0.3 / p);
                self.pi_err_history = [err, self.pi_err_history[0]];
                self.delta_t = raw.clamp(self.params.min_delta_t, self.max_delta_t_clip());
                debug!(t = self.curr_time, dt = self.delta_t, err, "qd step accepted");
                break;
            } else {
                self.delta_t = (dt * 0.5).max(self.params.min_delta_t);
                attempts += 1;
                if attempts > 50 {
                    return Err(SCycleError::StepSizeCollapse { attempts });
                }
            }
        }
        Ok(())
    }

    fn embedded_rk_step(
        &self,
        t0: f64,
        dt: f64,
        y0: &IntegrandMap,
    ) -> Result<(IntegrandMap, f64), SCycleError> {
        match self.params.time_integrator {
            TimeIntegrator::Rk32 | TimeIntegrator::Rk32Wbe => self.bs23_step(t0, dt, y0),
            TimeIntegrator::Rk43 | TimeIntegrator::Rk43Wbe => self.merson_step(t0, dt, y0),
        }
    }

    /// Bogacki-Shampine BS23: third-order solution, second-order embedded
    /// error estimate.
    fn bs23_step(&self, t0: f64, dt: f64, y0: &IntegrandMap) -> Result<(IntegrandMap, f64), SCycleError> {
        let k1 = self.d_dt(t0, y0)?;
        let y2 = axpy(y0, &[(dt * 0.5, &k1)]);
        let k2 = self.d_dt(t0 + dt * 0.5, &y2)?;
        let y3 = axpy(y0, &[(dt * 0.75, &k2)]);
        let k3 = self.d_dt(t0 + dt * 0.75, &y3)?;
        let y1 = axpy(y0, &[(dt * 2.0 / 9.0, &k1), (dt / 3.0, &k2), (dt * 4.0 / 9.0, &k3)]);
        let k4 = self.d_dt(t0 + dt, &y1)?;
        let y1_low = axpy(
            y0,
            &[(dt * 7.0 / 24.0, &k1), (dt * 0.25, &k2), (dt / 3.0, &k3), (dt / 8.0, &k4)],
        );
        let err = self.error_norm_diff(&y1, &y1_low);
        Ok((y1, err))
    }

    /// Merson's method: fourth-order solution, third-order error estimate
    /// `dt/30 * (2 k1 - 9 k3 + 8 k4 - k5)`.
    fn merson_step(&self, t0: f64, dt: f64, y0: &IntegrandMap) -> Result<(IntegrandMap, f64), SCycleError> {
        let k1 = self.d_dt(t0, y0)?;
        let y2 = axpy(y0, &[(dt / 3.0, &k1)]);
        let k2 = self.d_dt(t0 + dt / 3.0, &y2)?;
        let y3 = axpy(y0, &[(dt / 6.0, &k1), (dt / 6.0, &k2)]);
        let k3 = self.d_dt(t0 + dt / 3.0, &y3)?;
        let y4 = axpy(y0, &[(dt / 8.0, &k1), (dt * 3.0 / 8.0, &k3)]);
        let k4 = self.d_dt(t0 + dt / 2.0, &y4)?;
        let y5 = axpy(y0, &[(dt / 2.0, &k1), (-dt * 3.0 / 2.0, &k3), (dt * 2.0, &k4)]);
        let k5 = self.d_dt(t0 + dt, &y5)?;
        let y1 = axpy(y0, &[(dt / 6.0, &k1), (dt * 4.0 / 6.0, &k4), (dt / 6.0, &k5)]);

        let zero = zero_like(y0);
        let err_vec = axpy(
            &zero,
            &[
                (dt * 2.0 / 30.0, &k1),
                (-dt * 9.0 / 30.0, &k3),
                (dt * 8.0 / 30.0, &k4),
                (-dt / 30.0, &k5),
            ],
        );
        let err = self.error_norm(&err_vec);
        Ok((y1, err))
    }

    fn error_norm(&self, err_map: &IntegrandMap) -> f64 {
        let mut sumsq = 0.0;
        let mut count = 0usize;
        for key in &self.params.time_int_inds {
            if let Some(v) = err_map.get(key) {
                for &e in v {
                    sumsq += (e / self.params.atol).powi(2);
                    count += 1;
                }
            }
        }
        if count == 0 {
            0.0
        } else {
            (sumsq / count as f64).sqrt()
        }
    }

    fn error_norm_diff(&self, hi: &IntegrandMap, lo: &IntegrandMap) -> f64 {
        let diff: IntegrandMap = hi
            .iter()
            .map(|(k, v)| {
                let lo_v = &lo[k];
                let d: Vec<f64> = v.iter().zip(lo_v).map(|(a, b)| a - b).collect();
                (k.clone(), d)
            })
            .collect();
        self.error_norm(&diff)
    }

    /// `maxDeltaT` clipped to 30% of the minimum Maxwell time (power-law
    /// rheology only) and the shear-wave CFL bound, per the step-size
    /// control design.
    fn max_delta_t_clip(&self) -> f64 {
        let mut clip = self.params.max_delta_t;
        if let Some(pl) = &self.material.power_law {
            let min_eta_over_mu = pl
                .a
                .iter()
                .enumerate()
                .map(|(i, &a)| {
                    let sigma_dev = 1.0; // unit-stress Maxwell-time estimate; see DESIGN.md
                    let eta = creep::effective_viscosity(a, pl.b[i], pl.n[i], pl.t[i], sigma_dev);
                    eta / self.material.mu[i]
                })
                .fold(f64::INFINITY, f64::min);
            clip = clip.min(0.3 * min_eta_over_mu);
        }
        let cs_min = self.material.cs.iter().cloned().fold(f64::INFINITY, f64::min);
        clip.min(self.grid.min_spacing() / cs_min)
    }

    // ---- fully-dynamic regime -----------------------------------------

    fn dyn_step(&mut self) -> Result<(), SCycleError> {
        let bulk_dyn = self
            .bulk_dyn
            .as_ref()
            .expect("bulk_dyn is built before entering Regime::Dynamic");
        let n = self.grid.num_nodes();

        let u_n = DVector::from_row_slice(&self.integrands["u"]);
        let u_prev = DVector::from_row_slice(&self.integrands["uPrev"]);

        let (sigma_xy, sigma_xz, _sigma_dev) = bulk_dyn.stresses(&u_n, None, None);
        let tau_trial = bulk_dyn.shear_on_fault(&sigma_xy);

        let psi = self.integrands["psi"].clone();
        let mut slip = self.integrands["slip"].clone();
        let mut slip_vel = vec![0.0; self.grid.nz];
        let mut psi_new = psi.clone();

        let dt = self.dynamic_cfl_dt();
        for iz in 0..self.grid.nz {
            let eta = self.fault.eta(iz);
            let (v_lo, v_hi) = slip_velocity_bracket(tau_trial[iz], eta);
            let v = bisect_slip_velocity(
                iz,
                self.fault.a[iz],
                self.fault.sigma_n[iz],
                self.fault.v0,
                psi[iz],
                tau_trial[iz],
                eta,
                v_lo,
                v_hi,
                100,
            )?;
            slip_vel[iz] = v;
            slip[iz] += v * dt;
            let rate = aging_law_rate(psi[iz], v, self.fault.b[iz], self.fault.dc[iz], self.fault.f0, self.fault.v0);
            psi_new[iz] = psi[iz] + check_state_rate(iz, rate, psi[iz], self.fault.a[iz], self.fault.sigma_n[iz], eta, tau_trial[iz], v)? * dt;
        }

        let zeros_nz = vec![0.0; self.grid.nz];
        let zeros_ny = vec![0.0; self.grid.ny];
        let rhs = bulk_dyn.set_rhs(&tau_trial, &zeros_nz, &zeros_ny, &zeros_ny, None);
        let au = bulk_dyn.matvec(&u_n);

        let mut u_next = vec![0.0; n];
        for i in 0..n {
            let accel = (-au[i] + rhs[i]) / self.material.rho[i];
            u_next[i] = 2.0 * u_n[i] - u_prev[i] + dt * dt * accel;
        }

        self.integrands.insert("uPrev".to_string(), u_n.iter().cloned().collect());
        self.integrands.insert("u".to_string(), u_next);
        self.integrands.insert("psi".to_string(), psi_new.clone());
        self.integrands.insert("slip".to_string(), slip.clone());
        self.fault.psi = psi_new;
        self.fault.slip = slip;
        self.fault.slip_vel = slip_vel;
        self.fault.tau_qs = tau_trial;

        self.curr_time += dt;
        self.step_count += 1;
        self.delta_t = dt;
        Ok(())
    }

    fn dynamic_cfl_dt(&self) -> f64 {
        let cs_min = self.material.cs.iter().cloned().fold(f64::INFINITY, f64::min);
        self.params.cfl * self.grid.min_spacing() / cs_min
    }

    // ---- regime switching ----------------------------------------------

    fn evaluate_switch(&mut self) -> Result<(), SCycleError> {
        let max_v = self.fault.slip_vel.iter().cloned().fold(0.0_f64, f64::max);
        match self.regime {
            Regime::QuasiDynamic => {
                if !self.switch_allowed && max_v < self.params.limit_qd {
                    self.switch_allowed = true;
                }
                if self.switch_allowed && max_v > self.params.trigger_qd2d {
                    info!(t = self.curr_time, max_v, "switching quasi-dynamic -> dynamic");
                    self.switch_to_dynamic()?;
                }
            }
            Regime::Dynamic => {
                if !self.switch_allowed && max_v > self.params.limit_dyn {
                    self.switch_allowed = true;
                }
                if self.switch_allowed && max_v < self.params.trigger_d2qd {
                    info!(t = self.curr_time, max_v, "switching dynamic -> quasi-dynamic");
                    self.switch_to_quasi_dynamic()?;
                }
            }
        }
        Ok(())
    }

    fn switch_to_dynamic(&mut self) -> Result<(), SCycleError> {
        if self.bulk_dyn.is_none() {
            let dyn_bc = scycle_model::BoundaryConfig {
                left: BcKind::FreeSurface,
                right: BcKind::FreeSurface,
                top: BcKind::FreeSurface,
                bottom: BcKind::FreeSurface,
            };
            self.bulk_dyn = Some(BulkSolver::new(
                &self.grid,
                &self.material.mu,
                dyn_bc,
                self.params.lin_solver,
                self.params.ksp_tol,
            ));
        }

        let state = self.stage_state(self.curr_time, &self.integrands)?;
        let bc_l: Vec<f64> = (0..self.grid.nz).map(|iz| 0.5 * self.integrands["slip"][iz]).collect();
        let zeros_ny = vec![0.0; self.grid.ny];
        let rhs = self.bulk_qd.set_rhs(&bc_l, &vec![0.0; self.grid.nz], &zeros_ny, &zeros_ny, None);
        let u_n = self.bulk_qd.solve(&rhs)?;

        let dt = self.dynamic_cfl_dt();
        if self.params.delta_t > dt {
            warn!(
                requested = self.params.delta_t,
                cfl_bound = dt,
                "configured deltaT does not meet the CFL requirement; using the CFL-derived step instead"
            );
        }
        let mut u_prev = vec![0.0; self.grid.num_nodes()];
        for iy in 0..self.grid.ny {
            for iz in 0..self.grid.nz {
                let idx = self.grid.idx(iy, iz);
                let v_node = if iy == 0 { state.slip_vel[iz] } else { 0.0 };
                u_prev[idx] = u_n[idx] - dt * v_node;
            }
        }

        self.integrands.insert("u".to_string(), u_n.iter().cloned().collect());
        self.integrands.insert("uPrev".to_string(), u_prev);
        self.regime = Regime::Dynamic;
        self.switch_allowed = false;
        self.delta_t = dt;
        Ok(())
    }

    fn switch_to_quasi_dynamic(&mut self) -> Result<(), SCycleError> {
        if let Some(series) = &mut self.series {
            series.append_step(self.curr_time, self.delta_t)?;
        }
        self.integrands.remove("u");
        self.integrands.remove("uPrev");
        self.regime = Regime::QuasiDynamic;
        self.switch_allowed = false;
        self.delta_t = self
            .params
            .init_delta_t
            .min(self.max_delta_t_clip())
            .max(self.params.min_delta_t);
        Ok(())
    }

    // ---- shared per-stage data flow -------------------------------------

    fn boundary_vectors(&self, t: f64, slip: &[f64]) -> (Vec<f64>, Vec<f64>, Vec<f64>, Vec<f64>) {
        let remote = 0.5 * self.params.v_l * t;
        let side_value = |kind: BcKind, iz: usize| match kind {
            BcKind::SymmFault => 0.5 * slip[iz],
            BcKind::RemoteLoading => remote + self.bc_r_shift[iz],
            _ => 0.0,
        };
        let bc_l: Vec<f64> = (0..self.grid.nz).map(|iz| side_value(self.params.bc_qd.left, iz)).collect();
        let bc_r: Vec<f64> = (0..self.grid.nz).map(|iz| side_value(self.params.bc_qd.right, iz)).collect();

        let edge_shift = remote + self.bc_r_shift.last().copied().unwrap_or(0.0);
        let ramp = |iy: usize| -> f64 {
            let frac = iy as f64 / (self.grid.ny - 1) as f64;
            frac * edge_shift
        };
        let bc_t: Vec<f64> = (0..self.grid.ny)
            .map(|iy| if self.params.bc_qd.top == BcKind::RemoteLoading { ramp(iy) } else { 0.0 })
            .collect();
        let bc_b: Vec<f64> = (0..self.grid.ny)
            .map(|iy| if self.params.bc_qd.bottom == BcKind::RemoteLoading { ramp(iy) } else { 0.0 })
            .collect();
        (bc_l, bc_r, bc_t, bc_b)
    }

    /// Bulk solve, stress extraction and fault rootfinding for a trial
    /// state `y`, following the fixed per-stage ordering: (1) update BCs,
    /// (2) bulk solve, (3) stress extraction, (4) fault rootfinding.
    fn stage_state(&self, t: f64, y: &IntegrandMap) -> Result<StageState, SCycleError> {
        let slip = &y["slip"];
        let psi = &y["psi"];
        let gxy = y.get("gVxy").map(Vec::as_slice);
        let gxz = y.get("gVxz").map(Vec::as_slice);

        let (bc_l, bc_r, bc_t, bc_b) = self.boundary_vectors(t, slip);

        let body_force = match (gxy, gxz) {
            (Some(gxy), Some(gxz)) => {
                let mut force = self.bulk_qd.viscous_body_force(gxy, gxz);
                if let Some(bf) = self.params.body_force {
                    for v in force.iter_mut() {
                        *v += bf;
                    }
                }
                Some(force)
            }
            _ => self.params.body_force.map(|bf| vec![bf; self.grid.num_nodes()]),
        };

        let rhs = self.bulk_qd.set_rhs(&bc_l, &bc_r, &bc_t, &bc_b, body_force.as_deref());
        let u = self.bulk_qd.solve(&rhs)?;
        let (sigma_xy, sigma_xz, sigma_dev) = self.bulk_qd.stresses(&u, gxy, gxz);
        let tau_qs = self.bulk_qd.shear_on_fault(&sigma_xy);

        let p_field = y.get("p");
        let mut slip_vel = vec![0.0; self.grid.nz];
        for iz in 0..self.grid.nz {
            let sigma_n_eff = match p_field {
                Some(p) => (self.fault.sigma_n[iz] - p[iz]).max(1e3),
                None => self.fault.sigma_n[iz],
            };
            let eta = self.fault.eta(iz);
            let (v_lo, v_hi) = slip_velocity_bracket(tau_qs[iz], eta);
            slip_vel[iz] = bisect_slip_velocity(
                iz,
                self.fault.a[iz],
                sigma_n_eff,
                self.fault.v0,
                psi[iz],
                tau_qs[iz],
                eta,
                v_lo,
                v_hi,
                100,
            )?;
        }

        Ok(StageState { sigma_xy, sigma_xz, sigma_dev, tau_qs, slip_vel })
    }

    fn d_dt(&self, t: f64, y: &IntegrandMap) -> Result<IntegrandMap, SCycleError> {
        let state = self.stage_state(t, y)?;
        let psi = &y["psi"];

        let mut psi_rate = vec![0.0; self.grid.nz];
        for iz in 0..self.grid.nz {
            let eta = self.fault.eta(iz);
            let rate = aging_law_rate(
                psi[iz],
                state.slip_vel[iz],
                self.fault.b[iz],
                self.fault.dc[iz],
                self.fault.f0,
                self.fault.v0,
            );
            psi_rate[iz] = check_state_rate(
                iz,
                rate,
                psi[iz],
                self.fault.a[iz],
                self.fault.sigma_n[iz],
                eta,
                state.tau_qs[iz],
                state.slip_vel[iz],
            )?;
        }

        let mut rates = IntegrandMap::new();
        rates.insert("psi".to_string(), psi_rate);
        rates.insert("slip".to_string(), state.slip_vel.clone());

        if let Some(pl) = &self.material.power_law {
            // Temperature entering the Arrhenius law is frozen at its last
            // accepted value across RK stages (the IMEX split: heat is
            // advanced once per accepted step, not per stage).
            let t_field: &[f64] = self.integrands.get("T").map(Vec::as_slice).unwrap_or(&pl.t);
            let n = self.grid.num_nodes();
            let mut gxy_rate = vec![0.0; n];
            let mut gxz_rate = vec![0.0; n];
            for i in 0..n {
                let (rxy, rxz) = creep::viscous_strain_rate(
                    state.sigma_xy[i],
                    state.sigma_xz[i],
                    state.sigma_dev[i],
                    pl.a[i],
                    pl.b[i],
                    pl.n[i],
                    t_field[i],
                );
                gxy_rate[i] = rxy;
                gxz_rate[i] = rxz;
            }
            rates.insert("gVxy".to_string(), gxy_rate);
            rates.insert("gVxz".to_string(), gxz_rate);
        }

        Ok(rates)
    }

    /// Advances the heat equation and pressure diffusion one implicit step
    /// each, using the mechanical state just accepted.
    fn advance_heat_and_pressure(&mut self, state: &StageState, dt: f64) -> Result<(), SCycleError> {
        if self.heat.is_some() {
            let n = self.grid.num_nodes();
            let mut source = vec![0.0; n];

            if let Some(a0) = &self.a0_by_depth {
                let lrad = self.params.he_lrad.unwrap_or(1e4);
                let z = self.grid.z_coords();
                let rad = radioactive_heat_generation(&z, a0, lrad);
                for iz in 0..self.grid.nz {
                    for iy in 0..self.grid.ny {
                        source[self.grid.idx(iy, iz)] += rad[iz];
                    }
                }
            }

            if self.params.with_visc_shear_heating {
                if let Some(gxy_rate) = self.last_viscous_rate(state) {
                    let shear = viscous_shear_heating(&state.sigma_xy, &state.sigma_xz, &gxy_rate.0, &gxy_rate.1);
                    for i in 0..n {
                        source[i] += shear[i];
                    }
                }
            }

            let mut bc_l_flux = vec![0.0; self.grid.nz];
            if self.params.with_frictional_heating {
                let flux = frictional_heat_flux(&self.fault.tau_qs, &self.fault.slip_vel);
                match &self.w_by_depth {
                    Some(w) => {
                        let vol = frictional_heat_volumetric(&self.grid, &self.fault.tau_qs, &self.fault.slip_vel, w);
                        for i in 0..n {
                            source[i] += vol[i];
                        }
                    }
                    None => bc_l_flux = flux,
                }
            }

            let heat = self.heat.as_ref().unwrap();
            let rhs = heat.assemble_rhs(&bc_l_flux, &self.heat_bc_top, &self.heat_bc_bottom, &self.heat_bc_right, &source);
            let t_prev = DVector::from_row_slice(&self.integrands["T"]);
            let t_new = match self.params.heat_equation_type {
                Some(scycle_model::HeatEquationType::SteadyState) => heat.solve_steady_state(&rhs)?,
                _ => heat.step_backward_euler(&t_prev, dt, &rhs)?,
            };
            self.integrands.insert("T".to_string(), t_new.iter().cloned().collect());
        }

        if let Some(pressure) = &self.pressure {
            let source = pressure.gravity_source(self.params.rho_f, self.params.gravity);
            let rhs = pressure.assemble_rhs(0.0, 0.0, &source);
            let p_prev = DVector::from_row_slice(&self.integrands["p"]);
            let p_new = pressure.step_backward_euler(&p_prev, dt, &rhs)?;
            self.integrands.insert("p".to_string(), p_new.iter().cloned().collect());
        }

        Ok(())
    }

    /// Recomputes the viscous strain rate at the just-accepted state, for
    /// the shear-heating source term (a cheap re-evaluation of the last
    /// stage's rates rather than threading them through the RK step).
    fn last_viscous_rate(&self, state: &StageState) -> Option<(Vec<f64>, Vec<f64>)> {
        let pl = self.material.power_law.as_ref()?;
        let t_field: &[f64] = self.integrands.get("T").map(Vec::as_slice).unwrap_or(&pl.t);
        let n = self.grid.num_nodes();
        let mut gxy_rate = vec![0.0; n];
        let mut gxz_rate = vec![0.0; n];
        for i in 0..n {
            let (rxy, rxz) = creep::viscous_strain_rate(
                state.sigma_xy[i],
                state.sigma_xz[i],
                state.sigma_dev[i],
                pl.a[i],
                pl.b[i],
                pl.n[i],
                t_field[i],
            );
            gxy_rate[i] = rxy;
            gxz_rate[i] = rxz;
        }
        Some((gxy_rate, gxz_rate))
    }

    fn write_checkpoint(&mut self) -> Result<(), SCycleError> {
        let path = format!("{}/checkpoint_{}.json", self.params.output_dir, self.ckpt_number);
        let checkpoint = Checkpoint {
            schema_version: 1,
            ckpt_number: self.ckpt_number,
            curr_time: self.curr_time,
            step_count: self.step_count,
            delta_t: self.delta_t,
            pi_err_history: self.pi_err_history,
            in_dynamic: matches!(self.regime, Regime::Dynamic),
            integrands: self.integrands.clone(),
        };
        scycle_io::save_checkpoint(&path, &checkpoint).map_err(|e| SCycleError::Io(e.into()))?;
        self.ckpt_number += 1;
        Ok(())
    }
}

fn slip_velocity_bracket(tau_qs: f64, eta: f64) -> (f64, f64) {
    let v_guess = 2.0 * (tau_qs / eta).abs() + 1e-12;
    (-v_guess, v_guess)
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

fn zero_like(m: &IntegrandMap) -> IntegrandMap {
    m.iter().map(|(k, v)| (k.clone(), vec![0.0; v.len()])).collect()
}

fn axpy(base: &IntegrandMap, terms: &[(f64, &IntegrandMap)]) -> IntegrandMap {
    let mut out = base.clone();
    for (coeff, map) in terms {
        for (k, v) in map.iter() {
            if let Some(target) = out.get_mut(k) {
                for (o, vi) in target.iter_mut().zip(v.iter()) {
                    *o += coeff * vi;
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use scycle_inp::RawInput;

    fn sample_input(extra: &str) -> RawInput {
        let mut src = String::from(
            "order = 4\n\
             Ny = 5\n\
             Nz = 5\n\
             Ly = 10000\n\
             Lz = 10000\n\
             momBal_bcL_qd = symmFault\n\
             momBal_bcR_qd = remoteLoading\n\
             momBal_bcT_qd = freeSurface\n\
             momBal_bcB_qd = freeSurface\n\
             maxTime = 1e6\n\
             maxStepCount = 3\n\
             vL = 1e-9\n\
             initDeltaT = 1e4\n\
             minDeltaT = 1.0\n\
             muVals = {30e9, 30e9}\n\
             muDepths = {0, 10000}\n\
             rhoVals = {2670, 2670}\n\
             rhoDepths = {0, 10000}\n\
             aVals = {0.015, 0.015}\n\
             aDepths = {0, 10000}\n\
             bVals = {0.02, 0.02}\n\
             bDepths = {0, 10000}\n\
             sigma_nVals = {50e6, 50e6}\n\
             sigma_nDepths = {0, 10000}\n\
             DcVals = {0.008, 0.008}\n\
             DcDepths = {0, 10000}\n",
        );
        src.push_str(extra);
        RawInput::parse_str(&src, " = ").unwrap()
    }

    #[test]
    fn coordinator_builds_from_minimal_config() {
        let dir = std::env::temp_dir().join(format!(
            "scycle-coord-{}-{}",
            std::process::id(),
            std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap().subsec_nanos()
        ));
        let input = sample_input(&format!("outputDir = {}\n", dir.display()));
        let params = Params::from_entries(&input).unwrap();
        let coordinator = Coordinator::new(params).unwrap();
        assert_eq!(coordinator.regime(), Regime::QuasiDynamic);
        assert_eq!(coordinator.step_count(), 0);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn single_step_advances_time_and_stays_quasi_dynamic() {
        let dir = std::env::temp_dir().join(format!(
            "scycle-coord-step-{}-{}",
            std::process::id(),
            std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap().subsec_nanos()
        ));
        let input = sample_input(&format!("outputDir = {}\n", dir.display()));
        let params = Params::from_entries(&input).unwrap();
        let mut coordinator = Coordinator::new(params).unwrap();
        coordinator.step().unwrap();
        assert!(coordinator.curr_time() > 0.0);
        assert_eq!(coordinator.step_count(), 1);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn heat_without_imex_integrator_is_a_config_error() {
        let dir = std::env::temp_dir().join(format!(
            "scycle-coord-heat-{}-{}",
            std::process::id(),
            std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap().subsec_nanos()
        ));
        let input = sample_input(&format!(
            "outputDir = {}\nheatEquationType = transient\ntimeIntegrator = RK43\n\
             kVals = {{3.0, 3.0}}\nkDepths = {{0, 10000}}\ncVals = {{1000, 1000}}\ncDepths = {{0, 10000}}\n\
             TVals = {{500, 500}}\nTDepths = {{0, 10000}}\n",
            dir.display()
        ));
        let params = Params::from_entries(&input).unwrap();
        let err = Coordinator::new(params).unwrap_err();
        assert!(matches!(err, SCycleError::Config(_)));
    }

    #[test]
    fn run_respects_max_step_count() {
        let dir = std::env::temp_dir().join(format!(
            "scycle-coord-run-{}-{}",
            std::process::id(),
            std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap().subsec_nanos()
        ));
        let input = sample_input(&format!("outputDir = {}\n", dir.display()));
        let params = Params::from_entries(&input).unwrap();
        let mut coordinator = Coordinator::new(params).unwrap();
        coordinator.run().unwrap();
        assert!(coordinator.step_count() <= 3);
        std::fs::remove_dir_all(&dir).ok();
    }
}
