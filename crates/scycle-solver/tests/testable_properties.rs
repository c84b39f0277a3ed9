//! Cross-crate tests for the frictional-residual, aging-law steady-state,
//! and switch-idempotence properties of §8. SBP energy consistency and
//! manufactured-solution convergence (properties 1 and 2) are covered
//! in-crate by `sbp.rs` and `mms.rs`'s own unit tests; the stress-balance
//! round-trip (property 4) is covered by `bulk.rs`'s unit tests. This
//! file covers the properties that need a running [`Coordinator`].

mod common;

use common::{coordinator_from_deck, A, B, DC, F0, SIGMA_N, V0, V_L};
use scycle_solver::{resid, stress, strength};

/// Radiation impedance for the uniform S1-style material: `eta = Z/2`
/// with `Z = mu/cs`, `cs = sqrt(mu/rho)`.
fn eta() -> f64 {
    let cs = (common::MU / common::RHO).sqrt();
    let z = common::MU / cs;
    z / 2.0
}

/// Testable Property 3: after any completed step, the frictional residual
/// is within `rootTol` of zero at every fault node. The bisection
/// rootfinder's own iteration cap is 100 (see `coordinator.rs`), tighter
/// than the `1e-14` bracket-width tie-break, so the realized residual
/// should be far below any reasonable `rootTol`; this test uses `1e-2`
/// (the same tolerance `fault.rs`'s own bisection unit test uses) rather
/// than the spec's unspecified exact value.
#[test]
fn frictional_residual_stays_within_root_tolerance() {
    let deck = common::base_deck("residual", "maxTime = 3e5\nmaxStepCount = 50\n");
    let mut coord = coordinator_from_deck(&deck);
    for _ in 0..20 {
        coord.step().expect("step succeeds");
        if coord.curr_time() >= 3e5 {
            break;
        }
    }

    let psi = coord.fault_psi();
    let tau_qs = coord.fault_tau_qs();
    let v = coord.fault_slip_vel();
    let eta = eta();

    for i in 0..psi.len() {
        let r = resid(v[i], A, SIGMA_N, V0, psi[i], tau_qs[i], eta);
        assert!(r.abs() < 1e-2, "node {i}: residual {r} exceeds tolerance");

        // Sanity check that `resid` really is `strength - stress` at this
        // point, not just independently small.
        let s = strength(v[i], A, SIGMA_N, V0, psi[i]);
        let t = stress(v[i], tau_qs[i], eta);
        assert!((r - (s - t)).abs() < 1e-9);
    }
}

/// Testable Property 6 (aging-law steady state). The aging law's fixed
/// point at constant `V` is `exp((f0-psi)/b) = V/v0`, i.e. `psi_ss = f0 -
/// b*ln(V/v0)` (the spec's restated form via the friction-law identity is
/// equivalent; this is the direct fixed point of `dpsi/dt = 0`). Under
/// the steady `vL` loading rate, the relaxation rate is `b*v0/Dc`, so the
/// state variable equilibrates on a timescale `Dc/(b*v0)`; running for
/// several multiples of that timescale should bring `psi` close to
/// `psi_ss`.
#[test]
fn aging_law_relaxes_toward_its_fixed_point() {
    let relax_time = DC / (B * V0);
    let max_time = 30.0 * relax_time;
    let deck = common::base_deck(
        "aging-steady",
        &format!("maxTime = {max_time}\nmaxStepCount = 20000\n"),
    );
    let mut coord = coordinator_from_deck(&deck);

    while coord.curr_time() < max_time && coord.step_count() < 20000 {
        coord.step().expect("step succeeds");
    }

    let psi_ss = F0 - B * (V_L / V0).ln();
    let psi = coord.fault_psi();
    let mean_psi = psi.iter().sum::<f64>() / psi.len() as f64;

    assert!(
        (mean_psi - psi_ss).abs() / psi_ss < 0.1,
        "mean psi {mean_psi} did not relax toward psi_ss {psi_ss}"
    );
    // Stayed quasi-dynamic the whole time: steady creep near vL is not
    // expected to trip the default trigger thresholds.
    assert_eq!(coord.regime(), scycle_solver::Regime::QuasiDynamic);
}

/// Testable Property 5 (switch idempotence, handoff form). The qd->dyn
/// and dyn->qd handoffs of §4.6 only touch the integrand map's `u`/`uPrev`
/// entries and the coordinator's own regime/step-size bookkeeping; neither
/// handoff writes to the fault's `psi`/`slip`/`slipVel` arrays. So an
/// immediate forced round trip through the dynamic regime, with no
/// intervening dynamic step taken, must leave the fault state bit-for-bit
/// unchanged — this is the truncation-free part of the idempotence
/// property the spec calls for (the lossy part is the dt chosen for the
/// *next* qd step, which this test does not exercise).
#[test]
fn switch_handoff_round_trip_preserves_fault_state_with_no_step_taken() {
    let deck = common::base_deck("switch-handoff", "maxTime = 1e9\nmaxStepCount = 5\n");
    let mut coord = coordinator_from_deck(&deck);

    let psi_before = coord.fault_psi().to_vec();
    let slip_before = coord.fault_slip().to_vec();

    coord.force_switch_to_dynamic().expect("forced switch to dynamic");
    assert_eq!(coord.regime(), scycle_solver::Regime::Dynamic);
    coord
        .force_switch_to_quasi_dynamic()
        .expect("forced switch back to quasi-dynamic");
    assert_eq!(coord.regime(), scycle_solver::Regime::QuasiDynamic);

    assert_eq!(coord.fault_psi(), psi_before.as_slice());
    assert_eq!(coord.fault_slip(), slip_before.as_slice());
}
