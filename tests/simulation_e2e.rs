//! End-to-end convergence scenarios (spec §8's scenarios A-E), driven
//! entirely through the public `Simulation`/`OutputSink` API. Grounded on
//! the teacher's `tests/simulation_e2e.rs`: a hand-rolled physics/network
//! stand-in (here the simulator itself, since the model under test *is*
//! the physics), a `RecordingSink` collecting per-SYNC status the way the
//! teacher's test harness collects `SimulationResult`, and `assert!`
//! threshold checks rather than exact-value comparisons.

use ptpconverge::config::SystemConfig;
use ptpconverge::driver::Simulation;
use ptpconverge::stage::Stage;
use ptpconverge::status::{StageCode, SyncStatus};
use ptpconverge::traits::{OutputSink, RecordingSink};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn code_to_stage(code: StageCode) -> Stage {
    match code {
        StageCode::DelayEst => Stage::DelayEst,
        StageCode::CoarseSynt => Stage::CoarseSynt,
        StageCode::FineSynt => Stage::FineSynt,
        StageCode::ConstToff => Stage::ConstToff,
    }
}

/// Collects the iteration index (1-based count of SYNC RXs observed) at
/// which the stage first changes, alongside the full history.
struct StageTrackingSink {
    history: Vec<SyncStatus>,
    first_seen_at: [Option<u64>; 4],
    count: u64,
}

impl StageTrackingSink {
    fn new() -> Self {
        StageTrackingSink {
            history: Vec::new(),
            first_seen_at: [None; 4],
            count: 0,
        }
    }
}

impl OutputSink for StageTrackingSink {
    fn on_sync_rx(&mut self, status: SyncStatus) {
        self.count += 1;
        let idx = code_to_stage(status.stage).index();
        if self.first_seen_at[idx].is_none() {
            self.first_seen_at[idx] = Some(self.count);
        }
        self.history.push(status);
    }
}

fn default_scenario_config() -> SystemConfig {
    // Matches spec §8's end-to-end scenario setup: 128Hz SYNC, 8Hz
    // Pdelay, stage windows 64/512/16384/1024, all least-squares,
    // Erlang-2 network delay with a 5us mean. This is exactly
    // `SystemConfig::default()`.
    SystemConfig::default()
}

/// Scenario A: slave ppb=400, perfect delay, fixed-point increment
/// enabled (26 int / 20 frac bits, the default). Expect the controller
/// to reach COARSE_SYNT's handoff condition, capture a slope in
/// FINE_SYNT, and settle in CONST_TOFF with a small residual error.
#[test]
fn scenario_a_high_ppb_perfect_delay_converges_through_all_stages() {
    init_logging();
    let mut cfg = default_scenario_config();
    cfg.slave_rtc.freq_offset_ppb = 400.0;
    cfg.perfect_delay_est = true;

    let mut sim = Simulation::new(cfg, StdRng::seed_from_u64(1)).unwrap();
    let mut sink = StageTrackingSink::new();
    sim.run_steps(400_000, &mut sink).unwrap();

    assert_eq!(sim.stage(), Stage::ConstToff, "should reach the terminal stage");
    assert!(
        sink.first_seen_at[Stage::CoarseSynt.index()].is_some(),
        "must have advanced into COARSE_SYNT"
    );
    assert!(
        sink.first_seen_at[Stage::FineSynt.index()].is_some(),
        "must have advanced into FINE_SYNT"
    );

    // Residual error once settled in CONST_TOFF: generously bounded, the
    // slope corrector keeps the offset register tracking the captured
    // slope to within a few hundred ns at 128 Hz SYNC with a 1024-sample
    // residual-offset window.
    let tail_in_const_toff: Vec<&SyncStatus> = sink
        .history
        .iter()
        .rev()
        .take(200)
        .filter(|s| s.stage == StageCode::ConstToff)
        .collect();
    assert!(
        !tail_in_const_toff.is_empty(),
        "expected CONST_TOFF samples near the end of the run"
    );
    for s in &tail_in_const_toff {
        assert!(
            s.actual_ns_error.abs() < 5_000,
            "actual_ns_error {} too large in CONST_TOFF",
            s.actual_ns_error
        );
    }
}

/// Scenario B: slave ppb=0, stochastic delay. The stage should advance
/// past DELAY_EST; once coarse syntonization is applied the measured
/// normalized frequency offset should stay close to zero (both clocks
/// share the same nominal frequency) and the slope captured in
/// FINE_SYNT should be small.
#[test]
fn scenario_b_zero_ppb_stochastic_delay_stays_near_nominal() {
    init_logging();
    let cfg = default_scenario_config(); // slave ppb defaults to 0.0

    let mut sim = Simulation::new(cfg, StdRng::seed_from_u64(7)).unwrap();
    let mut sink = StageTrackingSink::new();
    sim.run_steps(400_000, &mut sink).unwrap();

    assert_ne!(sim.stage(), Stage::DelayEst, "must advance out of DELAY_EST");

    let last_norm_freq_offset = sink
        .history
        .iter()
        .rev()
        .find(|s| s.stage != StageCode::DelayEst)
        .map(|s| s.norm_freq_offset_to_nominal)
        .unwrap_or(0.0);
    assert!(
        (last_norm_freq_offset * 1e9).abs() < 50.0,
        "norm_freq_offset {} ppb should stay near zero for matched nominal clocks",
        last_norm_freq_offset * 1e9
    );
}

/// Scenario C: slave ppb=5001, just over `foffset_thresh_ppb` (5000).
/// The true frequency offset never drops below threshold (nothing
/// corrects it while stuck in COARSE_SYNT, since offset-register writes
/// are disabled in that stage), so the simulation should discard the
/// estimate and remain in COARSE_SYNT indefinitely rather than
/// advancing to FINE_SYNT.
#[test]
fn scenario_c_above_threshold_offset_stalls_in_coarse_synt() {
    init_logging();
    let mut cfg = default_scenario_config();
    cfg.slave_rtc.freq_offset_ppb = 5001.0;
    cfg.perfect_delay_est = true;

    let mut sim = Simulation::new(cfg, StdRng::seed_from_u64(3)).unwrap();
    let mut sink = StageTrackingSink::new();
    sim.run_steps(400_000, &mut sink).unwrap();

    assert_eq!(
        sim.stage(),
        Stage::CoarseSynt,
        "an offset above foffset_thresh_ppb must never clear coarse syntonization"
    );
}

/// Scenario D: `perfect_delay_est = true`, slave ppb=400. With the true
/// delay fed directly to the offset estimator (bypassing filter
/// transient timing jitter), convergence should be no slower than the
/// stochastic-delay case and should still reach CONST_TOFF with a small
/// residual.
#[test]
fn scenario_d_perfect_delay_reaches_low_residual_error() {
    init_logging();
    let mut cfg = default_scenario_config();
    cfg.slave_rtc.freq_offset_ppb = 400.0;
    cfg.perfect_delay_est = true;

    let mut sim = Simulation::new(cfg, StdRng::seed_from_u64(11)).unwrap();
    let mut sink = StageTrackingSink::new();
    sim.run_steps(400_000, &mut sink).unwrap();

    assert_eq!(sim.stage(), Stage::ConstToff);
    let last = sink.history.last().expect("expected at least one SYNC RX");
    assert!(
        last.actual_ns_error.abs() < 5_000,
        "final actual_ns_error {} should be small once settled",
        last.actual_ns_error
    );
}

/// Scenario E: `sample_win_delay` on vs off, otherwise identical
/// configuration. Both runs should converge to the same ballpark slope
/// magnitude in FINE_SYNT/CONST_TOFF; holding the delay estimate fixed
/// across a selection window is a refinement, not a different
/// algorithm.
#[test]
fn scenario_e_sample_win_delay_toggle_produces_similar_convergence() {
    init_logging();
    let mut cfg_held = default_scenario_config();
    cfg_held.slave_rtc.freq_offset_ppb = 400.0;
    cfg_held.sample_win_delay = true;

    let mut cfg_free = default_scenario_config();
    cfg_free.slave_rtc.freq_offset_ppb = 400.0;
    cfg_free.sample_win_delay = false;

    let mut sim_held = Simulation::new(cfg_held, StdRng::seed_from_u64(21)).unwrap();
    let mut sink_held = RecordingSink::new();
    sim_held.run_steps(400_000, &mut sink_held).unwrap();

    let mut sim_free = Simulation::new(cfg_free, StdRng::seed_from_u64(21)).unwrap();
    let mut sink_free = RecordingSink::new();
    sim_free.run_steps(400_000, &mut sink_free).unwrap();

    assert_eq!(sim_held.stage(), Stage::ConstToff);
    assert_eq!(sim_free.stage(), Stage::ConstToff);

    let held_final = sink_held.last().unwrap().actual_ns_error.abs();
    let free_final = sink_free.last().unwrap().actual_ns_error.abs();
    assert!(held_final < 10_000, "held-delay residual {held_final} too large");
    assert!(free_final < 10_000, "free-delay residual {free_final} too large");
}

/// Invariant 6 (spec §8): stage transitions are monotone, 1 -> 2 -> 3 ->
/// 4, never regressing, across an entire run.
#[test]
fn stage_transitions_never_regress_across_a_full_run() {
    init_logging();
    let mut cfg = default_scenario_config();
    cfg.slave_rtc.freq_offset_ppb = 400.0;
    cfg.perfect_delay_est = true;

    let mut sim = Simulation::new(cfg, StdRng::seed_from_u64(5)).unwrap();
    let mut sink = StageTrackingSink::new();
    sim.run_steps(400_000, &mut sink).unwrap();

    let mut last_index = 0usize;
    for status in &sink.history {
        let idx = code_to_stage(status.stage).index();
        assert!(idx >= last_index, "stage regressed from {last_index} to {idx}");
        last_index = idx;
    }
}
