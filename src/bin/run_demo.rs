//! Minimal demo binary: runs the simulator with default configuration
//! (the scenario-A/D parameters from spec §8) and prints convergence
//! progress to stdout. Not part of the simulator core; a thin consumer
//! of the public `Simulation`/`OutputSink` API, the same role the
//! teacher's tray binary plays relative to `PtpController`.

use anyhow::Result;
use ptpconverge::config::SystemConfig;
use ptpconverge::driver::Simulation;
use ptpconverge::stage::Stage;
use ptpconverge::status::SyncStatus;
use ptpconverge::traits::OutputSink;
use rand::rngs::StdRng;
use rand::SeedableRng;

struct PrintOnStageChange {
    last_stage: Option<Stage>,
    count: u64,
}

impl OutputSink for PrintOnStageChange {
    fn on_sync_rx(&mut self, status: SyncStatus) {
        self.count += 1;
        let stage: Stage = match status.stage {
            ptpconverge::status::StageCode::DelayEst => Stage::DelayEst,
            ptpconverge::status::StageCode::CoarseSynt => Stage::CoarseSynt,
            ptpconverge::status::StageCode::FineSynt => Stage::FineSynt,
            ptpconverge::status::StageCode::ConstToff => Stage::ConstToff,
        };
        if self.last_stage != Some(stage) {
            println!(
                "t_sim={:.6}s sync_rx#{} -> stage {:?} (actual_ns_error={})",
                status.t_sim, self.count, stage, status.actual_ns_error
            );
            self.last_stage = Some(stage);
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let mut cfg = SystemConfig::default();
    cfg.slave_rtc.freq_offset_ppb = 400.0;

    let mut sim = Simulation::new(cfg, StdRng::seed_from_u64(1))?;
    let mut sink = PrintOnStageChange {
        last_stage: None,
        count: 0,
    };

    sim.run_steps(2_000_000, &mut sink)?;

    println!(
        "finished: t_sim={:.6}s stage={:?} empty_queue_fallbacks={}",
        sim.t_sim(),
        sim.stage(),
        sim.empty_queue_fallback_count()
    );
    Ok(())
}
