use serde::{Deserialize, Serialize};

use crate::stage::Stage;

/// Per-SYNC-RX output snapshot, emitted once the handler completes
/// (spec §6 Outputs).
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct SyncStatus {
    /// Simulated time at which this SYNC RX was processed, seconds.
    pub t_sim: f64,
    /// Master minus slave **synchronized** counters (syntonized + offset
    /// register), unwrapped across seconds, sampled at SYNC-RX time.
    pub actual_ns_error: i64,
    /// Most recent increment tuner `norm_freq_offset`, relative to the
    /// slave's nominal (ppb=0) increment value.
    pub norm_freq_offset_to_nominal: f64,
    pub raw_delay_est: i64,
    pub filtered_delay_est: i64,
    pub stage: StageCode,
}

/// Wire-friendly mirror of `Stage`: serde derives cleanly on a field-less
/// enum and this keeps `stage.rs`'s internal type free of a serde
/// dependency it otherwise wouldn't need.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum StageCode {
    DelayEst,
    CoarseSynt,
    FineSynt,
    ConstToff,
}

impl From<Stage> for StageCode {
    fn from(stage: Stage) -> Self {
        match stage {
            Stage::DelayEst => StageCode::DelayEst,
            Stage::CoarseSynt => StageCode::CoarseSynt,
            Stage::FineSynt => StageCode::FineSynt,
            Stage::ConstToff => StageCode::ConstToff,
        }
    }
}

impl Default for SyncStatus {
    fn default() -> Self {
        SyncStatus {
            t_sim: 0.0,
            actual_ns_error: 0,
            norm_freq_offset_to_nominal: 0.0,
            raw_delay_est: 0,
            filtered_delay_est: 0,
            stage: StageCode::DelayEst,
        }
    }
}
