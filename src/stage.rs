//! Sync-stage controller: the four-state machine deciding which
//! selector window/strategy is active and what each selector strobe
//! means.
//!
//! Per-stage configuration is an array indexed by the stage enum rather
//! than four differently-named struct fields, so installing a new
//! window/strategy on a transition is a single array lookup instead of a
//! per-stage match arm.

use crate::selector::SelectionConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    DelayEst,
    CoarseSynt,
    FineSynt,
    ConstToff,
}

impl Stage {
    pub fn index(self) -> usize {
        match self {
            Stage::DelayEst => 0,
            Stage::CoarseSynt => 1,
            Stage::FineSynt => 2,
            Stage::ConstToff => 3,
        }
    }

    /// The only legal next stage, or `None` at the terminal stage.
    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::DelayEst => Some(Stage::CoarseSynt),
            Stage::CoarseSynt => Some(Stage::FineSynt),
            Stage::FineSynt => Some(Stage::ConstToff),
            Stage::ConstToff => None,
        }
    }
}

/// Owns the current stage and the four per-stage selector configs.
/// Transitions are latched via `request_transition` and only applied by
/// `commit_pending`, which callers invoke once, at the end of the
/// SYNC-RX handler — regardless of which handler (Pdelay_resp RX or this
/// same SYNC RX) requested the transition, so a handler in flight always
/// sees the pre-transition stage throughout its own execution.
#[derive(Debug, Clone)]
pub struct StageController {
    stage: Stage,
    configs: [SelectionConfig; 4],
    pending_transition: Option<Stage>,
    /// `B * sync_period`, captured at the end of FINE_SYNT; read by the
    /// slope corrector and by CONST_TOFF's pre-subtraction step.
    toffset_slope: f64,
}

impl StageController {
    pub fn new(configs: [SelectionConfig; 4]) -> Self {
        StageController {
            stage: Stage::DelayEst,
            configs,
            pending_transition: None,
            toffset_slope: 0.0,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn selector_config(&self, stage: Stage) -> SelectionConfig {
        self.configs[stage.index()]
    }

    pub fn toffset_slope(&self) -> f64 {
        self.toffset_slope
    }

    pub fn set_toffset_slope(&mut self, slope: f64) {
        self.toffset_slope = slope;
    }

    /// Latch a transition to `to`. Panics if `to` is not the stage
    /// immediately following the current one — stage transitions are
    /// monotone (spec invariant 6), never skipped or regressed.
    pub fn request_transition(&mut self, to: Stage) {
        debug_assert_eq!(
            Some(to),
            self.stage.next(),
            "stage transitions must be monotone: {:?} -> {:?} is illegal",
            self.stage,
            to
        );
        self.pending_transition = Some(to);
    }

    /// Apply a previously-requested transition, if any. Returns the new
    /// stage when a transition was committed.
    pub fn commit_pending(&mut self) -> Option<Stage> {
        if let Some(to) = self.pending_transition.take() {
            self.stage = to;
            Some(to)
        } else {
            None
        }
    }

    pub fn has_pending_transition(&self) -> bool {
        self.pending_transition.is_some()
    }
}
