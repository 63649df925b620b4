//! Increment-value tuner: converts a measured normalized frequency
//! offset between two selected SYNC instants into a new (possibly
//! quantized, filtered) RTC increment value.

use anyhow::{anyhow, Result};
use log::warn;

use crate::fixed_point::{identity, quantize, FixedPointFormat};
use crate::smoother::MovingAverage;

#[derive(Debug, Clone, Copy)]
pub struct TunerConfig {
    pub foffset_thresh_ppb: f64,
    pub en_fp_inc_val: bool,
    pub fixed_point_fmt: FixedPointFormat,
}

#[derive(Debug, Clone, Copy)]
pub struct TunerOutcome {
    pub norm_freq_offset: f64,
    /// The increment value to commit to the RTC: the filtered value once
    /// post-transient, else the raw (possibly quantized) new value.
    pub committed_inc_val_ns: f64,
    pub discarded: bool,
    pub saturated: bool,
    /// Half-resolution threshold used by COARSE_SYNT -> FINE_SYNT. When
    /// fixed point is enabled this is the hardware quantization step;
    /// when disabled there is no representational floor, so it falls
    /// back to `foffset_thresh_ppb` (see DESIGN.md).
    pub res_ppb: f64,
}

/// Holds the tuner's own moving-average filter across calls; everything
/// else (master/slave interval, current increment, thresholds) is passed
/// in per call since it comes from the selector and RTC each time.
#[derive(Debug, Clone)]
pub struct Tuner {
    filter: MovingAverage,
}

impl Tuner {
    pub fn new(filt_len: usize) -> Self {
        Tuner {
            filter: MovingAverage::new(filt_len),
        }
    }

    /// `master_interval_ns` / `slave_interval_ns`: unwrapped ns intervals
    /// between the two selected SYNC instants on each side, already
    /// wrap-corrected by the caller. `inc_val_ns_current`: the RTC's
    /// increment value at the moment of this call. `nominal_period_ns`:
    /// `1e9 / nominal_rtc_clk`, used only for the fixed-point resolution
    /// report.
    pub fn update(
        &mut self,
        master_interval_ns: f64,
        slave_interval_ns: f64,
        inc_val_ns_current: f64,
        nominal_period_ns: f64,
        cfg: &TunerConfig,
    ) -> Result<TunerOutcome> {
        let slave_error_ns = slave_interval_ns - master_interval_ns;
        let mut norm_freq_offset = slave_error_ns / master_interval_ns;

        let discarded = (norm_freq_offset * 1e9).abs() > cfg.foffset_thresh_ppb;
        if discarded {
            warn!(
                "increment tuner: discarding norm_freq_offset {} ppb, exceeds threshold {}",
                norm_freq_offset * 1e9,
                cfg.foffset_thresh_ppb
            );
            norm_freq_offset = 0.0;
        }

        let f_new = (1.0 + norm_freq_offset) * (1e9 / inc_val_ns_current);
        let mut inc_new_ns = 1e9 / f_new;

        let mut saturated = false;
        let mut res_ppb;
        if cfg.en_fp_inc_val {
            let q = quantize(inc_new_ns, cfg.fixed_point_fmt);
            inc_new_ns = q.value;
            saturated = q.saturated;

            let nominal_freq = 1e9 / nominal_period_ns;
            let frac_bits = cfg.fixed_point_fmt.frac_bits as i32;
            let closer_freq = 1e9 / (nominal_period_ns + 2f64.powi(-frac_bits));
            res_ppb = ((nominal_freq - closer_freq) / nominal_freq) * 1e9;
        } else {
            inc_new_ns = identity(inc_new_ns).value;
            // No hardware quantizer means no representational resolution
            // floor; fall back to half the discard threshold so the
            // COARSE_SYNT -> FINE_SYNT handoff stays reachable instead of
            // requiring norm_freq_offset < 0.0.
            res_ppb = cfg.foffset_thresh_ppb;
        }

        if !inc_new_ns.is_finite() || inc_new_ns <= 0.0 {
            return Err(anyhow!(
                "increment tuner produced a non-positive increment value {inc_new_ns}: invariant violation"
            ));
        }

        let (filtered, post_transient) = self.filter.push(inc_new_ns);
        let committed_inc_val_ns = if post_transient { filtered } else { inc_new_ns };

        Ok(TunerOutcome {
            norm_freq_offset,
            committed_inc_val_ns,
            discarded,
            saturated,
            res_ppb,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg_no_fp() -> TunerConfig {
        TunerConfig {
            foffset_thresh_ppb: 1000.0,
            en_fp_inc_val: false,
            fixed_point_fmt: FixedPointFormat::new(26, 20),
        }
    }

    #[test]
    fn zero_error_leaves_increment_unchanged() {
        let mut tuner = Tuner::new(1);
        let outcome = tuner
            .update(1_000_000.0, 1_000_000.0, 8.0, 8.0, &cfg_no_fp())
            .unwrap();
        assert!((outcome.norm_freq_offset).abs() < 1e-12);
        assert!((outcome.committed_inc_val_ns - 8.0).abs() < 1e-9);
        assert!(!outcome.discarded);
    }

    #[test]
    fn positive_slave_error_increases_increment() {
        let mut tuner = Tuner::new(1);
        // slave ran 1000ns long over a 1e9 ns interval: +1ppb offset
        let outcome = tuner
            .update(1_000_000_000.0, 1_000_001_000.0, 8.0, 8.0, &cfg_no_fp())
            .unwrap();
        assert!(outcome.norm_freq_offset > 0.0);
        assert!(outcome.committed_inc_val_ns > 8.0);
    }

    #[test]
    fn offset_beyond_threshold_is_discarded_and_warned() {
        let mut tuner = Tuner::new(1);
        let cfg = TunerConfig {
            foffset_thresh_ppb: 1.0,
            ..cfg_no_fp()
        };
        let outcome = tuner
            .update(1_000_000_000.0, 1_000_010_000.0, 8.0, 8.0, &cfg)
            .unwrap();
        assert!(outcome.discarded);
        assert!((outcome.norm_freq_offset).abs() < 1e-12);
        assert!((outcome.committed_inc_val_ns - 8.0).abs() < 1e-9);
    }

    #[test]
    fn fixed_point_quantizes_and_reports_resolution() {
        let mut tuner = Tuner::new(1);
        let cfg = TunerConfig {
            foffset_thresh_ppb: 1000.0,
            en_fp_inc_val: true,
            fixed_point_fmt: FixedPointFormat::new(26, 20),
        };
        let outcome = tuner.update(1_000_000_000.0, 1_000_001_000.0, 8.0, 8.0, &cfg).unwrap();
        assert!(outcome.res_ppb > 0.0);
        assert!(!outcome.saturated);
    }

    #[test]
    fn disabled_fixed_point_falls_back_res_ppb_to_discard_threshold() {
        let mut tuner = Tuner::new(1);
        let cfg = cfg_no_fp();
        let outcome = tuner
            .update(1_000_000_000.0, 1_000_001_000.0, 8.0, 8.0, &cfg)
            .unwrap();
        assert_eq!(outcome.res_ppb, cfg.foffset_thresh_ppb);
        assert!(!outcome.saturated);
    }

    #[test]
    fn filter_reports_raw_value_before_transient_then_smoothed() {
        let mut tuner = Tuner::new(2);
        let o1 = tuner.update(1e9, 1e9 + 1000.0, 8.0, 8.0, &cfg_no_fp()).unwrap();
        let o2 = tuner.update(1e9, 1e9 + 1000.0, 8.0, 8.0, &cfg_no_fp()).unwrap();
        assert!(o1.committed_inc_val_ns > 8.0);
        assert!(o2.committed_inc_val_ns > 8.0);
    }
}
