use serde::{Deserialize, Serialize};

use crate::fixed_point::FixedPointFormat;
use crate::rtc::RtcConfig;
use crate::selector::Strategy;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    /// Fallback time step (seconds) used when the event queue is empty.
    pub t_step_sim: f64,
    /// Nominal oscillator frequency shared by both RTCs' increment math, Hz.
    pub nominal_rtc_clk: f64,
    pub master_rtc: RtcConfig,
    pub slave_rtc: RtcConfig,
    /// SYNC and Pdelay_req frame rates, in frames per second.
    pub sync_rate: f64,
    pub pdelay_req_rate: f64,
    /// Selections (or SYNC RXs, if packet selection is disabled) per
    /// increment-tuner update.
    pub rtc_inc_est_period: u32,
    /// Use the true simulated network delay for offset correction instead
    /// of the filtered estimate. Debug/validation aid only.
    pub perfect_delay_est: bool,
    pub foffset_thresh_ppb: f64,
    pub fixed_point: FixedPointConfig,
    pub filters: FilterConfig,
    pub packet_selection: bool,
    /// Per-stage selection window length and strategy, indexed by
    /// `Stage::index()` rather than four separately-named fields.
    pub stage_windows: [StageWindowConfig; 4],
    /// Hold the delay estimate fixed across a selection window, captured
    /// at the first sample of each window, instead of re-reading the
    /// filtered estimate on every SYNC RX.
    pub sample_win_delay: bool,
    pub network: NetworkConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FixedPointConfig {
    pub en_fp_inc_val: bool,
    pub n_inc_val_int_bits: u32,
    pub n_inc_val_frc_bits: u32,
}

impl FixedPointConfig {
    pub fn format(&self) -> FixedPointFormat {
        FixedPointFormat::new(self.n_inc_val_int_bits, self.n_inc_val_frc_bits)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FilterConfig {
    pub filter_rtc_inc: bool,
    pub rtc_inc_filt_len: usize,
    pub filter_delay_est: bool,
    pub delay_est_filt_len: usize,
}

impl FilterConfig {
    /// A disabled filter or a configured length of 0 both mean "length 1",
    /// i.e. a pass-through.
    pub fn rtc_inc_filter_len(&self) -> usize {
        if self.filter_rtc_inc {
            self.rtc_inc_filt_len.max(1)
        } else {
            1
        }
    }

    pub fn delay_est_filter_len(&self) -> usize {
        if self.filter_delay_est {
            self.delay_est_filt_len.max(1)
        } else {
            1
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StageWindowConfig {
    pub window_len: usize,
    /// 0 = MEAN, 1 = LS.
    pub strategy_code: u8,
}

impl StageWindowConfig {
    pub fn strategy(&self) -> Strategy {
        Strategy::from_code(self.strategy_code)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub queueing_mean_sec: f64,
    pub erlang_k: u32,
}

impl SystemConfig {
    /// Reject configuration errors that the error-handling design treats
    /// as fatal-at-startup: zero window lengths, non-positive rates.
    pub fn validate(&self) -> Result<(), String> {
        if self.sync_rate <= 0.0 {
            return Err("sync_rate must be positive".into());
        }
        if self.pdelay_req_rate <= 0.0 {
            return Err("pdelay_req_rate must be positive".into());
        }
        if self.nominal_rtc_clk <= 0.0 {
            return Err("nominal_rtc_clk must be positive".into());
        }
        if self.network.queueing_mean_sec <= 0.0 {
            return Err("network.queueing_mean_sec must be positive".into());
        }
        for (i, sw) in self.stage_windows.iter().enumerate() {
            if sw.window_len == 0 {
                return Err(format!("stage_windows[{i}].window_len must be nonzero"));
            }
        }
        if self.rtc_inc_est_period == 0 {
            return Err("rtc_inc_est_period must be nonzero".into());
        }
        Ok(())
    }
}

impl Default for SystemConfig {
    /// Defaults match the end-to-end scenarios this simulator was built
    /// to reproduce: 128 Hz SYNC, 8 Hz Pdelay, stage windows
    /// 64/512/16384/1024, all least-squares, Erlang-2 network delay with
    /// a 5us mean.
    fn default() -> Self {
        SystemConfig {
            t_step_sim: 1e-9,
            nominal_rtc_clk: 125e6,
            master_rtc: RtcConfig::default(),
            slave_rtc: RtcConfig::default(),
            sync_rate: 128.0,
            pdelay_req_rate: 8.0,
            rtc_inc_est_period: 1,
            perfect_delay_est: false,
            foffset_thresh_ppb: 5000.0,
            fixed_point: FixedPointConfig {
                en_fp_inc_val: true,
                n_inc_val_int_bits: 26,
                n_inc_val_frc_bits: 20,
            },
            filters: FilterConfig {
                filter_rtc_inc: true,
                rtc_inc_filt_len: 8,
                filter_delay_est: true,
                delay_est_filt_len: 64,
            },
            packet_selection: true,
            stage_windows: [
                StageWindowConfig {
                    window_len: 64,
                    strategy_code: 1,
                },
                StageWindowConfig {
                    window_len: 512,
                    strategy_code: 1,
                },
                StageWindowConfig {
                    window_len: 16384,
                    strategy_code: 1,
                },
                StageWindowConfig {
                    window_len: 1024,
                    strategy_code: 1,
                },
            ],
            sample_win_delay: false,
            network: NetworkConfig {
                queueing_mean_sec: 5e-6,
                erlang_k: 2,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(SystemConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_window_length_is_rejected() {
        let mut cfg = SystemConfig::default();
        cfg.stage_windows[0].window_len = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn nonpositive_sync_rate_is_rejected() {
        let mut cfg = SystemConfig::default();
        cfg.sync_rate = 0.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn disabled_filter_forces_length_one() {
        let cfg = FilterConfig {
            filter_rtc_inc: false,
            rtc_inc_filt_len: 99,
            filter_delay_est: false,
            delay_est_filt_len: 99,
        };
        assert_eq!(cfg.rtc_inc_filter_len(), 1);
        assert_eq!(cfg.delay_est_filter_len(), 1);
    }

    #[test]
    fn config_serde_roundtrip() {
        let cfg = SystemConfig::default();
        let json = serde_json::to_string(&cfg).expect("serialize failed");
        let restored: SystemConfig = serde_json::from_str(&json).expect("deserialize failed");
        assert_eq!(restored.sync_rate, cfg.sync_rate);
        assert_eq!(restored.stage_windows[2].window_len, 16384);
    }
}
