//! RTC model: a hardware counter driven by an independent physical
//! oscillator, exposing a syntonized (frequency-aligned) counter and a
//! separate time-offset register.
//!
//! Plays the role the teacher's `clock/linux.rs` / `clock/windows.rs`
//! `SystemClock` impls play for a real OS clock (`adjust_frequency`,
//! `step_clock`), but models the counter itself rather than calling into
//! an OS API: `set_inc_val_ns` is the simulated analogue of
//! `adjust_frequency`, and `add_time_offset_ns`/`set_time_offset` are the
//! analogue of `step_clock`.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::timestamp::{Offset, Timestamp, NANOS_PER_SEC};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RtcConfig {
    pub freq_offset_ppb: f64,
    pub init_time_sec: u64,
    pub init_time_ns: u32,
    pub init_rising_edge_ns: f64,
}

impl Default for RtcConfig {
    fn default() -> Self {
        RtcConfig {
            freq_offset_ppb: 0.0,
            init_time_sec: 0,
            init_time_ns: 0,
            init_rising_edge_ns: 0.0,
        }
    }
}

/// A single RTC: the driving oscillator's rising-edge count (`i_inc`), the
/// syntonized counter it drives (`sec_cnt`/`ns_cnt`), the per-edge
/// increment applied to that counter (`inc_val_ns`), and the separate
/// time-offset register layered on top at readout time.
#[derive(Debug, Clone)]
pub struct Rtc {
    config: RtcConfig,
    clk_freq_hz: f64,
    clk_period_sec: f64,
    i_inc: u64,
    sec_cnt: u64,
    ns_cnt: f64,
    inc_val_ns: f64,
    time_offset: Offset,
}

impl Rtc {
    /// `nominal_rtc_clk_hz` is the nominal oscillator frequency (e.g. 125MHz).
    pub fn new(config: RtcConfig, nominal_rtc_clk_hz: f64) -> Self {
        let clk_freq_hz = nominal_rtc_clk_hz * (1.0 + config.freq_offset_ppb * 1e-9);
        let clk_period_sec = 1.0 / clk_freq_hz;
        let inc_val_ns = 1e9 / nominal_rtc_clk_hz;
        Rtc {
            config,
            clk_freq_hz,
            clk_period_sec,
            i_inc: 0,
            sec_cnt: config.init_time_sec,
            ns_cnt: config.init_time_ns as f64,
            inc_val_ns,
            time_offset: Offset::zero(),
        }
    }

    /// Accrue oscillator edges consumed up through `t_sim_sec`, adding
    /// `new_incs * inc_val_ns` to the syntonized counter. Changing
    /// `inc_val_ns` therefore affects only future increments; `i_inc` (the
    /// physical edge count) is independent of it.
    pub fn accrue(&mut self, t_sim_sec: f64) -> Result<()> {
        let elapsed = t_sim_sec - self.config.init_rising_edge_ns * 1e-9;
        let n_incs = if elapsed <= 0.0 {
            0u64
        } else {
            (elapsed / self.clk_period_sec).floor() as u64
        };
        let new_incs = n_incs.saturating_sub(self.i_inc);
        self.i_inc = self.i_inc.max(n_incs);

        if new_incs > 0 {
            self.ns_cnt += new_incs as f64 * self.inc_val_ns;
            self.normalize_counter()?;
        }
        Ok(())
    }

    fn normalize_counter(&mut self) -> Result<()> {
        if !self.ns_cnt.is_finite() {
            return Err(anyhow!(
                "RTC syntonized counter became non-finite (NaN/Inf): invariant violation"
            ));
        }
        while self.ns_cnt >= NANOS_PER_SEC as f64 {
            self.ns_cnt -= NANOS_PER_SEC as f64;
            self.sec_cnt += 1;
        }
        while self.ns_cnt < 0.0 {
            self.ns_cnt += NANOS_PER_SEC as f64;
            self.sec_cnt = self.sec_cnt.saturating_sub(1);
        }
        Ok(())
    }

    /// Floor of the current syntonized counter: what a timestamp capture
    /// (TX or RX) reads. Sub-ns fraction is discarded.
    pub fn syntonized_now(&self) -> Timestamp {
        Timestamp::floor_from_counter(self.sec_cnt, self.ns_cnt)
    }

    /// Syntonized value plus the time-offset register, unwrapped across
    /// seconds (signed, since the register may be negative).
    pub fn synchronized_total_ns(&self) -> i128 {
        self.syntonized_now().to_total_ns() + self.time_offset.to_total_ns()
    }

    pub fn inc_val_ns(&self) -> f64 {
        self.inc_val_ns
    }

    /// Replace the increment value. Callers must only invoke this during
    /// COARSE_SYNT; the stage controller is responsible for the invariant
    /// that `inc_val_ns` is frozen in FINE_SYNT/CONST_TOFF.
    pub fn set_inc_val_ns(&mut self, v: f64) -> Result<()> {
        if !v.is_finite() || v <= 0.0 {
            return Err(anyhow!(
                "invalid RTC increment value {v}: must be positive and finite"
            ));
        }
        self.inc_val_ns = v;
        Ok(())
    }

    pub fn time_offset(&self) -> Offset {
        self.time_offset
    }

    pub fn set_time_offset(&mut self, offset: Offset) {
        self.time_offset = offset;
    }

    pub fn add_time_offset_ns(&mut self, delta_ns: i64) {
        self.time_offset = self.time_offset.add_ns(delta_ns);
    }

    pub fn i_inc(&self) -> u64 {
        self.i_inc
    }

    pub fn clk_period_sec(&self) -> f64 {
        self.clk_period_sec
    }

    pub fn clk_freq_hz(&self) -> f64 {
        self.clk_freq_hz
    }
}
