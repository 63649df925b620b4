//! Delay and offset estimators that turn raw timestamp captures into the
//! per-SYNC samples the packet selector buffers.

use crate::message::wrap_diff_ns;
use crate::smoother::MovingAverage;
use crate::timestamp::Timestamp;

/// Result of folding one Pdelay_resp RX into the delay filter.
#[derive(Debug, Clone, Copy)]
pub struct DelayEstimate {
    /// Floor of the unfiltered per-exchange delay, in ns.
    pub raw_ns: i64,
    /// Floor of the filtered estimate once post-transient, else `raw_ns`.
    pub reported_ns: i64,
    pub post_transient: bool,
    /// True only on the call that flips `post_transient` from false to true.
    pub became_post_transient_this_call: bool,
}

/// Filters the one-way delay derived from a four-timestamp Pdelay
/// exchange through a length-N moving average.
#[derive(Debug, Clone)]
pub struct DelayEstimator {
    filter: MovingAverage,
    was_post_transient: bool,
}

impl DelayEstimator {
    pub fn new(filt_len: usize) -> Self {
        DelayEstimator {
            filter: MovingAverage::new(filt_len),
            was_post_transient: false,
        }
    }

    /// `t1`: slave TX, `t2`: master RX, `t3`: master TX, `t4`: slave RX.
    pub fn on_pdelay_resp_rx(
        &mut self,
        t1: Timestamp,
        t2: Timestamp,
        t3: Timestamp,
        t4: Timestamp,
    ) -> DelayEstimate {
        let d_ms = wrap_diff_ns(t4.ns, t1.ns);
        let d_sm = wrap_diff_ns(t3.ns, t2.ns);
        let raw = (d_ms - d_sm) as f64 / 2.0;

        let (avg, post_transient) = self.filter.push(raw);
        let became_post_transient_this_call = post_transient && !self.was_post_transient;
        self.was_post_transient = post_transient;

        let reported_ns = if post_transient {
            avg.floor() as i64
        } else {
            raw.floor() as i64
        };

        DelayEstimate {
            raw_ns: raw.floor() as i64,
            reported_ns,
            post_transient,
            became_post_transient_this_call,
        }
    }
}

/// One offset sample produced from a SYNC RX, before packet selection.
/// `ns` may carry sub-nanosecond fraction inherited from the delay
/// estimate; it is not yet normalized into `[0, 1e9)` relative to `sec`
/// the way wire timestamps are — the packet selector folds `sec` and `ns`
/// into a single axis anyway.
#[derive(Debug, Clone, Copy)]
pub struct OffsetSample {
    pub ns: f64,
    pub sec: i64,
    /// Master-side instant of this SYNC, unwrapped: `sec * 1e9 + ns`. Used
    /// by the packet selector to build its relative time axis.
    pub master_total_ns: f64,
    /// `master_ns − Rtc_error.ns`, recomputed by the selector at the
    /// moment a window is reduced so the increment tuner's slave-side
    /// interval stays consistent with the *selected* offset rather than
    /// the last raw sample (spec §4.8 step 2).
    pub slave_ns_sync_rx: f64,
}

/// Compute the raw RTC error for one SYNC RX. `delay_ns` is whichever
/// delay value the caller has chosen to use (true delay in debug mode,
/// filtered estimate, or a value held across a selection window).
pub fn compute_offset_sample(t1: Timestamp, delay_ns: f64, t2: Timestamp) -> OffsetSample {
    let mut master_ns = t1.ns as f64 + delay_ns;
    let mut master_sec = t1.sec as i64;
    if master_ns >= 1_000_000_000.0 {
        master_ns -= 1_000_000_000.0;
        master_sec += 1;
    }

    let mut err_ns = master_ns - t2.ns as f64;
    let mut err_sec = master_sec - t2.sec as i64;
    while err_ns >= 1_000_000_000.0 {
        err_ns -= 1_000_000_000.0;
        err_sec += 1;
    }
    while err_ns < 0.0 {
        err_ns += 1_000_000_000.0;
        err_sec -= 1;
    }

    let master_total_ns = master_sec as f64 * 1_000_000_000.0 + master_ns;
    let slave_ns_sync_rx = master_ns - err_ns;

    OffsetSample {
        ns: err_ns,
        sec: err_sec,
        master_total_ns,
        slave_ns_sync_rx,
    }
}
