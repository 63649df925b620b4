//! PTP message engine guard state.
//!
//! Three independent "on the wire" guards model the fact each frame kind
//! cannot be in flight twice at once: on TX the guard is set, on RX it is
//! cleared. The event queue has no cancellation, so these guards — not
//! queue deletion — are what let a handler safely ignore a stale event
//! for a frame that no longer matters.

use crate::timestamp::Timestamp;

#[derive(Debug, Clone, Default)]
pub struct MessageEngineState {
    pub sync_on_way: bool,
    pub sync_t1: Option<Timestamp>,
    /// The true simulated one-way delay for the in-flight SYNC, in ns.
    /// Only consumed in `perfect_delay_est` debug mode.
    pub sync_true_delay_ns: Option<f64>,

    pub pdelay_req_on_way: bool,
    pub pdelay_resp_on_way: bool,
    pub pdelay_t1: Option<Timestamp>,
    pub pdelay_t2: Option<Timestamp>,
    pub pdelay_t3: Option<Timestamp>,
}

impl MessageEngineState {
    pub fn new() -> Self {
        Self::default()
    }
}

/// `a - b`, treating both as ns-of-second values and adding one ns wrap
/// (10^9) if the raw subtraction goes negative. Used for both Pdelay
/// interval legs (`d_ms`, `d_sm`), which are assumed not to span more
/// than one second.
pub fn wrap_diff_ns(a: u32, b: u32) -> i64 {
    let diff = a as i64 - b as i64;
    if diff < 0 {
        diff + 1_000_000_000
    } else {
        diff
    }
}
