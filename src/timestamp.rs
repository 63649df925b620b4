//! Timestamp and signed-offset value types shared by the RTC, message
//! engine, and estimators.
//!
//! PTP timestamps carried in frames are always non-negative integral
//! nanosecond counts (`Timestamp`). Errors, offsets, and the time-offset
//! register can go negative, so they use a separate signed type
//! (`Offset`) that keeps `ns` normalized into `[0, 1_000_000_000)` and
//! carries sign into `sec`.

use serde::{Deserialize, Serialize};

pub const NANOS_PER_SEC: i64 = 1_000_000_000;

/// A non-negative PTP timestamp: `sec` seconds plus `ns` nanoseconds,
/// `ns` always in `[0, 1_000_000_000)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp {
    pub sec: u64,
    pub ns: u32,
}

impl Timestamp {
    pub fn new(sec: u64, ns: u32) -> Self {
        debug_assert!(ns < NANOS_PER_SEC as u32, "ns must be normalized");
        Timestamp { sec, ns }
    }

    /// Floor of a fractional syntonized counter reading (`sec_cnt`, `ns_cnt`)
    /// into an integral wire timestamp. Sub-ns fraction is discarded.
    pub fn floor_from_counter(sec_cnt: u64, ns_cnt: f64) -> Self {
        let ns = ns_cnt.floor() as u32;
        Timestamp::new(sec_cnt, ns)
    }

    pub fn to_total_ns(self) -> i128 {
        self.sec as i128 * NANOS_PER_SEC as i128 + self.ns as i128
    }
}

/// A signed offset: `total_ns = sec * 1e9 + ns`, with `ns` normalized into
/// `[0, 1_000_000_000)` and the sign carried entirely by `sec`. This is the
/// representation used by the time-offset register and by per-sample
/// error/offset values, which may be negative or span multiple seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Offset {
    pub sec: i64,
    pub ns: i32,
}

impl Offset {
    pub fn zero() -> Self {
        Offset { sec: 0, ns: 0 }
    }

    /// Build an `Offset` from an unnormalized `(sec, ns)` pair, carrying or
    /// borrowing `ns` into `[0, 1_000_000_000)`.
    pub fn normalize(mut sec: i64, mut ns: i64) -> Self {
        while ns >= NANOS_PER_SEC {
            ns -= NANOS_PER_SEC;
            sec += 1;
        }
        while ns < 0 {
            ns += NANOS_PER_SEC;
            sec -= 1;
        }
        Offset { sec, ns: ns as i32 }
    }

    pub fn from_total_ns(total_ns: i128) -> Self {
        let sec = total_ns.div_euclid(NANOS_PER_SEC as i128);
        let ns = total_ns.rem_euclid(NANOS_PER_SEC as i128);
        Offset {
            sec: sec as i64,
            ns: ns as i32,
        }
    }

    pub fn to_total_ns(self) -> i128 {
        self.sec as i128 * NANOS_PER_SEC as i128 + self.ns as i128
    }

    /// Add a signed nanosecond delta, renormalizing.
    pub fn add_ns(self, delta_ns: i64) -> Self {
        Offset::normalize(self.sec, self.ns as i64 + delta_ns)
    }
}
