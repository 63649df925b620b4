//! Unsigned fixed-point quantizer for the RTC increment value.
//!
//! Isolated behind its own module so that the increment tuner (`tuner.rs`)
//! can treat "fixed point disabled" as the identity function rather than a
//! conditional scattered through the estimation code (see spec's
//! "fixed-point as a distinct arithmetic mode" design note).

/// `I` integer bits, `F` fractional bits. Total representable range is
/// `[0, 2^(I+F) - 1]` raw counts, i.e. `[0, (2^(I+F) - 1) / 2^F]` in value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedPointFormat {
    pub int_bits: u32,
    pub frac_bits: u32,
}

impl FixedPointFormat {
    pub fn new(int_bits: u32, frac_bits: u32) -> Self {
        FixedPointFormat {
            int_bits,
            frac_bits,
        }
    }

    pub fn total_bits(&self) -> u32 {
        self.int_bits + self.frac_bits
    }

    fn max_raw(&self) -> u64 {
        debug_assert!(self.total_bits() <= 63, "total_bits must fit a u64 raw count");
        (1u64 << self.total_bits()) - 1
    }

    pub fn scale(&self) -> f64 {
        (1u64 << self.frac_bits) as f64
    }

    /// Smallest representable positive increment, `2^-F`.
    pub fn resolution(&self) -> f64 {
        1.0 / self.scale()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuantizeResult {
    /// The raw unsigned fixed-point count, clamped to the representable range.
    pub raw: u64,
    /// `raw` converted back to a floating-point value, `raw / 2^F`.
    pub value: f64,
    /// True if `v` fell outside the representable range and was clamped.
    pub saturated: bool,
}

/// Quantize `v` to unsigned fixed point with round-to-nearest, ties-to-even,
/// clamping to `[0, 2^(I+F) - 1]` on overflow.
pub fn quantize(v: f64, fmt: FixedPointFormat) -> QuantizeResult {
    let scaled = v * fmt.scale();
    let rounded = round_ties_even(scaled);
    let max_raw = fmt.max_raw() as f64;

    let (raw, saturated) = if rounded < 0.0 {
        (0u64, true)
    } else if rounded > max_raw {
        (fmt.max_raw(), true)
    } else {
        (rounded as u64, false)
    };

    QuantizeResult {
        raw,
        value: raw as f64 / fmt.scale(),
        saturated,
    }
}

/// The identity quantizer used when fixed-point is disabled: passes `v`
/// through unchanged and never reports saturation.
pub fn identity(v: f64) -> QuantizeResult {
    QuantizeResult {
        raw: 0,
        value: v,
        saturated: false,
    }
}

fn round_ties_even(x: f64) -> f64 {
    let floor = x.floor();
    let diff = x - floor;
    if diff < 0.5 {
        floor
    } else if diff > 0.5 {
        floor + 1.0
    } else if (floor as i64) % 2 == 0 {
        floor
    } else {
        floor + 1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantize_rounds_to_nearest() {
        let fmt = FixedPointFormat::new(26, 20);
        let r = quantize(8.0 + 3.0 / (1u64 << 20) as f64, fmt);
        assert_eq!(r.raw, (8u64 << 20) + 3);
        assert!(!r.saturated);
    }

    #[test]
    fn quantize_ties_round_to_even() {
        let fmt = FixedPointFormat::new(4, 0);
        assert_eq!(quantize(2.5, fmt).raw, 2);
        assert_eq!(quantize(3.5, fmt).raw, 4);
    }

    #[test]
    fn quantize_saturates_on_overflow() {
        let fmt = FixedPointFormat::new(2, 0); // max raw = 3
        let r = quantize(100.0, fmt);
        assert_eq!(r.raw, 3);
        assert!(r.saturated);
    }

    #[test]
    fn quantize_saturates_below_zero() {
        let fmt = FixedPointFormat::new(4, 4);
        let r = quantize(-1.0, fmt);
        assert_eq!(r.raw, 0);
        assert!(r.saturated);
    }

    #[test]
    fn identity_passes_through_unchanged() {
        let r = identity(8.0000001234);
        assert_eq!(r.value, 8.0000001234);
        assert!(!r.saturated);
    }

    #[test]
    fn resolution_is_half_ulp() {
        let fmt = FixedPointFormat::new(26, 20);
        assert!((fmt.resolution() - 1.0 / 1_048_576.0).abs() < 1e-15);
    }
}
