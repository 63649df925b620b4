//! Packet selector: buffers a window of per-SYNC offset samples and
//! reduces them to a single `(total_ns, b)` estimate via sample-mean or
//! ordinary least squares.
//!
//! Internally a sample's `(sec, ns)` pair is folded into one `total_ns =
//! sec * 1e9 + ns` axis rather than kept split, since every computation
//! here (mean, first differences, regression) is linear and the split
//! representation only exists on the wire to keep individual timestamps
//! integral. Window spans stay small enough in practice (seconds, not
//! years) that `f64` carries the combined value exactly.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Mean,
    LeastSquares,
}

impl Strategy {
    /// Spec wire encoding: 0 = MEAN, 1 = LS.
    pub fn from_code(code: u8) -> Self {
        if code == 0 {
            Strategy::Mean
        } else {
            Strategy::LeastSquares
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct WindowEntry {
    total_ns: f64,
    t: f64,
}

/// Scalar result of reducing a full window: an offset estimate
/// (`total_ns`), a drift rate (`b`, dimensionless ns-per-ns, i.e. `dy/dt`
/// over the window's real-elapsed-ns axis), and the master-side instant
/// of the window's last sample — the "selected SYNC instant" the
/// increment tuner measures intervals between.
///
/// `b` is reported as `dy/dt` rather than "ns per SYNC period" so both
/// strategies share one unit: the increment tuner (or the stage
/// controller capturing `toffset_slope`) multiplies by the SYNC period
/// in ns to get a per-SYNC slope. MEAN achieves this by dividing each
/// first difference by its own time step rather than treating the step
/// as implicitly uniform.
#[derive(Debug, Clone, Copy)]
pub struct SelectionResult {
    pub total_ns: f64,
    pub b: f64,
    pub last_master_total_ns: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct SelectionConfig {
    pub window_len: usize,
    pub strategy: Strategy,
}

/// One stage's selection window. Reconfigured (cleared) every time the
/// stage controller installs a new `(W, S)` on a stage transition.
#[derive(Debug, Clone)]
pub struct SelectionWindow {
    config: SelectionConfig,
    entries: Vec<WindowEntry>,
    t_start: Option<f64>,
}

impl SelectionWindow {
    pub fn new(config: SelectionConfig) -> Self {
        let window_len = config.window_len.max(1);
        SelectionWindow {
            config: SelectionConfig {
                window_len,
                ..config
            },
            entries: Vec::with_capacity(window_len),
            t_start: None,
        }
    }

    /// Clear the buffer and install a new window length/strategy (spec:
    /// "on entering any stage, the selection window buffer is cleared,
    /// the in-window index reset to 0, and the stage's (W, S) installed").
    pub fn reconfigure(&mut self, config: SelectionConfig) {
        self.config = SelectionConfig {
            window_len: config.window_len.max(1),
            ..config
        };
        self.entries.clear();
        self.t_start = None;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Push one sample. `total_ns` is the offset sample's unwrapped
    /// `sec*1e9+ns`; `master_total_ns` is the master-side instant used to
    /// build the relative time axis. `toffset_slope_subtract`, when
    /// `Some`, is CONST_TOFF's pre-subtraction of the slope's expected
    /// contribution (`toffset_slope * i`, `i` the 1-based sample index).
    ///
    /// Returns `Some(result)` exactly when this push fills the window.
    pub fn push(
        &mut self,
        total_ns: f64,
        master_total_ns: f64,
        toffset_slope_subtract: Option<f64>,
    ) -> Option<SelectionResult> {
        let t_start = *self.t_start.get_or_insert(master_total_ns);
        let t = master_total_ns - t_start;

        let i = self.entries.len() + 1;
        let adjusted = match toffset_slope_subtract {
            Some(slope) => total_ns - slope * i as f64,
            None => total_ns,
        };

        self.entries.push(WindowEntry {
            total_ns: adjusted,
            t,
        });

        if self.entries.len() >= self.config.window_len {
            let last_master_total_ns = master_total_ns;
            let mut result = self.reduce();
            result.last_master_total_ns = last_master_total_ns;
            self.entries.clear();
            self.t_start = None;
            Some(result)
        } else {
            None
        }
    }

    fn reduce(&self) -> SelectionResult {
        match self.config.strategy {
            Strategy::Mean => self.reduce_mean(),
            Strategy::LeastSquares => self.reduce_ls(),
        }
    }

    /// Mean of `total_ns`; `b` is the mean of per-step `dy/dt` between
    /// consecutive samples — the documented convention chosen for the
    /// spec's otherwise-unspecified MEAN slope, picked so it shares units
    /// with the LS fit's slope rather than needing a separate scale.
    fn reduce_mean(&self) -> SelectionResult {
        let n = self.entries.len();
        let sum: f64 = self.entries.iter().map(|e| e.total_ns).sum();
        let mean = sum / n as f64;

        let b = if n >= 2 {
            let slopes: Vec<f64> = self
                .entries
                .windows(2)
                .filter_map(|w| {
                    let dt = w[1].t - w[0].t;
                    if dt.abs() > f64::EPSILON {
                        Some((w[1].total_ns - w[0].total_ns) / dt)
                    } else {
                        None
                    }
                })
                .collect();
            if slopes.is_empty() {
                0.0
            } else {
                slopes.iter().sum::<f64>() / slopes.len() as f64
            }
        } else {
            0.0
        };

        SelectionResult {
            total_ns: mean,
            b,
            last_master_total_ns: 0.0,
        }
    }

    /// Ordinary least squares fit of `total_ns = B*t + A` over the window.
    fn reduce_ls(&self) -> SelectionResult {
        let n = self.entries.len() as f64;
        if self.entries.len() < 2 {
            let a = self.entries.first().map(|e| e.total_ns).unwrap_or(0.0);
            return SelectionResult {
                total_ns: a,
                b: 0.0,
                last_master_total_ns: 0.0,
            };
        }

        let sum_t: f64 = self.entries.iter().map(|e| e.t).sum();
        let sum_y: f64 = self.entries.iter().map(|e| e.total_ns).sum();
        let sum_tt: f64 = self.entries.iter().map(|e| e.t * e.t).sum();
        let sum_ty: f64 = self.entries.iter().map(|e| e.t * e.total_ns).sum();

        let denom = n * sum_tt - sum_t * sum_t;
        if denom.abs() < f64::EPSILON {
            return SelectionResult {
                total_ns: sum_y / n,
                b: 0.0,
                last_master_total_ns: 0.0,
            };
        }

        let b = (n * sum_ty - sum_t * sum_y) / denom;
        let a = (sum_y - b * sum_t) / n;
        SelectionResult {
            total_ns: a,
            b,
            last_master_total_ns: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(len: usize, strategy: Strategy) -> SelectionWindow {
        SelectionWindow::new(SelectionConfig {
            window_len: len,
            strategy,
        })
    }

    #[test]
    fn returns_none_until_window_fills() {
        let mut w = window(3, Strategy::Mean);
        assert!(w.push(1.0, 0.0, None).is_none());
        assert!(w.push(2.0, 1.0, None).is_none());
        assert!(w.push(3.0, 2.0, None).is_some());
    }

    #[test]
    fn mean_of_constant_window_is_exact() {
        let mut w = window(4, Strategy::Mean);
        let mut result = None;
        for i in 0..4 {
            result = w.push(42.0, i as f64, None);
        }
        let r = result.unwrap();
        assert!((r.total_ns - 42.0).abs() < 1e-9);
        assert!((r.b - 0.0).abs() < 1e-9);
    }

    #[test]
    fn ls_recovers_perfect_line() {
        let mut w = window(5, Strategy::LeastSquares);
        let a_true = 1000.0;
        let b_true = 7.5;
        let mut result = None;
        for i in 0..5 {
            let t = i as f64 * 10.0;
            let y = a_true + b_true * t;
            result = w.push(y, t, None);
        }
        let r = result.unwrap();
        assert!((r.total_ns - a_true).abs() < 1e-6);
        assert!((r.b - b_true).abs() < 1e-6);
    }

    #[test]
    fn window_resets_after_each_reduction() {
        let mut w = window(2, Strategy::Mean);
        w.push(10.0, 0.0, None);
        let r1 = w.push(20.0, 1.0, None).unwrap();
        assert!((r1.total_ns - 15.0).abs() < 1e-9);
        assert_eq!(w.len(), 0);
        w.push(100.0, 2.0, None);
        let r2 = w.push(200.0, 3.0, None).unwrap();
        assert!((r2.total_ns - 150.0).abs() < 1e-9);
    }

    #[test]
    fn slope_subtraction_uses_one_based_index() {
        let mut w = window(2, Strategy::Mean);
        // both raw samples equal; slope subtraction of 10 should separate them
        w.push(100.0, 0.0, Some(10.0)); // i=1 -> 100 - 10 = 90
        let r = w.push(100.0, 1.0, Some(10.0)).unwrap(); // i=2 -> 100 - 20 = 80
        assert!((r.total_ns - 85.0).abs() < 1e-9);
    }

    #[test]
    fn reconfigure_clears_buffer_and_resets_time_axis() {
        let mut w = window(3, Strategy::Mean);
        w.push(1.0, 0.0, None);
        w.reconfigure(SelectionConfig {
            window_len: 2,
            strategy: Strategy::LeastSquares,
        });
        assert_eq!(w.len(), 0);
        assert!(w.push(5.0, 100.0, None).is_none());
        assert!(w.push(6.0, 101.0, None).is_some());
    }

    #[test]
    fn window_length_one_strobes_on_every_push() {
        // The mechanism behind "packet selection disabled" (spec §4.6):
        // forcing window_len to 1 turns every push into an immediate
        // strobe, carrying the pushed sample straight through.
        let mut w = window(1, Strategy::Mean);
        let r1 = w.push(10.0, 0.0, None).unwrap();
        assert!((r1.total_ns - 10.0).abs() < 1e-9);
        let r2 = w.push(20.0, 1.0, None).unwrap();
        assert!((r2.total_ns - 20.0).abs() < 1e-9);
    }

    #[test]
    fn strategy_from_code_maps_zero_to_mean_and_one_to_ls() {
        assert_eq!(Strategy::from_code(0), Strategy::Mean);
        assert_eq!(Strategy::from_code(1), Strategy::LeastSquares);
    }
}
