//! Stochastic network delay generator.
//!
//! Produces per-frame one-way delays as a sum of `K` i.i.d. exponential
//! samples (an Erlang-K distribution) with a configured mean, modeling
//! queueing delay across a stochastic network. Grounded on the pack's use
//! of `rand_distr` for network/channel impairment sampling (e.g.
//! `rand_distr::Normal` jitter in simulator modules elsewhere in the
//! retrieval pack); here `rand_distr::Exp` supplies each stage of the sum.

use rand::Rng;
use rand_distr::{Distribution, Exp};

/// Samples one-way network delay, in seconds, as the sum of `erlang_k`
/// independent exponential draws with rate `erlang_k / mean`, so the sum
/// has mean `mean` regardless of `erlang_k`.
#[derive(Debug, Clone)]
pub struct ErlangDelay {
    erlang_k: u32,
    exp: Exp<f64>,
}

impl ErlangDelay {
    /// `mean_sec` is the desired mean one-way delay in seconds. `erlang_k`
    /// must be at least 1 (a single exponential stage).
    pub fn new(mean_sec: f64, erlang_k: u32) -> Self {
        assert!(mean_sec > 0.0, "queueing_mean must be positive");
        let k = erlang_k.max(1);
        let rate = k as f64 / mean_sec;
        ErlangDelay {
            erlang_k: k,
            exp: Exp::new(rate).expect("rate must be finite and positive"),
        }
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        (0..self.erlang_k).map(|_| self.exp.sample(rng)).sum()
    }

    pub fn erlang_k(&self) -> u32 {
        self.erlang_k
    }
}
