//! Simulation driver: the top-level event loop. Owns both RTCs, the
//! event queue, the message-engine guard state, and every filter/
//! accumulator the stage controller touches — the redesign note's
//! "bundle all simulation state into a single owning struct passed
//! through handler calls" applied directly.

use anyhow::{anyhow, Result};
use log::{info, warn};
use rand::Rng;

use crate::config::SystemConfig;
use crate::delay::ErlangDelay;
use crate::estimator::{compute_offset_sample, DelayEstimator};
use crate::event_queue::{EventKind, EventQueue};
use crate::message::MessageEngineState;
use crate::rtc::Rtc;
use crate::selector::{SelectionConfig, SelectionResult, SelectionWindow};
use crate::slope::SlopeCorrector;
use crate::stage::{Stage, StageController};
use crate::status::{StageCode, SyncStatus};
use crate::timestamp::Offset;
use crate::traits::OutputSink;
use crate::tuner::{Tuner, TunerConfig};

/// Tolerance, in simulated seconds, for treating a scheduled event as
/// "due now". Every event's time is derived from additions to a `t_sim`
/// value the driver itself produced, so in principle exact float
/// equality would hold; the tolerance only guards against the rounding
/// that many thousands of SYNC periods can accumulate.
const DUE_EPS_SEC: f64 = 1e-9;

pub struct Simulation<R: Rng> {
    config: SystemConfig,
    t_sim: f64,
    queue: EventQueue,

    master: Rtc,
    slave: Rtc,
    delay_gen: ErlangDelay,
    rng: R,

    msg: MessageEngineState,
    sync_period_sec: f64,
    pdelay_period_sec: f64,

    delay_estimator: DelayEstimator,
    tuner: Tuner,
    stage_ctl: StageController,
    selection_window: SelectionWindow,
    slope_corrector: SlopeCorrector,

    held_delay_ns: Option<f64>,
    raw_delay_ns: i64,
    filtered_delay_ns: i64,
    last_norm_freq_offset: f64,

    selection_count: u64,
    last_tuner_ref: Option<(f64, f64)>,

    empty_queue_fallback_count: u64,
}

impl<R: Rng> Simulation<R> {
    pub fn new(config: SystemConfig, rng: R) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow!("invalid configuration: {e}"))?;

        let sync_period_sec = 1.0 / config.sync_rate;
        let pdelay_period_sec = 1.0 / config.pdelay_req_rate;

        let master = Rtc::new(config.master_rtc, config.nominal_rtc_clk);
        let slave = Rtc::new(config.slave_rtc, config.nominal_rtc_clk);
        let delay_gen = ErlangDelay::new(config.network.queueing_mean_sec, config.network.erlang_k);

        let stage_configs = [
            Stage::DelayEst,
            Stage::CoarseSynt,
            Stage::FineSynt,
            Stage::ConstToff,
        ]
        .map(|s| {
            let w = config.stage_windows[s.index()];
            // Spec §4.6: with packet selection disabled, a strobe fires
            // on every SYNC RX instead of once per filled window. A
            // window length of 1 reduces every push to a strobe without
            // a special-cased bypass path through the selector.
            let window_len = if config.packet_selection {
                w.window_len
            } else {
                1
            };
            SelectionConfig {
                window_len,
                strategy: w.strategy(),
            }
        });
        let stage_ctl = StageController::new(stage_configs);
        let selection_window = SelectionWindow::new(stage_ctl.selector_config(Stage::DelayEst));

        let rtc_inc_filt_len = config.filters.rtc_inc_filter_len();
        let delay_est_filt_len = config.filters.delay_est_filter_len();

        let mut queue = EventQueue::new();
        queue.add(0.0, EventKind::SyncTx);
        queue.add(0.0, EventKind::PdelayReqTx);

        Ok(Simulation {
            config,
            t_sim: 0.0,
            queue,
            master,
            slave,
            delay_gen,
            rng,
            msg: MessageEngineState::new(),
            sync_period_sec,
            pdelay_period_sec,
            delay_estimator: DelayEstimator::new(delay_est_filt_len),
            tuner: Tuner::new(rtc_inc_filt_len),
            stage_ctl,
            selection_window,
            slope_corrector: SlopeCorrector::new(),
            held_delay_ns: None,
            raw_delay_ns: 0,
            filtered_delay_ns: 0,
            last_norm_freq_offset: 0.0,
            selection_count: 0,
            last_tuner_ref: None,
            empty_queue_fallback_count: 0,
        })
    }

    pub fn t_sim(&self) -> f64 {
        self.t_sim
    }

    pub fn stage(&self) -> Stage {
        self.stage_ctl.stage()
    }

    pub fn master(&self) -> &Rtc {
        &self.master
    }

    pub fn slave(&self) -> &Rtc {
        &self.slave
    }

    pub fn config(&self) -> &SystemConfig {
        &self.config
    }

    pub fn empty_queue_fallback_count(&self) -> u64 {
        self.empty_queue_fallback_count
    }

    /// Run `n` driver iterations.
    pub fn run_steps(&mut self, n: usize, sink: &mut dyn OutputSink) -> Result<()> {
        for _ in 0..n {
            self.step(sink)?;
        }
        Ok(())
    }

    /// Run until `t_sim` reaches `t_end_sec`.
    pub fn run_until(&mut self, t_end_sec: f64, sink: &mut dyn OutputSink) -> Result<()> {
        while self.t_sim < t_end_sec {
            self.step(sink)?;
        }
        Ok(())
    }

    /// One driver iteration: accrue both RTCs to the current `t_sim`,
    /// dispatch every event now due, then advance `t_sim` to the next
    /// scheduled time (or a fixed fallback step if the queue is empty).
    pub fn step(&mut self, sink: &mut dyn OutputSink) -> Result<()> {
        self.master.accrue(self.t_sim)?;
        self.slave.accrue(self.t_sim)?;

        while let Some(t) = self.queue.peek_min_time() {
            if t > self.t_sim + DUE_EPS_SEC {
                break;
            }
            self.dispatch_one(sink)?;
        }

        match self.queue.peek_min_time() {
            Some(t) => self.t_sim = t,
            None => {
                self.t_sim += self.config.t_step_sim;
                self.empty_queue_fallback_count += 1;
                warn!(
                    "event queue empty at t_sim={}, advancing by fixed step t_step_sim={}",
                    self.t_sim, self.config.t_step_sim
                );
            }
        }
        Ok(())
    }

    fn dispatch_one(&mut self, sink: &mut dyn OutputSink) -> Result<()> {
        let (_time, kind) = self
            .queue
            .pop()
            .expect("dispatch_one called with an empty queue");
        match kind {
            EventKind::SyncTx => self.handle_sync_tx(),
            EventKind::SyncRx => self.handle_sync_rx_event(sink)?,
            EventKind::PdelayReqTx => self.handle_pdelay_req_tx(),
            EventKind::PdelayReqRx => self.handle_pdelay_req_rx(),
            EventKind::PdelayRespRx => self.handle_pdelay_resp_rx()?,
        }
        Ok(())
    }

    fn handle_sync_tx(&mut self) {
        if self.msg.sync_on_way {
            warn!(
                "SYNC TX blocked at t_sim={}: previous SYNC still on the wire",
                self.t_sim
            );
        } else {
            let t1 = self.master.syntonized_now();
            let delay_sec = self.delay_gen.sample(&mut self.rng);
            self.msg.sync_on_way = true;
            self.msg.sync_t1 = Some(t1);
            self.msg.sync_true_delay_ns = Some(delay_sec * 1e9);
            self.queue.add(self.t_sim + delay_sec, EventKind::SyncRx);
        }
        self.queue
            .add(self.t_sim + self.sync_period_sec, EventKind::SyncTx);
    }

    fn handle_pdelay_req_tx(&mut self) {
        if self.msg.pdelay_req_on_way {
            warn!(
                "Pdelay_req TX blocked at t_sim={}: previous request still on the wire",
                self.t_sim
            );
        } else {
            let t1 = self.slave.syntonized_now();
            let delay_sec = self.delay_gen.sample(&mut self.rng);
            self.msg.pdelay_req_on_way = true;
            self.msg.pdelay_t1 = Some(t1);
            self.queue.add(self.t_sim + delay_sec, EventKind::PdelayReqRx);
        }
        self.queue
            .add(self.t_sim + self.pdelay_period_sec, EventKind::PdelayReqTx);
    }

    fn handle_pdelay_req_rx(&mut self) {
        // Master's receive and reply-transmit timestamps are the same
        // counter read (spec §4.3: "they may coincide").
        let t2 = self.master.syntonized_now();
        self.msg.pdelay_t2 = Some(t2);
        self.msg.pdelay_t3 = Some(t2);
        self.msg.pdelay_req_on_way = false;
        self.msg.pdelay_resp_on_way = true;

        let delay_sec = self.delay_gen.sample(&mut self.rng);
        self.queue.add(self.t_sim + delay_sec, EventKind::PdelayRespRx);
    }

    fn handle_pdelay_resp_rx(&mut self) -> Result<()> {
        let t4 = self.slave.syntonized_now();
        let t1 = self.msg.pdelay_t1.take();
        let t2 = self.msg.pdelay_t2.take();
        let t3 = self.msg.pdelay_t3.take();
        self.msg.pdelay_resp_on_way = false;

        let (t1, t2, t3) = match (t1, t2, t3) {
            (Some(a), Some(b), Some(c)) => (a, b, c),
            _ => {
                warn!(
                    "Pdelay_resp RX at t_sim={} with no matching in-flight exchange",
                    self.t_sim
                );
                return Ok(());
            }
        };

        let estimate = self.delay_estimator.on_pdelay_resp_rx(t1, t2, t3, t4);
        self.raw_delay_ns = estimate.raw_ns;
        self.filtered_delay_ns = estimate.reported_ns;

        if estimate.became_post_transient_this_call && self.stage_ctl.stage() == Stage::DelayEst {
            self.stage_ctl.request_transition(Stage::CoarseSynt);
        }
        Ok(())
    }

    fn handle_sync_rx_event(&mut self, sink: &mut dyn OutputSink) -> Result<()> {
        let t2 = self.slave.syntonized_now();
        let t1 = self.msg.sync_t1.take();
        let true_delay_ns = self.msg.sync_true_delay_ns.take();
        self.msg.sync_on_way = false;

        let (t1, true_delay_ns) = match (t1, true_delay_ns) {
            (Some(a), Some(b)) => (a, b),
            _ => {
                warn!(
                    "SYNC RX at t_sim={} with no matching in-flight TX",
                    self.t_sim
                );
                return Ok(());
            }
        };

        self.handle_sync_rx(t1, t2, true_delay_ns, sink)
    }

    fn handle_sync_rx(
        &mut self,
        t1: crate::timestamp::Timestamp,
        t2: crate::timestamp::Timestamp,
        true_delay_ns: f64,
        sink: &mut dyn OutputSink,
    ) -> Result<()> {
        let stage_before = self.stage_ctl.stage();

        let delay_ns = self.resolve_delay_for_offset_estimate(true_delay_ns);
        let sample = compute_offset_sample(t1, delay_ns, t2);
        let total_ns = sample.sec as f64 * 1_000_000_000.0 + sample.ns;

        let toffset_slope_subtract = if stage_before == Stage::ConstToff {
            Some(self.stage_ctl.toffset_slope())
        } else {
            None
        };

        if let Some(result) =
            self.selection_window
                .push(total_ns, sample.master_total_ns, toffset_slope_subtract)
        {
            self.handle_toffset_corr_strobe(stage_before, result)?;
        }

        if stage_before == Stage::ConstToff {
            let mut offset = self.slave.time_offset();
            self.slope_corrector
                .apply(self.stage_ctl.toffset_slope(), &mut offset);
            self.slave.set_time_offset(offset);
        }

        let actual_ns_error = self.compute_actual_ns_error();
        let status = SyncStatus {
            t_sim: self.t_sim,
            actual_ns_error,
            norm_freq_offset_to_nominal: self.last_norm_freq_offset,
            raw_delay_est: self.raw_delay_ns,
            filtered_delay_est: self.filtered_delay_ns,
            stage: StageCode::from(stage_before),
        };
        sink.on_sync_rx(status);

        if let Some(new_stage) = self.stage_ctl.commit_pending() {
            self.selection_window
                .reconfigure(self.stage_ctl.selector_config(new_stage));
            info!("stage transition -> {new_stage:?} at t_sim={}", self.t_sim);
        }

        Ok(())
    }

    /// Delay value fed to the offset estimator: the true simulated delay
    /// in debug mode, else the filtered post-transient estimate,
    /// optionally held fixed across a selection window.
    fn resolve_delay_for_offset_estimate(&mut self, true_delay_ns: f64) -> f64 {
        if self.config.perfect_delay_est {
            return true_delay_ns;
        }

        let filtered = self.filtered_delay_ns as f64;
        if self.config.sample_win_delay {
            if self.selection_window.is_empty() {
                self.held_delay_ns = Some(filtered);
            }
            self.held_delay_ns.unwrap_or(filtered)
        } else {
            filtered
        }
    }

    fn handle_toffset_corr_strobe(&mut self, stage: Stage, result: SelectionResult) -> Result<()> {
        self.selection_count += 1;

        match stage {
            Stage::DelayEst => {
                self.slave
                    .set_time_offset(Offset::from_total_ns(result.total_ns.floor() as i128));
            }
            Stage::FineSynt => {
                let sync_period_ns = 1_000_000_000.0 / self.config.sync_rate;
                self.stage_ctl.set_toffset_slope(result.b * sync_period_ns);
                self.stage_ctl.request_transition(Stage::ConstToff);
            }
            Stage::ConstToff => {
                self.slave
                    .set_time_offset(Offset::from_total_ns(result.total_ns.floor() as i128));
            }
            Stage::CoarseSynt => {
                // No direct offset-register write in COARSE_SYNT; handled
                // below via the increment tuner.
            }
        }

        let rtc_inc_est_strobe =
            self.selection_count % self.config.rtc_inc_est_period as u64 == 0;
        if rtc_inc_est_strobe && stage == Stage::CoarseSynt {
            self.run_increment_tuner(result)?;
        }

        Ok(())
    }

    fn run_increment_tuner(&mut self, result: SelectionResult) -> Result<()> {
        let cur_master_ns = result.last_master_total_ns;
        let cur_slave_ns = cur_master_ns - result.total_ns;

        if let Some((prev_master_ns, prev_slave_ns)) = self.last_tuner_ref {
            let mut master_interval_ns = cur_master_ns - prev_master_ns;
            if master_interval_ns < 0.0 {
                master_interval_ns += 1_000_000_000.0;
            }
            let mut slave_interval_ns = cur_slave_ns - prev_slave_ns;
            if slave_interval_ns < 0.0 {
                slave_interval_ns += 1_000_000_000.0;
            }

            let inc_val_ns_current = self.slave.inc_val_ns();
            let nominal_period_ns = 1e9 / self.config.nominal_rtc_clk;
            let tuner_cfg = TunerConfig {
                foffset_thresh_ppb: self.config.foffset_thresh_ppb,
                en_fp_inc_val: self.config.fixed_point.en_fp_inc_val,
                fixed_point_fmt: self.config.fixed_point.format(),
            };

            let outcome = self.tuner.update(
                master_interval_ns,
                slave_interval_ns,
                inc_val_ns_current,
                nominal_period_ns,
                &tuner_cfg,
            )?;

            self.last_norm_freq_offset = outcome.norm_freq_offset;
            self.slave.set_inc_val_ns(outcome.committed_inc_val_ns)?;

            if outcome.saturated {
                warn!(
                    "increment tuner: fixed-point quantizer saturated, clamped to representable range"
                );
            }

            // A discarded estimate is zeroed (§4.8 step 4) so it reads as
            // "converged" by coincidence, not because the slave's true
            // frequency offset actually shrank. Gating the handoff on
            // `!discarded` is what makes scenario C (an offset that never
            // drops below `foffset_thresh_ppb`) stall in COARSE_SYNT
            // indefinitely instead of advancing on its first discard.
            if !outcome.discarded && (outcome.norm_freq_offset * 1e9).abs() < outcome.res_ppb / 2.0
            {
                self.stage_ctl.request_transition(Stage::FineSynt);
            }
        }

        self.last_tuner_ref = Some((cur_master_ns, cur_slave_ns));
        Ok(())
    }

    fn compute_actual_ns_error(&self) -> i64 {
        let master_total = self.master.synchronized_total_ns();
        let slave_total = self.slave.synchronized_total_ns();
        (master_total - slave_total) as i64
    }
}
