use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::{
    Result,
    config::WindowConfig,
    error::Ensure,
    metrics::METRICS,
    state::CongestionState,
    traits::Transport,
    utils::duration_ms_f64,
};

use super::{
    CongestionAlgorithm,
    hystart::{Hystart, HystartParams},
    slow_start,
};

pub use super::hystart::{HystartDetect, HystartExit};

const NAME: &str = "cubic";

// K = cbrt(K_FACTOR * (w_max - cwnd) / C)
const K_FACTOR: f64 = 2.5;

// Fast convergence: remember less than the window we had when giving up bandwidth.
const FAST_CONVERGENCE_FACTOR: f64 = 0.9;

#[derive(Debug, Clone, PartialEq)]
pub struct CubicConfig {
    pub window: WindowConfig,
    pub fast_convergence: bool,
    /// Multiplicative decrease factor for ssthresh.
    pub beta: f64,
    /// Cubic scaling constant.
    pub c: f64,
    /// Upper bound on ACKs per segment of growth before the first loss.
    pub cnt_clamp: u32,
    /// Window after a loss, in segments.
    pub c_wnd_after_loss: u32,

    pub hystart: bool,
    pub hystart_detect: HystartDetect,
    /// HyStart only runs once the window reaches this many segments.
    pub hystart_low_window: u32,
    pub hystart_ack_delta: Duration,
    pub hystart_delay_min: Duration,
    pub hystart_delay_max: Duration,
    pub hystart_min_samples: u32,
}

impl Default for CubicConfig {
    fn default() -> Self {
        Self {
            window: WindowConfig::default(),
            fast_convergence: true,
            beta: 0.7,
            c: 0.4,
            cnt_clamp: 20,
            c_wnd_after_loss: 1,
            hystart: true,
            hystart_detect: HystartDetect::Both,
            hystart_low_window: 16,
            hystart_ack_delta: Duration::from_millis(2),
            hystart_delay_min: Duration::from_millis(4),
            hystart_delay_max: Duration::from_millis(1000),
            hystart_min_samples: 8,
        }
    }
}

impl CubicConfig {
    pub fn validate(&self) -> Result<()> {
        self.window.validate(NAME)?;
        (self.beta > 0. && self.beta < 1.).ensure(NAME, "beta", "must be in (0, 1)")?;
        (self.c > 0.).ensure(NAME, "c", "must be positive")?;
        (self.cnt_clamp > 0).ensure(NAME, "cnt_clamp", "must be positive")?;
        (self.c_wnd_after_loss > 0).ensure(NAME, "c_wnd_after_loss", "must be positive")?;
        (self.hystart_delay_min <= self.hystart_delay_max).ensure(
            NAME,
            "hystart_delay_min",
            "must not exceed hystart_delay_max",
        )?;
        (self.hystart_min_samples > 0).ensure(NAME, "hystart_min_samples", "must be positive")
    }

    fn hystart_params(&self) -> HystartParams {
        HystartParams {
            detect: self.hystart_detect,
            ack_delta: self.hystart_ack_delta,
            delay_min: self.hystart_delay_min,
            delay_max: self.hystart_delay_max,
            min_samples: self.hystart_min_samples,
        }
    }
}

#[derive(Debug)]
pub struct Cubic {
    config: CubicConfig,
    hystart_params: HystartParams,

    // Window units are segments.
    last_max_cwnd: u32,
    origin_point: f64,
    // Seconds from the epoch start until the window reaches origin_point.
    k: f64,
    epoch_start: Option<Instant>,
    delay_min: Option<Duration>,

    cwnd_cnt: u32,
    hystart: Hystart,
}

impl Cubic {
    pub fn new(config: CubicConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_validated(config))
    }

    fn from_validated(config: CubicConfig) -> Self {
        Self {
            hystart_params: config.hystart_params(),
            config,
            last_max_cwnd: 0,
            origin_point: 0.,
            k: 0.,
            epoch_start: None,
            delay_min: None,
            cwnd_cnt: 0,
            hystart: Hystart::default(),
        }
    }

    pub fn last_max_cwnd(&self) -> u32 {
        self.last_max_cwnd
    }

    pub fn k(&self) -> f64 {
        self.k
    }

    pub fn delay_min(&self) -> Option<Duration> {
        self.delay_min
    }

    pub fn hystart_found(&self) -> Option<HystartExit> {
        self.hystart.found()
    }

    /// How many ACKed segments it takes to grow the window by one segment.
    fn update(&mut self, seg_cwnd: u32, now: Instant) -> u32 {
        let cwnd = seg_cwnd as f64;
        let epoch_start = match self.epoch_start {
            Some(epoch_start) => epoch_start,
            None => {
                if self.last_max_cwnd <= seg_cwnd {
                    self.k = 0.;
                    self.origin_point = cwnd;
                } else {
                    let distance = (self.last_max_cwnd - seg_cwnd) as f64;
                    self.k = (K_FACTOR * distance / self.config.c).cbrt();
                    self.origin_point = self.last_max_cwnd as f64;
                }
                trace!(k = self.k, origin = self.origin_point, "cubic: new epoch");
                self.epoch_start = Some(now);
                now
            }
        };

        let t = now.saturating_duration_since(epoch_start).as_secs_f64();
        let target = self.origin_point + self.config.c * (t - self.k).powi(3);

        let mut cnt = if target > cwnd {
            cwnd / (target - cwnd)
        } else {
            // Very small increment
            100. * cwnd
        };

        if let Some(delay_min) = self.delay_min {
            let delay_min_ms = duration_ms_f64(delay_min);
            if delay_min_ms > 0. {
                cnt = cnt.max(8. * cwnd / (delay_min_ms * 20.));
            }
        }

        let mut cnt = cnt as u32;
        if self.last_max_cwnd == 0 {
            cnt = cnt.min(self.config.cnt_clamp);
        }
        cnt.max(1)
    }

    fn on_rtt_sample(&mut self, rtt: Duration) {
        if rtt.is_zero() {
            return;
        }
        self.delay_min = Some(self.delay_min.map_or(rtt, |d| d.min(rtt)));
    }

    fn hystart_update(&mut self, state: &mut CongestionState, tx: &dyn Transport) {
        let now = tx.now();
        if self.hystart.round_over(state.snd_una) {
            self.hystart.start_round(now, tx.high_tx_mark());
        }
        if state.cwnd_in_segments() < self.config.hystart_low_window {
            return;
        }
        let (Some(rtt), Some(delay_min)) = (state.last_rtt, self.delay_min) else {
            return;
        };
        if let Some(reason) = self
            .hystart
            .on_ack(&self.hystart_params, now, rtt, delay_min)
        {
            state.ssthresh = state.cwnd;
            METRICS.hystart_exits.increment(1);
            debug!(?reason, cwnd = state.cwnd, "cubic: hystart exit");
        }
    }
}

impl CongestionAlgorithm for Cubic {
    fn name(&self) -> &'static str {
        NAME
    }

    fn window_config(&self) -> &WindowConfig {
        &self.config.window
    }

    fn reset(&mut self, _state: &mut CongestionState, _now: Instant) {
        self.last_max_cwnd = 0;
        self.reset_epoch();
    }

    fn increase_window(
        &mut self,
        state: &mut CongestionState,
        segments_acked: u32,
        tx: &dyn Transport,
    ) {
        if let Some(rtt) = state.last_rtt {
            self.on_rtt_sample(rtt);
        }

        if self.config.hystart && state.in_slow_start() {
            self.hystart_update(state, tx);
        }

        let segments_acked = slow_start(state, segments_acked);
        if segments_acked == 0 || state.in_slow_start() {
            return;
        }

        self.cwnd_cnt = self.cwnd_cnt.saturating_add(segments_acked);
        let cnt = self.update(state.cwnd_in_segments(), tx.now());
        if self.cwnd_cnt > cnt {
            state.cwnd = state.cwnd.saturating_add(state.segment_size());
            self.cwnd_cnt = 0;
            trace!(cwnd = state.cwnd, cnt, "cubic: window increased");
        }
    }

    fn cut_window(&mut self, state: &mut CongestionState, _tx: &dyn Transport) -> u32 {
        let seg_cwnd = state.cwnd_in_segments();
        self.epoch_start = None;
        self.cwnd_cnt = 0;

        if seg_cwnd < self.last_max_cwnd && self.config.fast_convergence {
            self.last_max_cwnd = (FAST_CONVERGENCE_FACTOR * seg_cwnd as f64) as u32;
        } else {
            self.last_max_cwnd = seg_cwnd;
        }

        let ssthresh = ((state.cwnd as f64 * self.config.beta) as u32).max(state.segments(2));
        state.ssthresh = ssthresh;
        state.cwnd = self.cwnd_after_timeout(state);
        ssthresh
    }

    fn cwnd_after_timeout(&self, state: &CongestionState) -> u32 {
        state.segments(self.config.c_wnd_after_loss)
    }

    fn reset_epoch(&mut self) {
        self.origin_point = 0.;
        self.k = 0.;
        self.epoch_start = None;
        self.delay_min = None;
        self.cwnd_cnt = 0;
        self.hystart.reset();
    }

    fn fork(&self) -> Box<dyn CongestionAlgorithm> {
        Box::new(Self::from_validated(self.config.clone()))
    }
}
