//! BIC: binary increase congestion control.
//!
//! Below the window where the last loss happened, the window grows by binary search towards
//! it. Past it, growth mirrors the same shape, slowly probing first and then linearly.

use std::time::Instant;

use tracing::trace;

use crate::{
    Result,
    config::WindowConfig,
    error::Ensure,
    state::CongestionState,
    traits::Transport,
};

use super::{CongestionAlgorithm, slow_start};

const NAME: &str = "bic";

// Growth is capped at one segment per this many ACKs until the first loss.
const VIRGIN_CNT_CLAMP: u32 = 20;

#[derive(Debug, Clone, PartialEq)]
pub struct BicConfig {
    pub window: WindowConfig,
    pub fast_convergence: bool,
    /// Multiplicative decrease factor.
    pub beta: f64,
    /// Max segments added per RTT in the linear phase.
    pub max_incr: u32,
    /// Below this many segments BIC behaves like standard TCP.
    pub low_wnd: u32,
    pub smooth_part: u32,
    /// Binary search coefficient.
    pub b: f64,
}

impl Default for BicConfig {
    fn default() -> Self {
        Self {
            window: WindowConfig::default(),
            fast_convergence: true,
            beta: 0.8,
            max_incr: 16,
            low_wnd: 14,
            smooth_part: 5,
            b: 4.,
        }
    }
}

impl BicConfig {
    pub fn validate(&self) -> Result<()> {
        self.window.validate(NAME)?;
        (self.beta > 0. && self.beta < 1.).ensure(NAME, "beta", "must be in (0, 1)")?;
        (self.max_incr > 0).ensure(NAME, "max_incr", "must be positive")?;
        (self.smooth_part > 0).ensure(NAME, "smooth_part", "must be positive")?;
        (self.b > 0.).ensure(NAME, "b", "must be positive")
    }
}

#[derive(Debug)]
pub struct Bic {
    config: BicConfig,

    // In segments. 0 until the first loss.
    last_max_cwnd: u32,
    // ACKed segments since the last increment.
    cwnd_cnt: u32,
    epoch_start: Option<Instant>,
}

impl Bic {
    pub fn new(config: BicConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_validated(config))
    }

    fn from_validated(config: BicConfig) -> Self {
        Self {
            config,
            last_max_cwnd: 0,
            cwnd_cnt: 0,
            epoch_start: None,
        }
    }

    pub fn last_max_cwnd(&self) -> u32 {
        self.last_max_cwnd
    }

    pub fn epoch_start(&self) -> Option<Instant> {
        self.epoch_start
    }

    /// How many ACKed segments it takes to grow the window by one segment.
    fn update(&self, seg_cwnd: u32) -> u32 {
        let c = &self.config;
        let cwnd = seg_cwnd as f64;
        let last_max = self.last_max_cwnd as f64;
        let max_incr = c.max_incr as f64;
        let smooth_part = c.smooth_part as f64;

        let cnt = if seg_cwnd < c.low_wnd {
            cwnd
        } else if seg_cwnd < self.last_max_cwnd {
            let dist = (last_max - cwnd) / c.b;
            if dist > max_incr {
                // Linear increase
                cwnd / max_incr
            } else if dist <= 1. {
                // Close to the target, binary search would be too aggressive
                cwnd * smooth_part / c.b
            } else {
                // Binary search
                cwnd / dist
            }
        } else if cwnd < last_max + c.b {
            // Slow start-like probing right past the old maximum
            cwnd * smooth_part / c.b
        } else if cwnd < last_max + max_incr * (c.b - 1.) {
            cwnd * (c.b - 1.) / (cwnd - last_max)
        } else {
            cwnd / max_incr
        };

        let mut cnt = cnt as u32;
        if self.last_max_cwnd == 0 {
            cnt = cnt.min(VIRGIN_CNT_CLAMP);
        }
        cnt.max(1)
    }
}

impl CongestionAlgorithm for Bic {
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
        let segments_acked = slow_start(state, segments_acked);
        if segments_acked == 0 || state.in_slow_start() {
            return;
        }

        if self.epoch_start.is_none() {
            self.epoch_start = Some(tx.now());
        }
        self.cwnd_cnt = self.cwnd_cnt.saturating_add(segments_acked);
        let cnt = self.update(state.cwnd_in_segments());
        if self.cwnd_cnt > cnt {
            state.cwnd = state.cwnd.saturating_add(state.segment_size());
            self.cwnd_cnt = 0;
            trace!(cwnd = state.cwnd, cnt, "bic: window increased");
        }
    }

    fn cut_window(&mut self, state: &mut CongestionState, _tx: &dyn Transport) -> u32 {
        let seg_cwnd = state.cwnd_in_segments();
        let segment_size = state.segment_size();
        let min_ssthresh = state.segments(2);

        if seg_cwnd < self.last_max_cwnd && self.config.fast_convergence {
            self.last_max_cwnd = (self.config.beta * seg_cwnd as f64) as u32;
        } else {
            self.last_max_cwnd = seg_cwnd;
        }

        let ssthresh = if seg_cwnd < self.config.low_wnd {
            segment_size.saturating_mul(seg_cwnd >> 2)
        } else {
            (segment_size as f64 * seg_cwnd as f64 * self.config.beta) as u32
        }
        .max(min_ssthresh);

        state.ssthresh = ssthresh;
        state.cwnd = ssthresh;
        self.reset_epoch();
        ssthresh
    }

    fn reset_epoch(&mut self) {
        self.cwnd_cnt = 0;
        self.epoch_start = None;
    }

    fn fork(&self) -> Box<dyn CongestionAlgorithm> {
        Box::new(Self::from_validated(self.config.clone()))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::{
        congestion::CongestionAlgorithm,
        seq_nr::SeqNr,
        state::{CongestionState, Phase},
        test_util::{MockTransport, setup_test_logging},
    };

    use super::{Bic, BicConfig};

    const MSS: u32 = 536;

    fn setup(cwnd_segments: u32, ssthresh_segments: u32) -> (Bic, CongestionState, MockTransport) {
        setup_test_logging();
        let mut tx = MockTransport::new();
        let mut bic = Bic::new(BicConfig::default()).unwrap();
        let mut state = CongestionState::new(MSS).unwrap();
        bic.init(&mut state, &mut tx);
        state.cwnd = cwnd_segments * MSS;
        state.ssthresh = ssthresh_segments * MSS;
        (bic, state, tx)
    }

    #[test]
    fn test_enough_acks_grow_by_one_segment() {
        let (mut bic, mut state, mut tx) = setup(10, 9);
        bic.on_new_ack(&mut state, SeqNr(11 * MSS), &mut tx);
        assert_eq!(state.cwnd, 11 * MSS);
    }

    #[test]
    fn test_not_enough_acks_keep_window() {
        let (mut bic, mut state, mut tx) = setup(10, 9);
        bic.on_new_ack(&mut state, SeqNr(8 * MSS), &mut tx);
        assert_eq!(state.cwnd, 10 * MSS);
    }

    #[test]
    fn test_per_segment_acks_grow_once() {
        let (mut bic, mut state, mut tx) = setup(10, 9);
        for i in 1..=11 {
            tx.increment_now(Duration::from_millis(1));
            bic.on_new_ack(&mut state, SeqNr(i * MSS), &mut tx);
        }
        assert_eq!(state.cwnd, 11 * MSS);
        assert!(bic.epoch_start().is_some());
    }

    #[test]
    fn test_update_regimes() {
        let mut bic = Bic::new(BicConfig::default()).unwrap();

        // Below low_wnd: standard TCP.
        assert_eq!(bic.update(10), 10);

        // No loss yet: clamped.
        assert_eq!(bic.update(1000), 20);

        bic.last_max_cwnd = 200;
        // Far below the target: linear, dist = 100/4 = 25 > 16
        assert_eq!(bic.update(100), 100 / 16);
        // dist = 10/4 = 2.5: binary search
        assert_eq!(bic.update(190), (190. / 2.5) as u32);
        // dist <= 1: smoothed
        assert_eq!(bic.update(198), 198 * 5 / 4);
        // Right at the old maximum: still smoothed, no division by zero
        assert_eq!(bic.update(200), 200 * 5 / 4);
        // Past it by more than B, within max_incr * (B - 1)
        assert_eq!(bic.update(210), (210. * 3. / 10.) as u32);
        // Far past: linear
        assert_eq!(bic.update(300), 300 / 16);
    }

    #[test]
    fn test_loss_response() {
        let (mut bic, mut state, tx) = setup(100, 50);
        let ssthresh = bic.recalc_ssthresh(&mut state, &tx);
        assert_eq!(bic.last_max_cwnd(), 100);
        assert_eq!(ssthresh, (MSS as f64 * 100. * 0.8) as u32);
        assert_eq!(state.cwnd, ssthresh);
        assert_eq!(state.phase, Phase::Loss);

        // Same episode: nothing changes.
        assert_eq!(bic.recalc_ssthresh(&mut state, &tx), ssthresh);
        assert_eq!(bic.last_max_cwnd(), 100);

        // Next episode below the old maximum: fast convergence.
        state.phase = Phase::Open;
        state.cwnd = 90 * MSS;
        bic.recalc_ssthresh(&mut state, &tx);
        assert_eq!(bic.last_max_cwnd(), 72);
    }

    #[test]
    fn test_loss_response_small_window() {
        let (mut bic, mut state, tx) = setup(12, 50);
        assert_eq!(bic.recalc_ssthresh(&mut state, &tx), 3 * MSS);

        let (mut bic, mut state, tx) = setup(5, 50);
        assert_eq!(bic.recalc_ssthresh(&mut state, &tx), 2 * MSS);
    }

    #[test]
    fn test_rto_restarts_from_one_segment() {
        let (mut bic, mut state, mut tx) = setup(40, 20);
        bic.on_new_ack(&mut state, SeqNr(MSS), &mut tx);
        bic.on_retransmit_timeout(&mut state, &mut tx);
        assert_eq!(state.cwnd, MSS);
        assert_eq!(state.ssthresh, (MSS as f64 * 40. * 0.8) as u32);
        assert_eq!(state.phase, Phase::Loss);
        assert!(bic.epoch_start().is_none());
        assert_eq!(tx.retransmits, 1);
    }

    #[test]
    fn test_invalid_config() {
        assert!(
            Bic::new(BicConfig {
                b: 0.,
                ..Default::default()
            })
            .is_err()
        );
        assert!(
            Bic::new(BicConfig {
                beta: 1.5,
                ..Default::default()
            })
            .is_err()
        );
    }
}
