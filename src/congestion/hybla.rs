//! TCP Hybla.
//!
//! Long-RTT connections (satellite links) grow their window per ACK as fast as a connection
//! with the reference RTT would grow it per unit of time. The normalization factor is
//! `rho = rtt / reference_rtt`, never below 1.

use std::time::{Duration, Instant};

use tracing::debug;

use crate::{
    Result,
    config::WindowConfig,
    constants::DEFAULT_HYBLA_REFERENCE_RTT,
    error::Ensure,
    state::CongestionState,
    traits::Transport,
};

use super::CongestionAlgorithm;

const NAME: &str = "hybla";

#[derive(Debug, Clone, PartialEq)]
pub struct HyblaConfig {
    pub window: WindowConfig,
    pub reference_rtt: Duration,
}

impl Default for HyblaConfig {
    fn default() -> Self {
        Self {
            window: WindowConfig::default(),
            reference_rtt: DEFAULT_HYBLA_REFERENCE_RTT,
        }
    }
}

impl HyblaConfig {
    pub fn validate(&self) -> Result<()> {
        self.window.validate(NAME)?;
        (!self.reference_rtt.is_zero()).ensure(NAME, "reference_rtt", "must be positive")
    }
}

#[derive(Debug)]
pub struct Hybla {
    config: HyblaConfig,

    rho: f64,
    min_rtt: Option<Duration>,
    // Fractional segments not yet added to cwnd.
    cwnd_frac: f64,
}

impl Hybla {
    pub fn new(config: HyblaConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_validated(config))
    }

    fn from_validated(config: HyblaConfig) -> Self {
        Self {
            config,
            rho: 1.,
            min_rtt: None,
            cwnd_frac: 0.,
        }
    }

    pub fn rho(&self) -> f64 {
        self.rho
    }

    /// Recompute rho, but only for a strictly smaller RTT than seen so far.
    ///
    /// `ssthresh` follows rho: it is rescaled by the ratio of the new to the old factor, so
    /// repeated recalculations never compound.
    fn on_rtt_sample(&mut self, state: &mut CongestionState, rtt: Duration) {
        if rtt.is_zero() || self.min_rtt.is_some_and(|m| rtt >= m) {
            return;
        }
        self.min_rtt = Some(rtt);
        let prev_rho = self.rho;
        self.rho = (rtt.as_secs_f64() / self.config.reference_rtt.as_secs_f64()).max(1.);

        let scaled = (state.ssthresh as f64 * self.rho / prev_rho).round();
        state.ssthresh = (scaled.min(u32::MAX as f64) as u32).max(state.segments(2));
        debug!(rho = self.rho, ?rtt, ssthresh = state.ssthresh, "hybla: rho updated");
    }

    fn apply_frac(&mut self, state: &mut CongestionState) {
        if self.cwnd_frac >= 1. {
            let inc = self.cwnd_frac as u32;
            self.cwnd_frac -= inc as f64;
            state.cwnd = state
                .cwnd
                .saturating_add(inc.saturating_mul(state.segment_size()));
        }
    }
}

impl CongestionAlgorithm for Hybla {
    fn name(&self) -> &'static str {
        NAME
    }

    fn window_config(&self) -> &WindowConfig {
        &self.config.window
    }

    fn reset(&mut self, state: &mut CongestionState, _now: Instant) {
        self.rho = 1.;
        self.min_rtt = None;
        self.cwnd_frac = 0.;
        if let Some(rtt) = state.min_rtt {
            self.on_rtt_sample(state, rtt);
        }
    }

    fn increase_window(
        &mut self,
        state: &mut CongestionState,
        segments_acked: u32,
        tx: &dyn Transport,
    ) {
        if let Some(rtt) = tx.smoothed_rtt().or(state.last_rtt) {
            self.on_rtt_sample(state, rtt);
        }

        let mut remaining = segments_acked;
        if remaining > 0 && state.in_slow_start() {
            self.cwnd_frac += 2f64.powf(self.rho) - 1.;
            remaining -= 1;
            self.apply_frac(state);
        }
        if remaining == 0 || state.in_slow_start() {
            return;
        }

        let w = state.cwnd_in_segments().max(1) as f64;
        self.cwnd_frac += remaining as f64 * self.rho * self.rho / w;
        self.apply_frac(state);
    }

    fn cut_window(&mut self, state: &mut CongestionState, _tx: &dyn Transport) -> u32 {
        let ssthresh = (state.cwnd / 2).max(state.segments(2));
        state.ssthresh = ssthresh;
        state.cwnd = ssthresh;
        self.cwnd_frac = 0.;
        ssthresh
    }

    fn reset_epoch(&mut self) {
        self.cwnd_frac = 0.;
    }

    fn fork(&self) -> Box<dyn CongestionAlgorithm> {
        Box::new(Self::from_validated(self.config.clone()))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use approx::assert_abs_diff_eq;

    use crate::{
        congestion::CongestionAlgorithm,
        seq_nr::SeqNr,
        state::{CongestionState, Phase},
        test_util::{MockTransport, setup_test_logging},
    };

    use super::{Hybla, HyblaConfig};

    const MSS: u32 = 1000;

    fn setup() -> (Hybla, CongestionState, MockTransport) {
        setup_test_logging();
        let mut tx = MockTransport::new();
        let mut hybla = Hybla::new(HyblaConfig::default()).unwrap();
        let mut state = CongestionState::new(MSS).unwrap();
        hybla.init(&mut state, &mut tx);
        (hybla, state, tx)
    }

    #[test]
    fn test_rho_from_rtt() {
        let (mut hybla, mut state, mut tx) = setup();
        assert_abs_diff_eq!(hybla.rho(), 1.);

        state.on_rtt_sample(Duration::from_millis(200));
        hybla.on_new_ack(&mut state, SeqNr(MSS), &mut tx);
        assert_abs_diff_eq!(hybla.rho(), 4., epsilon = 1e-9);
        assert_eq!(state.ssthresh, 4 * 65535 * MSS);
    }

    #[test]
    fn test_short_rtt_keeps_rho_at_one() {
        let (mut hybla, mut state, mut tx) = setup();
        state.on_rtt_sample(Duration::from_millis(10));
        hybla.on_new_ack(&mut state, SeqNr(MSS), &mut tx);
        assert_abs_diff_eq!(hybla.rho(), 1.);
        assert_eq!(state.cwnd, 2 * MSS);
    }

    #[test]
    fn test_same_sample_twice_keeps_rho() {
        let (mut hybla, mut state, mut tx) = setup();
        state.on_rtt_sample(Duration::from_millis(150));
        hybla.on_new_ack(&mut state, SeqNr(MSS), &mut tx);
        let rho = hybla.rho();
        let ssthresh = state.ssthresh;

        state.on_rtt_sample(Duration::from_millis(150));
        hybla.on_new_ack(&mut state, SeqNr(2 * MSS), &mut tx);
        assert_eq!(hybla.rho(), rho);
        assert_eq!(state.ssthresh, ssthresh);

        // Larger RTT: no change either.
        state.on_rtt_sample(Duration::from_millis(400));
        hybla.on_new_ack(&mut state, SeqNr(3 * MSS), &mut tx);
        assert_eq!(hybla.rho(), rho);

        // New minimum: recomputed.
        state.on_rtt_sample(Duration::from_millis(100));
        hybla.on_new_ack(&mut state, SeqNr(4 * MSS), &mut tx);
        assert_abs_diff_eq!(hybla.rho(), 2., epsilon = 1e-9);
    }

    #[test]
    fn test_slow_start_increment() {
        let (mut hybla, mut state, mut tx) = setup();
        // rho = 2: 2^2 - 1 = 3 segments per ACK
        state.on_rtt_sample(Duration::from_millis(100));
        hybla.on_new_ack(&mut state, SeqNr(MSS), &mut tx);
        assert_eq!(state.cwnd, 4 * MSS);
        hybla.on_new_ack(&mut state, SeqNr(2 * MSS), &mut tx);
        assert_eq!(state.cwnd, 7 * MSS);
    }

    #[test]
    fn test_congestion_avoidance_increment() {
        let (mut hybla, mut state, mut tx) = setup();
        state.on_rtt_sample(Duration::from_millis(100));
        hybla.on_new_ack(&mut state, SeqNr(MSS), &mut tx);

        // rho = 2: rho^2 / w = 4 / 40 segments per ACK, so 10 ACKs add one segment.
        state.cwnd = 40 * MSS;
        state.ssthresh = 20 * MSS;
        for i in 2..=10 {
            hybla.on_new_ack(&mut state, SeqNr(i * MSS), &mut tx);
            assert_eq!(state.cwnd, 40 * MSS);
        }
        // Floating point may leave the 10th ACK a hair short of a full segment.
        hybla.on_new_ack(&mut state, SeqNr(11 * MSS), &mut tx);
        hybla.on_new_ack(&mut state, SeqNr(12 * MSS), &mut tx);
        assert_eq!(state.cwnd, 41 * MSS);
    }

    #[test]
    fn test_loss_is_not_scaled() {
        let (mut hybla, mut state, mut tx) = setup();
        state.on_rtt_sample(Duration::from_millis(500));
        hybla.on_new_ack(&mut state, SeqNr(MSS), &mut tx);
        assert!(hybla.rho() > 1.);

        state.cwnd = 100 * MSS;
        let ssthresh = hybla.recalc_ssthresh(&mut state, &tx);
        assert_eq!(ssthresh, 50 * MSS);
        assert_eq!(state.cwnd, 50 * MSS);
        assert_eq!(state.phase, Phase::Loss);

    }

    #[test]
    fn test_new_minimum_rescales_ssthresh() {
        let (mut hybla, mut state, mut tx) = setup();
        state.on_rtt_sample(Duration::from_millis(500));
        hybla.on_new_ack(&mut state, SeqNr(MSS), &mut tx);
        assert_abs_diff_eq!(hybla.rho(), 10., epsilon = 1e-9);

        state.cwnd = 100 * MSS;
        hybla.recalc_ssthresh(&mut state, &tx);
        assert_eq!(state.ssthresh, 50 * MSS);

        // rho 10 -> 6: ssthresh follows by the same ratio.
        state.on_rtt_sample(Duration::from_millis(300));
        hybla.on_new_ack(&mut state, SeqNr(2 * MSS), &mut tx);
        assert_abs_diff_eq!(hybla.rho(), 6., epsilon = 1e-9);
        assert_eq!(state.ssthresh, 30 * MSS);

        // rho 6 -> 2, relative to the current value rather than the original one.
        state.on_rtt_sample(Duration::from_millis(100));
        hybla.on_new_ack(&mut state, SeqNr(3 * MSS), &mut tx);
        assert_eq!(state.ssthresh, 10 * MSS);
    }

    #[test]
    fn test_smoothed_rtt_when_no_sample() {
        let (mut hybla, mut state, mut tx) = setup();
        tx.smoothed_rtt = Some(Duration::from_millis(100));
        hybla.on_new_ack(&mut state, SeqNr(MSS), &mut tx);
        assert_abs_diff_eq!(hybla.rho(), 2., epsilon = 1e-9);
    }

    #[test]
    fn test_smoothed_rtt_preferred_over_raw_sample() {
        let (mut hybla, mut state, mut tx) = setup();
        tx.smoothed_rtt = Some(Duration::from_millis(150));
        state.on_rtt_sample(Duration::from_millis(400));
        hybla.on_new_ack(&mut state, SeqNr(MSS), &mut tx);
        assert_abs_diff_eq!(hybla.rho(), 3., epsilon = 1e-9);
    }

    #[test]
    fn test_rto() {
        let (mut hybla, mut state, mut tx) = setup();
        state.cwnd = 30 * MSS;
        hybla.on_retransmit_timeout(&mut state, &mut tx);
        assert_eq!(state.ssthresh, 15 * MSS);
        assert_eq!(state.cwnd, MSS);
    }
}
