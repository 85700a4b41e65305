//! TCP Noordwijk.
//!
//! Data leaves in bursts of `b_wnd` bytes, one burst per `tx_time`, instead of being clocked
//! out by ACKs. The ACKs of each burst form a train: its dispersion (time from first to last
//! ACK) and the RTT spread inside it tell whether the path is congested.
//!
//! `cwnd` holds what's left of the current burst allotment. Every transmission is charged to
//! it, and the burst timer refills it.

use std::{
    collections::VecDeque,
    time::{Duration, Instant},
};

use tracing::{debug, trace};

use crate::{
    Result,
    config::WindowConfig,
    constants::{
        DEFAULT_NOORDWIJK_CONGESTION_THRESHOLD, DEFAULT_NOORDWIJK_INITIAL_BURST_SEGMENTS,
        DEFAULT_NOORDWIJK_MIN_TX_TIME, DEFAULT_NOORDWIJK_STAB, DEFAULT_NOORDWIJK_TX_TIME,
        NOORDWIJK_BURST_MIN_SEGMENTS,
    },
    error::Ensure,
    metrics::METRICS,
    seq_nr::SeqNr,
    state::CongestionState,
    traits::Transport,
    utils::round_up_to_segment,
};

use super::CongestionAlgorithm;

const NAME: &str = "noordwijk";

#[derive(Debug, Clone, PartialEq)]
pub struct NoordwijkConfig {
    pub window: WindowConfig,
    /// Burst size until the first adaptation, and after every loss.
    pub initial_burst_segments: u32,
    /// Interval between bursts until the first adaptation, and after every loss.
    pub initial_tx_time: Duration,
    /// RTT spread inside one burst above which the path counts as congested.
    pub congestion_threshold: Duration,
    /// Completed bursts between two adaptations.
    pub stab: u32,
    pub min_tx_time: Duration,
    /// Allotment left for the retransmission after a loss or a timeout, in segments.
    pub c_wnd_after_loss: u32,
}

impl Default for NoordwijkConfig {
    fn default() -> Self {
        Self {
            window: WindowConfig::default(),
            initial_burst_segments: DEFAULT_NOORDWIJK_INITIAL_BURST_SEGMENTS,
            initial_tx_time: DEFAULT_NOORDWIJK_TX_TIME,
            congestion_threshold: DEFAULT_NOORDWIJK_CONGESTION_THRESHOLD,
            stab: DEFAULT_NOORDWIJK_STAB,
            min_tx_time: DEFAULT_NOORDWIJK_MIN_TX_TIME,
            c_wnd_after_loss: 1,
        }
    }
}

impl NoordwijkConfig {
    pub fn validate(&self) -> Result<()> {
        self.window.validate(NAME)?;
        (self.initial_burst_segments >= NOORDWIJK_BURST_MIN_SEGMENTS).ensure(
            NAME,
            "initial_burst_segments",
            "must be at least the minimum burst",
        )?;
        (!self.initial_tx_time.is_zero()).ensure(NAME, "initial_tx_time", "must be positive")?;
        (!self.min_tx_time.is_zero()).ensure(NAME, "min_tx_time", "must be positive")?;
        (self.min_tx_time <= self.initial_tx_time).ensure(
            NAME,
            "min_tx_time",
            "must not exceed initial_tx_time",
        )?;
        (self.stab > 0).ensure(NAME, "stab", "must be positive")?;
        (self.c_wnd_after_loss > 0).ensure(NAME, "c_wnd_after_loss", "must be positive")
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BurstTimer {
    Idle,
    Armed { expires_at: Instant },
}

impl BurstTimer {
    fn poll_at(&self) -> Option<Instant> {
        match *self {
            BurstTimer::Idle => None,
            BurstTimer::Armed { expires_at } => Some(expires_at),
        }
    }

    fn expired(&self, now: Instant) -> bool {
        matches!(*self, BurstTimer::Armed { expires_at } if now >= expires_at)
    }

    /// Replaces any pending deadline.
    fn arm(&mut self, expires_at: Instant) {
        *self = BurstTimer::Armed { expires_at }
    }

    fn set_for_idle(&mut self) {
        *self = BurstTimer::Idle
    }
}

#[derive(Debug, Clone, Copy)]
struct TxRecord {
    start: SeqNr,
    end: SeqNr,
    sent_at: Instant,
    // Karn: ambiguous RTT, don't sample.
    retransmitted: bool,
}

/// Measurements of the ACK train of the burst currently being acknowledged.
#[derive(Debug, Default, Clone, Copy)]
struct Train {
    acked: u32,
    first_ack: Option<Instant>,
    last_ack: Option<Instant>,
    min_rtt: Option<Duration>,
    max_rtt: Option<Duration>,
}

impl Train {
    fn on_rtt(&mut self, rtt: Duration) {
        self.min_rtt = Some(self.min_rtt.map_or(rtt, |m| m.min(rtt)));
        self.max_rtt = Some(self.max_rtt.map_or(rtt, |m| m.max(rtt)));
    }

    fn dispersion(&self) -> Duration {
        match (self.first_ack, self.last_ack) {
            (Some(first), Some(last)) => last.saturating_duration_since(first),
            _ => Duration::ZERO,
        }
    }

    fn delta_rtt(&self) -> Duration {
        match (self.min_rtt, self.max_rtt) {
            (Some(min), Some(max)) => max.saturating_sub(min),
            _ => Duration::ZERO,
        }
    }
}

#[derive(Debug)]
pub struct Noordwijk {
    config: NoordwijkConfig,

    // Both in bytes, multiples of the segment size.
    b_wnd: u32,
    initial_b_wnd: u32,
    burst_min: u32,
    tx_time: Duration,
    timer: BurstTimer,

    // New-data bytes sent in each burst not yet fully acknowledged, oldest first. The back
    // entry is the current cycle.
    burst_history: VecDeque<u32>,
    tx_history: VecDeque<TxRecord>,
    train: Train,
    completed_bursts: u32,
    // ACKs up to here are already accounted for, or predate the last loss.
    accounted_until: SeqNr,
    // Retransmitted bytes that didn't fit into the cycle's allotment.
    carried_retransmit: u32,
}

impl Noordwijk {
    pub fn new(config: NoordwijkConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_validated(config))
    }

    fn from_validated(config: NoordwijkConfig) -> Self {
        Self {
            b_wnd: 0,
            initial_b_wnd: 0,
            burst_min: 0,
            tx_time: config.initial_tx_time,
            timer: BurstTimer::Idle,
            burst_history: VecDeque::new(),
            tx_history: VecDeque::new(),
            train: Train::default(),
            completed_bursts: 0,
            accounted_until: SeqNr::default(),
            carried_retransmit: 0,
            config,
        }
    }

    /// Current burst size, bytes.
    pub fn b_wnd(&self) -> u32 {
        self.b_wnd
    }

    pub fn tx_time(&self) -> Duration {
        self.tx_time
    }

    fn restart_bursts(&mut self, now: Instant, accounted_until: SeqNr) {
        self.b_wnd = self.initial_b_wnd;
        self.tx_time = self.config.initial_tx_time;
        self.burst_history.clear();
        self.train = Train::default();
        self.completed_bursts = 0;
        self.carried_retransmit = 0;
        self.accounted_until = accounted_until;
        self.timer.arm(now + self.tx_time);
    }

    fn sample_rtts(&mut self, ack: SeqNr, now: Instant) {
        while let Some(rec) = self.tx_history.front() {
            if rec.end > ack {
                break;
            }
            if !rec.retransmitted {
                self.train.on_rtt(now.saturating_duration_since(rec.sent_at));
            }
            self.tx_history.pop_front();
        }
    }

    fn account_acked(&mut self, state: &CongestionState, acked: u32, now: Instant) {
        if acked == 0 || self.burst_history.is_empty() {
            return;
        }
        self.train.first_ack.get_or_insert(now);
        self.train.last_ack = Some(now);
        self.train.acked = self.train.acked.saturating_add(acked);

        while let Some(&burst) = self.burst_history.front() {
            if burst == 0 || self.train.acked < burst {
                break;
            }
            self.burst_history.pop_front();
            let finished = self.train;
            self.train = Train {
                acked: finished.acked - burst,
                ..Default::default()
            };
            if self.train.acked > 0 {
                self.train.first_ack = Some(now);
                self.train.last_ack = Some(now);
            }

            self.completed_bursts += 1;
            trace!(
                burst,
                dispersion = ?finished.dispersion(),
                delta_rtt = ?finished.delta_rtt(),
                completed = self.completed_bursts,
                "noordwijk: burst acknowledged"
            );
            if self.completed_bursts >= self.config.stab {
                self.completed_bursts = 0;
                self.adapt(state, finished.dispersion(), finished.delta_rtt());
            }
        }
    }

    fn adapt(&mut self, state: &CongestionState, dispersion: Duration, delta_rtt: Duration) {
        if delta_rtt > self.config.congestion_threshold {
            self.rate_adjustment(state, dispersion, delta_rtt);
        } else {
            self.rate_tracking(state);
        }
    }

    /// The queue is building up: shrink the burst in proportion to the extra delay.
    fn rate_adjustment(
        &mut self,
        state: &CongestionState,
        dispersion: Duration,
        delta_rtt: Duration,
    ) {
        let prev = self.b_wnd;
        let disp = dispersion.as_secs_f64();
        let ratio = disp / (disp + delta_rtt.as_secs_f64());
        let scaled = (prev as f64 * ratio) as u32;

        self.b_wnd = round_up_to_segment(scaled, state.segment_size())
            .max(self.burst_min)
            .min(prev);
        self.tx_time = dispersion.max(self.config.min_tx_time);

        METRICS.burst_adjustments.increment(1);
        debug!(
            prev,
            b_wnd = self.b_wnd,
            tx_time = ?self.tx_time,
            ?dispersion,
            ?delta_rtt,
            "noordwijk: rate adjustment"
        );
    }

    /// No congestion: move halfway back to the initial burst and interval.
    fn rate_tracking(&mut self, state: &CongestionState) {
        let prev = self.b_wnd;
        let gap = self.initial_b_wnd.saturating_sub(prev);
        if gap > 0 {
            let step = round_up_to_segment(gap.div_ceil(2), state.segment_size());
            self.b_wnd = prev.saturating_add(step).min(self.initial_b_wnd);
        }

        let initial = self.config.initial_tx_time;
        self.tx_time = if self.tx_time < initial {
            self.tx_time + (initial - self.tx_time) / 2
        } else {
            self.tx_time - (self.tx_time - initial) / 2
        };

        METRICS.burst_trackings.increment(1);
        trace!(prev, b_wnd = self.b_wnd, tx_time = ?self.tx_time, "noordwijk: rate tracking");
    }
}

impl CongestionAlgorithm for Noordwijk {
    fn name(&self) -> &'static str {
        NAME
    }

    fn window_config(&self) -> &WindowConfig {
        &self.config.window
    }

    fn reset(&mut self, state: &mut CongestionState, now: Instant) {
        self.initial_b_wnd = state.segments(self.config.initial_burst_segments);
        self.burst_min = state.segments(NOORDWIJK_BURST_MIN_SEGMENTS);
        self.tx_history.clear();
        self.restart_bursts(now, state.snd_una);
        // First burst goes out right away.
        self.timer.arm(now);
    }

    fn increase_window(
        &mut self,
        state: &mut CongestionState,
        _segments_acked: u32,
        tx: &dyn Transport,
    ) {
        let now = tx.now();
        let ack = state.snd_una;
        self.sample_rtts(ack, now);

        let acked = ack.bytes_since(self.accounted_until);
        if acked > 0 {
            self.accounted_until = ack;
        }
        self.account_acked(state, acked, now);
    }

    fn cut_window(&mut self, state: &mut CongestionState, tx: &dyn Transport) -> u32 {
        let ssthresh = (self.b_wnd / 2).max(state.segments(2));
        state.ssthresh = ssthresh;

        let accounted_until = self.accounted_until.max(tx.high_tx_mark());
        self.restart_bursts(tx.now(), accounted_until);
        // Room for the retransmission only. The rest waits for the timer.
        state.cwnd = self.cwnd_after_timeout(state);
        debug!(
            b_wnd = self.b_wnd,
            next_burst = ?self.timer.poll_at(),
            "noordwijk: loss, bursts restarted"
        );
        ssthresh
    }

    fn cwnd_after_timeout(&self, state: &CongestionState) -> u32 {
        state.segments(self.config.c_wnd_after_loss)
    }

    fn inflate_window(&mut self, _state: &mut CongestionState, _tx: &mut dyn Transport) {}

    fn send_allowance(&self, state: &CongestionState, _bytes_in_flight: u32) -> u32 {
        self.window(state)
    }

    fn on_transmit(
        &mut self,
        state: &mut CongestionState,
        seq: SeqNr,
        len: u32,
        retransmission: bool,
        now: Instant,
    ) {
        if len == 0 {
            return;
        }
        let end = seq + len;

        if retransmission {
            for rec in self
                .tx_history
                .iter_mut()
                .filter(|rec| rec.start < end && seq < rec.end)
            {
                rec.retransmitted = true;
            }
        } else {
            self.tx_history.push_back(TxRecord {
                start: seq,
                end,
                sent_at: now,
                retransmitted: false,
            });
            match self.burst_history.back_mut() {
                Some(sent) => *sent = sent.saturating_add(len),
                None => self.burst_history.push_back(len),
            }
        }

        if len <= state.cwnd {
            state.cwnd -= len;
        } else {
            if retransmission {
                self.carried_retransmit = self.carried_retransmit.saturating_add(len - state.cwnd);
            }
            state.cwnd = 0;
        }
    }

    fn poll_at(&self) -> Option<Instant> {
        self.timer.poll_at()
    }

    fn on_timer(&mut self, state: &mut CongestionState, tx: &mut dyn Transport) {
        let now = tx.now();
        if !self.timer.expired(now) {
            return;
        }
        self.timer.set_for_idle();

        let carried = self.carried_retransmit.min(self.b_wnd);
        self.carried_retransmit -= carried;
        state.cwnd = self.b_wnd - carried;

        if self.burst_history.back() != Some(&0) {
            self.burst_history.push_back(0);
        }
        self.timer.arm(now + self.tx_time);
        METRICS.burst_timer_fires.increment(1);
        trace!(
            allotment = state.cwnd,
            carried,
            next = ?self.tx_time,
            "noordwijk: burst released"
        );
        tx.send_pending();
    }

    fn fork(&self) -> Box<dyn CongestionAlgorithm> {
        Box::new(Self::from_validated(self.config.clone()))
    }
}
