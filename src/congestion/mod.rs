pub mod bic;
pub mod cubic;
pub mod highspeed;
pub mod hybla;
mod hystart;
pub mod noordwijk;
pub mod tracing;

#[cfg(test)]
mod tests;

use std::time::Instant;

use ::tracing::{debug, trace};

use crate::{
    config::WindowConfig,
    constants::DUP_ACK_THRESHOLD,
    metrics::METRICS,
    seq_nr::SeqNr,
    state::{CongestionState, Phase},
    traits::Transport,
};

/// Standard slow start: one segment per ACK, never past `ssthresh`'s crossing ACK.
///
/// Returns how many of the acknowledged segments are left for congestion avoidance.
pub(crate) fn slow_start(state: &mut CongestionState, segments_acked: u32) -> u32 {
    if segments_acked == 0 || !state.in_slow_start() {
        return segments_acked;
    }
    state.cwnd = state.cwnd.saturating_add(state.segment_size());
    segments_acked - 1
}

/// A congestion control algorithm driving one connection.
///
/// The socket holds one instance per connection and calls it on every new ACK, duplicate ACK
/// and retransmission timeout. The provided methods implement the loss state machine shared
/// by all algorithms:
///
/// ```text
/// Open --(triple dupack or RTO)--> Loss
/// Loss --(ACK covers the recovery point)--> Open
/// ```
///
/// Implementors supply the growth and cut rules through the required hooks and may override
/// any provided method when the shared behavior doesn't fit.
#[allow(unused_variables)]
pub trait CongestionAlgorithm: Send + core::fmt::Debug {
    fn name(&self) -> &'static str;

    fn window_config(&self) -> &WindowConfig;

    /// Forget all per-connection state. Called from [`CongestionAlgorithm::init`] after the
    /// shared window values were set.
    fn reset(&mut self, state: &mut CongestionState, now: Instant);

    /// Grow the window after `segments_acked` segments were newly acknowledged.
    fn increase_window(
        &mut self,
        state: &mut CongestionState,
        segments_acked: u32,
        tx: &dyn Transport,
    );

    /// Respond to a new loss episode: set `ssthresh` and the post-cut `cwnd`, returning the
    /// new `ssthresh`.
    fn cut_window(&mut self, state: &mut CongestionState, tx: &dyn Transport) -> u32;

    /// A fresh instance with the same configuration and no connection state.
    fn fork(&self) -> Box<dyn CongestionAlgorithm>;

    /// Window to restart from after a retransmission timeout.
    fn cwnd_after_timeout(&self, state: &CongestionState) -> u32 {
        state.segment_size()
    }

    /// Forget the growth epoch. Called on every retransmission timeout.
    fn reset_epoch(&mut self) {}

    fn init(&mut self, state: &mut CongestionState, tx: &mut dyn Transport) {
        let window = *self.window_config();
        state.cwnd = state.segments(window.initial_cwnd_segments);
        state.ssthresh = state
            .segments(window.initial_ssthresh_segments)
            .max(state.segments(2));
        state.phase = Phase::Open;
        state.snd_una = tx.head_sequence();
        state.recovery_point = state.snd_una;
        self.reset(state, tx.now());
        debug!(
            algorithm = self.name(),
            cwnd = state.cwnd,
            ssthresh = state.ssthresh,
            "congestion control initialized"
        );
    }

    /// Called for each cumulative ACK. ACKs that don't advance the window are ignored.
    fn on_new_ack(
        &mut self,
        state: &mut CongestionState,
        ack: SeqNr,
        tx: &mut dyn Transport,
    ) -> Phase {
        if ack <= state.snd_una {
            return state.phase;
        }
        let acked = ack.bytes_since(state.snd_una);
        state.snd_una = ack;

        if state.phase == Phase::Loss && ack >= state.recovery_point {
            trace!(algorithm = self.name(), ?ack, "loss episode over");
            state.phase = Phase::Open;
        }

        let segments_acked = (acked / state.segment_size()).max(1);
        self.increase_window(state, segments_acked, &*tx);
        state.phase
    }

    fn on_dup_ack(
        &mut self,
        state: &mut CongestionState,
        dup_ack_count: u32,
        tx: &mut dyn Transport,
    ) -> Phase {
        if dup_ack_count == DUP_ACK_THRESHOLD {
            if state.phase == Phase::Loss {
                return state.phase;
            }
            let ssthresh = self.recalc_ssthresh(state, &*tx);
            state.recovery_point = tx.high_tx_mark();
            METRICS.loss_events.increment(1);
            METRICS.cwnd_after_loss.record(state.cwnd as f64);
            debug!(
                algorithm = self.name(),
                ssthresh,
                cwnd = state.cwnd,
                recovery_point = ?state.recovery_point,
                "triple duplicate ack, entering loss recovery"
            );
            tx.retransmit_oldest();
        } else if dup_ack_count > DUP_ACK_THRESHOLD {
            self.inflate_window(state, tx);
        }
        state.phase
    }

    /// Fast recovery: each dupack past the threshold means a segment left the network.
    fn inflate_window(&mut self, state: &mut CongestionState, tx: &mut dyn Transport) {
        state.cwnd = state.cwnd.saturating_add(state.segment_size());
        tx.send_pending();
    }

    /// Cut the window for a new loss episode. Repeated calls within one episode return the
    /// current `ssthresh` without touching anything.
    fn recalc_ssthresh(&mut self, state: &mut CongestionState, tx: &dyn Transport) -> u32 {
        if state.phase == Phase::Loss {
            return state.ssthresh;
        }
        let ssthresh = self.cut_window(state, tx);
        state.phase = Phase::Loss;
        ssthresh
    }

    /// Always a fresh loss episode, whatever phase we were in.
    fn on_retransmit_timeout(&mut self, state: &mut CongestionState, tx: &mut dyn Transport) {
        let ssthresh = self.cut_window(state, &*tx);
        state.cwnd = self.cwnd_after_timeout(state);
        state.phase = Phase::Loss;
        state.recovery_point = tx.high_tx_mark();
        self.reset_epoch();
        METRICS.rto_events.increment(1);
        METRICS.cwnd_after_loss.record(state.cwnd as f64);
        debug!(
            algorithm = self.name(),
            ssthresh,
            cwnd = state.cwnd,
            "retransmission timeout"
        );
        tx.retransmit_oldest();
    }

    /// Usable window in bytes.
    fn window(&self, state: &CongestionState) -> u32 {
        state.cwnd.min(state.receiver_window)
    }

    /// How many bytes may be put on the wire right now.
    fn send_allowance(&self, state: &CongestionState, bytes_in_flight: u32) -> u32 {
        self.window(state).saturating_sub(bytes_in_flight)
    }

    /// The socket reports every segment it puts on the wire, including the ones requested
    /// through [`Transport::retransmit_oldest`].
    fn on_transmit(
        &mut self,
        state: &mut CongestionState,
        seq: SeqNr,
        len: u32,
        retransmission: bool,
        now: Instant,
    ) {
    }

    /// When the algorithm's timer expires, if it has one armed.
    fn poll_at(&self) -> Option<Instant> {
        None
    }

    /// Called by the socket once [`CongestionAlgorithm::poll_at`] is reached.
    fn on_timer(&mut self, state: &mut CongestionState, tx: &mut dyn Transport) {}
}
