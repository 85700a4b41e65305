use std::time::Instant;

use crate::{
    config::WindowConfig,
    constants::{CONGESTION_TRACING_ACK_LOG_EVERY_MS, CONGESTION_TRACING_LOG_LEVEL},
    seq_nr::SeqNr,
    state::{CongestionState, Phase, Snapshot},
    traits::Transport,
};

use super::CongestionAlgorithm;

/// Receives every change of cwnd, ssthresh or phase made by a traced algorithm.
pub trait CongestionObserver: Send {
    fn on_change(&mut self, event: &'static str, before: Snapshot, after: Snapshot);
}

impl<F> CongestionObserver for F
where
    F: FnMut(&'static str, Snapshot, Snapshot) + Send,
{
    fn on_change(&mut self, event: &'static str, before: Snapshot, after: Snapshot) {
        self(event, before, after)
    }
}

/// Wraps an algorithm, logging the window changes each event causes.
pub struct TracingAlgorithm {
    inner: Box<dyn CongestionAlgorithm>,
    observer: Option<Box<dyn CongestionObserver>>,
}

impl std::fmt::Debug for TracingAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TracingAlgorithm")
            .field("inner", &self.inner)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

impl TracingAlgorithm {
    pub fn new(inner: Box<dyn CongestionAlgorithm>) -> Self {
        Self {
            inner,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: impl CongestionObserver + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    fn notify(&mut self, event: &'static str, before: Snapshot, after: Snapshot) {
        if before == after {
            return;
        }
        if let Some(observer) = self.observer.as_mut() {
            observer.on_change(event, before, after);
        }
    }

    fn traced<R>(
        &mut self,
        event: &'static str,
        state: &mut CongestionState,
        f: impl FnOnce(&mut Box<dyn CongestionAlgorithm>, &mut CongestionState) -> R,
    ) -> R {
        let before = state.snapshot();
        let inner = &mut self.inner;
        let result = log_if_changed!(
            CONGESTION_TRACING_LOG_LEVEL,
            event,
            &mut *state,
            |s| s.snapshot(),
            |s| f(inner, s)
        );
        self.notify(event, before, state.snapshot());
        result
    }

    // ACKs and burst timers are too frequent to log every change.
    fn traced_frequent<R>(
        &mut self,
        event: &'static str,
        state: &mut CongestionState,
        f: impl FnOnce(&mut Box<dyn CongestionAlgorithm>, &mut CongestionState) -> R,
    ) -> R {
        let before = state.snapshot();
        let inner = &mut self.inner;
        let result = log_every_ms_if_changed!(
            CONGESTION_TRACING_ACK_LOG_EVERY_MS,
            CONGESTION_TRACING_LOG_LEVEL,
            event,
            &mut *state,
            |s| s.snapshot(),
            |s| f(inner, s)
        );
        self.notify(event, before, state.snapshot());
        result
    }
}

impl CongestionAlgorithm for TracingAlgorithm {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn window_config(&self) -> &WindowConfig {
        self.inner.window_config()
    }

    fn reset(&mut self, state: &mut CongestionState, now: Instant) {
        self.inner.reset(state, now)
    }

    fn increase_window(
        &mut self,
        state: &mut CongestionState,
        segments_acked: u32,
        tx: &dyn Transport,
    ) {
        self.inner.increase_window(state, segments_acked, tx)
    }

    fn cut_window(&mut self, state: &mut CongestionState, tx: &dyn Transport) -> u32 {
        self.inner.cut_window(state, tx)
    }

    /// The observer belongs to one connection and isn't carried over.
    fn fork(&self) -> Box<dyn CongestionAlgorithm> {
        Box::new(TracingAlgorithm::new(self.inner.fork()))
    }

    fn cwnd_after_timeout(&self, state: &CongestionState) -> u32 {
        self.inner.cwnd_after_timeout(state)
    }

    fn reset_epoch(&mut self) {
        self.inner.reset_epoch()
    }

    fn init(&mut self, state: &mut CongestionState, tx: &mut dyn Transport) {
        self.traced("init", state, |cc, s| cc.init(s, tx))
    }

    fn on_new_ack(
        &mut self,
        state: &mut CongestionState,
        ack: SeqNr,
        tx: &mut dyn Transport,
    ) -> Phase {
        self.traced_frequent("on_new_ack", state, |cc, s| cc.on_new_ack(s, ack, tx))
    }

    fn on_dup_ack(
        &mut self,
        state: &mut CongestionState,
        dup_ack_count: u32,
        tx: &mut dyn Transport,
    ) -> Phase {
        self.traced("on_dup_ack", state, |cc, s| {
            cc.on_dup_ack(s, dup_ack_count, tx)
        })
    }

    fn inflate_window(&mut self, state: &mut CongestionState, tx: &mut dyn Transport) {
        self.inner.inflate_window(state, tx)
    }

    fn recalc_ssthresh(&mut self, state: &mut CongestionState, tx: &dyn Transport) -> u32 {
        self.traced("recalc_ssthresh", state, |cc, s| cc.recalc_ssthresh(s, tx))
    }

    fn on_retransmit_timeout(&mut self, state: &mut CongestionState, tx: &mut dyn Transport) {
        self.traced("on_retransmit_timeout", state, |cc, s| {
            cc.on_retransmit_timeout(s, tx)
        })
    }

    fn window(&self, state: &CongestionState) -> u32 {
        self.inner.window(state)
    }

    fn send_allowance(&self, state: &CongestionState, bytes_in_flight: u32) -> u32 {
        self.inner.send_allowance(state, bytes_in_flight)
    }

    fn on_transmit(
        &mut self,
        state: &mut CongestionState,
        seq: SeqNr,
        len: u32,
        retransmission: bool,
        now: Instant,
    ) {
        self.inner
            .on_transmit(state, seq, len, retransmission, now)
    }

    fn poll_at(&self) -> Option<Instant> {
        self.inner.poll_at()
    }

    fn on_timer(&mut self, state: &mut CongestionState, tx: &mut dyn Transport) {
        self.traced_frequent("on_timer", state, |cc, s| cc.on_timer(s, tx))
    }
}
