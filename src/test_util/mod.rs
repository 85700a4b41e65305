use std::time::{Duration, Instant};

use tracing_subscriber::EnvFilter;

use crate::{seq_nr::SeqNr, traits::Transport};

pub fn setup_test_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("trace"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// Transport whose bookkeeping is set directly by the test.
#[derive(Debug)]
pub struct MockTransport {
    pub now: Instant,
    pub bytes_in_flight: u32,
    pub head_sequence: SeqNr,
    pub high_tx_mark: SeqNr,
    pub smoothed_rtt: Option<Duration>,

    pub retransmits: usize,
    pub send_pending_calls: usize,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            now: Instant::now(),
            bytes_in_flight: 0,
            head_sequence: SeqNr(0),
            high_tx_mark: SeqNr(0),
            smoothed_rtt: None,
            retransmits: 0,
            send_pending_calls: 0,
        }
    }

    pub fn increment_now(&mut self, dur: Duration) {
        self.now += dur;
    }
}

impl Transport for MockTransport {
    fn now(&self) -> Instant {
        self.now
    }

    fn bytes_in_flight(&self) -> u32 {
        self.bytes_in_flight
    }

    fn head_sequence(&self) -> SeqNr {
        self.head_sequence
    }

    fn high_tx_mark(&self) -> SeqNr {
        self.high_tx_mark
    }

    fn smoothed_rtt(&self) -> Option<Duration> {
        self.smoothed_rtt
    }

    fn retransmit_oldest(&mut self) {
        self.retransmits += 1;
    }

    fn send_pending(&mut self) {
        self.send_pending_calls += 1;
    }
}
