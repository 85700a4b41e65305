use std::time::Duration;

use crate::{
    Error, Result,
    constants::{DEFAULT_INITIAL_SSTHRESH_SEGMENTS, DEFAULT_RECEIVER_WINDOW},
    seq_nr::SeqNr,
};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Open,
    /// Inside a loss-recovery episode. Further loss signals for the same
    /// episode don't cut the window again.
    Loss,
}

/// Read-only view of the values worth reporting to telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    pub cwnd: u32,
    pub ssthresh: u32,
    pub phase: Phase,
}

/// Per-connection congestion state.
///
/// Owned by the socket and passed by reference into every algorithm call. The algorithm
/// mutates it in place.
#[derive(Debug, Clone)]
pub struct CongestionState {
    /// Congestion window, bytes.
    pub cwnd: u32,
    /// Slow start threshold, bytes.
    pub ssthresh: u32,
    segment_size: u32,

    /// Last advertised receive window of the peer, bytes.
    pub receiver_window: u32,

    pub last_rtt: Option<Duration>,
    pub min_rtt: Option<Duration>,
    pub max_rtt: Option<Duration>,

    pub phase: Phase,

    /// Highest cumulative ACK processed by the algorithm.
    pub snd_una: SeqNr,
    /// An ACK at or past this point ends the current loss episode.
    pub recovery_point: SeqNr,
}

impl CongestionState {
    pub fn new(segment_size: u32) -> Result<Self> {
        if segment_size == 0 {
            return Err(Error::ZeroSegmentSize);
        }
        Ok(Self {
            cwnd: segment_size,
            ssthresh: segment_size.saturating_mul(DEFAULT_INITIAL_SSTHRESH_SEGMENTS),
            segment_size,
            receiver_window: DEFAULT_RECEIVER_WINDOW,
            last_rtt: None,
            min_rtt: None,
            max_rtt: None,
            phase: Phase::Open,
            snd_una: SeqNr::default(),
            recovery_point: SeqNr::default(),
        })
    }

    pub fn segment_size(&self) -> u32 {
        self.segment_size
    }

    pub fn cwnd_in_segments(&self) -> u32 {
        self.cwnd / self.segment_size
    }

    pub fn in_slow_start(&self) -> bool {
        self.cwnd < self.ssthresh
    }

    /// `n` segments in bytes, saturating.
    pub fn segments(&self, n: u32) -> u32 {
        self.segment_size.saturating_mul(n)
    }

    /// Record an RTT measurement taken by the socket.
    pub fn on_rtt_sample(&mut self, rtt: Duration) {
        self.last_rtt = Some(rtt);
        self.min_rtt = Some(self.min_rtt.map_or(rtt, |m| m.min(rtt)));
        self.max_rtt = Some(self.max_rtt.map_or(rtt, |m| m.max(rtt)));
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            cwnd: self.cwnd,
            ssthresh: self.ssthresh,
            phase: self.phase,
        }
    }
}
