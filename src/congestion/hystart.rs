//! Hybrid Slow Start.
//!
//! Leaves slow start early when either the ACKs of one round arrive as a tight train
//! stretching past the minimum RTT, or the RTT within a round grows noticeably above the
//! minimum. Both mean the bottleneck queue is starting to fill.

use std::time::{Duration, Instant};

use tracing::debug;

use crate::seq_nr::SeqNr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HystartDetect {
    AckTrain,
    Delay,
    #[default]
    Both,
}

impl HystartDetect {
    fn ack_train(self) -> bool {
        matches!(self, HystartDetect::AckTrain | HystartDetect::Both)
    }

    fn delay(self) -> bool {
        matches!(self, HystartDetect::Delay | HystartDetect::Both)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HystartExit {
    AckTrain,
    Delay,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(super) struct HystartParams {
    pub detect: HystartDetect,
    pub ack_delta: Duration,
    pub delay_min: Duration,
    pub delay_max: Duration,
    pub min_samples: u32,
}

impl HystartParams {
    fn delay_thresh(&self, delay_min: Duration) -> Duration {
        (delay_min / 8).clamp(self.delay_min, self.delay_max)
    }
}

#[derive(Debug, Default, Clone)]
pub(super) struct Hystart {
    found: Option<HystartExit>,

    round_start: Option<Instant>,
    last_ack: Option<Instant>,
    // The round ends when this sequence is acknowledged.
    end_seq: Option<SeqNr>,

    // Smallest RTT among the first samples of the round.
    curr_rtt: Option<Duration>,
    sample_cnt: u32,
}

impl Hystart {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn found(&self) -> Option<HystartExit> {
        self.found
    }

    pub fn round_over(&self, ack: SeqNr) -> bool {
        self.end_seq.is_none_or(|end| ack > end)
    }

    pub fn start_round(&mut self, now: Instant, end_seq: SeqNr) {
        self.round_start = Some(now);
        self.last_ack = Some(now);
        self.end_seq = Some(end_seq);
        self.curr_rtt = None;
        self.sample_cnt = 0;
    }

    /// Feed one ACK with its RTT sample. Returns the reason once slow start should end.
    pub fn on_ack(
        &mut self,
        params: &HystartParams,
        now: Instant,
        rtt: Duration,
        delay_min: Duration,
    ) -> Option<HystartExit> {
        if self.found.is_some() {
            return None;
        }

        if params.detect.ack_train() {
            if let (Some(last_ack), Some(round_start)) = (self.last_ack, self.round_start) {
                if now.saturating_duration_since(last_ack) <= params.ack_delta {
                    self.last_ack = Some(now);
                    if now.saturating_duration_since(round_start) > delay_min {
                        self.found = Some(HystartExit::AckTrain);
                    }
                }
            }
        }

        if params.detect.delay() && self.found.is_none() {
            if self.sample_cnt < params.min_samples {
                self.curr_rtt = Some(self.curr_rtt.map_or(rtt, |c| c.min(rtt)));
                self.sample_cnt += 1;
            } else if let Some(curr_rtt) = self.curr_rtt {
                if curr_rtt > delay_min + params.delay_thresh(delay_min) {
                    self.found = Some(HystartExit::Delay);
                }
            }
        }

        if let Some(reason) = self.found {
            debug!(?reason, ?delay_min, curr_rtt = ?self.curr_rtt, "hystart: leaving slow start");
        }
        self.found
    }
}
