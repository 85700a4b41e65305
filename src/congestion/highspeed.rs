//! HighSpeed TCP, RFC 3649.
//!
//! Additive increase and multiplicative decrease coefficients both depend on the current
//! window, looked up from the table in Appendix B of the RFC.

use std::time::Instant;

use crate::{Result, config::WindowConfig, state::CongestionState, traits::Transport};

use super::{CongestionAlgorithm, slow_start};

const NAME: &str = "highspeed";

/// One row of the RFC 3649 table: windows up to `w` segments use `a` and `b`.
#[derive(Debug, Clone, Copy)]
struct Row {
    w: u32,
    a: u32,
    b: f64,
}

const fn row(w: u32, a: u32, b: f64) -> Row {
    Row { w, a, b }
}

#[rustfmt::skip]
const TABLE: [Row; 73] = [
    row(38, 1, 0.50),    row(118, 2, 0.44),   row(221, 3, 0.41),   row(347, 4, 0.38),
    row(495, 5, 0.37),   row(663, 6, 0.35),   row(851, 7, 0.34),   row(1058, 8, 0.33),
    row(1284, 9, 0.32),  row(1529, 10, 0.31), row(1793, 11, 0.30), row(2076, 12, 0.29),
    row(2378, 13, 0.28), row(2699, 14, 0.28), row(3039, 15, 0.27), row(3399, 16, 0.27),
    row(3778, 17, 0.26), row(4177, 18, 0.26), row(4596, 19, 0.25), row(5036, 20, 0.25),
    row(5497, 21, 0.24), row(5979, 22, 0.24), row(6483, 23, 0.23), row(7009, 24, 0.23),
    row(7558, 25, 0.22), row(8130, 26, 0.22), row(8726, 27, 0.22), row(9346, 28, 0.21),
    row(9991, 29, 0.21), row(10661, 30, 0.21), row(11358, 31, 0.20), row(12082, 32, 0.20),
    row(12834, 33, 0.20), row(13614, 34, 0.19), row(14424, 35, 0.19), row(15265, 36, 0.19),
    row(16137, 37, 0.19), row(17042, 38, 0.18), row(17981, 39, 0.18), row(18955, 40, 0.18),
    row(19965, 41, 0.17), row(21013, 42, 0.17), row(22101, 43, 0.17), row(23230, 44, 0.17),
    row(24402, 45, 0.16), row(25618, 46, 0.16), row(26881, 47, 0.16), row(28193, 48, 0.16),
    row(29557, 49, 0.15), row(30975, 50, 0.15), row(32450, 51, 0.15), row(33986, 52, 0.15),
    row(35586, 53, 0.14), row(37253, 54, 0.14), row(38992, 55, 0.14), row(40808, 56, 0.14),
    row(42707, 57, 0.13), row(44694, 58, 0.13), row(46776, 59, 0.13), row(48961, 60, 0.13),
    row(51258, 61, 0.13), row(53677, 62, 0.12), row(56230, 63, 0.12), row(58932, 64, 0.12),
    row(61799, 65, 0.12), row(64851, 66, 0.11), row(68113, 67, 0.11), row(71617, 68, 0.11),
    row(75401, 69, 0.10), row(79517, 70, 0.10), row(84035, 71, 0.10), row(89053, 72, 0.10),
    row(94717, 73, 0.09),
];

fn lookup(w: u32) -> &'static Row {
    let idx = TABLE.partition_point(|r| r.w < w);
    TABLE.get(idx).unwrap_or(&TABLE[TABLE.len() - 1])
}

/// Increase coefficient a(w): segments added per RTT at a window of `w` segments.
pub fn table_lookup_a(w: u32) -> u32 {
    lookup(w).a
}

/// Decrease coefficient b(w) at a window of `w` segments.
pub fn table_lookup_b(w: u32) -> f64 {
    lookup(w).b
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HighSpeedConfig {
    pub window: WindowConfig,
}

impl HighSpeedConfig {
    pub fn validate(&self) -> Result<()> {
        self.window.validate(NAME)
    }
}

#[derive(Debug)]
pub struct HighSpeed {
    config: HighSpeedConfig,
}

impl HighSpeed {
    pub fn new(config: HighSpeedConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }
}

impl CongestionAlgorithm for HighSpeed {
    fn name(&self) -> &'static str {
        NAME
    }

    fn window_config(&self) -> &WindowConfig {
        &self.config.window
    }

    fn reset(&mut self, _state: &mut CongestionState, _now: Instant) {}

    fn increase_window(
        &mut self,
        state: &mut CongestionState,
        segments_acked: u32,
        _tx: &dyn Transport,
    ) {
        let segments_acked = slow_start(state, segments_acked);
        if segments_acked == 0 || state.in_slow_start() {
            return;
        }

        let w = state.cwnd_in_segments().max(1);
        let a = table_lookup_a(w);
        let increment = (a.saturating_mul(state.segment_size()) / w).max(1);
        state.cwnd = state.cwnd.saturating_add(increment);
    }

    fn cut_window(&mut self, state: &mut CongestionState, tx: &dyn Transport) -> u32 {
        let b = table_lookup_b(state.cwnd_in_segments());
        let ssthresh = (tx.bytes_in_flight() / 2).max(state.segments(2));

        let cut = ((1. - b) * state.cwnd as f64) as u32;
        state.cwnd = state
            .cwnd
            .saturating_sub(cut)
            .max(state.segment_size());
        state.ssthresh = ssthresh;
        ssthresh
    }

    fn fork(&self) -> Box<dyn CongestionAlgorithm> {
        Box::new(Self {
            config: self.config.clone(),
        })
    }
}
