use lazy_static::lazy_static;
use metrics::{Counter, Histogram, counter, histogram};

pub struct Metrics {
    pub burst_adjustments: Counter,
    pub burst_trackings: Counter,
    pub burst_timer_fires: Counter,
    pub cwnd_after_loss: Histogram,
    pub hystart_exits: Counter,
    pub loss_events: Counter,
    pub rto_events: Counter,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            burst_adjustments: counter!("tcp_cc_burst_adjustments"),
            burst_trackings: counter!("tcp_cc_burst_trackings"),
            burst_timer_fires: counter!("tcp_cc_burst_timer_fires"),
            cwnd_after_loss: histogram!("tcp_cc_cwnd_after_loss"),
            hystart_exits: counter!("tcp_cc_hystart_exits"),
            loss_events: counter!("tcp_cc_loss_events"),
            rto_events: counter!("tcp_cc_rto_events"),
        }
    }
}

lazy_static! {
    pub static ref METRICS: Metrics = Metrics::new();
}
