//! Drives one simulated connection through a congestion control algorithm and logs the window.
//!
//! The path has a fixed RTT and drops segments either periodically or at random. Time is
//! virtual, advancing in 1ms steps.

use std::{
    collections::{BTreeSet, VecDeque},
    time::{Duration, Instant},
};

use anyhow::Context;
use clap::{Parser, ValueEnum};
use rand::{Rng, SeedableRng, rngs::StdRng};
use tcp_cc::{
    BicConfig, CongestionAlgorithm, CongestionConfig, CongestionControlKind, CongestionState,
    CubicConfig, HighSpeedConfig, HyblaConfig, NoordwijkConfig, SeqNr, Transport,
};
use tracing::{info, trace};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Algorithm {
    Bic,
    Cubic,
    HighSpeed,
    Hybla,
    Noordwijk,
}

#[derive(Debug, Clone, Parser)]
struct Args {
    #[arg(long, default_value = "cubic")]
    algorithm: Algorithm,

    #[arg(long, default_value_t = 1460)]
    segment_size: u32,

    /// Round trip time of the path, milliseconds.
    #[arg(long, default_value_t = 100)]
    rtt_ms: u64,

    /// Drop every Nth new segment. 0 disables periodic loss.
    #[arg(long, default_value_t = 500)]
    loss_every: u64,

    /// Probability of dropping a new segment, on top of periodic loss.
    #[arg(long, default_value_t = 0.)]
    loss_probability: f64,

    /// Simulated time, seconds.
    #[arg(long, default_value_t = 30)]
    duration_secs: u64,

    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Log every window change through the tracing decorator.
    #[arg(long)]
    congestion_tracing: bool,
}

impl Algorithm {
    fn kind(self) -> CongestionControlKind {
        match self {
            Algorithm::Bic => CongestionControlKind::Bic(BicConfig::default()),
            Algorithm::Cubic => CongestionControlKind::Cubic(CubicConfig::default()),
            Algorithm::HighSpeed => CongestionControlKind::HighSpeed(HighSpeedConfig::default()),
            Algorithm::Hybla => CongestionControlKind::Hybla(HyblaConfig::default()),
            Algorithm::Noordwijk => CongestionControlKind::Noordwijk(NoordwijkConfig::default()),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct InFlight {
    seq: SeqNr,
    // When the ACK for it gets back to the sender, if it isn't lost.
    ack_at: Instant,
    lost: bool,
}

/// Sender and receiver of one connection over a lossy fixed-delay path.
struct SimPath {
    now: Instant,
    rtt: Duration,
    segment_size: u32,

    snd_una: SeqNr,
    snd_nxt: SeqNr,
    wire: VecDeque<InFlight>,
    retransmit_queue: usize,
    last_progress: Instant,

    // Receiver side.
    rcv_nxt: SeqNr,
    out_of_order: BTreeSet<u32>,
    dup_acks: u32,
}

impl Transport for SimPath {
    fn now(&self) -> Instant {
        self.now
    }

    fn bytes_in_flight(&self) -> u32 {
        self.snd_nxt.bytes_since(self.snd_una)
    }

    fn head_sequence(&self) -> SeqNr {
        self.snd_una
    }

    fn high_tx_mark(&self) -> SeqNr {
        self.snd_nxt
    }

    fn smoothed_rtt(&self) -> Option<Duration> {
        Some(self.rtt)
    }

    fn retransmit_oldest(&mut self) {
        self.retransmit_queue += 1;
    }

    fn send_pending(&mut self) {}
}

impl SimPath {
    /// Deliver the segment to the receiver. Returns the cumulative ACK it generates.
    fn receive(&mut self, seq: SeqNr) -> SeqNr {
        if seq == self.rcv_nxt {
            self.rcv_nxt += self.segment_size;
            while self.out_of_order.remove(&self.rcv_nxt.0) {
                self.rcv_nxt += self.segment_size;
            }
        } else if seq > self.rcv_nxt {
            self.out_of_order.insert(seq.0);
        }
        self.rcv_nxt
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = CongestionConfig {
        kind: args.algorithm.kind(),
        tracing: args.congestion_tracing,
    };
    let mut cc = config.create().context("error creating congestion control")?;
    let mut state =
        CongestionState::new(args.segment_size).context("error creating congestion state")?;
    let mut rng = StdRng::seed_from_u64(args.seed);

    let start = Instant::now();
    let mut path = SimPath {
        now: start,
        rtt: Duration::from_millis(args.rtt_ms),
        segment_size: args.segment_size,
        snd_una: SeqNr(0),
        snd_nxt: SeqNr(0),
        wire: VecDeque::new(),
        retransmit_queue: 0,
        last_progress: start,
        rcv_nxt: SeqNr(0),
        out_of_order: BTreeSet::new(),
        dup_acks: 0,
    };
    let rto = path.rtt * 4;
    let end = start + Duration::from_secs(args.duration_secs);
    let mut sent_segments = 0u64;
    let mut last_report = start;

    cc.init(&mut state, &mut path);
    info!(algorithm = cc.name(), "starting simulation");

    while path.now < end {
        if cc.poll_at().is_some_and(|at| at <= path.now) {
            cc.on_timer(&mut state, &mut path);
        }

        // ACKs that made it back by now.
        while let Some(seg) = path.wire.front().copied() {
            if seg.ack_at > path.now {
                break;
            }
            path.wire.pop_front();
            if seg.lost {
                continue;
            }
            let ack = path.receive(seg.seq);
            if ack > path.snd_una {
                path.snd_una = ack;
                path.dup_acks = 0;
                path.last_progress = path.now;
                state.on_rtt_sample(path.rtt);
                cc.on_new_ack(&mut state, ack, &mut path);
            } else {
                path.dup_acks += 1;
                cc.on_dup_ack(&mut state, path.dup_acks, &mut path);
            }
        }

        if path.bytes_in_flight() > 0 && path.now.duration_since(path.last_progress) >= rto {
            path.last_progress = path.now;
            path.dup_acks = 0;
            cc.on_retransmit_timeout(&mut state, &mut path);
        }

        // Retransmissions go first and always get through.
        while path.retransmit_queue > 0 {
            path.retransmit_queue -= 1;
            let seq = path.snd_una;
            path.wire.push_back(InFlight {
                seq,
                ack_at: path.now + path.rtt,
                lost: false,
            });
            cc.on_transmit(&mut state, seq, args.segment_size, true, path.now);
        }

        while cc.send_allowance(&state, path.bytes_in_flight()) >= args.segment_size {
            sent_segments += 1;
            let lost = (args.loss_every > 0 && sent_segments % args.loss_every == 0)
                || rng.random_bool(args.loss_probability.clamp(0., 1.));
            let seq = path.snd_nxt;
            path.wire.push_back(InFlight {
                seq,
                ack_at: path.now + path.rtt,
                lost,
            });
            path.snd_nxt += args.segment_size;
            if lost {
                trace!(?seq, "dropping segment");
            }
            cc.on_transmit(&mut state, seq, args.segment_size, false, path.now);
        }

        if path.now.duration_since(last_report) >= path.rtt {
            last_report = path.now;
            info!(
                t_ms = path.now.duration_since(start).as_millis() as u64,
                cwnd_segments = state.cwnd_in_segments(),
                ssthresh_segments = state.ssthresh / args.segment_size,
                phase = ?state.phase,
                in_flight = path.bytes_in_flight(),
                "window"
            );
        }

        path.now += Duration::from_millis(1);
    }

    let delivered = path.snd_una.bytes_since(SeqNr(0)) as f64;
    info!(
        algorithm = cc.name(),
        goodput_kbps = delivered * 8. / 1000. / args.duration_secs.max(1) as f64,
        "done"
    );
    Ok(())
}
