// Properties every algorithm must share, run over all of them.

use std::time::Duration;

use crate::{
    config::{CongestionConfig, CongestionControlKind, WindowConfig},
    congestion::{
        CongestionAlgorithm, bic::BicConfig, cubic::CubicConfig, highspeed::HighSpeedConfig,
        hybla::HyblaConfig, noordwijk::NoordwijkConfig,
    },
    seq_nr::SeqNr,
    state::{CongestionState, Phase},
    test_util::{MockTransport, setup_test_logging},
};

const MSS: u32 = 536;

fn kinds(window: WindowConfig) -> Vec<CongestionControlKind> {
    vec![
        CongestionControlKind::Bic(BicConfig {
            window,
            ..Default::default()
        }),
        CongestionControlKind::Cubic(CubicConfig {
            window,
            ..Default::default()
        }),
        CongestionControlKind::HighSpeed(HighSpeedConfig { window }),
        CongestionControlKind::Hybla(HyblaConfig {
            window,
            ..Default::default()
        }),
        CongestionControlKind::Noordwijk(NoordwijkConfig {
            window,
            ..Default::default()
        }),
    ]
}

fn all_algorithms() -> Vec<Box<dyn CongestionAlgorithm>> {
    let mut all = Vec::new();
    for tracing in [false, true] {
        for kind in kinds(WindowConfig::default()) {
            all.push(CongestionConfig { kind, tracing }.create().unwrap());
        }
    }
    all
}

fn init(cc: &mut dyn CongestionAlgorithm) -> (CongestionState, MockTransport) {
    let mut tx = MockTransport::new();
    let mut state = CongestionState::new(MSS).unwrap();
    cc.init(&mut state, &mut tx);
    (state, tx)
}

#[test]
fn test_init_invariants() {
    setup_test_logging();
    for mut cc in all_algorithms() {
        let (state, _) = init(&mut *cc);
        assert_eq!(state.cwnd, MSS, "{}", cc.name());
        assert!(state.ssthresh >= 2 * MSS, "{}", cc.name());
        assert_eq!(state.phase, Phase::Open);
    }

    let window = WindowConfig {
        initial_cwnd_segments: 4,
        initial_ssthresh_segments: 2,
    };
    for kind in kinds(window) {
        let mut cc = CongestionConfig {
            kind,
            tracing: false,
        }
        .create()
        .unwrap();
        let (state, _) = init(&mut *cc);
        assert_eq!(state.cwnd, 4 * MSS, "{}", cc.name());
        assert_eq!(state.ssthresh, 2 * MSS, "{}", cc.name());
    }
}

#[test]
fn test_recalc_ssthresh_idempotent() {
    setup_test_logging();
    for mut cc in all_algorithms() {
        let (mut state, mut tx) = init(&mut *cc);
        for i in 1..=5 {
            cc.on_new_ack(&mut state, SeqNr(i * MSS), &mut tx);
        }
        state.cwnd = 50 * MSS;
        tx.bytes_in_flight = 50 * MSS;

        let first = cc.recalc_ssthresh(&mut state, &tx);
        let after_first = state.snapshot();
        let second = cc.recalc_ssthresh(&mut state, &tx);
        assert_eq!(first, second, "{}", cc.name());
        assert_eq!(state.snapshot(), after_first, "{}", cc.name());
        assert_eq!(state.phase, Phase::Loss);
    }
}

#[test]
fn test_fifty_acks_stay_in_slow_start() {
    setup_test_logging();
    for mut cc in all_algorithms() {
        let (mut state, mut tx) = init(&mut *cc);
        let clocked_by_acks = cc.name() != "noordwijk";
        let mut prev = state.cwnd;
        for i in 1..=50 {
            tx.increment_now(Duration::from_millis(1));
            cc.on_new_ack(&mut state, SeqNr(i * MSS), &mut tx);
            if clocked_by_acks {
                assert!(state.cwnd > prev, "{}", cc.name());
            } else {
                assert!(state.cwnd >= prev, "{}", cc.name());
            }
            assert!(state.in_slow_start(), "{}", cc.name());
            prev = state.cwnd;
        }
        if clocked_by_acks {
            assert_eq!(state.cwnd, 51 * MSS, "{}", cc.name());
        }
    }
}

#[test]
fn test_loss_episode_ends_at_recovery_point() {
    setup_test_logging();
    for mut cc in all_algorithms() {
        let (mut state, mut tx) = init(&mut *cc);
        tx.high_tx_mark = SeqNr(10 * MSS);
        tx.bytes_in_flight = 10 * MSS;
        for count in 1..=3 {
            cc.on_dup_ack(&mut state, count, &mut tx);
        }
        assert_eq!(state.phase, Phase::Loss, "{}", cc.name());
        assert_eq!(tx.retransmits, 1);

        // Detected again within the same episode: no second retransmission.
        cc.on_dup_ack(&mut state, 3, &mut tx);
        assert_eq!(tx.retransmits, 1);

        let phase = cc.on_new_ack(&mut state, SeqNr(5 * MSS), &mut tx);
        assert_eq!(phase, Phase::Loss, "{}", cc.name());
        let phase = cc.on_new_ack(&mut state, SeqNr(10 * MSS), &mut tx);
        assert_eq!(phase, Phase::Open, "{}", cc.name());
    }
}

#[test]
fn test_rto_from_any_phase() {
    setup_test_logging();
    for mut cc in all_algorithms() {
        let (mut state, mut tx) = init(&mut *cc);
        state.cwnd = 40 * MSS;
        tx.bytes_in_flight = 40 * MSS;
        cc.on_retransmit_timeout(&mut state, &mut tx);
        assert_eq!(state.cwnd, MSS, "{}", cc.name());
        assert_eq!(state.phase, Phase::Loss);
        assert!(state.ssthresh >= 2 * MSS);

        // Again while still in loss: still a fresh episode.
        cc.on_retransmit_timeout(&mut state, &mut tx);
        assert_eq!(state.cwnd, MSS, "{}", cc.name());
        assert_eq!(tx.retransmits, 2);
    }
}

#[test]
fn test_window_respects_receiver() {
    for mut cc in all_algorithms() {
        let (mut state, _) = init(&mut *cc);
        state.cwnd = 20 * MSS;
        state.receiver_window = 5 * MSS;
        assert_eq!(cc.window(&state), 5 * MSS);
        state.receiver_window = 100 * MSS;
        assert_eq!(cc.window(&state), 20 * MSS);
    }
}

#[test]
fn test_fork_starts_fresh() {
    setup_test_logging();
    for mut cc in all_algorithms() {
        let (mut state, mut tx) = init(&mut *cc);
        for i in 1..=20 {
            cc.on_new_ack(&mut state, SeqNr(i * MSS), &mut tx);
        }
        cc.recalc_ssthresh(&mut state, &tx);

        let mut forked = cc.fork();
        assert_eq!(forked.name(), cc.name());

        // The fork behaves like a brand new instance of the same configuration.
        let mut fresh = cc.fork();
        let (mut s1, mut tx1) = init(&mut *forked);
        let (mut s2, mut tx2) = init(&mut *fresh);
        for i in 1..=20 {
            forked.on_new_ack(&mut s1, SeqNr(i * MSS), &mut tx1);
            fresh.on_new_ack(&mut s2, SeqNr(i * MSS), &mut tx2);
        }
        assert_eq!(s1.snapshot(), s2.snapshot(), "{}", cc.name());
        let expected = if cc.name() == "noordwijk" { MSS } else { 21 * MSS };
        assert_eq!(s1.cwnd, expected, "{}", cc.name());
    }
}
