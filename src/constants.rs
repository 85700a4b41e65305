use std::time::Duration;

use tracing::Level;

// Fast retransmit kicks in on this many duplicate ACKs.
pub const DUP_ACK_THRESHOLD: u32 = 3;

pub const DEFAULT_INITIAL_CWND_SEGMENTS: u32 = 1;
pub const DEFAULT_INITIAL_SSTHRESH_SEGMENTS: u32 = 65535;

// Receiver window used until the socket reports the peer's one.
pub const DEFAULT_RECEIVER_WINDOW: u32 = u32::MAX;

// Hybla
pub const DEFAULT_HYBLA_REFERENCE_RTT: Duration = Duration::from_millis(50);

// Noordwijk
pub const NOORDWIJK_BURST_MIN_SEGMENTS: u32 = 3;
pub const DEFAULT_NOORDWIJK_INITIAL_BURST_SEGMENTS: u32 = 10;
pub const DEFAULT_NOORDWIJK_TX_TIME: Duration = Duration::from_millis(500);
pub const DEFAULT_NOORDWIJK_MIN_TX_TIME: Duration = Duration::from_millis(10);
pub const DEFAULT_NOORDWIJK_CONGESTION_THRESHOLD: Duration = Duration::from_millis(200);
pub const DEFAULT_NOORDWIJK_STAB: u32 = 2;

pub const CONGESTION_TRACING_LOG_LEVEL: Level = Level::DEBUG;

// Rate limit for logging changes caused by ACKs, which are very frequent.
pub const CONGESTION_TRACING_ACK_LOG_EVERY_MS: u64 = 500;
