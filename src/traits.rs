use std::time::{Duration, Instant};

use crate::seq_nr::SeqNr;

/// The socket that owns a connection's byte stream, as seen by the congestion engine.
///
/// The engine never sends anything by itself. It reads the sender's bookkeeping through
/// this trait and asks it to retransmit or to push more data. Tests use a mock transport.
pub trait Transport {
    /// Clock used for epochs and RTT samples.
    fn now(&self) -> Instant;

    /// Bytes sent but not yet acknowledged.
    fn bytes_in_flight(&self) -> u32;

    /// Oldest unacknowledged sequence number (head of the send buffer).
    fn head_sequence(&self) -> SeqNr;

    /// Next sequence number that will be sent.
    fn high_tx_mark(&self) -> SeqNr;

    fn smoothed_rtt(&self) -> Option<Duration>;

    /// Retransmit the oldest unacknowledged segment.
    fn retransmit_oldest(&mut self);

    /// The window may have opened: send whatever the engine now allows.
    fn send_pending(&mut self);
}
