//! Pluggable TCP congestion control.
//!
//! A socket owns a [`CongestionState`] and one boxed [`CongestionAlgorithm`] per connection,
//! and drives the algorithm on every ACK, duplicate ACK and retransmission timeout. The
//! algorithm reads the socket's bookkeeping through [`Transport`] and updates the window in
//! place.
//!
//! ```
//! use tcp_cc::{CongestionAlgorithm, CongestionConfig, CongestionState};
//!
//! let cc = CongestionConfig::default().create()?;
//! let state = CongestionState::new(1460)?;
//! assert_eq!(cc.window(&state), 1460);
//! # Ok::<(), tcp_cc::Error>(())
//! ```

#[macro_use]
mod macros;

mod config;
mod congestion;
mod constants;
mod error;
mod metrics;
mod seq_nr;
mod state;
#[cfg(test)]
mod test_util;
mod traits;
mod utils;

pub use config::{CongestionConfig, CongestionControlKind, WindowConfig};
pub use congestion::{
    CongestionAlgorithm,
    bic::{Bic, BicConfig},
    cubic::{Cubic, CubicConfig, HystartDetect, HystartExit},
    highspeed::{HighSpeed, HighSpeedConfig, table_lookup_a, table_lookup_b},
    hybla::{Hybla, HyblaConfig},
    noordwijk::{Noordwijk, NoordwijkConfig},
    tracing::{CongestionObserver, TracingAlgorithm},
};
pub use constants::DUP_ACK_THRESHOLD;
pub use error::{Error, Result};
pub use seq_nr::SeqNr;
pub use state::{CongestionState, Phase, Snapshot};
pub use traits::Transport;
