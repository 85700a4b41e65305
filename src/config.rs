use crate::{
    Result,
    congestion::{
        CongestionAlgorithm,
        bic::{Bic, BicConfig},
        cubic::{Cubic, CubicConfig},
        highspeed::{HighSpeed, HighSpeedConfig},
        hybla::{Hybla, HyblaConfig},
        noordwijk::{Noordwijk, NoordwijkConfig},
        tracing::TracingAlgorithm,
    },
    constants::{DEFAULT_INITIAL_CWND_SEGMENTS, DEFAULT_INITIAL_SSTHRESH_SEGMENTS},
    error::Ensure,
};

/// Window values applied by `init`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowConfig {
    pub initial_cwnd_segments: u32,
    pub initial_ssthresh_segments: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            initial_cwnd_segments: DEFAULT_INITIAL_CWND_SEGMENTS,
            initial_ssthresh_segments: DEFAULT_INITIAL_SSTHRESH_SEGMENTS,
        }
    }
}

impl WindowConfig {
    pub(crate) fn validate(&self, algorithm: &'static str) -> Result<()> {
        (self.initial_cwnd_segments > 0).ensure(
            algorithm,
            "initial_cwnd_segments",
            "must be positive",
        )?;
        (self.initial_ssthresh_segments >= 2).ensure(
            algorithm,
            "initial_ssthresh_segments",
            "must be at least 2 segments",
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CongestionControlKind {
    Bic(BicConfig),
    Cubic(CubicConfig),
    HighSpeed(HighSpeedConfig),
    Hybla(HyblaConfig),
    Noordwijk(NoordwijkConfig),
}

impl Default for CongestionControlKind {
    fn default() -> Self {
        CongestionControlKind::Cubic(CubicConfig::default())
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct CongestionConfig {
    pub kind: CongestionControlKind,
    /// Log window changes and report them to the observer, if any.
    pub tracing: bool,
}

impl CongestionConfig {
    /// Validate the configuration and build the algorithm for a new connection.
    pub fn create(&self) -> Result<Box<dyn CongestionAlgorithm>> {
        let algorithm: Box<dyn CongestionAlgorithm> = match &self.kind {
            CongestionControlKind::Bic(c) => Box::new(Bic::new(c.clone())?),
            CongestionControlKind::Cubic(c) => Box::new(Cubic::new(c.clone())?),
            CongestionControlKind::HighSpeed(c) => Box::new(HighSpeed::new(c.clone())?),
            CongestionControlKind::Hybla(c) => Box::new(Hybla::new(c.clone())?),
            CongestionControlKind::Noordwijk(c) => Box::new(Noordwijk::new(c.clone())?),
        };
        if self.tracing {
            tracing::debug!(algorithm = algorithm.name(), "enabling congestion tracing");
            return Ok(Box::new(TracingAlgorithm::new(algorithm)));
        }
        Ok(algorithm)
    }
}
