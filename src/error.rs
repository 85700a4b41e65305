#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("invalid {algorithm} parameter {parameter}: {reason}")]
    InvalidParameter {
        algorithm: &'static str,
        parameter: &'static str,
        reason: &'static str,
    },

    #[error("segment size must be positive")]
    ZeroSegmentSize,
}

pub type Result<T> = std::result::Result<T, Error>;

pub(crate) trait Ensure: Sized {
    fn ensure(self, algorithm: &'static str, parameter: &'static str, reason: &'static str)
    -> Result<()>;
}

impl Ensure for bool {
    fn ensure(
        self,
        algorithm: &'static str,
        parameter: &'static str,
        reason: &'static str,
    ) -> Result<()> {
        if self {
            Ok(())
        } else {
            Err(Error::InvalidParameter {
                algorithm,
                parameter,
                reason,
            })
        }
    }
}
