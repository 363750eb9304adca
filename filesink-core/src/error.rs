use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// A storage call (append, rename, list, ...) failed. Retried at a fixed
    /// interval, never escalated automatically.
    #[error("Storage Error - {0}")]
    Storage(String),

    #[error("WAL Error - {0}")]
    Wal(String),

    /// Recovery could not reconcile WAL state with the store. Fatal for the
    /// partition's startup.
    #[error("Recovery Error - {0}")]
    Recovery(String),

    /// Programmer error in naming inputs. Never retried.
    #[error("Invalid Argument - {0}")]
    InvalidArgument(String),

    #[error("Config Error - {0}")]
    Config(String),

    #[error("OneShot Receiver Error - {0}")]
    ActorPatternRecv(String),
}

impl Error {
    /// Only storage unavailability is worth a retry; everything else is a
    /// protocol or programmer error.
    pub(crate) fn is_retryable(&self) -> bool {
        matches!(self, Error::Storage(_))
    }
}
