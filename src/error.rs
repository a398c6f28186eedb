use std::collections::TryReserveError;

/// Everything the decoder can fail with.
///
/// Recoverable conditions (chain truncation, entry-set assembly problems,
/// checksum mismatches) are logged warnings and never surface here; the
/// variants below are the failures that reach a command boundary.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid exFAT superblock ({0} field violation(s))")]
    InvalidSuperblock(usize),
    #[error("{0}")]
    InvalidArgument(String),
    #[error("'{0}': No such file or directory")]
    NotFound(String),
    #[error("filesystem inconsistency: {0}")]
    Inconsistency(String),
    #[error("out of memory")]
    OutOfMemory,
    #[error("unsupported directory entry type: {0:#04x}")]
    Unsupported(u8),
}

impl From<TryReserveError> for Error {
    fn from(_: TryReserveError) -> Self {
        Error::OutOfMemory
    }
}

impl Error {
    /// Process exit code for a command that failed with this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            Error::Io(_) => 1,
            Error::InvalidArgument(_) => 2,
            Error::InvalidSuperblock(_) => 3,
            Error::NotFound(_) => 4,
            Error::Inconsistency(_) => 5,
            Error::Unsupported(_) => 6,
            Error::OutOfMemory => 7,
        }
    }
}

pub type Result<T> = core::result::Result<T, Error>;
